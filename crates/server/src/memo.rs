//! Yesterday's work memo, read from the memory directory and scrubbed of
//! anything that looks like a credential.

use crate::AppState;
use anyhow::Context;
use axum::extract::State;
use axum::Json;
use pixel_office_engine::protocol::MemoResponse;
use pixel_office_engine::{date_label, local_today};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use time::Date;

const SUMMARY_CHARS: usize = 500;
const MAX_TASKS: usize = 5;
const TASK_MARKERS: [&str; 3] = ["完成", "任务", "修复"];
pub const NO_RECORD: &str = "暂无昨日记录";
pub const UNAVAILABLE: &str = "暂无记录";

struct Redactions {
    secret_key: Regex,
    password: Regex,
    api_key: Regex,
}

fn redactions() -> &'static Redactions {
    static RE: OnceLock<Redactions> = OnceLock::new();
    RE.get_or_init(|| Redactions {
        secret_key: Regex::new(r"sk-[A-Za-z0-9]+").expect("static regex"),
        password: Regex::new(r"(?i)password[:\s]+\S+").expect("static regex"),
        api_key: Regex::new(r"(?i)api[_-]?key[:\s]+\S+").expect("static regex"),
    })
}

pub fn redact(content: &str) -> String {
    let r = redactions();
    let out = r.secret_key.replace_all(content, "***");
    let out = r.password.replace_all(&out, "password: ***");
    r.api_key.replace_all(&out, "api_key: ***").into_owned()
}

/// Up to five trimmed lines that mention finishing, a task or a fix.
pub fn extract_tasks(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| TASK_MARKERS.iter().any(|m| line.contains(m)))
        .take(MAX_TASKS)
        .map(|line| line.trim().to_string())
        .collect()
}

/// `<date>.md` for the day before `today`, else the newest `*.md` by name.
fn memo_path(dir: &Path, yesterday: &str) -> anyhow::Result<Option<PathBuf>> {
    let exact = dir.join(format!("{yesterday}.md"));
    if exact.is_file() {
        return Ok(Some(exact));
    }
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut newest: Option<PathBuf> = None;
    for entry in std::fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        if newest.as_ref().map_or(true, |n| path.file_name() > n.file_name()) {
            newest = Some(path);
        }
    }
    Ok(newest)
}

fn build_memo(dir: &Path, today: Date) -> anyhow::Result<MemoResponse> {
    let yesterday = today
        .previous_day()
        .map(date_label)
        .context("no day before today")?;
    let content = match memo_path(dir, &yesterday)? {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?
        }
        None => String::new(),
    };

    let clean = redact(&content);
    let summary: String = clean.chars().take(SUMMARY_CHARS).collect();
    Ok(MemoResponse {
        success: true,
        date: Some(yesterday),
        summary: if summary.is_empty() {
            NO_RECORD.to_string()
        } else {
            summary
        },
        tasks: extract_tasks(&clean),
    })
}

/// Never fails: any error collapses into an empty memo.
pub fn yesterday_memo(dir: &Path, today: Date) -> MemoResponse {
    build_memo(dir, today).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "yesterday memo unavailable");
        MemoResponse {
            success: true,
            date: None,
            summary: UNAVAILABLE.to_string(),
            tasks: Vec::new(),
        }
    })
}

pub(crate) async fn api_yesterday(State(state): State<Arc<AppState>>) -> Json<MemoResponse> {
    Json(yesterday_memo(&state.memory_dir, local_today()))
}
