//! Stand-ins for the upstream status service: a randomised status endpoint,
//! a static snapshot and a push stream that drifts every few seconds.

use crate::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{stream, Stream, StreamExt};
use pixel_office_engine::character::CharacterSpec;
use pixel_office_engine::protocol::{
    CharacterRecord, PushFrame, Stats, Status, StatusData, StatusPayload,
};
use pixel_office_engine::{now_ms, OfficeConfig, TaskBook};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;

pub const PUSH_PERIOD: Duration = Duration::from_secs(3);
pub const STATIC_FILE: &str = "static-data.json";

/// Status strings the live endpoint may report, including the ones the
/// office folds into idle.
const FEED_STATUSES: [&str; 4] = ["working", "idle", "meeting", "break"];

/// Working share per character id; anyone else is always working.
fn working_odds(id: &str) -> f64 {
    match id {
        "boss" => 0.0,
        "security" => 0.5,
        "writer" => 0.7,
        _ => 1.0,
    }
}

/// A random but plausible envelope for `GET /api/status`.
pub fn random_status<R: Rng>(config: &OfficeConfig, rng: &mut R) -> StatusPayload {
    let characters: Vec<CharacterRecord> = config
        .roster
        .iter()
        .map(|spec| {
            let tasks = config.tasks.tasks_for(&spec.role);
            let status = if spec.id == "pm_manager" {
                FEED_STATUSES[rng.gen_range(0..FEED_STATUSES.len())]
            } else if rng.gen_bool(working_odds(&spec.id)) {
                "working"
            } else if spec.id == "writer" {
                "break"
            } else {
                "idle"
            };
            let progress = if spec.id == "boss" {
                100.0
            } else {
                f64::from(rng.gen_range(0..100u32))
            };
            record(spec, &tasks[rng.gen_range(0..tasks.len())], progress, status)
        })
        .collect();
    let stats = feed_stats(&characters);
    StatusPayload::envelope(characters, stats, now_ms())
}

/// The fallback snapshot served when the data dir has no file: the roster
/// exactly as configured.
pub fn fixed_snapshot(config: &OfficeConfig) -> StatusPayload {
    let characters: Vec<CharacterRecord> = config
        .roster
        .iter()
        .map(|spec| record(spec, &spec.task, spec.progress, spec.status.as_str()))
        .collect();
    let stats = feed_stats(&characters);
    StatusPayload::envelope(characters, stats, 0)
}

fn record(spec: &CharacterSpec, task: &str, progress: f64, status: &str) -> CharacterRecord {
    CharacterRecord {
        id: spec.id.clone(),
        name: Some(spec.name.clone()),
        task: Some(task.to_string()),
        progress: Some(progress),
        status: Some(status.to_string()),
        zone: Some(spec.zone.clone()),
    }
}

/// Counts as the upstream feed does: only literal `idle` counts as idle.
pub fn feed_stats(characters: &[CharacterRecord]) -> Stats {
    let count = |s: &str| characters.iter().filter(|c| c.status.as_deref() == Some(s)).count();
    let total = characters.len() as u32;
    let sum: f64 = characters.iter().filter_map(|c| c.progress).sum();
    let progress = if total == 0 {
        0
    } else {
        (sum / f64::from(total)).floor() as u32
    };
    Stats {
        working: count("working") as u32,
        idle: count("idle") as u32,
        total,
        progress,
    }
}

/// State behind `GET /api/sse`: every step nudges working characters along,
/// occasionally flips someone between working and idle and wraps finished
/// tasks.
pub struct MockFeed {
    characters: Vec<CharacterRecord>,
    roles: Vec<String>,
    tasks: TaskBook,
    iteration: u64,
}

impl MockFeed {
    pub fn new<R: Rng>(config: &OfficeConfig, rng: &mut R) -> Self {
        let characters = config
            .roster
            .iter()
            .map(|spec| {
                let status = if rng.gen_bool(0.8) { Status::Working } else { Status::Idle };
                record(spec, &spec.task, f64::from(rng.gen_range(0..100u32)), status.as_str())
            })
            .collect();
        Self {
            characters,
            roles: config.roster.iter().map(|s| s.role.clone()).collect(),
            tasks: config.tasks.clone(),
            iteration: 0,
        }
    }

    pub fn step<R: Rng>(&mut self, rng: &mut R) -> PushFrame {
        self.iteration += 1;
        for (c, role) in self.characters.iter_mut().zip(&self.roles) {
            let working = c.status.as_deref() == Some("working");
            let progress = c.progress.unwrap_or(0.0);
            if working && progress < 100.0 {
                c.progress = Some((progress + f64::from(rng.gen_range(0..3u32))).min(100.0));
            }
            if rng.gen_bool(0.05) {
                c.status = Some(if working { "idle" } else { "working" }.to_string());
            }
            if c.progress.unwrap_or(0.0) >= 100.0 {
                let list = self.tasks.tasks_for(role);
                c.task = Some(list[rng.gen_range(0..list.len())].clone());
                c.progress = Some(0.0);
            }
        }
        PushFrame::Update {
            timestamp: Some(now_ms()),
            iteration: Some(self.iteration),
            data: Some(StatusData {
                stats: Some(feed_stats(&self.characters)),
                characters: self.characters.clone(),
            }),
        }
    }
}

pub(crate) async fn api_status(State(state): State<Arc<AppState>>) -> Json<StatusPayload> {
    let mut rng = StdRng::from_entropy();
    Json(random_status(&state.config, &mut rng))
}

pub(crate) async fn static_data(
    State(state): State<Arc<AppState>>,
) -> Result<Response, (StatusCode, String)> {
    let path = state.data_dir.join(STATIC_FILE);
    if path.is_file() {
        let body = std::fs::read(&path)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("read {}: {e}", path.display())))?;
        return Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response());
    }
    Ok(Json(fixed_snapshot(&state.config)).into_response())
}

pub(crate) async fn api_sse(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(feed_stream(&state.config, PUSH_PERIOD)).keep_alive(KeepAlive::default())
}

pub fn feed_stream(
    config: &OfficeConfig,
    period: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let mut rng = StdRng::from_entropy();
    let mut feed = MockFeed::new(config, &mut rng);
    let connected = PushFrame::Connected {
        timestamp: Some(now_ms()),
    };
    let ticks = IntervalStream::new(tokio::time::interval_at(
        tokio::time::Instant::now() + period,
        period,
    ));
    stream::once(async move { connected })
        .chain(ticks.map(move |_| feed.step(&mut rng)))
        .map(|frame| Ok(frame_event(&frame)))
}

fn frame_event(frame: &PushFrame) -> Event {
    Event::default().data(serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string()))
}
