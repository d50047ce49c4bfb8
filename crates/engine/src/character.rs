use crate::render::palette;
use crate::zone::Point;
use pixel_office_protocol::{HistoryEntry, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;

/// Golden-angle spacing keeps neighbouring phases apart without lining up.
const PHASE_STEP: f64 = 2.399_963_229_728_653;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub role: String,
    pub zone: String,
    pub color: String,
    pub task: String,
    pub progress: u8,
    pub status: Status,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Animation phase, fixed at creation.
    pub phase: f64,
    /// Explicit floor position; `None` means "centre of my zone".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(skip)]
    pub offset: Point,
}

impl Character {
    pub fn from_spec(spec: &CharacterSpec, index: usize) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            role: spec.role.clone(),
            zone: spec.zone.clone(),
            color: spec.color.clone(),
            task: spec.task.clone(),
            progress: clamp_progress(spec.progress),
            status: spec.status,
            history: Vec::new(),
            phase: spec
                .phase
                .unwrap_or_else(|| (index as f64 * PHASE_STEP) % TAU),
            position: spec.position,
            offset: Point::default(),
        }
    }

    pub fn set_progress(&mut self, value: f64) {
        self.progress = clamp_progress(value);
    }

    /// Appends to the history, dropping the oldest entries past `cap`.
    pub fn push_history(&mut self, entry: HistoryEntry, cap: usize) {
        self.history.push(entry);
        if self.history.len() > cap {
            let excess = self.history.len() - cap;
            self.history.drain(..excess);
        }
    }

    pub fn is_working(&self) -> bool {
        self.status.is_working()
    }
}

/// Rounds and clamps into `0..=100`.
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// A roster entry as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSpec {
    pub id: String,
    pub name: String,
    pub role: String,
    pub zone: String,
    pub color: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
}

impl CharacterSpec {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: &str,
        name: &str,
        role: &str,
        zone: &str,
        color: &str,
        task: &str,
        progress: f64,
        status: Status,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            zone: zone.to_string(),
            color: color.to_string(),
            task: task.to_string(),
            progress,
            status,
            phase: None,
            position: None,
        }
    }
}

pub fn default_roster() -> Vec<CharacterSpec> {
    use Status::{Idle, Working};
    vec![
        CharacterSpec::new("boss", "👔 老板", "用户", "boss", palette::BROWN, "下达指令", 100.0, Idle),
        CharacterSpec::new("ai", "🤖 AI助手", "主助手", "ai", palette::BLUE, "分配任务", 100.0, Working),
        CharacterSpec::new("pm", "📋 产品经理", "产品", "pm", palette::INDIGO, "整理需求文档", 75.0, Working),
        CharacterSpec::new("pm_manager", "📊 项目经理", "产品", "meeting", palette::PINK, "协调进度", 50.0, Working),
        CharacterSpec::new("fe", "💻 前端开发", "开发", "dev", palette::GREEN, "实现UI组件", 45.0, Working),
        CharacterSpec::new("be", "⚙️ 后端开发", "开发", "dev", palette::YELLOW, "编写API接口", 30.0, Working),
        CharacterSpec::new("qa", "🧪 测试工程师", "测试", "test", palette::BLUE, "执行测试用例", 20.0, Working),
        CharacterSpec::new("security", "🔒 安全专家", "安全", "security", palette::RED, "漏洞扫描", 0.0, Idle),
        CharacterSpec::new("miner", "🔍 新闻矿工", "查询", "search", palette::ORANGE, "搜索信息", 60.0, Working),
        CharacterSpec::new("writer", "✍️ 小说家", "创作", "break", palette::PINK, "创作中", 80.0, Working),
    ]
}

/// Fixed task lists per role. Roles without a list draw from `fallback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBook {
    #[serde(default)]
    pub by_role: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_fallback_tasks")]
    pub fallback: Vec<String>,
}

fn default_fallback_tasks() -> Vec<String> {
    vec!["工作中".to_string()]
}

impl Default for TaskBook {
    fn default() -> Self {
        let lists: [(&str, [&str; 4]); 8] = [
            ("用户", ["下达指令", "开会", "审批文件", "战略规划"]),
            ("主助手", ["分配任务", "协调进度", "审核代码", "回复用户"]),
            ("产品", ["整理需求文档", "撰写PRD", "用户访谈", "竞品分析"]),
            ("开发", ["实现UI组件", "修复样式bug", "优化性能", "编写文档"]),
            ("测试", ["执行测试用例", "编写测试报告", "回归测试", "Bug验证"]),
            ("安全", ["漏洞扫描", "安全审计", "渗透测试", "安全培训"]),
            ("查询", ["搜索信息", "整理新闻", "数据分析", "报告撰写"]),
            ("创作", ["创作中", "构思情节", "修改稿子", "发布章节"]),
        ];
        Self {
            by_role: lists
                .iter()
                .map(|(role, tasks)| {
                    (
                        role.to_string(),
                        tasks.iter().map(|t| t.to_string()).collect(),
                    )
                })
                .collect(),
            fallback: default_fallback_tasks(),
        }
    }
}

impl TaskBook {
    pub fn tasks_for(&self, role: &str) -> &[String] {
        match self.by_role.get(role) {
            Some(list) if !list.is_empty() => list,
            _ => &self.fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(task: &str) -> HistoryEntry {
        HistoryEntry {
            time: "09:00".to_string(),
            task: task.to_string(),
            completed: true,
        }
    }

    #[test]
    fn progress_is_clamped_and_rounded() {
        assert_eq!(clamp_progress(-4.0), 0);
        assert_eq!(clamp_progress(42.6), 43);
        assert_eq!(clamp_progress(250.0), 100);
        assert_eq!(clamp_progress(f64::NAN), 0);
    }

    #[test]
    fn history_drops_oldest_past_cap() {
        let mut c = Character::from_spec(&default_roster()[0], 0);
        for i in 0..25 {
            c.push_history(entry(&format!("t{i}")), 10);
            assert!(c.history.len() <= 10);
        }
        assert_eq!(c.history.first().unwrap().task, "t15");
        assert_eq!(c.history.last().unwrap().task, "t24");
    }

    #[test]
    fn phases_are_distinct_across_the_roster() {
        let roster = default_roster();
        let chars: Vec<Character> = roster
            .iter()
            .enumerate()
            .map(|(i, s)| Character::from_spec(s, i))
            .collect();
        for (i, a) in chars.iter().enumerate() {
            assert!((0.0..TAU).contains(&a.phase));
            for b in &chars[i + 1..] {
                assert!((a.phase - b.phase).abs() > 1e-6);
            }
        }
    }

    #[test]
    fn unknown_role_uses_fallback_tasks() {
        let book = TaskBook::default();
        assert_eq!(book.tasks_for("测试").len(), 4);
        assert_eq!(book.tasks_for("园丁"), ["工作中".to_string()]);
    }
}
