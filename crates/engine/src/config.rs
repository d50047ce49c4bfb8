use crate::character::{default_roster, CharacterSpec, TaskBook};
use crate::simulate::SimulationParams;
use crate::zone::{default_zones, Zone, ZoneTable};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const HISTORY_CAP_RANGE: std::ops::RangeInclusive<usize> = 5..=10;
pub const GAME_SPEED_RANGE: std::ops::RangeInclusive<f64> = 0.5..=3.0;

/// Everything tunable about the office. Every field has a default, so an
/// empty YAML file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficeConfig {
    pub poll_interval_ms: u64,
    pub fps: u32,
    pub fetch_timeout_ms: u64,
    /// Either absolute URLs or paths resolved against the server's own address.
    pub local_endpoint: String,
    pub static_endpoint: String,
    pub push_endpoint: String,
    pub push_reconnect_ms: u64,
    pub live: bool,
    pub push: bool,
    pub history_cap: usize,
    pub game_speed: f64,
    pub simulation: SimulationParams,
    pub zones: Vec<Zone>,
    pub roster: Vec<CharacterSpec>,
    pub tasks: TaskBook,
}

impl Default for OfficeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            fps: 60,
            fetch_timeout_ms: 2_000,
            local_endpoint: "/api/status".to_string(),
            static_endpoint: "/static-data.json".to_string(),
            push_endpoint: "/api/sse".to_string(),
            push_reconnect_ms: 5_000,
            live: true,
            push: false,
            history_cap: 10,
            game_speed: 1.0,
            simulation: SimulationParams::default(),
            zones: default_zones(),
            roster: default_roster(),
            tasks: TaskBook::default(),
        }
    }
}

impl OfficeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let cfg = Self::from_yaml(&raw).with_context(|| format!("config: {}", path.display()))?;
        Ok(cfg)
    }

    /// Loads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw).context("parse yaml")?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fps == 0 {
            anyhow::bail!("fps must be positive");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }
        if self.push_reconnect_ms == 0 {
            anyhow::bail!("push_reconnect_ms must be positive");
        }
        if !HISTORY_CAP_RANGE.contains(&self.history_cap) {
            anyhow::bail!(
                "history_cap must be within {}..={}",
                HISTORY_CAP_RANGE.start(),
                HISTORY_CAP_RANGE.end()
            );
        }
        if !GAME_SPEED_RANGE.contains(&self.game_speed) {
            anyhow::bail!(
                "game_speed must be within {}..={}",
                GAME_SPEED_RANGE.start(),
                GAME_SPEED_RANGE.end()
            );
        }
        self.simulation.validate()?;
        if self.tasks.fallback.is_empty() {
            anyhow::bail!("tasks.fallback must list at least one task");
        }

        let zones = self.zone_table()?;
        for (i, spec) in self.roster.iter().enumerate() {
            if self.roster[..i].iter().any(|other| other.id == spec.id) {
                anyhow::bail!("duplicate character id: {}", spec.id);
            }
            if !zones.contains(&spec.zone) {
                anyhow::bail!("character {} sits in unknown zone {}", spec.id, spec.zone);
            }
        }
        Ok(())
    }

    pub fn zone_table(&self) -> anyhow::Result<ZoneTable> {
        ZoneTable::new(self.zones.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn push_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.push_reconnect_ms)
    }
}

/// Joins a configured endpoint onto `base` unless it is already absolute.
pub fn resolve_endpoint(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    let base = base.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        OfficeConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(OfficeConfig::from_yaml("").unwrap(), OfficeConfig::default());
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let cfg = OfficeConfig::from_yaml("poll_interval_ms: 3000\npush: true\n").unwrap();
        assert_eq!(cfg.poll_interval_ms, 3000);
        assert!(cfg.push);
        assert_eq!(cfg.fps, 60);
        assert_eq!(cfg.roster.len(), 10);
    }

    #[test]
    fn history_cap_outside_range_is_rejected() {
        assert!(OfficeConfig::from_yaml("history_cap: 3").is_err());
        assert!(OfficeConfig::from_yaml("history_cap: 11").is_err());
        assert!(OfficeConfig::from_yaml("history_cap: 5").is_ok());
    }

    #[test]
    fn roster_in_unknown_zone_is_rejected() {
        let mut cfg = OfficeConfig::default();
        cfg.roster[0].zone = "rooftop".to_string();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("rooftop"));
    }

    #[test]
    fn game_speed_outside_range_is_rejected() {
        assert!(OfficeConfig::from_yaml("game_speed: 0.25").is_err());
        assert!(OfficeConfig::from_yaml("game_speed: 4").is_err());
        assert!(OfficeConfig::from_yaml("game_speed: 2.5").is_ok());
    }

    #[test]
    fn empty_fallback_tasks_are_rejected() {
        assert!(OfficeConfig::from_yaml("tasks:\n  by_role: {}\n  fallback: []\n").is_err());
    }

    #[test]
    fn endpoints_resolve_against_base() {
        assert_eq!(
            resolve_endpoint("http://127.0.0.1:1/", "/api/status"),
            "http://127.0.0.1:1/api/status"
        );
        assert_eq!(
            resolve_endpoint("http://127.0.0.1:1", "static-data.json"),
            "http://127.0.0.1:1/static-data.json"
        );
        assert_eq!(
            resolve_endpoint("http://127.0.0.1:1", "https://example.test/s"),
            "https://example.test/s"
        );
    }

    #[test]
    fn frame_interval_follows_fps() {
        let cfg = OfficeConfig {
            fps: 50,
            ..OfficeConfig::default()
        };
        assert_eq!(cfg.frame_interval(), Duration::from_millis(20));
    }
}
