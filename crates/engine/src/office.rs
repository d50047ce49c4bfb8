use crate::character::{Character, TaskBook};
use crate::config::{OfficeConfig, GAME_SPEED_RANGE};
use crate::zone::{Point, ZoneTable};
use pixel_office_protocol::{CharacterView, OfficeView, Stats};
use time::Date;

/// Half-extents of the click target around a character.
const HIT_HALF_WIDTH: f64 = 25.0;
const HIT_HALF_HEIGHT: f64 = 30.0;

/// All mutable office state. One owner drives it: the runtime task in the
/// server, or a test.
#[derive(Debug, Clone)]
pub struct Office {
    pub zones: ZoneTable,
    pub characters: Vec<Character>,
    pub tasks: TaskBook,
    pub selected: Option<String>,
    pub frame: u64,
    pub live: bool,
    pub push: bool,
    pub running: bool,
    pub status_line: String,
    pub completed_today: u64,
    pub day: Option<Date>,
    pub history_cap: usize,
    pub game_speed: f64,
}

impl Office {
    pub fn new(config: &OfficeConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let zones = config.zone_table()?;
        let characters = config
            .roster
            .iter()
            .enumerate()
            .map(|(i, spec)| Character::from_spec(spec, i))
            .collect();
        Ok(Self {
            zones,
            characters,
            tasks: config.tasks.clone(),
            selected: None,
            frame: 0,
            live: config.live,
            push: config.push,
            running: true,
            status_line: "starting".to_string(),
            completed_today: 0,
            day: None,
            history_cap: config.history_cap,
            game_speed: config.game_speed,
        })
    }

    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn character_mut(&mut self, id: &str) -> Option<&mut Character> {
        self.characters.iter_mut().find(|c| c.id == id)
    }

    /// Explicit position when set, otherwise the centre of the zone.
    pub fn position_of(&self, character: &Character) -> Point {
        character
            .position
            .unwrap_or_else(|| self.zones.center_of(&character.zone))
    }

    pub fn stats(&self) -> Stats {
        let total = self.characters.len() as u32;
        let working = self.characters.iter().filter(|c| c.is_working()).count() as u32;
        let progress = if total == 0 {
            0
        } else {
            let sum: u32 = self.characters.iter().map(|c| u32::from(c.progress)).sum();
            (f64::from(sum) / f64::from(total)).round() as u32
        };
        Stats {
            working,
            idle: total - working,
            total,
            progress,
        }
    }

    /// Selects whoever stands under `point`; a miss clears the selection.
    pub fn select_at(&mut self, point: Point) -> Option<&str> {
        let hit = self
            .characters
            .iter()
            .find(|c| {
                let p = self.position_of(c);
                (point.x - p.x).abs() < HIT_HALF_WIDTH && (point.y - p.y).abs() < HIT_HALF_HEIGHT
            })
            .map(|c| c.id.clone());
        self.selected = hit;
        self.selected.as_deref()
    }

    /// Clamps into the allowed speed range and returns what was stored. A
    /// non-finite request leaves the speed alone.
    pub fn set_game_speed(&mut self, speed: f64) -> f64 {
        if speed.is_finite() {
            self.game_speed = speed.clamp(*GAME_SPEED_RANGE.start(), *GAME_SPEED_RANGE.end());
        }
        self.game_speed
    }

    pub fn set_status_line(&mut self, text: impl Into<String>) {
        self.status_line = text.into();
    }

    /// Resets the completed counter when the calendar day changes.
    pub fn roll_day(&mut self, today: Date) -> bool {
        match self.day {
            Some(d) if d == today => false,
            Some(_) => {
                self.day = Some(today);
                self.completed_today = 0;
                true
            }
            None => {
                self.day = Some(today);
                false
            }
        }
    }

    pub fn view(&self) -> OfficeView {
        OfficeView {
            status_line: self.status_line.clone(),
            live: self.live,
            push: self.push,
            running: self.running,
            frame: self.frame,
            completed_today: self.completed_today,
            game_speed: self.game_speed,
            stats: self.stats(),
            selected: self.selected.clone(),
            characters: self
                .characters
                .iter()
                .map(|c| CharacterView {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    role: c.role.clone(),
                    zone: c.zone.clone(),
                    zone_name: self
                        .zones
                        .get(&c.zone)
                        .map(|z| z.name.clone())
                        .unwrap_or_else(|| c.zone.clone()),
                    color: c.color.clone(),
                    task: c.task.clone(),
                    progress: c.progress,
                    status: c.status,
                    history: c.history.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixel_office_protocol::Status;

    fn office() -> Office {
        Office::new(&OfficeConfig::default()).unwrap()
    }

    #[test]
    fn builds_the_default_roster() {
        let o = office();
        assert_eq!(o.characters.len(), 10);
        assert!(o.characters.iter().all(|c| o.zones.contains(&c.zone)));
        assert_eq!(o.character("qa").unwrap().role, "测试");
    }

    #[test]
    fn stats_count_working_and_average_progress() {
        let mut o = office();
        for c in &mut o.characters {
            c.status = Status::Idle;
            c.progress = 50;
        }
        o.character_mut("fe").unwrap().status = Status::Working;
        o.character_mut("fe").unwrap().progress = 100;
        let s = o.stats();
        assert_eq!(s.working, 1);
        assert_eq!(s.idle, 9);
        assert_eq!(s.total, 10);
        assert_eq!(s.progress, 55);
    }

    #[test]
    fn clicking_a_character_selects_it_and_missing_clears() {
        let mut o = office();
        let qa_pos = o.position_of(o.character("qa").unwrap());
        assert_eq!(o.select_at(Point::new(qa_pos.x + 10.0, qa_pos.y - 5.0)), Some("qa"));
        assert_eq!(o.selected.as_deref(), Some("qa"));
        assert_eq!(o.select_at(Point::new(-100.0, -100.0)), None);
        assert!(o.selected.is_none());
    }

    #[test]
    fn explicit_position_overrides_zone_center() {
        let mut o = office();
        o.character_mut("ai").unwrap().position = Some(Point::new(10.0, 20.0));
        let ai = o.character("ai").unwrap();
        assert_eq!(o.position_of(ai), Point::new(10.0, 20.0));
    }

    #[test]
    fn day_roll_resets_completed_counter() {
        let mut o = office();
        let d1 = time::macros::date!(2026-05-01);
        let d2 = time::macros::date!(2026-05-02);
        assert!(!o.roll_day(d1));
        o.completed_today = 4;
        assert!(!o.roll_day(d1));
        assert_eq!(o.completed_today, 4);
        assert!(o.roll_day(d2));
        assert_eq!(o.completed_today, 0);
    }

    #[test]
    fn game_speed_is_clamped() {
        let mut o = office();
        assert_eq!(o.set_game_speed(1.5), 1.5);
        assert_eq!(o.set_game_speed(9.0), 3.0);
        assert_eq!(o.set_game_speed(0.0), 0.5);
        assert_eq!(o.set_game_speed(f64::NAN), 0.5);
        assert_eq!(o.view().game_speed, 0.5);
    }

    #[test]
    fn view_resolves_zone_names() {
        let v = office().view();
        let boss = v.characters.iter().find(|c| c.id == "boss").unwrap();
        assert_eq!(boss.zone_name, "老板办公室");
        assert_eq!(v.stats.total, 10);
    }
}
