use crate::office::Office;
use pixel_office_protocol::HistoryEntry;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Per-tick progress gain is drawn from `min_increment..max_increment`,
    /// scaled by the game speed.
    pub min_increment: u32,
    pub max_increment: u32,
    /// Chance that a character changes zone after finishing a task.
    pub zone_hop_probability: f64,
    /// Upper bound of zones skipped forward when hopping.
    pub max_zone_hop: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            min_increment: 0,
            max_increment: 5,
            zone_hop_probability: 0.3,
            max_zone_hop: 3,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_increment == 0 || self.min_increment >= self.max_increment {
            anyhow::bail!("simulation increments need min_increment < max_increment");
        }
        if self.max_increment > 100 {
            anyhow::bail!("simulation max_increment must not exceed 100");
        }
        if !(0.0..=1.0).contains(&self.zone_hop_probability) {
            anyhow::bail!("zone_hop_probability must be within 0..=1");
        }
        if self.max_zone_hop == 0 {
            anyhow::bail!("max_zone_hop must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// Progress crossed the halfway mark.
    Milestone { id: String, task: String },
    Completed {
        id: String,
        finished: String,
        next: String,
        zone: String,
        moved_to: Option<String>,
    },
}

/// One tick of the in-process simulation. Always succeeds.
///
/// Working characters gain a bounded random amount of progress. Anyone at
/// 100 gets a fresh task from their role's list, is reset to 0, logs the
/// finished task in their history and may wander to another zone.
pub fn simulate_step<R: Rng>(
    office: &mut Office,
    params: &SimulationParams,
    clock: &str,
    rng: &mut R,
) -> Vec<SimEvent> {
    let mut events = Vec::new();
    let speed = office.game_speed;
    let cap = office.history_cap;

    for idx in 0..office.characters.len() {
        let character = &mut office.characters[idx];

        if character.is_working() {
            let before = character.progress;
            let lo = f64::from(params.min_increment) * speed;
            let hi = f64::from(params.max_increment) * speed;
            let gain = rng.gen_range(lo..hi.max(lo + f64::EPSILON)).floor();
            character.set_progress(f64::from(before) + gain);
            if before < 50 && character.progress >= 50 && character.progress < 100 {
                events.push(SimEvent::Milestone {
                    id: character.id.clone(),
                    task: character.task.clone(),
                });
            }
        }

        if character.progress < 100 {
            continue;
        }

        let tasks = office.tasks.tasks_for(&character.role);
        let next = tasks[rng.gen_range(0..tasks.len())].clone();
        let finished = std::mem::replace(&mut character.task, next.clone());
        character.push_history(
            HistoryEntry {
                time: clock.to_string(),
                task: finished.clone(),
                completed: true,
            },
            cap,
        );
        character.progress = 0;
        let zone = character.zone.clone();

        let mut moved_to = None;
        if office.zones.len() > 1 && rng.gen_bool(params.zone_hop_probability) {
            let max_hop = params.max_zone_hop.min(office.zones.len() - 1);
            let steps = rng.gen_range(1..=max_hop);
            if let Some(target) = office.zones.step_from(&zone, steps) {
                moved_to = Some(target.id.clone());
            }
        }
        if let Some(target) = &moved_to {
            let character = &mut office.characters[idx];
            character.zone = target.clone();
            character.position = None;
        }

        office.completed_today += 1;
        events.push(SimEvent::Completed {
            id: office.characters[idx].id.clone(),
            finished,
            next,
            zone,
            moved_to,
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OfficeConfig;
    use pixel_office_protocol::Status;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn office() -> Office {
        Office::new(&OfficeConfig::default()).unwrap()
    }

    #[test]
    fn progress_stays_in_bounds_over_many_ticks() {
        let mut o = office();
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            simulate_step(&mut o, &params, "10:00", &mut rng);
            for c in &o.characters {
                assert!(c.progress <= 100, "{} at {}", c.id, c.progress);
                assert!(o.zones.contains(&c.zone));
            }
        }
    }

    #[test]
    fn history_never_exceeds_cap() {
        let mut o = office();
        o.history_cap = 5;
        let params = SimulationParams {
            min_increment: 60,
            max_increment: 100,
            ..SimulationParams::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            simulate_step(&mut o, &params, "10:00", &mut rng);
            assert!(o.characters.iter().all(|c| c.history.len() <= 5));
        }
        let qa = o.character("qa").unwrap();
        assert_eq!(qa.history.len(), 5);
    }

    #[test]
    fn qa_at_99_wraps_with_a_new_testing_task() {
        for seed in 0..20 {
            let mut o = office();
            {
                let qa = o.character_mut("qa").unwrap();
                qa.progress = 99;
                qa.status = Status::Working;
            }
            let params = SimulationParams {
                min_increment: 1,
                ..SimulationParams::default()
            };
            let mut rng = StdRng::seed_from_u64(seed);
            let events = simulate_step(&mut o, &params, "14:30", &mut rng);

            let testing = o.tasks.tasks_for("测试").to_vec();
            let qa = o.character("qa").unwrap();
            assert_eq!(qa.progress, 0);
            assert!(testing.contains(&qa.task));
            let last = qa.history.last().unwrap();
            assert!(last.completed);
            assert_eq!(last.task, "执行测试用例");
            assert_eq!(last.time, "14:30");
            assert!(events.iter().any(|e| matches!(
                e,
                SimEvent::Completed { id, finished, .. } if id == "qa" && finished == "执行测试用例"
            )));
        }
    }

    #[test]
    fn idle_characters_do_not_gain_progress() {
        let mut o = office();
        let before = o.character("security").unwrap().progress;
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            simulate_step(&mut o, &SimulationParams::default(), "10:00", &mut rng);
        }
        assert_eq!(o.character("security").unwrap().progress, before);
    }

    #[test]
    fn zone_hop_always_lands_somewhere_else() {
        let params = SimulationParams {
            min_increment: 99,
            max_increment: 100,
            zone_hop_probability: 1.0,
            max_zone_hop: 3,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut o = office();
        for _ in 0..30 {
            let before: Vec<String> = o.characters.iter().map(|c| c.zone.clone()).collect();
            let events = simulate_step(&mut o, &params, "10:00", &mut rng);
            for e in events {
                if let SimEvent::Completed { id, moved_to, zone, .. } = e {
                    let target = moved_to.expect("hop with probability 1");
                    assert_ne!(target, zone);
                    let idx = o.characters.iter().position(|c| c.id == id).unwrap();
                    assert_eq!(before[idx], zone);
                    assert_eq!(o.characters[idx].zone, target);
                }
            }
        }
    }

    #[test]
    fn completions_count_towards_today() {
        let mut o = office();
        let params = SimulationParams {
            min_increment: 99,
            max_increment: 100,
            zone_hop_probability: 0.0,
            ..SimulationParams::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        let events = simulate_step(&mut o, &params, "10:00", &mut rng);
        let completed = events
            .iter()
            .filter(|e| matches!(e, SimEvent::Completed { .. }))
            .count() as u64;
        assert!(completed > 0);
        assert_eq!(o.completed_today, completed);
    }

    #[test]
    fn game_speed_scales_the_increment() {
        let params = SimulationParams {
            min_increment: 2,
            max_increment: 3,
            ..SimulationParams::default()
        };
        let mut o = office();
        o.character_mut("fe").unwrap().progress = 0;
        o.set_game_speed(3.0);
        let mut rng = StdRng::seed_from_u64(1);
        simulate_step(&mut o, &params, "10:00", &mut rng);
        let fe = o.character("fe").unwrap().progress;
        assert!((6..9).contains(&fe), "fe at {fe}");
    }

    #[test]
    fn invalid_params_are_rejected() {
        let bad = SimulationParams {
            min_increment: 5,
            max_increment: 5,
            ..SimulationParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = SimulationParams {
            zone_hop_probability: 1.5,
            ..SimulationParams::default()
        };
        assert!(bad.validate().is_err());
    }
}
