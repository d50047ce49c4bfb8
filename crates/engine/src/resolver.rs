use crate::merge::{merge_payload, MergeReport};
use crate::office::Office;
use crate::simulate::{simulate_step, SimEvent, SimulationParams};
use crate::source::{first_success, Failure, Fetched, StatusSource};
use rand::Rng;
use std::sync::Arc;

pub const SIMULATION_STATUS: &str = "simulation";

/// What a polling tick decided to use.
#[derive(Debug)]
pub enum Resolution {
    /// A source delivered a payload.
    Fetched(Fetched),
    /// Live mode is on but every source failed.
    Exhausted(Vec<Failure>),
    /// Live mode is off.
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Merged { source: String, report: MergeReport },
    Simulated { events: Vec<SimEvent> },
}

/// Walks the source chain. Never fails: exhaustion is a value.
pub async fn resolve(live: bool, sources: &[Arc<dyn StatusSource>]) -> Resolution {
    if !live {
        return Resolution::Offline;
    }
    match first_success(sources).await {
        Ok(fetched) => Resolution::Fetched(fetched),
        Err(failures) => Resolution::Exhausted(failures),
    }
}

/// Applies a tick's resolution to the office and updates the status line.
pub fn apply_resolution<R: Rng>(
    office: &mut Office,
    resolution: Resolution,
    params: &SimulationParams,
    clock: &str,
    rng: &mut R,
) -> TickOutcome {
    match resolution {
        Resolution::Fetched(Fetched { source, payload }) => {
            let report = merge_payload(office, &payload);
            office.set_status_line(format!("live: {source}"));
            TickOutcome::Merged { source, report }
        }
        Resolution::Exhausted(failures) => {
            for f in &failures {
                tracing::debug!(source = %f.source, error = %f.error, "status source failed");
            }
            let events = simulate_step(office, params, clock, rng);
            office.set_status_line(SIMULATION_STATUS);
            TickOutcome::Simulated { events }
        }
        Resolution::Offline => {
            let events = simulate_step(office, params, clock, rng);
            office.set_status_line(SIMULATION_STATUS);
            TickOutcome::Simulated { events }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OfficeConfig;
    use crate::source::fakes::Canned;
    use futures_util::FutureExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const STATIC_BODY: &str =
        r#"{"success":true,"data":{"characters":[{"id":"writer","task":"发布章节","progress":12}]}}"#;

    fn tick(office: &mut Office, live: bool, sources: &[Arc<dyn StatusSource>]) -> TickOutcome {
        let resolution = resolve(live, sources).now_or_never().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        apply_resolution(office, resolution, &SimulationParams::default(), "09:15", &mut rng)
    }

    #[test]
    fn local_failure_falls_back_to_static_not_simulation() {
        let mut office = Office::new(&OfficeConfig::default()).unwrap();
        let local = Canned::failing("local api");
        let fallback = Canned::ok("static json", STATIC_BODY);
        let sources: Vec<Arc<dyn StatusSource>> = vec![local.clone(), fallback.clone()];

        let outcome = tick(&mut office, true, &sources);
        match outcome {
            TickOutcome::Merged { source, report } => {
                assert_eq!(source, "static json");
                assert_eq!(report.applied, 1);
            }
            other => panic!("expected a merge, got {other:?}"),
        }
        let writer = office.character("writer").unwrap();
        assert_eq!(writer.task, "发布章节");
        assert_eq!(writer.progress, 12);
        assert_eq!(office.status_line, "live: static json");
        assert_eq!(local.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[test]
    fn all_sources_failing_runs_the_simulation() {
        let mut office = Office::new(&OfficeConfig::default()).unwrap();
        let sources: Vec<Arc<dyn StatusSource>> =
            vec![Canned::failing("local api"), Canned::failing("static json")];
        let outcome = tick(&mut office, true, &sources);
        assert!(matches!(outcome, TickOutcome::Simulated { .. }));
        assert_eq!(office.status_line, SIMULATION_STATUS);
    }

    #[test]
    fn live_off_skips_every_source() {
        let mut office = Office::new(&OfficeConfig::default()).unwrap();
        let local = Canned::ok("local api", STATIC_BODY);
        let sources: Vec<Arc<dyn StatusSource>> = vec![local.clone()];
        let outcome = tick(&mut office, false, &sources);
        assert!(matches!(outcome, TickOutcome::Simulated { .. }));
        assert_eq!(local.calls(), 0);
    }
}
