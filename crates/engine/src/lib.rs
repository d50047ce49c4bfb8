//! Office state and the two loops that drive it: status reconciliation and
//! the frame loop.

pub mod character;
pub mod config;
pub mod merge;
pub mod office;
pub mod render;
pub mod resolver;
pub mod simulate;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod zone;

pub use character::{Character, CharacterSpec, TaskBook};
pub use config::OfficeConfig;
pub use merge::{merge_payload, merge_records, MergeReport};
pub use office::Office;
pub use render::{Canvas, DisplayList, PluginRegistry};
pub use resolver::{apply_resolution, resolve, Resolution, TickOutcome};
pub use simulate::{simulate_step, SimEvent, SimulationParams};
pub use source::{first_success, Failure, Fetched, SourceError, StatusSource};
pub use store::Store;
pub use zone::{Point, Zone, ZoneTable};

pub use pixel_office_protocol as protocol;

use std::time::{SystemTime, UNIX_EPOCH};
use time::{macros::format_description, Date, OffsetDateTime};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// Local wall-clock time, falling back to UTC when the offset is unknown.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

pub fn local_today() -> Date {
    local_now().date()
}

/// `HH:MM`, the stamp used for history entries.
pub fn clock_label(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]"))
        .unwrap_or_else(|_| "--:--".to_string())
}

pub fn date_label(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

pub fn rfc3339_now() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Milliseconds since the epoch at local midnight of `date`.
pub fn start_of_day_ms(date: Date) -> i64 {
    let offset = local_now().offset();
    let midnight = date.midnight().assume_offset(offset);
    (midnight.unix_timestamp_nanos() / 1_000_000)
        .try_into()
        .unwrap_or(0)
}
