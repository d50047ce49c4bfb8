use crate::office::Office;
use pixel_office_protocol::{CharacterRecord, Status, StatusPayload};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records that matched a character.
    pub applied: usize,
    pub unknown_ids: Vec<String>,
    pub rejected_zones: Vec<String>,
    pub rejected_statuses: Vec<String>,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.applied == 0
    }
}

pub fn merge_payload(office: &mut Office, payload: &StatusPayload) -> MergeReport {
    merge_records(office, payload.records())
}

/// Folds partial records into the office. Only fields present in a record
/// are written; absent fields keep their value. Records for unknown ids,
/// zones outside the floor plan and unrecognised status strings are skipped
/// field by field.
pub fn merge_records(office: &mut Office, records: &[CharacterRecord]) -> MergeReport {
    let mut report = MergeReport::default();

    for record in records {
        if record.id.is_empty() {
            tracing::debug!("skipping record without id");
            continue;
        }
        let zone_ok = record
            .zone
            .as_deref()
            .filter(|z| !z.is_empty())
            .map(|z| (z, office.zones.contains(z)));

        let Some(character) = office.character_mut(&record.id) else {
            report.unknown_ids.push(record.id.clone());
            continue;
        };
        report.applied += 1;

        if let Some(task) = record.task.as_deref().filter(|t| !t.is_empty()) {
            character.task = task.to_string();
        }
        if let Some(progress) = record.progress {
            character.set_progress(progress);
        }
        if let Some(raw) = record.status.as_deref().filter(|s| !s.is_empty()) {
            match Status::from_feed(raw) {
                Some(status) => character.status = status,
                None => {
                    tracing::debug!(id = %record.id, status = raw, "ignoring unknown status");
                    report.rejected_statuses.push(raw.to_string());
                }
            }
        }
        match zone_ok {
            Some((zone, true)) => {
                if character.zone != zone {
                    character.zone = zone.to_string();
                    character.position = None;
                }
            }
            Some((zone, false)) => {
                tracing::debug!(id = %record.id, zone, "ignoring unknown zone");
                report.rejected_zones.push(zone.to_string());
            }
            None => {}
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OfficeConfig;
    use crate::zone::Point;

    fn office() -> Office {
        Office::new(&OfficeConfig::default()).unwrap()
    }

    #[test]
    fn partial_update_only_touches_present_fields() {
        let mut o = office();
        let before = o.character("fe").unwrap().clone();
        let payload: StatusPayload = serde_json::from_str(
            r#"{"success":true,"data":{"characters":[{"id":"fe","progress":97,"status":"working"}]}}"#,
        )
        .unwrap();

        let report = merge_payload(&mut o, &payload);
        assert_eq!(report.applied, 1);

        let after = o.character("fe").unwrap();
        assert_eq!(after.progress, 97);
        assert_eq!(after.task, before.task);
        assert_eq!(after.zone, before.zone);
        assert_eq!(after.status, before.status);
        assert_eq!(after.name, before.name);
        assert_eq!(after.history, before.history);
    }

    #[test]
    fn others_are_untouched_by_a_single_record() {
        let mut o = office();
        let before: Vec<_> = o.characters.iter().filter(|c| c.id != "fe").cloned().collect();
        let mut rec = CharacterRecord::new("fe");
        rec.progress = Some(97.0);
        merge_records(&mut o, &[rec]);
        let after: Vec<_> = o.characters.iter().filter(|c| c.id != "fe").cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn omitted_zone_keeps_the_previous_zone() {
        let mut o = office();
        let mut full = CharacterRecord::new("be");
        full.task = Some("数据库优化".to_string());
        full.progress = Some(10.0);
        full.status = Some("working".to_string());
        full.zone = Some("server".to_string());
        merge_records(&mut o, &[full]);
        assert_eq!(o.character("be").unwrap().zone, "server");

        let mut partial = CharacterRecord::new("be");
        partial.progress = Some(20.0);
        merge_records(&mut o, &[partial]);
        let be = o.character("be").unwrap();
        assert_eq!(be.zone, "server");
        assert_eq!(be.task, "数据库优化");
        assert_eq!(be.progress, 20);
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let mut o = office();
        let mut rec = CharacterRecord::new("pm_manager");
        rec.zone = Some("project".to_string());
        let report = merge_records(&mut o, &[rec]);
        assert_eq!(report.rejected_zones, vec!["project".to_string()]);
        assert_eq!(o.character("pm_manager").unwrap().zone, "meeting");
    }

    #[test]
    fn unknown_status_is_never_stored() {
        let mut o = office();
        let mut rec = CharacterRecord::new("ai");
        rec.status = Some("sleeping".to_string());
        let report = merge_records(&mut o, &[rec]);
        assert_eq!(report.rejected_statuses, vec!["sleeping".to_string()]);
        assert_eq!(o.character("ai").unwrap().status, Status::Working);

        let mut rec = CharacterRecord::new("ai");
        rec.status = Some("meeting".to_string());
        merge_records(&mut o, &[rec]);
        assert_eq!(o.character("ai").unwrap().status, Status::Idle);
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        let mut o = office();
        let mut hi = CharacterRecord::new("miner");
        hi.progress = Some(180.0);
        let mut lo = CharacterRecord::new("writer");
        lo.progress = Some(-3.0);
        merge_records(&mut o, &[hi, lo]);
        assert_eq!(o.character("miner").unwrap().progress, 100);
        assert_eq!(o.character("writer").unwrap().progress, 0);
    }

    #[test]
    fn unknown_ids_are_reported_and_ignored() {
        let mut o = office();
        let before = o.characters.clone();
        let report = merge_records(&mut o, &[CharacterRecord::new("intern")]);
        assert_eq!(report.unknown_ids, vec!["intern".to_string()]);
        assert!(report.is_noop());
        assert_eq!(o.characters, before);
    }

    #[test]
    fn records_without_id_are_skipped() {
        let mut o = office();
        let payload: StatusPayload = serde_json::from_str(
            r#"{"data":{"characters":[{"task":"无主任务","progress":10},{"id":"fe","progress":97}]}}"#,
        )
        .unwrap();
        let report = merge_payload(&mut o, &payload);
        assert_eq!(report.applied, 1);
        assert!(report.unknown_ids.is_empty());
        assert_eq!(o.character("fe").unwrap().progress, 97);
        assert!(o.characters.iter().all(|c| c.task != "无主任务"));
    }

    #[test]
    fn legacy_roles_shape_is_merged() {
        let mut o = office();
        let payload: StatusPayload =
            serde_json::from_str(r#"{"roles":[{"id":"security","status":"working","task":"渗透测试"}]}"#)
                .unwrap();
        merge_payload(&mut o, &payload);
        let s = o.character("security").unwrap();
        assert_eq!(s.status, Status::Working);
        assert_eq!(s.task, "渗透测试");
    }

    #[test]
    fn zone_change_drops_explicit_position() {
        let mut o = office();
        o.character_mut("qa").unwrap().position = Some(Point::new(1.0, 1.0));
        let mut rec = CharacterRecord::new("qa");
        rec.zone = Some("dev".to_string());
        merge_records(&mut o, &[rec]);
        assert!(o.character("qa").unwrap().position.is_none());
    }

    #[test]
    fn empty_strings_are_treated_as_absent() {
        let mut o = office();
        let mut rec = CharacterRecord::new("pm");
        rec.task = Some(String::new());
        rec.zone = Some(String::new());
        let report = merge_records(&mut o, &[rec]);
        let pm = o.character("pm").unwrap();
        assert_eq!(pm.task, "整理需求文档");
        assert_eq!(pm.zone, "pm");
        assert!(report.rejected_zones.is_empty());
    }
}
