//! Snapshot comparison.
//!
//! Each fingerprint in `prev ∪ next` produces exactly one [`ChangeEvent`]. Matching is
//! a hash lookup per fingerprint, so a diff is linear in the size of both snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::{Alert, ChangeEvent, FieldChange, Snapshot};

/// Classify every alert in `prev` and `next`.
///
/// Events come out NEW, UPDATED, CANCELLED, UNCHANGED; within a group, most severe
/// first, ties broken by fingerprint.
pub fn diff_snapshots(prev: &Snapshot, next: &Snapshot) -> Vec<ChangeEvent> {
    let mut events = Vec::with_capacity(prev.len().max(next.len()));

    for alert in next.iter() {
        let event = match prev.get(&alert.fingerprint) {
            None => ChangeEvent::new_alert(alert.clone()),
            Some(old) => {
                let changes = field_changes(old, alert);
                if changes.is_empty() {
                    ChangeEvent::unchanged(alert.clone())
                } else {
                    ChangeEvent::updated(alert.clone(), changes)
                }
            }
        };
        events.push(event);
    }

    for alert in prev.iter() {
        if !next.contains(&alert.fingerprint) {
            events.push(ChangeEvent::cancelled(alert.clone()));
        }
    }

    events.sort_by(|a, b| {
        a.kind
            .rank()
            .cmp(&b.kind.rank())
            .then_with(|| b.alert.level.cmp(&a.alert.level))
            .then_with(|| a.alert.fingerprint.cmp(&b.alert.fingerprint))
    });
    events
}

/// Copy engine-maintained timestamps from the previous snapshot into the new one.
///
/// Alerts seen before keep their original `first_seen_at`; every alert in `next`
/// gets `last_seen_at = seen_at`.
pub fn carry_forward(prev: &Snapshot, next: &mut Snapshot, seen_at: DateTime<Utc>) {
    for alert in next.iter_mut() {
        if let Some(old) = prev.get(&alert.fingerprint) {
            alert.first_seen_at = old.first_seen_at;
        }
        alert.last_seen_at = seen_at;
    }
}

/// Field-level differences. Engine timestamps and status are not compared.
fn field_changes(old: &Alert, new: &Alert) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();

    compare(
        &mut changes,
        "level",
        Some(old.level.to_string()),
        Some(new.level.to_string()),
    );
    compare(
        &mut changes,
        "region",
        Some(old.region.clone()),
        Some(new.region.clone()),
    );
    compare(
        &mut changes,
        "threat_type",
        Some(old.threat_type.clone()),
        Some(new.threat_type.clone()),
    );
    compare(
        &mut changes,
        "affected_areas",
        areas(&old.affected_areas),
        areas(&new.affected_areas),
    );
    compare(
        &mut changes,
        "period_start",
        old.period_start.map(|t| t.to_rfc3339()),
        new.period_start.map(|t| t.to_rfc3339()),
    );
    compare(
        &mut changes,
        "period_end",
        old.period_end.map(|t| t.to_rfc3339()),
        new.period_end.map(|t| t.to_rfc3339()),
    );

    for key in old.extra_fields.keys().chain(new.extra_fields.keys()) {
        compare(
            &mut changes,
            key,
            old.extra_fields.get(key).cloned(),
            new.extra_fields.get(key).cloned(),
        );
    }

    changes
}

fn compare(
    changes: &mut BTreeMap<String, FieldChange>,
    field: &str,
    old: Option<String>,
    new: Option<String>,
) {
    if old != new {
        changes.insert(field.to_string(), FieldChange { old, new });
    }
}

fn areas(list: &[String]) -> Option<String> {
    (!list.is_empty()).then(|| list.join(", "))
}
