//! Raw record → canonical [`Alert`].
//!
//! Normalization is per record: a bad record is reported and skipped, the rest
//! of the batch goes through. Identity is a SHA-256 fingerprint over folded
//! (lowercased, trimmed, accent-stripped) identity fields, so the same real
//! alert keeps its fingerprint across polls and restarts.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use alert_feed::RawRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::types::{Alert, AlertLevel, AlertStatus, Snapshot};

// =============================================================================
// Field names
// =============================================================================

const ID_KEYS: &[&str] = &["id", "alert_id"];
const LINK_KEYS: &[&str] = &["link", "url", "official_link"];
const LEVEL_KEYS: &[&str] = &["level", "tipo", "nivel"];
const REGION_KEYS: &[&str] = &["region", "región"];
const AREA_KEYS: &[&str] = &["affected_areas", "areas", "comunas", "comuna"];
const THREAT_KEYS: &[&str] = &["threat_type", "threat", "causa", "cause"];
const START_KEYS: &[&str] = &["period_start", "published_at", "issued_at", "start"];
const END_KEYS: &[&str] = &["period_end", "expires_at", "end"];
const FIRST_SEEN_KEYS: &[&str] = &["first_seen_at"];
const DATE_KEYS: &[&str] = &["fecha", "date"];
const TIME_KEYS: &[&str] = &["hora", "time"];

/// Fields that change on every poll without the alert changing.
/// Kept out of `extra_fields` so they never register as an update.
const VOLATILE_KEYS: &[&str] = &[
    "last_updated",
    "updated_at",
    "actualizado",
    "scraped_at",
    "fetched_at",
    "last_seen_at",
    "content_hash",
    "contenido_hash",
    "estado_monitor",
    "status",
];

const DEFAULT_THREAT: &str = "emergency";

static RE_LINK_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})(?:-(\d{2})-(\d{2}))?").unwrap()
});

static RE_AREA_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:,|;|\s+y\s+|\s+and\s+)\s*").unwrap());

// =============================================================================
// Single record
// =============================================================================

/// Turn one raw record into an alert seen at `now`.
pub fn normalize(
    raw: &RawRecord,
    now: DateTime<Utc>,
    max_age_days: u32,
) -> Result<Alert, NormalizeError> {
    let level_text = raw
        .text(LEVEL_KEYS)
        .ok_or_else(|| NormalizeError::Malformed("missing level".into()))?;
    let level = AlertLevel::parse(&level_text)
        .ok_or_else(|| NormalizeError::Malformed(format!("unknown level `{level_text}`")))?;

    let region = raw
        .text(REGION_KEYS)
        .map(|r| collapse_whitespace(&r))
        .ok_or_else(|| NormalizeError::Malformed("missing region".into()))?;

    let threat_type = raw
        .text(THREAT_KEYS)
        .map(|t| collapse_whitespace(&t))
        .unwrap_or_else(|| DEFAULT_THREAT.to_string());

    let affected_areas = raw.value(AREA_KEYS).map(parse_areas).unwrap_or_default();
    let link = raw.text(LINK_KEYS);

    let period_start = raw
        .text(START_KEYS)
        .and_then(|s| parse_timestamp(&s))
        .or_else(|| date_and_time_fields(raw))
        .or_else(|| link.as_deref().and_then(date_from_link));
    let period_end = raw.text(END_KEYS).and_then(|s| parse_timestamp(&s));
    let first_seen = raw.text(FIRST_SEEN_KEYS).and_then(|s| parse_timestamp(&s));

    if let Some(published) = period_start.or(first_seen) {
        let age_days = (now - published).num_days();
        if age_days > i64::from(max_age_days) {
            return Err(NormalizeError::Stale {
                age_days,
                max_days: max_age_days,
            });
        }
    }

    let fingerprint = match raw.text(ID_KEYS).or_else(|| link.clone()) {
        Some(source_id) => fingerprint(&["source", &fold(&source_id)]),
        None => composite_fingerprint(&region, &threat_type, &affected_areas, level),
    };

    Ok(Alert {
        fingerprint,
        level,
        region,
        affected_areas,
        threat_type,
        period_start,
        period_end,
        extra_fields: extra_fields(raw),
        first_seen_at: now,
        last_seen_at: now,
        status: AlertStatus::Active,
    })
}

/// Fingerprint from the alert's descriptive identity: region, threat type,
/// affected areas and level. Used when the feed gives no stable id of its own.
pub fn composite_fingerprint(
    region: &str,
    threat_type: &str,
    affected_areas: &[String],
    level: AlertLevel,
) -> String {
    let mut areas: Vec<String> = affected_areas.iter().map(|a| fold(a)).collect();
    areas.sort();
    areas.dedup();
    let areas = areas.join(",");
    let level = level.to_string();
    fingerprint(&[&fold(region), &fold(threat_type), &areas, &level])
}

fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Lowercase, trim, collapse whitespace and strip the accents the feed uses.
pub(crate) fn fold(text: &str) -> String {
    collapse_whitespace(text)
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_areas(value: &Value) -> Vec<String> {
    let pieces: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => RE_AREA_SPLIT.split(s).map(str::to_string).collect(),
        _ => Vec::new(),
    };

    pieces
        .iter()
        .map(|p| collapse_whitespace(p))
        .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("no especificada"))
        .collect()
}

/// Accepts RFC 3339 and the naive formats the feed uses. Naive values are taken as UTC.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_time(NaiveTime::MIN).and_utc());
        }
    }
    None
}

/// The feed splits publication into a `fecha` (dd/mm/yyyy) and an `hora` (HH:MM).
fn date_and_time_fields(raw: &RawRecord) -> Option<DateTime<Utc>> {
    let date = raw.text(DATE_KEYS)?;
    match raw.text(TIME_KEYS).filter(|t| t.contains(':') && !t.contains('-')) {
        Some(time) => parse_timestamp(&format!("{date} {time}")),
        None => parse_timestamp(&date),
    }
}

/// Alert pages embed their publication time in the URL: `.../2025-01-15-14-30-...`.
fn date_from_link(link: &str) -> Option<DateTime<Utc>> {
    let caps = RE_LINK_DATE.captures(link)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let date = NaiveDate::from_ymd_opt(num(1)? as i32, num(2)?, num(3)?)?;
    let time = match (num(4), num(5)) {
        (Some(h), Some(m)) => NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN),
        _ => NaiveTime::MIN,
    };
    Some(date.and_time(time).and_utc())
}

fn is_consumed_key(key: &str) -> bool {
    [
        ID_KEYS,
        LEVEL_KEYS,
        REGION_KEYS,
        AREA_KEYS,
        THREAT_KEYS,
        START_KEYS,
        END_KEYS,
        FIRST_SEEN_KEYS,
        DATE_KEYS,
        TIME_KEYS,
        VOLATILE_KEYS,
    ]
    .iter()
    .any(|keys| keys.contains(&key))
}

/// Everything not consumed above, rendered as text. The link is kept under `link`.
fn extra_fields(raw: &RawRecord) -> BTreeMap<String, String> {
    let mut extra = BTreeMap::new();
    for (key, value) in raw.fields() {
        let key = key.trim().to_lowercase();
        if is_consumed_key(&key) {
            continue;
        }
        let key = if LINK_KEYS.contains(&key.as_str()) {
            "link".to_string()
        } else {
            key
        };
        if let Some(text) = render_value(value) {
            extra.entry(key).or_insert(text);
        }
    }
    extra
}

fn render_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => collapse_whitespace(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

// =============================================================================
// Batch
// =============================================================================

/// Result of normalizing a whole fetch.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub snapshot: Snapshot,
    pub malformed: usize,
    pub stale: usize,
    pub duplicates: usize,
}

/// Normalize every record, skipping (and logging) the ones that fail.
/// The first record wins when two map to the same fingerprint.
pub fn normalize_batch(
    records: &[RawRecord],
    now: DateTime<Utc>,
    max_age_days: u32,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, raw) in records.iter().enumerate() {
        match normalize(raw, now, max_age_days) {
            Ok(alert) => {
                let fingerprint = alert.fingerprint.clone();
                if !batch.snapshot.insert(alert) {
                    batch.duplicates += 1;
                    debug!(index, fingerprint = fingerprint.as_str(), "Duplicate alert in feed");
                }
            }
            Err(NormalizeError::Stale { age_days, .. }) => {
                batch.stale += 1;
                debug!(index, age_days, "Skipping stale alert");
            }
            Err(e) => {
                batch.malformed += 1;
                warn!(index, error = %e, "Skipping malformed record");
            }
        }
    }

    batch
}

/// Drop undated alerts first seen more than `max_age_days` ago.
///
/// Run after `first_seen_at` has been carried forward from the previous
/// snapshot. Dated alerts were already aged by [`normalize`]. Returns how many
/// were dropped.
pub fn expire_undated(snapshot: &mut Snapshot, now: DateTime<Utc>, max_age_days: u32) -> usize {
    let before = snapshot.len();
    snapshot.retain(|alert| {
        let age_days = (now - alert.first_seen_at).num_days();
        let expired = alert.period_start.is_none() && age_days > i64::from(max_age_days);
        if expired {
            debug!(
                fingerprint = alert.fingerprint.as_str(),
                age_days, "Undated alert aged out"
            );
        }
        !expired
    });
    before - snapshot.len()
}
