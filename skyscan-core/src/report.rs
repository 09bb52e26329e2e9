//! Inbound ledger-update payloads and boundary validation.
//!
//! A ledger update body is parsed entry by entry: a malformed entry is
//! rejected on its own and never prevents the rest of the body from being
//! applied. Only validated `AircraftState`s reach the ledger.
//!
//! Accepted body shapes:
//! - a JSON array of reports
//! - a JSON object mapping id → report
//! - a column-oriented table `{field: {id: value}}` (dataframe export)
//! - a single report object
//! - any of the above wrapped as `{"ObjectLedger": <body or JSON string>}`

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::geo;
use crate::ledger::AircraftState;
use crate::types::{normalize_id, Result, SkyscanError};

/// Wrapper key used by upstream ledger publishers.
pub const LEDGER_WRAPPER_KEY: &str = "ObjectLedger";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One aircraft report as received. Every field is optional on the wire;
/// `validate` decides what is required.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LedgerReport {
    #[serde(default, alias = "object_id", alias = "icao", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub altitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub timestamp: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub track: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub horizontal_velocity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub vertical_velocity: Option<f64>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub flight: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub squawk: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
}

/// A rejected entry and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRejection {
    /// Array index or object key of the entry.
    pub entry: String,
    pub reason: String,
}

/// Result of parsing one ledger-update body.
#[derive(Debug, Default)]
pub struct ParsedUpdate {
    pub accepted: Vec<AircraftState>,
    pub rejected: Vec<ReportRejection>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn required(value: Option<f64>, name: &str) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(SkyscanError::InvalidReport(format!("non-finite {name}: {v}"))),
        None => Err(SkyscanError::InvalidReport(format!("missing {name}"))),
    }
}

fn optional(value: Option<f64>, name: &str) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() => Err(SkyscanError::InvalidReport(format!(
            "non-finite {name}: {v}"
        ))),
        other => Ok(other),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl LedgerReport {
    /// Check required fields and ranges, producing a ledger entry.
    pub fn validate(self) -> Result<AircraftState> {
        let id = self
            .id
            .as_deref()
            .and_then(normalize_id)
            .ok_or_else(|| SkyscanError::InvalidReport("missing id".into()))?;

        let latitude = required(self.latitude, "latitude")?;
        let longitude = required(self.longitude, "longitude")?;
        let altitude = required(self.altitude, "altitude")?;
        let timestamp = required(self.timestamp, "timestamp")?;

        geo::check_position(latitude, longitude, altitude)
            .map_err(|e| SkyscanError::InvalidReport(format!("{id}: {e}")))?;

        let track = optional(self.track, "track")?;
        let speed = optional(self.horizontal_velocity, "horizontal_velocity")?;
        let vrate = optional(self.vertical_velocity, "vertical_velocity")?;
        if speed.is_some_and(|s| s < 0.0) {
            return Err(SkyscanError::InvalidReport(format!(
                "{id}: negative horizontal_velocity"
            )));
        }

        Ok(AircraftState {
            id,
            latitude,
            longitude,
            altitude,
            last_updated: timestamp,
            track_deg: track.map(|t| t.rem_euclid(360.0)),
            ground_speed_mps: speed,
            vertical_rate_mps: vrate,
            flight: non_empty(self.flight),
            squawk: non_empty(self.squawk),
            category: non_empty(self.category),
        })
    }
}

// ---------------------------------------------------------------------------
// Body parsing
// ---------------------------------------------------------------------------

/// Parse a ledger-update body from text. Fails only if the text is not JSON.
pub fn parse_ledger_str(text: &str) -> Result<ParsedUpdate> {
    let value: Value = serde_json::from_str(text)?;
    Ok(parse_ledger_update(value))
}

/// Parse a ledger-update body, validating every entry independently.
pub fn parse_ledger_update(body: Value) -> ParsedUpdate {
    let mut out = ParsedUpdate::default();
    for entry in entries(body) {
        match parse_entry(entry.value, entry.keyed_id) {
            Ok(state) => out.accepted.push(state),
            Err(e) => out.rejected.push(ReportRejection {
                entry: entry.label,
                reason: e.to_string(),
            }),
        }
    }
    out
}

/// One report object extracted from a body.
struct Entry {
    label: String,
    /// Id supplied by the enclosing map key, if any.
    keyed_id: Option<String>,
    value: Value,
}

impl Entry {
    fn indexed(index: usize, value: Value) -> Self {
        Entry {
            label: index.to_string(),
            keyed_id: None,
            value,
        }
    }

    fn keyed(key: String, value: Value) -> Self {
        Entry {
            label: key.clone(),
            keyed_id: Some(key),
            value,
        }
    }
}

fn parse_entry(value: Value, keyed_id: Option<String>) -> Result<AircraftState> {
    let mut report: LedgerReport = serde_json::from_value(value)
        .map_err(|e| SkyscanError::InvalidReport(format!("malformed entry: {e}")))?;
    if report.id.is_none() {
        report.id = keyed_id;
    }
    report.validate()
}

/// Flatten any accepted body shape into report entries.
fn entries(body: Value) -> Vec<Entry> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| Entry::indexed(i, v))
            .collect(),
        Value::Object(mut map) => {
            if let Some(inner) = map.remove(LEDGER_WRAPPER_KEY) {
                return match inner {
                    Value::String(text) => match serde_json::from_str::<Value>(&text) {
                        Ok(v) => entries(v),
                        Err(_) => vec![Entry {
                            label: LEDGER_WRAPPER_KEY.to_string(),
                            keyed_id: None,
                            value: Value::Null,
                        }],
                    },
                    other => entries(other),
                };
            }
            if is_column_table(&map) {
                return transpose_columns(map);
            }
            if is_single_report(&map) {
                return vec![Entry::indexed(0, Value::Object(map))];
            }
            map.into_iter().map(|(k, v)| Entry::keyed(k, v)).collect()
        }
        other => vec![Entry::indexed(0, other)],
    }
}

/// Keys that only a bare report carries at its top level.
const REPORT_KEYS: &[&str] = &["id", "object_id", "icao", "latitude", "longitude"];

fn is_single_report(map: &Map<String, Value>) -> bool {
    REPORT_KEYS.iter().any(|k| map.contains_key(*k))
}

fn is_column_table(map: &Map<String, Value>) -> bool {
    matches!(
        (map.get("latitude"), map.get("longitude")),
        (Some(Value::Object(_)), Some(Value::Object(_)))
    )
}

/// `{field: {id: value}}` → one keyed entry per id, ordered by id.
fn transpose_columns(columns: Map<String, Value>) -> Vec<Entry> {
    let mut rows: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for (field, column) in columns {
        if let Value::Object(cells) = column {
            for (id, cell) in cells {
                rows.entry(id).or_default().insert(field.clone(), cell);
            }
        }
    }
    rows.into_iter()
        .map(|(id, row)| Entry::keyed(id, Value::Object(row)))
        .collect()
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
