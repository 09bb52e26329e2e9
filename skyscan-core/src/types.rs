//! Shared types, error enum, and identifier helpers for skyscan-core.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// All errors produced by skyscan-core.
#[derive(Debug, Error)]
pub enum SkyscanError {
    #[error("invalid report: {0}")]
    InvalidReport(String),
    #[error("geometry error: {0}")]
    Geometry(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SkyscanError>;

// ---------------------------------------------------------------------------
// Aircraft identifiers
// ---------------------------------------------------------------------------

/// Aircraft identifier, normally the 6-char transponder hex code.
///
/// Kept as an owned string: the ledger feed is not restricted to Mode S
/// addresses, and lexicographic order on it is the selection tie-break.
pub type AircraftId = String;

/// Normalize a raw identifier: trimmed, uppercase. Returns `None` when empty.
pub fn normalize_id(raw: &str) -> Option<AircraftId> {
    let id = raw.trim();
    if id.is_empty() {
        return None;
    }
    Some(id.to_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Current wall-clock time as epoch seconds.
///
/// All engine operations take time as an explicit `f64` argument; this is
/// only used at the service boundary to stamp inputs.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
