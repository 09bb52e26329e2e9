//! Live aircraft ledger with staleness tracking.
//!
//! Pure state with no I/O and no clock. Every operation that depends on time takes
//! `now` (epoch seconds) from the caller, so a decision cycle evaluates one
//! consistent instant.

use std::collections::HashMap;

use serde::Serialize;

use crate::geo;
use crate::types::AircraftId;

/// Default staleness threshold in seconds.
pub const STALE_TIMEOUT: f64 = 60.0;

// ---------------------------------------------------------------------------
// Aircraft state
// ---------------------------------------------------------------------------

/// Latest known state for a single tracked aircraft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftState {
    pub id: AircraftId,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above mean sea level.
    pub altitude: f64,
    /// Epoch seconds of the most recent report.
    pub last_updated: f64,

    // Kinematics, when the feed provides them
    pub track_deg: Option<f64>,
    pub ground_speed_mps: Option<f64>,
    pub vertical_rate_mps: Option<f64>,

    // Pass-through metadata
    pub flight: Option<String>,
    pub squawk: Option<String>,
    pub category: Option<String>,
}

impl AircraftState {
    pub fn new(
        id: impl Into<AircraftId>,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        last_updated: f64,
    ) -> Self {
        AircraftState {
            id: id.into(),
            latitude,
            longitude,
            altitude,
            last_updated,
            track_deg: None,
            ground_speed_mps: None,
            vertical_rate_mps: None,
            flight: None,
            squawk: None,
            category: None,
        }
    }

    pub fn with_velocity(
        mut self,
        track_deg: f64,
        ground_speed_mps: f64,
        vertical_rate_mps: f64,
    ) -> Self {
        self.track_deg = Some(track_deg);
        self.ground_speed_mps = Some(ground_speed_mps);
        self.vertical_rate_mps = Some(vertical_rate_mps);
        self
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.last_updated
    }

    pub fn is_stale(&self, now: f64, stale_after: f64) -> bool {
        self.age(now) > stale_after
    }

    pub fn has_velocity(&self) -> bool {
        self.track_deg.is_some() && self.ground_speed_mps.is_some()
    }

    /// Dead-reckoned copy of this state at time `at`.
    ///
    /// Entries without track/speed are returned unchanged. Timestamps are
    /// left as reported so staleness is never masked by prediction.
    pub fn projected(&self, at: f64) -> AircraftState {
        let (Some(track), Some(speed)) = (self.track_deg, self.ground_speed_mps) else {
            return self.clone();
        };
        let dt = at - self.last_updated;
        if dt <= 0.0 {
            return self.clone();
        }
        let (lat, lon, alt) = geo::project(
            self.latitude,
            self.longitude,
            self.altitude,
            track,
            speed,
            self.vertical_rate_mps.unwrap_or(0.0),
            dt,
        );
        AircraftState {
            latitude: lat,
            longitude: lon,
            altitude: alt,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Mapping of aircraft id → latest known state.
#[derive(Debug, Default)]
pub struct AircraftLedger {
    aircraft: HashMap<AircraftId, AircraftState>,

    // Counters
    pub total_upserts: u64,
    pub total_evicted: u64,
}

/// Read-consistent copy of the ledger, ordered by id.
pub type LedgerSnapshot = Vec<AircraftState>;

impl AircraftLedger {
    pub fn new() -> Self {
        AircraftLedger::default()
    }

    /// Insert or replace the entry keyed by `state.id`. Returns `true` if the
    /// id was not previously tracked.
    pub fn upsert(&mut self, state: AircraftState) -> bool {
        self.total_upserts += 1;
        self.aircraft.insert(state.id.clone(), state).is_none()
    }

    /// Remove every entry not updated within `stale_after` seconds of `now`.
    /// Returns the removed ids, sorted.
    pub fn evict_stale(&mut self, now: f64, stale_after: f64) -> Vec<AircraftId> {
        let mut stale: Vec<AircraftId> = self
            .aircraft
            .values()
            .filter(|ac| ac.is_stale(now, stale_after))
            .map(|ac| ac.id.clone())
            .collect();
        for id in &stale {
            self.aircraft.remove(id);
        }
        stale.sort();
        self.total_evicted += stale.len() as u64;
        stale
    }

    /// Owned copy of all entries, sorted by id.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut entries: Vec<AircraftState> = self.aircraft.values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub fn get(&self, id: &str) -> Option<&AircraftState> {
        self.aircraft.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.aircraft.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
