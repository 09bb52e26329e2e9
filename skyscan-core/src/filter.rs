//! Visibility filter: decides whether an aircraft is a tracking candidate.
//!
//! Pure: the verdict depends only on the aircraft state and the observer
//! configuration passed in. Rules are applied in order and the first failure
//! is reported:
//!
//! 1. look angles computable (otherwise `Geometry`)
//! 2. elevation within [min_tilt, max_tilt]
//! 3. elevation strictly above the occlusion horizon at that bearing, if mapped
//! 4. altitude within [min_altitude, max_altitude]
//! 5. ground range within max_range, if configured

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ObserverConfig;
use crate::geo::{self, LookAngles};
use crate::ledger::AircraftState;
use crate::types::{Result, SkyscanError};

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Why an aircraft is not eligible.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    Geometry { detail: String },
    BelowMinTilt { elevation_deg: f64 },
    AboveMaxTilt { elevation_deg: f64 },
    Occluded { elevation_deg: f64, horizon_deg: f64 },
    BelowMinAltitude { altitude_m: f64 },
    AboveMaxAltitude { altitude_m: f64 },
    OutOfRange { range_m: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Geometry { detail } => write!(f, "geometry: {detail}"),
            Rejection::BelowMinTilt { elevation_deg } => {
                write!(f, "elevation {elevation_deg:.1} below min tilt")
            }
            Rejection::AboveMaxTilt { elevation_deg } => {
                write!(f, "elevation {elevation_deg:.1} above max tilt")
            }
            Rejection::Occluded {
                elevation_deg,
                horizon_deg,
            } => write!(
                f,
                "elevation {elevation_deg:.1} behind occlusion at {horizon_deg:.1}"
            ),
            Rejection::BelowMinAltitude { altitude_m } => {
                write!(f, "altitude {altitude_m:.0} m below minimum")
            }
            Rejection::AboveMaxAltitude { altitude_m } => {
                write!(f, "altitude {altitude_m:.0} m above maximum")
            }
            Rejection::OutOfRange { range_m } => write!(f, "range {range_m:.0} m out of range"),
        }
    }
}

/// An eligible aircraft with its geometry, as fed to the selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub state: AircraftState,
    pub look: LookAngles,
    pub ground_range_m: f64,
}

impl Candidate {
    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn slant_distance(&self) -> f64 {
        self.look.slant_distance_m
    }
}

/// Full evaluation of one aircraft, kept for the prioritized ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub state: AircraftState,
    pub look: Option<LookAngles>,
    pub ground_range_m: Option<f64>,
    pub rejection: Option<Rejection>,
}

impl Assessment {
    pub fn is_eligible(&self) -> bool {
        self.rejection.is_none() && self.look.is_some()
    }

    pub fn to_candidate(&self) -> Option<Candidate> {
        if self.rejection.is_some() {
            return None;
        }
        Some(Candidate {
            state: self.state.clone(),
            look: self.look?,
            ground_range_m: self.ground_range_m?,
        })
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Evaluate every rule for one aircraft.
pub fn assess(state: &AircraftState, config: &ObserverConfig) -> Assessment {
    let obs = &config.location;
    let look = match geo::look_angles(obs, state.latitude, state.longitude, state.altitude) {
        Ok(look) => look,
        Err(e) => {
            return Assessment {
                state: state.clone(),
                look: None,
                ground_range_m: None,
                rejection: Some(Rejection::Geometry {
                    detail: e.to_string(),
                }),
            }
        }
    };
    let range = geo::haversine_m(obs.latitude, obs.longitude, state.latitude, state.longitude);

    Assessment {
        state: state.clone(),
        look: Some(look),
        ground_range_m: Some(range),
        rejection: check_rules(state, &look, range, config),
    }
}

fn check_rules(
    state: &AircraftState,
    look: &LookAngles,
    range_m: f64,
    config: &ObserverConfig,
) -> Option<Rejection> {
    let elevation_deg = look.elevation_deg;

    if elevation_deg < config.min_tilt_deg {
        return Some(Rejection::BelowMinTilt { elevation_deg });
    }
    if elevation_deg > config.max_tilt_deg {
        return Some(Rejection::AboveMaxTilt { elevation_deg });
    }
    if let Some(map) = &config.occlusion {
        let horizon_deg = map.horizon_at(look.bearing_deg);
        if elevation_deg <= horizon_deg {
            return Some(Rejection::Occluded {
                elevation_deg,
                horizon_deg,
            });
        }
    }
    if state.altitude < config.min_altitude_m {
        return Some(Rejection::BelowMinAltitude {
            altitude_m: state.altitude,
        });
    }
    if state.altitude > config.max_altitude_m {
        return Some(Rejection::AboveMaxAltitude {
            altitude_m: state.altitude,
        });
    }
    if let Some(max_range) = config.max_range_m {
        if range_m > max_range {
            return Some(Rejection::OutOfRange { range_m });
        }
    }
    None
}

/// Whether an aircraft is an eligible tracking candidate.
pub fn is_eligible(state: &AircraftState, config: &ObserverConfig) -> bool {
    assess(state, config).is_eligible()
}

// ---------------------------------------------------------------------------
// Occlusion map
// ---------------------------------------------------------------------------

/// One horizon point: structures block everything at or below `elevation`
/// for bearings up to `azimuth`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct OcclusionPoint {
    pub azimuth: f64,
    pub elevation: f64,
}

/// Azimuth-dependent horizon obstruction profile.
///
/// Models structures rising from the horizon; it cannot express overhangs.
#[derive(Debug, Clone, PartialEq)]
pub struct OcclusionMap {
    points: Vec<OcclusionPoint>,
}

impl OcclusionMap {
    pub fn new(mut points: Vec<OcclusionPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(SkyscanError::Config("occlusion map has no points".into()));
        }
        if let Some(p) = points
            .iter()
            .find(|p| !p.azimuth.is_finite() || !p.elevation.is_finite())
        {
            return Err(SkyscanError::Config(format!(
                "occlusion point not finite: {p:?}"
            )));
        }
        points.sort_by(|a, b| a.azimuth.total_cmp(&b.azimuth));
        Ok(OcclusionMap { points })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let points: Vec<OcclusionPoint> = serde_json::from_str(text)
            .map_err(|e| SkyscanError::Config(format!("occlusion map: {e}")))?;
        Self::new(points)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SkyscanError::Config(format!("occlusion map {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Obstruction elevation at `azimuth`: the first point beyond it, or the
    /// last point for the remainder of the circle.
    pub fn horizon_at(&self, azimuth: f64) -> f64 {
        self.points
            .iter()
            .find(|p| p.azimuth > azimuth)
            .or(self.points.last())
            .map(|p| p.elevation)
            .unwrap_or(f64::NEG_INFINITY)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
