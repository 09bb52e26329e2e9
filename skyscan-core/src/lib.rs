//! skyscan-core: target selection for a steerable aircraft camera.
//!
//! No async, no I/O beyond reading config and occlusion files. The
//! `skyscan-c2` service feeds ledger updates and ticks into a
//! [`DecisionEngine`] and publishes the commands it returns.

pub mod config;
pub mod engine;
pub mod filter;
pub mod geo;
pub mod ledger;
pub mod report;
pub mod selector;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{Config, ObserverConfig, ServiceConfig, SwitchMargin};
pub use engine::{
    CommandKind, CycleOutcome, DecisionEngine, EngineState, EngineStatus, PointingCommand,
    PrioritizedEntry,
};
pub use filter::{assess, is_eligible, Candidate, OcclusionMap, Rejection};
pub use geo::{look_angles, Location, LookAngles};
pub use ledger::{AircraftLedger, AircraftState};
pub use report::{parse_ledger_str, parse_ledger_update, LedgerReport, ParsedUpdate};
pub use selector::{SelectionReason, TargetSelector};
pub use types::*;
