//! Decision engine: owns the ledger and current target, runs decision cycles.
//!
//! Every entry point takes `now` from the caller and returns a
//! [`CycleOutcome`] describing what should be published. The engine itself
//! never performs I/O, so the service wraps it in a single task that
//! serializes updates, ticks, and overrides.

use serde::Serialize;

use crate::config::ObserverConfig;
use crate::filter::{self, Assessment, Candidate, Rejection};
use crate::ledger::{AircraftLedger, AircraftState};
use crate::selector::{self, SelectionReason, TargetSelector};
use crate::types::{normalize_id, AircraftId, Result};

// ---------------------------------------------------------------------------
// Commands and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    NoTarget,
    Tracking(AircraftId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    NewTarget,
    Refresh,
    Idle,
}

/// Outbound pointing command. Position fields are null for `Idle`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointingCommand {
    pub kind: CommandKind,
    pub target_id: Option<AircraftId>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub slant_distance: Option<f64>,
    pub elevation: Option<f64>,
    pub bearing: Option<f64>,
    pub timestamp: f64,
    #[serde(rename = "override")]
    pub is_override: bool,
    pub flight: Option<String>,
    pub squawk: Option<String>,
}

impl PointingCommand {
    fn point_at(kind: CommandKind, target: &Candidate, now: f64, is_override: bool) -> Self {
        PointingCommand {
            kind,
            target_id: Some(target.state.id.clone()),
            latitude: Some(target.state.latitude),
            longitude: Some(target.state.longitude),
            altitude: Some(target.state.altitude),
            slant_distance: Some(target.look.slant_distance_m),
            elevation: Some(target.look.elevation_deg),
            bearing: Some(target.look.bearing_deg),
            timestamp: now,
            is_override,
            flight: target.state.flight.clone(),
            squawk: target.state.squawk.clone(),
        }
    }

    pub fn idle(now: f64) -> Self {
        PointingCommand {
            kind: CommandKind::Idle,
            target_id: None,
            latitude: None,
            longitude: None,
            altitude: None,
            slant_distance: None,
            elevation: None,
            bearing: None,
            timestamp: now,
            is_override: false,
            flight: None,
            squawk: None,
        }
    }
}

/// One row of the prioritized ledger: eligible aircraft first in selection
/// order, then rejected aircraft by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritizedEntry {
    /// 1-based priority among eligible aircraft.
    pub rank: Option<usize>,
    pub id: AircraftId,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub last_updated: f64,
    pub slant_distance: Option<f64>,
    pub elevation: Option<f64>,
    pub bearing: Option<f64>,
    pub ground_range: Option<f64>,
    pub eligible: bool,
    pub rejection: Option<Rejection>,
    pub selected: bool,
    pub flight: Option<String>,
    pub squawk: Option<String>,
}

impl PrioritizedEntry {
    fn from_assessment(a: &Assessment, rank: Option<usize>, selected: bool) -> Self {
        PrioritizedEntry {
            rank,
            id: a.state.id.clone(),
            latitude: a.state.latitude,
            longitude: a.state.longitude,
            altitude: a.state.altitude,
            last_updated: a.state.last_updated,
            slant_distance: a.look.map(|l| l.slant_distance_m),
            elevation: a.look.map(|l| l.elevation_deg),
            bearing: a.look.map(|l| l.bearing_deg),
            ground_range: a.ground_range_m,
            eligible: a.is_eligible(),
            rejection: a.rejection.clone(),
            selected,
            flight: a.state.flight.clone(),
            squawk: a.state.squawk.clone(),
        }
    }
}

/// Everything a decision cycle produced.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub commands: Vec<PointingCommand>,
    pub prioritized: Vec<PrioritizedEntry>,
    pub evicted: Vec<AircraftId>,
    pub reason: Option<SelectionReason>,
}

impl CycleOutcome {
    pub fn new_target(&self) -> Option<&PointingCommand> {
        self.commands.iter().find(|c| c.kind == CommandKind::NewTarget)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    pub cycles: u64,
    pub updates_applied: u64,
    pub aircraft_evicted: u64,
    pub commands_emitted: u64,
    pub target_changes: u64,
}

/// Read-only view published to observers of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub target_id: Option<AircraftId>,
    pub override_id: Option<AircraftId>,
    pub tracked: usize,
    pub last_command: Option<PointingCommand>,
    pub prioritized: Vec<PrioritizedEntry>,
    pub stats: EngineStats,
    pub updated_at: f64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct DecisionEngine {
    config: ObserverConfig,
    selector: TargetSelector,
    ledger: AircraftLedger,
    state: EngineState,
    override_id: Option<AircraftId>,
    last_command: Option<PointingCommand>,
    last_prioritized: Vec<PrioritizedEntry>,
    last_cycle_at: f64,
    stats: EngineStats,
}

impl DecisionEngine {
    /// Build an engine. Refuses self-contradictory configuration.
    pub fn new(config: ObserverConfig) -> Result<Self> {
        config.validate()?;
        Ok(DecisionEngine {
            selector: TargetSelector::new(config.switch_margin),
            config,
            ledger: AircraftLedger::new(),
            state: EngineState::NoTarget,
            override_id: None,
            last_command: None,
            last_prioritized: Vec::new(),
            last_cycle_at: 0.0,
            stats: EngineStats::default(),
        })
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn current_target(&self) -> Option<&str> {
        match &self.state {
            EngineState::Tracking(id) => Some(id),
            EngineState::NoTarget => None,
        }
    }

    pub fn override_id(&self) -> Option<&str> {
        self.override_id.as_deref()
    }

    pub fn ledger(&self) -> &AircraftLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn last_command(&self) -> Option<&PointingCommand> {
        self.last_command.as_ref()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            target_id: self.current_target().map(str::to_string),
            override_id: self.override_id.clone(),
            tracked: self.ledger.len(),
            last_command: self.last_command.clone(),
            prioritized: self.last_prioritized.clone(),
            stats: self.stats.clone(),
            updated_at: self.last_cycle_at,
        }
    }

    /// Apply a validated report without running a cycle.
    pub fn upsert(&mut self, state: AircraftState) {
        if self.ledger.upsert(state) {
            tracing::debug!(tracked = self.ledger.len(), "new aircraft in ledger");
        }
        self.stats.updates_applied += 1;
    }

    /// Apply one report, then run a decision cycle.
    pub fn handle_update(&mut self, state: AircraftState, now: f64) -> CycleOutcome {
        self.upsert(state);
        self.run_cycle(now)
    }

    /// Apply a batch of reports atomically, then run a single cycle.
    pub fn apply_batch(&mut self, states: Vec<AircraftState>, now: f64) -> CycleOutcome {
        for state in states {
            self.upsert(state);
        }
        self.run_cycle(now)
    }

    /// Remove aircraft older than `stale_after` without running a cycle.
    pub fn evict_stale(&mut self, now: f64) -> Vec<AircraftId> {
        let evicted = self.ledger.evict_stale(now, self.config.stale_after);
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), ids = ?evicted, "evicted stale aircraft");
            self.stats.aircraft_evicted += evicted.len() as u64;
        }
        evicted
    }

    /// Periodic tick: evict stale aircraft, then run a decision cycle.
    pub fn tick(&mut self, now: f64) -> CycleOutcome {
        let evicted = self.evict_stale(now);
        let mut outcome = self.run_cycle(now);
        outcome.evicted = evicted;
        outcome
    }

    /// Set or clear the manual override without running a cycle.
    ///
    /// An override pins the named aircraft regardless of visibility and
    /// hysteresis for as long as it remains in the ledger.
    pub fn pin_override(&mut self, id: Option<&str>) {
        self.override_id = id.and_then(normalize_id);
        match &self.override_id {
            Some(id) => tracing::info!(%id, "manual override set"),
            None => tracing::info!("manual override cleared"),
        }
    }

    /// Set or clear the manual override, then run a decision cycle.
    pub fn set_override(&mut self, id: Option<&str>, now: f64) -> CycleOutcome {
        self.pin_override(id);
        self.run_cycle(now)
    }

    /// Stop tracking: clear target and override, return the idle command.
    pub fn release(&mut self, now: f64) -> PointingCommand {
        if let EngineState::Tracking(id) = &self.state {
            tracing::info!(%id, "releasing target");
        }
        self.state = EngineState::NoTarget;
        self.override_id = None;
        let cmd = PointingCommand::idle(now);
        self.stats.commands_emitted += 1;
        self.last_command = Some(cmd.clone());
        cmd
    }

    /// One decision cycle over a snapshot of the ledger.
    pub fn run_cycle(&mut self, now: f64) -> CycleOutcome {
        self.stats.cycles += 1;
        self.last_cycle_at = now;

        let at = now + self.config.lead_time;
        let assessments: Vec<Assessment> = self
            .ledger
            .snapshot()
            .into_iter()
            .filter(|ac| !ac.is_stale(now, self.config.stale_after))
            .map(|ac| {
                let ac = if self.config.lead_time > 0.0 {
                    ac.projected(at)
                } else {
                    ac
                };
                filter::assess(&ac, &self.config)
            })
            .collect();

        for a in &assessments {
            if let Some(r) = &a.rejection {
                tracing::trace!(id = %a.state.id, reason = %r, "aircraft ineligible");
            }
        }

        let candidates: Vec<Candidate> =
            assessments.iter().filter_map(Assessment::to_candidate).collect();

        let (target, is_override, reason) = match self.override_target(&assessments) {
            Some(target) => (Some(target), true, None),
            None => {
                let sel = self.selector.choose(&candidates, self.current_target());
                (sel.target.cloned(), false, Some(sel.reason))
            }
        };

        let commands = self.transition(target.as_ref(), is_override, now);
        let selected = target.as_ref().map(Candidate::id);
        let prioritized = prioritize(&assessments, &candidates, selected);
        self.last_prioritized = prioritized.clone();

        tracing::debug!(
            candidates = candidates.len(),
            tracked = self.ledger.len(),
            target = ?self.current_target(),
            "decision cycle"
        );

        CycleOutcome {
            commands,
            prioritized,
            evicted: Vec::new(),
            reason,
        }
    }

    /// Resolve the override to a pointable target, clearing it once the
    /// aircraft has left the ledger.
    fn override_target(&mut self, assessments: &[Assessment]) -> Option<Candidate> {
        let id = self.override_id.as_deref()?;
        let Some(a) = assessments.iter().find(|a| a.state.id == id) else {
            tracing::info!(%id, "override target no longer tracked, clearing override");
            self.override_id = None;
            return None;
        };
        // Unpointable this cycle (bad geometry); fall back to normal selection
        Some(Candidate {
            state: a.state.clone(),
            look: a.look?,
            ground_range_m: a.ground_range_m?,
        })
    }

    fn transition(
        &mut self,
        target: Option<&Candidate>,
        is_override: bool,
        now: f64,
    ) -> Vec<PointingCommand> {
        let command = match (self.state.clone(), target) {
            (EngineState::NoTarget, None) => None,
            (EngineState::Tracking(id), None) => {
                tracing::info!(%id, "no eligible target, going idle");
                self.state = EngineState::NoTarget;
                Some(PointingCommand::idle(now))
            }
            (EngineState::Tracking(id), Some(t)) if id == t.id() => {
                let due = self
                    .last_command
                    .as_ref()
                    .map_or(true, |c| now - c.timestamp >= self.config.refresh_interval);
                due.then(|| PointingCommand::point_at(CommandKind::Refresh, t, now, is_override))
            }
            (_, Some(t)) => {
                tracing::info!(
                    id = t.id(),
                    previous = ?self.current_target(),
                    slant_m = t.slant_distance().round(),
                    elevation = t.look.elevation_deg,
                    is_override,
                    "new target"
                );
                self.state = EngineState::Tracking(t.id().to_string());
                self.stats.target_changes += 1;
                Some(PointingCommand::point_at(CommandKind::NewTarget, t, now, is_override))
            }
        };

        match command {
            Some(cmd) => {
                self.stats.commands_emitted += 1;
                self.last_command = Some(cmd.clone());
                vec![cmd]
            }
            None => Vec::new(),
        }
    }
}

fn prioritize(
    assessments: &[Assessment],
    candidates: &[Candidate],
    selected: Option<&str>,
) -> Vec<PrioritizedEntry> {
    let mut out: Vec<PrioritizedEntry> = Vec::with_capacity(assessments.len());

    // Assessments come from the snapshot, so they are sorted by unique id
    for (i, c) in selector::rank(candidates).into_iter().enumerate() {
        if let Ok(pos) = assessments.binary_search_by(|a| a.state.id.as_str().cmp(c.id())) {
            let a = &assessments[pos];
            out.push(PrioritizedEntry::from_assessment(a, Some(i + 1), selected == Some(c.id())));
        }
    }
    for a in assessments.iter().filter(|a| !a.is_eligible()) {
        let is_selected = selected == Some(a.state.id.as_str());
        out.push(PrioritizedEntry::from_assessment(a, None, is_selected));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwitchMargin;
    use crate::geo::{self, Location};

    const ALT: f64 = 3000.0;

    fn config() -> ObserverConfig {
        ObserverConfig {
            location: Location::new(0.0, 0.0, 0.0),
            min_tilt_deg: 5.0,
            min_altitude_m: 100.0,
            max_altitude_m: 12_000.0,
            switch_margin: SwitchMargin::Absolute(500.0),
            refresh_interval: 0.0,
            ..ObserverConfig::default()
        }
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(config()).unwrap()
    }

    /// Aircraft at `ALT` placed so its slant distance from the origin is
    /// approximately `slant` along `bearing`.
    fn at_slant(id: &str, slant: f64, bearing: f64, ts: f64) -> AircraftState {
        let ground = (slant * slant - ALT * ALT).sqrt();
        let (lat, lon, _) = geo::project(0.0, 0.0, ALT, bearing, ground, 0.0, 1.0);
        AircraftState::new(id, lat, lon, ALT, ts)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let cfg = ObserverConfig {
            min_altitude_m: 5000.0,
            max_altitude_m: 100.0,
            ..config()
        };
        assert!(DecisionEngine::new(cfg).is_err());
    }

    #[test]
    fn test_initial_state() {
        let e = engine();
        assert_eq!(e.state(), &EngineState::NoTarget);
        assert!(e.ledger().is_empty());
        assert!(e.last_command().is_none());
    }

    #[test]
    fn test_first_update_emits_new_target() {
        let mut e = engine();
        let out = e.handle_update(at_slant("A1B2C3", 10_000.0, 45.0, 1.0), 1.0);

        assert_eq!(out.commands.len(), 1);
        let cmd = &out.commands[0];
        assert_eq!(cmd.kind, CommandKind::NewTarget);
        assert_eq!(cmd.target_id.as_deref(), Some("A1B2C3"));
        assert!((cmd.slant_distance.unwrap() - 10_000.0).abs() < 20.0);
        assert!((cmd.bearing.unwrap() - 45.0).abs() < 0.5);
        assert_eq!(cmd.altitude, Some(ALT));
        assert_eq!(cmd.timestamp, 1.0);
        assert!(!cmd.is_override);
        assert_eq!(e.state(), &EngineState::Tracking("A1B2C3".into()));
        assert_eq!(out.reason, Some(SelectionReason::Initial));
    }

    #[test]
    fn test_worked_example() {
        let mut e = engine();

        let out = e.apply_batch(
            vec![
                at_slant("A", 10_000.0, 0.0, 1.0),
                at_slant("B", 9_800.0, 90.0, 1.0),
            ],
            1.0,
        );
        assert_eq!(out.new_target().and_then(|c| c.target_id.as_deref()), Some("B"));

        let out = e.handle_update(at_slant("A", 9_000.0, 0.0, 2.0), 2.0);
        assert_eq!(out.new_target().and_then(|c| c.target_id.as_deref()), Some("A"));
        assert_eq!(out.reason, Some(SelectionReason::Switched));

        let out = e.handle_update(at_slant("B", 8_950.0, 90.0, 3.0), 3.0);
        assert!(out.new_target().is_none());
        assert_eq!(e.current_target(), Some("A"));
        assert_eq!(out.reason, Some(SelectionReason::Retained));
    }

    #[test]
    fn test_refresh_is_rate_bounded() {
        let mut e = DecisionEngine::new(ObserverConfig {
            refresh_interval: 5.0,
            ..config()
        })
        .unwrap();

        let out = e.handle_update(at_slant("A", 9_000.0, 0.0, 1.0), 1.0);
        assert_eq!(out.commands[0].kind, CommandKind::NewTarget);

        for t in [2.0, 3.0, 5.9] {
            let out = e.handle_update(at_slant("A", 9_000.0, 0.0, t), t);
            assert!(out.commands.is_empty(), "unexpected refresh at {t}");
        }

        let out = e.handle_update(at_slant("A", 8_900.0, 0.0, 6.0), 6.0);
        assert_eq!(out.commands.len(), 1);
        assert_eq!(out.commands[0].kind, CommandKind::Refresh);
        assert!(out.commands[0].slant_distance.unwrap() < 9_000.0);
    }

    #[test]
    fn test_stale_target_goes_idle() {
        let mut e = engine();
        e.handle_update(at_slant("A", 9_000.0, 0.0, 0.0), 0.0);

        let out = e.tick(30.0);
        assert!(out.evicted.is_empty());
        assert_eq!(e.current_target(), Some("A"));

        let out = e.tick(61.0);
        assert_eq!(out.evicted, vec!["A".to_string()]);
        assert_eq!(out.commands.len(), 1);
        assert_eq!(out.commands[0].kind, CommandKind::Idle);
        assert_eq!(out.commands[0].target_id, None);
        assert_eq!(e.state(), &EngineState::NoTarget);

        // Idle is emitted once
        assert!(e.tick(62.0).commands.is_empty());
    }

    #[test]
    fn test_stale_target_forces_repick() {
        let mut e = engine();
        e.handle_update(at_slant("A", 5_000.0, 0.0, 0.0), 0.0);
        e.handle_update(at_slant("B", 20_000.0, 90.0, 50.0), 50.0);
        assert_eq!(e.current_target(), Some("A"));

        let out = e.tick(61.0);
        assert_eq!(out.evicted, vec!["A".to_string()]);
        assert_eq!(out.new_target().and_then(|c| c.target_id.as_deref()), Some("B"));
        assert_eq!(out.reason, Some(SelectionReason::ForcedRepick));
    }

    #[test]
    fn test_stale_excluded_before_eviction() {
        let mut e = engine();
        e.handle_update(at_slant("A", 5_000.0, 0.0, 0.0), 0.0);

        // No tick has run, but A is older than stale_after at t=70
        let out = e.handle_update(at_slant("B", 20_000.0, 90.0, 70.0), 70.0);
        assert_eq!(e.current_target(), Some("B"));
        assert!(out.prioritized.iter().all(|p| p.id != "A"));
        assert!(e.ledger().contains("A"));
    }

    #[test]
    fn test_ineligible_target_forces_repick() {
        let mut e = engine();
        e.apply_batch(
            vec![
                at_slant("A", 8_000.0, 0.0, 1.0),
                at_slant("B", 8_100.0, 180.0, 1.0),
            ],
            1.0,
        );
        assert_eq!(e.current_target(), Some("A"));

        // A climbs above the ceiling
        let mut climbed = at_slant("A", 8_000.0, 0.0, 2.0);
        climbed.altitude = 13_000.0;
        let out = e.handle_update(climbed, 2.0);
        assert_eq!(e.current_target(), Some("B"));
        assert_eq!(out.reason, Some(SelectionReason::ForcedRepick));

        let a = out.prioritized.iter().find(|p| p.id == "A").unwrap();
        assert!(!a.eligible);
        assert!(matches!(a.rejection, Some(Rejection::AboveMaxAltitude { .. })));
    }

    #[test]
    fn test_geometry_error_does_not_abort_cycle() {
        let mut e = engine();
        let out = e.apply_batch(
            vec![
                AircraftState::new("AAAAAA", 0.0, 0.0, 0.0, 1.0),
                at_slant("BBBBBB", 9_000.0, 0.0, 1.0),
            ],
            1.0,
        );
        assert_eq!(e.current_target(), Some("BBBBBB"));
        let bad = out.prioritized.iter().find(|p| p.id == "AAAAAA").unwrap();
        assert!(matches!(bad.rejection, Some(Rejection::Geometry { .. })));
        assert_eq!(bad.rank, None);
    }

    #[test]
    fn test_prioritized_order() {
        let mut e = engine();
        let out = e.apply_batch(
            vec![
                at_slant("C", 12_000.0, 0.0, 1.0),
                at_slant("A", 15_000.0, 90.0, 1.0),
                at_slant("B", 9_000.0, 180.0, 1.0),
                AircraftState::new("D", 0.01, 0.0, 50.0, 1.0),
            ],
            1.0,
        );
        let ids: Vec<&str> = out.prioritized.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C", "A", "D"]);
        assert_eq!(out.prioritized[0].rank, Some(1));
        assert!(out.prioritized[0].selected);
        assert!(!out.prioritized[1].selected);
        assert_eq!(out.prioritized[3].rank, None);
    }

    #[test]
    fn test_prioritized_large_ledger() {
        let mut e = engine();
        // Farther aircraft get smaller ids, so rank order reverses id order
        let batch: Vec<AircraftState> = (0..300)
            .map(|i| at_slant(&format!("AC{i:03}"), 15_000.0 - 20.0 * i as f64, 0.0, 1.0))
            .collect();
        let out = e.apply_batch(batch, 1.0);

        assert_eq!(out.prioritized.len(), 300);
        for (i, entry) in out.prioritized.iter().enumerate() {
            assert_eq!(entry.rank, Some(i + 1));
            assert_eq!(entry.id, format!("AC{:03}", 299 - i));
        }
        assert!(out.prioritized[0].selected);
        assert_eq!(out.prioritized.iter().filter(|p| p.selected).count(), 1);
    }

    #[test]
    fn test_override_pins_target_until_evicted() {
        let mut e = engine();
        e.apply_batch(
            vec![
                at_slant("NEAR", 5_000.0, 0.0, 0.0),
                at_slant("FAR", 20_000.0, 90.0, 0.0),
            ],
            0.0,
        );
        assert_eq!(e.current_target(), Some("NEAR"));

        let out = e.set_override(Some("far"), 1.0);
        let cmd = out.new_target().unwrap();
        assert_eq!(cmd.target_id.as_deref(), Some("FAR"));
        assert!(cmd.is_override);
        assert_eq!(e.override_id(), Some("FAR"));

        // NEAR keeps reporting; FAR goes silent and is evicted
        e.handle_update(at_slant("NEAR", 5_000.0, 0.0, 50.0), 50.0);
        assert_eq!(e.current_target(), Some("FAR"));

        let out = e.tick(61.0);
        assert_eq!(out.evicted, vec!["FAR".to_string()]);
        assert_eq!(e.override_id(), None);
        assert_eq!(e.current_target(), Some("NEAR"));
    }

    #[test]
    fn test_override_unknown_id_is_cleared() {
        let mut e = engine();
        e.handle_update(at_slant("A", 9_000.0, 0.0, 1.0), 1.0);
        e.set_override(Some("ZZZZZZ"), 2.0);
        assert_eq!(e.override_id(), None);
        assert_eq!(e.current_target(), Some("A"));
    }

    #[test]
    fn test_override_cleared_returns_to_selection() {
        let mut e = engine();
        e.apply_batch(
            vec![
                at_slant("NEAR", 5_000.0, 0.0, 0.0),
                at_slant("FAR", 20_000.0, 90.0, 0.0),
            ],
            0.0,
        );
        e.set_override(Some("FAR"), 1.0);
        let out = e.set_override(None, 2.0);
        assert_eq!(out.new_target().and_then(|c| c.target_id.as_deref()), Some("NEAR"));
        assert_eq!(out.reason, Some(SelectionReason::Switched));
    }

    #[test]
    fn test_lead_time_projects_position() {
        let mut e = DecisionEngine::new(ObserverConfig {
            lead_time: 10.0,
            ..config()
        })
        .unwrap();
        // Eastbound at 100 m/s from due north
        let ac = at_slant("A", 9_000.0, 0.0, 1.0).with_velocity(90.0, 100.0, 0.0);
        let lon0 = ac.longitude;
        let out = e.handle_update(ac, 1.0);

        let cmd = out.new_target().unwrap();
        let lat = cmd.latitude.unwrap();
        let moved = geo::haversine_m(lat, lon0, lat, cmd.longitude.unwrap());
        assert!((moved - 1000.0).abs() < 5.0);
        assert!(cmd.bearing.unwrap() > 0.0);
    }

    #[test]
    fn test_release_goes_idle() {
        let mut e = engine();
        e.handle_update(at_slant("A", 9_000.0, 0.0, 1.0), 1.0);
        e.pin_override(Some("A"));

        let cmd = e.release(2.0);
        assert_eq!(cmd.kind, CommandKind::Idle);
        assert_eq!(e.state(), &EngineState::NoTarget);
        assert_eq!(e.override_id(), None);
        assert_eq!(e.last_command(), Some(&cmd));
    }

    #[test]
    fn test_independent_instances() {
        let mut a = engine();
        let b = engine();
        a.handle_update(at_slant("A", 9_000.0, 0.0, 1.0), 1.0);
        assert_eq!(a.ledger().len(), 1);
        assert!(b.ledger().is_empty());
        assert_eq!(b.current_target(), None);
    }

    #[test]
    fn test_status_reflects_last_cycle() {
        let mut e = engine();
        e.handle_update(at_slant("A", 9_000.0, 0.0, 1.0), 1.0);
        let status = e.status();
        assert_eq!(status.target_id.as_deref(), Some("A"));
        assert_eq!(status.tracked, 1);
        assert_eq!(status.prioritized.len(), 1);
        assert_eq!(status.stats.cycles, 1);
        assert_eq!(status.stats.commands_emitted, 1);
        assert_eq!(status.updated_at, 1.0);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["last_command"]["kind"], "new_target");
        assert_eq!(json["last_command"]["override"], false);
    }
}
