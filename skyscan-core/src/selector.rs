//! Target selection with switch hysteresis.
//!
//! Candidates are ranked by slant distance, ties broken by the
//! lexicographically smallest id. The current target is only abandoned for a
//! closer candidate when the improvement clears the configured margin; if
//! the current target has dropped out of the candidate set a new best is
//! chosen immediately.

use std::cmp::Ordering;

use serde::Serialize;

use crate::config::SwitchMargin;
use crate::filter::Candidate;

/// Why `choose` returned what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    NoCandidates,
    /// No current target; best candidate taken.
    Initial,
    /// Current target no longer a candidate; hysteresis bypassed.
    ForcedRepick,
    /// Current target kept (it is the best, or the best is not enough better).
    Retained,
    /// Best candidate improved on the current target by at least the margin.
    Switched,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<'a> {
    pub target: Option<&'a Candidate>,
    pub reason: SelectionReason,
}

impl Selection<'_> {
    pub fn target_id(&self) -> Option<&str> {
        self.target.map(Candidate::id)
    }
}

/// Total order used for ranking: slant distance, then id.
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    a.slant_distance()
        .total_cmp(&b.slant_distance())
        .then_with(|| a.id().cmp(b.id()))
}

/// Closest candidate, by linear scan.
pub fn best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by(|a, b| compare(a, b))
}

/// All candidates in priority order.
pub fn rank(candidates: &[Candidate]) -> Vec<&Candidate> {
    let mut ranked: Vec<&Candidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| compare(a, b));
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSelector {
    margin: SwitchMargin,
}

impl TargetSelector {
    pub fn new(margin: SwitchMargin) -> Self {
        TargetSelector { margin }
    }

    pub fn margin(&self) -> SwitchMargin {
        self.margin
    }

    /// Pick a target from `candidates` given the currently tracked id.
    pub fn choose<'a>(&self, candidates: &'a [Candidate], current: Option<&str>) -> Selection<'a> {
        let Some(best) = best(candidates) else {
            return Selection {
                target: None,
                reason: SelectionReason::NoCandidates,
            };
        };

        let Some(current_id) = current else {
            return Selection {
                target: Some(best),
                reason: SelectionReason::Initial,
            };
        };

        let Some(incumbent) = candidates.iter().find(|c| c.id() == current_id) else {
            return Selection {
                target: Some(best),
                reason: SelectionReason::ForcedRepick,
            };
        };

        if best.id() != incumbent.id()
            && self
                .margin
                .permits_switch(incumbent.slant_distance(), best.slant_distance())
        {
            Selection {
                target: Some(best),
                reason: SelectionReason::Switched,
            }
        } else {
            Selection {
                target: Some(incumbent),
                reason: SelectionReason::Retained,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
