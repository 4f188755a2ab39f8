//! Per-edge reachability state and the rule for when a route trace is taken.
//!
//! A trace is captured on the first cycle that disagrees with the established
//! state. Further flips are suppressed until a cycle agrees with the state
//! again, which re-arms capture. This throttles trace volume on a flapping
//! link and is intended behaviour.

use std::collections::BTreeMap;

use crate::model::{Hostname, ProbeOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeState {
    #[default]
    Unknown,
    Up,
    Down,
}

impl From<ProbeOutcome> for EdgeState {
    fn from(outcome: ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Success => EdgeState::Up,
            ProbeOutcome::Fail => EdgeState::Down,
        }
    }
}

/// What one outcome did to an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First outcome of the session; no trace
    Baseline,
    /// Same as the established state; capture re-armed
    Steady,
    /// State flipped. `capture` is false while a previous trace is still pending.
    Changed { capture: bool },
}

/// One directed edge from this agent to a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edge {
    pub state: EdgeState,
    pub diagnostic_pending: bool,
    /// Transition traces requested over this edge's lifetime
    pub captures: u32,
    /// State flips observed over this edge's lifetime
    pub changes: u32,
}

impl Edge {
    pub fn observe(&mut self, outcome: ProbeOutcome) -> Observation {
        let next = EdgeState::from(outcome);
        match self.state {
            EdgeState::Unknown => {
                self.state = next;
                Observation::Baseline
            }
            current if current == next => {
                self.diagnostic_pending = false;
                Observation::Steady
            }
            _ => {
                let capture = !self.diagnostic_pending;
                if capture {
                    self.diagnostic_pending = true;
                    self.captures += 1;
                }
                self.changes += 1;
                self.state = next;
                Observation::Changed { capture }
            }
        }
    }
}

/// All edges owned by this agent for the current session.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    edges: BTreeMap<Hostname, Edge>,
    initial_captured: bool,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every edge and re-arm the initial sweep.
    pub fn reset(&mut self) {
        self.edges.clear();
        self.initial_captured = false;
    }

    pub fn needs_initial(&self) -> bool {
        !self.initial_captured
    }

    pub fn mark_initial_captured(&mut self) {
        self.initial_captured = true;
    }

    pub fn edge(&self, target: &Hostname) -> Option<&Edge> {
        self.edges.get(target)
    }

    /// Take an edge out for a probe task. Unseen targets start `Unknown`.
    pub fn checkout(&mut self, target: &Hostname) -> Edge {
        self.edges.remove(target).unwrap_or_default()
    }

    pub fn checkin(&mut self, target: Hostname, edge: Edge) {
        self.edges.insert(target, edge);
    }
}
