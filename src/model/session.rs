use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PairTraces, ProbeOutcome, ProbeResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestSession {
    pub name: String,
    pub running: bool,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl TestSession {
    pub fn idle() -> Self {
        Self {
            name: String::new(),
            running: false,
            started_at: None,
        }
    }

    pub fn started(name: String, started_at: DateTime<Utc>) -> Self {
        Self {
            name,
            running: true,
            started_at: Some(started_at),
        }
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::idle()
    }
}

/// Running success/fail tally for one directed pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairCounter {
    pub success: u64,
    pub fail: u64,
}

impl PairCounter {
    pub fn record(&mut self, outcome: ProbeOutcome) {
        match outcome {
            ProbeOutcome::Success => self.success += 1,
            ProbeOutcome::Fail => self.fail += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.success + self.fail
    }
}

/// Everything the server knows about one directed pair this session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PairRecord {
    pub counter: PairCounter,
    /// Append-only, in the order reports were received
    pub history: Vec<ProbeResult>,
    pub traces: PairTraces,
}

impl PairRecord {
    pub fn push_result(&mut self, result: ProbeResult) {
        self.counter.record(result.outcome);
        self.history.push(result);
    }
}
