use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProbeOutcome {
    Success,
    Fail,
}

impl ProbeOutcome {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            ProbeOutcome::Success
        } else {
            ProbeOutcome::Fail
        }
    }
}

/// One reachability check, as produced by the agent and reported on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    #[serde(rename = "result")]
    pub outcome: ProbeOutcome,
    pub timestamp: DateTime<Utc>,
    /// Round-trip time in milliseconds
    #[serde(default)]
    pub latency: Option<f64>,
    pub source_ip: String,
    #[serde(rename = "destination_ip")]
    pub dest_ip: String,
}

impl ProbeResult {
    pub fn success(timestamp: DateTime<Utc>, latency: Option<f64>, source_ip: &str, dest_ip: &str) -> Self {
        Self {
            outcome: ProbeOutcome::Success,
            timestamp,
            latency,
            source_ip: source_ip.to_string(),
            dest_ip: dest_ip.to_string(),
        }
    }

    /// A failed check carries no latency.
    pub fn fail(timestamp: DateTime<Utc>, source_ip: &str, dest_ip: &str) -> Self {
        Self {
            outcome: ProbeOutcome::Fail,
            timestamp,
            latency: None,
            source_ip: source_ip.to_string(),
            dest_ip: dest_ip.to_string(),
        }
    }
}
