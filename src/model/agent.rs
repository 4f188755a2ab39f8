use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Hostname;

/// A registered agent as the server sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub hostname: Hostname,
    pub ip_address: String,
    pub registered_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(hostname: Hostname, ip_address: String, registered_at: DateTime<Utc>) -> Self {
        Self {
            hostname,
            ip_address,
            registered_at,
        }
    }
}

/// A peer as an agent sees it: someone to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub hostname: Hostname,
    pub ip_address: String,
}

impl Peer {
    pub fn new(hostname: Hostname, ip_address: impl Into<String>) -> Self {
        Self {
            hostname,
            ip_address: ip_address.into(),
        }
    }
}
