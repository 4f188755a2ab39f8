//! Wire types for the agent ↔ server HTTP/JSON protocol.
//!
//! Requests carry optional fields so that a missing value becomes an explicit
//! validation message instead of an opaque deserialization failure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{Command, DiagnosticTrace, Hostname, ProbeResult, TraceKind};
use crate::store::ReportBatch;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegisterRequest {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl RegisterRequest {
    pub fn new(hostname: &Hostname, ip_address: &str) -> Self {
        Self {
            hostname: Some(hostname.to_string()),
            ip_address: Some(ip_address.to_string()),
        }
    }

    pub fn validate(self) -> Result<(Hostname, String), ValidationError> {
        let hostname = self
            .hostname
            .filter(|h| !h.is_empty())
            .ok_or(ValidationError::MissingField("hostname"))?;
        let ip_address = self
            .ip_address
            .filter(|ip| !ip.is_empty())
            .ok_or(ValidationError::MissingField("ip_address"))?;
        Ok((Hostname::parse(hostname)?, ip_address))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn ok(status: &str) -> Self {
        Self {
            status: status.to_string(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandQuery {
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandReply {
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientInfo {
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientsResponse {
    pub clients: BTreeMap<Hostname, ClientInfo>,
}

/// Trace text as sent by an agent. Older agents send bare text; the capture
/// time travels with the stamped form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TraceText {
    Stamped {
        timestamp: DateTime<Utc>,
        output: String,
    },
    Plain(String),
}

impl From<&DiagnosticTrace> for TraceText {
    fn from(trace: &DiagnosticTrace) -> Self {
        TraceText::Stamped {
            timestamp: trace.timestamp,
            output: trace.output.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TraceBundle {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub initial: BTreeMap<Hostname, TraceText>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<Hostname, TraceText>,
    #[serde(default, rename = "final", skip_serializing_if = "BTreeMap::is_empty")]
    pub final_traces: BTreeMap<Hostname, TraceText>,
}

impl TraceBundle {
    pub fn is_empty(&self) -> bool {
        self.initial.is_empty() && self.additional.is_empty() && self.final_traces.is_empty()
    }

    pub fn insert(&mut self, target: Hostname, trace: &DiagnosticTrace) {
        let slot = match trace.kind {
            TraceKind::Initial => &mut self.initial,
            TraceKind::Transition => &mut self.additional,
            TraceKind::Final => &mut self.final_traces,
        };
        slot.insert(target, TraceText::from(trace));
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportRequest {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub results: Option<BTreeMap<Hostname, ProbeResult>>,
    #[serde(default)]
    pub traceroutes: Option<TraceBundle>,
}

impl ReportRequest {
    pub fn new(hostname: &Hostname) -> Self {
        Self {
            hostname: Some(hostname.to_string()),
            results: None,
            traceroutes: None,
        }
    }

    pub fn with_results(mut self, results: BTreeMap<Hostname, ProbeResult>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_traces(mut self, traces: TraceBundle) -> Self {
        if !traces.is_empty() {
            self.traceroutes = Some(traces);
        }
        self
    }

    /// Validate and stamp a report into a store batch. Bare trace text takes
    /// the timestamp of the same target's result in this report, falling back
    /// to `received_at`.
    pub fn into_batch(self, received_at: DateTime<Utc>) -> Result<ReportBatch, ValidationError> {
        let source = self
            .hostname
            .filter(|h| !h.is_empty())
            .ok_or(ValidationError::MissingField("hostname"))?;
        let source = Hostname::parse(source)?;
        let results = self.results.unwrap_or_default();
        let bundle = self.traceroutes.unwrap_or_default();

        let mut traces = Vec::new();
        let kinds = [
            (TraceKind::Initial, bundle.initial),
            (TraceKind::Transition, bundle.additional),
            (TraceKind::Final, bundle.final_traces),
        ];
        for (kind, entries) in kinds {
            for (target, text) in entries {
                let trace = match text {
                    TraceText::Stamped { timestamp, output } => {
                        DiagnosticTrace::new(kind, timestamp, output)
                    }
                    TraceText::Plain(output) => {
                        let timestamp = match kind {
                            TraceKind::Transition => results
                                .get(&target)
                                .map(|r| r.timestamp)
                                .unwrap_or(received_at),
                            TraceKind::Initial | TraceKind::Final => received_at,
                        };
                        DiagnosticTrace::new(kind, timestamp, output)
                    }
                };
                traces.push((target, trace));
            }
        }

        Ok(ReportBatch {
            source,
            results,
            traces,
        })
    }
}
