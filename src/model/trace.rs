use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Initial,
    Transition,
    Final,
}

/// Route trace captured for one directed pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticTrace {
    pub kind: TraceKind,
    pub timestamp: DateTime<Utc>,
    pub output: String,
}

impl DiagnosticTrace {
    pub fn new(kind: TraceKind, timestamp: DateTime<Utc>, output: String) -> Self {
        Self {
            kind,
            timestamp,
            output,
        }
    }

    /// Capture failed; keep the slot with no text.
    pub fn empty(kind: TraceKind, timestamp: DateTime<Utc>) -> Self {
        Self::new(kind, timestamp, String::new())
    }
}

/// All traces stored for one pair within a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PairTraces {
    #[serde(default)]
    pub initial: Option<DiagnosticTrace>,
    #[serde(default)]
    pub transitions: Vec<DiagnosticTrace>,
    #[serde(default, rename = "final")]
    pub final_trace: Option<DiagnosticTrace>,
}

impl PairTraces {
    /// `initial` and `final` are set once per session; `transition` appends.
    pub fn record(&mut self, trace: DiagnosticTrace) {
        match trace.kind {
            TraceKind::Initial => {
                self.initial.get_or_insert(trace);
            }
            TraceKind::Final => {
                self.final_trace.get_or_insert(trace);
            }
            TraceKind::Transition => self.transitions.push(trace),
        }
    }
}
