//! Error types for meshprobe
//!
//! Domain-specific error enums using thiserror. Each concern gets its own
//! enum so callers can match on exactly the failures they can recover from.

/// Malformed registration or report payload. Surfaced as HTTP 400.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid hostname: {0:?}")]
    InvalidHostname(String),
    #[error("invalid JSON body: {0}")]
    Body(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("session active: download or clear previous test data before starting a new test")]
    SessionActiveConflict,
}

/// Failure talking to the aggregation server from an agent.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("server returned {status}")]
    Status { status: u16 },
    #[error("decode: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn from_reqwest(e: reqwest::Error, timeout: std::time::Duration) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(timeout)
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
            }
        } else {
            TransportError::Connect(e.to_string())
        }
    }
}

/// Why a testing cycle was abandoned. Either one sends the agent to
/// `Disconnected`.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("only {0} agent(s) known, need at least 2")]
    TooFewAgents(usize),
}

/// Failure running a probe or trace subprocess.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {code:?}")]
    Exit {
        program: &'static str,
        code: Option<i32>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("could not determine hostname: {0}")]
    Hostname(String),
    #[error("could not determine ip address: {0}")]
    IpAddress(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
