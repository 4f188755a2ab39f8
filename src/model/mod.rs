pub mod agent;
pub mod command;
pub mod ids;
pub mod probe;
pub mod session;
pub mod trace;

pub use agent::{AgentRecord, Peer};
pub use command::Command;
pub use ids::Hostname;
pub use probe::{ProbeOutcome, ProbeResult};
pub use session::{PairCounter, PairRecord, TestSession};
pub use trace::{DiagnosticTrace, PairTraces, TraceKind};
