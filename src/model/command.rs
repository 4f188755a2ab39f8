use serde::{Deserialize, Serialize};

/// Directive an agent picks up on its next poll. "No command" is `Option::None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    StartTests,
    StopTests,
    ReRegister,
}
