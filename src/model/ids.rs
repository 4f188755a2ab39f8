use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Agent identity key. Non-empty, no whitespace, no path separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hostname(String);

impl Hostname {
    pub fn parse(s: impl Into<String>) -> Result<Self, ValidationError> {
        let name = s.into();
        if name.is_empty() || name.contains(char::is_whitespace) || name.contains('/') {
            return Err(ValidationError::InvalidHostname(name));
        }
        Ok(Self(name))
    }

    /// Panics on an invalid name. Intended for literals.
    pub fn new(s: impl Into<String>) -> Self {
        match Self::parse(s) {
            Ok(h) => h,
            Err(e) => panic!("Hostname cannot be built: {}", e),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Hostname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Hostname {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Hostname> for String {
    fn from(h: Hostname) -> Self {
        h.0
    }
}

impl From<&str> for Hostname {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
