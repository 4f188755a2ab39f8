//! Runtime configuration for both roles.
//!
//! Defaults match the cadence the mesh was tuned for: 5 s request timeout,
//! 5 s registration retry, half-second cycles while testing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::IdentityError;
use crate::model::Hostname;

pub const DEFAULT_PORT: u16 = 50000;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Exports are also written here when set
    pub archive_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            archive_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    pub fn with_archive_dir(mut self, dir: PathBuf) -> Self {
        self.archive_dir = Some(dir);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Base URL of the aggregation server, e.g. `http://10.0.0.1:50000`
    pub server_url: String,
    pub hostname: Hostname,
    pub ip_address: String,
    pub request_timeout: Duration,
    pub retry_interval: Duration,
    /// Delay between cycles while testing
    pub test_interval: Duration,
    /// Delay between polls while idle
    pub idle_interval: Duration,
    /// Reply wait handed to `ping -W`
    pub ping_wait: Duration,
    /// Hard cap on one check, including process spawn
    pub probe_timeout: Duration,
    /// Consecutive failed polls before the agent counts itself disconnected
    pub max_poll_failures: u32,
}

impl AgentConfig {
    pub fn new(server_url: impl Into<String>, hostname: Hostname, ip_address: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            hostname,
            ip_address: ip_address.into(),
            request_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_secs(5),
            test_interval: Duration::from_millis(500),
            idle_interval: Duration::from_secs(1),
            ping_wait: Duration::from_millis(800),
            probe_timeout: Duration::from_secs(2),
            max_poll_failures: 3,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_intervals(mut self, testing: Duration, idle: Duration) -> Self {
        self.test_interval = testing;
        self.idle_interval = idle;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_poll_failures(mut self, failures: u32) -> Self {
        self.max_poll_failures = failures.max(1);
        self
    }
}

/// Kernel hostname, falling back to `$HOSTNAME`.
pub fn detect_hostname() -> Result<Hostname, IdentityError> {
    let raw = match std::fs::read_to_string("/proc/sys/kernel/hostname") {
        Ok(name) => name,
        Err(e) => std::env::var("HOSTNAME").map_err(|_| IdentityError::Hostname(e.to_string()))?,
    };
    Ok(Hostname::parse(raw.trim())?)
}

/// First address printed by `hostname -I`.
pub fn detect_ip_address() -> Result<String, IdentityError> {
    let output = std::process::Command::new("hostname")
        .arg("-I")
        .output()
        .map_err(|e| IdentityError::IpAddress(e.to_string()))?;
    first_address(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| IdentityError::IpAddress("`hostname -I` printed no address".to_string()))
}

fn first_address(output: &str) -> Option<String> {
    output.split_whitespace().next().map(str::to_string)
}
