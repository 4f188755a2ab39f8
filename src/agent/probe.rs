//! Reachability checks and route traces.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingReply {
    pub reachable: bool,
    /// Milliseconds
    pub latency: Option<f64>,
}

impl PingReply {
    pub fn up(latency: f64) -> Self {
        Self {
            reachable: true,
            latency: Some(latency),
        }
    }

    pub fn down() -> Self {
        Self {
            reachable: false,
            latency: None,
        }
    }
}

/// Source of probes and traces. Shared across the per-peer tasks of a cycle.
pub trait Prober: Send + Sync + 'static {
    fn ping(&self, ip: &str) -> impl Future<Output = Result<PingReply, ProbeError>> + Send;

    fn trace(&self, ip: &str) -> impl Future<Output = Result<String, ProbeError>> + Send;
}

/// Shells out to the system `ping` and `traceroute`.
#[derive(Debug, Clone)]
pub struct SystemProber {
    ping_wait: Duration,
}

impl SystemProber {
    pub fn new(ping_wait: Duration) -> Self {
        Self { ping_wait }
    }
}

impl Prober for SystemProber {
    async fn ping(&self, ip: &str) -> Result<PingReply, ProbeError> {
        let wait = format!("{:.1}", self.ping_wait.as_secs_f64());
        let output = Command::new("ping")
            .args(["-c", "1", "-W", &wait, ip])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                program: "ping",
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(PingReply {
            reachable: output.status.success(),
            latency: parse_latency(&stdout),
        })
    }

    async fn trace(&self, ip: &str) -> Result<String, ProbeError> {
        let output = Command::new("traceroute")
            .args(["-n", "-w", "1", "-q", "1", ip])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                program: "traceroute",
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        // A partial trace is still worth keeping.
        if output.status.success() || !stdout.is_empty() {
            Ok(stdout)
        } else {
            Err(ProbeError::Exit {
                program: "traceroute",
                code: output.status.code(),
            })
        }
    }
}

/// Round-trip time from a `ping` reply line (`time=0.045 ms`).
pub fn parse_latency(output: &str) -> Option<f64> {
    let start = output.find("time=")? + "time=".len();
    let digits: String = output[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}
