#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use meshprobe::agent::{ControlPlane, PingReply, Prober};
use meshprobe::config::{AgentConfig, ServerConfig};
use meshprobe::error::{ProbeError, TransportError};
use meshprobe::model::{Command, Hostname};
use meshprobe::protocol::{ClientInfo, CommandQuery, RegisterRequest, ReportRequest};
use meshprobe::server::{self, ServerState};
use parking_lot::Mutex;

pub fn host(s: &str) -> Hostname {
    Hostname::new(s)
}

pub fn agent_config(name: &str, ip: &str) -> AgentConfig {
    AgentConfig::new("http://in-process", host(name), ip)
        .with_retry_interval(Duration::from_millis(10))
        .with_probe_timeout(Duration::from_millis(200))
}

/// Calls the server handlers directly. Can be taken offline or "restarted".
pub struct InProcessControlPlane {
    state: Mutex<ServerState>,
    online: Arc<AtomicBool>,
    register_attempts: AtomicUsize,
}

impl InProcessControlPlane {
    pub fn new(state: ServerState) -> Self {
        Self {
            state: Mutex::new(state),
            online: Arc::new(AtomicBool::new(true)),
            register_attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Handle for flipping connectivity while the agent is mid-step.
    pub fn online_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.online)
    }

    pub fn register_attempts(&self) -> usize {
        self.register_attempts.load(Ordering::SeqCst)
    }

    /// Swap in a fresh server, losing all state.
    pub fn restart(&self) -> ServerState {
        let fresh = ServerState::new(ServerConfig::default());
        *self.state.lock() = fresh.clone();
        fresh
    }

    fn state(&self) -> Result<ServerState, TransportError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(self.state.lock().clone())
        } else {
            Err(TransportError::Connect("connection refused".into()))
        }
    }
}

impl ControlPlane for InProcessControlPlane {
    async fn register(&self, request: &RegisterRequest) -> Result<(), TransportError> {
        self.register_attempts.fetch_add(1, Ordering::SeqCst);
        let state = self.state()?;
        server::register(State(state), Ok(Json(request.clone())))
            .await
            .map(|_| ())
            .map_err(|_| TransportError::Status { status: 400 })
    }

    async fn get_commands(&self, hostname: &Hostname) -> Result<Option<Command>, TransportError> {
        let state = self.state()?;
        let query = CommandQuery {
            hostname: Some(hostname.to_string()),
        };
        let Json(reply) = server::get_commands(State(state), Query(query)).await;
        Ok(reply.command)
    }

    async fn get_clients(&self) -> Result<BTreeMap<Hostname, ClientInfo>, TransportError> {
        let state = self.state()?;
        let Json(response) = server::get_clients(State(state)).await;
        Ok(response.clients)
    }

    async fn report_results(&self, request: &ReportRequest) -> Result<(), TransportError> {
        let state = self.state()?;
        server::report_results(State(state), Ok(Json(request.clone())))
            .await
            .map(|_| ())
            .map_err(|_| TransportError::Status { status: 400 })
    }
}

/// Probe outcomes scripted per destination ip. Unscripted pings succeed.
#[derive(Default)]
pub struct ScriptedProber {
    outcomes: Mutex<HashMap<String, VecDeque<bool>>>,
    traced: Mutex<Vec<String>>,
    fail_traces: AtomicBool,
    ping_delay: Mutex<Option<Duration>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, ip: &str, outcomes: &[bool]) -> Self {
        self.outcomes
            .lock()
            .insert(ip.to_string(), outcomes.iter().copied().collect());
        self
    }

    pub fn failing_traces(self) -> Self {
        self.fail_traces.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_ping_delay(self, delay: Duration) -> Self {
        *self.ping_delay.lock() = Some(delay);
        self
    }

    pub fn traced(&self) -> Vec<String> {
        self.traced.lock().clone()
    }
}

impl Prober for ScriptedProber {
    async fn ping(&self, ip: &str) -> Result<PingReply, ProbeError> {
        let delay = *self.ping_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reachable = self
            .outcomes
            .lock()
            .get_mut(ip)
            .and_then(VecDeque::pop_front)
            .unwrap_or(true);
        Ok(if reachable { PingReply::up(0.5) } else { PingReply::down() })
    }

    async fn trace(&self, ip: &str) -> Result<String, ProbeError> {
        self.traced.lock().push(ip.to_string());
        if self.fail_traces.load(Ordering::SeqCst) {
            return Err(ProbeError::Exit {
                program: "traceroute",
                code: Some(1),
            });
        }
        Ok(format!("traceroute to {ip}\n 1  {ip}  0.5 ms\n"))
    }
}
