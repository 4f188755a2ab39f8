//! Agent runtime: registration, command polling and the testing loop.
//!
//! Lifecycle: `Unregistered → Registered → Testing ⇄ Stopped`, with any
//! state dropping to `Disconnected` on a network failure that cannot be
//! absorbed. `Disconnected` retries registration on a fixed interval with no
//! overall deadline.

pub mod client;
pub mod engine;
pub mod probe;
pub mod tracker;

pub use client::{ControlPlane, HttpControlPlane};
pub use engine::{capture, run_cycle, sweep, CycleBatch};
pub use probe::{parse_latency, PingReply, Prober, SystemProber};
pub use tracker::{Edge, EdgeState, Observation, Tracker};

use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::error::CycleError;
use crate::model::{Command, Peer, TraceKind};
use crate::protocol::{RegisterRequest, ReportRequest, TraceBundle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unregistered,
    Registered,
    Testing,
    Stopped,
    Disconnected,
}

pub struct Agent<C, P> {
    config: AgentConfig,
    control: C,
    prober: Arc<P>,
    tracker: Tracker,
    lifecycle: Lifecycle,
    poll_failures: u32,
}

impl<C: ControlPlane, P: Prober> Agent<C, P> {
    pub fn new(config: AgentConfig, control: C, prober: P) -> Self {
        Self {
            config,
            control,
            prober: Arc::new(prober),
            tracker: Tracker::new(),
            lifecycle: Lifecycle::Unregistered,
            poll_failures: 0,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Run forever. Cadence is a fixed delay after each step, so a slow
    /// cycle stretches the period.
    pub async fn run(mut self) {
        tracing::info!(hostname = %self.config.hostname, server = %self.config.server_url, "agent starting");
        loop {
            let delay = self.step().await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// One iteration of the main loop. Returns how long to wait before the next.
    pub async fn step(&mut self) -> Duration {
        if matches!(self.lifecycle, Lifecycle::Unregistered | Lifecycle::Disconnected) {
            self.register_until_accepted().await;
            return Duration::ZERO;
        }

        match self.control.get_commands(&self.config.hostname).await {
            Ok(command) => {
                self.poll_failures = 0;
                self.apply(command).await;
            }
            Err(e) => {
                self.poll_failures += 1;
                tracing::warn!(error = %e, failures = self.poll_failures, "command poll failed");
                if self.poll_failures >= self.config.max_poll_failures {
                    self.disconnect("server unreachable");
                    return Duration::ZERO;
                }
            }
        }

        if self.lifecycle != Lifecycle::Testing {
            return self.config.idle_interval;
        }

        match self.test_cycle().await {
            Ok(()) => self.config.test_interval,
            Err(e) => {
                tracing::error!(error = %e, "stopping tests");
                self.disconnect("testing cycle failed");
                Duration::ZERO
            }
        }
    }

    /// Blocks until the server accepts the registration.
    pub async fn register_until_accepted(&mut self) {
        let request = RegisterRequest::new(&self.config.hostname, &self.config.ip_address);
        loop {
            match self.control.register(&request).await {
                Ok(()) => {
                    tracing::info!("registered with server");
                    self.lifecycle = Lifecycle::Registered;
                    self.poll_failures = 0;
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?self.config.retry_interval, "registration failed");
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    async fn apply(&mut self, command: Option<Command>) {
        match command {
            Some(Command::StartTests) => {
                tracing::info!("testing started");
                self.tracker.reset();
                self.lifecycle = Lifecycle::Testing;
            }
            Some(Command::StopTests) => {
                if self.lifecycle == Lifecycle::Testing {
                    tracing::info!("testing stopped");
                    self.lifecycle = Lifecycle::Stopped;
                    self.final_sweep().await;
                }
            }
            Some(Command::ReRegister) => {
                tracing::info!("server asked for re-registration");
                self.lifecycle = Lifecycle::Unregistered;
                self.register_until_accepted().await;
            }
            None => {}
        }
    }

    async fn peers(&self) -> Result<Vec<Peer>, CycleError> {
        let clients = self.control.get_clients().await?;
        if clients.len() < 2 {
            return Err(CycleError::TooFewAgents(clients.len()));
        }
        Ok(clients
            .into_iter()
            .filter(|(hostname, _)| *hostname != self.config.hostname)
            .map(|(hostname, info)| Peer::new(hostname, info.ip_address))
            .collect())
    }

    async fn test_cycle(&mut self) -> Result<(), CycleError> {
        let peers = self.peers().await?;
        let batch = run_cycle(
            &self.prober,
            &self.config.ip_address,
            &peers,
            &mut self.tracker,
            self.config.probe_timeout,
        )
        .await;

        let request = batch.into_request(&self.config.hostname);
        self.control.report_results(&request).await?;
        Ok(())
    }

    /// Trace every known peer once more so the report has an end-of-run path.
    async fn final_sweep(&mut self) {
        let peers = match self.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!(error = %e, "no final traces taken");
                return;
            }
        };

        let mut bundle = TraceBundle::default();
        for (target, trace) in sweep(&self.prober, &peers, TraceKind::Final).await {
            bundle.insert(target, &trace);
        }

        let request = ReportRequest::new(&self.config.hostname).with_traces(bundle);
        if let Err(e) = self.control.report_results(&request).await {
            tracing::error!(error = %e, "failed to report final traces");
            self.disconnect("final report failed");
        }
    }

    fn disconnect(&mut self, reason: &str) {
        tracing::warn!(reason, from = ?self.lifecycle, "disconnected, will re-register");
        self.lifecycle = Lifecycle::Disconnected;
    }
}
