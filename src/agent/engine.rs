//! Fan-out / fan-in probing.
//!
//! Each peer gets its own task for the cycle. The task owns that peer's
//! `Edge` while it runs, so the state machine and any transition trace are
//! resolved inside the task with no shared lock. Edges are handed back to
//! the tracker once every task has joined.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;

use super::probe::{PingReply, Prober};
use super::tracker::{Observation, Tracker};
use crate::model::{DiagnosticTrace, Hostname, Peer, ProbeOutcome, ProbeResult, TraceKind};
use crate::protocol::{ReportRequest, TraceBundle};

/// Everything one cycle produced, ready to report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleBatch {
    pub results: BTreeMap<Hostname, ProbeResult>,
    pub traces: Vec<(Hostname, DiagnosticTrace)>,
}

impl CycleBatch {
    pub fn into_request(self, hostname: &Hostname) -> ReportRequest {
        let mut bundle = TraceBundle::default();
        for (target, trace) in &self.traces {
            bundle.insert(target.clone(), trace);
        }
        ReportRequest::new(hostname)
            .with_results(self.results)
            .with_traces(bundle)
    }
}

/// Take one trace. A failed capture is kept as an empty trace.
pub async fn capture<P: Prober>(prober: &P, peer: &Peer, kind: TraceKind) -> DiagnosticTrace {
    let timestamp = Utc::now();
    capture_at(prober, peer, kind, timestamp).await
}

async fn capture_at<P: Prober>(
    prober: &P,
    peer: &Peer,
    kind: TraceKind,
    timestamp: chrono::DateTime<Utc>,
) -> DiagnosticTrace {
    match prober.trace(&peer.ip_address).await {
        Ok(output) => DiagnosticTrace::new(kind, timestamp, output),
        Err(e) => {
            tracing::warn!(peer = %peer.hostname, ?kind, error = %e, "trace capture failed");
            DiagnosticTrace::empty(kind, timestamp)
        }
    }
}

/// Trace every peer concurrently. Used for the initial and final sweeps.
pub async fn sweep<P: Prober>(prober: &Arc<P>, peers: &[Peer], kind: TraceKind) -> Vec<(Hostname, DiagnosticTrace)> {
    let mut tasks = JoinSet::new();
    for peer in peers.iter().cloned() {
        let prober = Arc::clone(prober);
        tasks.spawn(async move {
            let trace = capture(prober.as_ref(), &peer, kind).await;
            (peer.hostname, trace)
        });
    }

    let mut traces = Vec::with_capacity(peers.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => traces.push(entry),
            Err(e) => tracing::error!(error = %e, ?kind, "trace task failed"),
        }
    }
    traces.sort_by(|a, b| a.0.cmp(&b.0));
    traces
}

/// Run one probing cycle against `peers`.
///
/// On the first cycle of a session the initial sweep runs before any probe.
/// A probe that has not answered within `timeout` counts as `Fail` with no
/// latency and is not retried.
pub async fn run_cycle<P: Prober>(
    prober: &Arc<P>,
    source_ip: &str,
    peers: &[Peer],
    tracker: &mut Tracker,
    timeout: Duration,
) -> CycleBatch {
    let mut batch = CycleBatch::default();

    if tracker.needs_initial() {
        batch.traces.extend(sweep(prober, peers, TraceKind::Initial).await);
        tracker.mark_initial_captured();
    }

    let mut tasks = JoinSet::new();
    for peer in peers.iter().cloned() {
        let prober = Arc::clone(prober);
        let source_ip = source_ip.to_string();
        let mut edge = tracker.checkout(&peer.hostname);

        tasks.spawn(async move {
            let timestamp = Utc::now();
            let reply = match tokio::time::timeout(timeout, prober.ping(&peer.ip_address)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    tracing::warn!(peer = %peer.hostname, error = %e, "probe failed");
                    PingReply::down()
                }
                Err(_) => PingReply::down(),
            };

            let result = match ProbeOutcome::from_reachable(reply.reachable) {
                ProbeOutcome::Success => {
                    ProbeResult::success(timestamp, reply.latency, &source_ip, &peer.ip_address)
                }
                ProbeOutcome::Fail => ProbeResult::fail(timestamp, &source_ip, &peer.ip_address),
            };

            let trace = match edge.observe(result.outcome) {
                Observation::Changed { capture: true } => {
                    tracing::info!(peer = %peer.hostname, state = ?edge.state, "edge changed state");
                    Some(capture_at(prober.as_ref(), &peer, TraceKind::Transition, timestamp).await)
                }
                Observation::Baseline | Observation::Steady | Observation::Changed { capture: false } => None,
            };

            (peer.hostname, result, edge, trace)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((target, result, edge, trace)) => {
                tracker.checkin(target.clone(), edge);
                if let Some(trace) = trace {
                    batch.traces.push((target.clone(), trace));
                }
                batch.results.insert(target, result);
            }
            Err(e) => tracing::error!(error = %e, "probe task failed"),
        }
    }

    tracing::debug!(results = batch.results.len(), traces = batch.traces.len(), "cycle complete");
    batch
}
