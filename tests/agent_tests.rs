mod common;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use common::{agent_config, host, InProcessControlPlane, ScriptedProber};
use meshprobe::agent::{Agent, EdgeState, Lifecycle};
use meshprobe::config::ServerConfig;
use meshprobe::model::PairCounter;
use meshprobe::server::{self, ServerState};
use std::sync::atomic::Ordering;
use std::time::Duration;

type TestAgent = Agent<InProcessControlPlane, ScriptedProber>;

fn new_agent(state: &ServerState, name: &str, ip: &str, prober: ScriptedProber) -> TestAgent {
    Agent::new(agent_config(name, ip), InProcessControlPlane::new(state.clone()), prober)
}

async fn start(state: &ServerState) {
    server::start_tests(State(state.clone()), Bytes::new())
        .await
        .expect("start should be accepted");
}

async fn stop(state: &ServerState) {
    let Json(resp) = server::stop_tests(State(state.clone())).await;
    assert_eq!(resp.status, "tests_stopped");
    assert!(!resp.session.running);
}

#[tokio::test]
async fn first_step_registers() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    assert_eq!(a.lifecycle(), Lifecycle::Unregistered);

    a.step().await;

    assert_eq!(a.lifecycle(), Lifecycle::Registered);
    assert!(state.registry.contains(&host("a")));
}

#[tokio::test]
async fn fail_then_success_records_exactly_one_transition() {
    let state = ServerState::new(ServerConfig::default());
    let prober = ScriptedProber::new().script("10.0.0.2", &[false, true]);
    let mut a = new_agent(&state, "a", "10.0.0.1", prober);
    a.step().await;
    state.registry.register(host("b"), "10.0.0.2".into(), Utc::now());
    start(&state).await;

    // Cycle 1: baseline Down, no transition trace
    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Testing);
    assert_eq!(a.tracker().edge(&host("b")).unwrap().state, EdgeState::Down);
    {
        let snap = state.store.snapshot();
        let record = snap.pair(&host("a"), &host("b")).unwrap();
        assert_eq!(record.counter, PairCounter { success: 0, fail: 1 });
        assert!(record.traces.initial.is_some());
        assert!(record.traces.transitions.is_empty());
    }

    // Cycle 2: Down → Up, one transition stamped with this cycle's probe time
    a.step().await;
    let snap = state.store.snapshot();
    let record = snap.pair(&host("a"), &host("b")).unwrap();
    assert_eq!(record.counter, PairCounter { success: 1, fail: 1 });
    assert_eq!(record.traces.transitions.len(), 1);
    assert_eq!(record.traces.transitions[0].timestamp, record.history[1].timestamp);
    assert_eq!(a.tracker().edge(&host("b")).unwrap().state, EdgeState::Up);
}

#[tokio::test]
async fn flapping_is_throttled_until_steady() {
    let state = ServerState::new(ServerConfig::default());
    let prober = ScriptedProber::new().script("10.0.0.2", &[true, false, true, false, false, true]);
    let mut a = new_agent(&state, "a", "10.0.0.1", prober);
    a.step().await;
    state.registry.register(host("b"), "10.0.0.2".into(), Utc::now());
    start(&state).await;

    for _ in 0..6 {
        a.step().await;
    }

    let snap = state.store.snapshot();
    let record = snap.pair(&host("a"), &host("b")).unwrap();
    // up, DOWN(capture), up(suppressed), down(suppressed), down(re-arm), UP(capture)
    assert_eq!(record.traces.transitions.len(), 2);
    assert_eq!(record.counter.total(), 6);

    let edge = a.tracker().edge(&host("b")).unwrap();
    assert!(edge.captures <= edge.changes);
}

#[tokio::test]
async fn stop_tests_yields_one_final_trace_per_ordered_pair() {
    let state = ServerState::new(ServerConfig::default());
    let nodes = [("a", "10.0.0.1"), ("b", "10.0.0.2"), ("c", "10.0.0.3")];
    let mut agents: Vec<TestAgent> = nodes
        .iter()
        .map(|(name, ip)| new_agent(&state, name, ip, ScriptedProber::new()))
        .collect();

    for agent in agents.iter_mut() {
        agent.step().await;
    }
    start(&state).await;
    for _ in 0..2 {
        for agent in agents.iter_mut() {
            agent.step().await;
            assert_eq!(agent.lifecycle(), Lifecycle::Testing);
        }
    }

    stop(&state).await;
    for agent in agents.iter_mut() {
        agent.step().await;
        assert_eq!(agent.lifecycle(), Lifecycle::Stopped);
    }

    let snap = state.store.snapshot();
    for (source, _) in &nodes {
        for (dest, _) in &nodes {
            if source == dest {
                continue;
            }
            let record = snap.pair(&host(source), &host(dest)).unwrap();
            assert!(record.traces.final_trace.is_some(), "{source} -> {dest}");
        }
    }

    // Each agent traced each peer twice: initial sweep and final sweep
    for (agent, (_, own_ip)) in agents.iter().zip(nodes.iter()) {
        let traced = agent.prober().traced();
        assert_eq!(traced.len(), 4);
        for (_, ip) in nodes.iter().filter(|(_, ip)| ip != own_ip) {
            assert_eq!(traced.iter().filter(|t| t == ip).count(), 2);
        }
    }
}

#[tokio::test]
async fn stopped_agent_does_not_probe() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    a.step().await;
    state.registry.register(host("b"), "10.0.0.2".into(), Utc::now());
    start(&state).await;
    a.step().await;
    stop(&state).await;
    a.step().await;

    let before = state.store.snapshot().pair(&host("a"), &host("b")).unwrap().counter;
    a.step().await;
    let after = state.store.snapshot().pair(&host("a"), &host("b")).unwrap().counter;
    assert_eq!(before, after);
}

#[tokio::test]
async fn lost_server_disconnects_then_re_registers() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    a.step().await;
    state.registry.register(host("b"), "10.0.0.2".into(), Utc::now());
    start(&state).await;
    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Testing);

    a.control().set_online(false);
    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Disconnected);

    a.control().set_online(true);
    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Registered);
}

#[tokio::test]
async fn server_restart_triggers_re_register() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    a.step().await;

    let fresh = a.control().restart();
    assert!(!fresh.registry.contains(&host("a")));

    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Registered);
    assert!(fresh.registry.contains(&host("a")));
}

#[tokio::test]
async fn lone_agent_backs_off() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    a.step().await;
    start(&state).await;

    a.step().await;

    assert_eq!(a.lifecycle(), Lifecycle::Disconnected);
    assert!(state.store.snapshot().pairs.is_empty());
}

#[tokio::test]
async fn slow_probe_counts_as_fail_without_latency() {
    let state = ServerState::new(ServerConfig::default());
    let prober = ScriptedProber::new().with_ping_delay(Duration::from_secs(2));
    let mut a = new_agent(&state, "a", "10.0.0.1", prober);
    a.step().await;
    state.registry.register(host("b"), "10.0.0.2".into(), Utc::now());
    start(&state).await;

    a.step().await;

    let snap = state.store.snapshot();
    let record = snap.pair(&host("a"), &host("b")).unwrap();
    assert_eq!(record.counter.fail, 1);
    assert_eq!(record.history[0].latency, None);
}

#[tokio::test]
async fn failed_trace_is_kept_empty_and_cycle_completes() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new().failing_traces());
    a.step().await;
    state.registry.register(host("b"), "10.0.0.2".into(), Utc::now());
    start(&state).await;

    a.step().await;

    assert_eq!(a.lifecycle(), Lifecycle::Testing);
    let snap = state.store.snapshot();
    let record = snap.pair(&host("a"), &host("b")).unwrap();
    assert_eq!(record.traces.initial.as_ref().unwrap().output, "");
    assert_eq!(record.counter.success, 1);
}

#[tokio::test]
async fn start_tests_resets_edges() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    a.step().await;
    state.registry.register(host("b"), "10.0.0.2".into(), Utc::now());
    start(&state).await;
    a.step().await;
    assert!(a.tracker().edge(&host("b")).is_some());

    stop(&state).await;
    a.step().await;
    let Json(cleared) = server::clear_data(State(state.clone())).await;
    assert_eq!(cleared.status, "data_cleared");
    start(&state).await;
    a.step().await;

    // Fresh session: initial sweep ran again and the edge restarted from a baseline
    let snap = state.store.snapshot();
    let record = snap.pair(&host("a"), &host("b")).unwrap();
    assert!(record.traces.initial.is_some());
    assert_eq!(record.counter.total(), 1);
    assert_eq!(a.tracker().edge(&host("b")).unwrap().changes, 0);
}

#[tokio::test]
async fn repeated_poll_failures_disconnect_idle_agent() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Registered);

    a.control().set_online(false);
    let mut seen = Vec::new();
    for _ in 0..3 {
        a.step().await;
        seen.push(a.lifecycle());
    }

    assert_eq!(seen, [Lifecycle::Registered, Lifecycle::Registered, Lifecycle::Disconnected]);
}

#[tokio::test]
async fn disconnected_agent_retries_registration_until_server_returns() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    a.step().await;
    a.control().set_online(false);
    for _ in 0..3 {
        a.step().await;
    }
    assert_eq!(a.lifecycle(), Lifecycle::Disconnected);
    let attempts_before = a.control().register_attempts();

    let switch = a.control().online_switch();
    tokio::spawn(async move {
        // Several 10ms retry intervals
        tokio::time::sleep(Duration::from_millis(60)).await;
        switch.store(true, Ordering::SeqCst);
    });

    tokio::time::timeout(Duration::from_secs(5), a.step())
        .await
        .expect("registration should succeed once the server is back");

    assert_eq!(a.lifecycle(), Lifecycle::Registered);
    assert!(a.control().register_attempts() - attempts_before > 1);
    assert!(state.registry.contains(&host("a")));
}

#[tokio::test]
async fn server_restart_while_testing_re_registers_and_stops_reporting() {
    let state = ServerState::new(ServerConfig::default());
    let mut a = new_agent(&state, "a", "10.0.0.1", ScriptedProber::new());
    a.step().await;
    state.registry.register(host("b"), "10.0.0.2".into(), Utc::now());
    start(&state).await;
    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Testing);

    let fresh = a.control().restart();
    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Registered);
    assert!(fresh.registry.contains(&host("a")));

    // No session on the new server, so the agent stays idle
    a.step().await;
    assert_eq!(a.lifecycle(), Lifecycle::Registered);
    assert!(fresh.store.snapshot().pairs.is_empty());
}
