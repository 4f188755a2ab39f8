//! Server-side aggregation of probe results.
//!
//! All mutation goes through one lock over an `Arc`'d state. Writers use
//! `Arc::make_mut`, so a reader holding an older snapshot never sees a
//! half-applied report and never blocks a writer for longer than the
//! `Arc` clone.

mod export;

pub use export::{generate_filename, load_bundle, save_bundle, ExportBundle};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{DiagnosticTrace, Hostname, PairCounter, PairRecord, ProbeResult, TestSession};

/// One agent's report for one cycle, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBatch {
    pub source: Hostname,
    pub results: BTreeMap<Hostname, ProbeResult>,
    pub traces: Vec<(Hostname, DiagnosticTrace)>,
}

impl ReportBatch {
    pub fn new(source: Hostname) -> Self {
        Self {
            source,
            results: BTreeMap::new(),
            traces: Vec::new(),
        }
    }

    pub fn with_result(mut self, target: Hostname, result: ProbeResult) -> Self {
        self.results.insert(target, result);
        self
    }

    pub fn with_trace(mut self, target: Hostname, trace: DiagnosticTrace) -> Self {
        self.traces.push((target, trace));
        self
    }
}

/// Point-in-time copy of everything the store holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    /// Bumped on every mutation
    pub version: u64,
    pub session: TestSession,
    /// True once the current data has been exported and nothing new arrived since
    pub flushed: bool,
    /// source → dest → record
    pub pairs: BTreeMap<Hostname, BTreeMap<Hostname, PairRecord>>,
}

impl StoreSnapshot {
    pub fn pair(&self, source: &Hostname, dest: &Hostname) -> Option<&PairRecord> {
        self.pairs.get(source).and_then(|row| row.get(dest))
    }

    pub fn matrix(&self) -> BTreeMap<Hostname, BTreeMap<Hostname, PairCounter>> {
        self.pairs
            .iter()
            .map(|(source, row)| {
                let counters = row
                    .iter()
                    .filter(|(_, record)| record.counter.total() > 0)
                    .map(|(dest, record)| (dest.clone(), record.counter))
                    .collect::<BTreeMap<_, _>>();
                (source.clone(), counters)
            })
            .filter(|(_, row)| !row.is_empty())
            .collect()
    }

    pub fn has_results(&self) -> bool {
        self.pairs
            .values()
            .flat_map(|row| row.values())
            .any(|record| record.counter.total() > 0)
    }

    fn pair_mut(&mut self, source: &Hostname, dest: &Hostname) -> &mut PairRecord {
        self.pairs
            .entry(source.clone())
            .or_default()
            .entry(dest.clone())
            .or_default()
    }

    fn wipe(&mut self) {
        self.pairs.clear();
        self.flushed = false;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub results: usize,
    pub traces: usize,
}

#[derive(Debug, Default)]
pub struct AggregationStore {
    state: Mutex<Arc<StoreSnapshot>>,
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut StoreSnapshot) -> T) -> T {
        let mut guard = self.state.lock();
        let state = Arc::make_mut(&mut guard);
        let out = f(state);
        state.version += 1;
        out
    }

    /// Apply one agent's batch atomically.
    pub fn report(&self, batch: ReportBatch) -> ReportSummary {
        let ReportBatch {
            source,
            results,
            traces,
        } = batch;
        let summary = ReportSummary {
            results: results.len(),
            traces: traces.len(),
        };

        self.mutate(|state| {
            if !results.is_empty() {
                state.flushed = false;
            }
            for (target, result) in results {
                state.pair_mut(&source, &target).push_result(result);
            }
            for (target, trace) in traces {
                state.pair_mut(&source, &target).traces.record(trace);
            }
        });

        summary
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&self.state.lock())
    }

    /// Clear previous data and mark a new session running. Refused while
    /// results from an earlier session are neither cleared nor exported.
    pub fn start_session(&self, name: &str, now: DateTime<Utc>) -> Result<TestSession, StoreError> {
        let mut guard = self.state.lock();
        if guard.has_results() && !guard.flushed {
            return Err(StoreError::SessionActiveConflict);
        }

        let state = Arc::make_mut(&mut guard);
        state.wipe();
        state.session = TestSession::started(name.to_string(), now);
        state.version += 1;
        Ok(state.session.clone())
    }

    pub fn stop_session(&self) -> TestSession {
        self.mutate(|state| {
            state.session.running = false;
            state.session.clone()
        })
    }

    pub fn clear(&self) {
        self.mutate(|state| {
            state.wipe();
            state.session.name.clear();
        });
    }

    /// Package the current data for download and mark it flushed.
    pub fn export(&self, test_name: &str, now: DateTime<Utc>) -> ExportBundle {
        let snapshot = {
            let mut guard = self.state.lock();
            let state = Arc::make_mut(&mut guard);
            state.flushed = true;
            state.version += 1;
            Arc::clone(&guard)
        };
        ExportBundle::from_snapshot(test_name, now, &snapshot)
    }
}
