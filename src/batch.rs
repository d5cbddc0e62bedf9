use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dedupe::Accumulator;
use crate::model::EventRecord;
use crate::session::Session;
use crate::settings::BatchSettings;
use crate::target::Target;

/// Point-in-time copy of a run's progress, safe to hand to pollers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatus {
    pub is_running: bool,
    pub stop_requested: bool,
    pub artists_total: usize,
    pub artists_processed: usize,
    pub artists_failed: usize,
    pub concerts_found: usize,
    pub unique_venues: usize,
    pub current_artist: String,
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct Inner {
    status: RunStatus,
    records: Accumulator,
    cancel: CancellationToken,
}

/// The one piece of state shared between the batch worker and the control
/// surface. Every access goes through a short critical section.
pub struct RunState {
    inner: Mutex<Inner>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: RunStatus::default(),
                records: Accumulator::default(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset for a new run of `total` targets. `None` if a run is active, in
    /// which case nothing is touched.
    pub fn try_begin(&self, total: usize) -> Option<CancellationToken> {
        let mut inner = self.lock();
        if inner.status.is_running {
            return None;
        }
        let cancel = CancellationToken::new();
        inner.cancel = cancel.clone();
        inner.records = Accumulator::default();
        inner.status = RunStatus {
            is_running: true,
            artists_total: total,
            started_at: Some(Utc::now()),
            ..RunStatus::default()
        };
        Some(cancel)
    }

    pub fn snapshot(&self) -> RunStatus {
        let inner = self.lock();
        let mut status = inner.status.clone();
        status.concerts_found = inner.records.len();
        status.unique_venues = inner
            .records
            .records()
            .iter()
            .map(EventRecord::venue_name)
            .collect::<HashSet<_>>()
            .len();
        status
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.lock().records.records().to_vec()
    }

    pub fn is_running(&self) -> bool {
        self.lock().status.is_running
    }

    /// Ask the active run to stop before its next target. Returns whether a
    /// run was active.
    pub fn request_stop(&self) -> bool {
        let mut inner = self.lock();
        if !inner.status.is_running {
            return false;
        }
        inner.status.stop_requested = true;
        inner.cancel.cancel();
        true
    }

    fn set_current(&self, name: &str) {
        self.lock().status.current_artist = name.to_string();
    }

    /// Merge a target's records into the batch-wide set; returns how many were new.
    fn complete_target(&self, records: Vec<EventRecord>) -> usize {
        let mut inner = self.lock();
        let added = inner.records.extend(records);
        inner.status.artists_processed += 1;
        added
    }

    fn fail_target(&self, message: String) {
        let mut inner = self.lock();
        inner.status.errors.push(message);
        inner.status.artists_failed += 1;
        inner.status.artists_processed += 1;
    }

    fn record_error(&self, message: String) {
        self.lock().status.errors.push(message);
    }

    /// Idempotent.
    pub fn finish(&self) {
        let mut inner = self.lock();
        if inner.status.is_running {
            inner.status.is_running = false;
            inner.status.current_artist.clear();
            inner.status.finished_at = Some(Utc::now());
        }
    }
}

/// Finalizes the run even if the worker unwinds.
pub struct FinishOnDrop(pub Arc<RunState>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.record_error("General error: batch worker panicked".into());
        }
        self.0.finish();
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<EventRecord>,
    pub status: RunStatus,
}

/// Runs targets one at a time with jittered pauses between them.
pub struct Orchestrator {
    session: Session,
    cfg: BatchSettings,
}

impl Orchestrator {
    pub fn new(session: Session, cfg: BatchSettings) -> Self {
        Self { session, cfg }
    }

    /// Expects `state` to have been begun for `targets.len()` targets. Per-target
    /// failures are recorded, never raised; the run is finalized on return.
    pub async fn run_batch(
        &self,
        targets: &[Target],
        state: &RunState,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let total = targets.len();

        for (i, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("stop requested, skipping {} remaining artists", total - i);
                break;
            }

            state.set_current(&target.name);
            info!("Processing artist {}/{}: {}", i + 1, total, target.name);

            match self.session.run(target).await {
                Ok(outcome) => {
                    debug!(artist = %target.name, states = ?outcome.states, "page trace");
                    let (pages, attempts) = (outcome.pages, outcome.attempts);
                    let past_revealed = outcome.past_revealed;
                    let added = state.complete_target(outcome.records);
                    info!(
                        artist = %target.name,
                        pages,
                        attempts,
                        past_revealed,
                        "{} new concerts after dedupe",
                        added
                    );
                }
                Err(e) => {
                    let msg = format!("Error processing {}: {}", target.url, e);
                    error!("{}", msg);
                    state.fail_target(msg);
                }
            }

            if i + 1 < total {
                let pause = self.jitter();
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        state.finish();
        let status = state.snapshot();
        info!(
            "Batch done: {}/{} artists, {} concerts, {} venues, {} errors",
            status.artists_processed,
            status.artists_total,
            status.concerts_found,
            status.unique_venues,
            status.errors.len()
        );
        BatchOutcome {
            records: state.records(),
            status,
        }
    }

    fn jitter(&self) -> Duration {
        let (lo, hi) = (self.cfg.min_delay_ms, self.cfg.max_delay_ms);
        let ms = if hi > lo {
            rand::rng().random_range(lo..=hi)
        } else {
            lo
        };
        Duration::from_millis(ms)
    }
}
