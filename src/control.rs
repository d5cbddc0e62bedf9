use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::batch::{BatchOutcome, FinishOnDrop, Orchestrator, RunState, RunStatus};
use crate::export::{self, ExportError};
use crate::target;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("a scrape is already running")]
    AlreadyRunning,

    #[error("no valid URLs provided")]
    NoTargets,

    #[error("{0}")]
    InvalidTargets(String),
}

/// An accepted batch running on a background task.
pub struct BatchHandle {
    pub total: usize,
    task: JoinHandle<BatchOutcome>,
}

impl BatchHandle {
    pub async fn wait(self) -> Result<BatchOutcome, tokio::task::JoinError> {
        self.task.await
    }
}

/// Start/poll/stop/export over one shared run. Cheap to clone.
#[derive(Clone)]
pub struct Controller {
    state: Arc<RunState>,
    orchestrator: Arc<Orchestrator>,
}

impl Controller {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            state: Arc::new(RunState::new()),
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Validate every address, then launch the batch. Any invalid address
    /// rejects the whole request. Must be called inside a tokio runtime.
    pub fn start<S: AsRef<str>>(&self, addresses: &[S]) -> Result<BatchHandle, StartError> {
        if self.state.is_running() {
            return Err(StartError::AlreadyRunning);
        }

        let validation = target::validate(addresses);
        if !validation.invalid.is_empty() {
            return Err(StartError::InvalidTargets(validation.invalid_message()));
        }
        if validation.targets.is_empty() {
            return Err(StartError::NoTargets);
        }

        let targets = validation.targets;
        let total = targets.len();
        let cancel = self.state.try_begin(total).ok_or(StartError::AlreadyRunning)?;
        info!("starting batch of {} artists", total);

        let state = Arc::clone(&self.state);
        let orchestrator = Arc::clone(&self.orchestrator);
        let task = tokio::spawn(async move {
            let _guard = FinishOnDrop(Arc::clone(&state));
            orchestrator.run_batch(&targets, &state, &cancel).await
        });

        Ok(BatchHandle { total, task })
    }

    pub fn poll_status(&self) -> RunStatus {
        self.state.snapshot()
    }

    /// Cooperative: the artist in progress finishes, the rest are skipped.
    pub fn stop(&self) -> bool {
        let stopping = self.state.request_stop();
        if stopping {
            warn!("stop requested");
        }
        stopping
    }

    /// CSV of everything accumulated so far.
    pub fn export(&self) -> Result<String, ExportError> {
        export::to_csv(&self.state.records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Recovery;
    use crate::renderer::fake::{FakePage, FakeSite};
    use crate::session::Session;
    use crate::settings::{BatchSettings, RecoverySettings, SessionSettings};
    use std::sync::atomic::Ordering;
    use tokio::sync::Semaphore;

    const FIRST: &str = "https://www.bandsintown.com/a/1001-gospel-harmony";
    const SECOND: &str = "https://www.bandsintown.com/a/1003-river-road";

    fn controller(site: &Arc<FakeSite>) -> Controller {
        let session = Session::new(
            SessionSettings {
                retry_delay_ms: 0,
                load_timeout_ms: 5_000,
                reveal_settle_ms: 0,
                page_settle_ms: 0,
                more_settle_ms: 0,
                ..SessionSettings::default()
            },
            Recovery::new(&RecoverySettings::default()).unwrap(),
            Arc::new(Arc::clone(site)),
        );
        Controller::new(Orchestrator::new(
            session,
            BatchSettings {
                min_delay_ms: 0,
                max_delay_ms: 0,
            },
        ))
    }

    fn site() -> FakeSite {
        FakeSite::new()
            .page(FIRST, FakePage::listing("JUN 12\nRiverside Baptist Church\nNashville, TN"))
            .page(SECOND, FakePage::listing("JUL 4\nFox Theatre\nAtlanta, GA"))
    }

    #[test]
    fn invalid_addresses_reject_whole_request() {
        let c = controller(&Arc::new(site()));
        let err = c
            .start(&[FIRST, "https://example.com/a/1", "not a url"])
            .err()
            .unwrap();
        match err {
            StartError::InvalidTargets(msg) => {
                assert!(msg.contains("https://example.com/a/1"));
                assert!(msg.contains("not a url"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!c.poll_status().is_running);
    }

    #[test]
    fn blank_input_is_no_targets() {
        let c = controller(&Arc::new(site()));
        assert_eq!(c.start(&["", "   "]).err(), Some(StartError::NoTargets));
        assert_eq!(c.start::<&str>(&[]).err(), Some(StartError::NoTargets));
    }

    #[test]
    fn export_before_any_run_is_no_data() {
        let c = controller(&Arc::new(site()));
        assert!(matches!(c.export(), Err(ExportError::NoData)));
    }

    #[tokio::test]
    async fn runs_to_completion_and_exports() {
        let site = Arc::new(site());
        let c = controller(&site);

        let handle = c.start(&[FIRST, SECOND]).unwrap();
        assert_eq!(handle.total, 2);
        let out = handle.wait().await.unwrap();

        assert_eq!(out.records.len(), 2);
        let status = c.poll_status();
        assert!(!status.is_running);
        assert_eq!(status.artists_processed, 2);
        assert_eq!(status.concerts_found, 2);
        assert!(status.errors.is_empty());

        let csv = c.export().unwrap();
        assert!(csv.starts_with("entity_name,venue_name,venue_address,event_date\n"));
        assert!(csv.contains("River Road,Fox Theatre,\"Atlanta, GA\",JUL 4"));
    }

    #[tokio::test]
    async fn start_while_running_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let site = Arc::new(site().gated(Arc::clone(&gate)));
        let c = controller(&site);

        let handle = c.start(&[FIRST]).unwrap();
        while site.launches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let before = c.poll_status();
        assert!(before.is_running);
        assert_eq!(c.start(&[SECOND]).err(), Some(StartError::AlreadyRunning));
        assert_eq!(c.poll_status(), before);

        gate.add_permits(10);
        handle.wait().await.unwrap();
        let after = c.poll_status();
        assert!(!after.is_running);
        assert_eq!(after.artists_total, 1);
        let csv = c.export().unwrap();
        assert!(csv.lines().nth(1).unwrap().starts_with("Gospel Harmony,"));
    }

    #[tokio::test]
    async fn stop_skips_remaining_artists() {
        let gate = Arc::new(Semaphore::new(0));
        let site = Arc::new(site().gated(Arc::clone(&gate)));
        let c = controller(&site);

        let handle = c.start(&[FIRST, SECOND]).unwrap();
        while site.launches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(c.stop());
        assert!(c.poll_status().is_running);
        gate.add_permits(10);

        let out = handle.wait().await.unwrap();
        assert!(out.status.stop_requested);
        assert_eq!(out.status.artists_processed, 1);
        assert_eq!(site.launches.load(Ordering::SeqCst), 1);
        assert!(!c.stop());
    }
}
