//! Periodic spreadsheet polling: fetch, detect, merge, notify, sleep.

pub mod notify;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::{ChangeDetector, ChangeSet, DataProcessor, MergeOutcome, ProcessError};
use crate::sheets::{SpreadsheetError, SpreadsheetSource};

pub use notify::{Notification, NotificationHub, NotificationKind, Notifier, ProductSummary};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum PollingError {
    AlreadyRunning,
    NotRunning,
    Fetch(SpreadsheetError),
    Process(ProcessError),
    /// The blocking catalog task panicked or was cancelled.
    Worker(String),
    /// Shared state was poisoned by a panicking cycle.
    Poisoned,
}

impl std::fmt::Display for PollingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollingError::AlreadyRunning => write!(f, "polling service is already running"),
            PollingError::NotRunning => write!(f, "polling service is not running"),
            PollingError::Fetch(e) => write!(f, "fetch failed: {e}"),
            PollingError::Process(e) => write!(f, "processing failed: {e}"),
            PollingError::Worker(e) => write!(f, "catalog worker failed: {e}"),
            PollingError::Poisoned => write!(f, "polling state lock poisoned"),
        }
    }
}

impl std::error::Error for PollingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollingError::Fetch(e) => Some(e),
            PollingError::Process(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SpreadsheetError> for PollingError {
    fn from(e: SpreadsheetError) -> Self {
        PollingError::Fetch(e)
    }
}

impl From<ProcessError> for PollingError {
    fn from(e: ProcessError) -> Self {
        PollingError::Process(e)
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollOutcome {
    pub has_changes: bool,
    pub total_rows: usize,
    pub merge: MergeOutcome,
}

#[derive(Debug, Clone, Default)]
struct PollStats {
    last_check: Option<DateTime<Utc>>,
    total_checks: u64,
    products_added: u64,
    products_updated: u64,
    products_removed: u64,
    errors: u64,
    last_error: Option<String>,
}

/// Snapshot of the service state reported by `/polling/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollingStatus {
    pub is_running: bool,
    pub poll_interval: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub total_checks: u64,
    pub products_added: u64,
    pub products_updated: u64,
    pub products_removed: u64,
    pub errors: u64,
    pub last_error: Option<String>,
    pub total_rows: usize,
    pub spreadsheet_id: String,
}

/// Owns one spreadsheet's polling loop. Share it through an `Arc`.
pub struct PollingService {
    source: Arc<dyn SpreadsheetSource>,
    spreadsheet_id: String,
    detector: Mutex<ChangeDetector>,
    processor: DataProcessor,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    error_cooldown: Duration,
    running: AtomicBool,
    generation: AtomicU64,
    wake: Notify,
    /// The most recently spawned loop. A new loop waits for it to exit.
    active_loop: Mutex<Option<JoinHandle<()>>>,
    stats: Mutex<PollStats>,
}

impl PollingService {
    pub fn new(
        source: Arc<dyn SpreadsheetSource>,
        spreadsheet_id: impl Into<String>,
        detector: ChangeDetector,
        processor: DataProcessor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            spreadsheet_id: spreadsheet_id.into(),
            detector: Mutex::new(detector),
            processor,
            notifier,
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_cooldown: DEFAULT_ERROR_COOLDOWN,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            wake: Notify::new(),
            active_loop: Mutex::new(None),
            stats: Mutex::new(PollStats::default()),
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, error_cooldown: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.error_cooldown = error_cooldown;
        self
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn processor(&self) -> &DataProcessor {
        &self.processor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the polling loop on the current tokio runtime.
    ///
    /// If a previous loop is still finishing its last cycle, the new loop
    /// waits for it before polling, so cycles never overlap.
    pub fn start(self: &Arc<Self>) -> Result<(), PollingError> {
        let mut active = self.active_loop.lock().map_err(|_| PollingError::Poisoned)?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PollingError::AlreadyRunning);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            spreadsheet_id = %self.spreadsheet_id,
            interval_secs = self.poll_interval.as_secs(),
            "Starting polling service"
        );
        let previous = active.take();
        let service = Arc::clone(self);
        *active = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(error = %e, "Previous polling loop ended abnormally");
                }
            }
            service.run(generation).await
        }));
        Ok(())
    }

    /// Asks the loop to exit. A cycle already in progress runs to completion.
    pub fn stop(&self) -> Result<(), PollingError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(PollingError::NotRunning);
        }
        info!(spreadsheet_id = %self.spreadsheet_id, "Stopping polling service");
        self.wake.notify_waiters();
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run(&self, generation: u64) {
        while self.is_current(generation) {
            let wait = match self.poll_once().await {
                Ok(_) => self.poll_interval,
                Err(e) => {
                    error!(
                        error = %e,
                        cooldown_secs = self.error_cooldown.as_secs(),
                        "Error in polling loop"
                    );
                    self.error_cooldown
                }
            };
            // Register for the wake-up before the final check so a stop in
            // between is not missed.
            let wake = self.wake.notified();
            tokio::pin!(wake);
            wake.as_mut().enable();
            if !self.is_current(generation) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut wake => {}
            }
        }
        info!(spreadsheet_id = %self.spreadsheet_id, "Polling loop exited");
    }

    /// Runs a single fetch/detect/process/notify cycle.
    pub async fn poll_once(&self) -> Result<PollOutcome, PollingError> {
        let result = self.cycle().await;
        let mut stats = self.stats.lock().map_err(|_| PollingError::Poisoned)?;
        match &result {
            Ok(outcome) => {
                stats.last_check = Some(Utc::now());
                stats.total_checks += 1;
                stats.products_added += outcome.merge.inserted.len() as u64;
                stats.products_updated += outcome.merge.updated.len() as u64;
                stats.products_removed += outcome.merge.removed.len() as u64;
            }
            Err(e) => {
                stats.errors += 1;
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn cycle(&self) -> Result<PollOutcome, PollingError> {
        info!(spreadsheet_id = %self.spreadsheet_id, "Checking spreadsheet for changes");
        let snapshot = self.source.fetch_rows(&self.spreadsheet_id).await?;
        if snapshot.is_empty() {
            warn!(spreadsheet_id = %self.spreadsheet_id, "No data found in spreadsheet");
            return Ok(PollOutcome::default());
        }

        let changes: ChangeSet = {
            let detector = self.detector.lock().map_err(|_| PollingError::Poisoned)?;
            detector.preview(&snapshot)
        };
        if !changes.has_changes {
            info!("No changes detected in spreadsheet");
            return Ok(PollOutcome {
                has_changes: false,
                total_rows: changes.total_rows,
                merge: MergeOutcome::default(),
            });
        }

        let processor = self.processor.clone();
        let (merge, changes) = tokio::task::spawn_blocking(move || {
            let merge = processor.apply(&snapshot, &changes);
            (merge, changes)
        })
        .await
        .map_err(|e| PollingError::Worker(e.to_string()))?;
        let merge = merge?;
        {
            let mut detector = self.detector.lock().map_err(|_| PollingError::Poisoned)?;
            detector.commit(changes.fingerprint.clone());
        }
        self.broadcast(&merge);

        Ok(PollOutcome {
            has_changes: true,
            total_rows: changes.total_rows,
            merge,
        })
    }

    fn broadcast(&self, merge: &MergeOutcome) {
        let groups = [
            (NotificationKind::NewProducts, &merge.inserted),
            (NotificationKind::ModifiedProducts, &merge.updated),
            (NotificationKind::DeletedProducts, &merge.removed),
        ];
        for (kind, products) in groups {
            if !products.is_empty() {
                self.notifier.notify(Notification::new(kind, products));
            }
        }
    }

    pub fn status(&self) -> PollingStatus {
        let stats = self
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let (last_sync, total_rows) = self
            .detector
            .lock()
            .map(|d| (d.state().last_sync, d.state().row_count))
            .unwrap_or_default();
        PollingStatus {
            is_running: self.is_running(),
            poll_interval: self.poll_interval.as_secs(),
            last_sync,
            last_check: stats.last_check,
            total_checks: stats.total_checks,
            products_added: stats.products_added,
            products_updated: stats.products_updated,
            products_removed: stats.products_removed,
            errors: stats.errors,
            last_error: stats.last_error,
            total_rows,
            spreadsheet_id: self.spreadsheet_id.clone(),
        }
    }
}
