use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brochure_sync::core::{CatalogStore, ChangeDetector, DataProcessor};
use brochure_sync::polling::{
    Notification, NotificationHub, NotificationKind, Notifier, PollingError, PollingService,
};
use brochure_sync::sheets::{InMemorySheet, SheetFuture, SpreadsheetSource};

const SHEET: &str = "sheet123";

fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
    data.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// Records each notification together with the catalog file's product
/// count at the moment it was delivered.
struct RecordingNotifier {
    catalog_path: PathBuf,
    seen: Mutex<Vec<(Notification, usize)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        let on_disk = std::fs::read_to_string(&self.catalog_path)
            .ok()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
            .and_then(|v| v["products"].as_array().map(Vec::len))
            .unwrap_or(0);
        self.seen.lock().unwrap().push((notification, on_disk));
    }
}

fn service(
    dir: &Path,
    sheet: Arc<InMemorySheet>,
    notifier: Arc<dyn Notifier>,
) -> PollingService {
    let store = CatalogStore::new(dir.join("products.json"), dir.join("backups"));
    PollingService::new(
        sheet,
        SHEET,
        ChangeDetector::new(dir.join("state.json")),
        DataProcessor::new(store, "google_sheets"),
        notifier,
    )
    .with_intervals(Duration::from_secs(3600), Duration::from_secs(3600))
}

fn recorder(dir: &Path) -> Arc<RecordingNotifier> {
    Arc::new(RecordingNotifier {
        catalog_path: dir.join("products.json"),
        seen: Mutex::new(Vec::new()),
    })
}

#[tokio::test]
async fn notifies_after_catalog_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = Arc::new(InMemorySheet::new());
    sheet.set_rows(SHEET, rows(&[&["Model", "Product Name"], &["M1", "Lamp"], &["M2", "Camera"]]));
    let notifier = recorder(dir.path());
    let svc = service(dir.path(), Arc::clone(&sheet), notifier.clone());

    let outcome = svc.poll_once().await.unwrap();
    assert!(outcome.has_changes);
    assert_eq!(outcome.merge.inserted.len(), 2);

    let seen = notifier.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (notification, on_disk) = &seen[0];
    assert_eq!(notification.kind, NotificationKind::NewProducts);
    assert_eq!(notification.count, 2);
    assert_eq!(*on_disk, 2);
}

#[tokio::test]
async fn each_change_kind_gets_its_own_message() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = Arc::new(InMemorySheet::new());
    sheet.set_rows(SHEET, rows(&[&["Model", "Product Name"], &["M1", "Lamp"], &["M2", "Camera"]]));
    let hub = NotificationHub::new(16);
    let mut rx = hub.subscribe();
    let svc = service(dir.path(), Arc::clone(&sheet), Arc::new(hub.clone()));
    svc.poll_once().await.unwrap();
    assert_eq!(rx.recv().await.unwrap().kind, NotificationKind::NewProducts);

    sheet.set_rows(
        SHEET,
        rows(&[&["Model", "Product Name"], &["M1", "Lamp v2"], &["M3", "Widget"]]),
    );
    let outcome = svc.poll_once().await.unwrap();
    assert_eq!(outcome.merge.updated.len(), 1);
    assert_eq!(outcome.merge.inserted.len(), 1);
    assert_eq!(outcome.merge.removed.len(), 1);

    let kinds: Vec<NotificationKind> = (0..3).map(|_| rx.try_recv().unwrap().kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::NewProducts,
            NotificationKind::ModifiedProducts,
            NotificationKind::DeletedProducts,
        ]
    );
}

#[tokio::test]
async fn unchanged_sheet_is_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = Arc::new(InMemorySheet::new());
    sheet.set_rows(SHEET, rows(&[&["Model", "Product Name"], &["M1", "Lamp"]]));
    let notifier = recorder(dir.path());
    let svc = service(dir.path(), Arc::clone(&sheet), notifier.clone());

    svc.poll_once().await.unwrap();
    let second = svc.poll_once().await.unwrap();
    assert!(!second.has_changes);
    assert_eq!(notifier.seen.lock().unwrap().len(), 1);

    let status = svc.status();
    assert_eq!(status.total_checks, 2);
    assert_eq!(status.products_added, 1);
    assert_eq!(status.total_rows, 1);
    assert_eq!(status.spreadsheet_id, SHEET);
    assert!(status.last_sync.is_some());
}

#[tokio::test]
async fn empty_sheet_finishes_cycle_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = Arc::new(InMemorySheet::new());
    sheet.set_rows(SHEET, Vec::new());
    let svc = service(dir.path(), sheet, recorder(dir.path()));
    let outcome = svc.poll_once().await.unwrap();
    assert!(!outcome.has_changes);
    assert!(!dir.path().join("products.json").exists());
    assert!(!dir.path().join("state.json").exists());
}

#[tokio::test]
async fn fetch_errors_are_counted() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = Arc::new(InMemorySheet::new());
    let svc = service(dir.path(), sheet, recorder(dir.path()));
    let err = svc.poll_once().await.unwrap_err();
    assert!(matches!(err, PollingError::Fetch(_)));
    let status = svc.status();
    assert_eq!(status.errors, 1);
    assert_eq!(status.total_checks, 0);
    assert!(status.last_error.unwrap().contains("sheet not found"));
}

#[tokio::test]
async fn failed_save_leaves_baseline_untouched() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the catalog directory should be.
    let blocker = dir.path().join("data");
    std::fs::write(&blocker, "").unwrap();
    let store = CatalogStore::new(blocker.join("products.json"), dir.path().join("backups"));
    let sheet = Arc::new(InMemorySheet::new());
    sheet.set_rows(SHEET, rows(&[&["Model", "Product Name"], &["M1", "Lamp"]]));
    let notifier = recorder(dir.path());
    let svc = PollingService::new(
        sheet,
        SHEET,
        ChangeDetector::new(dir.path().join("state.json")),
        DataProcessor::new(store, "google_sheets"),
        notifier.clone(),
    );

    let err = svc.poll_once().await.unwrap_err();
    assert!(matches!(err, PollingError::Process(_)));
    assert!(!dir.path().join("state.json").exists());
    assert!(notifier.seen.lock().unwrap().is_empty());

    // The same change is seen again on the next attempt.
    assert!(svc.poll_once().await.is_err());
    assert_eq!(svc.status().errors, 2);
}

#[tokio::test]
async fn start_and_stop_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = Arc::new(InMemorySheet::new());
    sheet.set_rows(SHEET, rows(&[&["Model", "Product Name"], &["M1", "Lamp"]]));
    let svc = Arc::new(service(dir.path(), sheet, recorder(dir.path())));

    assert!(matches!(svc.stop(), Err(PollingError::NotRunning)));
    svc.start().unwrap();
    assert!(svc.is_running());
    assert!(matches!(svc.start(), Err(PollingError::AlreadyRunning)));

    let mut waited = Duration::ZERO;
    while svc.status().total_checks == 0 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(svc.status().total_checks, 1);

    svc.stop().unwrap();
    assert!(!svc.is_running());
    assert!(!svc.status().is_running);

    // Restarting runs a fresh loop.
    svc.start().unwrap();
    svc.stop().unwrap();
}

/// Source whose fetch takes `delay`, recording how many fetches overlap.
struct SlowSheet {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowSheet {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl SpreadsheetSource for SlowSheet {
    fn fetch_rows<'a>(&'a self, _spreadsheet_id: &'a str) -> SheetFuture<'a, Vec<Vec<String>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(rows(&[&["Model", "Product Name"], &["M1", "Lamp"]]))
        })
    }
}

#[tokio::test(start_paused = true)]
async fn restart_during_cycle_keeps_one_loop() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = Arc::new(SlowSheet::new(Duration::from_millis(200)));
    let store = CatalogStore::new(dir.path().join("products.json"), dir.path().join("backups"));
    let svc = Arc::new(
        PollingService::new(
            sheet.clone(),
            SHEET,
            ChangeDetector::new(dir.path().join("state.json")),
            DataProcessor::new(store, "google_sheets"),
            recorder(dir.path()),
        )
        .with_intervals(Duration::from_secs(3600), Duration::from_secs(3600)),
    );

    svc.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    svc.stop().unwrap();
    svc.start().unwrap();
    tokio::time::sleep(Duration::from_millis(900)).await;

    // The interrupted cycle plus the first cycle of the new loop.
    assert_eq!(sheet.calls.load(Ordering::SeqCst), 2);
    assert_eq!(sheet.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(svc.status().total_checks, 2);
    assert!(svc.is_running());
    svc.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn loop_recovers_after_fetch_errors() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = Arc::new(InMemorySheet::new());
    let svc = Arc::new(
        service(dir.path(), Arc::clone(&sheet), recorder(dir.path()))
            .with_intervals(Duration::from_millis(50), Duration::from_millis(50)),
    );

    svc.start().unwrap();
    tokio::time::sleep(Duration::from_millis(175)).await;
    let failing = svc.status();
    assert!(failing.errors >= 1);
    assert_eq!(failing.total_checks, 0);
    assert!(failing.is_running);

    sheet.set_rows(SHEET, rows(&[&["Model", "Product Name"], &["M1", "Lamp"]]));
    tokio::time::sleep(Duration::from_millis(300)).await;
    let recovered = svc.status();
    assert!(recovered.total_checks >= 1);
    assert_eq!(recovered.errors, failing.errors);
    assert_eq!(recovered.products_added, 1);
    assert!(svc.is_running());
    svc.stop().unwrap();
}
