//! Snapshot diffing against the fingerprint persisted by the previous poll.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::fingerprint::Fingerprint;

/// Contents of the polling state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncState {
    pub last_sync: Option<DateTime<Utc>>,
    pub row_count: usize,
    pub data_hash: Option<String>,
    pub sheet_fingerprint: Option<Fingerprint>,
}

/// A row whose content changed at an existing position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedRow {
    /// 1-based data row position.
    pub row_index: usize,
    pub row_data: Vec<String>,
    pub previous_hash: String,
    pub current_hash: String,
}

/// A position that existed in the previous snapshot but not in the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedRow {
    pub row_index: usize,
    pub previous_hash: String,
}

/// Classified difference between two successive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    pub has_changes: bool,
    pub new_rows: Vec<Vec<String>>,
    pub modified_rows: Vec<ModifiedRow>,
    pub deleted_rows: Vec<DeletedRow>,
    pub total_rows: usize,
    pub previous_rows: usize,
    /// Fingerprint of the current snapshot, to be committed once the
    /// changes have been applied.
    #[serde(skip)]
    pub fingerprint: Fingerprint,
}

impl ChangeSet {
    pub fn new_row_count(&self) -> usize {
        self.new_rows.len()
    }

    pub fn modified_row_count(&self) -> usize {
        self.modified_rows.len()
    }

    pub fn deleted_row_count(&self) -> usize {
        self.deleted_rows.len()
    }
}

/// Detects changes in a spreadsheet between polls using fingerprints.
pub struct ChangeDetector {
    state_path: PathBuf,
    state: SyncState,
}

impl ChangeDetector {
    /// Loads the state file at `state_path`. Unreadable state is treated as
    /// "no prior state".
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let state = load_state(&state_path);
        Self { state_path, state }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Computes the change set for `snapshot` without touching the state file.
    pub fn preview(&self, snapshot: &[Vec<String>]) -> ChangeSet {
        let current = Fingerprint::of(snapshot);
        let previous = self.state.sheet_fingerprint.as_ref();
        let previous_rows = previous.map_or(0, |p| p.row_count);

        let mut changes = ChangeSet {
            has_changes: false,
            new_rows: Vec::new(),
            modified_rows: Vec::new(),
            deleted_rows: Vec::new(),
            total_rows: current.row_count,
            previous_rows,
            fingerprint: current.clone(),
        };

        if previous.is_some_and(|p| p.data_hash == current.data_hash) {
            debug!(rows = current.row_count, "Snapshot hash unchanged");
            return changes;
        }
        changes.has_changes = true;

        if current.row_count > previous_rows {
            // Snapshot row 0 is the header, so data row n sits at snapshot[n].
            changes.new_rows = snapshot[previous_rows + 1..].to_vec();
        }

        if let Some(previous) = previous {
            for (index, previous_hash) in &previous.row_hashes {
                match current.row_hashes.get(index) {
                    Some(current_hash) if current_hash != previous_hash => {
                        changes.modified_rows.push(ModifiedRow {
                            row_index: *index,
                            row_data: snapshot[*index].clone(),
                            previous_hash: previous_hash.clone(),
                            current_hash: current_hash.clone(),
                        });
                    }
                    Some(_) => {}
                    None => changes.deleted_rows.push(DeletedRow {
                        row_index: *index,
                        previous_hash: previous_hash.clone(),
                    }),
                }
            }
        }

        info!(
            new = changes.new_row_count(),
            modified = changes.modified_row_count(),
            deleted = changes.deleted_row_count(),
            total = changes.total_rows,
            "Detected spreadsheet changes"
        );
        changes
    }

    /// Persists `fingerprint` as the baseline for the next poll.
    pub fn commit(&mut self, fingerprint: Fingerprint) {
        self.state.row_count = fingerprint.row_count;
        self.state.data_hash = Some(fingerprint.data_hash.clone());
        self.state.sheet_fingerprint = Some(fingerprint);
        self.state.last_sync = Some(Utc::now());
        save_state(&self.state_path, &self.state);
    }

    /// Detects changes and immediately records the new baseline.
    pub fn detect_changes(&mut self, snapshot: &[Vec<String>]) -> ChangeSet {
        let changes = self.preview(snapshot);
        self.commit(changes.fingerprint.clone());
        changes
    }

    /// Forgets the baseline so the next snapshot looks entirely new.
    pub fn reset(&mut self) {
        self.state = SyncState::default();
        save_state(&self.state_path, &self.state);
    }
}

fn load_state(path: &Path) -> SyncState {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No polling state found, starting fresh");
            return SyncState::default();
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read polling state");
            return SyncState::default();
        }
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Polling state is corrupt, starting fresh");
        SyncState::default()
    })
}

fn save_state(path: &Path, state: &SyncState) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!(path = %parent.display(), error = %e, "Failed to create state directory");
            return;
        }
    }
    let data = match serde_json::to_string_pretty(state) {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, "Failed to serialize polling state");
            return;
        }
    };
    if let Err(e) = std::fs::write(path, data) {
        error!(path = %path.display(), error = %e, "Failed to save polling state");
    }
}
