use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::utils::{hash_row, hash_rows};

/// Hash-based summary of a spreadsheet snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Number of data rows, header excluded.
    pub row_count: usize,
    pub data_hash: String,
    /// 1-based data row position to row hash.
    #[serde(default)]
    pub row_hashes: BTreeMap<usize, String>,
    pub timestamp: DateTime<Utc>,
}

impl Fingerprint {
    /// Fingerprints `snapshot`, treating row 0 as the header.
    pub fn of(snapshot: &[Vec<String>]) -> Self {
        let data_rows = snapshot.get(1..).unwrap_or_default();
        let row_hashes = data_rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i + 1, hash_row(row)))
            .collect();
        Self {
            row_count: data_rows.len(),
            data_hash: if snapshot.is_empty() {
                String::new()
            } else {
                hash_rows(snapshot)
            },
            row_hashes,
            timestamp: Utc::now(),
        }
    }
}
