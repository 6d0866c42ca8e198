use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::catalog::{Catalog, CatalogError, CatalogStore};
use super::detector::ChangeSet;
use super::mapping::{Field, HeaderMap, SkipReason};
use super::ProductRecord;

#[derive(Debug)]
pub enum ProcessError {
    /// The header row has no column that maps to the model number.
    MissingKeyColumn,
    Catalog(CatalogError),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::MissingKeyColumn => {
                write!(f, "spreadsheet header has no model number column")
            }
            ProcessError::Catalog(e) => write!(f, "catalog error: {e}"),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Catalog(e) => Some(e),
            ProcessError::MissingKeyColumn => None,
        }
    }
}

impl From<CatalogError> for ProcessError {
    fn from(e: CatalogError) -> Self {
        ProcessError::Catalog(e)
    }
}

/// What a merge did to the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub inserted: Vec<ProductRecord>,
    pub updated: Vec<ProductRecord>,
    pub removed: Vec<ProductRecord>,
    /// 1-based data row and the reason it was skipped.
    pub skipped: Vec<(usize, SkipReason)>,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Merges spreadsheet change sets into the persisted catalog.
#[derive(Debug, Clone)]
pub struct DataProcessor {
    store: CatalogStore,
    source: String,
}

impl DataProcessor {
    pub fn new(store: CatalogStore, source: impl Into<String>) -> Self {
        Self {
            store,
            source: source.into(),
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Applies `changes` detected on `snapshot` to the catalog and saves it.
    ///
    /// New and modified rows are upserted by model number. Entries whose model
    /// number no longer appears anywhere in `snapshot` are removed.
    pub fn apply(
        &self,
        snapshot: &[Vec<String>],
        changes: &ChangeSet,
    ) -> Result<MergeOutcome, ProcessError> {
        let headers = snapshot.first().map(Vec::as_slice).unwrap_or_default();
        let map = HeaderMap::resolve(headers);
        if !map.contains(Field::Model) {
            return Err(ProcessError::MissingKeyColumn);
        }

        let current_keys: HashSet<&str> = snapshot
            .iter()
            .skip(1)
            .filter_map(|row| map.model(row))
            .collect();

        let mut catalog = self.store.load()?;
        let mut outcome = MergeOutcome::default();
        let now = Utc::now();

        let first_new = changes.previous_rows + 1;
        for (offset, row) in changes.new_rows.iter().enumerate() {
            let sheet_row = first_new + offset;
            match map.to_product(row, Some(sheet_row), &self.source, now) {
                Ok(record) => {
                    if catalog.upsert(record.clone()) {
                        debug!(
                            model = %record.model,
                            sheet_row,
                            "Model already in catalog, replacing"
                        );
                        outcome.updated.push(record);
                    } else {
                        outcome.inserted.push(record);
                    }
                }
                Err(reason) => skip(&mut outcome, sheet_row, reason),
            }
        }

        for modified in &changes.modified_rows {
            let sheet_row = Some(modified.row_index);
            match map.to_product(&modified.row_data, sheet_row, &self.source, now) {
                Ok(record) => {
                    if catalog.upsert(record.clone()) {
                        outcome.updated.push(record);
                    } else {
                        outcome.inserted.push(record);
                    }
                }
                Err(reason) => skip(&mut outcome, modified.row_index, reason),
            }
        }

        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut catalog.products)
            .into_iter()
            .partition(|p| current_keys.contains(p.primary_key()));
        catalog.products = kept;
        outcome.removed = removed;

        // Rows the position diff did not report but the catalog lacks, e.g.
        // after a row was inserted mid-sheet or the catalog was edited by hand.
        let already_skipped: HashSet<usize> = outcome.skipped.iter().map(|(i, _)| *i).collect();
        for (sheet_row, row) in snapshot.iter().enumerate().skip(1) {
            let Some(model) = map.model(row) else {
                continue;
            };
            if already_skipped.contains(&sheet_row) || catalog.find_by_key(model).is_some() {
                continue;
            }
            match map.to_product(row, Some(sheet_row), &self.source, now) {
                Ok(record) => {
                    info!(model = %record.model, sheet_row, "Restoring missing catalog entry");
                    catalog.products.push(record.clone());
                    outcome.inserted.push(record);
                }
                Err(reason) => skip(&mut outcome, sheet_row, reason),
            }
        }

        if outcome.is_empty() {
            info!(skipped = outcome.skipped.len(), "No catalog changes to save");
            return Ok(outcome);
        }
        self.store.save(&mut catalog, &self.source)?;
        info!(
            inserted = outcome.inserted.len(),
            updated = outcome.updated.len(),
            removed = outcome.removed.len(),
            skipped = outcome.skipped.len(),
            total = catalog.products.len(),
            "Catalog updated"
        );
        Ok(outcome)
    }

    /// Replaces the whole catalog with `records`, last duplicate winning.
    pub fn replace_all(&self, records: Vec<ProductRecord>) -> Result<Catalog, ProcessError> {
        let mut catalog = Catalog::default();
        for record in records {
            catalog.upsert(record);
        }
        self.store.save(&mut catalog, &self.source)?;
        Ok(catalog)
    }
}

fn skip(outcome: &mut MergeOutcome, sheet_row: usize, reason: SkipReason) {
    warn!(sheet_row, reason = %reason, "Skipping spreadsheet row");
    outcome.skipped.push((sheet_row, reason));
}
