//! The persisted product catalog and its aggregate metadata.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use iso_currency::Currency;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::ProductRecord;

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "io error: {e}"),
            CatalogError::Parse(e) => write!(f, "parse error: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Io(e) => Some(e),
            CatalogError::Parse(_) => None,
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        CatalogError::Io(e)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Parse(e.to_string())
    }
}

/// Aggregates recomputed from the product list on every write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogMetadata {
    pub total_products: usize,
    pub categories: Vec<String>,
    pub categories_count: usize,
    pub suppliers: Vec<String>,
    pub suppliers_count: usize,
    pub average_price: f64,
    pub last_synchronized: Option<DateTime<Utc>>,
    pub source: String,
}

/// A problem found by [`Catalog::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    DuplicateModel(String),
    MissingName { id: String },
    NegativePrice { id: String },
    UnknownCurrency { id: String, code: String },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::DuplicateModel(model) => write!(f, "duplicate model number {model}"),
            ValidationIssue::MissingName { id } => write!(f, "product {id} has no name"),
            ValidationIssue::NegativePrice { id } => write!(f, "product {id} has a negative price"),
            ValidationIssue::UnknownCurrency { id, code } => {
                write!(f, "product {id} uses unknown currency {code}")
            }
        }
    }
}

/// The catalog file: `{ metadata, products }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub metadata: CatalogMetadata,
    pub products: Vec<ProductRecord>,
}

impl Catalog {
    pub fn new(products: Vec<ProductRecord>) -> Self {
        let mut catalog = Self {
            metadata: CatalogMetadata::default(),
            products,
        };
        catalog.recompute_metadata();
        catalog
    }

    /// Recomputes counts, sorted category and supplier lists and the average
    /// of positive prices. `last_synchronized` and `source` are left alone.
    pub fn recompute_metadata(&mut self) {
        let categories: BTreeSet<&str> = self
            .products
            .iter()
            .map(|p| p.category.trim())
            .filter(|c| !c.is_empty())
            .collect();
        let suppliers: BTreeSet<&str> = self
            .products
            .iter()
            .map(|p| p.supplier.trim())
            .filter(|s| !s.is_empty())
            .collect();
        let prices: Vec<f64> = self
            .products
            .iter()
            .map(|p| p.price)
            .filter(|p| *p > 0.0)
            .collect();

        let meta = &mut self.metadata;
        meta.total_products = self.products.len();
        meta.categories = categories.iter().map(|c| c.to_string()).collect();
        meta.categories_count = meta.categories.len();
        meta.suppliers = suppliers.iter().map(|s| s.to_string()).collect();
        meta.suppliers_count = meta.suppliers.len();
        meta.average_price = if prices.is_empty() {
            0.0
        } else {
            prices.iter().sum::<f64>() / prices.len() as f64
        };
    }

    pub fn find_by_key(&self, key: &str) -> Option<usize> {
        self.products.iter().position(|p| p.primary_key() == key)
    }

    /// Inserts `record`, replacing any entry with the same primary key.
    /// Returns `true` when an existing entry was replaced.
    pub fn upsert(&mut self, record: ProductRecord) -> bool {
        match self.find_by_key(record.primary_key()) {
            Some(index) => {
                self.products[index] = record;
                true
            }
            None => {
                self.products.push(record);
                false
            }
        }
    }

    /// Number of products per category, in first-seen order.
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for product in &self.products {
            let category = match product.category.trim() {
                "" => "Uncategorized",
                c => c,
            };
            match counts.iter_mut().find(|(c, _)| c == category) {
                Some((_, n)) => *n += 1,
                None => counts.push((category.to_string(), 1)),
            }
        }
        counts
    }

    /// Checks the ingestion invariants and reports every violation.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for product in &self.products {
            let model = product.model.trim();
            if !model.is_empty() {
                let count = seen.entry(model).or_insert(0);
                *count += 1;
                if *count == 2 {
                    issues.push(ValidationIssue::DuplicateModel(model.to_string()));
                }
            }
            if product.name.trim().is_empty() {
                issues.push(ValidationIssue::MissingName {
                    id: product.id.clone(),
                });
            }
            if product.price < 0.0 {
                issues.push(ValidationIssue::NegativePrice {
                    id: product.id.clone(),
                });
            }
            if Currency::from_code(&product.currency).is_none() {
                issues.push(ValidationIssue::UnknownCurrency {
                    id: product.id.clone(),
                    code: product.currency.clone(),
                });
            }
        }
        issues
    }
}

/// Reads and writes the catalog file, keeping a backup of every prior version.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
    backup_dir: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Loads the catalog. A missing file is an empty catalog.
    pub fn load(&self) -> Result<Catalog, CatalogError> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Catalog file missing, using empty catalog");
                Ok(Catalog::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `catalog` after backing up the current file. Metadata is
    /// recomputed and stamped with `source` first.
    pub fn save(&self, catalog: &mut Catalog, source: &str) -> Result<(), CatalogError> {
        catalog.recompute_metadata();
        catalog.metadata.last_synchronized = Some(Utc::now());
        catalog.metadata.source = source.to_string();
        self.write(catalog).inspect_err(|e| {
            error!(path = %self.path.display(), error = %e, "Failed to save catalog");
        })
    }

    fn write(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let backup = self.backup()?;
        let data = serde_json::to_string_pretty(catalog)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        match backup {
            Some(backup) => info!(
                path = %self.path.display(),
                backup = %backup.display(),
                products = catalog.products.len(),
                "Catalog saved"
            ),
            None => info!(
                path = %self.path.display(),
                products = catalog.products.len(),
                "Catalog created"
            ),
        }
        Ok(())
    }

    fn backup(&self) -> Result<Option<PathBuf>, CatalogError> {
        if !self.path.exists() {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.backup_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("products");
        let target = self
            .backup_dir
            .join(format!("{stem}_pre_update_{stamp}.json"));
        std::fs::copy(&self.path, &target)?;
        Ok(Some(target))
    }

    /// Deletes backups older than `max_age`. Returns how many were removed.
    pub fn cleanup_backups(&self, max_age: Duration) -> Result<usize, CatalogError> {
        let entries = match std::fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), "Removed old backup");
                        removed += 1;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove backup"),
                }
            }
        }
        info!(removed, "Backup cleanup complete");
        Ok(removed)
    }

    /// [`CatalogStore::cleanup_backups`] with the age given in whole days.
    pub fn cleanup_backups_older_than_days(&self, days: u64) -> Result<usize, CatalogError> {
        self.cleanup_backups(Duration::from_secs(days.saturating_mul(86_400)))
    }
}
