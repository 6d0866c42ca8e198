//! Product records and the spreadsheet reconciliation core.

pub mod catalog;
pub mod detector;
pub mod fingerprint;
pub mod mapping;
pub mod processor;
pub mod utils;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use catalog::{Catalog, CatalogError, CatalogMetadata, CatalogStore, ValidationIssue};
pub use detector::{ChangeDetector, ChangeSet, DeletedRow, ModifiedRow, SyncState};
pub use fingerprint::Fingerprint;
pub use mapping::{Field, HeaderMap, SkipReason};
pub use processor::{DataProcessor, MergeOutcome, ProcessError};

/// Descriptive fields of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Specifications {
    pub description: String,
    /// Pipe-separated `Feature|Value` pairs.
    pub specifications: String,
    pub features: String,
    pub communication_protocol: String,
    pub power_source: String,
    pub country: String,
    pub moq: String,
    pub lead_time: String,
}

/// Where a product came from and the raw values it was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provenance {
    pub enhanced_id: String,
    pub drive_link: String,
    pub price_raw: String,
    pub ref_heyzack: Option<String>,
    pub designation_fr: Option<String>,
    pub catalogue: Option<String>,
    pub packing: Option<String>,
    /// `google_sheets`, `csv` or `json`.
    pub source: String,
    /// 1-based data row the record was parsed from, when it came from a sheet.
    pub sheet_row: Option<usize>,
}

/// A normalized product as stored in the catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub model: String,
    pub supplier: String,
    pub category: String,
    pub price: f64,
    pub currency: String,
    pub status: String,
    pub images: Vec<String>,
    pub specifications: Specifications,
    pub metadata: Provenance,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Default for ProductRecord {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: String::new(),
            model: String::new(),
            supplier: String::new(),
            category: String::new(),
            price: 0.0,
            currency: "USD".to_string(),
            status: "published".to_string(),
            images: Vec::new(),
            specifications: Specifications::default(),
            metadata: Provenance::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl ProductRecord {
    /// Key used to match records across polls: the model number, or the
    /// record id when no model is known.
    pub fn primary_key(&self) -> &str {
        let model = self.model.trim();
        if model.is_empty() { self.id.trim() } else { model }
    }

    /// Whether the product should appear in "active only" brochures.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status.to_lowercase().as_str(),
            "active" | "available" | "in_stock" | "published"
        )
    }
}
