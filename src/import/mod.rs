use std::path::Path;

use crate::core::{CatalogError, ProductRecord, SkipReason};

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Parse(String),
    Catalog(CatalogError),
    /// The file extension does not name a supported format.
    UnsupportedFormat(String),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(e) => write!(f, "io error: {e}"),
            ImportError::Parse(e) => write!(f, "parse error: {e}"),
            ImportError::Catalog(e) => write!(f, "catalog error: {e}"),
            ImportError::UnsupportedFormat(ext) => write!(f, "unsupported import format: {ext}"),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io(e) => Some(e),
            ImportError::Catalog(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(e: std::io::Error) -> Self {
        ImportError::Io(e)
    }
}

impl From<CatalogError> for ImportError {
    fn from(e: CatalogError) -> Self {
        ImportError::Catalog(e)
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(e: serde_json::Error) -> Self {
        ImportError::Parse(e.to_string())
    }
}

/// Products read from a file plus the rows that could not be used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub products: Vec<ProductRecord>,
    /// 1-based row (CSV) or list position (JSON) and why it was skipped.
    pub skipped: Vec<(usize, SkipReason)>,
}

/// Imports a `.csv` or `.json` file, chosen by extension.
pub fn import_path(path: &Path) -> Result<ImportReport, ImportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => csv::parse(path),
        "json" => json::parse(path),
        other => Err(ImportError::UnsupportedFormat(other.to_string())),
    }
}

pub mod csv;
pub mod json;
