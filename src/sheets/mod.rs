//! Sources of raw spreadsheet rows.

pub mod file;
pub mod google;
pub mod retry;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tracing::warn;

pub use file::CsvDirectorySource;
pub use google::GoogleSheetsClient;
pub use retry::RetryingSource;

/// Represents errors that can occur when reading from a spreadsheet source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpreadsheetError {
    /// The requested spreadsheet or sheet does not exist.
    SheetNotFound,
    /// The input could not be turned into a spreadsheet ID.
    InvalidUrl(String),
    /// The source only supports reads.
    ReadOnly,
    /// A temporary failure (network, rate limit, server error).
    Transient(String),
    /// A failure that will not go away by retrying.
    Permanent(String),
}

impl SpreadsheetError {
    /// Whether the operation may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SpreadsheetError::Transient(_))
    }
}

impl std::fmt::Display for SpreadsheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpreadsheetError::SheetNotFound => write!(f, "sheet not found"),
            SpreadsheetError::InvalidUrl(url) => write!(f, "invalid spreadsheet url: {url}"),
            SpreadsheetError::ReadOnly => write!(f, "spreadsheet source is read-only"),
            SpreadsheetError::Transient(e) => write!(f, "transient error: {e}"),
            SpreadsheetError::Permanent(e) => write!(f, "permanent error: {e}"),
        }
    }
}

impl std::error::Error for SpreadsheetError {}

/// Boxed future returned by [`SpreadsheetSource`] operations.
pub type SheetFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, SpreadsheetError>> + Send + 'a>>;

/// A single-cell write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    /// A1 notation range, e.g. `All Products!D7`.
    pub range: String,
    pub value: String,
}

/// Abstraction over services that hand out spreadsheet snapshots.
pub trait SpreadsheetSource: Send + Sync + 'static {
    /// Fetches every row of the configured sheet. Row 0 is the header.
    fn fetch_rows<'a>(&'a self, spreadsheet_id: &'a str) -> SheetFuture<'a, Vec<Vec<String>>>;

    /// Writes cells back to the sheet. Sources are read-only unless they say
    /// otherwise.
    fn batch_update_cells<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        updates: &'a [CellUpdate],
    ) -> SheetFuture<'a, ()> {
        Box::pin(async move {
            warn!(
                spreadsheet_id,
                updates = updates.len(),
                "Cannot update a read-only spreadsheet source"
            );
            Err(SpreadsheetError::ReadOnly)
        })
    }
}

/// In-memory source used by tests and local experiments.
#[derive(Default)]
pub struct InMemorySheet {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
}

impl InMemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the rows stored under `spreadsheet_id`.
    pub fn set_rows(&self, spreadsheet_id: &str, rows: Vec<Vec<String>>) {
        if let Ok(mut sheets) = self.sheets.lock() {
            sheets.insert(spreadsheet_id.to_string(), rows);
        }
    }
}

impl SpreadsheetSource for InMemorySheet {
    fn fetch_rows<'a>(&'a self, spreadsheet_id: &'a str) -> SheetFuture<'a, Vec<Vec<String>>> {
        Box::pin(async move {
            let sheets = self
                .sheets
                .lock()
                .map_err(|e| SpreadsheetError::Permanent(e.to_string()))?;
            sheets
                .get(spreadsheet_id)
                .cloned()
                .ok_or(SpreadsheetError::SheetNotFound)
        })
    }
}

/// Extracts the spreadsheet ID from a Google Sheets URL. Bare IDs are
/// returned unchanged.
pub fn extract_spreadsheet_id(input: &str) -> Result<String, SpreadsheetError> {
    let input = input.trim();
    if let Some(start) = input.find("/spreadsheets/d/") {
        let rest = &input[start + "/spreadsheets/d/".len()..];
        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let id = &rest[..end];
        if id.is_empty() {
            return Err(SpreadsheetError::InvalidUrl(input.to_string()));
        }
        return Ok(id.to_string());
    }
    let bare = !input.is_empty()
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if bare {
        Ok(input.to_string())
    } else {
        Err(SpreadsheetError::InvalidUrl(input.to_string()))
    }
}

/// Extracts the file ID from a Google Drive `/file/d/<id>/view` link.
pub fn extract_drive_file_id(url: &str) -> Option<&str> {
    let start = url.find("/file/d/")? + "/file/d/".len();
    let rest = &url[start..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let id = &rest[..end];
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_edit_url() {
        let url = "https://docs.google.com/spreadsheets/d/17xcmTsSZ_k-8/edit?gid=86173031#gid=86173031";
        assert_eq!(extract_spreadsheet_id(url).unwrap(), "17xcmTsSZ_k-8");
    }

    #[test]
    fn accepts_bare_id() {
        assert_eq!(extract_spreadsheet_id("abc123").unwrap(), "abc123");
    }

    #[test]
    fn rejects_other_urls() {
        let err = extract_spreadsheet_id("https://example.com/sheet").unwrap_err();
        assert!(matches!(err, SpreadsheetError::InvalidUrl(_)));
    }

    #[test]
    fn drive_file_id() {
        let url = "https://drive.google.com/file/d/1AbC/view?usp=sharing";
        assert_eq!(extract_drive_file_id(url), Some("1AbC"));
        assert_eq!(extract_drive_file_id("https://example.com/a.jpg"), None);
    }

    #[tokio::test]
    async fn in_memory_sheet_is_read_only() {
        let sheet = InMemorySheet::new();
        sheet.set_rows("s1", vec![vec!["Model".into()]]);
        assert_eq!(sheet.fetch_rows("s1").await.unwrap().len(), 1);
        assert_eq!(
            sheet.fetch_rows("missing").await.unwrap_err(),
            SpreadsheetError::SheetNotFound
        );
        let update = CellUpdate {
            range: "A1".into(),
            value: "x".into(),
        };
        let err = sheet
            .batch_update_cells("s1", std::slice::from_ref(&update))
            .await
            .unwrap_err();
        assert_eq!(err, SpreadsheetError::ReadOnly);
    }
}
