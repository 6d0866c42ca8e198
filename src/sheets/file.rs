use std::path::PathBuf;

use csv::ReaderBuilder;

use super::{SheetFuture, SpreadsheetError, SpreadsheetSource};

/// Source that reads spreadsheet snapshots from `<base_dir>/<id>.csv`.
///
/// The CSV header is returned as row 0, exactly like the remote API.
pub struct CsvDirectorySource {
    base_dir: PathBuf,
}

impl CsvDirectorySource {
    /// Create a new source rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn sheet_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}.csv"))
    }

    fn read_rows(&self, spreadsheet_id: &str) -> Result<Vec<Vec<String>>, SpreadsheetError> {
        let path = self.sheet_path(spreadsheet_id);
        if !path.exists() {
            return Err(SpreadsheetError::SheetNotFound);
        }
        let file =
            std::fs::File::open(&path).map_err(|e| SpreadsheetError::Transient(e.to_string()))?;
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);
        let mut rows = Vec::new();
        for record in rdr.records() {
            let rec = record.map_err(|e| SpreadsheetError::Permanent(e.to_string()))?;
            rows.push(rec.iter().map(|s| s.to_string()).collect());
        }
        Ok(rows)
    }
}

impl Default for CsvDirectorySource {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl SpreadsheetSource for CsvDirectorySource {
    fn fetch_rows<'a>(&'a self, spreadsheet_id: &'a str) -> SheetFuture<'a, Vec<Vec<String>>> {
        Box::pin(async move { self.read_rows(spreadsheet_id) })
    }
}
