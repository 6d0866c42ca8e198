use std::io::Read;
use std::path::Path;

use chrono::Utc;
use csv::ReaderBuilder;
use tracing::{info, warn};

use super::{ImportError, ImportReport};
use crate::core::{Field, HeaderMap};

/// Reads every record of a CSV source as raw cells, header included.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<Vec<String>>, ImportError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| ImportError::Parse(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Maps a snapshot (header first) into products the same way a poll does.
pub fn map_rows(rows: &[Vec<String>], source: &str) -> Result<ImportReport, ImportError> {
    let Some(headers) = rows.first() else {
        return Ok(ImportReport::default());
    };
    let map = HeaderMap::resolve(headers);
    if !map.contains(Field::Model) {
        return Err(ImportError::Parse(
            "header row has no model number column".to_string(),
        ));
    }
    let now = Utc::now();
    let mut report = ImportReport::default();
    for (index, row) in rows.iter().enumerate().skip(1) {
        match map.to_product(row, Some(index), source, now) {
            Ok(product) => report.products.push(product),
            Err(reason) => {
                warn!(row = index, reason = %reason, "Skipping CSV row");
                report.skipped.push((index, reason));
            }
        }
    }
    Ok(report)
}

pub fn parse_str(input: &str) -> Result<ImportReport, ImportError> {
    map_rows(&read_rows(input.as_bytes())?, "csv")
}

pub fn parse(path: &Path) -> Result<ImportReport, ImportError> {
    let file = std::fs::File::open(path)?;
    let report = map_rows(&read_rows(file)?, "csv")?;
    info!(
        path = %path.display(),
        products = report.products.len(),
        skipped = report.skipped.len(),
        "Parsed CSV file"
    );
    Ok(report)
}
