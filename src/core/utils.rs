//! Hashing and parsing helpers shared by the detector and the row mapping.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Drops trailing empty cells so that `["a", ""]` and `["a"]` hash the same.
/// The Sheets API omits trailing blanks, CSV exports keep them.
pub fn normalize_row(row: &[String]) -> &[String] {
    let len = row
        .iter()
        .rposition(|cell| !cell.trim().is_empty())
        .map_or(0, |i| i + 1);
    &row[..len]
}

/// Hashes a single row's canonical JSON serialization.
pub fn hash_row(row: &[String]) -> String {
    let normalized = normalize_row(row);
    let serialized = serde_json::to_string(normalized).unwrap_or_default();
    sha256_hex(serialized.as_bytes())
}

/// Hashes a whole snapshot, header included.
pub fn hash_rows(rows: &[Vec<String>]) -> String {
    let normalized: Vec<&[String]> = rows.iter().map(|r| normalize_row(r)).collect();
    let serialized = serde_json::to_string(&normalized).unwrap_or_default();
    sha256_hex(serialized.as_bytes())
}

/// Parses a price cell such as `$12.50`, `US$ 1,299` or `12.5 USD`.
///
/// Returns `None` when the cell holds no number at all.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw.replace(',', "");
    let start = cleaned.find(|c: char| c.is_ascii_digit())?;
    let number: String = cleaned[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.trim_end_matches('.').parse().ok()
}

/// Builds the stable product identifier `<supplier>_<model>`.
pub fn create_product_id(supplier: &str, model: &str) -> String {
    let id = match (supplier.trim(), model.trim()) {
        ("", model) => model.to_string(),
        (supplier, model) => format!("{supplier}_{model}"),
    };
    id.replace([' ', '/'], "_")
}

/// Splits a pipe-separated specification string into `Feature|Value` entries.
pub fn parse_specifications(text: &str) -> Vec<String> {
    text.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.contains(':') {
                s.to_string()
            } else {
                format!("Feature|{s}")
            }
        })
        .collect()
}

/// Turns pipe-separated `key|value|key|value` text into `key: value` lines.
pub fn pair_specifications(text: &str) -> Vec<String> {
    let parts: Vec<&str> = text
        .split('|')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    parts
        .chunks(2)
        .map(|pair| match pair {
            [key, value] => format!("{key}: {value}"),
            [single] => single.to_string(),
            _ => String::new(),
        })
        .collect()
}

/// Converts a Drive "view" link into a URL that serves the image directly.
pub fn drive_direct_url(url: &str) -> String {
    match crate::sheets::extract_drive_file_id(url) {
        Some(id) => format!("https://drive.google.com/uc?export=view&id={id}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_blanks_do_not_change_hash() {
        let a = vec!["M1".to_string(), "Lamp".to_string()];
        let b = vec!["M1".to_string(), "Lamp".to_string(), "".to_string()];
        assert_eq!(hash_row(&a), hash_row(&b));
    }

    #[test]
    fn cell_change_changes_hash() {
        let a = vec!["M1".to_string(), "Lamp".to_string()];
        let b = vec!["M1".to_string(), "Lamp v2".to_string()];
        assert_ne!(hash_row(&a), hash_row(&b));
    }

    #[test]
    fn price_formats() {
        assert_eq!(parse_price("$12.50"), Some(12.5));
        assert_eq!(parse_price("US$ 1,299"), Some(1299.0));
        assert_eq!(parse_price("12.5 USD"), Some(12.5));
        assert_eq!(parse_price("ask"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn product_id_slug() {
        assert_eq!(create_product_id("Acme Co", "X/1"), "Acme_Co_X_1");
        assert_eq!(create_product_id("", "M1"), "M1");
    }

    #[test]
    fn specification_pairs() {
        assert_eq!(
            pair_specifications("Power|5V|Protocol|Zigbee|Waterproof"),
            vec!["Power: 5V", "Protocol: Zigbee", "Waterproof"]
        );
        assert_eq!(
            parse_specifications("Power: 5V | Waterproof"),
            vec!["Power: 5V", "Feature|Waterproof"]
        );
    }

    #[test]
    fn drive_links() {
        assert_eq!(
            drive_direct_url("https://drive.google.com/file/d/abc/view"),
            "https://drive.google.com/uc?export=view&id=abc"
        );
        assert_eq!(drive_direct_url("https://cdn/x.jpg"), "https://cdn/x.jpg");
    }
}
