use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tracing::{debug, info};

use super::{SheetFuture, SpreadsheetError, SpreadsheetSource};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Read-only client for the Google Sheets v4 values API, authenticated with
/// an API key.
pub struct GoogleSheetsClient {
    client: HttpsClient,
    api_key: String,
    base_url: String,
    sheet_name: String,
}

impl GoogleSheetsClient {
    /// Create a client using the public API endpoint.
    pub fn new(
        api_key: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Result<Self, SpreadsheetError> {
        Self::with_base_url(api_key, sheet_name, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom base URL (used by tests).
    pub fn with_base_url(
        api_key: impl Into<String>,
        sheet_name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, SpreadsheetError> {
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| SpreadsheetError::Permanent(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(https);
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sheet_name: sheet_name.into(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, SpreadsheetError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(url)
            .body(Full::new(Bytes::new()))
            .map_err(|e| SpreadsheetError::Permanent(e.to_string()))?;
        let res = self
            .client
            .request(req)
            .await
            .map_err(|e| SpreadsheetError::Transient(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }
        let bytes = res
            .into_body()
            .collect()
            .await
            .map_err(|e| SpreadsheetError::Transient(e.to_string()))?
            .to_bytes();
        serde_json::from_slice(&bytes[..]).map_err(|e| SpreadsheetError::Permanent(e.to_string()))
    }

    /// Lists the titles of every sheet (tab) in the spreadsheet.
    pub async fn sheet_titles(
        &self,
        spreadsheet_id: &str,
    ) -> Result<Vec<String>, SpreadsheetError> {
        let url = format!(
            "{}/{}?key={}&fields={}",
            self.base_url,
            spreadsheet_id,
            urlencoding::encode(&self.api_key),
            urlencoding::encode("sheets.properties,properties.title"),
        );
        let body = self.get_json(&url).await?;
        Ok(body["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Fetches an optional A1 range (e.g. `A1:Z100`) of the configured sheet.
    pub async fn fetch_range(
        &self,
        spreadsheet_id: &str,
        range: Option<&str>,
    ) -> Result<Vec<Vec<String>>, SpreadsheetError> {
        let range_name = match range {
            Some(r) => format!("'{}'!{}", self.sheet_name, r),
            None => self.sheet_name.clone(),
        };
        let url = format!(
            "{}/{}/values/{}?key={}&valueRenderOption=FORMATTED_VALUE",
            self.base_url,
            spreadsheet_id,
            urlencoding::encode(&range_name),
            urlencoding::encode(&self.api_key),
        );
        debug!(spreadsheet_id, range = %range_name, "Fetching sheet values");
        let body = self.get_json(&url).await?;
        let rows = parse_values(&body);
        info!(spreadsheet_id, rows = rows.len(), "Fetched sheet values");
        Ok(rows)
    }
}

impl SpreadsheetSource for GoogleSheetsClient {
    fn fetch_rows<'a>(&'a self, spreadsheet_id: &'a str) -> SheetFuture<'a, Vec<Vec<String>>> {
        Box::pin(self.fetch_range(spreadsheet_id, None))
    }
}

fn classify_status(status: StatusCode) -> SpreadsheetError {
    if status == StatusCode::NOT_FOUND {
        SpreadsheetError::SheetNotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SpreadsheetError::Transient(format!("request failed with status {status}"))
    } else {
        SpreadsheetError::Permanent(format!("request failed with status {status}"))
    }
}

/// Converts a `values` response body into rows of strings.
pub fn parse_values(body: &Value) -> Vec<Vec<String>> {
    body["values"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| cells.iter().map(cell_to_string).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
