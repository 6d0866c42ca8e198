//! Product description and specification clean-up through the OpenRouter
//! chat-completions API.

use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::core::ProductRecord;
use crate::core::utils::parse_specifications;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-pro-exp-03-25";

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

#[derive(Debug)]
pub enum EnhanceError {
    Transport(String),
    Status { code: u16, body: String },
    InvalidResponse(String),
}

impl std::fmt::Display for EnhanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnhanceError::Transport(e) => write!(f, "request failed: {e}"),
            EnhanceError::Status { code, body } => write!(f, "api returned {code}: {body}"),
            EnhanceError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl std::error::Error for EnhanceError {}

/// The JSON object the model is asked to reply with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enhancement {
    pub enhanced_description: String,
    /// `Feature|Value` entries.
    pub enhanced_specifications: Vec<String>,
    pub corrections_made: Vec<String>,
}

impl Enhancement {
    /// Writes the improved description and specifications into `record`.
    /// Empty fields leave the record's current values in place.
    pub fn apply_to(&self, record: &mut ProductRecord) {
        let description = self.enhanced_description.trim();
        if !description.is_empty() {
            record.specifications.description = description.to_string();
        }
        let specs: Vec<&str> = self
            .enhanced_specifications
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !specs.is_empty() {
            record.specifications.specifications = specs.join("|");
        }
        record.updated_at = Utc::now();
    }
}

/// Builds the instruction prompt for one product.
pub fn build_prompt(record: &ProductRecord) -> String {
    let specs = parse_specifications(&record.specifications.specifications);
    let current = if specs.is_empty() {
        "No specifications provided".to_string()
    } else {
        specs
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        r#"You are a technical specification expert. Enhance the following product specifications:

Product: {name}
Category: {category}
Current Description: {description}

Current Specifications:
{current}

Tasks:
1. Fix any technical inaccuracies or unclear specifications
2. Add missing relevant technical specifications for this product category
3. Ensure all specifications use proper pipe-separated format (Feature|Value)
4. Provide a more detailed and accurate product description
5. Maintain consistency with the product category and name

Return your response in this exact JSON format:
{{
  "enhanced_description": "Improved product description here",
  "enhanced_specifications": ["Feature 1|Value 1", "Feature 2|Value 2"],
  "corrections_made": ["Description of correction 1"]
}}

Ensure all specifications are technically accurate and relevant to {category} products."#,
        name = record.name,
        category = record.category,
        description = record.specifications.description,
    )
}

/// Extracts the JSON object between the first `{` and the last `}` of a
/// model reply, which may be wrapped in prose or code fences.
pub fn parse_enhancement(content: &str) -> Result<Enhancement, EnhanceError> {
    let start = content.find('{');
    let end = content.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&content[start..=end])
            .map_err(|e| EnhanceError::InvalidResponse(e.to_string())),
        _ => Err(EnhanceError::InvalidResponse(
            "reply contains no JSON object".to_string(),
        )),
    }
}

pub struct OpenRouterClient {
    client: HttpsClient,
    api_key: String,
    model_id: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(
        api_key: impl Into<String>,
        model_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, EnhanceError> {
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| EnhanceError::Transport(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(https);
        Ok(Self {
            client,
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Sends one chat completion and returns the reply text.
    pub async fn complete(&self, prompt: &str) -> Result<String, EnhanceError> {
        let payload = json!({
            "model": self.model_id,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.3,
            "max_tokens": 2000,
        });
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .header("HTTP-Referer", "https://github.com/brochure-sync")
            .header("X-Title", "Brochure Technical Specs Enhancer")
            .body(Full::new(Bytes::from(payload.to_string())))
            .map_err(|e| EnhanceError::Transport(e.to_string()))?;
        let res = self
            .client
            .request(req)
            .await
            .map_err(|e| EnhanceError::Transport(e.to_string()))?;
        let status = res.status();
        let bytes = res
            .into_body()
            .collect()
            .await
            .map_err(|e| EnhanceError::Transport(e.to_string()))?
            .to_bytes();
        if !status.is_success() {
            return Err(EnhanceError::Status {
                code: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let body: Value = serde_json::from_slice(&bytes[..])
            .map_err(|e| EnhanceError::InvalidResponse(e.to_string()))?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                EnhanceError::InvalidResponse("missing choices[0].message.content".into())
            })
    }

    /// Asks the model to improve `record` and returns its suggestion.
    pub async fn enhance(&self, record: &ProductRecord) -> Result<Enhancement, EnhanceError> {
        debug!(model = %record.model, "Requesting enhancement");
        let reply = self.complete(&build_prompt(record)).await?;
        let enhancement = parse_enhancement(&reply)?;
        for correction in &enhancement.corrections_made {
            info!(model = %record.model, correction = %correction, "Correction suggested");
        }
        Ok(enhancement)
    }

    /// Enhances `record` in place. Failures are logged and the record is
    /// left unchanged. Returns whether the record was modified.
    pub async fn enhance_in_place(&self, record: &mut ProductRecord) -> bool {
        match self.enhance(record).await {
            Ok(enhancement) => {
                enhancement.apply_to(record);
                true
            }
            Err(e) => {
                warn!(model = %record.model, error = %e, "Enhancement failed");
                false
            }
        }
    }
}
