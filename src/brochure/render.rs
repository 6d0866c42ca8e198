use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;
use tracing::info;

use super::CategoryGroup;
use crate::polling::PollingStatus;

const BROCHURE: &str = "brochure";
const CATALOG_LIVE: &str = "catalog_live";
const DASHBOARD: &str = "dashboard";

#[derive(Debug)]
pub enum RenderError {
    Template(String),
    Render(String),
    Io(std::io::Error),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Template(e) => write!(f, "template error: {e}"),
            RenderError::Render(e) => write!(f, "render error: {e}"),
            RenderError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RenderError {
    fn from(e: std::io::Error) -> Self {
        RenderError::Io(e)
    }
}

impl From<handlebars::TemplateError> for RenderError {
    fn from(e: handlebars::TemplateError) -> Self {
        RenderError::Template(e.to_string())
    }
}

impl From<handlebars::RenderError> for RenderError {
    fn from(e: handlebars::RenderError) -> Self {
        RenderError::Render(e.to_string())
    }
}

/// `1299.5` -> `$1,299.50`.
pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// Keeps the first `count` words, appending `...` when text was cut.
pub fn truncate_words(text: &str, count: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= count {
        return text.to_string();
    }
    format!("{}...", words[..count].join(" "))
}

handlebars_helper!(currency_helper: |value: f64| format_currency(value));
handlebars_helper!(truncate_helper: |text: str, count: u64| truncate_words(text, count as usize));

#[derive(Serialize)]
struct BrochureContext<'a> {
    company_name: &'a str,
    theme: &'a str,
    generation_date: String,
    total_products: usize,
    category_names: Vec<&'a str>,
    categories: &'a [CategoryGroup],
    last_sync: Option<String>,
}

#[derive(Serialize)]
struct DashboardContext<'a> {
    company_name: &'a str,
    theme: &'a str,
    status: &'a PollingStatus,
    categories: Vec<CategoryCount<'a>>,
}

#[derive(Serialize)]
struct CategoryCount<'a> {
    name: &'a str,
    count: usize,
}

/// Renders the brochure, the live catalog page and the dashboard from the
/// templates compiled into the binary.
pub struct BrochureRenderer {
    registry: Handlebars<'static>,
    theme: String,
    company_name: String,
}

impl BrochureRenderer {
    pub fn new(
        theme: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Result<Self, RenderError> {
        let mut registry = Handlebars::new();
        registry.register_helper("currency", Box::new(currency_helper));
        registry.register_helper("truncate_words", Box::new(truncate_helper));
        registry.register_partial("styles", include_str!("templates/styles.hbs"))?;
        registry.register_partial("product_card", include_str!("templates/product_card.hbs"))?;
        registry.register_template_string(BROCHURE, include_str!("templates/brochure.hbs"))?;
        registry
            .register_template_string(CATALOG_LIVE, include_str!("templates/catalog_live.hbs"))?;
        registry.register_template_string(DASHBOARD, include_str!("templates/dashboard.hbs"))?;
        Ok(Self {
            registry,
            theme: theme.into(),
            company_name: company_name.into(),
        })
    }

    fn context<'a>(
        &'a self,
        groups: &'a [CategoryGroup],
        last_sync: Option<DateTime<Utc>>,
    ) -> BrochureContext<'a> {
        BrochureContext {
            company_name: &self.company_name,
            theme: &self.theme,
            generation_date: Local::now().format("%B %d, %Y").to_string(),
            total_products: groups.iter().map(|g| g.count).sum(),
            category_names: groups.iter().map(|g| g.name.as_str()).collect(),
            categories: groups,
            last_sync: last_sync.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        }
    }

    pub fn render_brochure(&self, groups: &[CategoryGroup]) -> Result<String, RenderError> {
        Ok(self.registry.render(BROCHURE, &self.context(groups, None))?)
    }

    /// Writes `brochure.html` into `out_dir` and returns its path.
    pub fn write_brochure(
        &self,
        groups: &[CategoryGroup],
        out_dir: &Path,
    ) -> Result<PathBuf, RenderError> {
        std::fs::create_dir_all(out_dir)?;
        let html = self.render_brochure(groups)?;
        let path = out_dir.join("brochure.html");
        std::fs::write(&path, html)?;
        info!(path = %path.display(), categories = groups.len(), "Brochure rendered");
        Ok(path)
    }

    /// The `/catalog` page. It reloads itself when a change notification arrives.
    pub fn render_live_catalog(
        &self,
        groups: &[CategoryGroup],
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<String, RenderError> {
        Ok(self.registry.render(CATALOG_LIVE, &self.context(groups, last_sync))?)
    }

    pub fn render_dashboard(
        &self,
        status: &PollingStatus,
        categories: &[(String, usize)],
    ) -> Result<String, RenderError> {
        let context = DashboardContext {
            company_name: &self.company_name,
            theme: &self.theme,
            status,
            categories: categories
                .iter()
                .map(|(name, count)| CategoryCount { name, count: *count })
                .collect(),
        };
        Ok(self.registry.render(DASHBOARD, &context)?)
    }
}
