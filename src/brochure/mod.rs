//! Presentation of the catalog: product selection, category grouping and the
//! view model handed to the templates.

pub mod enhance;
pub mod pdf;
pub mod render;

use serde::Serialize;

use crate::core::utils::pair_specifications;
use crate::core::ProductRecord;

pub use enhance::{Enhancement, EnhanceError, OpenRouterClient};
pub use pdf::{PdfEngine, PdfError, PdfGenerator};
pub use render::{BrochureRenderer, RenderError};

/// Most features shown per product card.
pub const MAX_FEATURES: usize = 10;

/// A product as the templates see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrochureProduct {
    pub id: String,
    pub name: String,
    pub model: String,
    pub supplier: String,
    pub category: String,
    pub price: f64,
    pub currency: String,
    pub status: String,
    pub is_active: bool,
    pub image: Option<String>,
    pub description: String,
    pub features: Vec<String>,
    pub specifications: Vec<String>,
}

impl From<&ProductRecord> for BrochureProduct {
    fn from(p: &ProductRecord) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            model: p.model.clone(),
            supplier: p.supplier.clone(),
            category: category_name(p).to_string(),
            price: p.price,
            currency: p.currency.clone(),
            status: p.status.clone(),
            is_active: p.is_active(),
            image: p.images.first().cloned(),
            description: p.specifications.description.clone(),
            features: extract_features(p),
            specifications: pair_specifications(&p.specifications.specifications),
        }
    }
}

/// Products of one category, in catalog order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup {
    pub name: String,
    pub count: usize,
    pub products: Vec<BrochureProduct>,
}

fn category_name(p: &ProductRecord) -> &str {
    match p.category.trim() {
        "" => "Uncategorized",
        c => c,
    }
}

/// Feature bullets for a product card.
///
/// Uses the explicit features column when present, then the `key|value`
/// specifications, then long pipe-separated fragments of the description.
pub fn extract_features(p: &ProductRecord) -> Vec<String> {
    let specs = &p.specifications;
    let mut features: Vec<String> = specs
        .features
        .split(['|', '\n'])
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if features.is_empty() {
        features = pair_specifications(&specs.specifications);
    }
    if features.is_empty() && specs.description.contains('|') {
        features = specs
            .description
            .split('|')
            .map(|f| {
                f.trim()
                    .trim_start_matches("Features:")
                    .trim_start_matches("Specifications:")
                    .trim()
            })
            .filter(|f| f.len() > 10)
            .map(str::to_string)
            .collect();
    }
    features.truncate(MAX_FEATURES);
    features
}

/// Which products go into a brochure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Category names, compared case-insensitively. Empty selects all.
    pub categories: Vec<String>,
    /// Model numbers. Empty selects all.
    pub models: Vec<String>,
    pub active_only: bool,
}

impl Selection {
    pub fn matches(&self, p: &ProductRecord) -> bool {
        if self.active_only && !p.is_active() {
            return false;
        }
        if !self.categories.is_empty() {
            let category = category_name(p);
            if !self
                .categories
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(category))
            {
                return false;
            }
        }
        self.models.is_empty() || self.models.iter().any(|m| m.trim() == p.model.trim())
    }

    pub fn apply<'a>(&self, products: &'a [ProductRecord]) -> Vec<&'a ProductRecord> {
        products.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Groups products by category, keeping categories in first-seen order.
pub fn group_by_category<'a, I>(products: I) -> Vec<CategoryGroup>
where
    I: IntoIterator<Item = &'a ProductRecord>,
{
    let mut groups: Vec<CategoryGroup> = Vec::new();
    for product in products {
        let view = BrochureProduct::from(product);
        match groups.iter_mut().find(|g| g.name == view.category) {
            Some(group) => group.products.push(view),
            None => groups.push(CategoryGroup {
                name: view.category.clone(),
                count: 0,
                products: vec![view],
            }),
        }
    }
    for group in &mut groups {
        group.count = group.products.len();
    }
    groups
}
