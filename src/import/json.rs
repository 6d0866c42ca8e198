//! JSON catalog formats: a flat product list, the catalog file itself, and the
//! hierarchical per-category file used by the brochure tooling.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{ImportError, ImportReport};
use crate::core::utils::{create_product_id, drive_direct_url, parse_price};
use crate::core::{Catalog, ProductRecord, Provenance, SkipReason, Specifications};

/// `specifications` is a list of `key|value` strings in newer files and a
/// single string in older ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecificationList {
    List(Vec<String>),
    Text(String),
}

impl Default for SpecificationList {
    fn default() -> Self {
        SpecificationList::List(Vec::new())
    }
}

impl SpecificationList {
    fn joined(&self) -> String {
        match self {
            SpecificationList::List(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("|"),
            SpecificationList::Text(text) => text.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalProduct {
    pub id: String,
    pub supplier: String,
    pub model_number: String,
    pub name: String,
    pub category: String,
    pub status: String,
    pub specifications: SpecificationList,
    pub description: String,
    pub features: String,
    pub price: Option<f64>,
    pub price_raw: String,
    pub currency: String,
    pub drive_link: String,
    pub image: Option<String>,
    pub communication_protocol: String,
    pub power_source: String,
    pub country: String,
    pub moq: String,
    pub lead_time: String,
    pub ref_heyzack: Option<String>,
    pub designation_fr: Option<String>,
    pub catalogue: Option<String>,
    pub packing: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalCategory {
    pub name: String,
    pub products: Vec<HierarchicalProduct>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchicalMetadata {
    pub total_products: usize,
    pub categories_count: usize,
    pub products_with_drive_links: usize,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalCatalog {
    #[serde(default)]
    pub metadata: HierarchicalMetadata,
    pub categories: BTreeMap<String, HierarchicalCategory>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Hierarchical(HierarchicalCatalog),
    Catalog { products: Vec<ProductRecord> },
    List(Vec<ProductRecord>),
}

impl HierarchicalProduct {
    /// Converts to a catalog record. Missing ids are derived from supplier
    /// and model, or generated when there is no model either.
    pub fn to_record(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<ProductRecord, SkipReason> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(SkipReason::MissingName);
        }
        let model = self.model_number.trim();
        let supplier = self.supplier.trim();
        let id = match (self.id.trim(), model) {
            ("", "") => Uuid::new_v4().to_string(),
            ("", model) => create_product_id(supplier, model),
            (id, _) => id.to_string(),
        };
        let mut images = Vec::new();
        if let Some(image) = self.image.as_deref().filter(|i| !i.trim().is_empty()) {
            images.push(image.trim().to_string());
        }
        if !self.drive_link.trim().is_empty() {
            images.push(drive_direct_url(self.drive_link.trim()));
        }
        let price = self
            .price
            .or_else(|| parse_price(&self.price_raw))
            .unwrap_or(0.0);
        let category = match self.category.trim() {
            "" => category.to_string(),
            c => c.to_string(),
        };
        let defaults = ProductRecord::default();

        Ok(ProductRecord {
            id: id.clone(),
            name: name.to_string(),
            model: model.to_string(),
            supplier: supplier.to_string(),
            category,
            price,
            currency: match self.currency.trim() {
                "" => defaults.currency,
                c => c.to_uppercase(),
            },
            status: match self.status.trim() {
                "" => defaults.status,
                s => s.to_string(),
            },
            images,
            specifications: Specifications {
                description: self.description.trim().to_string(),
                specifications: self.specifications.joined(),
                features: self.features.trim().to_string(),
                communication_protocol: self.communication_protocol.clone(),
                power_source: self.power_source.clone(),
                country: self.country.clone(),
                moq: self.moq.clone(),
                lead_time: self.lead_time.clone(),
            },
            metadata: Provenance {
                enhanced_id: id,
                drive_link: self.drive_link.clone(),
                price_raw: self.price_raw.clone(),
                ref_heyzack: self.ref_heyzack.clone(),
                designation_fr: self.designation_fr.clone(),
                catalogue: self.catalogue.clone(),
                packing: self.packing.clone(),
                source: "json".to_string(),
                sheet_row: None,
            },
            created_at: now,
            updated_at: now,
        })
    }

    pub fn from_record(record: &ProductRecord) -> Self {
        let specs = &record.specifications;
        let specifications = specs
            .specifications
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .chunks(2)
            .map(|pair| pair.join("|"))
            .collect();
        Self {
            id: record.id.clone(),
            supplier: record.supplier.clone(),
            model_number: record.model.clone(),
            name: record.name.clone(),
            category: record.category.clone(),
            status: record.status.clone(),
            specifications: SpecificationList::List(specifications),
            description: specs.description.clone(),
            features: specs.features.clone(),
            price: Some(record.price),
            price_raw: record.metadata.price_raw.clone(),
            currency: record.currency.clone(),
            drive_link: record.metadata.drive_link.clone(),
            image: None,
            communication_protocol: specs.communication_protocol.clone(),
            power_source: specs.power_source.clone(),
            country: specs.country.clone(),
            moq: specs.moq.clone(),
            lead_time: specs.lead_time.clone(),
            ref_heyzack: record.metadata.ref_heyzack.clone(),
            designation_fr: record.metadata.designation_fr.clone(),
            catalogue: record.metadata.catalogue.clone(),
            packing: record.metadata.packing.clone(),
        }
    }
}

fn fill_ids(products: Vec<ProductRecord>) -> ImportReport {
    let mut report = ImportReport::default();
    for (index, mut product) in products.into_iter().enumerate() {
        if product.name.trim().is_empty() {
            warn!(position = index + 1, id = %product.id, "Skipping JSON product without a name");
            report.skipped.push((index + 1, SkipReason::MissingName));
            continue;
        }
        if product.id.trim().is_empty() {
            product.id = match product.model.trim() {
                "" => Uuid::new_v4().to_string(),
                model => create_product_id(&product.supplier, model),
            };
        }
        if product.metadata.source.is_empty() {
            product.metadata.source = "json".to_string();
        }
        report.products.push(product);
    }
    report
}

pub fn parse_str(input: &str) -> Result<ImportReport, ImportError> {
    let document: Document = serde_json::from_str(input)?;
    let report = match document {
        Document::List(products) | Document::Catalog { products } => fill_ids(products),
        Document::Hierarchical(tree) => {
            let now = Utc::now();
            let mut report = ImportReport::default();
            let mut position = 0;
            for (category, data) in &tree.categories {
                for product in &data.products {
                    position += 1;
                    match product.to_record(category, now) {
                        Ok(record) => report.products.push(record),
                        Err(reason) => {
                            warn!(
                                position,
                                category = %category,
                                reason = %reason,
                                "Skipping hierarchical product"
                            );
                            report.skipped.push((position, reason));
                        }
                    }
                }
            }
            report
        }
    };
    Ok(report)
}

pub fn parse(path: &Path) -> Result<ImportReport, ImportError> {
    let content = std::fs::read_to_string(path)?;
    let report = parse_str(&content)?;
    info!(
        path = %path.display(),
        products = report.products.len(),
        skipped = report.skipped.len(),
        "Parsed JSON file"
    );
    Ok(report)
}

/// Builds the hierarchical view of `catalog`, grouped by category.
pub fn to_hierarchical(catalog: &Catalog) -> HierarchicalCatalog {
    let mut categories: BTreeMap<String, HierarchicalCategory> = BTreeMap::new();
    for product in &catalog.products {
        let name = match product.category.trim() {
            "" => "Uncategorized",
            c => c,
        };
        categories
            .entry(name.to_string())
            .or_insert_with(|| HierarchicalCategory {
                name: name.to_string(),
                products: Vec::new(),
            })
            .products
            .push(HierarchicalProduct::from_record(product));
    }
    HierarchicalCatalog {
        metadata: HierarchicalMetadata {
            total_products: catalog.products.len(),
            categories_count: categories.len(),
            products_with_drive_links: catalog
                .products
                .iter()
                .filter(|p| !p.metadata.drive_link.trim().is_empty())
                .count(),
            generated_at: Some(Utc::now()),
        },
        categories,
    }
}

/// Writes the hierarchical view of `catalog` to `path`.
pub fn export_hierarchical(path: &Path, catalog: &Catalog) -> Result<(), ImportError> {
    let tree = to_hierarchical(catalog);
    let data = serde_json::to_string_pretty(&tree)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    info!(
        path = %path.display(),
        categories = tree.metadata.categories_count,
        products = tree.metadata.total_products,
        "Exported hierarchical catalog"
    );
    Ok(())
}
