//! Header-name driven conversion of spreadsheet rows into product records.
//!
//! The header row is resolved once per poll cycle into a [`HeaderMap`]; each
//! data row is then converted with plain index lookups.

use chrono::{DateTime, Utc};
use iso_currency::Currency;

use super::utils::{create_product_id, drive_direct_url, parse_price};
use super::{ProductRecord, Provenance, Specifications};

/// Canonical product fields that can be read from a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Model,
    Name,
    Category,
    Supplier,
    Price,
    Currency,
    Status,
    Description,
    Specifications,
    Features,
    Protocol,
    PowerSource,
    Country,
    Moq,
    LeadTime,
    DriveLink,
    RefHeyzack,
    DesignationFr,
    Catalogue,
    Packing,
}

/// Accepted header spellings per field, in lookup order. Headers are compared
/// after lower-casing and collapsing whitespace and underscores.
pub const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (Field::Model, &["model", "model number", "model no", "model #", "sku"]),
    (Field::Name, &["product name", "name", "product", "title"]),
    (Field::Category, &["category", "product category"]),
    (Field::Supplier, &["supplier", "vendor", "manufacturer", "brand"]),
    (Field::Price, &["price", "unit price", "price (usd)", "price usd", "cost"]),
    (Field::Currency, &["currency"]),
    (Field::Status, &["status"]),
    (Field::Description, &["description", "product description"]),
    (Field::Specifications, &["specifications", "specs", "technical specifications"]),
    (Field::Features, &["features", "key features"]),
    (Field::Protocol, &["protocol", "communication protocol"]),
    (Field::PowerSource, &["power source", "power"]),
    (Field::Country, &["country", "country of origin"]),
    (Field::Moq, &["moq", "minimum order quantity"]),
    (Field::LeadTime, &["lead time"]),
    (Field::DriveLink, &["drive link", "image", "image url", "image link"]),
    (Field::RefHeyzack, &["ref heyzack", "heyzack ref"]),
    (Field::DesignationFr, &["designation fr", "designation"]),
    (Field::Catalogue, &["catalogue", "catalog"]),
    (Field::Packing, &["packing", "packaging"]),
];

/// Why a row did not produce a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyRow,
    MissingName,
    MissingModel,
    UnknownCurrency(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::EmptyRow => write!(f, "row is empty"),
            SkipReason::MissingName => write!(f, "product name is missing"),
            SkipReason::MissingModel => write!(f, "model number is missing"),
            SkipReason::UnknownCurrency(code) => write!(f, "unknown currency code {code}"),
        }
    }
}

impl std::error::Error for SkipReason {}

fn normalize_header(header: &str) -> String {
    header
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Column index per [`Field`], resolved from a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    columns: Vec<(Field, usize)>,
}

impl HeaderMap {
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Self {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| normalize_header(h.as_ref()))
            .collect();
        let columns = FIELD_ALIASES
            .iter()
            .filter_map(|(field, aliases)| {
                aliases
                    .iter()
                    .find_map(|alias| normalized.iter().position(|h| h == alias))
                    .map(|index| (*field, index))
            })
            .collect();
        Self { columns }
    }

    pub fn index(&self, field: Field) -> Option<usize> {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, i)| *i)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.index(field).is_some()
    }

    /// Trimmed cell value for `field`, empty when the column or cell is missing.
    pub fn get<'r>(&self, row: &'r [String], field: Field) -> &'r str {
        self.index(field)
            .and_then(|i| row.get(i))
            .map_or("", |s| s.trim())
    }

    fn optional(&self, row: &[String], field: Field) -> Option<String> {
        let value = self.get(row, field);
        (!value.is_empty()).then(|| value.to_string())
    }

    /// Model number of `row`, when present.
    pub fn model<'r>(&self, row: &'r [String]) -> Option<&'r str> {
        let model = self.get(row, Field::Model);
        (!model.is_empty()).then_some(model)
    }

    /// Builds a product from `row`. `sheet_row` is the 1-based data row
    /// position, recorded as provenance.
    pub fn to_product(
        &self,
        row: &[String],
        sheet_row: Option<usize>,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<ProductRecord, SkipReason> {
        if row.iter().all(|c| c.trim().is_empty()) {
            return Err(SkipReason::EmptyRow);
        }
        let name = self.get(row, Field::Name);
        if name.is_empty() {
            return Err(SkipReason::MissingName);
        }
        let model = self.model(row).ok_or(SkipReason::MissingModel)?;

        let currency = match self.get(row, Field::Currency).to_uppercase() {
            code if code.is_empty() => "USD".to_string(),
            code => match Currency::from_code(&code) {
                Some(_) => code,
                None => return Err(SkipReason::UnknownCurrency(code)),
            },
        };
        let status = match self.get(row, Field::Status) {
            "" => "published".to_string(),
            s => s.to_string(),
        };
        let supplier = self.get(row, Field::Supplier);
        let price_raw = self.get(row, Field::Price);
        let drive_link = self.get(row, Field::DriveLink);
        let description = match self.get(row, Field::Description) {
            "" => "New smart home product with advanced features.".to_string(),
            d => d.to_string(),
        };
        let images = if drive_link.is_empty() {
            Vec::new()
        } else {
            vec![drive_direct_url(drive_link)]
        };
        let id = create_product_id(supplier, model);

        Ok(ProductRecord {
            id: id.clone(),
            name: name.to_string(),
            model: model.to_string(),
            supplier: supplier.to_string(),
            category: self.get(row, Field::Category).to_string(),
            price: parse_price(price_raw).unwrap_or(0.0),
            currency,
            status,
            images,
            specifications: Specifications {
                description,
                specifications: self.get(row, Field::Specifications).to_string(),
                features: self.get(row, Field::Features).to_string(),
                communication_protocol: self.get(row, Field::Protocol).to_string(),
                power_source: self.get(row, Field::PowerSource).to_string(),
                country: self.get(row, Field::Country).to_string(),
                moq: self.get(row, Field::Moq).to_string(),
                lead_time: self.get(row, Field::LeadTime).to_string(),
            },
            metadata: Provenance {
                enhanced_id: id,
                drive_link: drive_link.to_string(),
                price_raw: price_raw.to_string(),
                ref_heyzack: self.optional(row, Field::RefHeyzack),
                designation_fr: self.optional(row, Field::DesignationFr),
                catalogue: self.optional(row, Field::Catalogue),
                packing: self.optional(row, Field::Packing),
                source: source.to_string(),
                sheet_row,
            },
            created_at: now,
            updated_at: now,
        })
    }
}
