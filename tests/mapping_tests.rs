use brochure_sync::core::utils::{
    create_product_id, drive_direct_url, pair_specifications, parse_price,
};
use brochure_sync::core::{Field, HeaderMap, SkipReason};
use chrono::Utc;

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|s| s.to_string()).collect()
}

#[test]
fn headers_resolve_regardless_of_order_and_case() {
    let a = HeaderMap::resolve(&["Model", "Product Name", "Category"]);
    let b = HeaderMap::resolve(&["CATEGORY", "product_name", "  model  number "]);
    assert_eq!(a.index(Field::Model), Some(0));
    assert_eq!(b.index(Field::Model), Some(2));
    assert_eq!(b.index(Field::Name), Some(1));
    assert_eq!(b.index(Field::Category), Some(0));

    let from_a = a
        .to_product(&row(&["M1", "Lamp", "Lighting"]), Some(1), "test", Utc::now())
        .unwrap();
    let from_b = b
        .to_product(&row(&["Lighting", "Lamp", "M1"]), Some(1), "test", Utc::now())
        .unwrap();
    assert_eq!(from_a.model, from_b.model);
    assert_eq!(from_a.name, from_b.name);
    assert_eq!(from_a.category, from_b.category);
}

#[test]
fn unknown_headers_are_ignored() {
    let map = HeaderMap::resolve(&["Model", "Product Name", "Internal notes"]);
    assert!(map.contains(Field::Model));
    assert!(!map.contains(Field::Price));
    let product = map
        .to_product(&row(&["M1", "Lamp", "secret"]), None, "csv", Utc::now())
        .unwrap();
    assert_eq!(product.price, 0.0);
}

#[test]
fn full_row_maps_every_field() {
    let map = HeaderMap::resolve(&[
        "Model Number",
        "Product Name",
        "Category",
        "Supplier",
        "Price",
        "Specifications",
        "Communication Protocol",
        "Drive Link",
        "Ref HeyZack",
        "MOQ",
    ]);
    let product = map
        .to_product(
            &row(&[
                " M-100 ",
                "Smart Lock",
                "Security",
                "Acme Co",
                "US$ 1,299.00",
                "Battery|4xAA|Range|10 m",
                "Zigbee",
                "https://drive.google.com/file/d/abc123/view?usp=sharing",
                "HZ-7",
                "50",
            ]),
            Some(4),
            "google_sheets",
            Utc::now(),
        )
        .unwrap();
    assert_eq!(product.model, "M-100");
    assert_eq!(product.id, "Acme_Co_M-100");
    assert_eq!(product.price, 1299.0);
    assert_eq!(product.currency, "USD");
    assert_eq!(product.status, "published");
    assert_eq!(product.specifications.communication_protocol, "Zigbee");
    assert_eq!(product.specifications.moq, "50");
    assert_eq!(
        product.images,
        vec!["https://drive.google.com/uc?export=view&id=abc123"]
    );
    assert_eq!(product.metadata.ref_heyzack.as_deref(), Some("HZ-7"));
    assert_eq!(product.metadata.price_raw, "US$ 1,299.00");
    assert_eq!(product.metadata.sheet_row, Some(4));
    assert_eq!(product.metadata.source, "google_sheets");
    assert!(product.metadata.designation_fr.is_none());
}

#[test]
fn short_rows_read_missing_cells_as_empty() {
    let map = HeaderMap::resolve(&["Model", "Product Name", "Category", "Price"]);
    let product = map
        .to_product(&row(&["M1", "Lamp"]), Some(1), "test", Utc::now())
        .unwrap();
    assert_eq!(product.category, "");
    assert_eq!(product.price, 0.0);
}

#[test]
fn row_without_model_is_skipped() {
    let map = HeaderMap::resolve(&["Model", "Product Name"]);
    let err = map
        .to_product(&row(&["  ", "Lamp"]), Some(1), "test", Utc::now())
        .unwrap_err();
    assert_eq!(err, SkipReason::MissingModel);
}

#[test]
fn lowercase_currency_is_normalized() {
    let map = HeaderMap::resolve(&["Model", "Product Name", "Currency"]);
    let product = map
        .to_product(&row(&["M1", "Lamp", "eur"]), Some(1), "test", Utc::now())
        .unwrap();
    assert_eq!(product.currency, "EUR");
}

#[test]
fn helper_formats() {
    assert_eq!(parse_price("1,299"), Some(1299.0));
    assert_eq!(create_product_id("", "AB/12"), "AB_12");
    assert_eq!(
        pair_specifications("Power|5W|Color"),
        vec!["Power: 5W".to_string(), "Color".to_string()]
    );
    assert_eq!(drive_direct_url("https://example.com/a.png"), "https://example.com/a.png");
}
