use std::path::PathBuf;
use std::sync::Arc;

use brochure_sync::brochure::PdfEngine;
use brochure_sync::config::{
    Config, ConfigError, GOOGLE_API_KEY_ENV, OPENROUTER_API_KEY_ENV, SourceConfig, load_config,
    parse_config, read_config,
};
use brochure_sync::polling::NotificationHub;

#[test]
fn parses_google_source_with_defaults() {
    let cfg = parse_config(
        r#"
[source]
kind = "google_sheets"
spreadsheet = "https://docs.google.com/spreadsheets/d/abc123/edit#gid=0"
api_key = "k"
"#,
    )
    .unwrap();
    match &cfg.source {
        SourceConfig::GoogleSheets { sheet_name, base_url, .. } => {
            assert_eq!(sheet_name, "All Products");
            assert!(base_url.is_none());
        }
        other => panic!("unexpected source {other:?}"),
    }
    assert_eq!(cfg.spreadsheet_id().unwrap(), "abc123");
    assert_eq!(cfg.source_label(), "google_sheets");
    assert_eq!(cfg.polling.interval_secs, 300);
    assert_eq!(cfg.polling.error_cooldown_secs, 60);
    assert_eq!(cfg.data.catalog_path, PathBuf::from("data/products.json"));
    assert_eq!(cfg.server.bind, "127.0.0.1:8000");
    assert_eq!(cfg.brochure.theme, "luxury-dark");
    assert_eq!(cfg.brochure.pdf_engine, PdfEngine::Weasyprint);
    assert!(cfg.validate().is_ok());
}

#[test]
fn parses_every_section() {
    let cfg = parse_config(
        r#"
[source]
kind = "csv"
dir = "sheets"
spreadsheet = "catalog"

[data]
catalog_path = "var/products.json"

[polling]
interval_secs = 30

[server]
bind = "0.0.0.0:9000"

[brochure]
theme = "minimal"
pdf_engine = "wkhtmltopdf"

[openrouter]
model_id = "test/model"
"#,
    )
    .unwrap();
    assert_eq!(
        cfg.source,
        SourceConfig::Csv {
            dir: PathBuf::from("sheets"),
            spreadsheet: "catalog".into()
        }
    );
    assert_eq!(cfg.data.catalog_path, PathBuf::from("var/products.json"));
    assert_eq!(cfg.data.backup_dir, PathBuf::from("data/backups"));
    assert_eq!(cfg.polling.interval_secs, 30);
    assert_eq!(cfg.polling.max_retries, 3);
    assert_eq!(cfg.server.bind, "0.0.0.0:9000");
    assert_eq!(cfg.brochure.pdf_engine, PdfEngine::Wkhtmltopdf);
    assert_eq!(cfg.brochure.company_name, "HeyZack");
    assert_eq!(cfg.openrouter.model_id, "test/model");
    assert_eq!(cfg.spreadsheet_id().unwrap(), "catalog");
    assert!(cfg.validate().is_ok());
}

#[test]
fn missing_source_is_invalid() {
    assert!(matches!(
        parse_config("[server]\nbind = \"x\"\n"),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn environment_fills_only_missing_keys() {
    let mut cfg = parse_config(
        r#"
[source]
kind = "google_sheets"
spreadsheet = "abc"

[openrouter]
api_key = "from-file"
"#,
    )
    .unwrap();
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::MissingApiKey(GOOGLE_API_KEY_ENV))
    ));

    cfg.apply_env(|name| match name {
        GOOGLE_API_KEY_ENV => Some("from-env".to_string()),
        OPENROUTER_API_KEY_ENV => Some("other".to_string()),
        _ => None,
    });
    match &cfg.source {
        SourceConfig::GoogleSheets { api_key, .. } => {
            assert_eq!(api_key.as_deref(), Some("from-env"))
        }
        other => panic!("unexpected source {other:?}"),
    }
    assert_eq!(cfg.openrouter.api_key.as_deref(), Some("from-file"));
    assert!(cfg.validate().is_ok());
}

#[test]
fn validation_rejects_bad_values() {
    let base = r#"
[source]
kind = "google_sheets"
spreadsheet = "abc"
api_key = "k"
"#;
    let mut cfg: Config = parse_config(base).unwrap();
    cfg.polling.interval_secs = 0;
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidConfig(_))));

    let cfg = parse_config(&base.replace("\"abc\"", "\"https://example.com/x y\"")).unwrap();
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidConfig(_))));

    let cfg = parse_config(&format!("{base}sheet_name = \" \"\n")).unwrap();
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn openrouter_client_needs_a_key() {
    let cfg = parse_config("[source]\nkind = \"csv\"\ndir = \"d\"\n").unwrap();
    assert!(matches!(
        cfg.openrouter_client(),
        Err(ConfigError::MissingApiKey(OPENROUTER_API_KEY_ENV))
    ));
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.toml");
    assert!(matches!(read_config(&path), Err(ConfigError::MissingConfig(p)) if p == path));
}

#[tokio::test]
async fn csv_config_builds_working_service() {
    let dir = tempfile::tempdir().unwrap();
    let sheets = dir.path().join("sheets");
    std::fs::create_dir_all(&sheets).unwrap();
    std::fs::write(
        sheets.join("products.csv"),
        "Model,Product Name,Category\nM1,Lamp,Lighting\nM2,Camera,Security\n",
    )
    .unwrap();
    let data = dir.path().join("data");
    let toml = format!(
        r#"
[source]
kind = "csv"
dir = "{sheets}"

[data]
catalog_path = "{data}/products.json"
state_path = "{data}/state.json"
backup_dir = "{data}/backups"
"#,
        sheets = sheets.display(),
        data = data.display(),
    );
    let path = dir.path().join("config.toml");
    std::fs::write(&path, toml).unwrap();

    let cfg = load_config(&path).unwrap();
    let service = cfg.build_service(Arc::new(NotificationHub::default())).unwrap();
    assert_eq!(service.spreadsheet_id(), "products");
    let outcome = service.poll_once().await.unwrap();
    assert_eq!(outcome.merge.inserted.len(), 2);

    let catalog = cfg.catalog_store().load().unwrap();
    assert_eq!(catalog.products.len(), 2);
    assert_eq!(catalog.products[0].metadata.source, "csv");
    assert!(data.join("state.json").exists());
}
