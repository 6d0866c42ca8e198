use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use brochure_sync::brochure::{PdfEngine, Selection, group_by_category};
use brochure_sync::config::{Config, read_config};
use brochure_sync::core::{ChangeDetector, ProductRecord};
use brochure_sync::import;
use brochure_sync::polling::{NotificationHub, PollingService};
use brochure_sync::server::{self, AppState};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "brochure-sync",
    about = "Sync a product catalog from a spreadsheet and build brochures"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "BROCHURE_CONFIG", default_value = "config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard, live catalog and websocket server
    Serve {
        /// Start polling as soon as the server is up
        #[arg(long)]
        autostart: bool,
    },
    /// Check the spreadsheet for changes once, or keep polling with --watch
    Poll {
        #[arg(long)]
        watch: bool,
    },
    /// Render the brochure to HTML and optionally PDF
    Build {
        /// Product file (.json or .csv); defaults to the catalog file
        #[arg(long)]
        src: Option<PathBuf>,
        /// Output directory; defaults to brochure.output_dir
        #[arg(long)]
        out: Option<PathBuf>,
        /// Comma-separated categories to include
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
        /// Comma-separated model numbers to include
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
        #[arg(long)]
        theme: Option<String>,
        /// Also produce brochure.pdf
        #[arg(long)]
        pdf: bool,
        /// Produce only brochure.pdf
        #[arg(long)]
        pdf_only: bool,
        /// Override the configured PDF engine
        #[arg(long)]
        engine: Option<PdfEngine>,
        #[arg(long)]
        active_only: bool,
    },
    /// Replace the catalog with the products of a .json or .csv file
    Import {
        #[arg(long)]
        src: PathBuf,
    },
    /// Write the catalog as a hierarchical per-category JSON file
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    /// Improve product descriptions and specifications through OpenRouter
    Enhance {
        /// Enhance at most this many products
        #[arg(long)]
        limit: Option<usize>,
        /// Pause between requests
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,
    },
    /// Check the catalog for duplicate models, missing names and bad prices
    Validate,
    /// List categories with product counts
    Categories,
    /// Show the last synchronization state
    Status,
    /// List the sheet tabs of the configured spreadsheet
    Sheets,
    /// Delete catalog backups older than --days
    CleanupBackups {
        #[arg(long, default_value_t = 30)]
        days: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = read_config(&cli.config)?;
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve { autostart } => {
            cfg.validate()?;
            rt.block_on(serve(&cfg, autostart))?;
        }
        Commands::Poll { watch } => {
            cfg.validate()?;
            let hub = NotificationHub::default();
            let service = Arc::new(cfg.build_service(Arc::new(hub))?);
            if watch {
                rt.block_on(watch_until_interrupted(service))?;
            } else {
                let outcome = rt.block_on(service.poll_once())?;
                println!(
                    "rows: {} changed: {} added: {} updated: {} removed: {} skipped: {}",
                    outcome.total_rows,
                    outcome.has_changes,
                    outcome.merge.inserted.len(),
                    outcome.merge.updated.len(),
                    outcome.merge.removed.len(),
                    outcome.merge.skipped.len(),
                );
                for (row, reason) in &outcome.merge.skipped {
                    println!("  row {row}: {reason}");
                }
            }
        }
        Commands::Build {
            src,
            out,
            categories,
            include,
            theme,
            pdf,
            pdf_only,
            engine,
            active_only,
        } => {
            let products: Vec<ProductRecord> = match src {
                Some(path) => import::import_path(&path)?.products,
                None => cfg.catalog_store().load()?.products,
            };
            let selection = Selection {
                categories,
                models: include,
                active_only,
            };
            let groups = group_by_category(selection.apply(&products));
            if groups.is_empty() {
                warn!("No products match the selection");
            }
            let out_dir = out.unwrap_or_else(|| cfg.brochure.output_dir.clone());
            let renderer = cfg.renderer(theme.as_deref())?;
            let html = renderer.write_brochure(&groups, &out_dir)?;
            if pdf || pdf_only {
                let generator = match engine {
                    Some(engine) => brochure_sync::brochure::PdfGenerator::new(engine),
                    None => cfg.pdf_generator(),
                };
                let output = out_dir.join("brochure.pdf");
                rt.block_on(generator.generate(&html, &output))?;
                info!(engine = generator.engine().binary(), "PDF engine finished");
                println!("PDF written to {}", output.display());
                if pdf_only {
                    std::fs::remove_file(&html)?;
                }
            }
            if !pdf_only {
                println!("Brochure written to {}", html.display());
            }
        }
        Commands::Import { src } => {
            let report = import::import_path(&src)?;
            for (position, reason) in &report.skipped {
                println!("skipped {position}: {reason}");
            }
            let catalog = cfg.processor().replace_all(report.products)?;
            println!(
                "Imported {} products in {} categories",
                catalog.metadata.total_products, catalog.metadata.categories_count
            );
        }
        Commands::Export { out } => {
            let catalog = cfg.catalog_store().load()?;
            import::json::export_hierarchical(&out, &catalog)?;
            println!("Exported {} products to {}", catalog.products.len(), out.display());
        }
        Commands::Enhance { limit, delay_ms } => {
            rt.block_on(enhance(&cfg, limit, Duration::from_millis(delay_ms)))?;
        }
        Commands::Validate => {
            let catalog = cfg.catalog_store().load()?;
            let issues = catalog.validate();
            if issues.is_empty() {
                println!("{} products, no issues", catalog.products.len());
            } else {
                for issue in &issues {
                    println!("{issue}");
                }
                return Err(format!("{} validation issues", issues.len()).into());
            }
        }
        Commands::Categories => {
            let catalog = cfg.catalog_store().load()?;
            for (category, count) in catalog.category_counts() {
                println!("{category}: {count}");
            }
        }
        Commands::Status => {
            let detector = ChangeDetector::new(cfg.data.state_path.clone());
            let state = detector.state();
            let catalog = cfg.catalog_store().load()?;
            match state.last_sync {
                Some(ts) => println!("last sync: {ts}"),
                None => println!("last sync: never"),
            }
            println!("rows: {}", state.row_count);
            println!("data hash: {}", state.data_hash.as_deref().unwrap_or("-"));
            println!(
                "catalog: {} products, {} categories, {} suppliers, average price {:.2}",
                catalog.metadata.total_products,
                catalog.metadata.categories_count,
                catalog.metadata.suppliers_count,
                catalog.metadata.average_price,
            );
        }
        Commands::Sheets => {
            let id = cfg.spreadsheet_id()?;
            let client = cfg
                .google_client()?
                .ok_or("sheets requires a google_sheets source")?;
            for title in rt.block_on(client.sheet_titles(&id))? {
                println!("{title}");
            }
        }
        Commands::CleanupBackups { days } => {
            let removed = cfg.catalog_store().cleanup_backups_older_than_days(days)?;
            println!("Removed {removed} backups older than {days} days");
        }
    }

    Ok(())
}

async fn serve(cfg: &Config, autostart: bool) -> Result<(), Box<dyn std::error::Error>> {
    let hub = NotificationHub::default();
    let service = Arc::new(cfg.build_service(Arc::new(hub.clone()))?);
    if autostart {
        service.start()?;
    }
    let state = AppState {
        service: Arc::clone(&service),
        hub,
        renderer: Arc::new(cfg.renderer(None)?),
        pdf: cfg.pdf_generator(),
        work_dir: std::env::temp_dir().join("brochure-sync"),
    };
    server::serve(state, &cfg.server.bind).await?;
    if service.is_running() {
        service.stop()?;
    }
    Ok(())
}

async fn watch_until_interrupted(
    service: Arc<PollingService>,
) -> Result<(), Box<dyn std::error::Error>> {
    service.start()?;
    tokio::signal::ctrl_c().await?;
    service.stop()?;
    info!("Polling stopped");
    Ok(())
}

async fn enhance(
    cfg: &Config,
    limit: Option<usize>,
    delay: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = cfg.openrouter_client()?;
    let store = cfg.catalog_store();
    let mut catalog = store.load()?;
    let total = limit.map_or(catalog.products.len(), |l| l.min(catalog.products.len()));
    let bar = ProgressBar::new(total as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
    let mut enhanced = 0;
    for (i, product) in catalog.products.iter_mut().take(total).enumerate() {
        bar.set_message(product.name.clone());
        if client.enhance_in_place(product).await {
            enhanced += 1;
        }
        bar.inc(1);
        if i + 1 < total && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    bar.finish_and_clear();
    if enhanced > 0 {
        let source = catalog.metadata.source.clone();
        store.save(&mut catalog, &source)?;
    }
    println!("Enhanced {enhanced} of {total} products with {}", client.model_id());
    Ok(())
}
