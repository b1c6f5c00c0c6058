// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin-Sync command line
//!
//! Downloads Garmin Connect data into the local cache and imports the
//! cache into Firestore.

use clap::{Parser, Subcommand};
use garmin_sync::{
    config::Config,
    db::{FirestoreDb, MemoryStore, RecordStore},
    error::SyncError,
    models::EntityType,
    services::{
        collection_stats, load_watermarks, Connector, ConnectTranscoder, DownloadReport,
        ImportReport, PasswordAuthenticator, RunReports, SessionConnector, SyncService,
    },
    time_utils,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const METERS_PER_MILE: f64 = 1609.344;

#[derive(Parser)]
#[command(version, about = "Sync Garmin Connect data into Firestore")]
struct Cli {
    /// Settings file
    #[arg(short, long, global = true, env = "GARMIN_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download data into the local cache
    Download {
        /// Only fetch recent days and the latest activities
        #[arg(short, long)]
        latest: bool,
    },
    /// Import the local cache into the store
    Import {
        /// Import into an in-memory store and report what would change
        #[arg(long)]
        dry_run: bool,
    },
    /// Download the latest data, then import it
    Update,
    /// Show per-collection counts and latest dates
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", cli.json_logs);
            tracing::error!(error = %e, "Failed to load configuration");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log_directive(), cli.json_logs);

    let service = SyncService::new(config);
    let result = match cli.command {
        Commands::Download { latest } => download(&service, latest, None).await.map(|_| ()),
        Commands::Import { dry_run: true } => {
            tracing::info!("Dry run: importing into an in-memory store");
            import(&service, Arc::new(MemoryStore::new())).await
        }
        Commands::Import { dry_run: false } => match connect_store(&service).await {
            Ok(store) => import(&service, store).await,
            Err(e) => Err(e),
        },
        Commands::Update => update(&service).await,
        Commands::Stats => stats(&service).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let SyncError::TotalFailure(reports) = &e {
                match reports {
                    RunReports::Download(reports) => print_download_summary(reports),
                    RunReports::Import(reports) => print_import_summary(reports),
                }
            }
            tracing::error!(error = %e, "Run failed");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn connect_store(service: &SyncService) -> Result<Arc<FirestoreDb>, SyncError> {
    Ok(Arc::new(
        FirestoreDb::new(&service.config().store.project_id).await?,
    ))
}

/// Log in, plan, and download. Watermarks come from `store` when given.
async fn download(
    service: &SyncService,
    latest: bool,
    store: Option<&FirestoreDb>,
) -> Result<Vec<DownloadReport>, SyncError> {
    let config = service.config();
    let authenticator = PasswordAuthenticator::new(config.auth_url(), config.api_base_url())?;
    let (session, profile) = service.login(authenticator).await?;

    let connector = SessionConnector::new(
        config.api_base_url(),
        session,
        Duration::from_millis(config.sync.inter_request_delay_ms),
    );
    match connector.connect() {
        Ok(api) => service.save_profile(&api).await,
        Err(e) => tracing::warn!(error = %e, "Skipping profile download"),
    }

    let watermarks = match store {
        Some(store) if latest => load_watermarks(store, &config.enabled_entities())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not read watermarks, planning without them");
                BTreeMap::new()
            }),
        _ => BTreeMap::new(),
    };

    let today = time_utils::today_local();
    let plans = service.plan(today, latest, &watermarks);
    let reports = service
        .download(connector, &profile.display_name, &plans)
        .await?;
    print_download_summary(&reports);
    Ok(reports)
}

async fn import<S: RecordStore>(service: &SyncService, store: Arc<S>) -> Result<(), SyncError> {
    let reports = service.import(store, ConnectTranscoder).await?;
    print_import_summary(&reports);
    Ok(())
}

async fn update(service: &SyncService) -> Result<(), SyncError> {
    let store = connect_store(service).await?;
    download(service, true, Some(&store)).await?;
    import(service, store).await
}

async fn stats(service: &SyncService) -> Result<(), SyncError> {
    let store = connect_store(service).await?;
    let metric = service.config().settings.metric;
    let stats = collection_stats(&*store, &EntityType::ALL).await?;

    println!("{:<20} {:>8}  {:<12}", "collection", "records", "latest");
    for s in stats {
        let latest = s
            .latest
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<20} {:>8}  {:<12}", s.entity.collection(), s.count, latest);
        if let Some(meters) = s.latest_distance_m {
            if metric {
                println!("  last activity: {:.2} km", meters / 1000.0);
            } else {
                println!("  last activity: {:.2} mi", meters / METERS_PER_MILE);
            }
        }
    }
    Ok(())
}

fn print_download_summary(reports: &[DownloadReport]) {
    println!(
        "{:<16} {:>9} {:>6} {:>6} {:>8} {:>7} {:>9}",
        "entity", "succeeded", "empty", "failed", "disabled", "written", "unchanged"
    );
    for r in reports {
        let entity = r.entity.map(|e| e.to_string()).unwrap_or_default();
        println!(
            "{:<16} {:>9} {:>6} {:>6} {:>8} {:>7} {:>9}",
            entity, r.succeeded, r.empty, r.failed, r.disabled, r.written, r.unchanged
        );
    }
}

fn print_import_summary(reports: &[ImportReport]) {
    println!(
        "{:<16} {:>8} {:>7} {:>7} {:>6} {:>6}",
        "entity", "inserted", "updated", "skipped", "empty", "failed"
    );
    for r in reports {
        let entity = r.entity.map(|e| e.to_string()).unwrap_or_default();
        println!(
            "{:<16} {:>8} {:>7} {:>7} {:>6} {:>6}",
            entity, r.inserted, r.updated, r.skipped, r.empty, r.failed
        );
    }
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},garmin_sync={level}")));

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(true)
            .flatten_event(true)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}
