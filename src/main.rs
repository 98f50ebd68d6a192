use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use tiki_ingest::config::{IngestConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONNECTIONS};
use tiki_ingest::error::IngestError;
use tiki_ingest::pipeline;
use tiki_ingest::util::db::Db;
use tiki_ingest::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "tiki-ingest",
    version,
    about = "Load Tiki catalogue JSON exports into PostgreSQL"
)]
struct Cli {
    /// Directory containing products_*.json files, or a single JSON file
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    /// Postgres DSN; falls back to DATABASE_URL or the DB_* env parts
    #[arg(long)]
    db_url: Option<String>,
    /// Rows per upsert transaction
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Also maintain the normalized tiki_product_images child table
    /// (env NORMALIZE_IMAGES)
    #[arg(long, default_value_t = false)]
    normalize_images: bool,
    /// Maximum pool connections (env DB_MAX_CONNS)
    #[arg(long)]
    max_connections: Option<u32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_util::init_env();
    if let Err(err) = tiki_ingest::tracing::init_tracing("info,sqlx=warn") {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            if let IngestError::Schema {
                hint: Some(hint), ..
            } = &err
            {
                error!("{hint}");
            }
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), IngestError> {
    if cli.batch_size == 0 {
        return Err(IngestError::Config("batch size must be positive".into()));
    }
    let database_url = match cli.db_url {
        Some(v) => v,
        None => env_util::db_url().map_err(|e| IngestError::Config(e.to_string()))?,
    };
    let config = IngestConfig {
        data_path: cli.data_dir,
        batch_size: cli.batch_size,
        normalize_images: cli.normalize_images || env_util::env_flag("NORMALIZE_IMAGES", false),
        max_connections: cli
            .max_connections
            .unwrap_or_else(|| env_util::env_parse("DB_MAX_CONNS", DEFAULT_MAX_CONNECTIONS)),
        database_url,
    };
    info!(
        db = %env_util::redact_dsn(&config.database_url),
        data = %config.data_path.display(),
        batch_size = config.batch_size,
        normalize_images = config.normalize_images,
        "starting ingest"
    );

    let db = Db::connect(&config.database_url, config.max_connections).await?;
    db.ensure_schema(config.normalize_images).await?;
    pipeline::run(&db, &config).await?;
    Ok(())
}
