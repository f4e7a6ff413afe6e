use clap::Parser;
use slm_core::application::{IngestionServiceImpl, RunOutcome};
use slm_core::ports::{FrameSource, FrameStore, SystemClock};
use slm_core::utils::format_timestamp;
use sqlite_adapter::SqliteFrameStore;
use std::error::Error;
use std::io::{self, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wfs_adapter::WfsClient;

/// Weekly scraper of street-lighting frames from the city WFS service
#[derive(Parser, Debug)]
#[command(name = "slm-scraper", version)]
#[command(about = "Fetches lighting frames over WFS and upserts them into a SQLite table")]
struct Cli {
    /// Path to the SQLite database holding the `data` table
    #[arg(short = 'd', long = "database", env = "SLM_DATABASE", default_value = "data.sqlite")]
    database: String,

    /// WFS endpoint receiving the GetFeature POST
    #[arg(long = "endpoint", env = "SLM_WFS_ENDPOINT", default_value_t = wfs_adapter::default_endpoint())]
    endpoint: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long = "log-level", env = "SLM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_service(cli: &Cli) -> Result<IngestionServiceImpl, Box<dyn Error + Send + Sync>> {
    // Instantiate concrete implementations of secondary adapters
    let wfs_client = WfsClient::new(cli.endpoint.clone())?;
    info!(endpoint = wfs_client.endpoint(), "using feature service");
    let frame_source: Box<dyn FrameSource> = Box::new(wfs_client);
    let frame_store: Box<dyn FrameStore> = Box::new(SqliteFrameStore::open(&cli.database)?);

    Ok(IngestionServiceImpl::new(
        frame_source,
        frame_store,
        Box::new(SystemClock),
    ))
}

fn write_report(out: &mut impl Write, e: &dyn Error) -> io::Result<()> {
    writeln!(out, "Error: {e}")?;
    let mut source = e.source();
    while let Some(cause) = source {
        writeln!(out, "  caused by: {cause}")?;
        source = cause.source();
    }
    Ok(())
}

fn report(e: &dyn Error) {
    let _ = write_report(&mut io::stderr().lock(), e);
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut service = match build_service(&cli) {
        Ok(service) => service,
        Err(e) => {
            report(e.as_ref());
            std::process::exit(1);
        }
    };

    // Execute the primary port method
    match service.execute_ingestion() {
        Ok(RunOutcome::Skipped { state, elapsed_days }) => {
            let last_run = state.last_run.map(format_timestamp).unwrap_or_default();
            println!("Last run {last_run} was {elapsed_days} day(s) ago, nothing to do");
        }
        Ok(RunOutcome::Completed { state, records }) => {
            let last_run = state.last_run.map(format_timestamp).unwrap_or_default();
            println!("Stored {records} frame(s) in {} at {last_run}", cli.database);
        }
        Err(e) => {
            report(&e);
            std::process::exit(1);
        }
    }
}
