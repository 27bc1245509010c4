use std::{fs, path::PathBuf, process, sync::Arc};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{filter::LevelFilter, fmt};

use tabula_app::config;
use tabula_app::error::AppError;
use tabula_app::services::{
    DocumentIndexClient, DocumentPipeline, OpenAiDocumentStore, PollingOptions,
};

#[derive(Debug, Parser)]
#[command(name = "tabula", about = "Document extraction service", version)]
struct Cli {
    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP service (the default when no command is given).
    Serve,
    /// Convert a saved extraction response into an xlsx workbook.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Path to a saved ask response, its `data` object, or bare tables JSON.
    input: PathBuf,
    /// Output path for the workbook.
    #[arg(short, long, default_value = "extracted.xlsx")]
    out: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(determine_log_level(&cli));

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::Export(_)) => match cli.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        Some(Commands::Serve) | None => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("tracing subscriber already set; skipping re-initialization");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Export(args)) => run_export(&args),
        Some(Commands::Serve) | None => run_serve().await,
    }
}

async fn run_serve() -> Result<(), AppError> {
    let config = config::load()?;

    let store = OpenAiDocumentStore::from_env(&config.remote.base_url, &config.remote.model)?;
    let client: Arc<dyn DocumentIndexClient> = Arc::new(store);

    let polling = PollingOptions {
        container_timeout: config.polling.container_timeout(),
        job_timeout: config.polling.job_timeout(),
        interval: config.polling.interval(),
    };
    let pipeline = Arc::new(DocumentPipeline::new(
        client,
        config.remote.container_expiration_days,
        polling,
    ));

    tracing::info!(
        model = %config.remote.model,
        job_timeout_secs = config.polling.job_timeout_secs,
        container_timeout_secs = config.polling.container_timeout_secs,
        "starting tabula"
    );

    tabula_server::serve(&config.server, pipeline).await?;
    Ok(())
}

fn run_export(args: &ExportArgs) -> Result<(), AppError> {
    let raw = fs::read_to_string(&args.input).map_err(|source| AppError::ReadInput {
        path: args.input.clone(),
        source,
    })?;
    let payload: serde_json::Value = serde_json::from_str(&raw)?;

    let tables = tabula_server::pipeline::tables_from_payload(&payload)?;
    let bytes = tabula_server::export::workbook_from_tables(&tables)?;

    fs::write(&args.out, bytes).map_err(|source| AppError::WriteOutput {
        path: args.out.clone(),
        source,
    })?;
    println!("wrote {} sheet(s) to {}", tables.len(), args.out.display());
    Ok(())
}
