//! invoflow - invoice upload pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

use invoflow::db::{file_repo, folder_repo, queue_repo};
use invoflow::{load_config, App, RenameFormat, UploadFile};

#[derive(Parser)]
#[command(name = "invoflow")]
#[command(about = "Invoice upload pipeline: OCR extraction, renaming and batch notifications")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, env = "INVOFLOW_CONFIG", default_value = "invoflow.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover pending files and process the queue until Ctrl-C
    Run,

    /// Upload files into a folder as one batch
    Upload {
        /// Target folder id
        #[arg(long)]
        folder: String,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Manage folders
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },

    /// Show files and batches of a folder
    Status {
        #[arg(long)]
        folder: String,
    },
}

#[derive(Subcommand)]
enum FolderCommands {
    /// Create a folder
    Create {
        /// Owner user id, used to address completion emails
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        /// Rename format: "Invoice-Date" or "Date-Invoice". Files keep their
        /// name when omitted.
        #[arg(long)]
        format: Option<String>,
    },
}

fn init_logging(verbose: bool, json: bool) -> anyhow::Result<()> {
    let default_filter = if verbose { "invoflow=debug" } else { "invoflow=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    // the persistence layer logs through `log`
    tracing_log::LogTracer::init().context("failed to bridge log records")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let app = App::from_config(config)?;

    match cli.command {
        Commands::Run => run(app).await,
        Commands::Upload { folder, files } => upload(&app, &folder, files).await,
        Commands::Folder {
            command: FolderCommands::Create { owner, name, format },
        } => {
            let format = format.as_deref().map_or(RenameFormat::None, RenameFormat::parse);
            let folder = folder_repo::create(app.database(), &owner, &name, format)?;
            println!("{}", folder.id);
            Ok(())
        }
        Commands::Status { folder } => status(&app, &folder),
    }
}

async fn run(app: App) -> anyhow::Result<()> {
    let recovered = app.recover()?;
    tracing::info!(recovered, "Recovery sweep finished");

    let pump = app.spawn_mirror_pump();
    let mut pool = app.start_workers();

    let stop = Arc::new(Notify::new());
    let signal = Arc::clone(&stop);
    ctrlc::set_handler(move || signal.notify_one()).context("failed to set Ctrl-C handler")?;

    loop {
        tokio::select! {
            _ = stop.notified() => break,
            result = pool.recv_result() => match result {
                Some(result) => tracing::debug!(
                    task_id = %result.task_id,
                    kind = %result.kind,
                    file_id = %result.file_id,
                    disposition = ?result.disposition,
                    "Task settled"
                ),
                None => break,
            },
        }
    }

    pool.shutdown();
    pool.wait().await;
    pump.abort();
    Ok(())
}

async fn upload(app: &App, folder_id: &str, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(UploadFile::from_path(path).await?);
    }

    let batch = app.uploads().upload_batch(folder_id, files).await?;
    println!("batch {}", batch.batch_id);
    for uploaded in &batch.files {
        match &uploaded.error {
            Some(error) => println!("  {}  FAILED  {}", uploaded.file.name, error),
            None => println!("  {}  {}  {}", uploaded.file.name, uploaded.file.status, uploaded.file.key),
        }
    }
    Ok(())
}

fn status(app: &App, folder_id: &str) -> anyhow::Result<()> {
    let db = app.database();
    let folder = folder_repo::find_by_id(db, folder_id)?
        .with_context(|| format!("folder {} not found", folder_id))?;
    println!(
        "{} ({}), format: {}",
        folder.name,
        folder.id,
        folder.format.as_str().unwrap_or("none")
    );

    let files = file_repo::list_folder(db, folder_id)?;
    let mut batches: Vec<&str> = Vec::new();
    for file in &files {
        if !batches.contains(&file.batch_id.as_str()) {
            batches.push(&file.batch_id);
        }
    }

    let notified = folder_repo::notified_batches(db, folder_id)?;
    for batch_id in batches {
        let summary = file_repo::batch_summary(db, folder_id, batch_id)?;
        println!(
            "batch {}: {} files, {} completed, {} failed, {} processing{}",
            batch_id,
            summary.total,
            summary.completed,
            summary.failed,
            summary.processing,
            if notified.iter().any(|b| b == batch_id) { ", notified" } else { "" }
        );
        for file in files.iter().filter(|f| f.batch_id == batch_id) {
            let detail = file
                .reason
                .as_deref()
                .or(file.error.as_deref())
                .or(file.new_name.as_deref())
                .unwrap_or("");
            println!("  {:<10} {}  {}", file.status, file.name, detail);
        }
    }

    let counts = queue_repo::count_by_status(db)?;
    if !counts.is_empty() {
        let line: Vec<String> = counts
            .iter()
            .map(|(status, n)| format!("{} {}", n, status.as_str()))
            .collect();
        println!("queue: {}", line.join(", "));
    }
    Ok(())
}
