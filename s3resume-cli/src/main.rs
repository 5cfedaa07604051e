mod ui;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use owo_colors::OwoColorize;
use s3resume_core::{
    abort_all, list_pending, Config, HttpObjectRegistry, HttpPartTransport, HttpStorageApi,
    LocalFile, StorageApi, UploadEvent, UploadQueue, UploadSource, UploadStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use ui::*;

#[derive(Parser)]
#[command(name = "s3resume")]
#[command(about = "Resumable multipart uploads to S3", long_about = None)]
struct Cli {
    /// Base URL of the storage API
    #[arg(
        long,
        global = true,
        env = "S3RESUME_API_URL",
        default_value = "http://localhost:3000"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files, resuming any unfinished multipart upload of the same content
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// MIME type for every file instead of guessing from the extension
        #[arg(long = "type")]
        mime_type: Option<String>,
        /// Parts sent in parallel per batch
        #[arg(long, env = "S3RESUME_WINDOW")]
        window: Option<usize>,
        /// Retries of a failed batch
        #[arg(long, env = "S3RESUME_MAX_RETRIES")]
        retries: Option<u32>,
        /// Register completed files with the object registry
        #[arg(long, env = "S3RESUME_REGISTER")]
        register: bool,
    },
    /// List unfinished multipart uploads
    Pending,
    /// Abort one unfinished multipart upload
    Abort { key: String, upload_id: String },
    /// Abort every unfinished multipart upload
    AbortAll,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Cli::parse();

    print_banner();

    let mut config = Config::new(args.api_url);
    let timeout = Duration::from_secs(config.request_timeout_secs);

    match args.command {
        // ===================================================================
        // Upload
        // ===================================================================
        Commands::Upload {
            paths,
            mime_type,
            window,
            retries,
            register,
        } => {
            if let Some(window) = window {
                config.window = window;
            }
            if let Some(retries) = retries {
                config.max_retries = retries;
            }
            config.register_objects = register;
            log::debug!("Upload configuration: {:?}", config);

            let storage = Arc::new(
                HttpStorageApi::new(&config.storage_api_url, timeout)
                    .context("Failed to create storage API client")?,
            );
            let transport = Arc::new(HttpPartTransport::new(timeout)?);
            let (tx, mut rx) = mpsc::channel(256);

            let mut queue = UploadQueue::new(&config, storage, transport)
                .context("Invalid configuration")?
                .with_events(tx);
            if config.register_objects {
                let registry = HttpObjectRegistry::new(&config.storage_api_url, timeout)?;
                queue = queue.with_registry(Arc::new(registry));
            }

            let mut bars = UploadBars::default();
            for path in paths {
                let file = match LocalFile::open(&path).await {
                    Ok(file) => file,
                    Err(e) => {
                        print_error(&format!("{}: {}", path.display(), e));
                        continue;
                    }
                };
                let file = match &mime_type {
                    Some(mime) => file.with_mime_type(mime.clone()),
                    None => file,
                };
                let name = file.name().to_string();

                match queue.add(Arc::new(file)).await {
                    Ok(id) => bars.add(id, &name),
                    Err(e) => print_error(&format!("{}: {}", name, e)),
                }
            }

            println!(
                "🚀 Uploading {} file(s) to {}",
                queue.snapshots().await.len().to_string().cyan(),
                config.storage_api_url.green()
            );

            let run = queue.run();
            tokio::pin!(run);
            let summary = loop {
                tokio::select! {
                    Some(event) = rx.recv() => render(&queue, &bars, event).await,
                    result = &mut run => break result?,
                }
            };
            while let Ok(event) = rx.try_recv() {
                render(&queue, &bars, event).await;
            }

            println!();
            print_summary(&queue.snapshots().await);
            if summary.failed == 0 {
                print_success(&format!("{} upload(s) completed", summary.completed));
            } else {
                print_error(&format!(
                    "{} completed, {} failed. Run again to resume.",
                    summary.completed, summary.failed
                ));
            }
        }

        // ===================================================================
        // Pending
        // ===================================================================
        Commands::Pending => {
            let storage = HttpStorageApi::new(&config.storage_api_url, timeout)?;
            let spinner = create_spinner("Listing unfinished uploads...");
            let pending = match list_pending(&storage).await {
                Ok(p) => {
                    spinner.finish_and_clear();
                    p
                }
                Err(e) => {
                    spinner.finish_and_clear();
                    print_error(&e.to_string());
                    return Ok(());
                }
            };

            if pending.is_empty() {
                println!("No unfinished uploads");
            } else {
                print_pending(&pending, chrono::Utc::now());
            }
        }

        // ===================================================================
        // Abort
        // ===================================================================
        Commands::Abort { key, upload_id } => {
            let storage = HttpStorageApi::new(&config.storage_api_url, timeout)?;
            let spinner = create_spinner(&format!("Aborting '{}'...", key));
            match storage.abort_multipart_upload(&key, &upload_id).await {
                Ok(_) => {
                    spinner.finish_and_clear();
                    print_success(&format!("Aborted '{}' ({})", key, upload_id));
                }
                Err(e) => {
                    spinner.finish_and_clear();
                    print_error(&format!("Abort failed: {}", e));
                }
            }
        }

        Commands::AbortAll => {
            let storage = HttpStorageApi::new(&config.storage_api_url, timeout)?;
            let spinner = create_spinner("Aborting all unfinished uploads...");
            match abort_all(&storage).await {
                Ok(count) => {
                    spinner.finish_and_clear();
                    print_success(&format!("Aborted {} upload(s)", count));
                }
                Err(e) => {
                    spinner.finish_and_clear();
                    print_error(&format!("Abort failed: {}", e));
                }
            }
        }
    }

    Ok(())
}

async fn render(queue: &UploadQueue, bars: &UploadBars, event: UploadEvent) {
    let Some(pb) = bars.get(event.upload) else {
        return;
    };

    match event.status {
        UploadStatus::Queued => {}
        UploadStatus::Resuming => pb.set_message("looking for an unfinished upload..."),
        UploadStatus::Started {
            total_size,
            total_chunks,
            resumed_parts,
        } => {
            let message = if resumed_parts > 0 {
                format!(
                    "{} in {} parts, {} already uploaded",
                    human_bytes::human_bytes(total_size as f64),
                    total_chunks,
                    resumed_parts
                )
            } else {
                format!(
                    "{} in {} parts",
                    human_bytes::human_bytes(total_size as f64),
                    total_chunks
                )
            };
            pb.set_message(message);
        }
        UploadStatus::Progress { percentage, .. } => pb.set_position(u64::from(percentage)),
        UploadStatus::BatchCompleted {
            completed_chunks,
            total_chunks,
            ..
        } => {
            if let Some(snapshot) = queue.snapshot(event.upload).await {
                let speed = if snapshot.speed.calculating {
                    "calculating...".to_string()
                } else {
                    snapshot.speed.readable
                };
                pb.set_position(u64::from(snapshot.percentage));
                pb.set_message(format!("{}/{} parts, {}", completed_chunks, total_chunks, speed));
            }
        }
        UploadStatus::Completed { .. } => {
            pb.set_position(100);
            pb.finish_with_message("done");
        }
        UploadStatus::Registered => {}
        UploadStatus::RegistrationFailed { error } => {
            bars.println(&format!("{} {}", "⚠".yellow(), error.yellow()));
        }
        UploadStatus::Failed { error } => {
            pb.abandon_with_message(format!("{}", "failed".red()));
            bars.println(&format!("{} {}", "❌".red(), error.red()));
        }
        UploadStatus::Removed => pb.finish_and_clear(),
    }
}
