use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use messaging_job_queue::backend::{
    Destination, MessagingBackend, OutgoingMessage, PushNotification, ReceivedMessage,
};
use messaging_job_queue::config::{AppConfig, CliConfig, FileConfig};
use messaging_job_queue::job_queue::{create_job_queue, JobError, JobFactoryRegistry, JobId};
use messaging_job_queue::job_store::{JobStore, SqliteJobStore};
use messaging_job_queue::metrics;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite jobs database file.
    #[clap(long, value_parser = parse_path)]
    pub db: Option<PathBuf>,

    /// Path to a TOML config file. Its values override command line flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Number of attachment download workers.
    #[clap(long)]
    pub media_workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists persisted jobs, optionally only those of one type.
    List {
        #[clap(long = "type")]
        type_key: Option<String>,
    },

    /// Flags a job as canceled. It is dropped the next time it fails or on next start.
    Cancel { id: String },

    /// Deletes a job outright.
    Purge { id: String },

    /// Shows how many jobs of each type are persisted.
    Stats,

    /// Runs every persisted job against a backend that only logs, until the
    /// queue has been idle for the given time or Ctrl-C is pressed.
    Drain {
        #[clap(long, default_value_t = 5)]
        idle_secs: u64,
    },
}

/// Backend that logs every operation and reports success.
struct DryRunBackend {
    last_activity_ms: AtomicI64,
}

impl DryRunBackend {
    fn new() -> Self {
        Self {
            last_activity_ms: AtomicI64::new(chrono::Utc::now().timestamp_millis()),
        }
    }

    fn touch(&self) {
        self.last_activity_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    fn idle_for(&self) -> Duration {
        let elapsed =
            chrono::Utc::now().timestamp_millis() - self.last_activity_ms.load(Ordering::SeqCst);
        Duration::from_millis(elapsed.max(0) as u64)
    }
}

impl MessagingBackend for DryRunBackend {
    fn send_message(
        &self,
        message: &OutgoingMessage,
        destination: &Destination,
    ) -> Result<(), JobError> {
        self.touch();
        info!(
            "[dry-run] send message {} to {} destination",
            message.message_id,
            destination.kind_str()
        );
        Ok(())
    }

    fn handle_failed_message_send(&self, message: &OutgoingMessage, error: &JobError) {
        self.touch();
        info!(
            "[dry-run] message {} failed to send: {}",
            message.message_id, error
        );
    }

    fn is_attachment_uploaded(&self, _attachment_id: i64) -> bool {
        true
    }

    fn upload_attachment(
        &self,
        attachment_id: i64,
        thread_id: i64,
        _destination: &Destination,
    ) -> Result<(), JobError> {
        self.touch();
        info!(
            "[dry-run] upload attachment {} of thread {}",
            attachment_id, thread_id
        );
        Ok(())
    }

    fn download_attachment(&self, attachment_id: i64, message_id: i64) -> Result<(), JobError> {
        self.touch();
        info!(
            "[dry-run] download attachment {} of message {}",
            attachment_id, message_id
        );
        Ok(())
    }

    fn process_received_message(
        &self,
        message: &ReceivedMessage,
        open_group_id: Option<&str>,
    ) -> Result<(), JobError> {
        self.touch();
        info!(
            "[dry-run] process received message ({} bytes, open group {:?})",
            message.data.len(),
            open_group_id
        );
        Ok(())
    }

    fn notify_push_server(&self, notification: &PushNotification) -> Result<(), JobError> {
        self.touch();
        info!("[dry-run] notify push server for {}", notification.recipient);
        Ok(())
    }

    fn trim_thread(&self, thread_id: i64, open_group_id: Option<&str>) -> Result<(), JobError> {
        self.touch();
        info!(
            "[dry-run] trim thread {} (open group {:?})",
            thread_id, open_group_id
        );
        Ok(())
    }

    fn download_group_avatar(
        &self,
        server: &str,
        room: &str,
        image_id: Option<&str>,
    ) -> Result<(), JobError> {
        self.touch();
        info!(
            "[dry-run] download avatar of {}.{} (image {:?})",
            server, room, image_id
        );
        Ok(())
    }

    fn delete_open_group_messages(
        &self,
        open_group_id: &str,
        thread_id: i64,
        server_ids: &[i64],
    ) -> Result<(), JobError> {
        self.touch();
        info!(
            "[dry-run] delete {} messages of thread {} in {}",
            server_ids.len(),
            thread_id,
            open_group_id
        );
        Ok(())
    }

    fn join_open_group(&self, join_url: &str) -> Result<(), JobError> {
        self.touch();
        info!("[dry-run] join open group {}", join_url);
        Ok(())
    }
}

async fn drain(
    config: &AppConfig,
    store: Arc<SqliteJobStore>,
    registry: Arc<JobFactoryRegistry>,
    idle_secs: u64,
) -> Result<()> {
    metrics::init_metrics();

    let backend = Arc::new(DryRunBackend::new());
    let shutdown = CancellationToken::new();
    let (runner, queue) = create_job_queue(
        store,
        registry,
        backend.clone(),
        &config.job_queue,
        shutdown.clone(),
    );
    let runner_handle = tokio::spawn(runner.run());

    let resumed = queue.resume_pending_jobs()?;
    info!("Draining {} persisted jobs", resumed);

    let idle_limit = Duration::from_secs(idle_secs);
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping the queue");
                break;
            }
            _ = ticker.tick() => {
                if backend.idle_for() >= idle_limit {
                    info!("No job ran for {:?}, stopping the queue", idle_limit);
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    runner_handle.await.context("Job queue runner failed")?;
    println!("{}", metrics::encode_metrics()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db.clone(),
        media_workers: cli_args.media_workers,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening jobs database at {:?}...", config.db_path);
    let registry = Arc::new(JobFactoryRegistry::with_default_jobs());
    let store = Arc::new(SqliteJobStore::new(&config.db_path, registry.clone())?);

    match cli_args.command {
        Command::List { type_key } => {
            let jobs = store.list_jobs(type_key.as_deref())?;
            if jobs.is_empty() {
                println!("No jobs.");
            }
            for job in jobs {
                let created = chrono::DateTime::from_timestamp(job.created_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| job.created_at.to_string());
                println!(
                    "{}  {:<24} failures={:<3} created={}{}",
                    job.id,
                    job.type_key,
                    job.failure_count,
                    created,
                    if job.canceled { "  [canceled]" } else { "" }
                );
            }
        }
        Command::Cancel { id } => {
            if !store.cancel_job(&JobId::from_raw(id.as_str()))? {
                bail!("No job with id {}", id);
            }
            println!("Job {} canceled.", id);
        }
        Command::Purge { id } => {
            let id = JobId::from_raw(id);
            if store.list_jobs(None)?.iter().all(|job| job.id != id) {
                bail!("No job with id {}", id);
            }
            store.mark_job_as_failed_permanently(&id)?;
            println!("Job {} deleted.", id);
        }
        Command::Stats => {
            let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
            for job in store.list_jobs(None)? {
                let entry = counts.entry(job.type_key).or_default();
                entry.0 += 1;
                if job.canceled {
                    entry.1 += 1;
                }
            }
            if counts.is_empty() {
                println!("No jobs.");
            }
            for (type_key, (total, canceled)) in counts {
                let known = if registry.is_registered(&type_key) {
                    ""
                } else {
                    "  [unregistered]"
                };
                println!(
                    "{:<24} {:>6} ({} canceled){}",
                    type_key, total, canceled, known
                );
            }
        }
        Command::Drain { idle_secs } => drain(&config, store, registry, idle_secs).await?,
    }

    Ok(())
}
