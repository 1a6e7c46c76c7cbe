use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use clipdeck::{
    clipboard::{
        classify, processor::HistoryPersister, ClipboardBackend, ClipboardEntry, SystemClipboard,
    },
    config::AppConfig,
    control::{
        auth::{AuthConfig, AuthManager},
        ControlServer,
    },
    history::HistoryStore,
    service::ClipboardService,
    storage::{Storage, CLIPBOARD_HISTORY},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "clipdeck",
    about = "Clipboard history daemon with a local control API",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring the clipboard
    Start {
        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Disable authentication
        #[arg(long)]
        no_auth: bool,

        /// Monitor only, without the control server
        #[arg(long)]
        no_server: bool,

        /// Directory for history and backups
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Maximum number of history entries
        #[arg(long)]
        max_history: Option<usize>,

        /// Polling interval in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },

    /// Show authentication token
    Token,

    /// Print the stored clipboard history
    History {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Show how a piece of text would be classified
    Classify { text: String },

    /// Quick clipboard operations
    Clip {
        #[command(subcommand)]
        action: ClipAction,
    },
}

#[derive(Subcommand)]
enum ClipAction {
    /// Print current clipboard text
    Get,

    /// Replace clipboard text
    Set { text: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipdeck=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            port,
            host,
            no_auth,
            no_server,
            data_dir,
            max_history,
            poll_interval_ms,
        } => {
            let mut config = match config {
                Some(path) => AppConfig::load(&path)?,
                None => AppConfig::default(),
            };
            if let Some(port) = port {
                config.control.port = port;
            }
            if let Some(host) = host {
                config.control.host = host;
            }
            if no_auth {
                config.control.require_auth = false;
            }
            if let Some(dir) = data_dir {
                config.storage.data_dir = dir;
            }
            if let Some(max) = max_history {
                config.history.max_size = max;
            }
            if let Some(ms) = poll_interval_ms {
                config.scheduler.poll_interval_ms = ms;
            }

            run_daemon(config, no_server).await?;
        }

        Commands::Token => {
            let auth_manager = AuthManager::new(AuthConfig::default()).await?;

            if let Some(token) = auth_manager.get_token() {
                println!("{token}");
            } else {
                error!("No authentication token found");
                std::process::exit(1);
            }
        }

        Commands::History { format, data_dir } => {
            let mut config = AppConfig::default();
            if let Some(dir) = data_dir {
                config.storage.data_dir = dir;
            }
            let storage = Storage::new(config.storage).await?;
            let entries: Vec<ClipboardEntry> = storage.load(CLIPBOARD_HISTORY).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                OutputFormat::Text => {
                    for entry in &entries {
                        let pin = if entry.is_pinned { "*" } else { " " };
                        let label = entry.preview.as_deref().unwrap_or(&entry.content);
                        println!(
                            "{pin} {} [{:?}] {}",
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.entry_type,
                            label.replace('\n', " ")
                        );
                    }
                }
            }
        }

        Commands::Classify { text } => {
            println!("{}", serde_json::to_string_pretty(&classify(&text))?);
        }

        Commands::Clip { action } => {
            let clipboard = SystemClipboard::new()?;

            match action {
                ClipAction::Get => print!("{}", clipboard.read_text()?),
                ClipAction::Set { text } => clipboard.write_text(&text)?,
            }
        }
    }

    Ok(())
}

async fn run_daemon(config: AppConfig, no_server: bool) -> anyhow::Result<()> {
    info!("Starting clipdeck...");

    let storage = Arc::new(
        Storage::new(config.storage.clone())
            .await
            .with_context(|| format!("opening {}", config.storage.data_dir.display()))?,
    );

    let restored: Vec<ClipboardEntry> = storage.load(CLIPBOARD_HISTORY).await.unwrap_or_else(|e| {
        warn!("Starting with empty history: {}", e);
        Vec::new()
    });
    info!("Restored {} history entries", restored.len());
    let store = HistoryStore::from_entries(restored, config.history.max_size);

    let clipboard: Arc<dyn ClipboardBackend> =
        Arc::new(SystemClipboard::new().context("opening the system clipboard")?);
    let service = Arc::new(ClipboardService::with_history(clipboard, &config, store));

    let persister = HistoryPersister::new(storage.clone(), service.history());
    let persister_task = tokio::spawn(persister.start_processing(service.subscribe()));

    service.start_monitoring();
    info!("Clipboard monitoring started");

    if no_server {
        tokio::signal::ctrl_c().await?;
    } else {
        let auth_manager = AuthManager::new(config.control.auth_config()).await?;
        if let Some(token) = auth_manager.get_token() {
            info!("Authentication token: {}", token);
        }

        let server = ControlServer::new(service.clone(), auth_manager, &config.control);
        tokio::select! {
            result = server.run() => result?,
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    info!("Shutting down");
    service.stop_monitoring();
    persister_task.abort();
    HistoryPersister::new(storage, service.history())
        .save_snapshot()
        .await
        .context("saving history on shutdown")?;

    Ok(())
}
