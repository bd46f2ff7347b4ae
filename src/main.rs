use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber, filter::LevelFilter};

use shutterbox::{Config, create_app_with_gallery, gallery::Gallery, startup_checks};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Global options that apply to all commands
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    overrides: Overrides,
}

/// Settings that take precedence over the config file.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Shared password guests log in with
    #[arg(long, env = "GALLERY_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Site title shown on every page
    #[arg(long, env = "SITE_TITLE", global = true)]
    site_title: Option<String>,

    /// Directory holding the uploaded photos
    #[arg(long, env = "UPLOAD_DIR", global = true)]
    upload_dir: Option<PathBuf>,

    /// Directory holding sidecars and thumbnails
    #[arg(long, env = "METADATA_DIR", global = true)]
    metadata_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(password) = self.password {
            config.app.password = password;
        }
        if let Some(title) = self.site_title {
            config.app.name = title;
        }
        if let Some(dir) = self.upload_dir {
            config.gallery.upload_directory = dir;
        }
        if let Some(dir) = self.metadata_dir {
            config.gallery.metadata_directory = dir;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server (default if no command specified)
    Serve {
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Automatically quit after specified number of seconds (useful for testing)
        #[arg(long)]
        quit_after: Option<u64>,
    },

    /// Run one reconciliation pass over the photo directories and exit
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(&cli.log_level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_config(&cli.config)?;
    cli.overrides.apply(&mut config);

    match cli.command {
        Some(Commands::Reconcile) => run_reconcile(config).await,
        Some(Commands::Serve {
            port,
            host,
            quit_after,
        }) => run_server(config, port, host, quit_after).await,
        None => run_server(config, None, None, None).await,
    }
}

/// `RUST_LOG` directives on top of `--log-level` as the default for every target.
fn log_filter(log_level: &str) -> EnvFilter {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };

    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn load_config(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
    if config_path.exists() {
        let config_content = std::fs::read_to_string(config_path)?;
        let config = toml_edit::de::from_str::<Config>(&config_content)?;
        info!("Configuration loaded from: {:?}", config_path);
        Ok(config)
    } else {
        info!("Config file not found at {:?}, using defaults", config_path);
        Ok(Config::default())
    }
}

async fn run_reconcile(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let gallery = Arc::new(Gallery::new(config.gallery));
    let report = tokio::task::spawn_blocking(move || gallery.reconcile()).await??;

    println!("Metadata created:   {}", report.metadata_created);
    println!("Thumbnails created: {}", report.thumbnails_created);
    println!("Metadata removed:   {}", report.metadata_removed);
    println!("Thumbnails removed: {}", report.thumbnails_removed);
    println!("Failures:           {}", report.failures);
    Ok(())
}

async fn run_server(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    quit_after: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or(config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info!("Starting {} server", config.app.name);
    info!("Template directory: {:?}", config.templates.directory);
    info!(
        "Static files directory: {:?}",
        config.static_files.directory
    );
    info!("Upload directory: {:?}", config.gallery.upload_directory);
    info!("Metadata directory: {:?}", config.gallery.metadata_directory);

    if let Err(errors) = startup_checks::perform_startup_checks(&config).await {
        for error in &errors {
            tracing::error!("Startup check failed: {}", error);
        }
        tracing::error!("Critical startup check failed, exiting");
        return Err("Critical startup check failed".into());
    }

    let gallery = Arc::new(Gallery::new(config.gallery.clone()));
    let reconciler = Arc::clone(&gallery);
    match tokio::task::spawn_blocking(move || reconciler.reconcile()).await? {
        Ok(report) => info!("Startup reconciliation finished: {:?}", report),
        Err(e) => {
            tracing::error!("Startup reconciliation failed: {}", e);
            return Err(e.into());
        }
    }

    let app = create_app_with_gallery(config, gallery).await;

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app);
    let graceful = server.with_graceful_shutdown(shutdown_signal(quit_after));

    if let Err(e) = graceful.await {
        tracing::error!("Server error: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(quit_after: Option<u64>) {
    use tokio::signal;
    use tokio::time::{Duration, sleep};

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let quit_timer = async {
        if let Some(seconds) = quit_after {
            info!(
                "Server will automatically shut down after {} seconds",
                seconds
            );
            sleep(Duration::from_secs(seconds)).await;
            info!("Quit timer expired, shutting down");
        } else {
            std::future::pending::<()>().await
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        },
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        },
        _ = quit_timer => {},
    }
}
