use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use fileferry::network::{AppConfig, ClientConfig, FileClient, FileServer, ServerConfig};
use fileferry::shell;

// Added for tracing file logging
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the daily log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Where a client command connects and which local folder it uses
#[derive(Args)]
struct ConnectArgs {
    /// Server host name or address
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Local working directory
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a working directory
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory served to clients
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Address to bind to
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Sessions allowed at once, 0 for no limit
        #[arg(long)]
        max_sessions: Option<usize>,

        /// Do not serialize access to the same file name
        #[arg(long)]
        no_locks: bool,
    },
    /// Interactive menu
    Shell(ConnectArgs),
    /// List the remote folder
    List(ConnectArgs),
    /// Upload a file from the local folder
    Put {
        file: String,
        #[command(flatten)]
        connect: ConnectArgs,
    },
    /// Download a file into the local folder
    Get {
        file: String,
        #[command(flatten)]
        connect: ConnectArgs,
    },
    /// Delete a file in the remote folder
    Rm {
        file: String,
        #[command(flatten)]
        connect: ConnectArgs,
    },
}

// Returns a WorkerGuard that must be kept alive for logs to be written
fn init_logging(log_dir: &Path, log_file_prefix: &str, default_filter: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("cannot create log directory '{}'", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_prefix);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false); // Don't use ANSI codes in files

    // stdout belongs to the shell and command output
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn client_config(base: &ClientConfig, args: ConnectArgs) -> ClientConfig {
    ClientConfig {
        host: args.host.unwrap_or_else(|| base.host.clone()),
        port: args.port.unwrap_or(base.port),
        local_dir: args.dir.unwrap_or_else(|| base.local_dir.clone()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (prefix, default_filter) = match cli.command {
        Commands::Serve { .. } => ("fileferry_server", "info"),
        _ => ("fileferry_client", "warn"),
    };
    // This guard needs to stay in scope, otherwise logs stop writing.
    let _guard = init_logging(&cli.log_dir, prefix, default_filter)?;

    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Commands::Serve {
            port,
            dir,
            bind,
            max_sessions,
            no_locks,
        } => {
            let base = config.server;
            let server_config = ServerConfig {
                bind_address: bind.unwrap_or(base.bind_address),
                port: port.unwrap_or(base.port),
                root_dir: dir.unwrap_or(base.root_dir),
                max_sessions: max_sessions.unwrap_or(base.max_sessions),
                lock_files: base.lock_files && !no_locks,
            };
            let server = FileServer::bind(server_config).await?;
            server
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Cannot listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                    info!("Ctrl-C received, shutting down");
                })
                .await?;
        }
        Commands::Shell(args) => {
            let client = FileClient::new(client_config(&config.client, args));
            shell::run(&client).await?;
        }
        Commands::List(args) => {
            let client = FileClient::new(client_config(&config.client, args));
            let listing = client.list_remote().await?;
            print!("{}", shell::render_remote_listing(&listing));
        }
        Commands::Put { file, connect } => {
            let client = FileClient::new(client_config(&config.client, connect));
            let report = client
                .upload(&file)
                .await
                .with_context(|| format!("upload of '{}' failed", file))?;
            println!("{}", shell::render_transfer("Sent", &report));
        }
        Commands::Get { file, connect } => {
            let client = FileClient::new(client_config(&config.client, connect));
            let report = client
                .download(&file)
                .await
                .with_context(|| format!("download of '{}' failed", file))?;
            println!("{}", shell::render_transfer("Received", &report));
        }
        Commands::Rm { file, connect } => {
            let client = FileClient::new(client_config(&config.client, connect));
            let report = client.delete_remote(&file).await?;
            println!("{}", report.message);
        }
    }

    Ok(())
}
