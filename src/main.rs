//! webcore server and introspection CLI.
//!
//! ```text
//! webcore serve    [--config FILE]   run the HTTP server
//! webcore routes   [--config FILE]   print registered routes
//! webcore handlers [--config FILE]   print handlers and their methods
//! ```
//!
//! Without a config file the defaults apply. Routes come from the `routes`
//! section of the config and the built-in controllers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;

use webcore::config::{load_config, AppConfig};
use webcore::lifecycle::{spawn_signal_handler, Shutdown};
use webcore::observability::{logging, metrics};
use webcore::session::MemoryBackend;
use webcore::{AppBuilder, HttpServer};

#[derive(Parser)]
#[command(name = "webcore")]
#[command(about = "Request routing and dispatch server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve(ConfigArgs),
    /// Print all routes
    Routes(ConfigArgs),
    /// Print all handlers with their registered methods
    Handlers(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> Result<AppConfig, Box<dyn std::error::Error>> {
        match &self.config {
            Some(path) => Ok(load_config(path)?),
            None => Ok(AppConfig::default()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args.load()?).await,
        Commands::Routes(args) => {
            let handler = AppBuilder::new(args.load()?).build()?;
            print!("{}", handler.router().registry().dump_routes());
            Ok(())
        }
        Commands::Handlers(args) => {
            let handler = AppBuilder::new(args.load()?).build()?;
            print!("{}", handler.router().registry().dump_handlers());
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "webcore starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        save_mode = ?config.session.save_mode,
        "Configuration loaded"
    );

    let listener_config = config.listener.clone();
    let handler = AppBuilder::new(config)
        .session_backend(Arc::new(MemoryBackend::new()))
        .build()?;

    let listener = TcpListener::bind(&listener_config.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    HttpServer::new(handler, &listener_config).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
