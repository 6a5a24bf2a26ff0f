// src/main.rs - Printer host entry point
use clap::Parser;
use marlin_host::config;
use marlin_host::file_manager::JsonUploadStore;
use marlin_host::hardware::SerialConnector;
use marlin_host::web::{self, AppState, PrinterClient, PrinterRequest};
use marlin_host::{Printer, PrinterHost};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Serial 3D printer host with an HTTP control surface
#[derive(Parser, Debug)]
#[command(name = "printer-host", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "printer.toml")]
    config: PathBuf,

    /// Maximum log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: tracing::Level,

    /// Override the serial port from the configuration
    #[arg(long)]
    port: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    tracing::info!("Starting printer host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.display().to_string();
    tracing::info!("Loading configuration from: {}", config_path);

    let mut config = config::load_config(&config_path).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", config_path, e);
        tracing::error!("Please ensure the configuration file exists and is properly formatted");
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    config.validate().map_err(|e| {
        tracing::error!("{}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    tracing::info!("Printer: {} @ {} baud", config.connection.port, config.connection.baud);
    tracing::info!(
        "Queue window: {} (refill below {})",
        config.printer.window_size,
        config.printer.refill_threshold
    );

    // Set up a channel for communication between Axum handlers and the printer task.
    let (printer_tx, printer_rx) = mpsc::channel::<PrinterRequest>(16);

    let printer = Printer::new(config.printer.clone());
    let host = PrinterHost::new(
        printer,
        Arc::new(SerialConnector),
        config.connection.clone(),
        printer_rx,
    );
    let events = host.subscriber();
    let host_task = tokio::spawn(host.run());

    let state = AppState {
        printer: PrinterClient::new(printer_tx),
        uploads: Arc::new(JsonUploadStore::new(
            &config.uploads.index,
            &config.uploads.directory,
        )),
        events,
    };
    let app = web::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.web.bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    // The router held the last request sender, so the host loop winds down now.
    host_task.await?;
    Ok(())
}
