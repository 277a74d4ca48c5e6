use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

mod api;
mod app;
mod config;
mod handler;
mod markdown;
mod tui;
mod ui;

use api::ApiClient;
use app::App;
use config::Config;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5001";

/// Terminal chat client for a lab research-assistant service
#[derive(Parser, Debug)]
#[command(name = "labchat", version, about)]
struct Args {
    /// Base URL of the assistant backend (overrides the config file)
    #[arg(long)]
    server_url: Option<String>,

    /// Log file path (overrides the config file)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // A broken config file falls back to defaults; the error is reported
    // once logging is up.
    let (config, config_error) = match Config::load_or_init() {
        Ok(config) => (config, None),
        Err(err) => (Config::new(), Some(err)),
    };

    let server_url = args
        .server_url
        .or(config.server_url)
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
    let log_file = args
        .log_file
        .or(config.log_file)
        .unwrap_or_else(default_log_file);

    // The alternate screen owns the terminal, so diagnostics go to a file.
    init_logging(&log_file)
        .with_context(|| format!("opening log file {}", log_file.display()))?;
    if let Some(err) = config_error {
        tracing::warn!("could not load config, using defaults: {err:#}");
    }
    tracing::info!(server_url = %server_url, "starting labchat");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let mut app = App::new(ApiClient::new(&server_url));
    handler::start_session(&app, &events.sender());

    let result = run(&mut terminal, &mut events, &mut app).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, events: &mut tui::EventHandler, app: &mut App) -> Result<()> {
    let sender = events.sender();
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event, &sender)?;
        } else {
            break;
        }
    }
    tracing::info!("shutting down");
    Ok(())
}

fn default_log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("labchat")
        .join("labchat.log")
}

fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let filter = tracing_subscriber::EnvFilter::try_from_env("LABCHAT_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
