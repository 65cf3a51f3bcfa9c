mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use std::time::Duration;

use anyhow::{Context, Result};
use chatbox_core::{storage::STORAGE_FILE, ApiClient, AuthContext, Config, LocalStorage};
use clap::Parser;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "chatbox")]
#[command(version, about = "Terminal client for the chatbox backend")]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(long, env = "CHATBOX_API_URL")]
    api_url: Option<String>,

    /// Log level written to chatbox.log (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Keep credentials in memory only; nothing is written to disk
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dir = Config::dir()?;
    let config = Config::load()?.with_api_base_url(cli.api_url);

    let level = cli
        .log_level
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    let _log_guard = logging::init(&dir, &level);

    let storage = if cli.ephemeral {
        LocalStorage::in_memory()
    } else {
        LocalStorage::load(dir.join(STORAGE_FILE))?
    };
    let auth = AuthContext::new(storage);
    let api = ApiClient::with_timeout(
        &config.api_base_url,
        auth,
        Duration::from_secs(config.request_timeout_secs),
    )
    .with_context(|| format!("Invalid API base URL: {}", config.api_base_url))?;

    tracing::info!(
        base_url = %api.base_url(),
        ephemeral = cli.ephemeral,
        "Starting chatbox"
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let mut app = App::new(api, events.sender());
    app.start();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }
    Ok(())
}
