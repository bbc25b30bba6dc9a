use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::Result;
use aion_core::Config;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

/// Route tracing output to `<data_dir>/aion/aion.log`; the terminal belongs to the UI
fn init_logging(level: &str) -> Result<()> {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    let log_dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("no data directory available for the log file"))?
        .join("aion");
    std::fs::create_dir_all(&log_dir)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("aion.log"))?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    if let Err(e) = init_logging(config.log_level()) {
        eprintln!("Logging disabled: {}", e);
    }
    if let Some(e) = config_error {
        tracing::warn!("Ignoring unreadable config, using defaults: {}", e);
    }

    tracing::info!(
        "Starting AION v{} (chat: {}, image: {})",
        env!("CARGO_PKG_VERSION"),
        config.chat_model(),
        config.image_model()
    );

    let mut app = App::new(&config);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    tracing::info!("AION exited");
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        // Idle controllers never resolve, so only live work competes with input
        tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event)?,
            event = app.chat.next_stream_event() => app.on_stream_event(event),
            outcome = app.vision.next_outcome() => app.vision.apply_outcome(outcome),
        }
    }
    Ok(())
}
