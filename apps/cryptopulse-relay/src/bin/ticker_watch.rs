//! Ticker Watch Binary
//!
//! Terminal subscriber for the relay. Prints every price update, marks
//! favorites, and keeps reconnecting with exponential backoff until the
//! retry budget runs out. Exits with a failure status after giving up unless
//! a terminal is attached to issue a manual reconnect.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ticker-watch
//! ```
//!
//! # Commands (stdin)
//!
//! - `r`: Reconnect now (also the only way back after giving up)
//! - `f <SYMBOL>`: Toggle a favorite
//! - `t`: Toggle theme
//! - `s`: Print the market summary
//! - `q`: Quit
//!
//! # Environment Variables
//!
//! - `RELAY_URL`: Relay WebSocket URL (default: <ws://localhost:5000>)
//! - `RECONNECT_BASE_MS`: First retry delay (default: 1000)
//! - `RECONNECT_MAX_DELAY_MS`: Retry delay cap (default: 30000)
//! - `RECONNECT_MAX_ATTEMPTS`: Retries before giving up, at least 1 (default: 5)
//! - `HISTORY_CAPACITY`: Price points kept per symbol (default: 100)
//! - `PREFERENCES_PATH`: Preferences file (default: cryptopulse-preferences.json)

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use cryptopulse_relay::application::ports::PreferencesStore;
use cryptopulse_relay::infrastructure::telemetry::{self, TelemetryConfig};
use cryptopulse_relay::{
    ClientConfig, ClientEvent, ClientReconnector, ConnectionStatus, JsonFilePreferencesStore,
    PreferencesService, TickerSnapshot,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Client event channel depth.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A parsed stdin command.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Reconnect,
    Favorite(String),
    Theme,
    Summary,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        match (parts.next()?, parts.next()) {
            ("r", None) => Some(Self::Reconnect),
            ("f", Some(symbol)) => Some(Self::Favorite(symbol.to_uppercase())),
            ("t", None) => Some(Self::Theme),
            ("s", None) => Some(Self::Summary),
            ("q", None) => Some(Self::Quit),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    let _ = dotenvy::dotenv();

    let mut telemetry_config = TelemetryConfig::from_env("ticker-watch");
    telemetry_config.enabled = false;
    let _telemetry_guard = telemetry::init_with_config(telemetry_config)?;

    let config = ClientConfig::from_env();
    tracing::info!(
        relay_url = %config.relay_url,
        max_attempts = config.max_attempts,
        preferences = %config.preferences_path.display(),
        "Starting ticker watch"
    );

    let store = JsonFilePreferencesStore::new(config.preferences_path.clone());
    let mut preferences = PreferencesService::load(store).await;

    let cancel = CancellationToken::new();
    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let client = Arc::new(ClientReconnector::new(
        config.reconnector_config(),
        event_tx,
        cancel.clone(),
    ));

    let runner = Arc::clone(&client);
    let client_task = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            tracing::error!(error = %e, "Relay client error");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Without a terminal nobody can type `r`, so giving up ends the watch
    let interactive = std::io::stdin().is_terminal();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                break;
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                handle_event(&event, &preferences);
                if event == ClientEvent::GaveUp && !(interactive && stdin_open) {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Ok(Some(line)) = line else {
                    // stdin closed; keep watching until Ctrl+C
                    stdin_open = false;
                    continue;
                };
                match Command::parse(&line) {
                    Some(Command::Reconnect) => client.reconnect(),
                    Some(Command::Favorite(symbol)) => {
                        let updated = preferences.toggle_favorite(&symbol).await;
                        println!("{symbol} favorite: {}", updated.value);
                        if let Some(notice) = updated.notice {
                            println!("! {notice}");
                        }
                    }
                    Some(Command::Theme) => {
                        let updated = preferences.toggle_theme().await;
                        println!("theme: {}", updated.value.as_str());
                        if let Some(notice) = updated.notice {
                            println!("! {notice}");
                        }
                    }
                    Some(Command::Summary) => print_summary(&client, &preferences),
                    Some(Command::Quit) => break,
                    None => println!("commands: r | f <SYMBOL> | t | s | q"),
                }
            }
        }
    }

    let gave_up = client.status() == ConnectionStatus::GaveUp;
    cancel.cancel();
    let _ = client_task.await;

    tracing::info!("Ticker watch stopped");
    Ok(if gave_up {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn handle_event<S: PreferencesStore>(event: &ClientEvent, preferences: &PreferencesService<S>) {
    match event {
        ClientEvent::Connected => println!("● connected"),
        ClientEvent::Disconnected => println!("○ disconnected"),
        ClientEvent::Reconnecting { attempt, delay } => {
            println!("… reconnecting (attempt {attempt}, in {}ms)", delay.as_millis());
        }
        ClientEvent::Update(snapshot) => {
            let favorite = preferences.preferences().is_favorite(&snapshot.symbol);
            println!("{}", format_update(snapshot, favorite));
        }
        ClientEvent::GaveUp => {
            println!("✕ relay unreachable; type `r` to reconnect");
        }
    }
}

fn print_summary<S: PreferencesStore>(client: &ClientReconnector, preferences: &PreferencesService<S>) {
    let market = client.market();
    println!(
        "status: {} | theme: {} | symbols: {}",
        client.status().as_str(),
        preferences.preferences().theme().as_str(),
        market.book().len()
    );
    for symbol in market.book().symbols() {
        let points = market.history().len(symbol);
        if let Some(snapshot) = market.snapshot(symbol) {
            let favorite = preferences.preferences().is_favorite(symbol);
            println!("{} ({points} pts)", format_update(snapshot, favorite));
        }
    }
}

fn format_update(snapshot: &TickerSnapshot, favorite: bool) -> String {
    let star = if favorite { '★' } else { ' ' };
    format!(
        "{star} {:<6} {:>14}  {:>7}%  vol {}",
        snapshot.symbol, snapshot.last_price, snapshot.price_change_percent, snapshot.volume
    )
}
