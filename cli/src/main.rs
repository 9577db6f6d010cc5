use anyhow::{anyhow, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, sync::Arc};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};

mod api;
mod app;
mod config;
mod controller;
mod identity;
mod player;
mod types;
mod ui;
mod upload;
mod wizard;

use app::{AppCommand, AppEvent, AppState};
use config::AppConfig;
use controller::Controller;
use identity::Identity;
use player::AudioPlayer;
use upload::FfprobeDurationProbe;

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing()?;
    info!("starting VibeSync CLI");

    let config = AppConfig::load()?;
    let identity = Identity::resolve(config.user_id());
    let client = api::Client::new(config.backend_url())?;

    let (event_tx, mut event_rx) = unbounded_channel();
    let (command_tx, command_rx) = unbounded_channel();

    let mut app_state = AppState::new(&config);

    let player = if config.audio_preview() {
        match AudioPlayer::spawn() {
            Ok(player) => Some(player),
            Err(err) => {
                warn!("audio preview disabled: {err:#}");
                app_state.handle_event(AppEvent::Info(
                    "No audio output found; previews are disabled".to_string(),
                ));
                None
            }
        }
    } else {
        None
    };
    let probe = Arc::new(FfprobeDurationProbe::new(config.ffprobe_path().cloned()));

    let controller =
        Controller::new(client.clone(), identity.clone(), event_tx, config.clone(), probe, player);
    controller.spawn(command_rx);

    seed_health_status(&client, &identity, &mut app_state).await;
    let _ = command_tx.send(AppCommand::LoadCredits);

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    enable_raw_mode()?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    terminal.hide_cursor()?;

    let ui_result = ui::run(&mut terminal, &mut app_state, &mut event_rx, command_tx.clone());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;

    ui_result
}

async fn seed_health_status(client: &api::Client, identity: &Identity, app: &mut AppState) {
    let base_url = client.base_url().to_string();
    match client.health().await {
        Ok(body) => {
            let status = body.get("status").and_then(|v| v.as_str()).unwrap_or("unknown");
            let version = body.get("version").and_then(|v| v.as_str()).unwrap_or("-");
            let who = if identity.is_minted() { "new session" } else { identity.as_str() };
            app.handle_event(AppEvent::Info(format!(
                "Backend {status} (v{version}) @ {base_url} as {who}"
            )));
        }
        Err(err) => {
            app.handle_event(AppEvent::Error(format!(
                "Backend health check failed at {base_url}: {err}"
            )));
        }
    }
}

fn setup_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err: Box<dyn std::error::Error + Send + Sync>| {
            anyhow!("failed to initialise tracing: {err}")
        })?;
    Ok(())
}
