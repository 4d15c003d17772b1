mod config;
mod controller;
mod logging;
mod model;
mod view;

use std::sync::Arc;
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

use config::Config;
use controller::{InputCommand, PlaybackCoordinator};
use model::{MainExecutor, SpotifyClient};
use view::StdoutPresenter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    if let Err(e) = logging::init_logging(&config.log_dir) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::info!("=== Remote Sync Starting ===");

    let token = config.load_token()?;
    let spotify = SpotifyClient::from_token(token, config.preferred_device.clone(), config.poll_interval).await?;

    if let Err(e) = spotify.verify().await {
        tracing::error!(error = %e, "rspotify authentication failed");
        return Err(anyhow::anyhow!("rspotify init failed: {}", e));
    }

    let spotify = Arc::new(spotify);
    let (executor, main_loop) = MainExecutor::new();
    let coordinator = PlaybackCoordinator::new(
        &executor,
        spotify.clone(),
        spotify,
        Arc::new(StdoutPresenter::new()),
        &config,
    );

    println!("{}", InputCommand::HELP);
    coordinator.activate();

    let (quit_tx, quit_rx) = oneshot::channel();
    tokio::spawn(read_commands(executor.clone(), coordinator.clone(), quit_tx));

    tokio::select! {
        _ = main_loop.run() => {}
        _ = quit_rx => tracing::info!("Quit requested"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Interrupted");
        }
    }

    coordinator.deactivate();
    tracing::info!("Remote Sync shutting down");
    Ok(())
}

/// Read commands from stdin and run them on the main loop.
async fn read_commands(executor: MainExecutor, coordinator: PlaybackCoordinator, quit: oneshot::Sender<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read input");
                break;
            }
        };

        match InputCommand::parse(&line) {
            Some(InputCommand::Quit) => break,
            Some(command) => {
                let coordinator = coordinator.clone();
                executor.dispatch(move || {
                    coordinator.handle_input(command);
                });
            }
            None if line.trim().is_empty() => {}
            None => println!("{}", InputCommand::HELP),
        }
    }

    let _ = quit.send(());
}
