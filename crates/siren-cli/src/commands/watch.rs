//! `siren watch` -- follow state changes live.
//!
//! Subscribes to the daemon's push notifications and additionally polls
//! `GetState` once a second. Push delivery is best-effort, so the poll is
//! the self-healing fallback: a missed update is corrected within a
//! second.

use anyhow::Result;
use siren_core::{
    config,
    ipc::{Command, IpcClient},
};
use siren_store::TrackingState;
use std::path::Path;
use std::time::Duration;

use super::helpers::{format_hms, status_word};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn watch(data_dir: &Path) -> Result<()> {
    let sock_path = data_dir.join(config::SOCKET_FILE);
    if !sock_path.exists() {
        anyhow::bail!("Daemon is not running. Start it with: siren start");
    }

    let client = IpcClient::new(&sock_path);
    let mut subscription = client.subscribe().await?;
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut last_printed: Option<TrackingState> = None;

    println!("Watching (Ctrl-C to stop)...");
    loop {
        let state = tokio::select! {
            update = subscription.next_update() => {
                match update? {
                    Some(state) => Some(state),
                    None => {
                        println!("Daemon went away.");
                        return Ok(());
                    }
                }
            }
            _ = poll.tick() => {
                match client.send_command(Command::GetState).await {
                    Ok(response) => response.state,
                    Err(e) => {
                        println!("Daemon went away: {e}");
                        return Ok(());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };

        if let Some(state) = state {
            if last_printed.as_ref() != Some(&state) {
                print_line(&state);
                last_printed = Some(state);
            }
        }
    }
}

fn print_line(state: &TrackingState) {
    let site = state
        .current_site
        .as_ref()
        .map_or("-", |s| s.name.as_str());
    println!(
        "{} {:>8} {} ({})",
        chrono::Local::now().format("%H:%M:%S"),
        status_word(state),
        format_hms(state.elapsed_seconds),
        site
    );
}
