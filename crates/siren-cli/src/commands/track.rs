//! Tracking commands relayed to the daemon: track, pause, resume, reset,
//! stop-alarm.

use anyhow::Result;
use siren_core::{
    config,
    ipc::{Command, CommandResponse, IpcClient},
};
use std::io::Write;
use std::path::Path;

use super::helpers::{format_hms, status_word};

async fn send(data_dir: &Path, command: Command) -> Result<CommandResponse> {
    let sock_path = data_dir.join(config::SOCKET_FILE);
    if !sock_path.exists() {
        anyhow::bail!("Daemon is not running. Start it with: siren start");
    }
    IpcClient::new(&sock_path).send_command(command).await
}

fn report(response: &CommandResponse) {
    if response.success {
        if let Some(state) = &response.state {
            println!(
                "{} -- {} elapsed",
                status_word(state),
                format_hms(state.elapsed_seconds)
            );
        }
    } else {
        println!(
            "Failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
}

pub async fn start(data_dir: &Path, url: Option<String>) -> Result<()> {
    let response = send(data_dir, Command::Start { tab_url: url }).await?;
    report(&response);
    Ok(())
}

pub async fn pause(data_dir: &Path) -> Result<()> {
    let response = send(data_dir, Command::Pause).await?;
    report(&response);
    Ok(())
}

pub async fn resume(data_dir: &Path) -> Result<()> {
    let response = send(data_dir, Command::Resume).await?;
    report(&response);
    Ok(())
}

pub async fn reset(data_dir: &Path, yes: bool) -> Result<()> {
    if !yes && !confirm("Are you sure you want to reset? This cannot be undone.")? {
        println!("Aborted.");
        return Ok(());
    }
    let response = send(data_dir, Command::Reset).await?;
    report(&response);
    Ok(())
}

pub async fn stop_alarm(data_dir: &Path) -> Result<()> {
    let response = send(data_dir, Command::StopAlarm).await?;
    report(&response);
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
