//! `siren status` -- daemon liveness plus the tracking dashboard.

use anyhow::Result;
use siren_core::{
    config,
    ipc::{Command, IpcClient},
};
use siren_store::{Database, Settings, TrackingState};
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use super::helpers::{format_hms, format_minutes, progress_percent, status_word};

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

pub async fn show_status(data_dir: &Path) -> Result<()> {
    let sock_path = data_dir.join(config::SOCKET_FILE);
    let database = Database::new(Some(data_dir.join(config::DB_FILE)))?;
    let settings = database.get_settings()?;

    let state = if sock_path.exists() {
        let client = IpcClient::new(&sock_path);
        match client.send_command(Command::GetState).await {
            Ok(response) => {
                println!("Daemon Status: Running");
                response.state
            }
            Err(e) => {
                log::debug!("Daemon not responding: {e}");
                println!("Daemon Status: Not running (or not responding)");
                // Fall back to the persisted record, like any other
                // presentation surface.
                Some(database.get_state()?)
            }
        }
    } else {
        println!("Daemon Status: Not running");
        Some(database.get_state()?)
    };

    if let Some(state) = state {
        println!();
        print_dashboard(&state, &settings);
    }
    Ok(())
}

fn print_dashboard(state: &TrackingState, settings: &Settings) {
    let site = state
        .current_site
        .as_ref()
        .map_or_else(|| "No site tracked".to_string(), |s| s.name.clone());
    let progress = progress_percent(state.elapsed_seconds, settings.limit_seconds());

    let rows = vec![
        StatusRow {
            field: "Status",
            value: status_word(state).to_string(),
        },
        StatusRow {
            field: "Site",
            value: site,
        },
        StatusRow {
            field: "Elapsed",
            value: format_hms(state.elapsed_seconds),
        },
        StatusRow {
            field: "Limit",
            value: format_minutes(settings.limit_minutes),
        },
        StatusRow {
            field: "Progress",
            value: format!("{progress}%"),
        },
        StatusRow {
            field: "Alarm",
            value: if state.alarm_active { "ACTIVE" } else { "off" }.to_string(),
        },
    ];

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
