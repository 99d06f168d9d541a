//! Settings management. Reads come straight from the store; writes go
//! through the daemon so they validate and apply immediately.

use anyhow::Result;
use siren_core::{
    config,
    ipc::{Command, IpcClient},
};
use siren_store::{Database, Settings, SiteRegistry};
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use super::helpers::format_minutes;
use crate::ConfigAction;

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub async fn run(data_dir: &Path, action: ConfigAction) -> Result<()> {
    let database = Database::new(Some(data_dir.join(config::DB_FILE)))?;
    let mut settings = database.get_settings()?;

    match action {
        ConfigAction::Show => {
            show(data_dir, &settings)?;
            return Ok(());
        }
        ConfigAction::SetLimit { minutes } => settings.limit_minutes = minutes,
        ConfigAction::SetInterval { seconds } => settings.alarm_interval_seconds = seconds,
        ConfigAction::SetSpeech { enabled } => settings.enable_speech = enabled,
        ConfigAction::SetSite { key, enabled } => {
            let registry = SiteRegistry::load(&data_dir.join(config::SITES_FILE))?;
            if registry.site(&key).is_none() {
                anyhow::bail!("Unknown site key: {key}");
            }
            settings.tracked_sites.insert(key, enabled);
        }
    }

    apply(data_dir, settings).await
}

async fn apply(data_dir: &Path, settings: Settings) -> Result<()> {
    let sock_path = data_dir.join(config::SOCKET_FILE);
    if !sock_path.exists() {
        anyhow::bail!("Daemon is not running. Start it with: siren start");
    }
    let response = IpcClient::new(&sock_path)
        .send_command(Command::UpdateSettings(settings))
        .await?;
    if response.success {
        println!("Settings updated.");
        Ok(())
    } else {
        anyhow::bail!(
            "Settings rejected: {}",
            response.error.as_deref().unwrap_or("unknown error")
        )
    }
}

fn show(data_dir: &Path, settings: &Settings) -> Result<()> {
    let mut rows = vec![
        SettingRow {
            name: "Daily limit".to_string(),
            value: format!(
                "{} ({})",
                settings.limit_minutes,
                format_minutes(settings.limit_minutes)
            ),
        },
        SettingRow {
            name: "Alarm interval".to_string(),
            value: format!("{}s", settings.alarm_interval_seconds),
        },
        SettingRow {
            name: "Speech".to_string(),
            value: settings.enable_speech.to_string(),
        },
    ];

    let registry = SiteRegistry::load(&data_dir.join(config::SITES_FILE))?;
    for site in &registry.sites {
        rows.push(SettingRow {
            name: format!("Site: {}", site.key),
            value: if settings.site_enabled(&site.key) {
                "tracked".to_string()
            } else {
                "disabled".to_string()
            },
        });
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
