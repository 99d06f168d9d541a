//! Initialize siren with complete first-run setup
//!
//! Handles database initialization, the tracked-site registry file, and
//! alarm sound guidance.

use anyhow::{Context, Result};
use siren_core::{alarm::ALARM_SOUND, config};
use siren_store::{Database, SiteRegistry};
use std::fs;
use std::path::Path;

/// Initialize siren with complete setup
///
/// # Errors
///
/// Returns an error if directory creation, database initialization, or
/// registry file writing fails.
pub fn init_command(data_dir: &Path) -> Result<()> {
    println!("Initializing Siren...\n");

    // Step 1: Database setup
    println!("Step 1/3: Database Setup");
    println!("{}", "-".repeat(40));
    fs::create_dir_all(data_dir).context("Failed to create data directory")?;
    let db = Database::new(Some(data_dir.join(config::DB_FILE)))?;
    // First read persists the default settings and idle state records.
    let settings = db.get_settings()?;
    let _ = db.get_state()?;
    println!("Database ready (limit: {} minutes).", settings.limit_minutes);

    // Step 2: Tracked-site registry
    println!("\nStep 2/3: Tracked Sites");
    println!("{}", "-".repeat(40));
    let sites_path = data_dir.join(config::SITES_FILE);
    if sites_path.exists() {
        let registry = SiteRegistry::load(&sites_path)?;
        println!(
            "Existing registry at {} ({} sites).",
            sites_path.display(),
            registry.sites.len()
        );
    } else {
        let registry = SiteRegistry::defaults();
        let toml = registry
            .to_toml()
            .context("Failed to serialize default site registry")?;
        fs::write(&sites_path, toml)?;
        println!("Wrote default registry to {}:", sites_path.display());
        for site in &registry.sites {
            println!("  - {} ({})", site.name, site.key);
        }
        println!("Edit this file to add or remove sites.");
    }

    // Step 3: Alarm sound
    println!("\nStep 3/3: Alarm Sound");
    println!("{}", "-".repeat(40));
    let sound_path = data_dir.join(ALARM_SOUND);
    if sound_path.exists() {
        println!("Alarm sound found at {}.", sound_path.display());
    } else {
        println!("No alarm sound yet. Copy one to: {}", sound_path.display());
        println!("Without it the alarm still announces by speech.");
    }

    println!("\n========================================");
    println!("  Setup Complete!");
    println!("========================================");
    println!("\nStart the daemon with: siren start");

    Ok(())
}
