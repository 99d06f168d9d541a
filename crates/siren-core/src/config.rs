use anyhow::Result;
use std::path::PathBuf;

/// File names under the data directory.
pub const SOCKET_FILE: &str = "siren.sock";
pub const PID_FILE: &str = "siren.pid";
pub const LOG_FILE: &str = "siren.log";
pub const DB_FILE: &str = "siren.db";
pub const SITES_FILE: &str = "sites.toml";

/// Get the local data directory for siren.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("siren");
    Ok(path)
}
