use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{Settings, TrackingState};

const KEY_SETTINGS: &str = "settings";
const KEY_STATE: &str = "state";

/// The persistent key-value store backing Siren.
///
/// Holds exactly two records, `settings` and `state`, as JSON bodies in a
/// single SQLite table. Every write fully overwrites the record
/// (last-writer-wins); there is no merge and no transaction discipline
/// beyond the single statement.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if necessary) the database at the given path, or the
    /// default location under the local data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation, connection opening, or
    /// schema initialization fails.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(Self::default_db_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        log::info!("Database initialized at: {}", path.display());
        Ok(Self { conn })
    }

    /// Default database path: `<data_local_dir>/siren/siren.db`.
    fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("siren");
        path.push("siren.db");
        path
    }

    /// Get the persisted settings, creating and persisting the defaults on
    /// first read.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or the initial default write fails.
    pub fn get_settings(&self) -> Result<Settings> {
        if let Some(settings) = self.get_record(KEY_SETTINGS)? {
            Ok(settings)
        } else {
            let settings = Settings::default_settings();
            self.save_settings(&settings)?;
            Ok(settings)
        }
    }

    /// Overwrite the settings record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.put_record(KEY_SETTINGS, settings)
    }

    /// Get the persisted tracking state, creating and persisting the idle
    /// state on first read.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or the initial default write fails.
    pub fn get_state(&self) -> Result<TrackingState> {
        if let Some(state) = self.get_record(KEY_STATE)? {
            Ok(state)
        } else {
            let state = TrackingState::idle();
            self.save_state(&state)?;
            Ok(state)
        }
    }

    /// Overwrite the tracking state record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_state(&self, state: &TrackingState) -> Result<()> {
        self.put_record(KEY_STATE, state)
    }

    fn get_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        match body {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put_record<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteMatch;
    use chrono::Utc;

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(Some(dir.path().join("siren.db"))).unwrap();
        (dir, db)
    }

    #[test]
    fn first_read_creates_defaults() {
        let (_dir, db) = temp_db();
        assert_eq!(db.get_settings().unwrap(), Settings::default_settings());
        assert_eq!(db.get_state().unwrap(), TrackingState::idle());
    }

    #[test]
    fn settings_round_trip() {
        let (_dir, db) = temp_db();
        let mut settings = Settings::default_settings();
        settings.limit_minutes = 1;
        settings.tracked_sites.insert("netflix".to_string(), false);
        db.save_settings(&settings).unwrap();
        assert_eq!(db.get_settings().unwrap(), settings);
    }

    #[test]
    fn state_write_fully_overwrites() {
        let (_dir, db) = temp_db();
        let running = TrackingState {
            elapsed_seconds: 42,
            is_running: true,
            is_paused: false,
            current_site: Some(SiteMatch {
                key: "xbox".to_string(),
                name: "Xbox Cloud Gaming".to_string(),
            }),
            last_update: Some(Utc::now()),
            alarm_active: false,
        };
        db.save_state(&running).unwrap();
        db.save_state(&TrackingState::idle()).unwrap();
        let loaded = db.get_state().unwrap();
        assert_eq!(loaded, TrackingState::idle());
        assert!(loaded.current_site.is_none());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("siren.db");
        let state = TrackingState {
            elapsed_seconds: 5400,
            is_running: true,
            ..TrackingState::idle()
        };
        {
            let db = Database::new(Some(path.clone())).unwrap();
            db.save_state(&state).unwrap();
        }
        let db = Database::new(Some(path)).unwrap();
        assert_eq!(db.get_state().unwrap().elapsed_seconds, 5400);
    }
}
