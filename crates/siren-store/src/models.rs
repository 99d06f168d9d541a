use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::registry::SiteRegistry;

/// Default daily limit: 3 hours.
pub const DEFAULT_LIMIT_MINUTES: u32 = 180;
pub const DEFAULT_ALARM_INTERVAL_SECONDS: u32 = 30;

/// Bounds accepted by [`Settings::validate`].
pub const MAX_LIMIT_MINUTES: u32 = 1440;
pub const MIN_ALARM_INTERVAL_SECONDS: u32 = 5;
pub const MAX_ALARM_INTERVAL_SECONDS: u32 = 300;

/// A settings update that falls outside the accepted ranges.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("limit must be between 1 and {MAX_LIMIT_MINUTES} minutes (got {0})")]
    LimitOutOfRange(u32),
    #[error(
        "alarm interval must be between {MIN_ALARM_INTERVAL_SECONDS} and \
         {MAX_ALARM_INTERVAL_SECONDS} seconds (got {0})"
    )]
    IntervalOutOfRange(u32),
}

/// User settings: the daily limit, alarm cadence, speech toggle and
/// per-site tracking toggles. Mutated only through an explicit update
/// command and persisted immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub limit_minutes: u32,
    pub alarm_interval_seconds: u32,
    pub enable_speech: bool,
    /// Site key -> tracking enabled. Missing keys count as enabled.
    pub tracked_sites: BTreeMap<String, bool>,
}

impl Settings {
    /// Default settings with every site in the built-in registry enabled.
    #[must_use]
    pub fn default_settings() -> Self {
        let tracked_sites = SiteRegistry::defaults()
            .sites
            .iter()
            .map(|s| (s.key.clone(), true))
            .collect();
        Self {
            limit_minutes: DEFAULT_LIMIT_MINUTES,
            alarm_interval_seconds: DEFAULT_ALARM_INTERVAL_SECONDS,
            enable_speech: true,
            tracked_sites,
        }
    }

    /// Whether tracking is enabled for a site key. Sites absent from the
    /// map are treated as enabled, matching first-run behavior before any
    /// toggle has been persisted.
    #[must_use]
    pub fn site_enabled(&self, key: &str) -> bool {
        self.tracked_sites.get(key).copied().unwrap_or(true)
    }

    /// Check that all values are within the accepted ranges.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.limit_minutes == 0 || self.limit_minutes > MAX_LIMIT_MINUTES {
            return Err(SettingsError::LimitOutOfRange(self.limit_minutes));
        }
        if self.alarm_interval_seconds < MIN_ALARM_INTERVAL_SECONDS
            || self.alarm_interval_seconds > MAX_ALARM_INTERVAL_SECONDS
        {
            return Err(SettingsError::IntervalOutOfRange(
                self.alarm_interval_seconds,
            ));
        }
        Ok(())
    }

    /// Limit expressed in seconds, the unit accrual is compared against.
    #[must_use]
    pub fn limit_seconds(&self) -> u64 {
        u64::from(self.limit_minutes) * 60
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}

/// The site a URL resolved to: registry key plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMatch {
    pub key: String,
    pub name: String,
}

/// The persisted tracking record, mutated exclusively by the tracking
/// state machine.
///
/// Invariants:
/// - `is_running` and `is_paused` are never both true
/// - `current_site` is `None` whenever neither running nor paused
/// - `last_update` is `Some` iff `is_running`
/// - `elapsed_seconds` only increases, and only while running
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingState {
    pub elapsed_seconds: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub current_site: Option<SiteMatch>,
    pub last_update: Option<DateTime<Utc>>,
    pub alarm_active: bool,
}

impl TrackingState {
    /// The canonical idle state.
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    /// Apply the restart policy to a state reloaded from the store: a
    /// running timer does not survive the process, so running/paused flags
    /// and elapsed time are cleared. The site reference and alarm flag go
    /// with them -- the audio loop died with the old process, and a site
    /// may not be referenced while idle.
    #[must_use]
    pub fn after_restart(self) -> Self {
        Self::idle()
    }

    /// Whether the state is neither running nor paused.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.is_running && !self.is_paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_enable_all_builtin_sites() {
        let settings = Settings::default_settings();
        for site in &SiteRegistry::defaults().sites {
            assert!(settings.site_enabled(&site.key), "{} disabled", site.key);
        }
        assert_eq!(settings.limit_minutes, 180);
        assert_eq!(settings.alarm_interval_seconds, 30);
        assert!(settings.enable_speech);
    }

    #[test]
    fn unknown_site_counts_as_enabled() {
        let settings = Settings::default_settings();
        assert!(settings.site_enabled("not-in-the-map"));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut settings = Settings::default_settings();
        settings.limit_minutes = 0;
        assert_eq!(settings.validate(), Err(SettingsError::LimitOutOfRange(0)));

        settings.limit_minutes = 60;
        settings.alarm_interval_seconds = 4;
        assert_eq!(
            settings.validate(),
            Err(SettingsError::IntervalOutOfRange(4))
        );

        settings.alarm_interval_seconds = 5;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn restart_policy_yields_idle() {
        let state = TrackingState {
            elapsed_seconds: 5400,
            is_running: true,
            is_paused: false,
            current_site: Some(SiteMatch {
                key: "netflix".to_string(),
                name: "Netflix".to_string(),
            }),
            last_update: Some(Utc::now()),
            alarm_active: true,
        };
        let restored = state.after_restart();
        assert_eq!(restored, TrackingState::idle());
        assert_eq!(restored.elapsed_seconds, 0);
        assert!(!restored.is_running);
        assert!(!restored.is_paused);
    }
}
