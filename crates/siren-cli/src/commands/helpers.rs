//! Small pure formatting helpers for CLI output.

use siren_store::TrackingState;

/// Format seconds as `HH:MM:SS`.
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Format minutes compactly, e.g. `3h 0m` or `45m`.
pub fn format_minutes(total_minutes: u32) -> String {
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Progress against the limit as a whole percentage, capped at 100.
pub fn progress_percent(elapsed_seconds: u64, limit_seconds: u64) -> u64 {
    if limit_seconds == 0 {
        return 100;
    }
    (elapsed_seconds * 100 / limit_seconds).min(100)
}

/// One-word status for display.
pub fn status_word(state: &TrackingState) -> &'static str {
    if state.alarm_active {
        "ALARM"
    } else if state.is_running {
        "Tracking"
    } else if state.is_paused {
        "Paused"
    } else {
        "Idle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(61), "00:01:01");
        assert_eq!(format_hms(5400), "01:30:00");
        assert_eq!(format_hms(86_399), "23:59:59");
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(180), "3h 0m");
        assert_eq!(format_minutes(61), "1h 1m");
    }

    #[test]
    fn test_progress_caps_at_one_hundred() {
        assert_eq!(progress_percent(0, 3600), 0);
        assert_eq!(progress_percent(1800, 3600), 50);
        assert_eq!(progress_percent(3600, 3600), 100);
        assert_eq!(progress_percent(99_999, 3600), 100);
    }

    #[test]
    fn test_status_word_precedence() {
        let mut state = TrackingState::idle();
        assert_eq!(status_word(&state), "Idle");
        state.is_running = true;
        assert_eq!(status_word(&state), "Tracking");
        state.alarm_active = true;
        assert_eq!(status_word(&state), "ALARM");
        state.alarm_active = false;
        state.is_running = false;
        state.is_paused = true;
        assert_eq!(status_word(&state), "Paused");
    }
}
