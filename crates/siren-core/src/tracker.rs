use chrono::{DateTime, Utc};
use siren_store::{SiteMatch, TrackingState};

/// What a periodic tick did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// Whole seconds added to the elapsed counter on this tick.
    pub accrued_seconds: u64,
    /// True when this tick carried the elapsed counter across the limit
    /// while the alarm flag was not yet set. The caller activates the
    /// alarm; the flag then suppresses further crossings.
    pub limit_crossed: bool,
}

/// The tracking state machine: `Idle`, `Running(site)`, `Paused(site)`
/// plus the orthogonal alarm flag.
///
/// Pure state and interval arithmetic -- no I/O, no clock. Every
/// time-sensitive operation takes `now` so callers (and tests) control
/// the clock. Accrual is wall-clock delta, not tick counting: irregular
/// tick intervals do not cause drift, but a backwards clock adjustment is
/// clamped to zero rather than corrected.
#[derive(Debug)]
pub struct Tracker {
    state: TrackingState,
}

impl Tracker {
    /// Tracker over a freshly reloaded state, applying the restart policy:
    /// running/paused flags forced off and elapsed time reset. Tracking
    /// deliberately does not survive a process restart.
    #[must_use]
    pub fn from_restart(persisted: TrackingState) -> Self {
        Self {
            state: persisted.after_restart(),
        }
    }

    /// Read-only view of the current state.
    #[must_use]
    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// Enter `Running(site)` from any state. From `Paused` this acts as a
    /// resume onto the given site; elapsed time is always preserved.
    pub fn start(&mut self, site: SiteMatch, now: DateTime<Utc>) {
        log::info!("Tracking started on {}", site.name);
        self.state.is_running = true;
        self.state.is_paused = false;
        self.state.current_site = Some(site);
        self.state.last_update = Some(now);
    }

    /// `Running(site)` -> `Paused(site)`. Returns false (and does nothing)
    /// unless currently running. The site reference is retained; the
    /// update timestamp is cleared so no time accrues while paused.
    pub fn pause(&mut self) -> bool {
        if !self.state.is_running {
            return false;
        }
        log::info!("Tracking paused");
        self.state.is_running = false;
        self.state.is_paused = true;
        self.state.last_update = None;
        true
    }

    /// `Paused(site)` -> `Running(site)`. Accrual restarts from `now`;
    /// the paused interval is never credited retroactively.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if !self.state.is_paused || self.state.current_site.is_none() {
            return false;
        }
        log::info!("Tracking resumed");
        self.state.is_running = true;
        self.state.is_paused = false;
        self.state.last_update = Some(now);
        true
    }

    /// `Running(A)` -> `Running(B)` directly, with no intermediate pause.
    /// Elapsed time and the update timestamp are untouched, so the switch
    /// itself neither adds nor drops seconds.
    pub fn switch(&mut self, site: SiteMatch) -> bool {
        if !self.state.is_running {
            return false;
        }
        log::info!("Switched tracking to {}", site.name);
        self.state.current_site = Some(site);
        true
    }

    /// Any state -> canonical `Idle`: elapsed time, site reference, pause
    /// flag and alarm flag all cleared.
    pub fn reset(&mut self) {
        log::info!("Tracking reset");
        self.state = TrackingState::idle();
    }

    /// Advance elapsed time while running: add the non-negative wall-clock
    /// delta since the last update, floored to whole seconds, and report
    /// whether this tick crossed `limit_seconds`. No-op while paused or
    /// idle.
    pub fn tick(&mut self, now: DateTime<Utc>, limit_seconds: u64) -> TickOutcome {
        let Some(last) = self.state.last_update else {
            return TickOutcome::default();
        };
        if !self.state.is_running {
            return TickOutcome::default();
        }

        let delta = now.signed_duration_since(last).num_seconds().max(0);
        #[allow(clippy::cast_sign_loss)]
        let delta = delta as u64;
        if delta == 0 {
            return TickOutcome::default();
        }

        self.state.elapsed_seconds += delta;
        self.state.last_update = Some(now);

        TickOutcome {
            accrued_seconds: delta,
            limit_crossed: self.state.elapsed_seconds >= limit_seconds
                && !self.state.alarm_active,
        }
    }

    /// Set the alarm flag. Returns false when already set.
    pub fn activate_alarm(&mut self) -> bool {
        if self.state.alarm_active {
            return false;
        }
        self.state.alarm_active = true;
        true
    }

    /// Clear the alarm flag (explicit stop). Elapsed time is untouched, so
    /// continued tracking past the limit will trip the alarm again on the
    /// next accruing tick.
    pub fn silence_alarm(&mut self) -> bool {
        if !self.state.alarm_active {
            return false;
        }
        self.state.alarm_active = false;
        true
    }
}
