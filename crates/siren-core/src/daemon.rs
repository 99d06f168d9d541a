use crate::{
    alarm::AlarmController,
    ipc::{self, BrowserEvent, Command, CommandResponse, DaemonRequest},
    sites::SiteMatcher,
    tracker::Tracker,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use siren_store::{Database, Settings, SiteRegistry, TrackingState};
use std::{path::Path, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    time::interval,
};

/// Accrual is wall-clock delta, so the tick cadence only bounds how
/// stale the persisted counter can get.
pub const DEFAULT_TICK_INTERVAL_SECONDS: u64 = 6;

/// The daemon: sole owner of the tracking state machine.
///
/// All transitions run to completion on one logical thread -- the event
/// loop multiplexes the periodic tick, the IPC request channel and
/// Ctrl-C. Every transition persists the full state record and publishes
/// a best-effort update on the broadcast channel (dropped silently when
/// nobody is subscribed).
pub struct Daemon {
    database: Database,
    matcher: SiteMatcher,
    tracker: Tracker,
    alarm: AlarmController,
    /// Taken by `run_with_signals`; the loop owns it from then on.
    requests_rx: Option<mpsc::Receiver<DaemonRequest>>,
    requests_tx: mpsc::Sender<DaemonRequest>,
    updates: broadcast::Sender<TrackingState>,
    /// Last URL the event source reported as active, kept to evaluate the
    /// focus-regain resume check and `Start` without an explicit URL.
    last_active_url: Option<String>,
    tick_interval_seconds: u64,
}

impl Daemon {
    /// Build the daemon: reload persisted state, apply the restart policy
    /// (running timers do not survive a restart), and persist the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial store round-trip fails.
    pub fn new(
        database: Database,
        registry: &SiteRegistry,
        alarm: AlarmController,
        tick_interval_seconds: u64,
    ) -> Result<Self> {
        let tracker = Tracker::from_restart(database.get_state()?);
        database.save_state(tracker.state())?;

        let (requests_tx, requests_rx) = mpsc::channel(64);
        let (updates, _) = broadcast::channel(16);

        Ok(Self {
            database,
            matcher: SiteMatcher::new(registry),
            tracker,
            alarm,
            requests_rx: Some(requests_rx),
            requests_tx,
            updates,
            last_active_url: None,
            tick_interval_seconds,
        })
    }

    /// Run until Ctrl-C or a `Shutdown` request.
    ///
    /// # Errors
    ///
    /// Returns an error if the IPC socket cannot be bound or the final
    /// state persist fails.
    pub async fn run_with_signals(&mut self, sock_path: &Path) -> Result<()> {
        let mut requests_rx = self
            .requests_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("daemon loop already running"))?;
        let requests = self.requests_tx.clone();
        let updates = self.updates.clone();
        let sock = sock_path.to_path_buf();
        tokio::spawn(async move {
            if let Err(e) = ipc::listen(&sock, requests, updates).await {
                log::error!("IPC listener failed: {e}");
            }
        });

        let mut ticker = interval(Duration::from_secs(self.tick_interval_seconds));
        log::info!("Daemon started with signal handling and IPC");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.on_tick(Utc::now()) {
                        log::error!("Daemon tick failed: {e}");
                    }
                }
                Some(request) = requests_rx.recv() => {
                    if self.handle_request(request, Utc::now()) {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received Ctrl-C, shutting down...");
                    break;
                }
            }
        }

        // Pause any running timer and quiet the alarm before exit; the
        // restart policy will zero the record on the next launch anyway.
        self.tracker.pause();
        self.alarm.deactivate();
        self.database.save_state(self.tracker.state())?;
        log::info!("Daemon shut down gracefully.");
        Ok(())
    }

    /// Returns true when the daemon should shut down.
    fn handle_request(&mut self, request: DaemonRequest, now: DateTime<Utc>) -> bool {
        match request {
            DaemonRequest::Command { command, reply } => {
                let response = self.handle_command(command, now);
                // Client may have gone away; the transition already ran.
                let _ = reply.send(response);
                false
            }
            DaemonRequest::Event(event) => {
                self.handle_event(event, now);
                false
            }
            DaemonRequest::Shutdown => {
                log::info!("Shutdown requested over IPC");
                true
            }
        }
    }

    fn handle_command(&mut self, command: Command, now: DateTime<Utc>) -> CommandResponse {
        log::debug!("Handling command: {command:?}");
        match command {
            Command::Start { tab_url } => self.cmd_start(tab_url, now),
            Command::Pause => {
                self.tracker.pause();
                self.commit_ok()
            }
            Command::Resume => self.cmd_resume(now),
            Command::Reset => {
                self.tracker.reset();
                self.alarm.deactivate();
                self.commit_ok()
            }
            Command::StopAlarm => {
                self.tracker.silence_alarm();
                self.alarm.deactivate();
                self.commit_ok()
            }
            Command::GetState => CommandResponse::ok(self.tracker.state().clone()),
            Command::UpdateSettings(settings) => self.cmd_update_settings(&settings),
        }
    }

    fn cmd_start(&mut self, tab_url: Option<String>, now: DateTime<Utc>) -> CommandResponse {
        let url = tab_url.or_else(|| self.last_active_url.clone());
        let Some(url) = url else {
            return self.fail("no active tab to track");
        };
        let Some(site) = self.matcher.detect(&url) else {
            return self.fail("not on a tracked site");
        };
        let settings = match self.database.get_settings() {
            Ok(settings) => settings,
            Err(e) => return self.fail(format!("settings unavailable: {e}")),
        };
        if !settings.site_enabled(&site.key) {
            return self.fail(format!("tracking disabled for {}", site.name));
        }
        self.tracker.start(site, now);
        self.commit_ok()
    }

    fn cmd_resume(&mut self, now: DateTime<Utc>) -> CommandResponse {
        if self.tracker.resume(now) {
            self.commit_ok()
        } else {
            // Nothing paused to resume; fall back to starting from the
            // last-known active tab.
            self.cmd_start(None, now)
        }
    }

    fn cmd_update_settings(&mut self, settings: &Settings) -> CommandResponse {
        if let Err(e) = settings.validate() {
            return self.fail(e.to_string());
        }
        match self.database.save_settings(settings) {
            Ok(()) => CommandResponse::ok(self.tracker.state().clone()),
            Err(e) => self.fail(format!("failed to persist settings: {e}")),
        }
    }

    fn handle_event(&mut self, event: BrowserEvent, now: DateTime<Utc>) {
        log::debug!("Handling event: {event:?}");
        match event {
            BrowserEvent::TabActivated { url } | BrowserEvent::TabUpdated { url } => {
                self.last_active_url = Some(url.clone());
                self.on_active_url(&url, now);
            }
            BrowserEvent::FocusChanged { focused } => self.on_focus_changed(focused, now),
        }
    }

    /// The active tab changed or finished navigating.
    fn on_active_url(&mut self, url: &str, now: DateTime<Utc>) {
        let Some(site) = self.matcher.detect(url) else {
            self.pause_if_running();
            return;
        };

        let settings = match self.database.get_settings() {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("Settings unavailable, ignoring tab event: {e}");
                return;
            }
        };
        if !settings.site_enabled(&site.key) {
            log::debug!("Site disabled in settings: {}", site.name);
            self.pause_if_running();
            return;
        }

        let state = self.tracker.state();
        if state.is_running {
            let changed = state
                .current_site
                .as_ref()
                .is_some_and(|current| current.key != site.key);
            if changed {
                self.tracker.switch(site);
                self.commit();
            }
        } else if state.is_idle() {
            log::info!("Auto-starting tracking for {}", site.name);
            self.tracker.start(site, now);
            self.commit();
        }
        // Paused: a tab change alone never resumes. Resume happens on the
        // focus-regain path or an explicit command. Product behavior to
        // confirm for same-site tab switches (see DESIGN.md).
    }

    fn on_focus_changed(&mut self, focused: bool, now: DateTime<Utc>) {
        if !focused {
            log::debug!("Window lost focus");
            self.pause_if_running();
            return;
        }

        // Focus regained: resume only when the active tab still shows the
        // site we paused on and it remains enabled.
        let state = self.tracker.state();
        if !state.is_paused {
            return;
        }
        let Some(paused_key) = state.current_site.as_ref().map(|s| s.key.clone()) else {
            return;
        };
        let matched = self
            .last_active_url
            .as_deref()
            .and_then(|url| self.matcher.detect(url));
        if !matched.is_some_and(|site| site.key == paused_key) {
            return;
        }
        let enabled = self
            .database
            .get_settings()
            .map(|settings| settings.site_enabled(&paused_key));
        match enabled {
            Ok(true) => {
                log::info!("Window regained focus, resuming");
                self.tracker.resume(now);
                self.commit();
            }
            Ok(false) => {}
            Err(e) => log::error!("Settings unavailable, not resuming: {e}"),
        }
    }

    /// Periodic accrual tick. Crossing the limit activates the alarm
    /// exactly once; the recurring reminder is serviced here as well.
    fn on_tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        let settings = self.database.get_settings()?;

        // A settings update may have disabled the site we are on.
        let disabled = self
            .tracker
            .state()
            .current_site
            .as_ref()
            .is_some_and(|site| !settings.site_enabled(&site.key));
        if disabled {
            self.pause_if_running();
        }

        let outcome = self.tracker.tick(now, settings.limit_seconds());

        if outcome.limit_crossed {
            self.tracker.activate_alarm();
            self.alarm.activate(&settings, now);
        }
        if outcome.accrued_seconds > 0 {
            self.persist_and_publish()?;
        }

        self.alarm.tick(&settings, now);
        Ok(())
    }

    fn pause_if_running(&mut self) {
        if self.tracker.pause() {
            self.commit();
        }
    }

    fn fail(&self, error: impl Into<String>) -> CommandResponse {
        CommandResponse::fail(error, self.tracker.state().clone())
    }

    /// Persist after a command transition, folding a store failure into
    /// the response.
    fn commit_ok(&mut self) -> CommandResponse {
        match self.persist_and_publish() {
            Ok(()) => CommandResponse::ok(self.tracker.state().clone()),
            Err(e) => self.fail(format!("failed to persist state: {e}")),
        }
    }

    /// Persist after an event transition. The event source gets no reply,
    /// so a store failure is logged and the loop keeps serving.
    fn commit(&mut self) {
        if let Err(e) = self.persist_and_publish() {
            log::error!("Failed to persist state: {e}");
        }
    }

    fn persist_and_publish(&mut self) -> Result<()> {
        self.database.save_state(self.tracker.state())?;
        // Best-effort push; errors just mean nobody is listening.
        let _ = self.updates.send(self.tracker.state().clone());
        Ok(())
    }
}
