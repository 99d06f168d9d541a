use anyhow::Result;
use chrono::{DateTime, Utc};
use siren_store::Settings;
use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc::{self, Sender};
use std::thread;

/// The bundled siren asset, looked up under the data directory.
pub const ALARM_SOUND: &str = "siren.mp3";
/// What the alarm says, and how fast.
pub const ALARM_PHRASE: &str = "LOSER";
pub const ALARM_SPEECH_RATE: f32 = 2.0;

/// Looped audio playback surface.
pub trait AudioSink: Send {
    /// Start (or restart) looping the named sound asset.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset cannot be loaded or playback cannot
    /// start. Callers log and swallow.
    fn play_loop(&mut self, sound: &str) -> Result<()>;

    /// Stop playback.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback backend rejects the stop.
    fn stop(&mut self) -> Result<()>;
}

/// Text-to-speech surface.
pub trait SpeechSink: Send {
    /// Speak a literal phrase at a relative rate (1.0 = normal).
    ///
    /// # Errors
    ///
    /// Returns an error if speech cannot be issued. Callers log and
    /// swallow.
    fn speak(&mut self, phrase: &str, rate: f32) -> Result<()>;
}

/// Drives the audio+speech escalation once the tracker crosses the limit.
///
/// Activation and deactivation are idempotent. While active, the audio
/// loop and the spoken announcement are re-triggered every
/// `alarm_interval_seconds`. Sink failures are logged and swallowed; they
/// never block a state transition and are never retried (the recurring
/// reminder is a scheduled re-trigger, not an error retry).
pub struct AlarmController {
    audio: Box<dyn AudioSink>,
    speech: Box<dyn SpeechSink>,
    active: bool,
    last_announce: Option<DateTime<Utc>>,
}

impl AlarmController {
    #[must_use]
    pub fn new(audio: Box<dyn AudioSink>, speech: Box<dyn SpeechSink>) -> Self {
        Self {
            audio,
            speech,
            active: false,
            last_announce: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start the escalation: looped siren plus one immediate announcement
    /// when speech is enabled. No-op if already active.
    pub fn activate(&mut self, settings: &Settings, now: DateTime<Utc>) {
        if self.active {
            return;
        }
        log::info!("Alarm activated");
        self.active = true;
        self.last_announce = Some(now);
        self.trigger(settings);
    }

    /// Re-trigger the audio loop and announcement once per configured
    /// interval while active.
    pub fn tick(&mut self, settings: &Settings, now: DateTime<Utc>) {
        if !self.active {
            return;
        }
        let due = self.last_announce.is_none_or(|last| {
            now.signed_duration_since(last).num_seconds()
                >= i64::from(settings.alarm_interval_seconds)
        });
        if due {
            log::debug!("Alarm reminder due, re-triggering");
            self.last_announce = Some(now);
            self.trigger(settings);
        }
    }

    /// Stop audio and disarm the reminder. No-op if not active.
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        log::info!("Alarm deactivated");
        self.active = false;
        self.last_announce = None;
        if let Err(e) = self.audio.stop() {
            log::warn!("Failed to stop alarm audio: {e}");
        }
    }

    fn trigger(&mut self, settings: &Settings) {
        if let Err(e) = self.audio.play_loop(ALARM_SOUND) {
            log::warn!("Alarm playback failed: {e}");
        }
        if settings.enable_speech {
            if let Err(e) = self.speech.speak(ALARM_PHRASE, ALARM_SPEECH_RATE) {
                log::warn!("Alarm speech failed: {e}");
            }
        }
    }
}

enum AudioCommand {
    PlayLoop(PathBuf),
    Stop,
}

/// Rodio-backed [`AudioSink`]. A dedicated thread owns the non-Send
/// output stream and sink; this handle talks to it over an mpsc channel.
/// The thread is spawned lazily on first playback.
pub struct RodioSink {
    assets_dir: PathBuf,
    tx: Option<Sender<AudioCommand>>,
}

impl RodioSink {
    #[must_use]
    pub fn new(assets_dir: PathBuf) -> Self {
        Self {
            assets_dir,
            tx: None,
        }
    }

    fn ensure_thread(&mut self) -> Result<Sender<AudioCommand>> {
        if let Some(tx) = &self.tx {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        // The thread owns the non-Send output stream and sink.
        thread::Builder::new()
            .name("siren-audio".to_string())
            .spawn(move || {
                use rodio::{Decoder, OutputStream, Sink, Source};

                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::PlayLoop(path) => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            _stream = None;

                            let opened = std::fs::File::open(&path)
                                .map_err(|e| e.to_string())
                                .and_then(|f| {
                                    Decoder::new(std::io::BufReader::new(f))
                                        .map_err(|e| e.to_string())
                                });
                            let source = match opened {
                                Ok(source) => source,
                                Err(e) => {
                                    log::warn!("Cannot decode {}: {e}", path.display());
                                    continue;
                                }
                            };

                            match OutputStream::try_default() {
                                Ok((stream, handle)) => match Sink::try_new(&handle) {
                                    Ok(new_sink) => {
                                        new_sink.append(source.repeat_infinite());
                                        _stream = Some(stream);
                                        sink = Some(new_sink);
                                    }
                                    Err(e) => log::warn!("Cannot create audio sink: {e}"),
                                },
                                Err(e) => log::warn!("Cannot open audio output: {e}"),
                            }
                        }
                        AudioCommand::Stop => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            _stream = None;
                        }
                    }
                }
            })?;

        self.tx = Some(tx.clone());
        Ok(tx)
    }
}

impl AudioSink for RodioSink {
    fn play_loop(&mut self, sound: &str) -> Result<()> {
        let path = self.assets_dir.join(sound);
        if !path.exists() {
            anyhow::bail!("alarm sound not found at {}", path.display());
        }
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::PlayLoop(path))
            .map_err(|e| anyhow::anyhow!("audio thread gone: {e}"))
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(tx) = &self.tx {
            let _ = tx.send(AudioCommand::Stop);
        }
        Ok(())
    }
}

/// [`SpeechSink`] that shells out to the platform TTS command. The spawned
/// process is not awaited; speech is fire-and-continue.
pub struct CommandSpeech;

impl SpeechSink for CommandSpeech {
    fn speak(&mut self, phrase: &str, rate: f32) -> Result<()> {
        // Both `say -r` and `espeak -s` take words per minute; 175 wpm is
        // the usual default for rate 1.0.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wpm = (rate.max(0.1) * 175.0) as u32;

        #[cfg(target_os = "macos")]
        let mut command = {
            let mut c = Command::new("say");
            c.arg("-r").arg(wpm.to_string()).arg(phrase);
            c
        };

        #[cfg(not(target_os = "macos"))]
        let mut command = {
            let mut c = Command::new("espeak");
            c.arg("-s").arg(wpm.to_string()).arg(phrase);
            c
        };

        command.spawn()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Recorder {
        plays: Arc<Mutex<Vec<String>>>,
        stops: Arc<Mutex<u32>>,
        phrases: Arc<Mutex<Vec<String>>>,
        fail_playback: bool,
    }

    impl AudioSink for Recorder {
        fn play_loop(&mut self, sound: &str) -> Result<()> {
            if self.fail_playback {
                anyhow::bail!("no audio device");
            }
            self.plays.lock().unwrap().push(sound.to_string());
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            *self.stops.lock().unwrap() += 1;
            Ok(())
        }
    }

    impl SpeechSink for Recorder {
        fn speak(&mut self, phrase: &str, _rate: f32) -> Result<()> {
            self.phrases.lock().unwrap().push(phrase.to_string());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn controller(recorder: &Recorder) -> AlarmController {
        AlarmController::new(Box::new(recorder.clone()), Box::new(recorder.clone()))
    }

    #[test]
    fn activate_plays_loop_and_speaks_once() {
        let recorder = Recorder::default();
        let mut alarm = controller(&recorder);
        let settings = Settings::default_settings();

        alarm.activate(&settings, t0());
        assert!(alarm.is_active());
        assert_eq!(*recorder.plays.lock().unwrap(), vec![ALARM_SOUND]);
        assert_eq!(*recorder.phrases.lock().unwrap(), vec![ALARM_PHRASE]);

        // Second activation is a no-op.
        alarm.activate(&settings, t0() + Duration::seconds(1));
        assert_eq!(recorder.plays.lock().unwrap().len(), 1);
        assert_eq!(recorder.phrases.lock().unwrap().len(), 1);
    }

    #[test]
    fn speech_respects_the_toggle() {
        let recorder = Recorder::default();
        let mut alarm = controller(&recorder);
        let mut settings = Settings::default_settings();
        settings.enable_speech = false;

        alarm.activate(&settings, t0());
        assert_eq!(recorder.plays.lock().unwrap().len(), 1);
        assert!(recorder.phrases.lock().unwrap().is_empty());
    }

    #[test]
    fn reminder_re_triggers_on_the_interval() {
        let recorder = Recorder::default();
        let mut alarm = controller(&recorder);
        let mut settings = Settings::default_settings();
        settings.alarm_interval_seconds = 30;

        alarm.activate(&settings, t0());
        alarm.tick(&settings, t0() + Duration::seconds(10));
        assert_eq!(recorder.phrases.lock().unwrap().len(), 1, "not due yet");

        alarm.tick(&settings, t0() + Duration::seconds(30));
        assert_eq!(recorder.phrases.lock().unwrap().len(), 2);
        assert_eq!(recorder.plays.lock().unwrap().len(), 2);

        // Interval counts from the last announcement.
        alarm.tick(&settings, t0() + Duration::seconds(45));
        assert_eq!(recorder.phrases.lock().unwrap().len(), 2);
        alarm.tick(&settings, t0() + Duration::seconds(60));
        assert_eq!(recorder.phrases.lock().unwrap().len(), 3);
    }

    #[test]
    fn deactivate_stops_audio_and_is_idempotent() {
        let recorder = Recorder::default();
        let mut alarm = controller(&recorder);
        let settings = Settings::default_settings();

        alarm.activate(&settings, t0());
        alarm.deactivate();
        assert!(!alarm.is_active());
        assert_eq!(*recorder.stops.lock().unwrap(), 1);

        alarm.deactivate();
        assert_eq!(*recorder.stops.lock().unwrap(), 1);

        // Ticks after deactivation announce nothing.
        alarm.tick(&settings, t0() + Duration::seconds(120));
        assert_eq!(recorder.phrases.lock().unwrap().len(), 1);
    }

    #[test]
    fn playback_failure_is_swallowed_and_state_unaffected() {
        let recorder = Recorder {
            fail_playback: true,
            ..Recorder::default()
        };
        let mut alarm = controller(&recorder);
        let settings = Settings::default_settings();

        alarm.activate(&settings, t0());
        assert!(alarm.is_active(), "alarm stays active despite audio failure");
        assert_eq!(*recorder.phrases.lock().unwrap(), vec![ALARM_PHRASE]);
    }
}
