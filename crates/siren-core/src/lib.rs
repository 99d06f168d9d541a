pub mod alarm;
pub mod config;
pub mod daemon;
pub mod ipc;
pub mod sites;
pub mod tracker;

pub use alarm::{AlarmController, AudioSink, CommandSpeech, RodioSink, SpeechSink};
pub use daemon::Daemon;
pub use sites::SiteMatcher;
pub use tracker::{TickOutcome, Tracker};
