mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use siren_core::config::get_data_dir;

#[derive(Parser)]
#[command(name = "siren")]
#[command(about = "Distraction time tracker with an escalating alarm", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize siren (first-time setup)
    Init,
    /// Start the tracking daemon
    Start,
    /// (Internal) Run the daemon process
    #[command(hide = true)]
    DaemonInternalStart,
    /// Stop the tracking daemon
    Stop,
    /// Show tracking status and progress against the daily limit
    Status,
    /// Begin tracking a tab URL (defaults to the last active tab)
    Track {
        /// URL of the tab to track
        url: Option<String>,
    },
    /// Pause tracking without resetting elapsed time
    Pause,
    /// Resume paused tracking
    Resume,
    /// Reset elapsed time, site and any active alarm
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Silence an active alarm (tracking continues)
    StopAlarm,
    /// Follow state updates live
    Watch,
    /// Settings management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current settings
    Show,
    /// Set the daily limit in minutes
    SetLimit { minutes: u32 },
    /// Set the alarm reminder interval in seconds
    SetInterval { seconds: u32 },
    /// Enable or disable the spoken announcement
    SetSpeech { enabled: bool },
    /// Enable or disable tracking for one site
    SetSite { key: String, enabled: bool },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The detached daemon process sets up its own file logging.
    if matches!(cli.command, Commands::DaemonInternalStart) {
        return commands::daemon::run_daemon_process().await;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let data_dir = get_data_dir()?;

    match cli.command {
        Commands::Init => commands::init::init_command(&data_dir),
        Commands::Start => commands::daemon::start_daemon(&data_dir),
        Commands::DaemonInternalStart => unreachable!("handled above"),
        Commands::Stop => commands::daemon::stop_daemon(&data_dir).await,
        Commands::Status => commands::status::show_status(&data_dir).await,
        Commands::Track { url } => commands::track::start(&data_dir, url).await,
        Commands::Pause => commands::track::pause(&data_dir).await,
        Commands::Resume => commands::track::resume(&data_dir).await,
        Commands::Reset { yes } => commands::track::reset(&data_dir, yes).await,
        Commands::StopAlarm => commands::track::stop_alarm(&data_dir).await,
        Commands::Watch => commands::watch::watch(&data_dir).await,
        Commands::Config { action } => commands::config::run(&data_dir, action).await,
    }
}
