pub mod config;
pub mod daemon;
pub mod helpers;
pub mod init;
pub mod status;
pub mod track;
pub mod watch;
