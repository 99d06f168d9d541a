pub mod db;
pub mod error;
pub mod models;
pub mod registry;

pub use db::Database;
pub use error::StoreError;
pub use models::{Settings, SettingsError, SiteMatch, TrackingState};
pub use registry::{SiteRegistry, TrackedSite};
