//! `SmogMap` - viewport-driven air quality station loading
//!
//! This library provides the data-loading core of an air quality map:
//! the cached station directory, viewport tracking, paced index fetching
//! and station detail loading against the GIOŚ open data API.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod details;
pub mod error;
pub mod logging;
pub mod models;
pub mod session;
pub mod stations;
pub mod store;

// Re-export core types for public API
pub use api::{AirQualityApi, GiosClient};
pub use cache::{FjallBackend, LoadOptions, MemoryBackend, SnapshotBackend, SnapshotCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SmogMapConfig;
pub use details::StationDetailsLoader;
pub use error::SmogMapError;
pub use models::{BoundingBox, IndexPayload, Measurement, Pollutant, Station, StationDetailsData};
pub use session::Session;
pub use stations::{IndexScheduler, SchedulerSettings, StationDirectory, ViewportTracker};
pub use store::{Action, AppState, FetchStatus, Store};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, SmogMapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
