//! Station loading: the directory, the viewport and index scheduling

pub mod directory;
pub mod scheduler;
pub mod viewport;

pub use directory::StationDirectory;
pub use scheduler::{IndexScheduler, SchedulerSettings};
pub use viewport::{ViewportTracker, stations_in_view};
