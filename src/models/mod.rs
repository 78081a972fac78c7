//! Data models for `SmogMap`
//!
//! This module contains the core domain models organized by concern:
//! - Station: directory records and their normaliser
//! - Bbox: the map viewport
//! - Index: air quality index payloads and marker colours
//! - Measurement: per-pollutant measurement series

pub mod bbox;
pub mod index;
pub mod measurement;
pub mod station;

// Re-export all public types for convenient access
pub use bbox::BoundingBox;
pub use index::{IndexPayload, dominant_index_value, marker_color};
pub use measurement::{Measurement, Pollutant, StationDetailsData, extract_measurements};
pub use station::{Station, StationDirectorySnapshot, normalize_station_list, raw_to_station};
