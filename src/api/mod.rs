//! Air quality data source
//!
//! [`AirQualityApi`] is the `fetchJson` seam: every call returns the raw JSON
//! body of one GET endpoint, or a transport error. Shape interpretation
//! lives in `models`.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

pub mod gios;

pub use gios::GiosClient;

#[async_trait]
pub trait AirQualityApi: Send + Sync {
    /// One page of the station directory.
    async fn fetch_station_list(&self, page: u32, size: u32) -> Result<Value>;

    /// Current air quality index of a station.
    async fn fetch_index(&self, station_id: &str) -> Result<Value>;

    /// Sensors (measurement positions) installed at a station.
    async fn fetch_sensors(&self, station_id: &str) -> Result<Value>;

    /// Recent measurement series of one sensor.
    async fn fetch_sensor_data(&self, sensor_id: &str) -> Result<Value>;
}
