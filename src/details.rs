//! Station detail loader
//!
//! Sensor list first, then one measurement series per tracked pollutant,
//! fetched concurrently and trimmed to the recent window.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::Result;
use crate::api::AirQualityApi;
use crate::clock::Clock;
use crate::models::{Pollutant, StationDetailsData, extract_measurements};

const SENSOR_LIST_KEY: &str = "Lista stanowisk pomiarowych dla podanej stacji";
const SENSOR_CODE_KEYS: &[&str] = &["Wskaźnik - kod", "Wskaźnik - wzór"];
const SENSOR_ID_KEYS: &[&str] = &["Identyfikator stanowiska", "id"];

/// The sensor chosen to supply one pollutant's series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRef {
    pub pollutant: Pollutant,
    pub sensor_id: String,
}

fn sensor_records(response: &Value) -> &[Value] {
    if let Some(list) = response.get(SENSOR_LIST_KEY).and_then(Value::as_array) {
        return list.as_slice();
    }
    match response {
        Value::Array(list) => list.as_slice(),
        Value::Object(fields) => fields
            .values()
            .find_map(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
        _ => &[],
    }
}

fn sensor_param_code(sensor: &Value) -> Option<&str> {
    SENSOR_CODE_KEYS
        .iter()
        .find_map(|key| sensor.get(*key).and_then(Value::as_str))
        .or_else(|| sensor.pointer("/param/paramCode").and_then(Value::as_str))
}

fn sensor_id(sensor: &Value) -> Option<String> {
    SENSOR_ID_KEYS
        .iter()
        .filter_map(|key| sensor.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
}

/// Pick the first sensor per tracked pollutant, in sensor-list order.
/// A matching sensor without an id is treated as absent.
pub fn select_sensors(response: &Value) -> Vec<SensorRef> {
    let records = sensor_records(response);

    Pollutant::ALL
        .iter()
        .filter_map(|pollutant| {
            let sensor = records.iter().find(|sensor| {
                sensor_param_code(sensor).and_then(Pollutant::from_param_code) == Some(*pollutant)
            })?;
            Some(SensorRef {
                pollutant: *pollutant,
                sensor_id: sensor_id(sensor)?,
            })
        })
        .collect()
}

pub struct StationDetailsLoader {
    api: Arc<dyn AirQualityApi>,
    clock: Arc<dyn Clock>,
    window: chrono::Duration,
}

impl StationDetailsLoader {
    pub fn new(api: Arc<dyn AirQualityApi>, clock: Arc<dyn Clock>, window_hours: u32) -> Self {
        Self {
            api,
            clock,
            window: chrono::Duration::hours(i64::from(window_hours)),
        }
    }

    /// Fetch the recent measurement series of every tracked pollutant.
    ///
    /// Pollutants without a sensor get an empty series. The sensor-data
    /// requests are awaited together: if any of them fails, the whole load
    /// fails.
    #[instrument(skip(self))]
    pub async fn load_details(&self, station_id: &str) -> Result<StationDetailsData> {
        let sensors = self.api.fetch_sensors(station_id).await?;
        let selected = select_sensors(&sensors);
        debug!(
            "Station {} has {} tracked sensors",
            station_id,
            selected.len()
        );

        let responses = try_join_all(selected.iter().map(|sensor| async move {
            let raw = self.api.fetch_sensor_data(&sensor.sensor_id).await?;
            Ok::<_, crate::SmogMapError>((sensor.pollutant, raw))
        }))
        .await?;

        let now = self.clock.now();
        let mut data = StationDetailsData::default();
        for (pollutant, raw) in responses {
            *data.series_mut(pollutant) = extract_measurements(&raw, now, self.window);
        }
        Ok(data)
    }
}
