#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use smogmap::{
    AirQualityApi, Clock, ManualClock, MemoryBackend, SmogMapError, SnapshotCache, Station,
};
use tokio::time::Instant;

pub type CallLog = Vec<(String, Instant)>;

/// Scripted in-memory API. Unknown stations and sensors answer 404; a
/// missing station list answers 503.
#[derive(Default)]
pub struct FakeApi {
    station_list: Mutex<Option<Value>>,
    indices: Mutex<HashMap<String, Value>>,
    failing_indices: Mutex<Vec<String>>,
    index_latency: Mutex<Duration>,
    sensors: Mutex<HashMap<String, Value>>,
    sensor_data: Mutex<HashMap<String, Value>>,
    calls: Mutex<HashMap<&'static str, CallLog>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stations(self, response: Value) -> Self {
        self.set_station_list(Some(response));
        self
    }

    pub fn with_index(self, station_id: &str, response: Value) -> Self {
        self.indices
            .lock()
            .unwrap()
            .insert(station_id.to_string(), response);
        self
    }

    pub fn failing_index(self, station_id: &str) -> Self {
        self.failing_indices
            .lock()
            .unwrap()
            .push(station_id.to_string());
        self
    }

    pub fn with_index_latency(self, latency: Duration) -> Self {
        *self.index_latency.lock().unwrap() = latency;
        self
    }

    pub fn with_sensors(self, station_id: &str, response: Value) -> Self {
        self.sensors
            .lock()
            .unwrap()
            .insert(station_id.to_string(), response);
        self
    }

    pub fn with_sensor_data(self, sensor_id: &str, response: Value) -> Self {
        self.sensor_data
            .lock()
            .unwrap()
            .insert(sensor_id.to_string(), response);
        self
    }

    pub fn set_station_list(&self, response: Option<Value>) {
        *self.station_list.lock().unwrap() = response;
    }

    fn record(&self, endpoint: &'static str, arg: &str) {
        self.calls
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push((arg.to_string(), Instant::now()));
    }

    pub fn calls(&self, endpoint: &'static str) -> CallLog {
        self.calls
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }

    pub fn index_calls(&self) -> Vec<String> {
        self.calls("index").into_iter().map(|(id, _)| id).collect()
    }

    pub fn station_list_calls(&self) -> usize {
        self.calls("stations").len()
    }
}

#[async_trait]
impl AirQualityApi for FakeApi {
    async fn fetch_station_list(&self, page: u32, _size: u32) -> smogmap::Result<Value> {
        self.record("stations", &page.to_string());
        self.station_list
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SmogMapError::transport(503, "Service Unavailable"))
    }

    async fn fetch_index(&self, station_id: &str) -> smogmap::Result<Value> {
        self.record("index", station_id);

        let latency = *self.index_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self
            .failing_indices
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == station_id)
        {
            return Err(SmogMapError::transport(404, "Not Found"));
        }

        Ok(self
            .indices
            .lock()
            .unwrap()
            .get(station_id)
            .cloned()
            .unwrap_or_else(|| json!({ "AqIndex": { "Wartość indeksu": 1 } })))
    }

    async fn fetch_sensors(&self, station_id: &str) -> smogmap::Result<Value> {
        self.record("sensors", station_id);
        self.sensors
            .lock()
            .unwrap()
            .get(station_id)
            .cloned()
            .ok_or_else(|| SmogMapError::transport(404, "Not Found"))
    }

    async fn fetch_sensor_data(&self, sensor_id: &str) -> smogmap::Result<Value> {
        self.record("sensor_data", sensor_id);
        self.sensor_data
            .lock()
            .unwrap()
            .get(sensor_id)
            .cloned()
            .ok_or_else(|| SmogMapError::transport(500, "Internal Server Error"))
    }
}

pub fn gios_station(id: u32, lat: f64, lon: f64) -> Value {
    json!({
        "Identyfikator stacji": id,
        "Kod stacji": format!("PL{id:04}"),
        "Nazwa stacji": format!("Station {id}"),
        "WGS84 φ N": lat.to_string(),
        "WGS84 λ E": lon.to_string(),
        "Nazwa miasta": "Kraków",
        "Ulica": null,
        "Województwo": "MAŁOPOLSKIE"
    })
}

pub fn station_list(stations: Vec<Value>) -> Value {
    json!({ "Lista stacji pomiarowych": stations })
}

pub fn station(id: &str, lat: f64, lon: f64) -> Station {
    Station {
        id: id.to_string(),
        name: format!("Station {id}"),
        lat,
        lon,
        city: None,
        address: None,
        voivodeship: None,
        code: None,
    }
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-11-05T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub fn memory_cache(clock: Arc<dyn Clock>) -> SnapshotCache {
    SnapshotCache::new(
        Arc::new(MemoryBackend::new()),
        clock,
        Duration::from_secs(60 * 60),
    )
}

/// Group call instants into waves of simultaneous dispatches.
pub fn waves(log: &CallLog) -> Vec<(Instant, usize)> {
    let mut waves: Vec<(Instant, usize)> = Vec::new();
    for (_, at) in log {
        match waves.last_mut() {
            Some((wave_at, count)) if wave_at == at => *count += 1,
            _ => waves.push((*at, 1)),
        }
    }
    waves
}
