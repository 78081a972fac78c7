//! GIOŚ (Chief Inspectorate of Environmental Protection) REST client

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::AirQualityApi;
use crate::config::ApiConfig;
use crate::{Result, SmogMapError};

pub struct GiosClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl GiosClient {
    /// Create a new client from the `[api]` config section
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.into());

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(&config.user_agent)
            .build()
            .with_context(|| "Failed to create HTTP client")?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        let start_time = Instant::now();

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("Request to {} failed: {}", url, e);
                SmogMapError::network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_text = status.canonical_reason().unwrap_or_default();
            warn!(
                "GIOŚ API answered {} {} for {}",
                status.as_u16(),
                status_text,
                path
            );
            return Err(SmogMapError::transport(status.as_u16(), status_text));
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_decode() {
                SmogMapError::data_shape(format!("{path}: body is not JSON: {e}"))
            } else {
                SmogMapError::network(e.to_string())
            }
        })?;

        debug!(
            "Fetched {} in {:.3}s",
            path,
            start_time.elapsed().as_secs_f64()
        );
        Ok(body)
    }
}

#[async_trait]
impl AirQualityApi for GiosClient {
    async fn fetch_station_list(&self, page: u32, size: u32) -> Result<Value> {
        self.get_json(&format!("station/findAll?page={page}&size={size}"))
            .await
    }

    async fn fetch_index(&self, station_id: &str) -> Result<Value> {
        self.get_json(&format!(
            "aqindex/getIndex/{}",
            urlencoding::encode(station_id)
        ))
        .await
    }

    async fn fetch_sensors(&self, station_id: &str) -> Result<Value> {
        self.get_json(&format!(
            "station/sensors/{}",
            urlencoding::encode(station_id)
        ))
        .await
    }

    async fn fetch_sensor_data(&self, sensor_id: &str) -> Result<Value> {
        self.get_json(&format!("data/getData/{}", urlencoding::encode(sensor_id)))
            .await
    }
}
