//! Station directory loader
//!
//! Fresh cache first, then the network, then any cached copy however old.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::Result;
use crate::api::AirQualityApi;
use crate::cache::{LoadOptions, SnapshotCache};
use crate::clock::Clock;
use crate::models::{Station, StationDirectorySnapshot, normalize_station_list};

pub struct StationDirectory {
    api: Arc<dyn AirQualityApi>,
    cache: SnapshotCache,
    clock: Arc<dyn Clock>,
    cache_key: String,
    page_size: u32,
}

impl StationDirectory {
    pub fn new(
        api: Arc<dyn AirQualityApi>,
        cache: SnapshotCache,
        clock: Arc<dyn Clock>,
        cache_key: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            cache,
            clock,
            cache_key: cache_key.into(),
            page_size,
        }
    }

    /// Load the full station list.
    ///
    /// Only fails when the network fails and no cached copy exists at all.
    #[instrument(name = "load_stations", skip(self))]
    pub async fn load_stations(&self) -> Result<StationDirectorySnapshot> {
        if let Some(stations) = self
            .cache
            .load::<Vec<Station>>(&self.cache_key, LoadOptions::fresh_only())
            .await
        {
            info!("Using {} cached stations", stations.len());
            return Ok(self.snapshot(stations));
        }

        match self.fetch_and_store().await {
            Ok(stations) => Ok(self.snapshot(stations)),
            Err(e) => {
                let stale = self
                    .cache
                    .load::<Vec<Station>>(&self.cache_key, LoadOptions::allow_expired())
                    .await;
                match stale {
                    Some(stations) => {
                        warn!(
                            "Station fetch failed ({e}); serving {} stale cached stations",
                            stations.len()
                        );
                        Ok(self.snapshot(stations))
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn fetch_and_store(&self) -> Result<Vec<Station>> {
        let response = self.api.fetch_station_list(0, self.page_size).await?;
        let stations = normalize_station_list(&response);
        info!("Fetched {} stations", stations.len());

        if let Err(e) = self.cache.save(&self.cache_key, &stations).await {
            warn!("Failed to cache station list: {e:#}");
        }
        Ok(stations)
    }

    fn snapshot(&self, stations: Vec<Station>) -> StationDirectorySnapshot {
        StationDirectorySnapshot {
            stations,
            fetched_at: self.clock.now(),
        }
    }
}
