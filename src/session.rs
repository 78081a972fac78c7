//! One viewer session
//!
//! Wires the directory loader, viewport tracker, index scheduler and detail
//! loader around a shared [`Store`]. The presentation layer reads from the
//! store and writes viewport changes and station selections here.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::api::AirQualityApi;
use crate::cache::SnapshotCache;
use crate::clock::Clock;
use crate::config::SmogMapConfig;
use crate::details::StationDetailsLoader;
use crate::models::{BoundingBox, Station};
use crate::stations::{
    IndexScheduler, SchedulerSettings, StationDirectory, ViewportTracker, stations_in_view,
};
use crate::store::{Action, Store};

/// Currently selected station and whether its details were already requested
/// during this selection.
#[derive(Debug, Default)]
struct Selection {
    station: Option<String>,
    requested: bool,
}

pub struct Session {
    store: Store,
    directory: StationDirectory,
    scheduler: Arc<IndexScheduler>,
    viewport: ViewportTracker,
    details: Arc<StationDetailsLoader>,
    selection: Mutex<Selection>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Build a session. Spawns the viewport pipeline, so this must run
    /// inside a tokio runtime.
    pub fn new(
        config: &SmogMapConfig,
        api: Arc<dyn AirQualityApi>,
        cache: SnapshotCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Store::new();
        let directory = StationDirectory::new(
            Arc::clone(&api),
            cache,
            Arc::clone(&clock),
            config.cache.key.clone(),
            config.api.station_page_size,
        );
        let scheduler = IndexScheduler::new(
            Arc::clone(&api),
            store.clone(),
            SchedulerSettings::from(&config.scheduler),
        );
        let details = StationDetailsLoader::new(api, clock, config.details.window_hours);

        Self {
            store,
            directory,
            scheduler: Arc::new(scheduler),
            viewport: ViewportTracker::spawn(&config.viewport),
            details: Arc::new(details),
            selection: Mutex::new(Selection::default()),
            sync_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Load the station directory (once per session) and start seeding
    /// index data for the first stations.
    ///
    /// Returns the directory error only when neither the network nor any
    /// cached copy could provide stations.
    pub async fn bootstrap(&self) -> Result<()> {
        if !self.store.try_begin_stations_load() {
            debug!("Station directory already requested");
            return Ok(());
        }

        match self.directory.load_stations().await {
            Ok(snapshot) => {
                self.store.dispatch(Action::StationsFulfilled(snapshot));
                let stations = self.store.stations();
                info!("Station directory ready with {} stations", stations.len());
                if !stations.is_empty() {
                    self.scheduler.start_bootstrap(&stations);
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to load station directory: {}", e);
                self.store.dispatch(Action::StationsRejected(e.to_string()));
                Err(e)
            }
        }
    }

    /// Feed a raw viewport change (any pan/zoom frame).
    pub fn viewport_changed(&self, bbox: BoundingBox) {
        self.viewport.notify(bbox);
    }

    #[must_use]
    pub fn viewport(&self) -> Option<BoundingBox> {
        self.viewport.current()
    }

    /// Keep the index scheduler fed: whenever the settled viewport or the
    /// station list changes, recompute the stations in view and hand them to
    /// the scheduler. Idempotent.
    pub fn spawn_viewport_sync(&self) {
        let mut task = self.sync_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let mut bbox_rx = self.viewport.subscribe();
        let mut stations_rx = self.store.subscribe_stations();
        let scheduler = Arc::clone(&self.scheduler);

        *task = Some(tokio::spawn(async move {
            loop {
                let bbox = *bbox_rx.borrow_and_update();
                let stations = stations_rx.borrow_and_update().clone();
                let in_view = stations_in_view(&stations, bbox.as_ref());
                debug!("{} stations in view", in_view.len());

                let ids: Vec<&str> = in_view.iter().map(|s| s.id.as_str()).collect();
                scheduler.update_interest(&ids);

                tokio::select! {
                    changed = bbox_rx.changed() => if changed.is_err() { break },
                    changed = stations_rx.changed() => if changed.is_err() { break },
                }
            }
        }));
    }

    /// Stations inside the current settled viewport.
    #[must_use]
    pub fn stations_in_view(&self) -> Vec<Station> {
        stations_in_view(&self.store.stations(), self.viewport.current().as_ref())
    }

    /// Change the selected station.
    ///
    /// Details are requested at most once while a station stays selected,
    /// and only from `idle` or `failed`. Selecting another station (or
    /// `None`) re-arms the guard.
    pub fn select_station(&self, station_id: Option<&str>) -> Option<JoinHandle<()>> {
        let mut selection = self.selection.lock().unwrap_or_else(PoisonError::into_inner);
        if selection.station.as_deref() != station_id {
            selection.station = station_id.map(str::to_string);
            selection.requested = false;
        }

        let id = station_id?;
        if selection.requested {
            return None;
        }
        selection.requested = true;
        drop(selection);

        if !self.store.try_begin_details_fetch(id) {
            return None;
        }

        let loader = Arc::clone(&self.details);
        let store = self.store.clone();
        let id = id.to_string();
        Some(tokio::spawn(async move {
            match loader.load_details(&id).await {
                Ok(data) => store.dispatch(Action::DetailsFulfilled { id, data }),
                Err(e) => {
                    warn!("Loading details of station {} failed: {}", id, e);
                    store.dispatch(Action::DetailsRejected {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }))
    }

    /// Manual retry of the selected station's details.
    pub fn retry_details(&self) -> Option<JoinHandle<()>> {
        let current = {
            let mut selection = self.selection.lock().unwrap_or_else(PoisonError::into_inner);
            selection.requested = false;
            selection.station.clone()
        };
        self.select_station(current.as_deref())
    }

    /// Manual retry of a failed station index.
    pub fn retry_index(&self, station_id: &str) -> Option<JoinHandle<usize>> {
        self.scheduler.retry(station_id)
    }

    /// Stop background work. Fetches already in flight still land in the
    /// store.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        if let Some(task) = self
            .sync_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
