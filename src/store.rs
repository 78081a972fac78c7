//! Application state container
//!
//! Three typed slices (`stations`, `indices`, `details`) mutated only through
//! [`AppState::reduce`]. [`Store`] is the shared handle the loaders and the
//! presentation layer hold; its `try_begin_*` gates perform "check status,
//! mark loading" under one lock so two scheduling paths can never both
//! dispatch the same fetch.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::models::{IndexPayload, Station, StationDetailsData, StationDirectorySnapshot};

/// Lifecycle of one asynchronous load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl FetchStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FetchStatus::Idle => "idle",
            FetchStatus::Loading => "loading",
            FetchStatus::Succeeded => "succeeded",
            FetchStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StationsSlice {
    pub list: Arc<Vec<Station>>,
    pub by_id: HashMap<String, Station>,
    pub status: FetchStatus,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Index state of one station
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexEntry {
    pub status: FetchStatus,
    /// Last successfully fetched payload; `None` if never fetched or the
    /// upstream answered `null`
    pub value: Option<IndexPayload>,
    pub error: Option<String>,
}

/// Detail panel state of one station
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailsEntry {
    pub status: FetchStatus,
    pub data: Option<StationDetailsData>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Action {
    StationsPending,
    StationsFulfilled(StationDirectorySnapshot),
    StationsRejected(String),
    IndexPending { id: String },
    IndexFulfilled { id: String, payload: IndexPayload },
    IndexRejected { id: String, error: String },
    /// Failed back to idle, so the station becomes a candidate again
    IndexReset { id: String },
    DetailsPending { id: String },
    DetailsFulfilled { id: String, data: StationDetailsData },
    DetailsRejected { id: String, error: String },
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub stations: StationsSlice,
    pub indices: HashMap<String, IndexEntry>,
    pub details: HashMap<String, DetailsEntry>,
}

impl AppState {
    /// Apply one transition. Results are keyed by station id, so fulfilments
    /// arriving in any order merge to the same state.
    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::StationsPending => {
                self.stations.status = FetchStatus::Loading;
                self.stations.error = None;
            }
            Action::StationsFulfilled(snapshot) => {
                self.stations.by_id = snapshot
                    .stations
                    .iter()
                    .map(|s| (s.id.clone(), s.clone()))
                    .collect();
                self.stations.list = Arc::new(snapshot.stations);
                self.stations.fetched_at = Some(snapshot.fetched_at);
                self.stations.status = FetchStatus::Succeeded;
            }
            Action::StationsRejected(error) => {
                self.stations.status = FetchStatus::Failed;
                self.stations.error = Some(error);
            }
            Action::IndexPending { id } => {
                let entry = self.indices.entry(id).or_default();
                entry.status = FetchStatus::Loading;
                entry.error = None;
            }
            Action::IndexFulfilled { id, payload } => {
                let entry = self.indices.entry(id).or_default();
                entry.status = FetchStatus::Succeeded;
                entry.value = (!payload.raw().is_null()).then_some(payload);
            }
            Action::IndexRejected { id, error } => {
                let entry = self.indices.entry(id).or_default();
                entry.status = FetchStatus::Failed;
                entry.error = Some(error);
            }
            Action::IndexReset { id } => {
                if let Some(entry) = self.indices.get_mut(&id)
                    && entry.status == FetchStatus::Failed
                {
                    entry.status = FetchStatus::Idle;
                }
            }
            Action::DetailsPending { id } => {
                let entry = self.details.entry(id).or_default();
                entry.status = FetchStatus::Loading;
                entry.error = None;
            }
            Action::DetailsFulfilled { id, data } => {
                let entry = self.details.entry(id).or_default();
                entry.status = FetchStatus::Succeeded;
                entry.data = Some(data);
            }
            Action::DetailsRejected { id, error } => {
                let entry = self.details.entry(id).or_default();
                entry.status = FetchStatus::Failed;
                entry.error = Some(error);
            }
        }
    }

    #[must_use]
    pub fn index_status(&self, id: &str) -> FetchStatus {
        self.indices.get(id).map(|e| e.status).unwrap_or_default()
    }

    #[must_use]
    pub fn details_status(&self, id: &str) -> FetchStatus {
        self.details.get(id).map(|e| e.status).unwrap_or_default()
    }
}

/// Shared handle to the application state
#[derive(Clone)]
pub struct Store {
    state: Arc<Mutex<AppState>>,
    stations_tx: Arc<watch::Sender<Arc<Vec<Station>>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        let (stations_tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            state: Arc::new(Mutex::new(AppState::default())),
            stations_tx: Arc::new(stations_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(&self, action: Action) {
        let publishes = matches!(action, Action::StationsFulfilled(_));
        let list = {
            let mut state = self.lock();
            state.reduce(action);
            publishes.then(|| Arc::clone(&state.stations.list))
        };
        if let Some(list) = list {
            self.stations_tx.send_replace(list);
        }
    }

    /// Receiver that sees every new station list reference.
    #[must_use]
    pub fn subscribe_stations(&self) -> watch::Receiver<Arc<Vec<Station>>> {
        self.stations_tx.subscribe()
    }

    /// Marks the directory loading if nothing has loaded it yet.
    pub fn try_begin_stations_load(&self) -> bool {
        let mut state = self.lock();
        if state.stations.status != FetchStatus::Idle {
            return false;
        }
        state.reduce(Action::StationsPending);
        true
    }

    /// Marks `id` loading if its index was never requested (or was reset).
    pub fn try_begin_index_fetch(&self, id: &str) -> bool {
        let mut state = self.lock();
        if state.index_status(id) != FetchStatus::Idle {
            return false;
        }
        state.reduce(Action::IndexPending { id: id.to_string() });
        true
    }

    /// Marks `id`'s details loading from `idle` or `failed`.
    pub fn try_begin_details_fetch(&self, id: &str) -> bool {
        let mut state = self.lock();
        if !matches!(
            state.details_status(id),
            FetchStatus::Idle | FetchStatus::Failed
        ) {
            return false;
        }
        state.reduce(Action::DetailsPending { id: id.to_string() });
        true
    }

    /// Ids from `interest` whose index is still `idle`, deduplicated, in
    /// input order. Loading, succeeded and failed ids never appear.
    #[must_use]
    pub fn ids_needing_index<'a, I>(&self, interest: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let state = self.lock();
        let mut seen = HashSet::new();
        interest
            .into_iter()
            .filter(|id| state.index_status(id) == FetchStatus::Idle)
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect()
    }

    // Selectors

    #[must_use]
    pub fn stations(&self) -> Arc<Vec<Station>> {
        Arc::clone(&self.lock().stations.list)
    }

    #[must_use]
    pub fn station(&self, id: &str) -> Option<Station> {
        self.lock().stations.by_id.get(id).cloned()
    }

    #[must_use]
    pub fn stations_status(&self) -> (FetchStatus, Option<String>) {
        let state = self.lock();
        (state.stations.status, state.stations.error.clone())
    }

    #[must_use]
    pub fn stations_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.lock().stations.fetched_at
    }

    #[must_use]
    pub fn indices_by_id(&self) -> HashMap<String, IndexPayload> {
        self.lock()
            .indices
            .iter()
            .filter_map(|(id, entry)| entry.value.clone().map(|v| (id.clone(), v)))
            .collect()
    }

    #[must_use]
    pub fn index_status_by_id(&self) -> HashMap<String, FetchStatus> {
        self.lock()
            .indices
            .iter()
            .map(|(id, entry)| (id.clone(), entry.status))
            .collect()
    }

    #[must_use]
    pub fn index_entry(&self, id: &str) -> IndexEntry {
        self.lock().indices.get(id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn usable_index(&self, id: &str) -> Option<u8> {
        self.lock()
            .indices
            .get(id)
            .and_then(|entry| entry.value.as_ref())
            .and_then(IndexPayload::usable_index_value)
    }

    #[must_use]
    pub fn details(&self, id: &str) -> Option<StationDetailsData> {
        self.lock().details.get(id).and_then(|e| e.data.clone())
    }

    #[must_use]
    pub fn details_entry(&self, id: &str) -> DetailsEntry {
        self.lock().details.get(id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn details_status(&self, id: &str) -> FetchStatus {
        self.lock().details_status(id)
    }
}
