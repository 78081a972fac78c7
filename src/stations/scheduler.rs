//! Index fetch scheduler
//!
//! Two paths feed index fetches into the store:
//! - the viewport path walks the current candidate set in paced batches and
//!   is restarted whenever the set of interesting stations changes;
//! - the bootstrap path seeds the first few directory stations on a slower
//!   tick right after the directory loads.
//!
//! Both dispatch through [`Store::try_begin_index_fetch`], so a station is
//! never fetched twice while it is loading or resolved. Cancelling a run only
//! stops future batches; fetches already spawned complete and are merged.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::AirQualityApi;
use crate::config::SchedulerConfig;
use crate::models::{IndexPayload, Station};
use crate::store::{Action, Store};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub bootstrap_count: usize,
    pub bootstrap_tick_size: usize,
    pub bootstrap_tick: Duration,
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            batch_size: (config.batch_size as usize).max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            bootstrap_count: config.bootstrap_count as usize,
            bootstrap_tick_size: (config.bootstrap_tick_size as usize).max(1),
            bootstrap_tick: Duration::from_millis(config.bootstrap_tick_ms.max(1)),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

/// Gate-then-spawn for a single station's index.
#[derive(Clone)]
struct IndexFetcher {
    api: Arc<dyn AirQualityApi>,
    store: Store,
}

impl IndexFetcher {
    /// Returns whether a fetch was actually started.
    fn dispatch(&self, id: &str) -> bool {
        if !self.store.try_begin_index_fetch(id) {
            return false;
        }

        let api = Arc::clone(&self.api);
        let store = self.store.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            match api.fetch_index(&id).await {
                Ok(raw) => store.dispatch(Action::IndexFulfilled {
                    id,
                    payload: IndexPayload(raw),
                }),
                Err(e) => {
                    warn!("Index fetch for station {} failed: {}", id, e);
                    store.dispatch(Action::IndexRejected {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        });
        true
    }
}

pub struct IndexScheduler {
    fetcher: IndexFetcher,
    settings: SchedulerSettings,
    active_run: Mutex<Option<CancellationToken>>,
    interest: Mutex<Vec<String>>,
    shutdown: CancellationToken,
}

impl IndexScheduler {
    pub fn new(api: Arc<dyn AirQualityApi>, store: Store, settings: SchedulerSettings) -> Self {
        Self {
            fetcher: IndexFetcher { api, store },
            settings,
            active_run: Mutex::new(None),
            interest: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Candidate set: ids of interest whose index is still idle.
    #[must_use]
    pub fn needing_ids<S: AsRef<str>>(&self, interest: &[S]) -> Vec<String> {
        self.fetcher
            .store
            .ids_needing_index(interest.iter().map(AsRef::as_ref))
    }

    /// Replace the set of stations of interest.
    ///
    /// Always cancels the previous batch run. A new run is spawned only when
    /// some station still needs data; its handle resolves to the number of
    /// fetches it dispatched.
    pub fn update_interest<S: AsRef<str>>(&self, interest: &[S]) -> Option<JoinHandle<usize>> {
        let interest: Vec<String> = interest.iter().map(|id| id.as_ref().to_string()).collect();
        let needing = self.needing_ids(&interest);
        *self.interest.lock().unwrap_or_else(PoisonError::into_inner) = interest;
        self.restart_run(needing)
    }

    /// Cancel the active batch run and start a new one over `needing`.
    fn restart_run(&self, needing: Vec<String>) -> Option<JoinHandle<usize>> {
        let mut active = self.active_run.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.cancel();
        }

        if needing.is_empty() {
            return None;
        }

        let token = self.shutdown.child_token();
        *active = Some(token.clone());
        drop(active);

        debug!("Scheduling index fetches for {} stations", needing.len());
        Some(tokio::spawn(run_batches(
            self.fetcher.clone(),
            needing,
            self.settings.batch_size,
            self.settings.batch_delay,
            token,
        )))
    }

    /// Put a failed station back in the candidate set and re-run the current
    /// interest. The station is fetched even when it is outside the current
    /// interest, e.g. a bootstrap station off screen.
    pub fn retry(&self, id: &str) -> Option<JoinHandle<usize>> {
        self.fetcher
            .store
            .dispatch(Action::IndexReset { id: id.to_string() });

        let mut candidates = self
            .interest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if !candidates.iter().any(|c| c == id) {
            candidates.push(id.to_string());
        }
        let needing = self.needing_ids(&candidates);
        self.restart_run(needing)
    }

    /// Seed the first `bootstrap_count` stations, `bootstrap_tick_size` per
    /// tick, independent of the viewport.
    pub fn start_bootstrap(&self, stations: &[Station]) -> JoinHandle<usize> {
        let ids: Vec<String> = stations
            .iter()
            .take(self.settings.bootstrap_count)
            .map(|s| s.id.clone())
            .collect();
        let fetcher = self.fetcher.clone();
        let tick = self.settings.bootstrap_tick;
        let tick_size = self.settings.bootstrap_tick_size;
        let token = self.shutdown.child_token();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            let mut dispatched = 0;

            for chunk in ids.chunks(tick_size) {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                dispatched += chunk.iter().filter(|id| fetcher.dispatch(id)).count();
            }

            info!("Bootstrap dispatched {} index fetches", dispatched);
            dispatched
        })
    }

    /// Stop all batch and bootstrap runs. In-flight fetches still complete.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for IndexScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_batches(
    fetcher: IndexFetcher,
    ids: Vec<String>,
    batch_size: usize,
    delay: Duration,
    token: CancellationToken,
) -> usize {
    // Let the caller finish its own state updates first.
    tokio::task::yield_now().await;

    let mut dispatched = 0;
    let mut chunks = ids.chunks(batch_size).peekable();

    while let Some(chunk) = chunks.next() {
        if token.is_cancelled() {
            debug!("Batch run cancelled after {} dispatches", dispatched);
            break;
        }

        let wave = chunk.iter().filter(|id| fetcher.dispatch(id)).count();
        debug!("Dispatched wave of {} index fetches", wave);
        dispatched += wave;

        if chunks.peek().is_some() {
            tokio::select! {
                () = token.cancelled() => break,
                () = sleep(delay) => {}
            }
        }
    }

    dispatched
}
