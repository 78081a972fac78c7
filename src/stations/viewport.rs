//! Viewport tracking
//!
//! Raw map-move events pass through a throttle, an equality short-circuit
//! and a debounce before they become the current bounding box:
//!
//! ```text
//! notify ─► throttle(200ms) ─► dedupe(ε) ─► debounce(500ms) ─► watch<Option<BoundingBox>>
//! ```
//!
//! Each stage is a task between two unbounded channels. Dropping the
//! [`ViewportTracker`] closes the first channel and the whole chain winds
//! down; values still pending in a stage are discarded.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::debug;

use crate::config::ViewportConfig;
use crate::models::{BoundingBox, Station};

/// Rate-limit `input` to one value per `period`.
///
/// A value arriving outside the window is forwarded at once. Values arriving
/// inside it are held back, each replacing the previous one, and the latest
/// is forwarded when the window closes.
pub fn throttle<T: Send + 'static>(
    mut input: mpsc::UnboundedReceiver<T>,
    period: Duration,
) -> mpsc::UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut last_emit: Option<Instant> = None;
        let mut pending: Option<T> = None;

        loop {
            let window_end = last_emit.map_or_else(Instant::now, |t| t + period);

            tokio::select! {
                maybe = input.recv() => {
                    let Some(value) = maybe else { return };
                    let now = Instant::now();
                    if last_emit.is_none_or(|t| now >= t + period) {
                        last_emit = Some(now);
                        pending = None;
                        if tx.send(value).is_err() {
                            return;
                        }
                    } else {
                        pending = Some(value);
                    }
                }
                () = sleep_until(window_end), if pending.is_some() => {
                    last_emit = Some(Instant::now());
                    if let Some(value) = pending.take()
                        && tx.send(value).is_err()
                    {
                        return;
                    }
                }
            }
        }
    });

    rx
}

/// Forward only the value observed after `quiet` of silence. Superseded
/// values are dropped, not queued.
pub fn debounce<T: Send + 'static>(
    mut input: mpsc::UnboundedReceiver<T>,
    quiet: Duration,
) -> mpsc::UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(mut latest) = input.recv().await {
            loop {
                tokio::select! {
                    maybe = input.recv() => match maybe {
                        Some(value) => latest = value,
                        None => return,
                    },
                    () = sleep(quiet) => {
                        if tx.send(latest).is_err() {
                            return;
                        }
                        break;
                    }
                }
            }
        }
    });

    rx
}

/// Drop boxes that match the previously forwarded one within `epsilon`.
pub fn dedupe_boxes(
    mut input: mpsc::UnboundedReceiver<BoundingBox>,
    epsilon: f64,
) -> mpsc::UnboundedReceiver<BoundingBox> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut previous: Option<BoundingBox> = None;
        while let Some(bbox) = input.recv().await {
            if previous.is_some_and(|p| p.approx_eq(&bbox, epsilon)) {
                continue;
            }
            previous = Some(bbox);
            if tx.send(bbox).is_err() {
                return;
            }
        }
    });

    rx
}

/// Stations inside `bbox`, in directory order. No box yet means nothing is
/// in view.
#[must_use]
pub fn stations_in_view(stations: &[Station], bbox: Option<&BoundingBox>) -> Vec<Station> {
    let Some(bbox) = bbox else {
        return Vec::new();
    };
    stations
        .iter()
        .filter(|s| s.is_within(bbox))
        .cloned()
        .collect()
}

pub struct ViewportTracker {
    events: mpsc::UnboundedSender<BoundingBox>,
    current: watch::Receiver<Option<BoundingBox>>,
}

impl ViewportTracker {
    /// Start the event chain. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(config: &ViewportConfig) -> Self {
        let epsilon = config.epsilon;
        let (events, raw) = mpsc::unbounded_channel();
        let (current_tx, current) = watch::channel::<Option<BoundingBox>>(None);

        let throttled = throttle(raw, Duration::from_millis(config.throttle_ms));
        let distinct = dedupe_boxes(throttled, epsilon);
        let mut settled = debounce(distinct, Duration::from_millis(config.debounce_ms));

        tokio::spawn(async move {
            while let Some(bbox) = settled.recv().await {
                let changed = current_tx.send_if_modified(|current| {
                    if current.is_some_and(|c| c.approx_eq(&bbox, epsilon)) {
                        return false;
                    }
                    *current = Some(bbox);
                    true
                });
                if changed {
                    debug!(?bbox, "Viewport settled");
                }
            }
        });

        Self { events, current }
    }

    /// Feed one raw viewport-change event.
    pub fn notify(&self, bbox: BoundingBox) {
        // Only fails once the chain has shut down.
        let _ = self.events.send(bbox);
    }

    #[must_use]
    pub fn current(&self) -> Option<BoundingBox> {
        *self.current.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<BoundingBox>> {
        self.current.clone()
    }
}
