//! Event debouncing logic to handle rapid file changes

use crate::monitor::{RawEvent, RawEventKind};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

/// Configuration for the debouncer
#[derive(Debug, Clone)]
pub struct DebouncerConfig {
    /// Quiet period in milliseconds before an event is emitted
    pub delay_ms: u64,
    /// Maximum number of distinct keys to buffer
    pub max_buffer_size: usize,
}

impl Default for DebouncerConfig {
    fn default() -> Self {
        Self { delay_ms: 1000, max_buffer_size: 1000 }
    }
}

type DebounceKey = (RawEventKind, PathBuf);

/// Debouncer for raw filesystem events
///
/// Events are keyed by kind and path. A key is emitted once no further
/// event for it has arrived for the configured delay; the emitted event is
/// the latest one received.
pub struct Debouncer {
    config: DebouncerConfig,
    pending: Arc<DashMap<DebounceKey, PendingEvent>>,
}

struct PendingEvent {
    event: RawEvent,
    last_update: Instant,
    count: usize,
}

impl Debouncer {
    /// Create a new debouncer
    pub fn new(config: DebouncerConfig) -> Self {
        Self { config, pending: Arc::new(DashMap::new()) }
    }

    /// Start the debouncer task.
    ///
    /// Returns the input sender and the receiver of debounced events. The
    /// task exits once every input sender is dropped and the pending events
    /// have been flushed.
    pub fn start(self) -> (mpsc::UnboundedSender<RawEvent>, mpsc::UnboundedReceiver<RawEvent>) {
        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let pending = self.pending.clone();
        let config = self.config.clone();
        let tick = Duration::from_millis(config.delay_ms.clamp(1, 50));

        tokio::spawn(async move {
            let mut input_open = true;
            loop {
                tokio::select! {
                    received = input_rx.recv(), if input_open => match received {
                        Some(event) => handle_event(event, &pending, &config),
                        None => input_open = false,
                    },
                    _ = sleep(tick) => {
                        emit_ready_events(&pending, &output_tx, &config);
                        if !input_open && pending.is_empty() {
                            break;
                        }
                    }
                }
            }
            debug!("Debouncer stopped");
        });

        (input_tx, output_rx)
    }
}

/// Record an incoming event, restarting its key's quiet period
fn handle_event(event: RawEvent, pending: &DashMap<DebounceKey, PendingEvent>, config: &DebouncerConfig) {
    let key = (event.kind, event.path.clone());
    let now = Instant::now();

    if pending.len() >= config.max_buffer_size && !pending.contains_key(&key) {
        debug!("Debouncer buffer full, dropping oldest entries");
        let mut entries: Vec<(DebounceKey, Instant)> =
            pending.iter().map(|entry| (entry.key().clone(), entry.value().last_update)).collect();
        entries.sort_by_key(|(_, last_update)| *last_update);
        let to_remove = (config.max_buffer_size / 10).max(1);
        for (key, _) in entries.into_iter().take(to_remove) {
            pending.remove(&key);
        }
    }

    pending
        .entry(key)
        .and_modify(|e| {
            e.event = event.clone();
            e.last_update = now;
            e.count += 1;
            trace!("Updated pending event for {:?} (count: {})", e.event.path, e.count);
        })
        .or_insert_with(|| {
            trace!("New pending {:?} event for {:?}", event.kind, event.path);
            PendingEvent { event, last_update: now, count: 1 }
        });
}

/// Emit events that have been quiet for the configured delay
fn emit_ready_events(
    pending: &DashMap<DebounceKey, PendingEvent>,
    tx: &mpsc::UnboundedSender<RawEvent>,
    config: &DebouncerConfig,
) {
    let now = Instant::now();
    let delay = Duration::from_millis(config.delay_ms);

    let ready: Vec<DebounceKey> = pending
        .iter()
        .filter(|entry| now.duration_since(entry.value().last_update) >= delay)
        .map(|entry| entry.key().clone())
        .collect();

    for key in ready {
        if let Some((_, settled)) = pending.remove(&key) {
            debug!("Emitting debounced {:?} for {:?} (aggregated {} events)", key.0, key.1, settled.count);
            if let Err(e) = tx.send(settled.event) {
                debug!("Failed to send debounced event: {}", e);
            }
        }
    }
}
