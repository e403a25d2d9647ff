use ahash::AHashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{lock, RequestTracker, TokenBucket};
use crate::config::EvictionConfig;
use crate::telemetry::Metrics;

/// Shortest period the eviction sweep runs at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Parameters shared by every client entry the registry creates.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Gate refill rate in tokens per second
    pub refill_rate: f64,
    /// Gate capacity (burst size)
    pub capacity: u32,
    /// Idle time after which an entry is reclaimed by the sweep
    pub staleness_threshold: Duration,
}

impl RegistryConfig {
    /// Gate refilled at `limit` tokens per second with a capacity of one and
    /// the default staleness threshold.
    pub fn for_limit(limit: u32) -> Self {
        Self {
            refill_rate: f64::from(limit),
            capacity: 1,
            staleness_threshold: EvictionConfig::default().staleness_threshold,
        }
    }

    pub fn with_staleness_threshold(mut self, threshold: Duration) -> Self {
        self.staleness_threshold = threshold;
        self
    }
}

/// Per-client state: a tracker and a gate, created and evicted together.
#[derive(Debug)]
pub struct ClientEntry {
    tracker: RequestTracker,
    gate: TokenBucket,
}

impl ClientEntry {
    fn new(config: &RegistryConfig, now: Instant) -> Self {
        Self {
            tracker: RequestTracker::starting_at(now),
            gate: TokenBucket::full_at(config.refill_rate, config.capacity, now),
        }
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn gate(&self) -> &TokenBucket {
        &self.gate
    }
}

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of per-client rate limiting state keyed by client identity.
///
/// Entries are created lazily on first sight and reclaimed by a periodic
/// sweep once their tracker has been idle longer than the staleness
/// threshold. Memory is therefore bounded by the number of distinct clients
/// active within that threshold.
pub struct ClientRegistry {
    clients: RwLock<AHashMap<String, Arc<ClientEntry>>>,
    config: RegistryConfig,
    sweeper: Mutex<Option<Sweeper>>,
}

impl ClientRegistry {
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(AHashMap::new()),
            config,
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Return the entry for `identity`, creating it if absent.
    ///
    /// Concurrent first requests from the same identity all receive the same
    /// entry; exactly one is inserted.
    pub fn get_or_create(&self, identity: &str) -> Arc<ClientEntry> {
        self.get_or_create_at(identity, Instant::now())
    }

    pub fn get_or_create_at(&self, identity: &str, now: Instant) -> Arc<ClientEntry> {
        {
            let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = clients.get(identity) {
                return Arc::clone(entry);
            }
        }

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            clients
                .entry(identity.to_string())
                .or_insert_with(|| Arc::new(ClientEntry::new(&self.config, now))),
        )
    }

    /// Remove every entry idle longer than the staleness threshold at `now`.
    /// Returns the number of entries removed.
    ///
    /// Candidates are collected under the read lock and their trackers are
    /// inspected with no registry lock held. The write lock is then taken
    /// only to remove candidates that were not replaced in the meantime.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let snapshot: Vec<(String, Arc<ClientEntry>)> = {
            let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
            clients.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };

        let threshold = self.config.staleness_threshold;
        let stale: Vec<(String, Arc<ClientEntry>)> = snapshot
            .into_iter()
            .filter(|(_, entry)| entry.tracker.idle_for_at(now) > threshold)
            .collect();

        if stale.is_empty() {
            return 0;
        }

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        for (identity, entry) in stale {
            let still_same = clients
                .get(&identity)
                .is_some_and(|current| Arc::ptr_eq(current, &entry));
            // A request may have touched the entry since the snapshot
            if still_same && entry.tracker.idle_for_at(now) > threshold {
                clients.remove(&identity);
                removed += 1;
            }
        }
        removed
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Start the periodic eviction sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference, so dropping the last `Arc` to
    /// the registry also ends the sweep. Calling this twice replaces the
    /// previous sweeper. Intervals below [`MIN_SWEEP_INTERVAL`] are raised
    /// to it.
    pub fn start_eviction(self: &Arc<Self>, interval: Duration, metrics: Option<Arc<Metrics>>) {
        if interval < MIN_SWEEP_INTERVAL {
            warn!(?interval, min = ?MIN_SWEEP_INTERVAL, "Eviction interval too short, clamping");
        }
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let cancel = CancellationToken::new();
        let weak: Weak<Self> = Arc::downgrade(self);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(registry) = weak.upgrade() else { break };
                        let removed = registry.sweep();
                        let tracked = registry.len();
                        if let Some(ref m) = metrics {
                            m.record_clients_evicted(removed as u64);
                            m.set_tracked_clients(tracked as u64);
                        }
                        if removed > 0 {
                            debug!(removed, tracked, "Evicted stale clients");
                        }
                    }
                }
            }
            debug!("Eviction sweep stopped");
        });

        if let Some(previous) = lock(&self.sweeper).replace(Sweeper { cancel, handle }) {
            previous.cancel.cancel();
        }
        info!(
            interval_secs = interval.as_secs(),
            staleness_secs = self.config.staleness_threshold.as_secs(),
            "Client eviction sweep started"
        );
    }

    /// Halt the periodic sweep. Live entries are left in place.
    ///
    /// Returns the sweep task handle so callers can await its exit; `None`
    /// if no sweep was running.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let sweeper = lock(&self.sweeper).take()?;
        sweeper.cancel.cancel();
        Some(sweeper.handle)
    }

    pub fn is_sweeping(&self) -> bool {
        lock(&self.sweeper).is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(identity)
    }
}

impl Drop for ClientRegistry {
    fn drop(&mut self) {
        if let Some(sweeper) = lock(&self.sweeper).take() {
            sweeper.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
