use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Guard to decrement active connections counter when dropped
/// Also notifies when the last connection closes (for graceful shutdown)
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
    connections_active: Option<opentelemetry::metrics::UpDownCounter<i64>>,
}

impl ConnectionGuard {
    pub fn new(
        counter: Arc<AtomicUsize>,
        notifier: watch::Sender<()>,
        connections_active: Option<opentelemetry::metrics::UpDownCounter<i64>>,
    ) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        if let Some(ref c) = connections_active {
            c.add(1, &[]);
        }
        Self { counter, notifier, connections_active }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.counter.fetch_sub(1, Ordering::Relaxed);
        if let Some(ref counter) = self.connections_active {
            counter.add(-1, &[]);
        }
        // Notify when the last connection closes
        if remaining == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Marks a forwarded request as in flight.
///
/// Dropped without [`InFlightGuard::complete`] means the caller went away
/// and hyper cancelled the handler future, which is logged at debug.
pub struct InFlightGuard<'a> {
    client: &'a str,
    path: &'a str,
    done: bool,
}

impl<'a> InFlightGuard<'a> {
    pub fn new(client: &'a str, path: &'a str) -> Self {
        Self { client, path, done: false }
    }

    pub fn complete(mut self) {
        self.done = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            debug!(client = self.client, path = self.path, "Client canceled request");
        }
    }
}
