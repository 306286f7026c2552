// Keyed flush coalescing.
//
// The first request for a key schedules one flush after a fixed window
// (default 300ms, range 50–2000ms); further requests for the same key before
// the flush runs are absorbed by it.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::warn;

/// Default debounce window.
const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 50;
/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Create a config with the given window in milliseconds, clamped to [50, 2000].
    pub fn with_millis(ms: u64) -> Self {
        let clamped = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Self { window: Duration::from_millis(clamped) }
    }
}

/// Runs at most one pending flush per key.
#[derive(Debug, Clone)]
pub struct Coalescer {
    config: DebounceConfig,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl Coalescer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: Arc::new(Mutex::new(HashSet::new())) }
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// Schedule `flush` for `key` unless one is already pending. Returns
    /// whether a new flush was scheduled. Must be called inside a tokio runtime.
    pub fn schedule<F, Fut>(&self, key: &str, flush: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key, "no async runtime available; debounced flush dropped");
            return false;
        };

        if !self.pending.lock().unwrap_or_else(PoisonError::into_inner).insert(key.to_string()) {
            return false;
        }

        let pending = Arc::clone(&self.pending);
        let window = self.config.window;
        let key = key.to_string();
        runtime.spawn(async move {
            tokio::time::sleep(window).await;
            // Cleared before flushing so requests made during the flush
            // schedule a fresh one.
            pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&key);
            flush().await;
        });
        true
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).contains(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_flush(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    // ── DebounceConfig ─────────────────────────────────────────────

    #[test]
    fn default_config_is_300ms() {
        assert_eq!(DebounceConfig::default().window, Duration::from_millis(300));
    }

    #[test]
    fn config_clamps_below_minimum() {
        assert_eq!(DebounceConfig::with_millis(10).window, Duration::from_millis(50));
    }

    #[test]
    fn config_clamps_above_maximum() {
        assert_eq!(DebounceConfig::with_millis(60_000).window, Duration::from_millis(2000));
    }

    #[test]
    fn config_accepts_valid_range() {
        assert_eq!(DebounceConfig::with_millis(500).window, Duration::from_millis(500));
    }

    // ── Coalescing ─────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn bursts_for_one_key_flush_once() {
        let coalescer = Coalescer::new(DebounceConfig::default());
        let flushes = Arc::new(AtomicUsize::new(0));

        assert!(coalescer.schedule("list", counting_flush(&flushes)));
        assert!(!coalescer.schedule("list", counting_flush(&flushes)));
        assert!(!coalescer.schedule("list", counting_flush(&flushes)));
        assert!(coalescer.is_pending("list"));

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 0, "window has not elapsed");

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        assert!(!coalescer.is_pending("list"));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent_and_rearm_after_flush() {
        let coalescer = Coalescer::new(DebounceConfig::with_millis(100));
        let flushes = Arc::new(AtomicUsize::new(0));

        coalescer.schedule("Doc-a", counting_flush(&flushes));
        coalescer.schedule("Doc-b", counting_flush(&flushes));
        assert_eq!(coalescer.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(101)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 2);

        assert!(coalescer.schedule("Doc-a", counting_flush(&flushes)));
        tokio::time::sleep(Duration::from_millis(101)).await;
        assert_eq!(flushes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn scheduling_outside_a_runtime_is_refused() {
        let coalescer = Coalescer::new(DebounceConfig::default());
        let flushes = Arc::new(AtomicUsize::new(0));
        assert!(!coalescer.schedule("list", counting_flush(&flushes)));
        assert_eq!(coalescer.pending_count(), 0);
    }
}
