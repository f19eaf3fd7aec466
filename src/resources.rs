// Accelerator memory lifecycle: scoped leases over a shared memory pool.
//
// Every stage that runs inference holds a ScopeLease for the duration of the
// call. Dropping the lease requests a release, so the pool is flushed on every
// exit path: normal return, early `?`, or unwinding.
//
// The pool is process-wide. When several pipeline invocations run at once, a
// flush requested by one of them must not reclaim blocks another is still
// using, so flushes are serialized and deferred until the last live lease is
// dropped. Under steady overlapping traffic the live count may not reach zero
// for a long time and the pool stays unflushed; `backlog` in the stats counts
// the waiting requests and a warning is logged once it reaches
// BACKLOG_WARN_THRESHOLD.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, error, info, warn};

/// Deferred release requests after which a warning is logged.
pub const BACKLOG_WARN_THRESHOLD: u64 = 32;

/// A device-side allocator whose cached blocks can be handed back.
pub trait MemoryPool: Send + Sync {
    /// Human-readable pool name for logs.
    fn name(&self) -> &str;

    /// Return all cached blocks to the allocator.
    fn free_all_blocks(&self) -> Result<()>;
}

/// Pool for CPU execution. ONNX Runtime's CPU arena is owned by each
/// session, so there is nothing process-wide to hand back.
#[derive(Debug, Default)]
pub struct HostMemoryPool;

impl MemoryPool for HostMemoryPool {
    fn name(&self) -> &str {
        "host"
    }

    fn free_all_blocks(&self) -> Result<()> {
        debug!("Host memory pool has no cached device blocks");
        Ok(())
    }
}

/// Counters exposed for status output and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeStats {
    /// Leases currently alive.
    pub active_leases: usize,
    /// Completed flushes of the pool.
    pub flushes: u64,
    /// Release requests that had to wait for other leases.
    pub deferred: u64,
    /// Flushes where the pool reported an error.
    pub failures: u64,
    /// Release requests waiting on live leases since the last flush.
    pub backlog: u64,
}

#[derive(Debug, Default)]
struct ScopeState {
    stats: ScopeStats,
    /// A release was requested while other leases were alive.
    pending: bool,
}

/// Shared handle to the accelerator memory pool. Clone freely; all clones
/// refer to the same pool and counters.
#[derive(Clone)]
pub struct ResourceScope {
    pool: Arc<dyn MemoryPool>,
    state: Arc<Mutex<ScopeState>>,
}

impl std::fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceScope")
            .field("pool", &self.pool.name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for ResourceScope {
    fn default() -> Self {
        Self::new(Arc::new(HostMemoryPool))
    }
}

impl ResourceScope {
    pub fn new(pool: Arc<dyn MemoryPool>) -> Self {
        Self {
            pool,
            state: Arc::new(Mutex::new(ScopeState::default())),
        }
    }

    /// Declare that the caller is about to use device memory. The returned
    /// lease releases the pool when dropped.
    pub fn acquire(&self, stage: &'static str) -> ScopeLease {
        let mut state = self.lock_state();
        state.stats.active_leases += 1;
        debug!(stage, active = state.stats.active_leases, "Acquired memory scope");
        drop(state);

        ScopeLease {
            scope: self.clone(),
            stage,
        }
    }

    /// Request that the pool be flushed. Idempotent, never panics, never
    /// returns an error. While leases are alive the flush is deferred until
    /// the last one drops.
    pub fn release(&self) {
        let mut state = self.lock_state();
        if state.stats.active_leases > 0 {
            Self::defer_locked(&mut state);
            return;
        }
        self.flush_locked(&mut state);
    }

    pub fn stats(&self) -> ScopeStats {
        self.lock_state().stats
    }

    fn end_lease(&self, stage: &'static str) {
        let mut state = self.lock_state();
        state.stats.active_leases = state.stats.active_leases.saturating_sub(1);

        if state.stats.active_leases > 0 {
            debug!(stage, "Lease ended while others are live");
            Self::defer_locked(&mut state);
            return;
        }

        self.flush_locked(&mut state);
    }

    fn defer_locked(state: &mut ScopeState) {
        if !state.pending {
            state.stats.deferred += 1;
        }
        state.pending = true;
        state.stats.backlog += 1;
        debug!(
            active = state.stats.active_leases,
            backlog = state.stats.backlog,
            "Memory release deferred until active leases finish"
        );
        if state.stats.backlog == BACKLOG_WARN_THRESHOLD {
            warn!(
                backlog = state.stats.backlog,
                active = state.stats.active_leases,
                "Memory pool not flushed: overlapping invocations keep leases alive"
            );
        }
    }

    /// Flush while holding the state lock, which serializes pool operations.
    fn flush_locked(&self, state: &mut ScopeState) {
        state.pending = false;
        state.stats.backlog = 0;
        match self.pool.free_all_blocks() {
            Ok(()) => {
                state.stats.flushes += 1;
                info!(pool = self.pool.name(), "Device memory released");
            }
            Err(e) => {
                state.stats.failures += 1;
                error!(pool = self.pool.name(), error = %e, "Failed to release device memory");
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ScopeState> {
        // A panic while holding the lock leaves plain counters behind, which
        // are still usable.
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Memory scope lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// RAII guard for one stage's use of device memory.
#[must_use = "dropping the lease immediately releases the pool"]
pub struct ScopeLease {
    scope: ResourceScope,
    stage: &'static str,
}

impl Drop for ScopeLease {
    fn drop(&mut self) {
        self.scope.end_lease(self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPool {
        flushes: AtomicUsize,
        fail: bool,
    }

    impl MemoryPool for CountingPool {
        fn name(&self) -> &str {
            "counting"
        }

        fn free_all_blocks(&self) -> Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("driver refused");
            }
            Ok(())
        }
    }

    #[test]
    fn test_lease_drop_flushes_pool() {
        let pool = Arc::new(CountingPool::default());
        let scope = ResourceScope::new(pool.clone());
        {
            let _lease = scope.acquire("test");
            assert_eq!(scope.stats().active_leases, 1);
        }
        assert_eq!(pool.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(scope.stats().active_leases, 0);
        assert_eq!(scope.stats().flushes, 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = Arc::new(CountingPool::default());
        let scope = ResourceScope::new(pool.clone());
        scope.release();
        scope.release();
        assert_eq!(pool.flushes.load(Ordering::SeqCst), 2);
        assert_eq!(scope.stats().failures, 0);
    }

    #[test]
    fn test_release_deferred_while_other_lease_alive() {
        let pool = Arc::new(CountingPool::default());
        let scope = ResourceScope::new(pool.clone());

        let outer = scope.acquire("invocation-a");
        let inner = scope.acquire("invocation-b");
        drop(inner);
        assert_eq!(pool.flushes.load(Ordering::SeqCst), 0, "a is still using memory");
        scope.release();
        assert_eq!(pool.flushes.load(Ordering::SeqCst), 0);
        assert_eq!(scope.stats().deferred, 1);

        drop(outer);
        assert_eq!(pool.flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_overlapping_leases_build_backlog_until_idle() {
        let pool = Arc::new(CountingPool::default());
        let scope = ResourceScope::new(pool.clone());

        // Staggered invocations: a new one always starts before the last ends.
        let mut live = scope.acquire("invocation-0");
        for _ in 0..BACKLOG_WARN_THRESHOLD + 4 {
            let next = scope.acquire("invocation-next");
            drop(std::mem::replace(&mut live, next));
        }

        let stats = scope.stats();
        assert_eq!(pool.flushes.load(Ordering::SeqCst), 0);
        assert_eq!(stats.active_leases, 1);
        assert_eq!(stats.backlog, BACKLOG_WARN_THRESHOLD + 4);
        assert_eq!(stats.deferred, 1);

        drop(live);
        let stats = scope.stats();
        assert_eq!(pool.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(stats.backlog, 0);
    }

    #[test]
    fn test_pool_failure_is_logged_not_raised() {
        let pool = Arc::new(CountingPool {
            fail: true,
            ..Default::default()
        });
        let scope = ResourceScope::new(pool.clone());
        scope.release();
        let stats = scope.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.flushes, 0);
    }

    #[test]
    fn test_lease_released_on_panic() {
        let pool = Arc::new(CountingPool::default());
        let scope = ResourceScope::new(pool.clone());
        let cloned = scope.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _lease = cloned.acquire("panicking");
            panic!("inference blew up");
        }));
        assert!(result.is_err());
        assert_eq!(pool.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(scope.stats().active_leases, 0);
    }
}
