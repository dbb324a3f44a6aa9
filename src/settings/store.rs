//! Atomically swappable holder of the live SMTP snapshot

use super::read_snapshot;
use crate::domain::ConfigSnapshot;
use crate::error::ConfigError;
use crate::host::ConfigSource;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of [`ConfigStore::replace`]
#[derive(Debug, Clone)]
pub enum ReplaceOutcome {
    /// The candidate equals the installed snapshot; nothing was swapped.
    Unchanged,
    /// The candidate is now current.
    Replaced {
        snapshot: Arc<ConfigSnapshot>,
        generation: u64,
    },
}

impl ReplaceOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}

/// Holds exactly one live [`ConfigSnapshot`].
///
/// Reads are a lock-free `Arc` load. Writers are serialized by a mutex held
/// around the compare, the swap and the install hook; readers never take it.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<ConfigSnapshot>,
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl ConfigStore {
    pub fn new(initial: ConfigSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
            generation: AtomicU64::new(1),
        }
    }

    /// The installed snapshot
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Number of snapshots installed so far, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Install `next` unless it equals the current snapshot
    pub fn replace(&self, next: ConfigSnapshot) -> ReplaceOutcome {
        self.replace_then(next, |_| ())
    }

    /// Like [`replace`](Self::replace), running `on_install` with the new
    /// snapshot before the writer lock is released.
    ///
    /// Anything bound to the snapshot inside `on_install` is ordered with the
    /// swaps themselves, so the last hook to run belongs to the snapshot that
    /// ends up current.
    pub fn replace_then<F>(&self, next: ConfigSnapshot, on_install: F) -> ReplaceOutcome
    where
        F: FnOnce(&Arc<ConfigSnapshot>),
    {
        let _writer = self.writer.lock();
        if **self.current.load() == next {
            return ReplaceOutcome::Unchanged;
        }

        let snapshot = Arc::new(next);
        self.current.store(Arc::clone(&snapshot));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        on_install(&snapshot);

        ReplaceOutcome::Replaced {
            snapshot,
            generation,
        }
    }

    /// Re-read every SMTP value from `source` and replace the snapshot.
    ///
    /// An invalid configuration leaves the current snapshot installed.
    pub fn reload(&self, source: &dyn ConfigSource) -> Result<ReplaceOutcome, ConfigError> {
        self.reload_then(source, |_| ())
    }

    /// [`reload`](Self::reload) with an install hook, see [`replace_then`](Self::replace_then)
    pub fn reload_then<F>(
        &self,
        source: &dyn ConfigSource,
        on_install: F,
    ) -> Result<ReplaceOutcome, ConfigError>
    where
        F: FnOnce(&Arc<ConfigSnapshot>),
    {
        let next = read_snapshot(source)?;
        Ok(self.replace_then(next, on_install))
    }
}
