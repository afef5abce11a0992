//! Rewritten-module cache with watch-driven invalidation.
//!
//! Each file path maps to a slot that is either `Pending` (a load is in
//! flight and every concurrent request awaits the same shared future) or
//! `Cached` (the rewritten output). While a slot exists its file is armed
//! on the cache's single watcher. The first change event for a file removes
//! its slot and disarms the file; the next request reloads and re-arms.
//!
//! Slots carry a generation number. Invalidations name the generation they
//! were armed for, so a late event from an old watch never evicts a newer
//! entry.

use crate::error::{Error, LoadError};
use futures::future::{BoxFuture, FutureExt, Shared};
use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, trace, warn};

/// A rewritten module ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModule {
    /// Rewritten source.
    pub content: String,
    /// Quoted strong ETag of `content`.
    pub etag: String,
    /// Content-Type to serve with.
    pub content_type: &'static str,
    /// The file this module was loaded from.
    pub file_path: PathBuf,
}

/// Observable state of a cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Absent,
    Pending,
    Cached,
}

type LoadResult = Result<Arc<CachedModule>, LoadError>;
type LoadFuture = Shared<BoxFuture<'static, LoadResult>>;
type Slots = Mutex<HashMap<PathBuf, Slot>>;
type Armed = Mutex<HashMap<PathBuf, u64>>;

enum Slot {
    Pending { generation: u64, load: LoadFuture },
    Cached { generation: u64, module: Arc<CachedModule> },
}

impl Slot {
    fn generation(&self) -> u64 {
        match self {
            Self::Pending { generation, .. } | Self::Cached { generation, .. } => *generation,
        }
    }
}

/// Request to drop the slot for `key` if it still has `generation`.
#[derive(Debug)]
struct Invalidation {
    key: PathBuf,
    generation: u64,
}

/// Cache of rewritten modules keyed by file path.
pub struct ModuleCache {
    slots: Arc<Slots>,
    watches: Arc<WatchSet>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleCache {
    /// Create an empty cache, its watcher and its invalidation thread.
    ///
    /// The thread exits once the cache is dropped. If the platform watcher
    /// cannot be created, modules are still served but never cached.
    #[must_use]
    pub fn new() -> Self {
        let slots: Arc<Slots> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel();
        let watches = Arc::new(WatchSet::new(tx));

        let weak_slots = Arc::downgrade(&slots);
        let weak_watches = Arc::downgrade(&watches);
        std::thread::spawn(move || invalidation_loop(&weak_slots, &weak_watches, &rx));

        Self {
            slots,
            watches,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Return the cached module for `key`, loading it with `load` on a miss.
    ///
    /// Concurrent callers for the same key share a single load; `load` runs
    /// on the blocking pool at most once per miss. Failed loads are handed
    /// to every waiter but never cached.
    pub async fn get_or_load<F>(&self, key: &Path, load: F) -> Result<Arc<CachedModule>, LoadError>
    where
        F: FnOnce(&Path) -> Result<CachedModule, LoadError> + Send + 'static,
    {
        let pending = {
            let mut slots = lock(&self.slots);
            match slots.get(key) {
                Some(Slot::Cached { module, .. }) => {
                    trace!(path = %key.display(), "Module cache hit");
                    return Ok(Arc::clone(module));
                }
                Some(Slot::Pending { load, .. }) => {
                    trace!(path = %key.display(), "Joining in-flight load");
                    load.clone()
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let future = self.start_load(key.to_path_buf(), generation, load);
                    slots.insert(
                        key.to_path_buf(),
                        Slot::Pending {
                            generation,
                            load: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        pending.await
    }

    /// Drop the slot for `key` and stop watching its file. Returns whether
    /// a slot existed.
    pub fn invalidate(&self, key: &Path) -> bool {
        let removed = lock(&self.slots).remove(key);
        if removed.is_some() {
            self.watches.disarm(key, None);
        }
        removed.is_some()
    }

    /// State of the slot for `key`.
    #[must_use]
    pub fn state(&self, key: &Path) -> SlotState {
        match lock(&self.slots).get(key) {
            None => SlotState::Absent,
            Some(Slot::Pending { .. }) => SlotState::Pending,
            Some(Slot::Cached { .. }) => SlotState::Cached,
        }
    }

    /// Number of slots (pending and cached).
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the shared load future for a fresh `Pending` slot.
    ///
    /// The file is armed before it is read, so an edit that lands during
    /// the read still invalidates this generation.
    fn start_load<F>(&self, key: PathBuf, generation: u64, load: F) -> LoadFuture
    where
        F: FnOnce(&Path) -> Result<CachedModule, LoadError> + Send + 'static,
    {
        let slots = Arc::downgrade(&self.slots);
        let watches = Arc::downgrade(&self.watches);

        async move {
            let armed = match watches.upgrade().map(|w| w.arm(&key, generation)) {
                Some(Ok(())) => true,
                Some(Err(e)) => {
                    warn!(path = %key.display(), error = %e, "Cannot watch module; it will not be cached");
                    false
                }
                None => false,
            };

            let path = key.clone();
            let result = match tokio::task::spawn_blocking(move || load(&path)).await {
                Ok(result) => result.map(Arc::new),
                Err(e) => Err(LoadError::Read {
                    path: key.clone(),
                    message: e.to_string(),
                }),
            };

            let cached = settle(&slots, &key, generation, &result, armed);
            if armed && !cached {
                if let Some(watches) = watches.upgrade() {
                    watches.disarm(&key, Some(generation));
                }
            }
            result
        }
        .boxed()
        .shared()
    }
}

/// Move a finished load out of `Pending`. Returns whether it was cached.
///
/// Success on an armed file becomes `Cached`; anything else clears the
/// slot. If the slot was invalidated or replaced meanwhile, it is left
/// alone and the result is only handed to the waiters.
fn settle(
    slots: &Weak<Slots>,
    key: &Path,
    generation: u64,
    result: &LoadResult,
    armed: bool,
) -> bool {
    let Some(slots) = slots.upgrade() else {
        return false;
    };

    let mut guard = lock(&slots);
    let current = matches!(
        guard.get(key),
        Some(Slot::Pending { generation: g, .. }) if *g == generation
    );
    if !current {
        debug!(path = %key.display(), generation, "Module changed while loading; not caching");
        return false;
    }

    let (replaced, cached) = match result {
        Ok(module) if armed => {
            debug!(path = %key.display(), generation, etag = %module.etag, "Cached module");
            let slot = Slot::Cached {
                generation,
                module: Arc::clone(module),
            };
            (guard.insert(key.to_path_buf(), slot), true)
        }
        _ => (guard.remove(key), false),
    };
    drop(guard);
    drop(replaced);
    cached
}

fn invalidation_loop(
    slots: &Weak<Slots>,
    watches: &Weak<WatchSet>,
    rx: &mpsc::Receiver<Invalidation>,
) {
    while let Ok(Invalidation { key, generation }) = rx.recv() {
        let (Some(slots), Some(watches)) = (slots.upgrade(), watches.upgrade()) else {
            break;
        };
        if remove_generation(&slots, &key, generation).is_some() {
            debug!(path = %key.display(), generation, "Invalidated module after change");
        }
        watches.disarm(&key, Some(generation));
    }
}

/// Remove the slot for `key` only if it still belongs to `generation`.
fn remove_generation(slots: &Slots, key: &Path, generation: u64) -> Option<Slot> {
    let mut guard = lock(slots);
    if guard.get(key).map(Slot::generation) == Some(generation) {
        guard.remove(key)
    } else {
        None
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One platform watcher shared by every slot, with one-shot arming per file.
///
/// `armed` maps each watched file to the generation it was armed for. The
/// event handler only touches `armed`; `watcher` is locked around every
/// `watch`/`unwatch` call and never while `armed` is held, since those calls
/// wait on the thread that runs the handler.
struct WatchSet {
    watcher: Mutex<Option<RecommendedWatcher>>,
    armed: Arc<Armed>,
}

impl WatchSet {
    fn new(invalidations: mpsc::Sender<Invalidation>) -> Self {
        let armed: Arc<Armed> = Arc::new(Mutex::new(HashMap::new()));
        let handler_armed = Arc::clone(&armed);

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let paths = match res {
                    Ok(event) if is_change(&event.kind) => event.paths,
                    Ok(_) => return,
                    Err(e) => {
                        warn!(error = %e, "Watch error; invalidating affected modules");
                        e.paths
                    }
                };
                for invalidation in fire(&handler_armed, &paths) {
                    let _ = invalidations.send(invalidation);
                }
            },
            Config::default(),
        );

        let watcher = match watcher {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "Cannot start file watcher; modules will not be cached");
                None
            }
        };

        Self {
            watcher: Mutex::new(watcher),
            armed,
        }
    }

    /// Start watching `key` for `generation`.
    fn arm(&self, key: &Path, generation: u64) -> Result<(), Error> {
        let mut watcher = lock(&self.watcher);
        let Some(watcher) = watcher.as_mut() else {
            return Err(Error::Watch("file watcher unavailable".to_string()));
        };

        lock(&self.armed).insert(key.to_path_buf(), generation);
        if let Err(e) = watcher.watch(key, RecursiveMode::NonRecursive) {
            let mut armed = lock(&self.armed);
            if armed.get(key) == Some(&generation) {
                armed.remove(key);
            }
            return Err(e.into());
        }
        trace!(path = %key.display(), generation, "Armed watch");
        Ok(())
    }

    /// Stop watching `key`.
    ///
    /// With `Some(generation)`, a file re-armed for a different generation
    /// is left alone.
    fn disarm(&self, key: &Path, generation: Option<u64>) {
        let mut watcher = lock(&self.watcher);
        {
            let mut armed = lock(&self.armed);
            match (armed.get(key).copied(), generation) {
                (Some(current), Some(wanted)) if current != wanted => return,
                (Some(_), _) => {
                    armed.remove(key);
                }
                (None, _) => {}
            }
        }
        if let Some(watcher) = watcher.as_mut() {
            // Fails when the kernel already dropped the watch, e.g. after a delete.
            if let Err(e) = watcher.unwatch(key) {
                trace!(path = %key.display(), error = %e, "Unwatch failed");
            }
        }
    }

    #[cfg(test)]
    fn watched(&self) -> usize {
        lock(&self.armed).len()
    }
}

/// Take every armed path in `paths` out of `armed`, yielding one
/// invalidation per file. Later events for the same file find nothing.
fn fire(armed: &Armed, paths: &[PathBuf]) -> Vec<Invalidation> {
    let mut armed = lock(armed);
    paths
        .iter()
        .filter_map(|path| {
            armed.remove(path).map(|generation| Invalidation {
                key: path.clone(),
                generation,
            })
        })
        .collect()
}

/// Whether an event means the file may have changed.
///
/// Opens, reads and read-only closes do not count; the cache's own read
/// would otherwise invalidate the entry it is filling.
fn is_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}
