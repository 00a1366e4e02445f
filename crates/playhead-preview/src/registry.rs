//! Reference-counted registry of shared, expensively-constructed assets.
//!
//! Decode pipelines are costly to open, and several clips typically
//! reference the same source. The registry shares one entry per
//! `(kind, key)`: acquirers increment a reference count, concurrent
//! acquirers of an unconstructed entry await the same in-flight
//! construction, and the value is disposed exactly once when the last
//! holder releases it. Releasing during construction defers disposal
//! until construction finishes; a new acquire before that point revives
//! the entry.

use crate::error::{PreviewError, PreviewResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Closed set of asset kinds the registry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// A decode session over a video source.
    VideoDecode,
}

/// Registry key: asset kind plus source key (usually the URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub kind: AssetKind,
    pub key: String,
}

impl AssetKey {
    pub fn new(kind: AssetKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

/// Disposal hook, run at most once per constructed value.
pub type DisposeFn<T> = Box<dyn FnOnce(&T) + Send>;

#[derive(Debug, Clone)]
enum BuildStatus {
    Building,
    Ready,
    Failed(String),
    /// Construction finished but the last holder had already released.
    Abandoned,
}

struct AssetEntry<T> {
    ref_count: usize,
    value: Option<Arc<T>>,
    dispose: Option<DisposeFn<T>>,
    /// Present while construction is in flight; waiters clone this.
    building: Option<watch::Receiver<BuildStatus>>,
    /// Dispose as soon as the in-flight construction resolves.
    release_when_ready: bool,
}

impl<T> AssetEntry<T> {
    fn new() -> Self {
        Self {
            ref_count: 0,
            value: None,
            dispose: None,
            building: None,
            release_when_ready: false,
        }
    }
}

/// The caller's capability token for an acquired asset.
///
/// Releases its reference exactly once: either through an explicit
/// [`release`](AssetHandle::release) or on drop.
pub struct AssetHandle<T: Send + Sync + 'static> {
    asset: Arc<T>,
    registry: AssetRegistry<T>,
    key: AssetKey,
    released: bool,
}

impl<T: Send + Sync + 'static> AssetHandle<T> {
    /// The shared asset value.
    pub fn asset(&self) -> &Arc<T> {
        &self.asset
    }

    /// The key this handle was acquired under.
    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    /// Release the reference now instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release_key(&self.key);
        }
    }
}

impl<T: Send + Sync + 'static> Deref for AssetHandle<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.asset
    }
}

impl<T: Send + Sync + 'static> Drop for AssetHandle<T> {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Reference-counted store of shared assets, keyed by `(kind, key)`.
///
/// Clones share the same underlying store.
pub struct AssetRegistry<T> {
    entries: Arc<Mutex<HashMap<AssetKey, AssetEntry<T>>>>,
}

impl<T> Clone for AssetRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T: Send + Sync + 'static> Default for AssetRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

enum AcquireRole<T> {
    Ready(Arc<T>),
    Waiter(watch::Receiver<BuildStatus>),
    Owner(watch::Sender<BuildStatus>),
}

impl<T: Send + Sync + 'static> AssetRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquire the asset under `(kind, key)`, constructing it with
    /// `create` if no live entry exists.
    ///
    /// The reference count is incremented before construction is
    /// awaited, and any pending deferred disposal is cancelled (a new
    /// acquirer revives an entry scheduled for disposal). Concurrent
    /// acquirers of an unconstructed key all await the single in-flight
    /// construction; a failure propagates to every waiter and removes
    /// the entry so the next acquire retries from scratch.
    pub async fn acquire<F, Fut>(
        &self,
        kind: AssetKind,
        key: impl Into<String>,
        create: F,
        dispose: Option<DisposeFn<T>>,
    ) -> PreviewResult<AssetHandle<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PreviewResult<T>>,
    {
        let key = AssetKey::new(kind, key);

        let role = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(AssetEntry::new);
            entry.ref_count += 1;
            entry.release_when_ready = false;
            if let Some(value) = &entry.value {
                AcquireRole::Ready(Arc::clone(value))
            } else if let Some(rx) = &entry.building {
                AcquireRole::Waiter(rx.clone())
            } else {
                let (tx, rx) = watch::channel(BuildStatus::Building);
                entry.building = Some(rx);
                entry.dispose = dispose;
                AcquireRole::Owner(tx)
            }
        };

        match role {
            AcquireRole::Ready(value) => Ok(self.make_handle(value, key)),
            AcquireRole::Waiter(rx) => self.await_construction(rx, key).await,
            AcquireRole::Owner(tx) => self.construct(create, tx, key).await,
        }
    }

    /// Release one reference by key, exactly as [`AssetHandle`] does on
    /// drop. For callers that tear down before their `acquire` resolves
    /// and therefore never see a handle.
    pub fn release(&self, kind: AssetKind, key: &str) {
        self.release_key(&AssetKey::new(kind, key));
    }

    /// Number of outstanding references for a key. Zero for unknown keys.
    pub fn ref_count(&self, kind: AssetKind, key: &str) -> usize {
        let probe = AssetKey::new(kind, key);
        self.entries
            .lock()
            .get(&probe)
            .map_or(0, |entry| entry.ref_count)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    async fn await_construction(
        &self,
        mut rx: watch::Receiver<BuildStatus>,
        key: AssetKey,
    ) -> PreviewResult<AssetHandle<T>> {
        loop {
            let status = rx.borrow().clone();
            match status {
                BuildStatus::Building => {
                    if rx.changed().await.is_err() {
                        // Constructor vanished without a final status.
                        self.drop_reference(&key);
                        return Err(PreviewError::AssetConstruction(
                            "construction abandoned".to_string(),
                        ));
                    }
                }
                BuildStatus::Ready => break,
                BuildStatus::Failed(message) => {
                    self.drop_reference(&key);
                    return Err(PreviewError::AssetConstruction(message));
                }
                BuildStatus::Abandoned => {
                    self.drop_reference(&key);
                    return Err(PreviewError::ReleasedDuringConstruction);
                }
            }
        }

        let value = self
            .entries
            .lock()
            .get(&key)
            .and_then(|entry| entry.value.clone());
        match value {
            Some(value) => Ok(self.make_handle(value, key)),
            None => {
                // Our reference was held throughout, so a Ready entry
                // cannot have been disposed underneath us.
                self.drop_reference(&key);
                Err(PreviewError::ReleasedDuringConstruction)
            }
        }
    }

    async fn construct<F, Fut>(
        &self,
        create: F,
        tx: watch::Sender<BuildStatus>,
        key: AssetKey,
    ) -> PreviewResult<AssetHandle<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PreviewResult<T>>,
    {
        let built = create().await;

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&key) else {
            // Entries survive while construction is in flight.
            let _ = tx.send(BuildStatus::Failed("registry entry vanished".to_string()));
            return Err(PreviewError::AssetConstruction(
                "registry entry vanished".to_string(),
            ));
        };
        entry.building = None;

        match built {
            Ok(value) => {
                let value = Arc::new(value);
                if entry.ref_count == 0 && entry.release_when_ready {
                    // The last holder released mid-construction: finish,
                    // then dispose immediately, never mid-construction.
                    let dispose = entry.dispose.take();
                    entries.remove(&key);
                    drop(entries);
                    debug!(key = %key.key, "asset released during construction; disposing");
                    if let Some(dispose) = dispose {
                        dispose(&value);
                    }
                    let _ = tx.send(BuildStatus::Abandoned);
                    Err(PreviewError::ReleasedDuringConstruction)
                } else {
                    entry.value = Some(Arc::clone(&value));
                    drop(entries);
                    let _ = tx.send(BuildStatus::Ready);
                    Ok(self.make_handle(value, key))
                }
            }
            Err(error) => {
                let message = error.to_string();
                entry.ref_count = entry.ref_count.saturating_sub(1);
                if entry.ref_count == 0 {
                    entries.remove(&key);
                }
                drop(entries);
                warn!(key = %key.key, error = %message, "asset construction failed");
                let _ = tx.send(BuildStatus::Failed(message));
                Err(error)
            }
        }
    }

    fn make_handle(&self, asset: Arc<T>, key: AssetKey) -> AssetHandle<T> {
        AssetHandle {
            asset,
            registry: self.clone(),
            key,
            released: false,
        }
    }

    /// Decrement for a waiter that is erroring out of `acquire`.
    fn drop_reference(&self, key: &AssetKey) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 && entry.value.is_none() && entry.building.is_none() {
                entries.remove(key);
            }
        }
    }

    /// Release one reference. At zero: dispose a constructed value
    /// synchronously and remove the entry; defer if still constructing;
    /// otherwise remove the empty entry outright.
    fn release_key(&self, key: &AssetKey) {
        let to_dispose = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                warn!(key = %key.key, "release of unknown asset key");
                return;
            };
            if entry.ref_count == 0 {
                warn!(key = %key.key, "release would underflow ref count");
                return;
            }
            entry.ref_count -= 1;
            if entry.ref_count > 0 {
                None
            } else if let Some(value) = entry.value.take() {
                let dispose = entry.dispose.take();
                entries.remove(key);
                Some((value, dispose))
            } else if entry.building.is_some() {
                entry.release_when_ready = true;
                None
            } else {
                entries.remove(key);
                None
            }
        };

        if let Some((value, dispose)) = to_dispose {
            debug!(key = %key.key, "disposing asset");
            if let Some(dispose) = dispose {
                dispose(&value);
            }
        }
    }
}
