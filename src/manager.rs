//! Single-slot lifecycle manager for one expensive resource.
//!
//! The manager holds at most one [`Resource`] at a time, identified by a key.
//! `acquire` loads on demand and swaps the instance when a different key is
//! requested; `release` evicts it. Loads and evictions are serialized by one
//! transition lock. The slot itself sits behind a second, short-held lock, so
//! callers never see a half-loaded or half-evicted slot and `status` never
//! waits on a slow load.
//!
//! Handles returned by `acquire` keep their instance alive. Eviction takes the
//! instance out of the slot, then waits (holding only the transition lock)
//! until the last handle is dropped and teardown has finished. Only then may a
//! new instance be constructed, so two instances are never resident together.
//! While an instance drains, `acquire` for its own key still hands it out.
//!
//! A thread holding a handle must drop it before calling
//! [`ResourceManager::release`] or acquiring a different key, or the eviction
//! it starts waits on that thread.
//!
//! There is no background eviction. The idle timeout is reported by
//! [`ResourceManager::status`] and nothing else.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;

use crate::config::ManagerConfig;
use crate::device::{DeviceInfo, DeviceProbe, NvidiaSmiProbe};
use crate::error::{LoadError, ManagerError};
use crate::resource::{Resource, ResourceLoader};

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(rename = "model_loaded")]
    pub loaded: bool,
    #[serde(rename = "model_dir")]
    pub key: Option<String>,
    /// Seconds since the last successful `acquire`; `None` when nothing is loaded.
    pub idle_seconds: Option<u64>,
    pub idle_timeout_seconds: u64,
    #[serde(rename = "gpu")]
    pub device: DeviceInfo,
}

/// Shared access to the loaded instance.
///
/// The instance is not torn down while any clone of the handle is alive.
pub struct ResourceHandle<R: Resource>(Arc<Resident<R>>);

impl<R: Resource> ResourceHandle<R> {
    /// Key the instance was loaded for.
    pub fn key(&self) -> &str {
        &self.0.key
    }

    /// True if both handles point at the same instance.
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<R: Resource> Clone for ResourceHandle<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R: Resource> Deref for ResourceHandle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.0.resource
    }
}

impl<R: Resource> fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &self.0.key)
            .finish_non_exhaustive()
    }
}

/// A loaded instance. Fields drop in order, so `_seat` is vacated only after
/// `resource` is gone.
struct Resident<R: Resource> {
    key: String,
    resource: R,
    _seat: Seat,
}

impl<R: Resource> Drop for Resident<R> {
    fn drop(&mut self) {
        if let Err(e) = self.resource.teardown() {
            log::warn!("Teardown of {} reported an error: {e}", self.key);
        }
    }
}

/// Tracks whether an instance is resident, across threads.
#[derive(Default)]
struct Residency {
    occupied: Mutex<bool>,
    vacated: Condvar,
}

impl Residency {
    fn occupy(self: &Arc<Self>) -> Seat {
        let mut occupied = self.occupied.lock();
        debug_assert!(!*occupied, "second instance constructed while one is resident");
        *occupied = true;
        Seat(Arc::clone(self))
    }

    fn wait_vacant(&self) {
        let mut occupied = self.occupied.lock();
        while *occupied {
            self.vacated.wait(&mut occupied);
        }
    }
}

struct Seat(Arc<Residency>);

impl Drop for Seat {
    fn drop(&mut self) {
        *self.0.occupied.lock() = false;
        self.0.vacated.notify_all();
    }
}

struct Slot<R: Resource> {
    current: Option<Arc<Resident<R>>>,
    /// Instance taken out of the slot whose handles are still being waited on.
    draining: Option<Weak<Resident<R>>>,
    last_access: Instant,
}

impl<R: Resource> Slot<R> {
    /// A live instance for `key`: the loaded one, or one still draining.
    fn live(&self, key: &str) -> Option<Arc<Resident<R>>> {
        if let Some(resident) = self.current.as_ref().filter(|r| r.key == key) {
            return Some(Arc::clone(resident));
        }
        self.draining
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|r| r.key == key)
    }
}

/// Owns zero or one loaded resource. Construct once and share by reference
/// (or `Arc`) for the life of the process.
pub struct ResourceManager<L: ResourceLoader> {
    loader: L,
    config: ManagerConfig,
    probe: Box<dyn DeviceProbe>,
    /// Serializes load and evict. Held for the whole teardown-then-construct.
    transition: Mutex<()>,
    /// Held only for short reads and writes of the slot.
    slot: Mutex<Slot<L::Resource>>,
    residency: Arc<Residency>,
}

impl<L: ResourceLoader> ResourceManager<L> {
    /// Create an empty manager that reports GPU state via `nvidia-smi`.
    pub fn new(loader: L, config: ManagerConfig) -> Self {
        Self::with_probe(loader, config, NvidiaSmiProbe::default())
    }

    pub fn with_probe(loader: L, config: ManagerConfig, probe: impl DeviceProbe + 'static) -> Self {
        Self {
            loader,
            config,
            probe: Box::new(probe),
            transition: Mutex::new(()),
            slot: Mutex::new(Slot {
                current: None,
                draining: None,
                last_access: Instant::now(),
            }),
            residency: Arc::new(Residency::default()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Return a handle for `key` (or the configured default), loading or
    /// swapping the instance as needed.
    ///
    /// Blocks while another caller loads or evicts. On load failure the slot
    /// is left empty, even if a different key was loaded before the call.
    pub fn acquire(
        &self,
        key: Option<&str>,
    ) -> Result<ResourceHandle<L::Resource>, ManagerError> {
        let key = key.unwrap_or(&self.config.default_key);
        if let Some(handle) = self.reuse(key) {
            return Ok(handle);
        }
        let _transition = self.transition.lock();
        self.load_locked(key)
    }

    /// Like [`ResourceManager::acquire`], giving up if the lock is not obtained
    /// within `wait`. An in-progress load by another caller is not interrupted.
    pub fn acquire_timeout(
        &self,
        key: Option<&str>,
        wait: Duration,
    ) -> Result<ResourceHandle<L::Resource>, ManagerError> {
        let key = key.unwrap_or(&self.config.default_key);
        if let Some(handle) = self.reuse(key) {
            return Ok(handle);
        }
        let _transition = self.lock_within(wait)?;
        self.load_locked(key)
    }

    /// Evict the loaded instance, if any. Idempotent.
    ///
    /// Returns once outstanding handles are dropped and teardown has run.
    pub fn release(&self) {
        let _transition = self.transition.lock();
        self.evict();
    }

    /// Like [`ResourceManager::release`] with a bound on the lock wait.
    pub fn release_timeout(&self, wait: Duration) -> Result<(), ManagerError> {
        let _transition = self.lock_within(wait)?;
        self.evict();
        Ok(())
    }

    /// Report load state, idle time and device information.
    ///
    /// Does not count as an access, and never waits on a load or eviction.
    pub fn status(&self) -> StatusReport {
        let (key, idle_seconds) = {
            let slot = self.slot.lock();
            match &slot.current {
                Some(resident) => (
                    Some(resident.key.clone()),
                    Some(slot.last_access.elapsed().as_secs()),
                ),
                None => (None, None),
            }
        };

        StatusReport {
            loaded: key.is_some(),
            key,
            idle_seconds,
            idle_timeout_seconds: self.config.idle_timeout.as_secs(),
            device: self.probe.probe(),
        }
    }

    fn lock_within(&self, wait: Duration) -> Result<MutexGuard<'_, ()>, ManagerError> {
        self.transition.try_lock_for(wait).ok_or_else(|| {
            log::warn!("Gave up waiting {wait:?} for the resource lock");
            ManagerError::LockTimeout(wait)
        })
    }

    /// Hand out a live instance for `key` without touching the transition lock.
    ///
    /// An instance that is still draining counts as live: the caller is
    /// ordered before the eviction that is waiting on it.
    fn reuse(&self, key: &str) -> Option<ResourceHandle<L::Resource>> {
        let mut slot = self.slot.lock();
        let resident = slot.live(key)?;
        log::debug!("{key} already loaded");
        slot.last_access = Instant::now();
        Some(ResourceHandle(resident))
    }

    /// Caller holds `transition`.
    fn load_locked(&self, key: &str) -> Result<ResourceHandle<L::Resource>, ManagerError> {
        // another caller may have loaded it while we waited
        if let Some(handle) = self.reuse(key) {
            return Ok(handle);
        }

        self.evict();

        log::info!("Loading {key}...");
        let start = Instant::now();
        let resource = self
            .loader
            .load(key)
            .map_err(|source| LoadError::new(key, source))?;
        log::info!("Loaded {key} in {:.2?}", start.elapsed());

        let resident = Arc::new(Resident {
            key: key.to_string(),
            resource,
            _seat: self.residency.occupy(),
        });

        let mut slot = self.slot.lock();
        slot.current = Some(Arc::clone(&resident));
        slot.last_access = Instant::now();
        Ok(ResourceHandle(resident))
    }

    /// Caller holds `transition`. Waits for handles without holding `slot`.
    fn evict(&self) {
        let resident = {
            let mut slot = self.slot.lock();
            let Some(resident) = slot.current.take() else {
                return;
            };
            slot.draining = Some(Arc::downgrade(&resident));
            resident
        };

        let key = resident.key.clone();
        let outstanding = Arc::strong_count(&resident) - 1;
        if outstanding > 0 {
            log::info!("Waiting for {outstanding} handle(s) to {key} to be dropped");
        }
        drop(resident);
        self.residency.wait_vacant();
        self.slot.lock().draining = None;
        log::info!("Released {key}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NoDevice;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Dummy;
    impl Resource for Dummy {}

    fn manager() -> ResourceManager<impl ResourceLoader<Resource = Dummy>> {
        let loader = |key: &str| -> Result<Dummy, BoxError> {
            if key.starts_with("bad") {
                Err(format!("no model at {key}").into())
            } else {
                Ok(Dummy)
            }
        };
        let config = ManagerConfig {
            default_key: "default".to_string(),
            ..Default::default()
        };
        ResourceManager::with_probe(loader, config, NoDevice)
    }

    #[test]
    fn starts_empty() {
        let status = manager().status();
        assert!(!status.loaded);
        assert_eq!(status.key, None);
        assert_eq!(status.idle_seconds, None);
        assert_eq!(status.idle_timeout_seconds, 600);
    }

    #[test]
    fn missing_key_uses_default() {
        let m = manager();
        let handle = m.acquire(None).unwrap();
        assert_eq!(handle.key(), "default");
        assert_eq!(m.status().key.as_deref(), Some("default"));
    }

    #[test]
    fn same_key_reuses_instance() {
        let m = manager();
        let a = m.acquire(Some("x")).unwrap();
        let b = m.acquire(Some("x")).unwrap();
        assert!(a.same_instance(&b));
    }

    #[test]
    fn failed_load_leaves_slot_empty() {
        let m = manager();
        drop(m.acquire(Some("good")).unwrap());

        let err = m.acquire(Some("bad-key")).unwrap_err();
        assert!(matches!(err, ManagerError::Load(ref e) if e.key == "bad-key"));
        assert!(!m.status().loaded);

        // still usable afterwards
        assert!(m.acquire(Some("good")).is_ok());
    }

    fn backdate(m: &ResourceManager<impl ResourceLoader<Resource = Dummy>>, secs: u64) {
        let mut slot = m.slot.lock();
        slot.last_access = slot
            .last_access
            .checked_sub(Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn status_leaves_access_time_alone() {
        let m = manager();
        drop(m.acquire(Some("x")).unwrap());
        backdate(&m, 5);

        assert!(m.status().idle_seconds.unwrap() >= 5);
        assert!(m.status().idle_seconds.unwrap() >= 5);

        drop(m.acquire(Some("x")).unwrap());
        assert_eq!(m.status().idle_seconds, Some(0));
    }

    #[test]
    fn status_does_not_wait_on_transition() {
        let m = manager();
        drop(m.acquire(Some("x")).unwrap());
        let _guard = m.transition.lock();
        assert_eq!(m.status().key.as_deref(), Some("x"));
        // same key needs no transition either
        assert_eq!(m.acquire(Some("x")).unwrap().key(), "x");
    }

    #[test]
    fn release_is_idempotent() {
        let m = manager();
        drop(m.acquire(Some("x")).unwrap());
        m.release();
        let once = m.status();
        m.release();
        assert_eq!(m.status(), once);
        assert!(!once.loaded);
    }

    #[test]
    fn timeout_when_lock_is_held() {
        let m = manager();
        let _guard = m.transition.lock();
        let wait = Duration::from_millis(20);
        assert!(matches!(
            m.acquire_timeout(Some("x"), wait),
            Err(ManagerError::LockTimeout(d)) if d == wait
        ));
        assert!(matches!(
            m.release_timeout(wait),
            Err(ManagerError::LockTimeout(_))
        ));
    }

    #[test]
    fn teardown_runs_once_per_instance() {
        static TEARDOWNS: AtomicUsize = AtomicUsize::new(0);

        struct Counted;
        impl Resource for Counted {
            fn teardown(&mut self) -> Result<(), crate::error::TeardownError> {
                TEARDOWNS.fetch_add(1, Ordering::SeqCst);
                Err(crate::error::TeardownError("driver refused".into()))
            }
        }

        let m = ResourceManager::with_probe(
            |_: &str| Ok::<_, BoxError>(Counted),
            ManagerConfig::default(),
            NoDevice,
        );
        drop(m.acquire(Some("a")).unwrap());
        drop(m.acquire(Some("b")).unwrap());
        m.release();
        m.release();

        assert_eq!(TEARDOWNS.load(Ordering::SeqCst), 2);
        assert!(!m.status().loaded);
    }

    #[test]
    fn status_serializes_with_tool_field_names() {
        let m = manager();
        drop(m.acquire(Some("x")).unwrap());
        let json = serde_json::to_value(m.status()).unwrap();
        assert_eq!(json["model_loaded"], true);
        assert_eq!(json["model_dir"], "x");
        assert_eq!(json["gpu"]["available"], false);
        assert!(json["idle_seconds"].is_u64());
    }
}
