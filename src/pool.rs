//! Core connection pool implementation

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{ResourceMetadata, Sweeper};
use crate::health::HealthStatus;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::resource::{PropertyValue, Resource, ResourceError, ResourceFactory, ResourceId};
use crate::settings::{DefaultSettings, Override, OverrideTable};

use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A live resource shared between the pool's bookkeeping and its borrower
struct Slot<R> {
    id: ResourceId,
    resource: Mutex<R>,
    closed: AtomicBool,
}

impl<R: Resource> Slot<R> {
    fn new(id: ResourceId, resource: R) -> Arc<Self> {
        Arc::new(Self {
            id,
            resource: Mutex::new(resource),
            closed: AtomicBool::new(false),
        })
    }

    /// Close the resource at most once. Failures are logged and swallowed.
    fn close(&self, resource: &mut R, kind: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = resource.close() {
            warn!(kind, id = %self.id, error = %err, "failed to close resource");
        }
    }
}

struct Entry<R> {
    slot: Arc<Slot<R>>,
    metadata: ResourceMetadata,
}

/// Everything guarded by the pool lock
struct PoolState<R> {
    idle: VecDeque<Entry<R>>,
    active: HashMap<ResourceId, Entry<R>>,
    allocated: usize,
    shut_down: bool,
    defaults: DefaultSettings,
    overrides: OverrideTable,
    last_id: u64,
}

impl<R> PoolState<R> {
    fn new(capacity: usize) -> Self {
        Self {
            idle: VecDeque::with_capacity(capacity),
            active: HashMap::with_capacity(capacity),
            allocated: 0,
            shut_down: false,
            defaults: DefaultSettings::default(),
            overrides: OverrideTable::default(),
            last_id: 0,
        }
    }

    fn next_id(&mut self) -> ResourceId {
        self.last_id += 1;
        ResourceId(self.last_id)
    }
}

/// State shared by the pool handle, borrowed resources and the sweeper
struct PoolShared<R: Resource> {
    config: PoolConfiguration,
    factory: Box<dyn ResourceFactory<R>>,
    state: Mutex<PoolState<R>>,
    metrics: MetricsTracker,
}

impl<R: Resource> PoolShared<R> {
    fn kind(&self) -> &str {
        &self.config.kind
    }

    fn checkout(&self) -> PoolResult<Arc<Slot<R>>> {
        let mut state = self.state.lock();
        self.checkout_locked(&mut state)
    }

    fn checkout_locked(&self, state: &mut PoolState<R>) -> PoolResult<Arc<Slot<R>>> {
        if state.shut_down {
            return Err(PoolError::PoolShutDown);
        }

        self.purge_dead(state);

        let entry = match state.idle.pop_front() {
            Some(entry) => entry,
            None if state.allocated < self.config.max_size => self.open(state)?,
            None => {
                MetricsTracker::record(&self.metrics.exhausted_events, 1);
                debug!(kind = self.kind(), allocated = state.allocated, "pool exhausted");
                return Err(PoolError::PoolExhausted {
                    kind: self.config.kind.clone(),
                });
            }
        };

        let slot = Arc::clone(&entry.slot);
        state.active.insert(slot.id, entry);
        MetricsTracker::record(&self.metrics.total_borrowed, 1);
        debug!(kind = self.kind(), id = %slot.id, "resource borrowed");
        Ok(slot)
    }

    /// Borrow and apply a one-off settings change recorded for restoration
    fn checkout_with<F>(&self, change: F) -> PoolResult<Arc<Slot<R>>>
    where
        F: FnOnce(&mut R) -> Result<Override, ResourceError>,
    {
        let mut state = self.state.lock();
        let slot = self.checkout_locked(&mut state)?;

        let changed = change(&mut *slot.resource.lock());
        match changed {
            Ok(entry) => {
                state.overrides.record(slot.id, entry);
                Ok(slot)
            }
            Err(err) => {
                self.release_locked(&mut state, slot)?;
                Err(PoolError::resource(self.kind(), err))
            }
        }
    }

    /// Open a new resource and count it. The caller must place the entry
    /// in the idle or active list before releasing the lock.
    fn open(&self, state: &mut PoolState<R>) -> PoolResult<Entry<R>> {
        let kind = self.kind();
        let mut resource = self
            .factory
            .create(kind, &self.config.target, self.config.connect_timeout)
            .map_err(|err| self.creation_failed(err))?;

        let prepared = state
            .defaults
            .apply_to(&mut resource)
            .and_then(|()| self.factory.customize(&mut resource));
        if let Err(err) = prepared {
            if let Err(close_err) = resource.close() {
                warn!(kind, error = %close_err, "failed to close rejected resource");
            }
            return Err(self.creation_failed(err));
        }

        let id = state.next_id();
        state.allocated += 1;
        MetricsTracker::record(&self.metrics.total_created, 1);
        debug!(kind, %id, allocated = state.allocated, "resource created");

        Ok(Entry {
            slot: Slot::new(id, resource),
            metadata: ResourceMetadata::new(),
        })
    }

    fn creation_failed(&self, err: ResourceError) -> PoolError {
        MetricsTracker::record(&self.metrics.creation_failures, 1);
        warn!(kind = self.kind(), error = %err, "failed to create resource");
        PoolError::resource(self.kind(), err)
    }

    /// Drop idle resources that died while waiting
    fn purge_dead(&self, state: &mut PoolState<R>) {
        let kind = self.kind();
        let before = state.idle.len();

        state.idle.retain(|entry| {
            let mut resource = entry.slot.resource.lock();
            if resource.is_healthy() {
                return true;
            }
            entry.slot.close(&mut resource, kind);
            false
        });

        let purged = before - state.idle.len();
        if purged > 0 {
            state.allocated = state.allocated.saturating_sub(purged);
            MetricsTracker::record(&self.metrics.total_destroyed, purged);
            debug!(kind, purged, allocated = state.allocated, "purged dead idle resources");
        }
    }

    fn release(&self, slot: Arc<Slot<R>>) -> PoolResult<()> {
        let mut state = self.state.lock();
        self.release_locked(&mut state, slot)
    }

    fn release_locked(&self, state: &mut PoolState<R>, slot: Arc<Slot<R>>) -> PoolResult<()> {
        let kind = self.kind();

        // Shutdown already reclaimed the bookkeeping; only a deferred close remains
        if state.shut_down {
            slot.close(&mut slot.resource.lock(), kind);
            return Ok(());
        }

        let mut entry = match state.active.remove(&slot.id) {
            Some(entry) if Arc::ptr_eq(&entry.slot, &slot) => entry,
            Some(entry) => {
                state.active.insert(entry.slot.id, entry);
                return Err(self.violation(format!(
                    "foreign resource {} returned to '{}' pool",
                    slot.id, kind
                )));
            }
            None => {
                return Err(self.violation(format!(
                    "unknown resource {} returned to '{}' pool",
                    slot.id, kind
                )));
            }
        };

        let pending = state.overrides.take(slot.id);
        let mut resource = slot.resource.lock();

        if !resource.is_healthy() {
            slot.close(&mut resource, kind);
            drop(resource);
            state.allocated = state.allocated.saturating_sub(1);
            MetricsTracker::record(&self.metrics.total_destroyed, 1);
            warn!(kind, id = %slot.id, allocated = state.allocated, "discarded unhealthy resource");
            return Ok(());
        }

        match Self::recycle(&mut resource, pending, &state.defaults) {
            Ok(()) => {
                drop(resource);
                entry.metadata.touch();
                state.idle.push_front(entry);
                MetricsTracker::record(&self.metrics.total_returned, 1);
                debug!(kind, id = %slot.id, "resource returned");
                Ok(())
            }
            Err(err) => {
                slot.close(&mut resource, kind);
                drop(resource);
                state.allocated = state.allocated.saturating_sub(1);
                MetricsTracker::record(&self.metrics.total_destroyed, 1);
                Err(self.violation(format!(
                    "failed to recycle resource {}: {}",
                    slot.id, err
                )))
            }
        }
    }

    /// Reset, undo the borrow's override, then re-apply the pool defaults
    fn recycle(
        resource: &mut R,
        pending: Option<Override>,
        defaults: &DefaultSettings,
    ) -> Result<(), ResourceError> {
        resource.reset()?;
        if let Some(entry) = pending {
            entry.restore(resource)?;
        }
        defaults.apply_to(resource)
    }

    fn violation(&self, message: String) -> PoolError {
        error!(kind = self.kind(), "{}", message);
        PoolError::ConsistencyViolation(message)
    }

    /// Evict idle resources past the idle timeout or failing their health
    /// check, never dropping below the configured minimum
    fn sweep(&self) -> usize {
        let mut state = self.state.lock();
        if state.shut_down {
            return 0;
        }

        let kind = self.kind();
        let mut evicted = 0;
        let mut index = 0;

        while state.allocated > self.config.min_size && index < state.idle.len() {
            let stale = {
                let entry = &state.idle[index];
                entry.metadata.is_idle_expired(self.config.idle_timeout)
                    || !entry.slot.resource.lock().is_healthy()
            };
            if !stale {
                index += 1;
                continue;
            }

            if let Some(entry) = state.idle.remove(index) {
                debug!(
                    kind,
                    id = %entry.slot.id,
                    age = ?entry.metadata.created_at.elapsed(),
                    "evicting idle resource"
                );
                entry.slot.close(&mut entry.slot.resource.lock(), kind);
                state.allocated -= 1;
                evicted += 1;
            }
        }

        if evicted > 0 {
            MetricsTracker::record(&self.metrics.total_evicted, evicted);
            MetricsTracker::record(&self.metrics.total_destroyed, evicted);
            info!(kind, evicted, allocated = state.allocated, "evicted idle resources");
        }
        evicted
    }

    fn warm_up(&self, count: usize) -> PoolResult<usize> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(PoolError::PoolShutDown);
        }

        let room = self.config.max_size.saturating_sub(state.allocated);
        let mut created = 0;
        for _ in 0..count.min(room) {
            let entry = self.open(&mut state)?;
            state.idle.push_back(entry);
            created += 1;
        }

        debug!(kind = self.kind(), created, "pool warmed up");
        Ok(created)
    }

    fn update_defaults(&self, update: impl FnOnce(&mut DefaultSettings)) -> PoolResult<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(PoolError::PoolShutDown);
        }
        if state.allocated > 0 {
            return Err(PoolError::InvalidAfterFirstResource);
        }
        update(&mut state.defaults);
        Ok(())
    }

    /// Close and forget every resource. Borrowed resources that are locked
    /// by their holder right now are closed when they come back.
    fn close_all(&self) {
        let mut state = self.state.lock();
        let kind = self.kind();
        let mut closed = 0;
        let mut deferred = 0;

        while let Some(entry) = state.idle.pop_front() {
            entry.slot.close(&mut entry.slot.resource.lock(), kind);
            state.allocated = state.allocated.saturating_sub(1);
            closed += 1;
        }

        for (_, entry) in std::mem::take(&mut state.active) {
            match entry.slot.resource.try_lock() {
                Some(mut resource) => {
                    entry.slot.close(&mut resource, kind);
                    closed += 1;
                }
                None => deferred += 1,
            }
            state.allocated = state.allocated.saturating_sub(1);
        }

        state.overrides.clear();
        MetricsTracker::record(&self.metrics.total_destroyed, closed + deferred);
        info!(kind, closed, deferred, "pool shut down");
    }
}

/// A borrowed resource that goes back to its pool when dropped
///
/// Use [`PooledResource::lock`] for exclusive access to the resource
/// itself. Hand it back explicitly with [`Pool::give_back`] to observe
/// errors raised while recycling it.
pub struct PooledResource<R: Resource> {
    slot: Option<Arc<Slot<R>>>,
    pool: Arc<PoolShared<R>>,
}

impl<R: Resource> PooledResource<R> {
    fn new(slot: Arc<Slot<R>>, pool: Arc<PoolShared<R>>) -> Self {
        Self {
            slot: Some(slot),
            pool,
        }
    }

    fn slot(&self) -> &Slot<R> {
        self.slot.as_ref().expect("resource already returned")
    }

    /// Stable identity of the borrowed resource
    pub fn id(&self) -> ResourceId {
        self.slot().id
    }

    /// Lock the resource for exclusive use
    pub fn lock(&self) -> MutexGuard<'_, R> {
        self.slot().resource.lock()
    }

    pub fn is_healthy(&self) -> bool {
        self.lock().is_healthy()
    }

    pub fn feature(&self, name: &str) -> Result<bool, ResourceError> {
        self.lock().feature(name)
    }

    pub fn set_feature(&self, name: &str, value: bool) -> Result<(), ResourceError> {
        self.lock().set_feature(name, value)
    }

    pub fn property(&self, name: &str) -> Result<PropertyValue, ResourceError> {
        self.lock().property(name)
    }

    pub fn set_property(
        &self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), ResourceError> {
        self.lock().set_property(name, value.into())
    }
}

impl<R: Resource> fmt::Debug for PooledResource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("id", &self.slot.as_ref().map(|slot| slot.id))
            .field("kind", &self.pool.config.kind)
            .finish()
    }
}

impl<R: Resource> Drop for PooledResource<R> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            // Violations are already logged by the pool
            let _ = self.pool.release(slot);
        }
    }
}

/// Thread-safe pool of connection-like resources
///
/// Resources are created on demand up to `max_size`, reused
/// most-recently-returned first, and reclaimed by a background sweeper
/// once they sit idle past `idle_timeout`.
///
/// # Examples
///
/// ```
/// use esox_connectionpool::{Pool, PoolConfiguration, PoolError};
/// # use esox_connectionpool::{PropertyValue, Resource, ResourceError};
/// # use std::time::Duration;
/// # struct Conn;
/// # impl Resource for Conn {
/// #     fn is_healthy(&self) -> bool { true }
/// #     fn reset(&mut self) -> Result<(), ResourceError> { Ok(()) }
/// #     fn close(&mut self) -> Result<(), ResourceError> { Ok(()) }
/// #     fn feature(&self, _: &str) -> Result<bool, ResourceError> { Ok(false) }
/// #     fn set_feature(&mut self, _: &str, _: bool) -> Result<(), ResourceError> { Ok(()) }
/// #     fn property(&self, _: &str) -> Result<PropertyValue, ResourceError> { Ok(PropertyValue::Int(0)) }
/// #     fn set_property(&mut self, _: &str, _: PropertyValue) -> Result<(), ResourceError> { Ok(()) }
/// # }
///
/// let config = PoolConfiguration::new("test", "local").with_max_size(1);
/// let factory = |_: &str, _: &str, _: Duration| Ok::<_, ResourceError>(Conn);
/// let pool = Pool::new(config, factory).unwrap();
///
/// let conn = pool.borrow().unwrap();
/// assert!(matches!(pool.borrow(), Err(PoolError::PoolExhausted { .. })));
///
/// pool.give_back(conn).unwrap();
/// assert_eq!(pool.idle(), 1);
/// ```
pub struct Pool<R: Resource> {
    shared: Arc<PoolShared<R>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<R: Resource> Pool<R> {
    /// Create a pool and start its sweeper. No resource is opened yet.
    pub fn new<F>(config: PoolConfiguration, factory: F) -> PoolResult<Self>
    where
        F: ResourceFactory<R>,
    {
        config.validate()?;

        let kind = config.kind.clone();
        let period = config.sweep_period();
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState::new(config.max_size)),
            config,
            factory: Box::new(factory),
            metrics: MetricsTracker::new(),
        });

        let weak = Arc::downgrade(&shared);
        let task = move || match weak.upgrade() {
            Some(shared) => {
                shared.sweep();
                true
            }
            None => false,
        };
        let sweeper = Sweeper::start(format!("connpool-sweeper-{}", kind), period, task)
            .map_err(|err| PoolError::resource(&kind, err))?;

        info!(
            kind = %kind,
            min = shared.config.min_size,
            max = shared.config.max_size,
            "connection pool created"
        );

        Ok(Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Borrow a resource, creating one if none is idle and capacity remains
    pub fn borrow(&self) -> PoolResult<PooledResource<R>> {
        let slot = self.shared.checkout()?;
        Ok(self.wrap(slot))
    }

    /// Borrow a resource with feature `name` switched to `value` until it
    /// comes back
    pub fn borrow_with_feature(&self, name: &str, value: bool) -> PoolResult<PooledResource<R>> {
        let slot = self
            .shared
            .checkout_with(|resource| Override::feature(resource, name, value))?;
        Ok(self.wrap(slot))
    }

    /// Borrow a resource with property `name` set to `value` until it
    /// comes back
    pub fn borrow_with_property(
        &self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> PoolResult<PooledResource<R>> {
        let value = value.into();
        let slot = self
            .shared
            .checkout_with(|resource| Override::property(resource, name, value))?;
        Ok(self.wrap(slot))
    }

    /// Borrow from an async context without stalling the runtime on
    /// resource creation
    pub async fn borrow_async(&self) -> PoolResult<PooledResource<R>> {
        // The guard is built on the blocking thread so a cancelled caller
        // still hands the slot back when the finished task is dropped
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || -> PoolResult<PooledResource<R>> {
            let slot = shared.checkout()?;
            Ok(PooledResource::new(slot, shared))
        })
        .await
        .map_err(|err| PoolError::resource(self.kind(), err))?
    }

    /// Return a borrowed resource.
    ///
    /// Healthy resources are reset, have their borrow override undone and
    /// the pool defaults re-applied before going back to idle. Unhealthy
    /// ones are discarded. A resource borrowed from another pool, or one
    /// that fails while being recycled, yields a fatal
    /// [`PoolError::ConsistencyViolation`].
    pub fn give_back(&self, mut resource: PooledResource<R>) -> PoolResult<()> {
        if !Arc::ptr_eq(&resource.pool, &self.shared) {
            // Dropping `resource` still hands it back to the pool it came from
            return Err(self.shared.violation(format!(
                "resource {} from '{}' pool returned to '{}' pool",
                resource.id(),
                resource.pool.config.kind,
                self.kind()
            )));
        }

        match resource.slot.take() {
            Some(slot) => self.shared.release(slot),
            None => Ok(()),
        }
    }

    /// Pre-create up to `count` idle resources, bounded by the free
    /// capacity. Returns how many were created.
    pub fn warm_up(&self, count: usize) -> PoolResult<usize> {
        self.shared.warm_up(count)
    }

    /// Shut the pool down: refuse further borrows, stop the sweeper and
    /// close every resource. Calling it again does nothing.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
        }

        // The sweeper takes the pool lock on each tick, so join it unlocked
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }

        self.shared.close_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// Set a feature applied to every resource. Only allowed before the
    /// first resource is created.
    pub fn set_default_feature(&self, name: &str, value: bool) -> PoolResult<()> {
        self.shared
            .update_defaults(|defaults| defaults.set_feature(name, value))
    }

    pub fn get_default_feature(&self, name: &str) -> PoolResult<bool> {
        self.shared.state.lock().defaults.feature(name)
    }

    /// Set a property applied to every resource. Only allowed before the
    /// first resource is created.
    pub fn set_default_property(
        &self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> PoolResult<()> {
        let value = value.into();
        self.shared
            .update_defaults(|defaults| defaults.set_property(name, value))
    }

    pub fn get_default_property(&self, name: &str) -> PoolResult<PropertyValue> {
        self.shared.state.lock().defaults.property(name)
    }

    /// Maximum number of live resources
    pub fn capacity(&self) -> usize {
        self.shared.config.max_size
    }

    /// Live resources, idle and borrowed
    pub fn allocated(&self) -> usize {
        self.shared.state.lock().allocated
    }

    /// Borrowed resources
    pub fn used(&self) -> usize {
        self.shared.state.lock().active.len()
    }

    pub fn idle(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// How many more resources could be borrowed right now
    pub fn available(&self) -> usize {
        let state = self.shared.state.lock();
        if state.shut_down {
            return 0;
        }
        self.shared.config.max_size - state.active.len()
    }

    /// Borrowed resources currently failing their health check.
    ///
    /// Resources locked by their borrower at the time of the call are not
    /// inspected.
    pub fn dead(&self) -> usize {
        let state = self.shared.state.lock();
        state
            .active
            .values()
            .filter(|entry| {
                entry
                    .slot
                    .resource
                    .try_lock()
                    .is_some_and(|resource| !resource.is_healthy())
            })
            .count()
    }

    pub fn kind(&self) -> &str {
        self.shared.kind()
    }

    pub fn target(&self) -> &str {
        &self.shared.config.target
    }

    pub fn min_size(&self) -> usize {
        self.shared.config.min_size
    }

    pub fn idle_timeout(&self) -> Duration {
        self.shared.config.idle_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.shared.config.connect_timeout
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        let dead = self.dead();
        let state = self.shared.state.lock();
        HealthStatus::new(
            state.idle.len(),
            state.active.len(),
            dead,
            self.shared.config.max_size,
            state.shut_down,
        )
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let state = self.shared.state.lock();
        self.shared.metrics.get_metrics(
            state.active.len(),
            state.idle.len(),
            state.allocated,
            self.shared.config.max_size,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    fn wrap(&self, slot: Arc<Slot<R>>) -> PooledResource<R> {
        PooledResource::new(slot, Arc::clone(&self.shared))
    }

    #[cfg(test)]
    fn sweep_now(&self) -> usize {
        self.shared.sweep()
    }

    #[cfg(test)]
    fn pending_overrides(&self) -> usize {
        self.shared.state.lock().overrides.len()
    }
}

impl<R: Resource> fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Pool")
            .field("kind", &self.shared.config.kind)
            .field("allocated", &state.allocated)
            .field("idle", &state.idle.len())
            .field("used", &state.active.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

impl<R: Resource> Drop for Pool<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
