//! End-to-end lifecycle tests: accounting, exhaustion, overrides,
//! background eviction and shutdown under concurrent use.

use esox_connectionpool::{
    Pool, PoolConfiguration, PoolError, PropertyValue, Resource, ResourceError, ResourceFactory,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Shared switches controlling every session a factory hands out
#[derive(Clone)]
struct Backend {
    healthy: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    customized: Arc<AtomicUsize>,
}

impl Backend {
    fn new() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            customized: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct Session {
    backend: Backend,
    features: HashMap<String, bool>,
    properties: HashMap<String, PropertyValue>,
    transaction_open: bool,
}

impl Resource for Session {
    fn is_healthy(&self) -> bool {
        self.backend.healthy.load(Ordering::SeqCst)
    }

    fn reset(&mut self) -> Result<(), ResourceError> {
        self.transaction_open = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ResourceError> {
        self.backend.closed.fetch_add(1, Ordering::SeqCst);
        Err("socket already gone".into())
    }

    fn feature(&self, name: &str) -> Result<bool, ResourceError> {
        Ok(self.features.get(name).copied().unwrap_or(false))
    }

    fn set_feature(&mut self, name: &str, value: bool) -> Result<(), ResourceError> {
        self.features.insert(name.to_string(), value);
        Ok(())
    }

    fn property(&self, name: &str) -> Result<PropertyValue, ResourceError> {
        self.properties
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unknown property {}", name).into())
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<(), ResourceError> {
        self.properties.insert(name.to_string(), value);
        Ok(())
    }
}

impl ResourceFactory<Session> for Backend {
    fn create(
        &self,
        _kind: &str,
        _target: &str,
        _connect_timeout: Duration,
    ) -> Result<Session, ResourceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Session {
            backend: self.clone(),
            features: HashMap::new(),
            properties: HashMap::new(),
            transaction_open: false,
        })
    }

    fn customize(&self, session: &mut Session) -> Result<(), ResourceError> {
        self.customized.fetch_add(1, Ordering::SeqCst);
        session.set_property("applicationName", PropertyValue::from("lifecycle-tests"))
    }
}

fn config(min: usize, max: usize) -> PoolConfiguration {
    PoolConfiguration::new("sqlite", "file::memory:")
        .with_min_size(min)
        .with_max_size(max)
        .with_idle_timeout(Duration::from_secs(60))
        .with_sweep_interval(Duration::from_secs(3600))
}

fn assert_accounting(pool: &Pool<Session>) {
    assert_eq!(pool.allocated(), pool.idle() + pool.used());
    assert!(pool.allocated() <= pool.capacity());
}

// ---------------------------------------------------------------------------
// Borrow / return
// ---------------------------------------------------------------------------

#[test]
fn fill_exhaust_and_reuse() {
    let backend = Backend::new();
    let pool = Pool::new(
        config(1, 3).with_idle_timeout(Duration::from_secs(1)),
        backend.clone(),
    )
    .unwrap();

    let first = pool.borrow().unwrap();
    let _second = pool.borrow().unwrap();
    let _third = pool.borrow().unwrap();
    assert_accounting(&pool);

    match pool.borrow() {
        Err(PoolError::PoolExhausted { kind }) => assert_eq!(kind, "sqlite"),
        other => panic!("expected exhaustion, got {:?}", other),
    }

    pool.give_back(first).unwrap();
    assert_eq!((pool.idle(), pool.used(), pool.allocated()), (1, 2, 3));

    let _again = pool.borrow().unwrap();
    assert_eq!(pool.used(), 3);
    assert_eq!(backend.opened(), 3);
    assert_accounting(&pool);
}

#[test]
fn most_recently_returned_is_reused_first() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 3), backend).unwrap();

    let a = pool.borrow().unwrap();
    let b = pool.borrow().unwrap();
    let b_id = b.id();

    pool.give_back(a).unwrap();
    pool.give_back(b).unwrap();

    assert_eq!(pool.borrow().unwrap().id(), b_id);
}

#[test]
fn reset_clears_session_state() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 1), backend).unwrap();

    let session = pool.borrow().unwrap();
    session.lock().transaction_open = true;
    pool.give_back(session).unwrap();

    let session = pool.borrow().unwrap();
    assert!(!session.lock().transaction_open);
}

#[test]
fn unhealthy_return_is_discarded() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 2), backend.clone()).unwrap();

    let session = pool.borrow().unwrap();
    let _other = pool.borrow().unwrap();
    assert_eq!(pool.allocated(), 2);

    backend.set_healthy(false);
    assert_eq!(pool.dead(), 2);
    pool.give_back(session).unwrap();

    assert_eq!(pool.allocated(), 1);
    assert_eq!(pool.idle(), 0);
    assert_accounting(&pool);
}

#[test]
fn idle_resources_that_died_are_purged_on_borrow() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 2), backend.clone()).unwrap();
    assert_eq!(pool.warm_up(5).unwrap(), 2);

    backend.set_healthy(false);
    let session = pool.borrow().unwrap();
    backend.set_healthy(true);

    assert_eq!(backend.opened(), 3);
    assert_eq!(pool.allocated(), 1);
    drop(session);
    assert_accounting(&pool);
}

#[test]
fn factory_failure_leaves_accounting_intact() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let factory = move |_: &str, _: &str, _: Duration| -> Result<Session, ResourceError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Err("connection refused".into())
    };
    let pool = Pool::new(config(0, 2), factory).unwrap();

    assert!(matches!(pool.borrow(), Err(PoolError::Resource { .. })));
    assert!(matches!(pool.borrow(), Err(PoolError::Resource { .. })));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(pool.allocated(), 0);
    assert_eq!(pool.get_metrics().creation_failures, 2);

    // Defaults stay open while nothing is allocated
    assert!(pool.set_default_feature("autoCommit", true).is_ok());
}

#[test]
fn factory_receives_pool_parameters() {
    let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorder = Arc::clone(&calls);
    let backend = Backend::new();
    let factory = move |kind: &str, target: &str, connect_timeout: Duration| {
        recorder
            .lock()
            .push((kind.to_string(), target.to_string(), connect_timeout));
        backend.create(kind, target, connect_timeout)
    };
    let pool = Pool::new(
        config(0, 2)
            .with_idle_timeout(Duration::from_secs(45))
            .with_connect_timeout(Duration::from_secs(7)),
        factory,
    )
    .unwrap();

    let first = pool.borrow().unwrap();
    let second = pool.borrow().unwrap();
    drop((first, second));

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    for (kind, target, connect_timeout) in calls.iter() {
        assert_eq!(kind, "sqlite");
        assert_eq!(target, "file::memory:");
        assert_eq!(*connect_timeout, Duration::from_secs(7));
    }
}

// ---------------------------------------------------------------------------
// Defaults and overrides
// ---------------------------------------------------------------------------

#[test]
fn feature_override_restored_and_default_reapplied() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 1), backend).unwrap();
    pool.set_default_feature("readOnly", false).unwrap();
    pool.set_default_feature("autoCommit", true).unwrap();

    let session = pool.borrow_with_feature("readOnly", true).unwrap();
    assert!(session.feature("readOnly").unwrap());
    // Clobber a default while borrowed; return must bring it back
    session.set_feature("autoCommit", false).unwrap();
    pool.give_back(session).unwrap();

    let session = pool.borrow().unwrap();
    assert!(!session.feature("readOnly").unwrap());
    assert!(session.feature("autoCommit").unwrap());
}

#[test]
fn override_does_not_leak_into_next_borrow() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 1), backend).unwrap();

    let session = pool.borrow_with_feature("readOnly", true).unwrap();
    pool.give_back(session).unwrap();

    let session = pool.borrow().unwrap();
    session.set_feature("readOnly", true).unwrap();
    pool.give_back(session).unwrap();

    // No stale override re-applied: the value set by the last borrower stays
    let session = pool.borrow().unwrap();
    assert!(session.feature("readOnly").unwrap());
}

#[test]
fn failed_override_returns_resource() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 1), backend).unwrap();

    let err = pool.borrow_with_property("noSuchProperty", 1_i64).unwrap_err();
    assert!(matches!(err, PoolError::Resource { .. }));
    assert_eq!(pool.used(), 0);
    assert_eq!(pool.idle(), 1);
}

#[test]
fn defaults_apply_to_every_new_resource() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 3), backend.clone()).unwrap();
    pool.set_default_property("fetchSize", 250_i64).unwrap();

    let sessions: Vec<_> = (0..3).map(|_| pool.borrow().unwrap()).collect();
    for session in &sessions {
        assert_eq!(session.property("fetchSize").unwrap(), PropertyValue::Int(250));
        assert_eq!(
            session.property("applicationName").unwrap(),
            PropertyValue::from("lifecycle-tests")
        );
    }
    assert_eq!(backend.customized.load(Ordering::SeqCst), 3);

    assert_eq!(
        pool.set_default_property("fetchSize", 10_i64),
        Err(PoolError::InvalidAfterFirstResource)
    );
    assert_eq!(pool.get_default_property("fetchSize"), Ok(PropertyValue::Int(250)));
}

// ---------------------------------------------------------------------------
// Eviction
// ---------------------------------------------------------------------------

#[test]
fn sweeper_evicts_idle_down_to_minimum() {
    let backend = Backend::new();
    let config = config(1, 4)
        .with_idle_timeout(Duration::from_millis(40))
        .with_sweep_interval(Duration::from_millis(10));
    let pool = Pool::new(config, backend.clone()).unwrap();

    pool.warm_up(4).unwrap();
    assert_eq!(pool.allocated(), 4);

    thread::sleep(Duration::from_millis(300));

    assert_eq!(pool.allocated(), 1);
    assert_eq!(pool.idle(), 1);
    assert_eq!(backend.closed(), 3);
    assert_eq!(pool.get_metrics().total_evicted, 3);
}

#[test]
fn sweeper_evicts_unhealthy_idle_resources() {
    let backend = Backend::new();
    let config = config(0, 2).with_sweep_interval(Duration::from_millis(10));
    let pool = Pool::new(config, backend.clone()).unwrap();

    pool.warm_up(2).unwrap();
    backend.set_healthy(false);
    thread::sleep(Duration::from_millis(200));

    assert_eq!(pool.allocated(), 0);
    assert_eq!(pool.idle(), 0);
}

#[test]
fn sweeper_leaves_borrowed_resources_alone() {
    let backend = Backend::new();
    let config = config(0, 2)
        .with_idle_timeout(Duration::from_millis(10))
        .with_sweep_interval(Duration::from_millis(5));
    let pool = Pool::new(config, backend).unwrap();

    let session = pool.borrow().unwrap();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(pool.allocated(), 1);
    assert_eq!(pool.used(), 1);
    drop(session);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[test]
fn shutdown_closes_everything_despite_close_errors() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 3), backend.clone()).unwrap();

    let held = pool.borrow().unwrap();
    pool.warm_up(2).unwrap();

    pool.shutdown();

    assert_eq!(backend.closed(), 3);
    assert_eq!(pool.allocated(), 0);
    assert_eq!(pool.available(), 0);
    assert_eq!(pool.borrow().unwrap_err(), PoolError::PoolShutDown);
    assert_eq!(
        pool.set_default_feature("readOnly", true),
        Err(PoolError::PoolShutDown)
    );
    assert!(!pool.get_health_status().is_healthy());

    pool.give_back(held).unwrap();
    assert_eq!(backend.closed(), 3);
}

#[test]
fn dropping_pool_shuts_down() {
    let backend = Backend::new();
    {
        let pool = Pool::new(config(0, 2), backend.clone()).unwrap();
        pool.warm_up(2).unwrap();
    }
    assert_eq!(backend.closed(), 2);
}

#[test]
fn resource_outliving_pool_is_closed_on_drop() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 1), backend.clone()).unwrap();

    let session = pool.borrow().unwrap();
    let guard = session.lock();
    drop(guard);
    drop(pool);
    assert_eq!(backend.closed(), 1);

    drop(session);
    assert_eq!(backend.closed(), 1);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_borrowers_never_exceed_capacity() {
    let backend = Backend::new();
    let config = config(1, 4)
        .with_idle_timeout(Duration::from_millis(5))
        .with_sweep_interval(Duration::from_millis(2));
    let pool = Arc::new(Pool::new(config, backend.clone()).unwrap());
    let exhausted = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let exhausted = Arc::clone(&exhausted);
            thread::spawn(move || {
                for _ in 0..200 {
                    match pool.borrow() {
                        Ok(session) => {
                            assert!(pool.used() <= pool.capacity());
                            pool.give_back(session).unwrap();
                        }
                        Err(PoolError::PoolExhausted { .. }) => {
                            exhausted.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(err) => panic!("unexpected error: {}", err),
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_accounting(&pool);
    assert_eq!(pool.used(), 0);

    let metrics = pool.get_metrics();
    assert_eq!(metrics.total_borrowed, metrics.total_returned);
    assert_eq!(metrics.exhausted_events, exhausted.load(Ordering::SeqCst));
    assert_eq!(
        metrics.total_created - metrics.total_destroyed,
        metrics.allocated_resources
    );
}

#[tokio::test]
async fn async_borrow_behaves_like_borrow() {
    let backend = Backend::new();
    let pool = Pool::new(config(0, 1), backend).unwrap();

    let session = pool.borrow_async().await.unwrap();
    assert!(matches!(
        pool.borrow_async().await,
        Err(PoolError::PoolExhausted { .. })
    ));
    pool.give_back(session).unwrap();

    pool.shutdown();
    assert!(matches!(
        pool.borrow_async().await,
        Err(PoolError::PoolShutDown)
    ));
}
