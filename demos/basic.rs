//! Basic usage examples for the connection pool

use esox_connectionpool::{Pool, PoolConfiguration, PoolError, PropertyValue, Resource, ResourceError};
use std::collections::HashMap;
use std::time::Duration;

/// In-memory stand-in for a database session
struct Session {
    target: String,
    features: HashMap<String, bool>,
    properties: HashMap<String, PropertyValue>,
}

impl Resource for Session {
    fn is_healthy(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ResourceError> {
        println!("   Closing session to {}", self.target);
        Ok(())
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

fn open_session(_kind: &str, target: &str, _timeout: Duration) -> Result<Session, ResourceError> {
    Ok(Session {
        target: target.to_string(),
        features: HashMap::new(),
        properties: HashMap::new(),
    })
}

fn main() {
    println!("=== EsoxSolutions.ConnectionPool - Basic Examples ===\n");

    // Example 1: Borrow and return
    borrow_and_return();

    // Example 2: Exhaustion
    exhaustion();

    // Example 3: Defaults and overrides
    defaults_and_overrides();

    // Example 4: Metrics and health
    metrics_and_health();
}

fn pool(max: usize) -> Pool<Session> {
    let config = PoolConfiguration::new("memory", "demo.db")
        .with_min_size(0)
        .with_max_size(max)
        .with_idle_timeout(Duration::from_secs(30));
    Pool::new(config, open_session).unwrap()
}

fn borrow_and_return() {
    println!("1. Borrow and Return:");
    let pool = pool(4);

    {
        let session = pool.borrow().unwrap();
        println!("   Got session {}", session.id());
        // Session automatically returned when dropped
    }

    println!("   Idle after return: {}\n", pool.idle());
}

fn exhaustion() {
    println!("2. Exhaustion:");
    let pool = pool(2);

    let first = pool.borrow().unwrap();
    let _second = pool.borrow().unwrap();

    match pool.borrow() {
        Err(PoolError::PoolExhausted { kind }) => println!("   Pool for '{}' exhausted", kind),
        other => println!("   Unexpected: {:?}", other.map(|s| s.id())),
    }

    pool.give_back(first).unwrap();
    println!("   Available after one return: {}\n", pool.available());
}

fn defaults_and_overrides() {
    println!("3. Defaults and Overrides:");
    let pool = pool(2);
    pool.set_default_feature("autoCommit", true).unwrap();
    pool.set_default_property("fetchSize", 100_i64).unwrap();

    {
        let session = pool.borrow_with_feature("readOnly", true).unwrap();
        println!("   readOnly during borrow: {}", session.feature("readOnly").unwrap());
        println!("   autoCommit: {}", session.feature("autoCommit").unwrap());
    }

    let session = pool.borrow().unwrap();
    println!("   readOnly after return: {}", session.feature("readOnly").unwrap());

    if let Err(err) = pool.set_default_feature("autoCommit", false) {
        println!("   Late default rejected: {}\n", err);
    }
}

fn metrics_and_health() {
    println!("4. Metrics and Health:");
    let pool = pool(4);
    pool.warm_up(2).unwrap();

    let _session = pool.borrow().unwrap();

    let health = pool.get_health_status();
    println!("   Healthy: {}", health.is_healthy());
    println!("   Utilization: {:.1}%", health.utilization * 100.0);

    let metrics = pool.get_metrics();
    println!("   Created: {}", metrics.total_created);
    println!("   Borrowed: {}", metrics.total_borrowed);

    let output = pool.export_metrics_prometheus("demo", None).unwrap();
    println!("   Prometheus lines: {}", output.lines().count());
}
