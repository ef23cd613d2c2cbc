// EsoxSolutions.ConnectionPool
// Thread-safe pool of reusable connection-like resources

// This is just a binary wrapper - the actual library is in lib.rs
// Run examples with: cargo run --example basic

use esox_connectionpool::{Pool, PoolConfiguration, PropertyValue, Resource, ResourceError};
use std::time::Duration;

struct EchoSession {
    open: bool,
}

impl Resource for EchoSession {
    fn is_healthy(&self) -> bool {
        self.open
    }

    fn reset(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ResourceError> {
        self.open = false;
        Ok(())
    }

    fn feature(&self, name: &str) -> Result<bool, ResourceError> {
        Err(format!("unknown feature {}", name).into())
    }

    fn set_feature(&mut self, name: &str, _value: bool) -> Result<(), ResourceError> {
        Err(format!("unknown feature {}", name).into())
    }

    fn property(&self, name: &str) -> Result<PropertyValue, ResourceError> {
        Err(format!("unknown property {}", name).into())
    }

    fn set_property(&mut self, name: &str, _value: PropertyValue) -> Result<(), ResourceError> {
        Err(format!("unknown property {}", name).into())
    }
}

fn main() {
    println!("=== EsoxSolutions.ConnectionPool ===");
    println!("See demos/ directory for usage examples");
    println!("Run: cargo run --example basic");
    println!();

    println!("Quick Demo:");
    let config = PoolConfiguration::new("echo", "localhost").with_max_size(2);
    let factory = |_: &str, _: &str, _: Duration| Ok::<_, ResourceError>(EchoSession { open: true });

    let pool = match Pool::new(config, factory) {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("  Failed to create pool: {}", err);
            return;
        }
    };

    match pool.borrow() {
        Ok(session) => println!("  Borrowed session {}", session.id()),
        Err(err) => println!("  Borrow failed: {}", err),
    }

    println!("  Idle after return: {}", pool.idle());
    pool.shutdown();
    println!("  Available after shutdown: {}", pool.available());
}
