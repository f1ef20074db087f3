//! Basic usage example for cold-start.
//!
//! Demonstrates:
//! - Defining a lazily started resource
//! - Reusing the cached instance while it is being acquired
//! - Idle teardown after the configured duration
//! - Shutting everything down at exit
//!
//! Run with: `RUST_LOG=cold_start=debug cargo run --example basic_usage`

use cold_start::{BoxError, Definition, Registry, RegistryError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// A stand-in for an expensive connection
#[derive(Debug)]
struct Connection {
    url: String,
    closed: AtomicBool,
}

async fn connect(url: String) -> Result<Connection, BoxError> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(Connection {
        url,
        closed: AtomicBool::new(false),
    })
}

async fn disconnect(conn: Arc<Connection>) -> Result<(), BoxError> {
    conn.closed.store(true, Ordering::SeqCst);
    println!("   [stop] closed {}", conn.url);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), RegistryError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== cold-start: Basic Usage ===\n");

    let registry = Registry::new();
    registry.set_trace_callback(|event| println!("   [event] {}", event));

    // -------------------------------------------------------------------------
    // 1. Define resources (nothing starts yet)
    // -------------------------------------------------------------------------
    println!("1. Defining resources...");

    let db = registry.define(
        Definition::new()
            .name("db")
            .start(connect)
            .stop(disconnect)
            .duration(Duration::from_millis(300)),
    )?;
    let cache = registry.define(
        Definition::new()
            .name("cache")
            .start(connect)
            .stop(disconnect)
            .duration(Duration::from_secs(60)),
    )?;

    println!("   live instances: {:?}", registry.names());

    // -------------------------------------------------------------------------
    // 2. First acquisition starts the resource, later ones reuse it
    // -------------------------------------------------------------------------
    println!("\n2. Acquiring...");

    let first = db.acquire_with("postgres://localhost".to_string()).await?;
    let second = db.acquire_with("ignored://on-cache-hit".to_string()).await?;
    println!("   same instance: {}", Arc::ptr_eq(&first, &second));

    cache.acquire_with("redis://localhost".to_string()).await?;
    println!("   live instances: {:?}", registry.names());

    // -------------------------------------------------------------------------
    // 3. Idle teardown
    // -------------------------------------------------------------------------
    println!("\n3. Waiting for `db` to go idle...");

    tokio::time::sleep(Duration::from_millis(400)).await;
    println!("   db closed: {}", first.closed.load(Ordering::SeqCst));
    println!("   live instances: {:?}", registry.names());

    // -------------------------------------------------------------------------
    // 4. Shutdown
    // -------------------------------------------------------------------------
    println!("\n4. Shutting down...");

    registry.shutdown_all().await?;
    println!("   live instances: {:?}", registry.names());

    println!("\n=== Example Complete ===");
    Ok(())
}
