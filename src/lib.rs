//! # Cold Start
//!
//! A registry of lazily started resources that tear themselves down when idle.
//!
//! Register a named `start` factory and `stop` teardown once; the first
//! acquisition starts the resource, later acquisitions reuse it and reset its
//! idle timer, and a resource nobody asked for within its duration is stopped
//! and forgotten. Useful for connections or warmed caches shared by many
//! short-lived invocations.
//!
//! ## Quick Start
//!
//! ```rust
//! use cold_start::{BoxError, Definition, Registry};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), cold_start::RegistryError> {
//! let registry = Registry::new();
//!
//! let db = registry.define(
//!     Definition::new()
//!         .name("db")
//!         .start(|url: String| async move { Ok::<_, BoxError>(format!("connection to {url}")) })
//!         .stop(|_conn| async { Ok::<_, BoxError>(()) })
//!         .duration(Duration::from_secs(60)),
//! )?;
//!
//! let conn = db.acquire_with("postgres://localhost".to_string()).await?;
//! assert_eq!(&*conn, "connection to postgres://localhost");
//! assert!(registry.contains("db"));
//!
//! registry.shutdown_all().await?;
//! assert!(!registry.contains("db"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Lazy**: nothing starts until the first acquisition
//! - **Single-flight**: concurrent first acquisitions share one `start`
//! - **Idle eviction**: every acquisition resets the idle timer
//! - **Exactly-once teardown**: each instance is stopped once, by its timer,
//!   an explicit stop, or `shutdown_all`
//! - **Observable**: lifecycle events via a trace callback, plus `tracing` logs
//!
//! ## Main Types
//!
//! - [`Definition`] - Builder for a named resource
//! - [`Registry`] - Owns the live instances; [`Registry::define`], [`Registry::shutdown_all`]
//! - [`AcquireHandle`] - Returned by `define`; [`AcquireHandle::acquire`] gets the instance
//! - [`RegistryEvent`] - Lifecycle events for [`Registry::set_trace_callback`]
//! - [`RegistryError`] - Everything that can go wrong

mod definition;
mod registry;
mod registry_error;
mod registry_event;

pub use definition::Definition;
pub use registry::{AcquireHandle, ErrorCallback, Registry, TraceCallback};
pub use registry_error::{BoxError, DefinitionField, RegistryError, TeardownFailure};
pub use registry_event::{RegistryEvent, StopReason};
