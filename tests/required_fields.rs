//! Integration tests for definition validation and name uniqueness.
//!
//! Required fields are checked in a fixed order (`start`, `stop`, `name`,
//! `duration`) and the first missing one is reported.

use cold_start::{BoxError, Definition, DefinitionField, Registry, RegistryError};
use std::sync::Arc;
use std::time::Duration;

const DURATION: Duration = Duration::from_millis(50);

async fn start(_: ()) -> Result<u32, BoxError> {
    Ok(1)
}

async fn stop(_: Arc<u32>) -> Result<(), BoxError> {
    Ok(())
}

fn message(result: Result<cold_start::AcquireHandle<u32>, RegistryError>) -> String {
    match result {
        Err(err) => err.to_string(),
        Ok(handle) => panic!("{} should have been rejected", handle.name()),
    }
}

#[test]
fn test_required_arguments() {
    let registry = Registry::new();

    assert_eq!(
        message(registry.define(Definition::new())),
        "Need to define `start` method."
    );

    assert_eq!(
        message(registry.define(Definition::new().start(start))),
        "Need to define `stop` method."
    );

    assert_eq!(
        message(registry.define(Definition::new().start(start).stop(stop))),
        "Need to define a `name`."
    );

    assert_eq!(
        message(registry.define(Definition::new().name("mock").start(start).stop(stop))),
        "Need to define a `duration`."
    );

    let handle = registry
        .define(
            Definition::new()
                .name("mock")
                .start(start)
                .stop(stop)
                .duration(DURATION),
        )
        .unwrap();
    assert_eq!(handle.name(), "mock");
    assert_eq!(handle.duration(), DURATION);
}

#[test]
fn test_first_missing_field_wins() {
    let registry = Registry::new();

    // Only `duration` is set, so `start` is reported even though everything else is missing too.
    let result = registry.define(Definition::<u32>::new().duration(DURATION));
    assert!(matches!(
        result,
        Err(RegistryError::MissingField(DefinitionField::Start))
    ));
}

#[test]
fn test_rejected_definition_does_not_reserve_name() {
    let registry = Registry::new();

    let result = registry.define(Definition::new().name("mock").start(start).stop(stop));
    assert!(result.is_err());
    assert!(!registry.is_defined("mock"));

    let handle = registry.define(
        Definition::new()
            .name("mock")
            .start(start)
            .stop(stop)
            .duration(DURATION),
    );
    assert!(handle.is_ok());
}

#[test]
fn test_name_unique_before_acquisition() {
    let registry = Registry::new();
    let definition = || {
        Definition::new()
            .name("mock")
            .start(start)
            .stop(stop)
            .duration(DURATION)
    };

    registry.define(definition()).unwrap();

    let err = registry.define(definition()).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "name `mock` already used.");
}

#[tokio::test]
async fn test_name_unique_after_acquisition() {
    let registry = Registry::new();
    let definition = || {
        Definition::new()
            .name("mock")
            .start(start)
            .stop(stop)
            .duration(DURATION)
    };

    let handle = registry.define(definition()).unwrap();
    handle.acquire().await.unwrap();

    assert_eq!(
        message(registry.define(definition())),
        "name `mock` already used."
    );

    registry.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_define_creates_nothing() {
    let registry = Registry::new();
    let started = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let started_clone = started.clone();

    registry
        .define(
            Definition::new()
                .name("lazy")
                .start(move |_: ()| {
                    started_clone.store(true, std::sync::atomic::Ordering::SeqCst);
                    async { Ok::<_, BoxError>(()) }
                })
                .stop(|_| async { Ok::<_, BoxError>(()) })
                .duration(DURATION),
        )
        .unwrap();

    assert!(registry.is_defined("lazy"));
    assert!(!registry.contains("lazy"));
    assert!(!started.load(std::sync::atomic::Ordering::SeqCst));
}
