//! Resource definitions.
//!
//! A [`Definition`] collects the four pieces the registry needs for one named
//! resource: a `start` factory, a `stop` teardown, a `name` and an idle
//! `duration`. Every field is optional while building; [`Registry::define`]
//! validates them in a fixed order before anything is created.
//!
//! [`Registry::define`]: crate::Registry::define

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use crate::{BoxError, DefinitionField, RegistryError};

pub(crate) type StartFn<T, O> =
    Arc<dyn Fn(O) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>;

pub(crate) type StopFn<T> =
    Arc<dyn Fn(Arc<T>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A `stop` routine with its instance already captured.
pub(crate) type BoundStop = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Caller-supplied configuration for one named lazy resource.
///
/// `T` is the instance type produced by `start`, `O` the per-call options
/// passed to `start` on first acquisition.
///
/// # Examples
///
/// ```rust
/// use cold_start::{BoxError, Definition};
/// use std::time::Duration;
///
/// let definition = Definition::new()
///     .name("greeting")
///     .start(|_: ()| async { Ok::<_, BoxError>("hello".to_string()) })
///     .stop(|_greeting| async { Ok::<_, BoxError>(()) })
///     .duration(Duration::from_secs(30));
/// ```
pub struct Definition<T, O = ()> {
    name: Option<String>,
    start: Option<StartFn<T, O>>,
    stop: Option<StopFn<T>>,
    duration: Option<Duration>,
}

impl<T, O> Default for Definition<T, O> {
    fn default() -> Self {
        Self {
            name: None,
            start: None,
            stop: None,
            duration: None,
        }
    }
}

impl<T, O> fmt::Debug for Definition<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("start", &self.start.is_some())
            .field("stop", &self.stop.is_some())
            .field("duration", &self.duration)
            .finish()
    }
}

impl<T, O> Definition<T, O>
where
    T: Send + Sync + 'static,
    O: Send + 'static,
{
    /// Create an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unique name of the resource.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the factory invoked on first acquisition.
    pub fn start<F, Fut, E>(mut self, start: F) -> Self
    where
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.start = Some(Arc::new(move |opts: O| {
            let fut = start(opts);
            async move { fut.await.map_err(Into::into) }.boxed()
        }));
        self
    }

    /// Set the teardown invoked once per created instance.
    pub fn stop<F, Fut, E>(mut self, stop: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.stop = Some(Arc::new(move |instance: Arc<T>| {
            let fut = stop(instance);
            async move { fut.await.map_err(Into::into) }.boxed()
        }));
        self
    }

    /// Set how long an instance may stay unused before it is torn down.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Check required fields in order: `start`, `stop`, `name`, `duration`.
    pub(crate) fn validate(self) -> Result<Lifecycle<T, O>, RegistryError> {
        let start = self
            .start
            .ok_or(RegistryError::MissingField(DefinitionField::Start))?;
        let stop = self
            .stop
            .ok_or(RegistryError::MissingField(DefinitionField::Stop))?;
        let name = self
            .name
            .ok_or(RegistryError::MissingField(DefinitionField::Name))?;
        let duration = self
            .duration
            .ok_or(RegistryError::MissingField(DefinitionField::Duration))?;

        Ok(Lifecycle {
            name,
            start,
            stop,
            duration,
        })
    }
}

/// A validated definition.
pub(crate) struct Lifecycle<T, O> {
    pub(crate) name: String,
    pub(crate) start: StartFn<T, O>,
    pub(crate) stop: StopFn<T>,
    pub(crate) duration: Duration,
}

impl<T: Send + Sync + 'static, O> Lifecycle<T, O> {
    /// Capture `instance` so teardown can later run with no arguments.
    pub(crate) fn bind_stop(&self, instance: Arc<T>) -> BoundStop {
        let stop = Arc::clone(&self.stop);
        Box::new(move || stop(instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_start(_: ()) -> futures::future::Ready<Result<u8, BoxError>> {
        futures::future::ready(Ok(1))
    }

    fn noop_stop(_: Arc<u8>) -> futures::future::Ready<Result<(), BoxError>> {
        futures::future::ready(Ok(()))
    }

    fn missing(definition: Definition<u8>) -> DefinitionField {
        match definition.validate() {
            Err(RegistryError::MissingField(field)) => field,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("definition should be rejected"),
        }
    }

    #[test]
    fn test_empty_definition_reports_start_first() {
        assert_eq!(missing(Definition::new()), DefinitionField::Start);
    }

    #[test]
    fn test_validation_order() {
        let definition = Definition::new()
            .name("mock")
            .duration(Duration::from_millis(50))
            .start(noop_start);
        assert_eq!(missing(definition), DefinitionField::Stop);

        let definition = Definition::new()
            .duration(Duration::from_millis(50))
            .start(noop_start)
            .stop(noop_stop);
        assert_eq!(missing(definition), DefinitionField::Name);

        let definition = Definition::new()
            .name("mock")
            .start(noop_start)
            .stop(noop_stop);
        assert_eq!(missing(definition), DefinitionField::Duration);
    }

    #[test]
    fn test_complete_definition_validates() {
        let lifecycle = Definition::new()
            .name("mock")
            .start(noop_start)
            .stop(noop_stop)
            .duration(Duration::ZERO)
            .validate()
            .unwrap();

        assert_eq!(lifecycle.name, "mock");
        assert_eq!(lifecycle.duration, Duration::ZERO);
    }

    #[test]
    fn test_bound_stop_captures_instance() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();

        let lifecycle = Definition::<u8>::new()
            .name("mock")
            .start(noop_start)
            .stop(move |instance| {
                *seen_clone.lock().unwrap() = Some(*instance);
                futures::future::ready(Ok::<_, BoxError>(()))
            })
            .duration(Duration::from_secs(1))
            .validate()
            .unwrap();

        let bound = lifecycle.bind_stop(Arc::new(7));
        futures::executor::block_on(bound()).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }

    #[test]
    fn test_debug_hides_closures() {
        let definition = Definition::<u8>::new().name("mock").start(noop_start);
        let rendered = format!("{:?}", definition);
        assert!(rendered.contains("name: Some(\"mock\")"));
        assert!(rendered.contains("start: true"));
        assert!(rendered.contains("stop: false"));
    }
}
