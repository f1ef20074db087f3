//! Lazy, named resources with idle-timeout teardown.
//!
//! A [`Registry`] owns a mapping from name to live instance. Each name moves
//! through `absent -> initializing -> active -> tearing-down -> absent`:
//!
//! - [`Registry::define`] reserves a name and hands back an [`AcquireHandle`].
//! - The first [`AcquireHandle::acquire`] runs `start`; later calls return the
//!   cached instance and push its idle deadline out by the full duration.
//! - When the deadline passes without a refresh, the entry is removed and its
//!   `stop` runs. [`Registry::shutdown_all`] does the same for every live entry.
//!
//! Removal from the mapping happens before `stop` runs. An acquire that comes
//! in while an old instance is still stopping creates a fresh one.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::definition::{BoundStop, Definition, Lifecycle};
use crate::{RegistryError, RegistryEvent, StopReason, TeardownFailure};

/// Callback receiving every lifecycle event.
pub type TraceCallback = dyn Fn(&RegistryEvent) + Send + Sync + 'static;

/// Callback receiving `stop` failures that have no caller to return to.
pub type ErrorCallback = dyn Fn(&TeardownFailure) + Send + Sync + 'static;

// -------------------------------------------------------------------------------------------------
// Internal state
// -------------------------------------------------------------------------------------------------

/// A live instance.
struct Entry {
    id: u64,
    instance: Arc<dyn Any + Send + Sync>,
    stop: BoundStop,
    duration: Duration,
    deadline: Instant,
    timer: JoinHandle<()>,
}

enum Slot {
    /// `start` is in flight. The receiver resolves once the starting caller is done.
    Initializing(watch::Receiver<()>),
    Active(Entry),
}

#[derive(Default)]
struct State {
    defined: HashSet<String>,
    slots: HashMap<String, Slot>,
}

/// What the idle timer finds when it wakes up.
enum Expiry {
    /// The entry was replaced, stopped or shut down in the meantime.
    Gone,
    Refreshed(Instant),
    Expired(Entry),
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    trace: Mutex<Option<Arc<TraceCallback>>>,
    on_error: Mutex<Option<Arc<ErrorCallback>>>,
    next_id: AtomicU64,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // State is only mutated in short, non-panicking sections.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn emit_event(&self, event: RegistryEvent) {
        let callback = self
            .trace
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(&event);
        }
    }

    fn report_failure(&self, failure: &TeardownFailure) {
        warn!("Failed to stop {}: {}", failure.name, failure.source);
        self.emit_event(RegistryEvent::StopFailed {
            name: failure.name.clone(),
        });

        let callback = self
            .on_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(failure);
        }
    }

    fn take_expired(&self, name: &str, id: u64) -> Expiry {
        let mut state = self.lock_state();
        let deadline = match state.slots.get(name) {
            Some(Slot::Active(entry)) if entry.id == id => entry.deadline,
            _ => return Expiry::Gone,
        };

        if deadline > Instant::now() {
            return Expiry::Refreshed(deadline);
        }

        match state.slots.remove(name) {
            Some(Slot::Active(entry)) => Expiry::Expired(entry),
            _ => Expiry::Gone,
        }
    }

    /// Remove the active entry for `name`, if any, and cancel its timer.
    fn take_active(&self, name: &str) -> Option<Entry> {
        let mut state = self.lock_state();
        if !matches!(state.slots.get(name), Some(Slot::Active(_))) {
            return None;
        }

        match state.slots.remove(name) {
            Some(Slot::Active(entry)) => {
                entry.timer.abort();
                Some(entry)
            }
            _ => None,
        }
    }
}

/// Sleeps until the entry's deadline, following refreshes, then tears it down.
async fn idle_timer(inner: Arc<Inner>, name: String, id: u64) {
    let mut deadline = match inner.lock_state().slots.get(&name) {
        Some(Slot::Active(entry)) if entry.id == id => entry.deadline,
        _ => return,
    };

    let entry = loop {
        time::sleep_until(deadline).await;
        match inner.take_expired(&name, id) {
            Expiry::Gone => return,
            Expiry::Refreshed(next) => deadline = next,
            Expiry::Expired(entry) => break entry,
        }
    };

    debug!("Stopping idle resource: {}", name);
    inner.emit_event(RegistryEvent::Stop {
        name: name.clone(),
        reason: StopReason::Idle,
    });

    if let Err(source) = (entry.stop)().await {
        inner.report_failure(&TeardownFailure { name, source });
    }
}

/// Clears the `Initializing` slot if the starting caller never installs an entry,
/// either because `start` failed or because its future was dropped.
///
/// Waiters are released when the sender is dropped, after `Drop::drop` has run.
struct InitGuard {
    inner: Arc<Inner>,
    name: String,
    armed: bool,
    _done: watch::Sender<()>,
}

impl InitGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.lock_state();
        if matches!(state.slots.get(&self.name), Some(Slot::Initializing(_))) {
            state.slots.remove(&self.name);
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Registry
// -------------------------------------------------------------------------------------------------

/// A registry of lazily started, idle-evicted resources.
///
/// Cloning is cheap; clones share the same mapping. Separate registries are
/// fully isolated from each other.
///
/// Idle timers run as tokio tasks, so acquisitions must happen inside a tokio
/// runtime.
///
/// # Examples
///
/// ```rust
/// use cold_start::{BoxError, Definition, Registry};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), cold_start::RegistryError> {
/// let registry = Registry::new();
///
/// let greeting = registry.define(
///     Definition::new()
///         .name("greeting")
///         .start(|_: ()| async { Ok::<_, BoxError>("hello".to_string()) })
///         .stop(|_greeting| async { Ok::<_, BoxError>(()) })
///         .duration(Duration::from_secs(30)),
/// )?;
///
/// let first = greeting.acquire().await?;
/// let second = greeting.acquire().await?;
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
///
/// registry.shutdown_all().await?;
/// assert!(registry.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("active", &self.names())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------------------------------
    // Tracing
    // ---------------------------------------------------------------------------------------------

    /// Set a callback invoked for every lifecycle event.
    ///
    /// The callback runs without any registry lock held, so it may call back
    /// into the registry.
    pub fn set_trace_callback(&self, callback: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        let mut guard = self.inner.trace.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Arc::new(callback));
    }

    /// Clear the tracing callback.
    pub fn clear_trace_callback(&self) {
        let mut guard = self.inner.trace.lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    /// Set a callback for `stop` failures of idle-expired instances.
    ///
    /// Those failures have no caller to return to. Without a callback they are
    /// only logged and emitted as [`RegistryEvent::StopFailed`].
    pub fn set_error_callback(&self, callback: impl Fn(&TeardownFailure) + Send + Sync + 'static) {
        let mut guard = self
            .inner
            .on_error
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        *guard = Some(Arc::new(callback));
    }

    /// Clear the error callback.
    pub fn clear_error_callback(&self) {
        let mut guard = self
            .inner
            .on_error
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    // ---------------------------------------------------------------------------------------------
    // Definitions
    // ---------------------------------------------------------------------------------------------

    /// Register a definition and return the handle used to acquire its instance.
    ///
    /// Nothing is started here.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::MissingField`] for the first missing field, checked in
    ///   the order `start`, `stop`, `name`, `duration`
    /// - [`RegistryError::NameAlreadyUsed`] if the name was defined before on
    ///   this registry, whether or not it was ever acquired
    pub fn define<T, O>(
        &self,
        definition: Definition<T, O>,
    ) -> Result<AcquireHandle<T, O>, RegistryError>
    where
        T: Send + Sync + 'static,
        O: Send + 'static,
    {
        let lifecycle = definition.validate()?;

        {
            let mut state = self.inner.lock_state();
            if state.defined.contains(&lifecycle.name) {
                return Err(RegistryError::NameAlreadyUsed {
                    name: lifecycle.name,
                });
            }
            state.defined.insert(lifecycle.name.clone());
        }

        debug!("Defined resource: {}", lifecycle.name);
        self.inner.emit_event(RegistryEvent::Define {
            name: lifecycle.name.clone(),
        });

        Ok(AcquireHandle {
            registry: self.clone(),
            lifecycle: Arc::new(lifecycle),
        })
    }

    // ---------------------------------------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------------------------------------

    /// Check whether `name` has a live instance.
    pub fn contains(&self, name: &str) -> bool {
        matches!(
            self.inner.lock_state().slots.get(name),
            Some(Slot::Active(_))
        )
    }

    /// Check whether `name` has been defined on this registry.
    pub fn is_defined(&self, name: &str) -> bool {
        self.inner.lock_state().defined.contains(name)
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.inner
            .lock_state()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Active(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names with a live instance, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock_state()
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Active(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    // ---------------------------------------------------------------------------------------------
    // Shutdown
    // ---------------------------------------------------------------------------------------------

    /// Tear down every live instance concurrently.
    ///
    /// Entries are removed and their idle timers cancelled up front; each
    /// `stop` then runs exactly once. Instances created after this call begins,
    /// and starts still in flight, are left alone.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Shutdown`] listing every `stop` that failed. The
    /// remaining teardowns still run to completion.
    pub async fn shutdown_all(&self) -> Result<(), RegistryError> {
        let entries: Vec<(String, Entry)> = {
            let mut state = self.inner.lock_state();
            let names: Vec<String> = state
                .slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Active(_)))
                .map(|(name, _)| name.clone())
                .collect();

            names
                .into_iter()
                .filter_map(|name| match state.slots.remove(&name) {
                    Some(Slot::Active(entry)) => Some((name, entry)),
                    _ => None,
                })
                .collect()
        };

        for (_, entry) in &entries {
            entry.timer.abort();
        }

        let teardowns = entries.into_iter().map(|(name, entry)| {
            let inner = Arc::clone(&self.inner);
            async move {
                debug!("Shutting down resource: {}", name);
                inner.emit_event(RegistryEvent::Shutdown { name: name.clone() });
                match (entry.stop)().await {
                    Ok(()) => None,
                    Err(source) => {
                        let failure = TeardownFailure { name, source };
                        warn!("Failed to shutdown {}: {}", failure.name, failure.source);
                        inner.emit_event(RegistryEvent::StopFailed {
                            name: failure.name.clone(),
                        });
                        Some(failure)
                    }
                }
            }
        });

        let failures: Vec<TeardownFailure> = join_all(teardowns)
            .await
            .into_iter()
            .flatten()
            .collect();

        debug!("All resources shutdown");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Shutdown { failures })
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Acquisition
    // ---------------------------------------------------------------------------------------------

    async fn acquire<T, O>(
        &self,
        lifecycle: &Lifecycle<T, O>,
        opts: O,
    ) -> Result<Arc<T>, RegistryError>
    where
        T: Send + Sync + 'static,
        O: Send + 'static,
    {
        let name = &lifecycle.name;

        let mut guard = loop {
            let mut pending = {
                let mut state = self.inner.lock_state();
                let slot = state.slots.get_mut(name);
                match slot {
                    Some(Slot::Active(entry)) => {
                        entry.deadline = deadline_after(entry.duration);
                        let instance = Arc::clone(&entry.instance);
                        drop(state);

                        debug!("Refreshed resource: {}", name);
                        self.inner.emit_event(RegistryEvent::Refresh { name: name.clone() });
                        return downcast(name, instance);
                    }
                    Some(Slot::Initializing(pending)) => pending.clone(),
                    None => {
                        let (done, pending) = watch::channel(());
                        state.slots.insert(name.clone(), Slot::Initializing(pending));
                        break InitGuard {
                            inner: Arc::clone(&self.inner),
                            name: name.clone(),
                            armed: true,
                            _done: done,
                        };
                    }
                }
            };

            // Errors once the starting caller drops its sender; either way, look again.
            let _ = pending.changed().await;
        };

        debug!("Starting resource: {}", name);
        self.inner.emit_event(RegistryEvent::Start { name: name.clone() });

        let instance = match (lifecycle.start)(opts).await {
            Ok(instance) => Arc::new(instance),
            Err(source) => {
                drop(guard);
                warn!("Failed to start {}: {}", name, source);
                self.inner.emit_event(RegistryEvent::StartFailed { name: name.clone() });
                return Err(RegistryError::Start {
                    name: name.clone(),
                    source,
                });
            }
        };

        let stop = lifecycle.bind_stop(Arc::clone(&instance));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let erased: Arc<dyn Any + Send + Sync> = instance.clone();

        {
            let mut state = self.inner.lock_state();
            // The timer reads the entry under this lock, so it cannot observe the
            // slot before the entry is in place.
            let timer = tokio::spawn(idle_timer(Arc::clone(&self.inner), name.clone(), id));
            state.slots.insert(
                name.clone(),
                Slot::Active(Entry {
                    id,
                    instance: erased,
                    stop,
                    duration: lifecycle.duration,
                    deadline: deadline_after(lifecycle.duration),
                    timer,
                }),
            );
            guard.disarm();
        }
        drop(guard);

        Ok(instance)
    }

    async fn stop(&self, name: &str) -> Result<bool, RegistryError> {
        let Some(entry) = self.inner.take_active(name) else {
            return Ok(false);
        };

        debug!("Stopping resource: {}", name);
        self.inner.emit_event(RegistryEvent::Stop {
            name: name.to_string(),
            reason: StopReason::Explicit,
        });

        if let Err(source) = (entry.stop)().await {
            let failure = TeardownFailure {
                name: name.to_string(),
                source,
            };
            warn!("Failed to stop {}: {}", failure.name, failure.source);
            self.inner.emit_event(RegistryEvent::StopFailed {
                name: failure.name.clone(),
            });
            return Err(failure.into());
        }

        Ok(true)
    }
}

/// `now + duration`, capped about 30 years out so huge durations cannot overflow.
fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration).unwrap_or_else(|| now + FAR_FUTURE)
}

const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

// Names are unique per registry, so each slot only ever holds the `T` of its own
// `Lifecycle`; a mismatch here is unreachable.
fn downcast<T>(name: &str, instance: Arc<dyn Any + Send + Sync>) -> Result<Arc<T>, RegistryError>
where
    T: Send + Sync + 'static,
{
    instance
        .downcast::<T>()
        .map_err(|_| RegistryError::TypeMismatch {
            name: name.to_string(),
            type_name: std::any::type_name::<T>(),
        })
}

// -------------------------------------------------------------------------------------------------
// AcquireHandle
// -------------------------------------------------------------------------------------------------

/// Accessor for one defined resource, returned by [`Registry::define`].
///
/// Cloning is cheap; clones refer to the same name on the same registry.
pub struct AcquireHandle<T, O = ()> {
    registry: Registry,
    lifecycle: Arc<Lifecycle<T, O>>,
}

impl<T, O> Clone for AcquireHandle<T, O> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<T, O> fmt::Debug for AcquireHandle<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquireHandle")
            .field("name", &self.lifecycle.name)
            .field("duration", &self.lifecycle.duration)
            .finish()
    }
}

impl<T, O> AcquireHandle<T, O>
where
    T: Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn name(&self) -> &str {
        &self.lifecycle.name
    }

    pub fn duration(&self) -> Duration {
        self.lifecycle.duration
    }

    /// Check whether this resource currently has a live instance.
    pub fn is_active(&self) -> bool {
        self.registry.contains(&self.lifecycle.name)
    }

    /// Return the live instance, starting it with `opts` if there is none.
    ///
    /// A cached instance has its idle timer reset to the full duration and
    /// `opts` is dropped unused. If another caller is already starting this
    /// resource, this call waits for it instead of starting a second instance.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Start`] if `start` fails. Nothing is cached and a later
    /// call starts over.
    pub async fn acquire_with(&self, opts: O) -> Result<Arc<T>, RegistryError> {
        self.registry.acquire(&self.lifecycle, opts).await
    }

    /// Tear down the live instance now instead of waiting for the idle timer.
    ///
    /// Returns `Ok(false)` if there was nothing to stop.
    pub async fn stop(&self) -> Result<bool, RegistryError> {
        self.registry.stop(&self.lifecycle.name).await
    }
}

impl<T, O> AcquireHandle<T, O>
where
    T: Send + Sync + 'static,
    O: Default + Send + 'static,
{
    /// [`acquire_with`](Self::acquire_with) using default options.
    pub async fn acquire(&self) -> Result<Arc<T>, RegistryError> {
        self.acquire_with(O::default()).await
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
