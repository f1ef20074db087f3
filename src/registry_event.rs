/// Why an instance was torn down outside of `shutdown_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The idle timer expired without a refresh.
    Idle,
    /// [`AcquireHandle::stop`](crate::AcquireHandle::stop) was called.
    Explicit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Idle => write!(f, "idle"),
            StopReason::Explicit => write!(f, "explicit"),
        }
    }
}

/// Lifecycle events emitted by the registry.
///
/// These events are passed to the tracing callback set via `set_trace_callback`.
/// They are purely observational; the callback cannot influence the registry.
///
/// # Examples
///
/// ```rust
/// use cold_start::RegistryEvent;
///
/// let event = RegistryEvent::Refresh { name: "db".to_string() };
/// assert_eq!(event.to_string(), "refresh:db");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A definition was accepted.
    Define { name: String },

    /// `start` is about to be invoked for a name with no live instance.
    Start { name: String },

    /// `start` failed; the name stays absent.
    StartFailed { name: String },

    /// A cached instance was returned and its idle timer reset.
    Refresh { name: String },

    /// An instance is being torn down.
    Stop { name: String, reason: StopReason },

    /// An instance is being torn down by `shutdown_all`.
    Shutdown { name: String },

    /// A `stop` routine failed.
    StopFailed { name: String },
}

impl RegistryEvent {
    /// The resource name this event refers to.
    pub fn name(&self) -> &str {
        match self {
            RegistryEvent::Define { name }
            | RegistryEvent::Start { name }
            | RegistryEvent::StartFailed { name }
            | RegistryEvent::Refresh { name }
            | RegistryEvent::Stop { name, .. }
            | RegistryEvent::Shutdown { name }
            | RegistryEvent::StopFailed { name } => name,
        }
    }
}

impl std::fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryEvent::Define { name } => write!(f, "define:{}", name),
            RegistryEvent::Start { name } => write!(f, "start:{}", name),
            RegistryEvent::StartFailed { name } => write!(f, "start-failed:{}", name),
            RegistryEvent::Refresh { name } => write!(f, "refresh:{}", name),
            RegistryEvent::Stop { name, reason } => write!(f, "stop:{} ({})", name, reason),
            RegistryEvent::Shutdown { name } => write!(f, "shutdown:{}", name),
            RegistryEvent::StopFailed { name } => write!(f, "stop-failed:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_event_display() {
        let event = RegistryEvent::Start {
            name: "db".to_string(),
        };
        assert_eq!(event.to_string(), "start:db");

        let event = RegistryEvent::Stop {
            name: "db".to_string(),
            reason: StopReason::Idle,
        };
        assert_eq!(event.to_string(), "stop:db (idle)");

        let event = RegistryEvent::Shutdown {
            name: "cache".to_string(),
        };
        assert_eq!(event.to_string(), "shutdown:cache");
    }

    #[test]
    fn test_registry_event_name() {
        let event = RegistryEvent::Stop {
            name: "queue".to_string(),
            reason: StopReason::Explicit,
        };
        assert_eq!(event.name(), "queue");
    }

    #[test]
    fn test_registry_event_clone() {
        let event = RegistryEvent::Define {
            name: "db".to_string(),
        };
        assert_eq!(event.clone(), event);
    }
}
