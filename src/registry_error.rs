use std::fmt;

use thiserror::Error;

/// Boxed error returned by caller-supplied `start` and `stop` routines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A required field of a [`Definition`](crate::Definition).
///
/// Fields are validated in declaration order; the first missing one is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionField {
    Start,
    Stop,
    Name,
    Duration,
}

impl fmt::Display for DefinitionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionField::Start => write!(f, "`start` method"),
            DefinitionField::Stop => write!(f, "`stop` method"),
            DefinitionField::Name => write!(f, "a `name`"),
            DefinitionField::Duration => write!(f, "a `duration`"),
        }
    }
}

/// A `stop` routine that failed while tearing down an instance.
#[derive(Debug, Error)]
#[error("failed to stop `{name}`: {source}")]
pub struct TeardownFailure {
    pub name: String,
    #[source]
    pub source: BoxError,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Need to define {0}.")]
    MissingField(DefinitionField),

    #[error("name `{name}` already used.")]
    NameAlreadyUsed { name: String },

    #[error("failed to start `{name}`: {source}")]
    Start {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("instance of `{name}` is not a `{type_name}`")]
    TypeMismatch {
        name: String,
        type_name: &'static str,
    },

    #[error(transparent)]
    Teardown(#[from] TeardownFailure),

    #[error("{} teardown(s) failed during shutdown", failures.len())]
    Shutdown { failures: Vec<TeardownFailure> },
}

impl RegistryError {
    /// True for errors raised while validating a definition.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RegistryError::MissingField(_) | RegistryError::NameAlreadyUsed { .. }
        )
    }
}
