//! Error types for the object pool

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("No constructor registered for {type_name}")]
    ServiceNotRegistered { type_name: &'static str },

    #[error("Circular dependency detected while resolving {type_name}")]
    CircularDependency { type_name: &'static str },

    #[error("Failed to construct {type_name}: {message}")]
    Construction {
        type_name: &'static str,
        message: String,
    },

    #[error("Service provider has been dropped")]
    ProviderDisposed,

    #[error("Pooled {type_name} is already lent out in this scope")]
    ScopedReentrancy { type_name: &'static str },

    #[error("Pooled {type_name} is in use by another thread in this scope")]
    ScopeBusy { type_name: &'static str },
}

impl PoolError {
    /// Convenience constructor for failures reported by a service constructor.
    pub fn construction<T: ?Sized>(message: impl Into<String>) -> Self {
        PoolError::Construction {
            type_name: std::any::type_name::<T>(),
            message: message.into(),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
