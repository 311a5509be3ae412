//! Builds per-type pools backed by the service provider

use crate::config::PoolOptions;
use crate::errors::PoolResult;
use crate::policy::{Capabilities, PooledObjectPolicy};
use crate::pool::{DefaultObjectPool, DisposableObjectPool, ObjectPool};
use crate::services::{ServiceProvider, WeakServiceProvider};

use std::any::type_name;
use std::sync::Arc;
use tracing::debug;

/// Policy that resolves new instances from a [`ServiceProvider`] and resets
/// returned ones through the type's declared [`Resettable`](crate::Resettable)
/// capability.
pub struct DependencyInjectionPolicy<T> {
    provider: WeakServiceProvider,
    capabilities: Capabilities<T>,
}

impl<T: Send + 'static> DependencyInjectionPolicy<T> {
    pub fn new(provider: &ServiceProvider) -> Self {
        Self::with_capabilities(provider, provider.capabilities::<T>())
    }

    fn with_capabilities(provider: &ServiceProvider, capabilities: Capabilities<T>) -> Self {
        Self {
            provider: provider.downgrade(),
            capabilities,
        }
    }
}

impl<T: Send + 'static> PooledObjectPolicy<T> for DependencyInjectionPolicy<T> {
    fn create(&self) -> PoolResult<T> {
        self.provider.upgrade()?.resolve::<T>()
    }

    fn return_object(&self, obj: &mut T) -> bool {
        self.capabilities.reset(obj)
    }
}

/// Chooses the pool implementation for a pooled type.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectPoolFactory;

impl ObjectPoolFactory {
    /// Build the pool for `T`: a [`DisposableObjectPool`] when `T` declared the
    /// disposal capability, a [`DefaultObjectPool`] otherwise.
    pub fn create<T: Send + 'static>(
        &self,
        provider: &ServiceProvider,
        options: &PoolOptions,
    ) -> Arc<dyn ObjectPool<T>> {
        let capabilities = provider.capabilities::<T>();
        let policy = DependencyInjectionPolicy::with_capabilities(provider, capabilities);

        match capabilities.dispose_hook() {
            Some(dispose) => {
                debug!(pool = type_name::<T>(), "using disposable pool");
                Arc::new(DisposableObjectPool::with_dispose_hook(
                    policy,
                    options.capacity,
                    dispose,
                ))
            }
            None => Arc::new(DefaultObjectPool::new(policy, options.capacity)),
        }
    }
}
