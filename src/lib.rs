//! # Scoped Object Pool
//!
//! Bounded, thread-safe object pools with pluggable creation and reset
//! policies, wired into a small service provider that keeps one pool per
//! pooled type.
//!
//! ## Features
//!
//! - Lock-free idle cache with a hard capacity bound
//! - Pluggable [`PooledObjectPolicy`] for creation and reuse checks
//! - Optional [`Resettable`] and [`Disposable`] capabilities per type
//! - Disposing pool variant for types that own resources
//! - Per-type capacity configuration (default 1024)
//! - Scope-bound checkouts returned exactly once via RAII
//! - Metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use scoped_objectpool::{ObjectPool, ServiceCollection};
//!
//! let mut services = ServiceCollection::new();
//! services.add_transient(|_| Ok(String::with_capacity(1024)));
//! services.add_object_pools();
//! let provider = services.build();
//!
//! let pool = provider.pool::<String>().unwrap();
//! let mut s = pool.get().unwrap();
//! s.push_str("hello");
//! pool.return_object(s);
//! assert_eq!(pool.idle_count(), 1);
//! ```

mod pool;
mod config;
mod metrics;
mod policy;
mod factory;
mod services;
mod errors;

pub use pool::{ObjectPool, DefaultObjectPool, DisposableObjectPool, Pooled};
pub use config::{PoolOptions, DEFAULT_POOL_CAPACITY};
pub use metrics::{PoolMetrics, MetricsExporter};
pub use policy::{PooledObjectPolicy, Resettable, Disposable, Capabilities, FnPolicy, DefaultPolicy};
pub use factory::{ObjectPoolFactory, DependencyInjectionPolicy};
pub use services::{ServiceCollection, ServiceProvider, ServiceScope, Registration};
pub use errors::{PoolError, PoolResult};
