//! Pool configuration options

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Capacity used for pooled types that were never configured.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// Options for a single pool
///
/// # Examples
///
/// ```
/// use scoped_objectpool::PoolOptions;
///
/// let options = PoolOptions::new().with_capacity(64);
/// assert_eq!(options.capacity, 64);
/// assert_eq!(PoolOptions::default().capacity, 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolOptions {
    /// Maximum number of idle objects the pool retains
    #[cfg_attr(feature = "serde", serde(default = "default_capacity"))]
    pub capacity: usize,
}

#[cfg(feature = "serde")]
fn default_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl PoolOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

type ConfigureAction = Arc<dyn Fn(&mut PoolOptions) + Send + Sync>;

/// Named pool options, keyed by the pooled type's fully-qualified name.
///
/// Configure actions run in registration order on top of the registry default.
/// A resolved value is cached, so later configuration does not change options
/// that were already handed out.
pub(crate) struct PoolOptionsRegistry {
    defaults: PoolOptions,
    actions: HashMap<String, Vec<ConfigureAction>>,
    resolved: RwLock<HashMap<String, PoolOptions>>,
}

impl PoolOptionsRegistry {
    pub fn new(defaults: PoolOptions) -> Self {
        Self {
            defaults,
            actions: HashMap::new(),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_defaults(&mut self, defaults: PoolOptions) {
        self.defaults = defaults;
    }

    pub fn configure(&mut self, name: &str, action: ConfigureAction) {
        self.actions.entry(name.to_string()).or_default().push(action);
    }

    pub fn get(&self, name: &str) -> PoolOptions {
        if let Some(options) = self.resolved.read().get(name) {
            return *options;
        }

        let mut options = self.defaults;
        if let Some(actions) = self.actions.get(name) {
            for action in actions {
                action(&mut options);
            }
        }

        *self
            .resolved
            .write()
            .entry(name.to_string())
            .or_insert(options)
    }
}

impl Default for PoolOptionsRegistry {
    fn default() -> Self {
        Self::new(PoolOptions::default())
    }
}
