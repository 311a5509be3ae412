//! Pooling policies and the optional capabilities of pooled types

use crate::errors::PoolResult;

/// Decides how pooled objects are created and whether a returned object may be reused.
pub trait PooledObjectPolicy<T>: Send + Sync {
    /// Create a new instance for the pool.
    fn create(&self) -> PoolResult<T>;

    /// Prepare a returned instance for reuse. `false` means it must be discarded.
    fn return_object(&self, obj: &mut T) -> bool;
}

/// Objects that can bring themselves back into a clean, reusable state.
pub trait Resettable {
    /// Reset the object. Returning `false` tells the pool to discard it.
    fn try_reset(&mut self) -> bool;
}

/// Objects that hold resources which must be released explicitly.
pub trait Disposable {
    fn dispose(&mut self);
}

/// Capability set declared for a pooled type.
///
/// Rust has no runtime interface checks, so a type's capabilities are declared
/// once (usually at registration) and carried around as function pointers.
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{Capabilities, Resettable};
///
/// struct Buffer(Vec<u8>);
///
/// impl Resettable for Buffer {
///     fn try_reset(&mut self) -> bool {
///         self.0.clear();
///         true
///     }
/// }
///
/// let caps = Capabilities::<Buffer>::new().resettable();
/// assert!(caps.is_resettable());
/// assert!(!caps.is_disposable());
/// ```
pub struct Capabilities<T> {
    reset: Option<fn(&mut T) -> bool>,
    dispose: Option<fn(&mut T)>,
}

impl<T> Capabilities<T> {
    /// No capabilities: always reusable, never disposed.
    pub fn new() -> Self {
        Self {
            reset: None,
            dispose: None,
        }
    }

    pub fn resettable(mut self) -> Self
    where
        T: Resettable,
    {
        self.reset = Some(T::try_reset);
        self
    }

    pub fn disposable(mut self) -> Self
    where
        T: Disposable,
    {
        self.dispose = Some(T::dispose);
        self
    }

    pub fn is_resettable(&self) -> bool {
        self.reset.is_some()
    }

    pub fn is_disposable(&self) -> bool {
        self.dispose.is_some()
    }

    /// Run the reset hook, defaulting to "reusable" when the type has none.
    pub fn reset(&self, obj: &mut T) -> bool {
        match self.reset {
            Some(reset) => reset(obj),
            None => true,
        }
    }

    pub(crate) fn dispose_hook(&self) -> Option<fn(&mut T)> {
        self.dispose
    }

    /// Run the disposal hook, if any.
    pub fn dispose(&self, obj: &mut T) {
        if let Some(dispose) = self.dispose {
            dispose(obj);
        }
    }
}

impl<T> Default for Capabilities<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Capabilities<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Capabilities<T> {}

impl<T> std::fmt::Debug for Capabilities<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("resettable", &self.is_resettable())
            .field("disposable", &self.is_disposable())
            .finish()
    }
}

/// Policy built from plain functions: a constructor plus a reset hook.
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{DefaultObjectPool, FnPolicy, ObjectPool};
///
/// let policy = FnPolicy::new(|| Ok(String::with_capacity(64)))
///     .with_reset(|s: &mut String| {
///         s.clear();
///         true
///     });
/// let pool = DefaultObjectPool::<String, _>::new(policy, 8);
///
/// let mut s = pool.get().unwrap();
/// s.push_str("hello");
/// pool.return_object(s);
/// assert!(pool.get().unwrap().is_empty());
/// ```
pub struct FnPolicy<T> {
    create: Box<dyn Fn() -> PoolResult<T> + Send + Sync>,
    reset: Box<dyn Fn(&mut T) -> bool + Send + Sync>,
}

impl<T> FnPolicy<T> {
    pub fn new<F>(create: F) -> Self
    where
        F: Fn() -> PoolResult<T> + Send + Sync + 'static,
    {
        Self {
            create: Box::new(create),
            reset: Box::new(|_| true),
        }
    }

    pub fn with_reset<R>(mut self, reset: R) -> Self
    where
        R: Fn(&mut T) -> bool + Send + Sync + 'static,
    {
        self.reset = Box::new(reset);
        self
    }
}

impl<T> PooledObjectPolicy<T> for FnPolicy<T> {
    fn create(&self) -> PoolResult<T> {
        (self.create)()
    }

    fn return_object(&self, obj: &mut T) -> bool {
        (self.reset)(obj)
    }
}

/// Policy for `Default` types with no reset logic.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl<T: Default> PooledObjectPolicy<T> for DefaultPolicy {
    fn create(&self) -> PoolResult<T> {
        Ok(T::default())
    }

    fn return_object(&self, _obj: &mut T) -> bool {
        true
    }
}
