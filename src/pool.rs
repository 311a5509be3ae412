//! Core object pool implementations

use crate::errors::PoolResult;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::policy::{Disposable, PooledObjectPolicy};

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::any::type_name;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// A pool of reusable objects.
///
/// `get` hands out an idle object or creates a new one; `return_object` gives
/// it back. Neither call ever waits for another thread.
pub trait ObjectPool<T>: Send + Sync {
    /// Take an idle object, or create one through the pool's policy.
    fn get(&self) -> PoolResult<T>;

    /// Give an object back. It is kept only if the policy accepts it and
    /// there is room; otherwise it is discarded.
    fn return_object(&self, obj: T);

    /// Maximum number of idle objects retained.
    fn capacity(&self) -> usize;

    /// Idle objects currently held.
    fn idle_count(&self) -> usize;

    fn metrics(&self) -> PoolMetrics;
}

/// Thread-safe pool retaining up to `capacity` idle objects
///
/// The most recently returned object sits in a single fast slot; the rest go
/// into a lock-free bounded queue sized `capacity - 1`, so the idle count can
/// never exceed `capacity`.
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{DefaultObjectPool, DefaultPolicy, ObjectPool};
///
/// let pool = DefaultObjectPool::<Vec<u8>, _>::new(DefaultPolicy, 2);
///
/// let a = pool.get().unwrap();
/// let b = pool.get().unwrap();
/// let c = pool.get().unwrap();
/// pool.return_object(a);
/// pool.return_object(b);
/// pool.return_object(c);
///
/// assert_eq!(pool.idle_count(), 2);
/// ```
pub struct DefaultObjectPool<T, P> {
    fast_item: Mutex<Option<T>>,
    items: Option<ArrayQueue<T>>,
    policy: P,
    capacity: usize,
    metrics: MetricsTracker,
}

impl<T, P> DefaultObjectPool<T, P>
where
    T: Send,
    P: PooledObjectPolicy<T>,
{
    /// Create an empty pool. A capacity of zero disables retention entirely.
    pub fn new(policy: P, capacity: usize) -> Self {
        let items = if capacity > 1 {
            Some(ArrayQueue::new(capacity - 1))
        } else {
            None
        };

        Self {
            fast_item: Mutex::new(None),
            items,
            policy,
            capacity,
            metrics: MetricsTracker::new(),
        }
    }

    /// Return an object, handing it back to the caller if it was not retained.
    pub fn try_return(&self, mut obj: T) -> Option<T> {
        if !self.policy.return_object(&mut obj) {
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            trace!(pool = type_name::<T>(), "policy rejected returned object");
            return Some(obj);
        }

        if self.capacity > 0
            && let Some(mut slot) = self.fast_item.try_lock()
            && slot.is_none()
        {
            *slot = Some(obj);
            self.metrics.retained.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let rejected = match &self.items {
            Some(items) => match items.push(obj) {
                Ok(()) => None,
                Err(obj) => Some(obj),
            },
            None => Some(obj),
        };

        if rejected.is_some() {
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            trace!(
                pool = type_name::<T>(),
                capacity = self.capacity,
                "pool full, discarding object"
            );
        } else {
            self.metrics.retained.fetch_add(1, Ordering::Relaxed);
        }
        rejected
    }

    /// Remove and return every idle object.
    pub(crate) fn drain(&self) -> Vec<T> {
        let mut drained = Vec::new();
        if let Some(obj) = self.fast_item.lock().take() {
            drained.push(obj);
        }
        if let Some(items) = &self.items {
            while let Some(obj) = items.pop() {
                drained.push(obj);
            }
        }
        drained
    }

    fn take_idle(&self) -> Option<T> {
        if self.capacity > 0
            && let Some(mut slot) = self.fast_item.try_lock()
            && let Some(obj) = slot.take()
        {
            return Some(obj);
        }
        self.items.as_ref().and_then(|items| items.pop())
    }
}

impl<T, P> ObjectPool<T> for DefaultObjectPool<T, P>
where
    T: Send,
    P: PooledObjectPolicy<T>,
{
    fn get(&self) -> PoolResult<T> {
        if let Some(obj) = self.take_idle() {
            self.metrics.reused.fetch_add(1, Ordering::Relaxed);
            return Ok(obj);
        }

        let obj = self.policy.create()?;
        self.metrics.created.fetch_add(1, Ordering::Relaxed);
        trace!(pool = type_name::<T>(), "created new pooled object");
        Ok(obj)
    }

    fn return_object(&self, obj: T) {
        let _ = self.try_return(obj);
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn idle_count(&self) -> usize {
        let fast = usize::from(self.fast_item.lock().is_some());
        fast + self.items.as_ref().map_or(0, ArrayQueue::len)
    }

    fn metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(self.idle_count(), self.capacity)
    }
}

/// Pool that disposes every object it lets go of
///
/// Objects rejected by the policy, objects that do not fit, and objects still
/// idle when the pool is disposed (or dropped) have their disposal hook run
/// exactly once. Retained objects are never disposed while pooled.
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{DefaultPolicy, Disposable, DisposableObjectPool, ObjectPool};
///
/// #[derive(Default)]
/// struct Handle { closed: bool }
///
/// impl Disposable for Handle {
///     fn dispose(&mut self) { self.closed = true; }
/// }
///
/// let pool = DisposableObjectPool::<Handle, _>::new(DefaultPolicy, 1);
/// let a = pool.get().unwrap();
/// let b = pool.get().unwrap();
/// pool.return_object(a);
/// pool.return_object(b); // no room, disposed
///
/// assert_eq!(pool.metrics().total_disposed, 1);
/// ```
pub struct DisposableObjectPool<T, P> {
    inner: DefaultObjectPool<T, P>,
    dispose: fn(&mut T),
    disposed: AtomicBool,
}

impl<T, P> DisposableObjectPool<T, P>
where
    T: Send,
    P: PooledObjectPolicy<T>,
{
    pub fn new(policy: P, capacity: usize) -> Self
    where
        T: Disposable,
    {
        Self::with_dispose_hook(policy, capacity, T::dispose)
    }

    /// Create a pool using an explicit disposal hook.
    pub fn with_dispose_hook(policy: P, capacity: usize, dispose: fn(&mut T)) -> Self {
        Self {
            inner: DefaultObjectPool::new(policy, capacity),
            dispose,
            disposed: AtomicBool::new(false),
        }
    }

    /// Dispose every idle object. Objects returned afterwards are disposed
    /// immediately.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.dispose_idle();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn dispose_idle(&self) {
        for obj in self.inner.drain() {
            self.dispose_item(obj);
        }
    }

    fn dispose_item(&self, mut obj: T) {
        (self.dispose)(&mut obj);
        self.inner.metrics.disposed.fetch_add(1, Ordering::Relaxed);
        trace!(pool = type_name::<T>(), "disposed pooled object");
    }
}

impl<T, P> ObjectPool<T> for DisposableObjectPool<T, P>
where
    T: Send,
    P: PooledObjectPolicy<T>,
{
    fn get(&self) -> PoolResult<T> {
        self.inner.get()
    }

    fn return_object(&self, obj: T) {
        if self.is_disposed() {
            self.dispose_item(obj);
            return;
        }

        if let Some(rejected) = self.inner.try_return(obj) {
            self.dispose_item(rejected);
            return;
        }

        // Lost a race with dispose(): the object landed after the drain.
        if self.is_disposed() {
            self.dispose_idle();
        }
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn idle_count(&self) -> usize {
        self.inner.idle_count()
    }

    fn metrics(&self) -> PoolMetrics {
        self.inner.metrics()
    }
}

impl<T, P> Drop for DisposableObjectPool<T, P> {
    fn drop(&mut self) {
        *self.disposed.get_mut() = true;
        if let Some(mut obj) = self.inner.fast_item.get_mut().take() {
            (self.dispose)(&mut obj);
        }
        if let Some(items) = &self.inner.items {
            while let Some(mut obj) = items.pop() {
                (self.dispose)(&mut obj);
            }
        }
    }
}

/// An object checked out of a pool, returned when the guard is dropped
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{DefaultObjectPool, DefaultPolicy, ObjectPool, Pooled};
/// use std::sync::Arc;
///
/// let pool: Arc<dyn ObjectPool<String>> =
///     Arc::new(DefaultObjectPool::<String, _>::new(DefaultPolicy, 4));
/// {
///     let mut s = Pooled::new(Arc::clone(&pool)).unwrap();
///     s.push_str("scratch");
/// }
/// assert_eq!(pool.idle_count(), 1);
/// ```
pub struct Pooled<T: Send + 'static> {
    value: Option<T>,
    pool: Arc<dyn ObjectPool<T>>,
}

impl<T: Send + 'static> Pooled<T> {
    /// Check an object out of `pool`.
    pub fn new(pool: Arc<dyn ObjectPool<T>>) -> PoolResult<Self> {
        let value = pool.get()?;
        Ok(Self {
            value: Some(value),
            pool,
        })
    }

    /// Detach the object; it will not go back to the pool.
    pub fn into_inner(mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("pooled value is only taken on drop"),
        }
    }

    fn value_ref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value is only taken on drop"),
        }
    }
}

impl<T: Send + 'static> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value_ref()
    }
}

impl<T: Send + 'static> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value is only taken on drop"),
        }
    }
}

impl<T: Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.return_object(value);
        }
    }
}
