//! Constructor registry with per-type pools and scoped checkouts

use crate::config::{PoolOptions, PoolOptionsRegistry};
use crate::errors::{PoolError, PoolResult};
use crate::factory::ObjectPoolFactory;
use crate::policy::{Capabilities, Disposable, Resettable};
use crate::pool::{ObjectPool, Pooled};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

type Constructor<T> = Arc<dyn Fn(&ServiceProvider) -> PoolResult<T> + Send + Sync>;
type AnyBox = Box<dyn Any + Send + Sync>;

struct Descriptor<T> {
    constructor: Constructor<T>,
    /// Set for singletons: how to hand out copies of the cached value
    singleton: Option<fn(&T) -> T>,
    capabilities: Capabilities<T>,
}

/// Collects constructors and pool configuration before building a [`ServiceProvider`]
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{ObjectPool, ServiceCollection};
///
/// struct Parser { scratch: Vec<u8> }
///
/// let mut services = ServiceCollection::new();
/// services.add_transient(|_| Ok(Parser { scratch: Vec::with_capacity(256) }));
/// services.add_object_pools().configure_pool::<Parser>(|o| o.capacity = 32);
///
/// let provider = services.build();
/// let pool = provider.pool::<Parser>().unwrap();
/// assert_eq!(pool.capacity(), 32);
///
/// let parser = pool.get().unwrap();
/// assert!(parser.scratch.capacity() >= 256);
/// pool.return_object(parser);
/// ```
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: HashMap<TypeId, AnyBox>,
    options: PoolOptionsRegistry,
    pools_enabled: bool,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor whose value is built once and cloned on every
    /// resolution. Wrap shared state in an `Arc`.
    pub fn add_singleton<T, F>(&mut self, constructor: F) -> Registration<'_, T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> PoolResult<T> + Send + Sync + 'static,
    {
        self.add::<T>(Some(T::clone as fn(&T) -> T), Arc::new(constructor))
    }

    /// Register a constructor that runs on every resolution.
    pub fn add_transient<T, F>(&mut self, constructor: F) -> Registration<'_, T>
    where
        T: Send + 'static,
        F: Fn(&ServiceProvider) -> PoolResult<T> + Send + Sync + 'static,
    {
        self.add::<T>(None, Arc::new(constructor))
    }

    fn add<T: Send + 'static>(
        &mut self,
        singleton: Option<fn(&T) -> T>,
        constructor: Constructor<T>,
    ) -> Registration<'_, T> {
        let descriptor = Descriptor {
            constructor,
            singleton,
            capabilities: Capabilities::new(),
        };
        self.descriptors.insert(TypeId::of::<T>(), Box::new(descriptor));
        Registration {
            collection: self,
            _marker: PhantomData,
        }
    }

    /// Enable per-type pools. Calling this more than once has no further effect.
    pub fn add_object_pools(&mut self) -> &mut Self {
        self.pools_enabled = true;
        self
    }

    /// Capacity used for every pooled type without its own configuration.
    pub fn with_default_pool_options(&mut self, options: PoolOptions) -> &mut Self {
        self.options.set_defaults(options);
        self
    }

    /// Configure the options stored under `name`. Pools look their options up
    /// by the pooled type's fully-qualified name.
    pub fn configure_pool_options<F>(&mut self, name: &str, action: F) -> &mut Self
    where
        F: Fn(&mut PoolOptions) + Send + Sync + 'static,
    {
        self.options.configure(name, Arc::new(action));
        self
    }

    /// Configure the pool options of `T`.
    pub fn configure_pool<T: ?Sized>(
        &mut self,
        action: impl Fn(&mut PoolOptions) + Send + Sync + 'static,
    ) -> &mut Self {
        self.configure_pool_options(type_name::<T>(), action)
    }

    /// Apply whole option values keyed by type name, e.g. loaded from a config file.
    pub fn configure_pools_from<I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, PoolOptions)>,
    {
        for (name, options) in entries {
            self.configure_pool_options(&name, move |o| *o = options);
        }
        self
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.descriptors.contains_key(&TypeId::of::<T>())
    }

    pub fn build(self) -> ServiceProvider {
        debug!(
            services = self.descriptors.len(),
            pools_enabled = self.pools_enabled,
            "building service provider"
        );

        ServiceProvider {
            inner: Arc::new(ProviderInner {
                descriptors: self.descriptors,
                singletons: DashMap::new(),
                options: self.options,
                factory: self.pools_enabled.then_some(ObjectPoolFactory),
                pools: DashMap::new(),
            }),
        }
    }
}

/// Declares optional capabilities of a freshly registered type.
pub struct Registration<'a, T> {
    collection: &'a mut ServiceCollection,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Registration<'_, T> {
    /// Pools call [`Resettable::try_reset`] on every returned instance.
    pub fn resettable(self) -> Self
    where
        T: Resettable,
    {
        self.update(|caps| caps.resettable())
    }

    /// Pools dispose discarded instances, and scopes dispose their instance at
    /// scope end.
    pub fn disposable(self) -> Self
    where
        T: Disposable,
    {
        self.update(|caps| caps.disposable())
    }

    fn update(self, f: impl FnOnce(Capabilities<T>) -> Capabilities<T>) -> Self {
        if let Some(descriptor) = self
            .collection
            .descriptors
            .get_mut(&TypeId::of::<T>())
            .and_then(|d| d.downcast_mut::<Descriptor<T>>())
        {
            descriptor.capabilities = f(descriptor.capabilities);
        }
        self
    }
}

struct ProviderInner {
    descriptors: HashMap<TypeId, AnyBox>,
    singletons: DashMap<TypeId, AnyBox>,
    options: PoolOptionsRegistry,
    factory: Option<ObjectPoolFactory>,
    pools: DashMap<TypeId, AnyBox>,
}

/// Resolves registered types and owns one pool per pooled type
///
/// Cloning is cheap; all clones share the same singletons and pools.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

thread_local! {
    static RESOLVING: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// Marks a type as under construction on this thread.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter<T: 'static>() -> PoolResult<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            let id = TypeId::of::<T>();
            if stack.contains(&id) {
                return Err(PoolError::CircularDependency {
                    type_name: type_name::<T>(),
                });
            }
            stack.push(id);
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl ServiceProvider {
    /// Construct (or, for singletons, clone) an instance of `T`.
    pub fn resolve<T: Send + 'static>(&self) -> PoolResult<T> {
        let descriptor = self.descriptor::<T>().ok_or(PoolError::ServiceNotRegistered {
            type_name: type_name::<T>(),
        })?;

        if descriptor.singleton.is_some()
            && let Some(value) = self.cached_singleton::<T>()
        {
            return Ok(value);
        }

        let value = {
            let _guard = ResolutionGuard::enter::<T>()?;
            (descriptor.constructor)(self).inspect_err(|e| {
                warn!(service = type_name::<T>(), error = %e, "service construction failed");
            })?
        };

        match descriptor.singleton {
            Some(clone) => Ok(self.store_singleton(value, clone)),
            None => Ok(value),
        }
    }

    /// The pool for `T`, built on first request with `T`'s configured options.
    pub fn pool<T: Send + 'static>(&self) -> PoolResult<Arc<dyn ObjectPool<T>>> {
        let factory = self.inner.factory.ok_or(PoolError::ServiceNotRegistered {
            type_name: type_name::<Arc<dyn ObjectPool<T>>>(),
        })?;

        let entry = self
            .inner
            .pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                let options = self.pool_options(type_name::<T>());
                debug!(
                    pool = type_name::<T>(),
                    capacity = options.capacity,
                    "creating object pool"
                );
                let pool: AnyBox = Box::new(factory.create::<T>(self, &options));
                pool
            });

        match entry.downcast_ref::<Arc<dyn ObjectPool<T>>>() {
            Some(pool) => Ok(Arc::clone(pool)),
            None => unreachable!("pool registry is keyed by TypeId"),
        }
    }

    /// Options registered under `name`, or the defaults when unconfigured.
    pub fn pool_options(&self, name: &str) -> PoolOptions {
        self.inner.options.get(name)
    }

    /// Capabilities declared when `T` was registered; none if `T` is unknown.
    pub fn capabilities<T: 'static>(&self) -> Capabilities<T> {
        self.descriptor::<T>()
            .map(|d| d.capabilities)
            .unwrap_or_default()
    }

    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope {
            provider: self.clone(),
            leases: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakServiceProvider {
        WeakServiceProvider {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn descriptor<T: 'static>(&self) -> Option<&Descriptor<T>> {
        self.inner
            .descriptors
            .get(&TypeId::of::<T>())
            .and_then(|d| d.downcast_ref::<Descriptor<T>>())
    }

    fn cached_singleton<T: Send + 'static>(&self) -> Option<T> {
        let entry = self.inner.singletons.get(&TypeId::of::<T>())?;
        entry.downcast_ref::<SingletonCell<T>>().map(|cell| cell.get())
    }

    fn store_singleton<T: Send + 'static>(&self, value: T, clone: fn(&T) -> T) -> T {
        // Racing first resolutions keep whichever value landed first.
        let entry = self
            .inner
            .singletons
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                let cell: AnyBox = Box::new(SingletonCell {
                    value: Mutex::new(value),
                    clone,
                });
                cell
            });
        match entry.downcast_ref::<SingletonCell<T>>() {
            Some(cell) => cell.get(),
            None => unreachable!("singleton cache is keyed by TypeId"),
        }
    }
}

/// A cached singleton value and the clone function captured at registration.
struct SingletonCell<T> {
    value: Mutex<T>,
    clone: fn(&T) -> T,
}

impl<T> SingletonCell<T> {
    fn get(&self) -> T {
        (self.clone)(&self.value.lock())
    }
}

/// Non-owning handle used by pools so they do not keep their provider alive.
#[derive(Clone)]
pub(crate) struct WeakServiceProvider {
    inner: Weak<ProviderInner>,
}

impl WeakServiceProvider {
    pub fn upgrade(&self) -> PoolResult<ServiceProvider> {
        self.inner
            .upgrade()
            .map(|inner| ServiceProvider { inner })
            .ok_or(PoolError::ProviderDisposed)
    }
}

/// One checked-out instance held for the lifetime of a scope.
struct ScopedLease<T: Send + 'static> {
    guard: Pooled<T>,
    dispose: Option<fn(&mut T)>,
}

impl<T: Send + 'static> Drop for ScopedLease<T> {
    fn drop(&mut self) {
        // Scoped disposal first; the guard then returns the instance to its pool.
        if let Some(dispose) = self.dispose {
            dispose(&mut *self.guard);
        }
    }
}

struct LeaseSlot {
    type_id: TypeId,
    /// `None` while lent out or while the first checkout is in progress
    lease: Option<Box<dyn Any + Send>>,
    holder: Option<ThreadId>,
}

/// Puts a lent lease back into its slot, or clears the slot if there is
/// nothing to put back (failed checkout) or the borrower panicked.
struct LentLease<'a> {
    leases: &'a Mutex<Vec<LeaseSlot>>,
    type_id: TypeId,
    lease: Option<Box<dyn Any + Send>>,
}

impl Drop for LentLease<'_> {
    fn drop(&mut self) {
        let released = if thread::panicking() {
            self.lease.take()
        } else {
            None
        };

        {
            let mut leases = self.leases.lock();
            match self.lease.take() {
                Some(lease) => {
                    let slot = leases.iter_mut().find(|slot| slot.type_id == self.type_id);
                    if let Some(slot) = slot {
                        slot.lease = Some(lease);
                        slot.holder = None;
                    }
                }
                None => leases.retain(|slot| slot.type_id != self.type_id),
            }
        }

        // Returns to the pool (running reset/dispose hooks) outside the lock.
        drop(released);
    }
}

/// A bounded lifetime region, e.g. one request
///
/// Each pooled type is checked out at most once per scope; every checkout is
/// returned to its pool exactly once when the scope is dropped.
///
/// # Examples
///
/// ```
/// use scoped_objectpool::ServiceCollection;
///
/// let mut services = ServiceCollection::new();
/// services.add_transient(|_| Ok(Vec::<u8>::new()));
/// services.add_object_pools();
/// let provider = services.build();
///
/// let scope = provider.create_scope();
/// scope.with_pooled(|buf: &mut Vec<u8>| buf.push(1)).unwrap();
/// let len = scope.with_pooled(|buf: &mut Vec<u8>| buf.len()).unwrap();
/// assert_eq!(len, 1);
/// ```
pub struct ServiceScope {
    provider: ServiceProvider,
    leases: Mutex<Vec<LeaseSlot>>,
}

impl ServiceScope {
    pub fn provider(&self) -> &ServiceProvider {
        &self.provider
    }

    pub fn resolve<T: Send + 'static>(&self) -> PoolResult<T> {
        self.provider.resolve::<T>()
    }

    /// Lend this scope's pooled `T` to `f`, checking one out on first use.
    ///
    /// Calling this again for the same `T` from inside `f` fails with
    /// [`PoolError::ScopedReentrancy`]. A scope shared across threads lends
    /// each type to one thread at a time: a caller on another thread gets
    /// [`PoolError::ScopeBusy`] instead of a second checkout. If `f` panics
    /// the instance goes back to the pool and the next call checks out again.
    pub fn with_pooled<T, R, F>(&self, f: F) -> PoolResult<R>
    where
        T: Send + 'static,
        F: FnOnce(&mut T) -> R,
    {
        let type_id = TypeId::of::<T>();
        let current = thread::current().id();
        let existing = {
            let mut leases = self.leases.lock();
            match leases.iter_mut().find(|slot| slot.type_id == type_id) {
                Some(slot) => match slot.holder {
                    Some(holder) if holder == current => {
                        return Err(PoolError::ScopedReentrancy {
                            type_name: type_name::<T>(),
                        });
                    }
                    Some(_) => {
                        return Err(PoolError::ScopeBusy {
                            type_name: type_name::<T>(),
                        });
                    }
                    None => {
                        slot.holder = Some(current);
                        slot.lease.take()
                    }
                },
                None => {
                    leases.push(LeaseSlot {
                        type_id,
                        lease: None,
                        holder: Some(current),
                    });
                    None
                }
            }
        };

        let mut lent = LentLease {
            leases: &self.leases,
            type_id,
            lease: existing,
        };
        if lent.lease.is_none() {
            lent.lease = Some(self.check_out::<T>()?);
        }

        let result = match lent
            .lease
            .as_mut()
            .and_then(|lease| lease.downcast_mut::<ScopedLease<T>>())
        {
            Some(lease) => f(&mut *lease.guard),
            None => unreachable!("scope leases are keyed by TypeId"),
        };
        Ok(result)
    }

    fn check_out<T: Send + 'static>(&self) -> PoolResult<Box<dyn Any + Send>> {
        Ok(Box::new(ScopedLease {
            guard: Pooled::new(self.provider.pool::<T>()?)?,
            dispose: self.provider.capabilities::<T>().dispose_hook(),
        }))
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        let leases = self.leases.get_mut();
        while let Some(slot) = leases.pop() {
            drop(slot.lease);
        }
    }
}
