use scoped_objectpool::{
    Disposable, ObjectPool, PoolError, PoolOptions, Resettable, ServiceCollection, ServiceProvider,
};
use std::any::type_name;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Default)]
struct TestDependency {
    disposed_total: AtomicUsize,
}

impl TestDependency {
    const MESSAGE: &'static str = "Hello from the dependency";
}

struct TestClass {
    id: usize,
    dependency: Arc<TestDependency>,
    reset_called: usize,
    disposed_called: usize,
}

impl TestClass {
    fn read_message(&self) -> &'static str {
        TestDependency::MESSAGE
    }
}

impl Resettable for TestClass {
    fn try_reset(&mut self) -> bool {
        self.reset_called += 1;
        true
    }
}

impl Disposable for TestClass {
    fn dispose(&mut self) {
        self.disposed_called += 1;
        self.dependency.disposed_total.fetch_add(1, Ordering::SeqCst);
    }
}

struct Unregistered;

#[derive(Debug, Default)]
struct Counter(usize);

fn services() -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services.add_singleton(|_| Ok(Arc::new(TestDependency::default())));
    services
        .add_transient(|sp| {
            Ok(TestClass {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                dependency: sp.resolve::<Arc<TestDependency>>()?,
                reset_called: 0,
                disposed_called: 0,
            })
        })
        .resettable()
        .disposable();
    services.add_transient(|_| Ok(Counter::default()));
    services
}

fn dependency(provider: &ServiceProvider) -> Arc<TestDependency> {
    provider.resolve::<Arc<TestDependency>>().unwrap()
}

#[test]
fn configures_pool_options_per_name() {
    let mut services = ServiceCollection::new();
    services
        .configure_pool::<TestClass>(|o| o.capacity = 2048)
        .configure_pool::<TestDependency>(|o| o.capacity = 4096);
    let provider = services.build();

    assert_eq!(provider.pool_options(type_name::<TestClass>()).capacity, 2048);
    assert_eq!(provider.pool_options(type_name::<TestDependency>()).capacity, 4096);
}

#[test]
fn unconfigured_pool_uses_default_capacity() {
    let mut services = ServiceCollection::new();
    services.add_object_pools();
    let provider = services.build();

    let pool = provider.pool::<TestDependency>().unwrap();

    assert_eq!(pool.capacity(), 1024);
    assert_eq!(provider.pool_options(type_name::<TestDependency>()).capacity, 1024);
}

#[test]
fn configured_capacity_is_used_by_the_pool() {
    let mut services = services();
    services
        .add_object_pools()
        .configure_pool::<TestClass>(|o| o.capacity = 64);
    let provider = services.build();

    let pool = provider.pool::<TestClass>().unwrap();

    assert_eq!(pool.capacity(), 64);
    assert_eq!(pool.get().unwrap().read_message(), TestDependency::MESSAGE);
}

#[test]
fn configuring_one_type_leaves_others_alone() {
    let mut services = services();
    services
        .add_object_pools()
        .configure_pool::<TestClass>(|o| o.capacity = 8);
    let provider = services.build();

    assert_eq!(provider.pool::<TestClass>().unwrap().capacity(), 8);
    assert_eq!(provider.pool::<Counter>().unwrap().capacity(), 1024);
}

#[test]
fn registry_default_capacity_is_configurable() {
    let mut services = services();
    services
        .add_object_pools()
        .with_default_pool_options(PoolOptions::new().with_capacity(3));
    let provider = services.build();

    assert_eq!(provider.pool::<Counter>().unwrap().capacity(), 3);
}

#[test]
fn pool_is_a_singleton_per_type() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();

    let first = provider.pool::<TestClass>().unwrap();
    let second = provider.clone().pool::<TestClass>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn returned_object_is_reused_with_identity() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();
    let pool = provider.pool::<TestClass>().unwrap();

    let obj = pool.get().unwrap();
    let id = obj.id;
    pool.return_object(obj);

    assert_eq!(pool.get().unwrap().id, id);
}

#[test]
fn returning_calls_try_reset_once() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();
    let pool = provider.pool::<TestClass>().unwrap();

    let obj = pool.get().unwrap();
    pool.return_object(obj);
    let obj = pool.get().unwrap();

    assert_eq!(obj.reset_called, 1);
    assert_eq!(obj.disposed_called, 0);
}

#[test]
fn singleton_instances_are_shared_through_the_pool() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();

    let pooled = {
        let scope = provider.create_scope();
        scope
            .with_pooled(|dep: &mut Arc<TestDependency>| Arc::clone(dep))
            .unwrap()
    };

    assert!(Arc::ptr_eq(&pooled, &dependency(&provider)));
    assert_eq!(pooled.disposed_total.load(Ordering::SeqCst), 0);
}

#[test]
fn excess_returns_are_disposed_exactly_once() {
    let mut services = services();
    services
        .add_object_pools()
        .configure_pool::<TestClass>(|o| o.capacity = 2);
    let provider = services.build();
    let pool = provider.pool::<TestClass>().unwrap();

    let objs: Vec<_> = (0..5).map(|_| pool.get().unwrap()).collect();
    for obj in objs {
        pool.return_object(obj);
    }

    assert_eq!(pool.idle_count(), 2);
    assert_eq!(dependency(&provider).disposed_total.load(Ordering::SeqCst), 3);

    let kept: Vec<_> = (0..2).map(|_| pool.get().unwrap()).collect();
    assert!(kept.iter().all(|obj| obj.disposed_called == 0));
}

#[test]
fn dropping_the_provider_disposes_idle_objects() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();
    let dep = dependency(&provider);

    {
        let pool = provider.pool::<TestClass>().unwrap();
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        pool.return_object(a);
        pool.return_object(b);
    }
    assert_eq!(dep.disposed_total.load(Ordering::SeqCst), 0);

    drop(provider);
    assert_eq!(dep.disposed_total.load(Ordering::SeqCst), 2);
}

#[test]
fn scope_lends_the_same_instance_within_a_scope() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();

    let (first, second) = {
        let scope = provider.create_scope();
        let first = scope.with_pooled(|obj: &mut TestClass| obj.id).unwrap();
        let second = scope.with_pooled(|obj: &mut TestClass| obj.id).unwrap();
        (first, second)
    };
    assert_eq!(first, second);

    let obj = provider.pool::<TestClass>().unwrap().get().unwrap();
    assert_eq!(obj.id, first);
    assert_eq!(obj.disposed_called, 1);
    assert_eq!(obj.reset_called, 1);
}

#[test]
fn sequential_scopes_reuse_the_same_instance() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();

    let first = {
        let scope = provider.create_scope();
        scope.with_pooled(|obj: &mut TestClass| obj.id).unwrap()
    };
    let second = {
        let scope = provider.create_scope();
        scope.with_pooled(|obj: &mut TestClass| obj.id).unwrap()
    };
    assert_eq!(first, second);

    let obj = provider.pool::<TestClass>().unwrap().get().unwrap();
    assert_eq!(obj.id, first);
    assert_eq!(obj.disposed_called, 2);
    assert_eq!(obj.reset_called, 2);
}

#[test]
fn nested_lending_of_the_same_type_is_rejected() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();
    let scope = provider.create_scope();

    let inner = scope
        .with_pooled(|_: &mut TestClass| scope.with_pooled(|_: &mut TestClass| ()))
        .unwrap();
    assert!(matches!(inner, Err(PoolError::ScopedReentrancy { .. })));

    let other = scope
        .with_pooled(|_: &mut TestClass| scope.with_pooled(|c: &mut Counter| c.0))
        .unwrap();
    assert_eq!(other, Ok(0));
}

#[test]
fn lending_to_another_thread_mid_use_is_busy() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();
    let scope = provider.create_scope();
    let shared = &scope;

    let busy = scope
        .with_pooled(|_: &mut Counter| {
            thread::scope(|s| {
                s.spawn(move || shared.with_pooled(|c: &mut Counter| c.0))
                    .join()
                    .unwrap()
            })
        })
        .unwrap();
    assert!(matches!(busy, Err(PoolError::ScopeBusy { .. })));
    assert_eq!(scope.with_pooled(|c: &mut Counter| c.0), Ok(0));
}

#[test]
fn scope_shared_across_threads_checks_out_once() {
    let mut services = ServiceCollection::new();
    services.add_transient(|_| {
        thread::sleep(Duration::from_millis(20));
        Ok(Counter::default())
    });
    services.add_object_pools();
    let provider = services.build();
    let pool = provider.pool::<Counter>().unwrap();
    let scope = provider.create_scope();
    let barrier = Barrier::new(2);
    let (shared, start) = (&scope, &barrier);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    start.wait();
                    shared.with_pooled(|c: &mut Counter| {
                        c.0 += 1;
                        c.0
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().any(Result::is_ok));
    for result in &results {
        assert!(matches!(result, Ok(_) | Err(PoolError::ScopeBusy { .. })));
    }
    assert_eq!(pool.metrics().total_created, 1);
    assert_eq!(pool.idle_count(), 0);

    let uses = scope.with_pooled(|c: &mut Counter| c.0).unwrap();
    assert_eq!(uses, results.iter().filter(|r| r.is_ok()).count());

    drop(scope);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn panicking_borrower_leaves_the_scope_usable() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();
    let pool = provider.pool::<TestClass>().unwrap();
    let scope = provider.create_scope();

    let first = scope.with_pooled(|obj: &mut TestClass| obj.id).unwrap();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        scope.with_pooled(|_: &mut TestClass| -> usize { panic!("borrower failed") })
    }));
    assert!(outcome.is_err());
    assert_eq!(pool.idle_count(), 1);

    let after = scope.with_pooled(|obj: &mut TestClass| obj.id).unwrap();
    assert_eq!(after, first);
    assert_eq!(pool.idle_count(), 0);

    drop(scope);
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn pools_require_registration() {
    let provider = services().build();
    assert!(matches!(
        provider.pool::<TestClass>(),
        Err(PoolError::ServiceNotRegistered { .. })
    ));
}

#[test]
fn unregistered_type_fails_on_get() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();

    let pool = provider.pool::<Unregistered>().unwrap();
    assert!(matches!(
        pool.get(),
        Err(PoolError::ServiceNotRegistered { .. })
    ));
}

#[test]
fn circular_dependencies_are_reported() {
    struct Loop;

    let mut services = ServiceCollection::new();
    services.add_transient(|sp| sp.resolve::<Loop>());
    services.add_object_pools();
    let provider = services.build();

    let pool = provider.pool::<Loop>().unwrap();
    assert!(matches!(
        pool.get(),
        Err(PoolError::CircularDependency { .. })
    ));

    // The resolution stack unwinds, so later resolutions start clean.
    assert!(matches!(
        provider.resolve::<Loop>(),
        Err(PoolError::CircularDependency { .. })
    ));
}

#[test]
fn constructor_errors_propagate() {
    let mut services = ServiceCollection::new();
    services.add_transient(|_| {
        Err::<Counter, _>(PoolError::construction::<Counter>("no backing store"))
    });
    services.add_object_pools();
    let provider = services.build();

    let err = provider.pool::<Counter>().unwrap().get().unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Failed to construct {}: no backing store", type_name::<Counter>())
    );
}

#[test]
fn idle_count_stays_within_capacity_under_contention() {
    let mut services = services();
    services
        .add_object_pools()
        .configure_pool::<TestClass>(|o| o.capacity = 2048);
    let provider = services.build();
    let pool = provider.pool::<TestClass>().unwrap();
    let barrier = Arc::new(Barrier::new(3));

    let handles: Vec<_> = [684, 683, 683]
        .into_iter()
        .map(|count| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let objs: Vec<_> = (0..count).map(|_| pool.get().unwrap()).collect();
                barrier.wait();
                for obj in objs {
                    pool.return_object(obj);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = pool.metrics();
    assert!(pool.idle_count() <= 2048);
    assert_eq!(metrics.total_created, 2050);
    assert_eq!(metrics.total_retained + metrics.total_discarded, 2050);
    assert_eq!(
        dependency(&provider).disposed_total.load(Ordering::SeqCst),
        metrics.total_discarded
    );
}

#[cfg(feature = "serde")]
#[test]
fn capacities_load_from_a_config_map() {
    use std::collections::HashMap;

    let json = format!(
        r#"{{ "{}": {{ "capacity": 5 }}, "{}": {{}} }}"#,
        type_name::<TestClass>(),
        type_name::<Counter>()
    );
    let entries: HashMap<String, PoolOptions> = serde_json::from_str(&json).unwrap();

    let mut services = services();
    services.add_object_pools().configure_pools_from(entries);
    let provider = services.build();

    assert_eq!(provider.pool::<TestClass>().unwrap().capacity(), 5);
    assert_eq!(provider.pool::<Counter>().unwrap().capacity(), 1024);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scopes_work_across_tasks() {
    let mut services = services();
    services.add_object_pools();
    let provider = services.build();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let provider = provider.clone();
            tokio::spawn(async move {
                let scope = provider.create_scope();
                scope.with_pooled(|obj: &mut TestClass| obj.read_message().len())
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), Ok(TestDependency::MESSAGE.len()));
    }

    let metrics = provider.pool::<TestClass>().unwrap().metrics();
    assert!(metrics.total_created <= 16);
    assert_eq!(metrics.total_retained, 16);
}
