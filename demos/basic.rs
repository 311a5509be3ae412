//! Basic usage examples for the object pools

use scoped_objectpool::{
    DefaultObjectPool, DefaultPolicy, FnPolicy, ObjectPool, Pooled, PoolResult,
};
use std::sync::Arc;

fn main() -> PoolResult<()> {
    println!("=== Scoped Object Pool - Basic Examples ===\n");

    // Example 1: Pool of Default values
    simple_pool()?;

    // Example 2: Pool with a reset hook
    policy_pool()?;

    // Example 3: RAII guard
    guarded_pool()?;

    // Example 4: Metrics
    metrics()?;

    Ok(())
}

fn simple_pool() -> PoolResult<()> {
    println!("1. Simple Pool:");
    let pool = DefaultObjectPool::<Vec<u8>, _>::new(DefaultPolicy, 4);

    let buf = pool.get()?;
    println!("   Got buffer with capacity {}", buf.capacity());
    pool.return_object(buf);

    println!("   Idle after return: {}\n", pool.idle_count());
    Ok(())
}

fn policy_pool() -> PoolResult<()> {
    println!("2. Policy Pool:");
    let policy = FnPolicy::new(|| Ok(String::with_capacity(128))).with_reset(|s: &mut String| {
        s.clear();
        // Don't keep strings that grew too large
        s.capacity() <= 1024
    });
    let pool = DefaultObjectPool::<String, _>::new(policy, 8);

    let mut s = pool.get()?;
    s.push_str("hello");
    pool.return_object(s);

    let s = pool.get()?;
    println!("   Reused string is empty: {}\n", s.is_empty());
    Ok(())
}

fn guarded_pool() -> PoolResult<()> {
    println!("3. Guarded Checkout:");
    let pool: Arc<dyn ObjectPool<Vec<u32>>> =
        Arc::new(DefaultObjectPool::<Vec<u32>, _>::new(DefaultPolicy, 2));

    {
        let mut numbers = Pooled::new(Arc::clone(&pool))?;
        numbers.extend([1, 2, 3]);
        println!("   Using {} numbers", numbers.len());
        // Returned to the pool when `numbers` goes out of scope
    }

    println!("   Idle after scope: {}\n", pool.idle_count());
    Ok(())
}

fn metrics() -> PoolResult<()> {
    println!("4. Metrics:");
    let pool = DefaultObjectPool::<Vec<u8>, _>::new(DefaultPolicy, 1);

    let a = pool.get()?;
    let b = pool.get()?;
    pool.return_object(a);
    pool.return_object(b);
    let _c = pool.get()?;

    for (key, value) in pool.metrics().export() {
        println!("     {}: {}", key, value);
    }
    Ok(())
}
