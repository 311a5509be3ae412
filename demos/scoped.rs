//! Per-type pools and scoped checkouts through the service provider

use scoped_objectpool::{Disposable, ObjectPool, PoolResult, Resettable, ServiceCollection};
use std::sync::Arc;

struct Settings {
    greeting: String,
}

struct RequestContext {
    settings: Arc<Settings>,
    log: Vec<String>,
    open: bool,
}

impl Resettable for RequestContext {
    fn try_reset(&mut self) -> bool {
        self.log.clear();
        true
    }
}

impl Disposable for RequestContext {
    fn dispose(&mut self) {
        self.open = false;
    }
}

fn main() -> PoolResult<()> {
    println!("=== Scoped Object Pool - Scoped Example ===\n");

    let mut services = ServiceCollection::new();
    services.add_singleton(|_| {
        Ok(Arc::new(Settings {
            greeting: "hello".to_string(),
        }))
    });
    services
        .add_transient(|sp| {
            Ok(RequestContext {
                settings: sp.resolve::<Arc<Settings>>()?,
                log: Vec::new(),
                open: true,
            })
        })
        .resettable()
        .disposable();
    services
        .add_object_pools()
        .configure_pool::<RequestContext>(|o| o.capacity = 16);

    let provider = services.build();

    for request in 0..3 {
        let scope = provider.create_scope();
        scope.with_pooled(|ctx: &mut RequestContext| {
            ctx.open = true;
            ctx.log.push(format!("{} from request {}", ctx.settings.greeting, request));
        })?;
        let lines = scope.with_pooled(|ctx: &mut RequestContext| ctx.log.len())?;
        println!("   Request {}: {} log line(s)", request, lines);
        // The context goes back to the pool here
    }

    let pool = provider.pool::<RequestContext>()?;
    let metrics = pool.metrics();
    println!(
        "\n   Created {} context(s), reused {} time(s)",
        metrics.total_created, metrics.total_reused
    );
    Ok(())
}
