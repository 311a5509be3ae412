// Scoped Object Pool
// Bounded, thread-safe object pools with per-type registration

// This is just a binary wrapper - the actual library is in lib.rs
// Run examples with: cargo run --example basic

use scoped_objectpool::{ObjectPool, ServiceCollection};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match std::env::var("OBJECTPOOL_LOG").as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("scoped_objectpool v{}", env!("CARGO_PKG_VERSION"));
    info!("See demos/ for usage examples: cargo run --example basic");

    let mut services = ServiceCollection::new();
    services.add_transient(|_| Ok(Vec::<u8>::with_capacity(4096)));
    services.add_object_pools();
    let provider = services.build();

    let pool = provider.pool::<Vec<u8>>()?;
    let buffer = pool.get()?;
    info!(capacity = buffer.capacity(), "got buffer");
    pool.return_object(buffer);

    info!(idle = pool.idle_count(), "buffer returned");
    Ok(())
}
