use tracing_subscriber::EnvFilter;
use workpool::prelude::*;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Echo Pool Example ===\n");

    let config = PoolConfig::builder()
        .num_workers(3)
        .thread_name_prefix("echo")
        .build()
        .expect("Failed to build config");

    let pool = WorkerPool::new(
        from_fn(|_: &WorkerContext, line: String| {
            if line.is_empty() {
                return Err(TaskError::failed("empty line"));
            }
            Ok(line.to_uppercase())
        }),
        &config,
    )
    .expect("Failed to start pool");

    pool.on(PoolEvent::Error, |signal| {
        println!("worker {} reported an error", signal.worker());
    });

    let lines = ["alpha", "beta", "", "gamma", "delta", "epsilon"];
    let handles: Vec<_> = lines.iter().map(|l| pool.submit(l.to_string())).collect();

    for (line, handle) in lines.iter().zip(handles) {
        match handle.wait() {
            Ok(done) => println!("{:>8} -> {:<8} (worker {})", line, done.result, done.worker),
            Err(e) => println!("{:>8} -> error: {}", line, e),
        }
    }

    println!("\nretired workers: {:?}", pool.retired_workers());
    println!("free workers:    {}", pool.free_workers());

    pool.terminate();

    println!("\n=== Example Complete ===");
}
