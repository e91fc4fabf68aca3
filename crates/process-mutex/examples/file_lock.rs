//! Runs a short critical section under a process mutex.
//!
//! Start several copies at once to watch them take turns:
//!
//! ```text
//! RUST_LOG=process_mutex_file=debug cargo run -p process-mutex --example file_lock
//! ```

use std::time::Duration;

use process_mutex::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let directory = std::env::temp_dir().join("process-mutex-demo");
    let provider = MultiProcessMutexProvider::builder()
        .directory(&directory)
        .timeout(Duration::from_secs(30))
        .build()?;
    let lock = provider.create_lock("demo")?;

    let pid = std::process::id();
    lock.with_lock(|| async move {
        info!(pid, "entered critical section");
        tokio::time::sleep(Duration::from_secs(2)).await;
        info!(pid, "leaving critical section");
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
    })
    .await?;

    let serial = AsyncMutex::new();
    let (a, b) = tokio::join!(
        serial.exclusive_run(|| async { "first" }),
        serial.exclusive_run(|| async { "second" }),
    );
    info!(a, b, "in-process operations ran in order");

    Ok(())
}
