//! Concurrency limiting with fanout.
//!
//! Ten operations are submitted at once, but at most three of them run at
//! the same time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use fanout::{CancellationToken, FanOut};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let concurrent_count = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let limit = 3;
    let mut fanout = FanOut::new();
    fanout.with_limit(limit);
    tracing::info!(limit, "concurrency limit set");

    let start = Instant::now();

    let operations = (0..10usize).map(|i| {
        let count = concurrent_count.clone();
        let max = max_seen.clone();

        move |_cancel: CancellationToken| async move {
            let current = count.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(current, Ordering::SeqCst);

            tracing::info!(
                task = i,
                concurrent = current,
                at_ms = start.elapsed().as_millis() as u64,
                "started"
            );

            tokio::time::sleep(Duration::from_millis(200)).await;

            let remaining = count.fetch_sub(1, Ordering::SeqCst) - 1;
            tracing::info!(
                task = i,
                remaining,
                at_ms = start.elapsed().as_millis() as u64,
                "finished"
            );

            Ok::<_, anyhow::Error>(i)
        }
    });

    let finished = fanout.run(operations).await?;

    let batches = finished.len().div_ceil(limit);
    tracing::info!(
        total_ms = start.elapsed().as_millis() as u64,
        max_concurrent = max_seen.load(Ordering::SeqCst),
        expected_ms = batches * 200,
        "summary"
    );

    Ok(())
}
