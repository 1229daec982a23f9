//! Basic usage of the fanout library.
//!
//! Five operations finish in reverse order of submission, yet the
//! results come back in the order they were submitted.

use std::time::{Duration, Instant};

use fanout::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let start = Instant::now();

    let values = fanout::run((0..5u64).map(|i| {
        move |_cancel: CancellationToken| async move {
            tracing::info!(task = i, "starting");

            // later tasks finish first
            tokio::time::sleep(Duration::from_millis(100 * (5 - i))).await;

            tracing::info!(
                task = i,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "completed"
            );
            Ok::<_, anyhow::Error>(format!("result of task {i}"))
        }
    }))
    .await?;

    for value in &values {
        tracing::info!("{value}");
    }

    // all five ran at once, so this is close to the slowest task, not the sum
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "all tasks completed"
    );

    Ok(())
}
