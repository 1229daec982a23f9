//! Error handling with fanout.
//!
//! When several operations fail, the error of the lowest index is the one
//! returned, no matter which failure happened first. `settle` keeps all of them.

use std::time::Duration;

use fanout::{CancellationToken, FanOutError, Request};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    example_lowest_index_wins().await;
    example_every_error().await?;
    example_divide().await;

    Ok(())
}

fn failing_after(name: &'static str, millis: u64) -> Request<(), anyhow::Error> {
    let mut request = Request::new();
    request.push(move |_| async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        tracing::info!(task = name, after_ms = millis, "failing");
        Err(anyhow::anyhow!("error from task {name}"))
    });
    request
}

async fn example_lowest_index_wins() {
    tracing::info!("1. lowest index wins");

    // A fails last but was submitted first
    let mut request = failing_after("A", 300);
    request.extend(failing_after("B", 100));
    request.extend(failing_after("C", 200));

    match fanout::run(request).await {
        Ok(_) => tracing::warn!("unexpected success"),
        Err(e) => tracing::info!(index = ?e.index(), "error received: {e}"),
    }
}

async fn example_every_error() -> anyhow::Result<()> {
    tracing::info!("2. inspecting every error");

    let settled = fanout::settle((0..6u32).map(|i| {
        move |_: CancellationToken| async move {
            tokio::time::sleep(Duration::from_millis(20 * u64::from(i))).await;
            if i % 3 == 1 {
                anyhow::bail!("task {i} rejected its input");
            }
            Ok(i * 100)
        }
    }))
    .await?;

    for (index, err) in settled.errors() {
        tracing::info!(index, "failed: {err}");
    }

    if let Err(FanOutError::OperationFailed { index, error }) = settled.into_result() {
        tracing::info!(index, "reported error: {error}");
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("cannot divide {0} by zero")]
struct DivideByZero(i64);

async fn divide(a: i64, b: i64) -> Result<i64, DivideByZero> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if b == 0 {
        return Err(DivideByZero(a));
    }
    Ok(a / b)
}

async fn example_divide() {
    tracing::info!("3. typed errors pass through unchanged");

    let pairs = [(10, 2), (10, 0), (9, 3)];

    let operations = pairs.map(|(a, b)| move |_: CancellationToken| divide(a, b));

    match fanout::run(operations).await {
        Ok(quotients) => tracing::info!(?quotients, "all divisions succeeded"),
        Err(FanOutError::OperationFailed { index, error }) => {
            tracing::info!(index, dividend = error.0, "caught: {error}")
        }
        Err(e) => tracing::warn!("unexpected: {e}"),
    }
}
