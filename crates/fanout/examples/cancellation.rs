//! Cancellation patterns with fanout.
//!
//! This example demonstrates the ways a fan-out can be stopped:
//! - External cancellation token
//! - Task-driven cancellation
//! - Timeout
//! - Signalling siblings when one operation fails

use std::time::Duration;

use fanout::{CancellationToken, FanOut};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    example_external_cancellation().await;
    example_cancel_task().await;
    example_timeout().await;
    example_cancel_on_error().await;

    Ok(())
}

/// Sleeps for `duration` unless asked to stop first.
async fn long_running(
    name: &'static str,
    i: usize,
    duration: Duration,
    stop: CancellationToken,
) -> anyhow::Result<usize> {
    tracing::info!(name, task = i, "started");

    tokio::select! {
        _ = tokio::time::sleep(duration) => {
            tracing::info!(name, task = i, "completed normally");
            Ok(i)
        }
        _ = stop.cancelled() => {
            tracing::info!(name, task = i, "asked to stop");
            Ok(i)
        }
    }
}

fn report(result: Result<Vec<usize>, fanout::FanOutError<anyhow::Error>>) {
    match result {
        Ok(values) => tracing::info!(?values, "fan-out completed"),
        Err(e) if e.is_cancelled() => tracing::info!("fan-out cancelled"),
        Err(e) => tracing::info!("fan-out failed: {e}"),
    }
}

async fn example_external_cancellation() {
    tracing::info!("1. external cancellation token");

    let cancel_token = CancellationToken::new();

    let mut fanout = FanOut::new();
    fanout.with_cancel(&cancel_token);

    let cancel_clone = cancel_token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        tracing::info!("triggering external cancellation");
        cancel_clone.cancel();
    });

    let result = fanout
        .run((0..5).map(|i| {
            move |stop| long_running("external", i, Duration::from_secs(10), stop)
        }))
        .await;
    report(result);
}

async fn example_cancel_task() {
    tracing::info!("2. task-driven cancellation");

    let mut fanout = FanOut::new();
    fanout.with_cancel_task(async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        tracing::info!("cancel task finished");
    });

    let result = fanout
        .run((0..3).map(|i| move |stop| long_running("task", i, Duration::from_secs(60), stop)))
        .await;
    report(result);
}

async fn example_timeout() {
    tracing::info!("3. timeout");

    let mut fanout = FanOut::new();
    fanout.with_timeout(Duration::from_millis(300));

    // the first one would make it, the others would not
    let result = fanout
        .run((0..3).map(|i| {
            let duration = Duration::from_millis(100 + 400 * i as u64);
            move |stop| long_running("timeout", i, duration, stop)
        }))
        .await;
    report(result);
}

async fn example_cancel_on_error() {
    tracing::info!("4. cancel on error");

    let mut fanout = FanOut::new();
    fanout.with_cancel_on_error();

    let result = fanout
        .run((0..4).map(|i| {
            move |stop: CancellationToken| async move {
                if i == 0 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    tracing::info!(task = i, "failing");
                    anyhow::bail!("intentional failure");
                }

                long_running("on-error", i, Duration::from_secs(10), stop).await
            }
        }))
        .await;
    report(result);
}
