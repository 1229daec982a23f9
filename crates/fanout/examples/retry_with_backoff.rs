//! Retry with exponential backoff around fanout operations.
//!
//! A fan-out never retries on its own. Flaky operations are wrapped in a
//! retry decorator before they are submitted, and only the final outcome
//! of each one reaches the join point.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
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

    let endpoints = [
        "https://api.example.com/endpoint1",
        "https://api.example.com/endpoint2",
        "https://api.example.com/endpoint3",
        "https://api.example.com/endpoint4",
        "https://api.example.com/endpoint5",
    ];

    let mut fanout = FanOut::new();
    fanout.with_limit(3);

    let request_counter = Arc::new(AtomicUsize::new(0));
    let policy = Backoff {
        max_retries: 3,
        initial: Duration::from_millis(100),
        max: Duration::from_secs(5),
    };

    let operations = endpoints.map(|url| {
        let counter = request_counter.clone();
        move |stop: CancellationToken| {
            with_retry(policy, stop, move || {
                let counter = counter.clone();
                async move { make_api_call(url, &counter).await }
            })
        }
    });

    match fanout.run(operations).await {
        Ok(responses) => {
            for response in responses {
                tracing::info!("{response}");
            }
        }
        Err(e) => tracing::warn!("some API calls failed: {e}"),
    }

    tracing::info!(
        total_requests = request_counter.load(Ordering::SeqCst),
        "summary"
    );

    Ok(())
}

#[derive(Clone, Copy)]
struct Backoff {
    max_retries: usize,
    initial: Duration,
    max: Duration,
}

/// Calls `attempt` until it succeeds, fails with a non-retryable error, runs
/// out of retries, or `stop` fires.
async fn with_retry<T, F, Fut>(
    policy: Backoff,
    stop: CancellationToken,
    mut attempt: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut backoff = policy.initial;
    let mut tries = 0;

    loop {
        tries += 1;

        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if tries > policy.max_retries => {
                return Err(e.context(format!("gave up after {tries} attempts")));
            }
            Err(e) if !is_retryable_error(&e) => return Err(e),
            Err(e) => {
                tracing::info!(
                    attempt = tries,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying: {e}"
                );

                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {
                        backoff = next_backoff(backoff, policy.max);
                    }
                    _ = stop.cancelled() => {
                        anyhow::bail!("stopped during backoff after {tries} attempts");
                    }
                }
            }
        }
    }
}

async fn make_api_call(url: &str, counter: &AtomicUsize) -> anyhow::Result<String> {
    let request_num = counter.fetch_add(1, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(50)).await;

    match request_num % 7 {
        0 => Err(anyhow::anyhow!("request timeout")),
        1 | 2 => Err(anyhow::anyhow!("503 Service Unavailable")),
        3 if url.contains("endpoint3") => Err(anyhow::anyhow!("429 Too Many Requests")),
        _ => Ok(format!("response from {url} (request #{request_num})")),
    }
}

fn is_retryable_error(error: &anyhow::Error) -> bool {
    let error_str = error.to_string();

    ["timeout", "503", "429"]
        .iter()
        .any(|pattern| error_str.contains(pattern))
}

/// Doubles the backoff, capped at `max`, with ±10% jitter.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = (current * 2).min(max);

    let jitter_range = (next.as_millis() / 10).max(1) as i64;
    let jitter = rand::random_range(-jitter_range..=jitter_range);

    Duration::from_millis((next.as_millis() as i64 + jitter).max(1) as u64)
}
