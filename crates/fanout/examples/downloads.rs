//! Downloading several documents concurrently.
//!
//! Every GET is started before any of them is awaited, and the bodies are
//! printed in the order the URLs were given. Pass URLs as arguments to
//! download something else. Ctrl-C or a 30 second timeout cancels the
//! remaining downloads.

use std::time::{Duration, Instant};

use fanout::{CancellationToken, FanOut};

const DEFAULT_URLS: [&str; 3] = [
    "https://norvig.com/big.txt",
    "https://upload.wikimedia.org/wikipedia/commons/4/47/PNG_transparency_demonstration_1.png",
    "https://www.w3schools.com/xml/note.xml",
];

const PREVIEW_CHARS: usize = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls = DEFAULT_URLS.iter().map(|url| url.to_string()).collect();
    }

    let client = reqwest::Client::new();

    let mut fanout = FanOut::new();
    fanout.with_timeout(Duration::from_secs(30));
    fanout.with_cancel_task(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling downloads");
        }
    });

    let start = Instant::now();

    let operations = urls.iter().cloned().map(|url| {
        let client = client.clone();
        move |stop: CancellationToken| async move {
            tokio::select! {
                body = download(&client, &url) => body,
                _ = stop.cancelled() => anyhow::bail!("download of {url} was stopped"),
            }
        }
    });

    let bodies = fanout.run(operations).await?;

    for (i, (url, body)) in urls.iter().zip(&bodies).enumerate() {
        let preview: String = body.chars().take(PREVIEW_CHARS).collect();
        tracing::info!(file = i + 1, url = %url, bytes = body.len(), "downloaded: {preview}...");
    }

    tracing::info!(
        files = bodies.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "all downloads finished"
    );

    Ok(())
}

async fn download(client: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    let start = Instant::now();

    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    tracing::debug!(url, elapsed_ms = start.elapsed().as_millis() as u64, "fetched");
    Ok(body)
}
