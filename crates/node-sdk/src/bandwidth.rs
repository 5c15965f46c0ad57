//! Best-effort downlink bandwidth probe.
//!
//! Times a capped download of the configured probe endpoint. The result is
//! advisory only: on any failure the connect URL simply omits the
//! `speed_download` parameter.

use std::time::{Duration, Instant};

use futures_util::StreamExt;

/// Hard cap on probe download size.
const MAX_PROBE_BYTES: usize = 10 * 1024 * 1024;
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

pub async fn measure_download_mbps(client: &reqwest::Client, probe_url: &str) -> Option<f64> {
    let started = Instant::now();
    let bytes = match tokio::time::timeout(PROBE_TIMEOUT, download(client, probe_url)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "bandwidth probe failed");
            return None;
        }
        Err(_) => {
            tracing::debug!("bandwidth probe timed out");
            return None;
        }
    };
    let speed = mbps(bytes, started.elapsed().as_secs_f64());
    if let Some(speed) = speed {
        tracing::debug!(mbps = format!("{speed:.2}"), "bandwidth probe finished");
    }
    speed
}

async fn download(client: &reqwest::Client, url: &str) -> reqwest::Result<usize> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let mut stream = resp.bytes_stream();
    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        total += chunk?.len();
        if total >= MAX_PROBE_BYTES {
            break;
        }
    }
    Ok(total)
}

fn mbps(bytes: usize, secs: f64) -> Option<f64> {
    if bytes == 0 || secs <= 0.0 {
        return None;
    }
    Some((bytes as f64 * 8.0) / (secs * 1_000_000.0))
}
