use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::Result;
use crate::page::{Document, PageSource, fetch_snapshot};

/// Re-snapshot `source` until `selectors` match at least `min_count`
/// elements in total, or until `timeout` elapses.
///
/// Running out of time is not an error: the last snapshot is returned and
/// the caller extracts whatever is there. Static sources are read once.
pub async fn wait_for_elements(
    source: &Arc<dyn PageSource>,
    selectors: &[&str],
    min_count: usize,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let mut html = fetch_snapshot(source).await?;

    loop {
        let found = Document::parse(&html).count(selectors)?;
        if found >= min_count {
            debug!(found, min_count, "wait satisfied");
            return Ok(html);
        }
        if source.is_static() {
            debug!(found, min_count, "static page, not polling");
            return Ok(html);
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(found, min_count, ?timeout, "wait timed out, using last snapshot");
            return Ok(html);
        }

        sleep(poll_interval.min(deadline - now)).await;
        html = fetch_snapshot(source).await?;
    }
}

/// Give late content a fixed delay to arrive, then take a fresh snapshot.
pub async fn settle(source: &Arc<dyn PageSource>, delay: Duration) -> Result<String> {
    if !delay.is_zero() && !source.is_static() {
        sleep(delay).await;
    }
    fetch_snapshot(source).await
}
