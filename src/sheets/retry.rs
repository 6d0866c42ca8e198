use std::time::Duration;

use tracing::warn;

use super::{CellUpdate, SheetFuture, SpreadsheetSource};

/// Wrapper that adds retry logic with exponential backoff to a spreadsheet source.
///
/// Transient errors are retried until `max_retries` is reached. The delay
/// starts at `base_delay` and doubles after each failed attempt.
pub struct RetryingSource<S> {
    inner: S,
    max_retries: u32,
    base_delay: Duration,
}

impl<S> RetryingSource<S> {
    /// Create a new `RetryingSource` wrapping `inner`.
    pub fn new(inner: S, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }
}

impl<S: SpreadsheetSource> SpreadsheetSource for RetryingSource<S> {
    fn fetch_rows<'a>(&'a self, spreadsheet_id: &'a str) -> SheetFuture<'a, Vec<Vec<String>>> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match self.inner.fetch_rows(spreadsheet_id).await {
                    Ok(rows) => return Ok(rows),
                    Err(e) if e.is_retryable() && attempt < self.max_retries => {
                        let factor = 2f64.powi(attempt as i32);
                        let delay = self.base_delay.mul_f64(factor);
                        warn!(
                            spreadsheet_id,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }

    fn batch_update_cells<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        updates: &'a [CellUpdate],
    ) -> SheetFuture<'a, ()> {
        self.inner.batch_update_cells(spreadsheet_id, updates)
    }
}
