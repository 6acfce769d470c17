use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Process-level retrier wrapping a whole scrape batch. The batch is
/// idempotent (existing valid dumps are skipped), so rerunning it after a
/// failure only redoes the missing tail.
pub struct Retrier {
    max_retries: u32,
    interval: Duration,
}

impl Retrier {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self { max_retries, interval }
    }

    pub async fn run<T, F, Fut>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(val) => return Ok(val),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        warn!("Exceeded max retries ({}), aborting: {}", self.max_retries, e);
                        return Err(e);
                    }
                    warn!("Batch failed: {}", e);
                    info!(
                        "Retry ({}/{}) in {:?}",
                        attempt, self.max_retries, self.interval
                    );
                    sleep(self.interval).await;
                }
            }
        }
    }
}
