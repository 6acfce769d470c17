use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::dump::{payload_ok, AddressExtractor, DumpStore, ScrapeRecords};
use crate::error::MonitorError;
use crate::excel::reader::product_id_from_link;
use crate::models::Site;
use crate::sites::{verify_location, SiteDriver};

/// An existing dump is reusable when its embedded address maps back onto the
/// expected location and (for sites with a shape check) its payload carries
/// product data.
pub fn dump_is_valid(
    site: Site,
    addr: &AddressExtractor,
    path: &Path,
    location_name: &str,
) -> bool {
    if !addr.check_dump_location(path, location_name) {
        return false;
    }
    DumpStore::load_optional(path)
        .map(|payload| payload_ok(site, &payload))
        .unwrap_or(false)
}

/// Drives one site over locations × products: skip valid dumps, delete and
/// re-scrape stale ones, switch location once per location, fetch with
/// bounded retry, persist, verify, throttle.
pub struct ScrapeBatcher<'a> {
    config: &'a Config,
    driver: Box<dyn SiteDriver>,
    store: DumpStore,
    records: ScrapeRecords,
    addr: AddressExtractor,
    skip_exists: bool,
    close_browser_after_done: bool,
}

impl<'a> ScrapeBatcher<'a> {
    pub fn new(
        config: &'a Config,
        driver: Box<dyn SiteDriver>,
        date: &str,
        skip_exists: bool,
        close_browser_after_done: bool,
    ) -> Result<Self> {
        let site = driver.site();
        let store = DumpStore::new(&config.data_root, date);
        let records = ScrapeRecords::load(&store.site_root(site))?;
        let addr = AddressExtractor::new(site, &config.site(site)?.locations);
        Ok(Self {
            config,
            driver,
            store,
            records,
            addr,
            skip_exists,
            close_browser_after_done,
        })
    }

    pub fn site(&self) -> Site {
        self.driver.site()
    }

    async fn fetch_with_retry(&mut self, product_id: &str) -> Result<Value, MonitorError> {
        let max_retries = self.driver.settings().max_retries;
        let interval = Duration::from_secs_f64(self.driver.settings().retry_interval_secs);
        let mut retry_count = 0;
        loop {
            match self.driver.fetch_product(product_id).await {
                Ok(payload) if crate::utils::json::is_truthy(&payload) => return Ok(payload),
                Ok(_) => warn!("Empty response"),
                Err(e) => warn!("Fetch failed: {}", e),
            }
            retry_count += 1;
            if retry_count < max_retries {
                info!("Retry ({}/{})", retry_count, max_retries);
                sleep(interval).await;
            } else {
                return Err(MonitorError::RetriesExhausted(max_retries));
            }
        }
    }

    pub async fn run(&mut self, links: &[Option<String>]) -> Result<()> {
        let site = self.site();
        let locations = self.config.site(site)?.locations.clone();
        let passes = self.driver.settings().passes.max(1);
        let throttle = Duration::from_secs_f64(self.driver.settings().throttle_secs);
        let max_attempts = self.config.batch.max_link_attempts;

        for location in &locations {
            let mut is_set_location = false;
            for pass in 0..passes {
                if passes > 1 {
                    info!("Pass {}/{} over {} links", pass + 1, passes, links.len());
                }
                for (link_idx, link) in links.iter().enumerate() {
                    let Some(link) = link else {
                        info!("Skip empty link at row [{}]", link_idx);
                        continue;
                    };
                    let product_id = product_id_from_link(link);
                    let dump_path = self.store.dump_path(site, Some(&location.name), &product_id);
                    if self.skip_exists && dump_path.exists() {
                        if dump_is_valid(site, &self.addr, &dump_path, &location.name) {
                            info!("Skip exists: [{}]", dump_path.display());
                            continue;
                        }
                        warn!("Remove stale dump, and re-scrape: {}", dump_path.display());
                        std::fs::remove_file(&dump_path)
                            .with_context(|| format!("Failed to remove {}", dump_path.display()))?;
                    }
                    if !self
                        .records
                        .is_good(site, &location.name, link, max_attempts)
                    {
                        warn!(
                            "Giving up on link after {} attempts: {}",
                            max_attempts, link
                        );
                        continue;
                    }
                    if !is_set_location {
                        info!("New Location: {} ({})", location.name, location.text);
                        self.driver.switch_location(location).await?;
                        is_set_location = true;
                    }
                    info!("[{}/{}]", link_idx + 1, links.len());
                    self.records.update(site, &location.name, link)?;
                    let payload = self.fetch_with_retry(&product_id).await?;
                    self.store.write(&dump_path, &payload)?;
                    verify_location(site, &payload, location)?;
                    sleep(throttle).await;
                }
            }
        }
        self.close().await;
        Ok(())
    }

    /// Best-effort cleanup; also used by the top-level driver after a failed
    /// run, before the outer retrier restarts the batch.
    pub async fn close(&mut self) {
        self.driver.cleanup(self.close_browser_after_done).await;
    }
}
