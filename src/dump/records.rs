use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Site;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordEntry {
    pub website: String,
    pub location: String,
    pub link: String,
    pub count: u32,
}

/// Scrape-attempt ledger, persisted as `records.json` next to a site's dumps.
/// Caps how often one link is re-scraped within a day, so a product page that
/// never yields a valid payload cannot stall the batch forever.
#[derive(Debug)]
pub struct ScrapeRecords {
    path: PathBuf,
    records: Vec<RecordEntry>,
}

impl ScrapeRecords {
    pub fn load(site_dump_root: &Path) -> Result<Self> {
        let path = site_dump_root.join("records.json");
        let records = if path.exists() {
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&body)
                .with_context(|| format!("Malformed records file {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self { path, records })
    }

    fn position(&self, site: Site, location: &str, link: &str) -> Option<usize> {
        self.records.iter().position(|r| {
            r.website == site.key() && r.location == location && r.link == link
        })
    }

    pub fn attempts(&self, site: Site, location: &str, link: &str) -> u32 {
        self.position(site, location, link)
            .map(|idx| self.records[idx].count)
            .unwrap_or(0)
    }

    /// Record one more scrape attempt and persist immediately.
    pub fn update(&mut self, site: Site, location: &str, link: &str) -> Result<()> {
        match self.position(site, location, link) {
            Some(idx) => self.records[idx].count += 1,
            None => self.records.push(RecordEntry {
                website: site.key().to_string(),
                location: location.to_string(),
                link: link.to_string(),
                count: 1,
            }),
        }
        self.save()
    }

    pub fn is_good(&self, site: Site, location: &str, link: &str, max_count: u32) -> bool {
        self.attempts(site, location, link) < max_count
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.records)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gpm-records-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_records_count_and_cap() {
        let root = temp_root();
        let mut records = ScrapeRecords::load(&root).unwrap();
        let link = "https://www.zeptonow.com/pn/x/pvid/abc";
        assert!(records.is_good(Site::Zepto, "L1", link, 3));
        for _ in 0..3 {
            records.update(Site::Zepto, "L1", link).unwrap();
        }
        assert_eq!(records.attempts(Site::Zepto, "L1", link), 3);
        assert!(!records.is_good(Site::Zepto, "L1", link, 3));
        // a different location is tracked separately
        assert!(records.is_good(Site::Zepto, "L2", link, 3));

        // reload sees the persisted counts
        let reloaded = ScrapeRecords::load(&root).unwrap();
        assert_eq!(reloaded.attempts(Site::Zepto, "L1", link), 3);
        let _ = std::fs::remove_dir_all(&root);
    }
}
