use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::Site;

/// A named delivery address. `text` is typed into the site's location search,
/// `locality` is the short marker expected back in cookies/state,
/// `dump_address` is the full form the site stores (matched fuzzily against
/// dumps), and `column_address` is the display value used in report sheets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub dump_address: String,
    #[serde(default)]
    pub column_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    pub locations: Vec<Location>,
    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: f64,
    /// Full sweeps over the link list; Dmart uses 3 to recover products that
    /// intermittently render without data.
    #[serde(default = "default_passes")]
    pub passes: u32,
    /// Max seconds to wait for the target network response / page settle.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_throttle_secs() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_interval_secs() -> f64 {
    3.0
}

fn default_passes() -> u32 {
    1
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub chrome_args: Vec<String>,
    /// Proxy for the Zepto location switcher. The switcher must be started
    /// before the scraper client: the browser is shared, and its proxy cannot
    /// change once launched.
    #[serde(default)]
    pub http_proxy: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_args: Vec::new(),
            http_proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_outer_retries")]
    pub outer_retries: u32,
    #[serde(default = "default_outer_interval_secs")]
    pub outer_interval_secs: u64,
    /// Max scrape attempts recorded per link before it is given up on.
    #[serde(default = "default_max_link_attempts")]
    pub max_link_attempts: u32,
}

fn default_outer_retries() -> u32 {
    10
}

fn default_outer_interval_secs() -> u64 {
    60
}

fn default_max_link_attempts() -> u32 {
    3
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            outer_retries: default_outer_retries(),
            outer_interval_secs: default_outer_interval_secs(),
            max_link_attempts: default_max_link_attempts(),
        }
    }
}

/// One skip rule for the validity checker: every column must hold the given
/// value for the rule to fire (rules for one site are OR-ed together).
pub type SkipRule = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Master SKU workbook, one weblink_<site> column per site.
    pub sku_workbook: PathBuf,
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    pub sites: HashMap<String, SiteSettings>,
    /// Location names reported on, in sheet order.
    pub location_list: Vec<String>,
    /// Display value per location name for the merged `Location` column.
    #[serde(default)]
    pub location_map: HashMap<String, String>,
    /// Checker skip rules per website key.
    #[serde(default)]
    pub skip_checks: HashMap<String, Vec<SkipRule>>,
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = settings
            .try_deserialize()
            .context("Config file does not match the expected schema")?;
        Ok(config)
    }

    pub fn site(&self, site: Site) -> Result<&SiteSettings> {
        self.sites
            .get(site.key())
            .with_context(|| format!("No settings for site {} in config", site.key()))
    }

    /// Display value for a location name. The lookup is case-insensitive:
    /// the config loader normalizes map keys to lowercase.
    pub fn location_label(&self, name: &str) -> String {
        self.location_map
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, label)| label.clone())
            .unwrap_or_else(|| name.to_string())
    }
}
