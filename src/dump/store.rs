use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::Location;
use crate::error::MonitorError;
use crate::models::Site;
use crate::utils::json::{is_truthy, json_get, json_get_str};
use crate::utils::text::closest_match;

/// Same alphabet as Python's `urllib.parse.quote(s, safe="")`: every byte is
/// escaped except alphanumerics and `-_.~`. Dmart product ids contain slashes
/// and query strings, which must not leak into the filesystem.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Product id as it appears in a dump filename. Only Dmart ids need escaping;
/// the other sites use plain numeric/uuid ids.
pub fn encode_product_id(site: Site, product_id: &str) -> String {
    match site {
        Site::Dmart => utf8_percent_encode(product_id, FILENAME_ENCODE_SET).to_string(),
        _ => product_id.to_string(),
    }
}

/// Write-once JSON snapshots, keyed by (date, site, location, product):
/// `data/dumps/<date>/<site>/<location>/<product-id>.json`.
#[derive(Debug, Clone)]
pub struct DumpStore {
    data_root: PathBuf,
    date: String,
}

impl DumpStore {
    pub fn new(data_root: &Path, date: &str) -> Self {
        Self {
            data_root: data_root.to_path_buf(),
            date: date.to_string(),
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn site_root(&self, site: Site) -> PathBuf {
        self.data_root.join("dumps").join(&self.date).join(site.key())
    }

    pub fn dump_path(&self, site: Site, location_name: Option<&str>, product_id: &str) -> PathBuf {
        let filename = format!("{}.json", encode_product_id(site, product_id));
        match location_name {
            Some(parent) => self.site_root(site).join(parent).join(filename),
            None => self.site_root(site).join(filename),
        }
    }

    pub fn write(&self, path: &Path, payload: &Value) -> Result<(), MonitorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(payload)?;
        std::fs::write(path, body)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Value, MonitorError> {
        if !path.exists() {
            return Err(MonitorError::MissingDump(path.to_path_buf()));
        }
        let body = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn load_optional(path: &Path) -> Option<Value> {
        Self::load(path).ok()
    }
}

/// Shape check for dumps on sites whose pages occasionally render without
/// product data; such dumps must be deleted and re-scraped.
pub fn payload_ok(site: Site, payload: &Value) -> bool {
    let path = match site {
        Site::Swiggy => "instamart.cachedProductItemData",
        Site::Dmart => "resp.pdpData.dynamicPDP.data.productData",
        _ => return true,
    };
    json_get(payload, path).map(is_truthy).unwrap_or(false)
}

/// Reads the delivery-address marker a site embedded into a dump and maps it
/// back onto a configured location by fuzzy match.
pub struct AddressExtractor {
    site: Site,
    locations: Vec<Location>,
}

impl AddressExtractor {
    pub fn new(site: Site, locations: &[Location]) -> Self {
        Self {
            site,
            locations: locations.to_vec(),
        }
    }

    pub fn dump_address(&self, payload: &Value) -> Option<String> {
        json_get_str(payload, self.site.dump_address_path()).filter(|s| !s.is_empty())
    }

    fn closest_location(&self, dump_address: &str) -> Option<&Location> {
        let candidates: Vec<String> = self
            .locations
            .iter()
            .map(|l| l.dump_address.clone())
            .collect();
        closest_match(dump_address, &candidates).map(|idx| &self.locations[idx])
    }

    pub fn location_name(&self, payload: &Value) -> Option<String> {
        let address = self.dump_address(payload)?;
        self.closest_location(&address).map(|l| l.name.clone())
    }

    /// Display value for the `location_<site>` spreadsheet column.
    pub fn column_location(&self, payload: &Value) -> Option<String> {
        let address = self.dump_address(payload)?;
        self.closest_location(&address)
            .map(|l| l.column_address.clone())
    }

    /// Is the dump at `path` pinned to `expected_location_name`? A missing or
    /// unreadable file counts as invalid.
    pub fn check_dump_location(&self, path: &Path, expected_location_name: &str) -> bool {
        let Some(payload) = DumpStore::load_optional(path) else {
            warn!("No data in dump: {}", path.display());
            return false;
        };
        match self.location_name(&payload) {
            Some(name) if name == expected_location_name => true,
            other => {
                warn!(
                    "Location mismatch in {}: local {:?}, correct {:?}",
                    path.display(),
                    other,
                    expected_location_name
                );
                false
            }
        }
    }
}
