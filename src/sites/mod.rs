use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::{Location, SiteSettings};
use crate::error::MonitorError;
use crate::models::{ProductRecord, Site};

pub mod blinkit;
pub mod dmart;
pub mod swiggy;
pub mod zepto;

pub use blinkit::BlinkitDriver;
pub use dmart::DmartDriver;
pub use swiggy::SwiggyDriver;
pub use zepto::ZeptoDriver;

/// One site's browser-facing surface: set a delivery location, fetch one
/// product payload, verify a payload's embedded location. Extraction is kept
/// out of the trait — it is pure and runs without a browser.
#[async_trait]
pub trait SiteDriver: Send {
    fn site(&self) -> Site;

    fn settings(&self) -> &SiteSettings;

    async fn switch_location(&mut self, location: &Location) -> Result<(), MonitorError>;

    /// Fetch the raw payload for one product at the current location. The
    /// payload is dumped verbatim; no retry here, the batcher owns retries.
    async fn fetch_product(&mut self, product_id: &str) -> Result<Value, MonitorError>;

    /// Best-effort teardown: close extra tabs, optionally the browser.
    async fn cleanup(&mut self, close_browser: bool);
}

/// Hard check of a payload's embedded delivery address against the expected
/// location. An address that merely failed to record is a soft miss (the
/// checker run will flag the row); a present-but-different address means the
/// site silently reset the location and the batch must stop.
pub fn verify_location(
    site: Site,
    payload: &Value,
    location: &Location,
) -> Result<(), MonitorError> {
    let actual = crate::utils::json::json_get_str(payload, site.dump_address_path());
    match actual {
        None => {
            warn!(
                "{}: no delivery address recorded in payload (expected {:?})",
                site.key(),
                location.locality
            );
            Ok(())
        }
        Some(address) => {
            if address
                .to_lowercase()
                .contains(&location.locality.to_lowercase())
            {
                Ok(())
            } else {
                Err(MonitorError::LocationMismatch {
                    expected: location.locality.clone(),
                    actual: Some(address),
                })
            }
        }
    }
}

/// Site dispatch for the pure payload → record extraction. `ref_mrp` is the
/// cross-site reference MRP used by Swiggy and Dmart variant selection; the
/// shared `location` column value is resolved from the payload's embedded
/// address for every site.
pub fn extract_record(
    site: Site,
    payload: &Value,
    ref_mrp: Option<f64>,
    locations: &[Location],
) -> ProductRecord {
    let mut record = match site {
        Site::Blinkit => blinkit::extract(payload),
        Site::Zepto => zepto::extract(payload),
        Site::Swiggy => swiggy::extract(payload, ref_mrp),
        Site::Dmart => dmart::extract(payload, ref_mrp),
    };
    let extractor = crate::dump::AddressExtractor::new(site, locations);
    record.location = extractor.column_location(payload);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn location() -> Location {
        Location {
            name: "BLR-Sarjapur".into(),
            text: "Sarjapur Road".into(),
            locality: "Sarjapur".into(),
            dump_address: "Sarjapur Road, Bengaluru".into(),
            column_address: "Bangalore - Sarjapur".into(),
        }
    }

    #[test]
    fn test_verify_location_substring_match() {
        let payload = json!({"cookies": {"gr_1_locality": "Sarjapur Road, Bengaluru"}});
        assert!(verify_location(Site::Blinkit, &payload, &location()).is_ok());
    }

    #[test]
    fn test_verify_location_mismatch_is_hard_error() {
        let payload = json!({"cookies": {"gr_1_locality": "Andheri West, Mumbai"}});
        let err = verify_location(Site::Blinkit, &payload, &location()).unwrap_err();
        assert!(matches!(err, MonitorError::LocationMismatch { .. }));
    }

    #[test]
    fn test_verify_location_missing_address_is_soft() {
        let payload = json!({"cookies": {}});
        assert!(verify_location(Site::Blinkit, &payload, &location()).is_ok());
    }
}
