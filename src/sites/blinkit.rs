use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::BrowserClient;
use crate::config::{BrowserSettings, Location, SiteSettings};
use crate::error::MonitorError;
use crate::models::{ProductRecord, Site, StockStatus};
use crate::sites::SiteDriver;
use crate::utils::json::{json_get, json_get_f64, json_get_str};

const BLINKIT_MAIN_URL: &str = "https://blinkit.com";
const BLINKIT_PRN_URL: &str = "https://blinkit.com/prn/x/prid";
const BLINKIT_LAYOUT_MARKER: &str = "/v1/layout/product/";

pub struct BlinkitDriver {
    client: BrowserClient,
    settings: SiteSettings,
}

impl BlinkitDriver {
    pub fn new(browser: BrowserSettings, settings: SiteSettings) -> Self {
        Self {
            client: BrowserClient::new(browser),
            settings,
        }
    }
}

#[async_trait]
impl SiteDriver for BlinkitDriver {
    fn site(&self) -> Site {
        Site::Blinkit
    }

    fn settings(&self) -> &SiteSettings {
        &self.settings
    }

    async fn switch_location(&mut self, location: &Location) -> Result<(), MonitorError> {
        info!("Visiting main page: [{}]", BLINKIT_MAIN_URL);
        self.client.goto(BLINKIT_MAIN_URL).await?;
        sleep(Duration::from_secs(2)).await;

        info!("Setting location: {} ({})", location.name, location.text);
        self.client
            .click("div[class^='LocationBar__SubtitleContainer']")
            .await?;
        sleep(Duration::from_secs(1)).await;
        self.client
            .type_into("input[name='select-locality']", &location.text)
            .await?;
        sleep(Duration::from_secs(2)).await;
        self.client
            .click("div[class^='LocationSearchList__LocationDetailContainer']")
            .await?;
        sleep(Duration::from_secs(2)).await;
        Ok(())
    }

    async fn fetch_product(&mut self, product_id: &str) -> Result<Value, MonitorError> {
        let prn_url = format!("{}/{}", BLINKIT_PRN_URL, product_id);
        info!("Visiting product page: [{}]", product_id);
        info!("  * {}", prn_url);

        // the layout API response carries everything the extractor needs;
        // capture it off the wire instead of scraping the rendered page
        let marker = format!("{}{}", BLINKIT_LAYOUT_MARKER, product_id);
        let mut payload = self
            .client
            .goto_and_capture(
                &prn_url,
                &marker,
                Duration::from_secs(self.settings.fetch_timeout_secs),
            )
            .await?;
        if !payload.is_object() {
            return Err(MonitorError::EmptyResponse(product_id.to_string()));
        }
        let cookies = self.client.cookies_snapshot().await?;
        payload
            .as_object_mut()
            .expect("checked above")
            .insert("cookies".into(), cookies);
        Ok(payload)
    }

    async fn cleanup(&mut self, close_browser: bool) {
        if let Err(e) = self.client.close_other_pages().await {
            warn!("BlinkitDriver cleanup: {}", e);
        }
        if close_browser {
            self.client.close().await;
        }
    }
}

/// Layout payload → flat record. The add-to-cart strip carries the stock
/// state; name/price/mrp/unit live in the SEO tracking block.
pub fn extract(payload: &Value) -> ProductRecord {
    let mut record = ProductRecord::default();

    let snippets = json_get(payload, "response.snippets")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let atc_state = snippets
        .iter()
        .find(|s| {
            json_get_str(s, "widget_type").as_deref() == Some("product_atc_strip")
        })
        .and_then(|s| json_get_str(s, "data.product_state"))
        .map(|s| s.to_lowercase());
    record.in_stock = match atc_state.as_deref() {
        Some("available") => StockStatus::InStock,
        Some("out_of_stock") => StockStatus::OutOfStock,
        _ => StockStatus::Unknown,
    };

    let seo_path = "response.tracking.le_meta.custom_data.seo";
    record.product_name = json_get_str(payload, &format!("{}.product_name", seo_path));
    record.price = json_get_f64(payload, &format!("{}.price", seo_path));
    record.mrp = json_get_f64(payload, &format!("{}.mrp", seo_path));
    record.unit = json_get(payload, &format!("{}.attributes", seo_path))
        .and_then(|v| v.as_array())
        .and_then(|attrs| {
            attrs
                .iter()
                .find(|a| {
                    json_get_str(a, "name")
                        .map(|n| n.eq_ignore_ascii_case("unit"))
                        .unwrap_or(false)
                })
                .and_then(|a| json_get_str(a, "value"))
        });
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn layout_payload(product_state: &str) -> Value {
        json!({
            "response": {
                "snippets": [
                    {"widget_type": "product_image", "data": {}},
                    {"widget_type": "product_atc_strip", "data": {"product_state": product_state}}
                ],
                "tracking": {
                    "le_meta": {
                        "custom_data": {
                            "seo": {
                                "product_name": "Amul Taaza Toned Milk",
                                "price": 27,
                                "mrp": 28,
                                "attributes": [
                                    {"name": "Brand", "value": "Amul"},
                                    {"name": "Unit", "value": "500 ml"}
                                ]
                            }
                        }
                    }
                }
            },
            "cookies": {"gr_1_locality": "Sarjapur"}
        })
    }

    #[test]
    fn test_extract_available_product() {
        let record = extract(&layout_payload("AVAILABLE"));
        assert_eq!(record.product_name.as_deref(), Some("Amul Taaza Toned Milk"));
        assert_eq!(record.price, Some(27.0));
        assert_eq!(record.mrp, Some(28.0));
        assert_eq!(record.unit.as_deref(), Some("500 ml"));
        assert_eq!(record.in_stock, StockStatus::InStock);
    }

    #[test]
    fn test_extract_out_of_stock_and_unknown() {
        assert_eq!(
            extract(&layout_payload("out_of_stock")).in_stock,
            StockStatus::OutOfStock
        );
        assert_eq!(
            extract(&layout_payload("backorder")).in_stock,
            StockStatus::Unknown
        );
        assert_eq!(extract(&json!({})).in_stock, StockStatus::Unknown);
    }
}
