use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::BrowserClient;
use crate::config::{BrowserSettings, Location, SiteSettings};
use crate::error::MonitorError;
use crate::models::{pick_closest_mrp, ProductRecord, Site, StockStatus};
use crate::sites::SiteDriver;
use crate::utils::json::{json_get, json_get_f64, json_get_str, json_set};

const SWIGGY_MAIN_URL: &str = "https://www.swiggy.com";
const SWIGGY_ITEM_URL: &str = "https://www.swiggy.com/stores/instamart/item";

/// Blank the bulky store/footer blobs before the state snapshot hits disk.
pub fn clean_resp(resp: &mut Value) {
    json_set(resp, "storeDetailsV2", json!({}));
    json_set(resp, "misc", json!({}));
    json_set(resp, "instamart.footerData", json!({}));
    json_set(resp, "instamart.cachedProductItemData.widgetsState", json!([]));
}

pub struct SwiggyDriver {
    client: BrowserClient,
    settings: SiteSettings,
}

impl SwiggyDriver {
    pub fn new(browser: BrowserSettings, settings: SiteSettings) -> Self {
        Self {
            client: BrowserClient::new(browser),
            settings,
        }
    }
}

#[async_trait]
impl SiteDriver for SwiggyDriver {
    fn site(&self) -> Site {
        Site::Swiggy
    }

    fn settings(&self) -> &SiteSettings {
        &self.settings
    }

    async fn switch_location(&mut self, location: &Location) -> Result<(), MonitorError> {
        info!("Visiting main page: [{}]", SWIGGY_MAIN_URL);
        self.client.goto(SWIGGY_MAIN_URL).await?;

        info!("Setting location: {} ({})", location.name, location.text);
        sleep(Duration::from_secs(3)).await;
        self.client
            .click("div[data-testid='location-address-holder']")
            .await?;
        sleep(Duration::from_secs(1)).await;
        self.client
            .type_into("input[placeholder*='Search for area']", &location.text)
            .await?;
        sleep(Duration::from_secs(3)).await;
        self.client
            .click("div[data-testid='address-suggestion-list'] > div")
            .await?;
        sleep(Duration::from_secs(3)).await;
        Ok(())
    }

    async fn fetch_product(&mut self, product_id: &str) -> Result<Value, MonitorError> {
        let item_url = format!("{}/{}", SWIGGY_ITEM_URL, product_id);
        info!("Visiting product page: [{}]", product_id);
        info!("  * {}", item_url);

        self.client.goto(&item_url).await?;
        sleep(Duration::from_secs(4)).await;
        // the rendered page hydrates from a single injected state object
        let state = self
            .client
            .eval_json("JSON.stringify(window.___INITIAL_STATE___)")
            .await?;
        let raw = state.as_str().unwrap_or("null");
        let mut payload: Value = serde_json::from_str(raw)?;
        if !payload.is_object() {
            return Err(MonitorError::EmptyResponse(product_id.to_string()));
        }
        clean_resp(&mut payload);
        let cookies = self.client.cookies_snapshot().await?;
        payload
            .as_object_mut()
            .expect("checked above")
            .insert("cookies".into(), cookies);
        Ok(payload)
    }

    async fn cleanup(&mut self, close_browser: bool) {
        if let Err(e) = self.client.close_other_pages().await {
            warn!("SwiggyDriver cleanup: {}", e);
        }
        if close_browser {
            self.client.close().await;
        }
    }
}

/// State snapshot → flat record. A page can list several SKU variations; the
/// tracked one is the variation whose MRP sits closest to the reference MRP
/// extracted from another site for the same master row.
pub fn extract(payload: &Value, ref_mrp: Option<f64>) -> ProductRecord {
    let mut record = ProductRecord::default();
    let item_state = json_get(payload, "instamart.cachedProductItemData.lastItemState")
        .cloned()
        .unwrap_or_default();

    record.product_id = match json_get(&item_state, "product_id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    record.in_stock = match json_get(&item_state, "in_stock").and_then(|v| v.as_bool()) {
        Some(true) => StockStatus::InStock,
        Some(false) => StockStatus::OutOfStock,
        None => StockStatus::Unknown,
    };

    let variations = json_get(&item_state, "variations")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let chosen = ref_mrp
        .and_then(|reference| {
            pick_closest_mrp(&variations, |v| json_get_f64(v, "price.mrp"), reference)
        })
        .unwrap_or(0);
    if let Some(variation) = variations.get(chosen) {
        record.product_name = json_get_str(variation, "display_name");
        record.price = json_get_f64(variation, "price.offer_price");
        record.mrp = json_get_f64(variation, "price.mrp");
        record.unit = json_get_str(variation, "quantity");
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn swiggy_payload() -> Value {
        json!({
            "instamart": {
                "cachedProductItemData": {
                    "lastItemState": {
                        "product_id": "YR2XETQJK3",
                        "in_stock": true,
                        "variations": [
                            {
                                "display_name": "Aashirvaad Atta 5 kg",
                                "quantity": "5 kg",
                                "price": {"offer_price": 240, "mrp": 280}
                            },
                            {
                                "display_name": "Aashirvaad Atta 10 kg",
                                "quantity": "10 kg",
                                "price": {"offer_price": 460, "mrp": 540}
                            }
                        ]
                    },
                    "widgetsState": []
                }
            },
            "userLocation": {"address": "Sarjapur Road, Bengaluru"}
        })
    }

    #[test]
    fn test_extract_defaults_to_first_variation() {
        let record = extract(&swiggy_payload(), None);
        assert_eq!(record.product_name.as_deref(), Some("Aashirvaad Atta 5 kg"));
        assert_eq!(record.price, Some(240.0));
        assert_eq!(record.mrp, Some(280.0));
        assert_eq!(record.in_stock, StockStatus::InStock);
    }

    #[test]
    fn test_extract_picks_variation_closest_to_ref_mrp() {
        let record = extract(&swiggy_payload(), Some(550.0));
        assert_eq!(record.product_name.as_deref(), Some("Aashirvaad Atta 10 kg"));
        assert_eq!(record.unit.as_deref(), Some("10 kg"));
        assert_eq!(record.mrp, Some(540.0));
    }

    #[test]
    fn test_extract_empty_state() {
        let record = extract(&json!({}), None);
        assert_eq!(record.in_stock, StockStatus::Unknown);
        assert_eq!(record.product_name, None);
    }

    #[test]
    fn test_clean_resp_blanks_bulk() {
        let mut payload = swiggy_payload();
        payload["storeDetailsV2"] = json!({"big": "blob"});
        payload["misc"] = json!({"big": "blob"});
        clean_resp(&mut payload);
        assert_eq!(payload["storeDetailsV2"], json!({}));
        assert_eq!(payload["misc"], json!({}));
        // product data untouched
        assert!(payload["instamart"]["cachedProductItemData"]["lastItemState"].is_object());
    }
}
