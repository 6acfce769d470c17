use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::BrowserClient;
use crate::config::{BrowserSettings, Location, SiteSettings};
use crate::dump::encode_product_id;
use crate::error::MonitorError;
use crate::models::{pick_closest_mrp, ProductRecord, Site, StockStatus};
use crate::sites::SiteDriver;
use crate::utils::json::{json_blank_keys, json_get, json_get_f64, json_get_str, json_set};
use crate::utils::text::clean_text;

const DMART_MAIN_URL: &str = "https://www.dmart.in";
const DMART_ITEM_URL: &str = "https://www.dmart.in/product";

/// Parse the Next.js data island embedded in the product page.
pub fn extract_next_data(html: &str) -> Result<Value, MonitorError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__[type='application/json']")
        .map_err(|_| MonitorError::EmptyResponse("bad __NEXT_DATA__ selector".into()))?;
    let element = document
        .select(&selector)
        .next()
        .ok_or_else(|| MonitorError::EmptyResponse("no __NEXT_DATA__ script in page".into()))?;
    let text: String = element.text().collect();
    Ok(serde_json::from_str(text.trim())?)
}

/// Keep `props.pageProps` and blank the bulky widget/description subtrees.
pub fn clean_resp(next_data: &Value) -> Value {
    let mut res = json_get(next_data, "props.pageProps")
        .cloned()
        .unwrap_or_default();
    json_set(&mut res, "pdpData.dynamicPDP.data.widgets", json!([]));
    json_set(&mut res, "pdpData.dynamicPDP.data.customizeAttributes", json!({}));
    json_blank_keys(
        &mut res,
        &|key| key.to_lowercase().contains("descriptiontabs"),
        &json!([]),
    );
    res
}

/// Dmart stores a JSON blob, percent-encoded, in its `guest` cookie. Decode
/// every cookie value that turns out to be encoded JSON so the location
/// checker can address into it.
pub fn decode_cookie_values(cookies: Value) -> Value {
    let Value::Object(map) = cookies else {
        return cookies;
    };
    let mut out = Map::new();
    for (key, value) in map {
        let decoded = value
            .as_str()
            .and_then(|s| percent_decode_str(s).decode_utf8().ok())
            .and_then(|s| serde_json::from_str::<Value>(&s).ok());
        out.insert(key, decoded.unwrap_or(value));
    }
    Value::Object(out)
}

pub struct DmartDriver {
    client: BrowserClient,
    settings: SiteSettings,
}

impl DmartDriver {
    pub fn new(browser: BrowserSettings, settings: SiteSettings) -> Self {
        Self {
            client: BrowserClient::new(browser),
            settings,
        }
    }

    async fn current_location_ok(&self, location: &Location) -> bool {
        let Ok(cookies) = self.client.cookies_snapshot().await else {
            return false;
        };
        let cookies = decode_cookie_values(cookies);
        json_get_str(&cookies, "guest.preferredPIN")
            .map(|pin| pin.to_lowercase().contains(&location.locality.to_lowercase()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SiteDriver for DmartDriver {
    fn site(&self) -> Site {
        Site::Dmart
    }

    fn settings(&self) -> &SiteSettings {
        &self.settings
    }

    async fn switch_location(&mut self, location: &Location) -> Result<(), MonitorError> {
        info!("Visiting main page: [{}]", DMART_MAIN_URL);
        self.client.goto(DMART_MAIN_URL).await?;

        if self.current_location_ok(location).await {
            info!("Location already correctly set. Skip.");
            return Ok(());
        }

        info!("Setting location: {} ({})", location.name, location.text);
        sleep(Duration::from_secs(3)).await;
        self.client.click("div[class^='header_pincode']").await?;
        sleep(Duration::from_secs(1)).await;
        self.client.type_into("#pincodeInput", &location.text).await?;
        sleep(Duration::from_secs(2)).await;
        self.client
            .click("li[class^='pincode-widget_pincode-item']")
            .await?;
        sleep(Duration::from_secs(2)).await;
        self.client
            .click("div[class^='pincode-widget_success-cntr-footer'] button")
            .await?;
        sleep(Duration::from_secs(3)).await;
        Ok(())
    }

    async fn fetch_product(&mut self, product_id: &str) -> Result<Value, MonitorError> {
        let item_url = format!("{}/{}", DMART_ITEM_URL, product_id);
        info!("Visiting product page: [{}]", product_id);
        info!("  * {}", item_url);

        self.client.goto(&item_url).await?;
        sleep(Duration::from_secs(4)).await;
        let html = self.client.html().await?;
        let resp = clean_resp(&extract_next_data(&html)?);

        let mut payload = Map::new();
        payload.insert("resp".into(), resp);
        payload.insert(
            "cookies".into(),
            decode_cookie_values(self.client.cookies_snapshot().await?),
        );
        payload.insert(
            "product_id".into(),
            Value::from(encode_product_id(Site::Dmart, product_id)),
        );
        Ok(Value::Object(payload))
    }

    async fn cleanup(&mut self, close_browser: bool) {
        if let Err(e) = self.client.close_other_pages().await {
            warn!("DmartDriver cleanup: {}", e);
        }
        if close_browser {
            self.client.close().await;
        }
    }
}

fn sku_mrp(sku: &Value) -> Option<f64> {
    json_get_f64(sku, "priceMRP")
}

/// Page-props payload → flat record. The selected SKU is resolved through
/// `selectedProd`, falling back to the reference-MRP heuristic, then to the
/// first SKU. A page without SKUs yields an `N/A` stock cell.
pub fn extract(payload: &Value, ref_mrp: Option<f64>) -> ProductRecord {
    let mut record = ProductRecord {
        product_id: json_get_str(payload, "product_id"),
        ..ProductRecord::default()
    };

    let skus = json_get(payload, "resp.pdpData.dynamicPDP.data.productData.sKUs")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    if skus.is_empty() {
        warn!("No skus found in response data");
        return record;
    }

    let selected_prod = json_get_str(payload, "resp.selectedProd");
    let sku = selected_prod
        .as_deref()
        .and_then(|selected| {
            skus.iter()
                .find(|u| json_get_str(u, "skuUniqueId").as_deref() == Some(selected))
        })
        .or_else(|| {
            ref_mrp
                .and_then(|reference| pick_closest_mrp(&skus, sku_mrp, reference))
                .and_then(|idx| skus.get(idx))
        })
        .or_else(|| skus.first());

    if let Some(sku) = sku {
        // names come out of the HTML data island with entities and stray
        // whitespace intact
        record.product_name = json_get_str(sku, "name").map(|s| clean_text(&s));
        // prices arrive as decimal strings and are reported as whole rupees
        record.price = json_get_f64(sku, "priceSALE").map(f64::trunc);
        record.mrp = sku_mrp(sku).map(f64::trunc);
        record.unit = json_get_str(sku, "variantTextValue");
        record.in_stock = StockStatus::InStock;
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dmart_payload(selected: Option<&str>) -> Value {
        let mut resp = json!({
            "pdpData": {"dynamicPDP": {"data": {"productData": {"sKUs": [
                {
                    "skuUniqueId": "713128",
                    "name": "Fortune Chakki Fresh Atta 5 kg",
                    "priceSALE": "249.00",
                    "priceMRP": "280.00",
                    "variantTextValue": "5 kg"
                },
                {
                    "skuUniqueId": "713129",
                    "name": "Fortune Chakki Fresh Atta 10 kg",
                    "priceSALE": "480.00",
                    "priceMRP": "545.00",
                    "variantTextValue": "10 kg"
                }
            ]}}}}
        });
        if let Some(s) = selected {
            resp["selectedProd"] = json!(s);
        }
        json!({
            "resp": resp,
            "cookies": {"guest": {"preferredPIN": "Sarjapur"}},
            "product_id": "fortune-chakki-fresh-atta"
        })
    }

    #[test]
    fn test_extract_selected_prod_wins() {
        let record = extract(&dmart_payload(Some("713129")), Some(280.0));
        assert_eq!(
            record.product_name.as_deref(),
            Some("Fortune Chakki Fresh Atta 10 kg")
        );
        assert_eq!(record.price, Some(480.0));
        assert_eq!(record.mrp, Some(545.0));
        assert_eq!(record.in_stock, StockStatus::InStock);
    }

    #[test]
    fn test_extract_falls_back_to_ref_mrp() {
        let record = extract(&dmart_payload(None), Some(550.0));
        assert_eq!(record.unit.as_deref(), Some("10 kg"));
    }

    #[test]
    fn test_extract_falls_back_to_first_sku() {
        let record = extract(&dmart_payload(None), None);
        assert_eq!(record.unit.as_deref(), Some("5 kg"));
        assert_eq!(record.price, Some(249.0));
    }

    #[test]
    fn test_extract_no_skus_is_na() {
        let payload = json!({"resp": {}, "product_id": "x"});
        let record = extract(&payload, None);
        assert_eq!(record.in_stock, StockStatus::Unknown);
        assert_eq!(record.product_id.as_deref(), Some("x"));
        assert_eq!(record.price, None);
    }

    #[test]
    fn test_extract_next_data_and_clean() {
        let html = r#"
            <html><body>
            <script id="__NEXT_DATA__" type="application/json">
                {"props": {"pageProps": {
                    "pdpData": {"dynamicPDP": {"data": {
                        "widgets": [1, 2],
                        "customizeAttributes": {"a": 1},
                        "productData": {"descriptionTabs": ["x"], "sKUs": []}
                    }}}
                }}}
            </script>
            </body></html>
        "#;
        let next_data = extract_next_data(html).unwrap();
        let cleaned = clean_resp(&next_data);
        assert_eq!(
            json_get(&cleaned, "pdpData.dynamicPDP.data.widgets"),
            Some(&json!([]))
        );
        assert_eq!(
            json_get(&cleaned, "pdpData.dynamicPDP.data.productData.descriptionTabs"),
            Some(&json!([]))
        );
    }

    #[test]
    fn test_decode_cookie_values() {
        let cookies = json!({
            "guest": "%7B%22preferredPIN%22%3A%22Sarjapur%22%7D",
            "plain": "hello"
        });
        let decoded = decode_cookie_values(cookies);
        assert_eq!(
            json_get_str(&decoded, "guest.preferredPIN").as_deref(),
            Some("Sarjapur")
        );
        assert_eq!(decoded["plain"], json!("hello"));
    }
}
