use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::BrowserClient;
use crate::config::{BrowserSettings, Location, SiteSettings};
use crate::error::MonitorError;
use crate::models::{ProductRecord, Site, StockStatus};
use crate::sites::SiteDriver;
use crate::utils::json::{json_get, json_get_f64, json_get_str, json_set};

const ZEPTO_MAIN_URL: &str = "https://www.zeptonow.com";
const ZEPTO_ITEM_URL: &str = "https://www.zeptonow.com/pn/x/pvid";

static FLIGHT_CHUNK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)__next_f\.push\(\[1,\s*"c:(.*?)"\]\)"#).expect("Invalid flight chunk regex")
});

/// Undo JavaScript string escaping (`\"`, `\\`, `\n`, `\uXXXX`, ...) on a
/// flight chunk before JSON-parsing it.
fn unescape_js_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Ok(code) = u32::from_str_radix(&hex, 16) {
                    // surrogate pair
                    if (0xD800..0xDC00).contains(&code) {
                        let mut rest = chars.clone();
                        if rest.next() == Some('\\') && rest.next() == Some('u') {
                            let low_hex: String = rest.by_ref().take(4).collect();
                            if let Ok(low) = u32::from_str_radix(&low_hex, 16) {
                                if (0xDC00..0xE000).contains(&low) {
                                    let combined =
                                        0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                                    if let Some(ch) = char::from_u32(combined) {
                                        out.push(ch);
                                        chars = rest;
                                        continue;
                                    }
                                }
                            }
                        }
                        out.push('\u{FFFD}');
                    } else if let Some(ch) = char::from_u32(code) {
                        out.push(ch);
                    }
                }
            }
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

/// Pull the React flight payloads out of the rendered page. A single chunk is
/// returned as-is, multiple chunks as an array.
pub fn extract_flight_resp(html: &str) -> Result<Value, MonitorError> {
    let mut results = Vec::new();
    for captures in FLIGHT_CHUNK_RE.captures_iter(html) {
        let raw = unescape_js_string(&captures[1]);
        let value: Value = serde_json::from_str(&raw)?;
        results.push(value);
    }
    match results.len() {
        0 => Err(MonitorError::EmptyResponse("no flight chunks in page".into())),
        1 => Ok(results.into_iter().next().expect("len checked")),
        _ => Ok(Value::Array(results)),
    }
}

fn is_element_wrapper(item: &Value) -> bool {
    matches!(item, Value::Array(parts)
        if parts.len() >= 3 && parts[0] == json!("$") && parts[2].is_null())
}

/// Collapse React element encoding: `["$","<tag>",null,{...}]` wrappers are
/// replaced by their props, and single-element lists are uplifted.
pub fn flatten_resp(resp: &Value) -> Value {
    match resp {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                out.insert(key.clone(), flatten_resp(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            if items.len() >= 4 && is_element_wrapper(resp) {
                let dict_items = &items[3..];
                if dict_items.len() == 1 && dict_items[0].is_object() {
                    return flatten_resp(&dict_items[0]);
                }
                return Value::Array(dict_items.iter().map(flatten_resp).collect());
            }
            let mut filtered = Vec::new();
            for item in items {
                if is_element_wrapper(item) {
                    if let Value::Array(parts) = item {
                        for part in &parts[3..] {
                            if part.is_object() || part.is_array() {
                                filtered.push(flatten_resp(part));
                            }
                        }
                    }
                } else if item.is_object() || item.is_array() {
                    filtered.push(flatten_resp(item));
                } else {
                    filtered.push(item.clone());
                }
            }
            if filtered.len() == 1 {
                filtered.into_iter().next().expect("len checked")
            } else {
                Value::Array(filtered)
            }
        }
        other => other.clone(),
    }
}

/// Keep only the product-relevant slice of the flattened payload and blank
/// the bulky widget/meta subtrees before the dump hits disk.
pub fn reduce_resp(resp: &Value) -> Value {
    let mut res = json_get(resp, "children.-1").cloned().unwrap_or_default();
    json_set(&mut res, "pageLayout.widgets", json!([]));
    json_set(
        &mut res,
        "pageLayout.header.widget.data.productInfo.productVariant.l4AttributesResponse",
        json!({}),
    );
    json_set(
        &mut res,
        "pageLayout.header.widget.data.productInfo.productVariant.images",
        json!([]),
    );
    json_set(&mut res, "pageLayout.pageData", json!({}));
    json_set(&mut res, "pageLayout.pageMeta", json!({}));
    json_set(
        &mut res,
        "pageLayout.header.widget.data.productInfo.storeProduct.meta",
        json!({}),
    );
    json_set(&mut res, "externalVendorServiceabilityInfo", json!({}));
    res
}

pub fn clean_resp(resp: &Value) -> Value {
    reduce_resp(&flatten_resp(resp))
}

pub struct ZeptoDriver {
    client: BrowserClient,
    settings: SiteSettings,
}

impl ZeptoDriver {
    /// The Zepto session runs through the configured proxy: the location
    /// switcher and the product fetches share one browser, and a proxy can
    /// only be applied at launch.
    pub fn new(browser: BrowserSettings, settings: SiteSettings) -> Self {
        let proxy = browser.http_proxy.clone();
        Self {
            client: BrowserClient::with_proxy(browser, proxy),
            settings,
        }
    }
}

#[async_trait]
impl SiteDriver for ZeptoDriver {
    fn site(&self) -> Site {
        Site::Zepto
    }

    fn settings(&self) -> &SiteSettings {
        &self.settings
    }

    async fn switch_location(&mut self, location: &Location) -> Result<(), MonitorError> {
        info!("Visiting main page: [{}]", ZEPTO_MAIN_URL);
        self.client.goto(ZEPTO_MAIN_URL).await?;

        info!("Setting location: {} ({})", location.name, location.text);
        sleep(Duration::from_secs(3)).await;
        self.client
            .click("button[aria-label='Select Location']")
            .await?;
        sleep(Duration::from_secs(1)).await;
        self.client
            .type_into(
                "div[data-testid='address-search-input'] input",
                &location.text,
            )
            .await?;
        sleep(Duration::from_secs(2)).await;
        self.client
            .click("div[data-testid='address-search-container'] > div")
            .await?;
        sleep(Duration::from_secs(2)).await;
        self.client
            .click("button[data-testid='location-confirm-btn']")
            .await?;
        sleep(Duration::from_secs(3)).await;
        Ok(())
    }

    async fn fetch_product(&mut self, product_id: &str) -> Result<Value, MonitorError> {
        let item_url = format!("{}/{}", ZEPTO_ITEM_URL, product_id);
        info!("Visiting product page: [{}]", product_id);
        info!("  * {}", item_url);

        self.client.goto(&item_url).await?;
        sleep(Duration::from_secs(4)).await;
        let html = self.client.html().await?;
        let resp = clean_resp(&extract_flight_resp(&html)?);

        let mut payload = Map::new();
        payload.insert("resp".into(), resp);
        payload.insert("cookies".into(), self.client.cookies_snapshot().await?);
        payload.insert(
            "local_storage".into(),
            self.client.local_storage_snapshot().await?,
        );
        Ok(Value::Object(payload))
    }

    async fn cleanup(&mut self, close_browser: bool) {
        if let Err(e) = self.client.close_other_pages().await {
            warn!("ZeptoDriver cleanup: {}", e);
        }
        if close_browser {
            self.client.close().await;
        }
    }
}

/// Flattened payload → flat record. `availableQuantity` drives the stock
/// tri-state; the supersaver price rides along as its own column.
pub fn extract(payload: &Value) -> ProductRecord {
    let mut record = ProductRecord::default();
    let prd_info = "resp.pageLayout.header.widget.data.productInfo";

    record.product_id = json_get_str(payload, "resp.pvid");
    record.product_name = json_get_str(payload, &format!("{}.product.name", prd_info));

    let available = json_get(payload, &format!("{}.storeProduct.availableQuantity", prd_info))
        .and_then(|v| v.as_i64());
    record.in_stock = match available {
        Some(n) if n > 0 => StockStatus::InStock,
        Some(_) => StockStatus::OutOfStock,
        None => StockStatus::Unknown,
    };

    record.price = json_get_f64(
        payload,
        &format!("{}.storeProduct.discountedSellingPrice", prd_info),
    );
    record.mrp = json_get_f64(payload, &format!("{}.storeProduct.mrp", prd_info));
    record.super_price = json_get_f64(
        payload,
        &format!("{}.storeProduct.superSaverSellingPrice", prd_info),
    );
    record.unit = json_get_str(
        payload,
        &format!("{}.productVariant.formattedPacksize", prd_info),
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_flight_resp_from_html() {
        let html = r#"
            <script>self.__next_f.push([1,"c:{\"children\":[\"$\",\"div\",null,{\"pvid\":\"abc\"}]}"])</script>
        "#;
        let resp = extract_flight_resp(html).unwrap();
        assert_eq!(resp, json!({"children": ["$", "div", null, {"pvid": "abc"}]}));
        assert_eq!(flatten_resp(&resp), json!({"children": {"pvid": "abc"}}));
    }

    #[test]
    fn test_extract_flight_resp_empty_page() {
        assert!(extract_flight_resp("<html></html>").is_err());
    }

    #[test]
    fn test_flatten_collapses_element_wrappers() {
        let resp = json!(["$", "div", null, {"a": 1}]);
        assert_eq!(flatten_resp(&resp), json!({"a": 1}));

        let nested = json!({"k": [["$", "span", null, {"x": 1}], {"y": 2}]});
        assert_eq!(flatten_resp(&nested), json!({"k": [{"x": 1}, {"y": 2}]}));

        // single-item lists are uplifted
        let single = json!({"k": [{"x": 1}]});
        assert_eq!(flatten_resp(&single), json!({"k": {"x": 1}}));
    }

    #[test]
    fn test_reduce_takes_last_child_and_blanks_bulk() {
        let resp = json!({
            "children": [
                {"ignored": true},
                {
                    "pvid": "abc",
                    "pageLayout": {
                        "widgets": [1, 2, 3],
                        "pageData": {"big": "blob"},
                        "pageMeta": {"big": "blob"},
                        "header": {"widget": {"data": {"productInfo": {
                            "storeProduct": {"mrp": 99, "meta": {"big": true}},
                            "productVariant": {"images": ["a.jpg"], "l4AttributesResponse": {"x": 1}}
                        }}}}
                    }
                }
            ]
        });
        let reduced = reduce_resp(&resp);
        assert_eq!(json_get(&reduced, "pvid"), Some(&json!("abc")));
        assert_eq!(json_get(&reduced, "pageLayout.widgets"), Some(&json!([])));
        assert_eq!(json_get(&reduced, "pageLayout.pageData"), Some(&json!({})));
        assert_eq!(
            json_get(
                &reduced,
                "pageLayout.header.widget.data.productInfo.productVariant.images"
            ),
            Some(&json!([]))
        );
        // the interesting fields survive
        assert_eq!(
            json_get(
                &reduced,
                "pageLayout.header.widget.data.productInfo.storeProduct.mrp"
            ),
            Some(&json!(99))
        );
    }

    fn zepto_payload(available: Option<i64>) -> Value {
        let mut store_product = json!({
            "discountedSellingPrice": 105,
            "mrp": 120,
            "superSaverSellingPrice": 99
        });
        if let Some(n) = available {
            store_product["availableQuantity"] = json!(n);
        }
        json!({
            "resp": {
                "pvid": "7851f4a9-cab6",
                "pageLayout": {"header": {"widget": {"data": {"productInfo": {
                    "product": {"name": "Tata Salt"},
                    "storeProduct": store_product,
                    "productVariant": {"formattedPacksize": "1 kg"}
                }}}}}
            }
        })
    }

    #[test]
    fn test_extract_in_stock_flags() {
        let record = extract(&zepto_payload(Some(5)));
        assert_eq!(record.in_stock, StockStatus::InStock);
        assert_eq!(record.product_id.as_deref(), Some("7851f4a9-cab6"));
        assert_eq!(record.product_name.as_deref(), Some("Tata Salt"));
        assert_eq!(record.price, Some(105.0));
        assert_eq!(record.mrp, Some(120.0));
        assert_eq!(record.super_price, Some(99.0));
        assert_eq!(record.unit.as_deref(), Some("1 kg"));

        assert_eq!(extract(&zepto_payload(Some(0))).in_stock, StockStatus::OutOfStock);
        assert_eq!(extract(&zepto_payload(None)).in_stock, StockStatus::Unknown);
    }

    #[test]
    fn test_dump_round_trip_extracts_identically() {
        use crate::dump::DumpStore;
        let root = std::env::temp_dir().join(format!("gpm-zepto-rt-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let store = DumpStore::new(&root, "2026-08-06");
        let payload = zepto_payload(Some(3));
        let path = store.dump_path(Site::Zepto, Some("BLR-Sarjapur"), "7851f4a9-cab6");
        store.write(&path, &payload).unwrap();
        let reloaded = DumpStore::load(&path).unwrap();
        assert_eq!(extract(&reloaded), extract(&payload));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_unescape_js_string() {
        assert_eq!(unescape_js_string(r#"a\"b\\c"#), r#"a"b\c"#);
        assert_eq!(unescape_js_string(r"line\nbreak"), "line\nbreak");
        assert_eq!(unescape_js_string("A\\u20b9"), "A₹");
        assert_eq!(unescape_js_string("\\ud83d\\ude00"), "😀");
    }
}
