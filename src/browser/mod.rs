use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;
use crate::error::MonitorError;

/// Thin client over one Chromium instance. One page is reused across a run;
/// the browser-automation layer itself is supplied by chromiumoxide, this
/// wrapper only adds the snapshot and capture helpers the scrapers need.
pub struct BrowserClient {
    settings: BrowserSettings,
    proxy: Option<String>,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    page: Option<Arc<Page>>,
}

impl BrowserClient {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            proxy: None,
            browser: None,
            handler_task: None,
            page: None,
        }
    }

    /// A client whose browser is launched with a proxy. The proxy cannot be
    /// changed after launch, so proxied clients must be started before any
    /// unproxied client shares the session.
    pub fn with_proxy(settings: BrowserSettings, proxy: Option<String>) -> Self {
        Self {
            proxy,
            ..Self::new(settings)
        }
    }

    pub async fn start(&mut self) -> Result<(), MonitorError> {
        if self.browser.is_some() {
            return Ok(());
        }
        info!("Launching browser (headless: {})", self.settings.headless);
        let mut builder = BrowserConfig::builder().window_size(1366, 860);
        if self.settings.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        for arg in &self.settings.chrome_args {
            builder = builder.arg(arg.clone());
        }
        let config = builder
            .build()
            .map_err(MonitorError::BrowserInit)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| MonitorError::BrowserInit(e.to_string()))?;
        let task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });
        self.browser = Some(browser);
        self.handler_task = Some(task);
        Ok(())
    }

    fn browser(&self) -> Result<&Browser, MonitorError> {
        self.browser
            .as_ref()
            .ok_or_else(|| MonitorError::BrowserInit("browser not started".into()))
    }

    /// The shared page, created on first use.
    pub async fn page(&mut self) -> Result<Arc<Page>, MonitorError> {
        self.start().await?;
        if let Some(page) = &self.page {
            return Ok(page.clone());
        }
        let page = self
            .browser()?
            .new_page("about:blank")
            .await
            .map_err(|e| MonitorError::BrowserInit(e.to_string()))?;
        page.execute(EnableParams::default())
            .await
            .map_err(|e| MonitorError::BrowserInit(e.to_string()))?;
        let page = Arc::new(page);
        self.page = Some(page.clone());
        Ok(page)
    }

    pub async fn goto(&mut self, url: &str) -> Result<Arc<Page>, MonitorError> {
        let page = self.page().await?;
        page.goto(url)
            .await
            .map_err(|e| MonitorError::Navigation(format!("{}: {}", url, e)))?;
        if let Err(e) = page.wait_for_navigation().await {
            // pages with long-polling assets never settle; the scrapers wait
            // on concrete signals instead
            debug!("wait_for_navigation ended early for {}: {}", url, e);
        }
        Ok(page)
    }

    /// Navigate and capture the body of the first network response whose URL
    /// contains `url_marker`. The listener is attached before navigation so
    /// early responses are not lost.
    pub async fn goto_and_capture(
        &mut self,
        url: &str,
        url_marker: &str,
        timeout: Duration,
    ) -> Result<Value, MonitorError> {
        let page = self.page().await?;
        let mut events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| MonitorError::BrowserInit(e.to_string()))?;
        page.goto(url)
            .await
            .map_err(|e| MonitorError::Navigation(format!("{}: {}", url, e)))?;
        debug!("Listening for response: {}", url_marker);

        let capture = async {
            while let Some(event) = events.next().await {
                let packet_url = &event.response.url;
                if !packet_url.contains(url_marker) {
                    continue;
                }
                debug!("Response packet captured: {}", packet_url);
                let body = page
                    .execute(GetResponseBodyParams::new(event.request_id.clone()))
                    .await
                    .map_err(|e| MonitorError::Navigation(e.to_string()))?;
                let raw = if body.base64_encoded {
                    let bytes = BASE64
                        .decode(body.body.as_bytes())
                        .map_err(|e| MonitorError::Navigation(e.to_string()))?;
                    String::from_utf8_lossy(&bytes).into_owned()
                } else {
                    body.body.clone()
                };
                let value: Value = serde_json::from_str(&raw)?;
                return Ok(value);
            }
            Err(MonitorError::Timeout(format!(
                "response stream closed before {}",
                url_marker
            )))
        };
        tokio::time::timeout(timeout, capture)
            .await
            .map_err(|_| MonitorError::Timeout(format!("no response for {}", url_marker)))?
    }

    pub async fn html(&self) -> Result<String, MonitorError> {
        let page = self.current_page()?;
        page.content()
            .await
            .map_err(|e| MonitorError::Navigation(e.to_string()))
    }

    fn current_page(&self) -> Result<Arc<Page>, MonitorError> {
        self.page
            .clone()
            .ok_or_else(|| MonitorError::BrowserInit("no active page".into()))
    }

    /// Evaluate an expression and deserialize its JSON result.
    pub async fn eval_json(&self, expr: &str) -> Result<Value, MonitorError> {
        let page = self.current_page()?;
        let result = page
            .evaluate(expr)
            .await
            .map_err(|e| MonitorError::Eval(e.to_string()))?;
        result
            .into_value::<Value>()
            .map_err(|e| MonitorError::Eval(e.to_string()))
    }

    pub async fn click(&self, selector: &str) -> Result<(), MonitorError> {
        let page = self.current_page()?;
        page.find_element(selector)
            .await
            .map_err(|e| MonitorError::ElementNotFound(format!("{}: {}", selector, e)))?
            .click()
            .await
            .map_err(|e| MonitorError::Navigation(format!("click {}: {}", selector, e)))?;
        Ok(())
    }

    pub async fn type_into(&self, selector: &str, text: &str) -> Result<(), MonitorError> {
        let page = self.current_page()?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|e| MonitorError::ElementNotFound(format!("{}: {}", selector, e)))?;
        element
            .click()
            .await
            .map_err(|e| MonitorError::Navigation(format!("focus {}: {}", selector, e)))?;
        element
            .type_str(text)
            .await
            .map_err(|e| MonitorError::Navigation(format!("type into {}: {}", selector, e)))?;
        Ok(())
    }

    /// Cookie snapshot as a flat `name -> value` object, plus the page URL
    /// and capture time. Embedded into dumps for later location verification.
    pub async fn cookies_snapshot(&self) -> Result<Value, MonitorError> {
        let page = self.current_page()?;
        let cookies = page
            .get_cookies()
            .await
            .map_err(|e| MonitorError::Navigation(e.to_string()))?;
        let mut map = Map::new();
        for cookie in cookies {
            map.insert(cookie.name.clone(), Value::from(cookie.value.clone()));
        }
        map.insert("url".into(), Value::from(page.url().await.ok().flatten().unwrap_or_default()));
        map.insert("now".into(), Value::from(now_str()));
        Ok(Value::Object(map))
    }

    /// localStorage snapshot, with JSON-encoded entries parsed into objects.
    pub async fn local_storage_snapshot(&self) -> Result<Value, MonitorError> {
        let raw = self
            .eval_json(
                r#"
                (function() {
                    var out = {};
                    for (var i = 0; i < localStorage.length; i++) {
                        var key = localStorage.key(i);
                        out[key] = localStorage.getItem(key);
                    }
                    return JSON.stringify(out);
                })()
                "#,
            )
            .await?;
        let raw_str = raw.as_str().unwrap_or("{}");
        let flat: Map<String, Value> =
            serde_json::from_str(raw_str).unwrap_or_default();
        let mut map = Map::new();
        for (key, value) in flat {
            let parsed = value
                .as_str()
                .and_then(|s| serde_json::from_str::<Value>(s).ok())
                .unwrap_or(value);
            map.insert(key, parsed);
        }
        Ok(Value::Object(map))
    }

    /// Close every page except the active one.
    pub async fn close_other_pages(&self) -> Result<(), MonitorError> {
        let Some(keep) = &self.page else {
            return Ok(());
        };
        let pages = self
            .browser()?
            .pages()
            .await
            .map_err(|e| MonitorError::Navigation(e.to_string()))?;
        for page in pages {
            if page.target_id() != keep.target_id() {
                if let Err(e) = page.close().await {
                    warn!("Failed to close extra page: {}", e);
                }
            }
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        info!("Browser closed");
    }
}

fn now_str() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
