//! Chromium-backed content source using chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;

use capacity_probe::{ContentSource, Observation, SearchRequest, SourceError, SourceProvider, SourceResult};

use super::render_url;
use crate::config::SourceConfig;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Find the Chromium binary path.
pub fn find_chromium(configured: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.clone());
        }
    }

    if let Ok(p) = std::env::var("CAPACITY_PROBE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one browser per batch.
pub struct ChromiumProvider {
    config: SourceConfig,
}

impl ChromiumProvider {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceProvider for ChromiumProvider {
    async fn open(&self) -> SourceResult<Box<dyn ContentSource>> {
        let chrome_path = find_chromium(self.config.chromium_path.as_ref()).ok_or_else(|| {
            SourceError::Other("Chromium not found; set CAPACITY_PROBE_CHROMIUM_PATH".to_string())
        })?;

        let viewport = self.config.viewport;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(viewport.width, viewport.height)
            .viewport(Viewport {
                width: viewport.width,
                height: viewport.height,
                ..Viewport::default()
            })
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled");
        if let Some(ref user_agent) = self.config.user_agent {
            builder = builder.arg(format!("--user-agent={user_agent}"));
        }
        builder = if self.config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let browser_config = builder
            .build()
            .map_err(|e| SourceError::Other(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SourceError::Other(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match prepare_page(&browser, &self.config).await {
            Ok(page) => page,
            Err(e) => {
                shutdown(browser, handler).await;
                return Err(e);
            }
        };

        tracing::info!(
            headless = self.config.headless,
            width = viewport.width,
            height = viewport.height,
            "Chromium session opened"
        );

        Ok(Box::new(ChromiumSource {
            browser,
            page,
            handler,
            config: self.config.clone(),
            request: None,
            demand: 0,
            seq: 0,
        }))
    }
}

/// Open the working page and install the request headers on it.
async fn prepare_page(browser: &Browser, config: &SourceConfig) -> SourceResult<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| SourceError::Other(format!("failed to create page: {e}")))?;

    let headers = extra_headers(config);
    if !headers.is_empty() {
        let params = SetExtraHttpHeadersParams::new(Headers::new(serde_json::Value::Object(headers)));
        if let Err(e) = page.execute(params).await {
            let _ = page.close().await;
            return Err(SourceError::Other(format!("failed to set request headers: {e}")));
        }
    }
    Ok(page)
}

/// Close a browser that never became a session.
async fn shutdown(mut browser: Browser, handler: JoinHandle<()>) {
    let _ = browser.close().await;
    let _ = browser.wait().await;
    handler.abort();
}

/// `Accept-Language` and `Referer`, when configured.
fn extra_headers(config: &SourceConfig) -> serde_json::Map<String, serde_json::Value> {
    let mut headers = serde_json::Map::new();
    if let Some(ref language) = config.accept_language {
        headers.insert("Accept-Language".to_string(), language.clone().into());
    }
    if let Some(ref referer) = config.referer {
        headers.insert("Referer".to_string(), referer.clone().into());
    }
    headers
}

/// A page that renders the search listing one demand level at a time.
pub struct ChromiumSource {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    config: SourceConfig,
    request: Option<SearchRequest>,
    demand: u32,
    seq: u64,
}

impl ChromiumSource {
    async fn load(&mut self, demand: u32) -> SourceResult<Observation> {
        let request = self.request.as_ref().ok_or(SourceError::Closed)?;
        let url = render_url(&self.config.url_template, request, demand);
        let timeout_ms = self.config.navigation_timeout_ms;
        tracing::debug!(%url, demand, "Loading listing");

        let page = &self.page;
        let navigation = async {
            page.goto(url.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };
        match tokio::time::timeout(Duration::from_millis(timeout_ms), navigation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SourceError::NavigationFailed(e.to_string())),
            Err(_) => {
                return Err(SourceError::InteractionTimeout {
                    operation: "navigate",
                    timeout_ms,
                })
            }
        }

        tokio::time::timeout(Duration::from_millis(timeout_ms), self.wait_ready())
            .await
            .map_err(|_| SourceError::InteractionTimeout {
                operation: "settle",
                timeout_ms,
            })??;

        let selector_ms = self.config.selector_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(selector_ms), self.wait_for_blocks()).await {
            Ok(result) => result?,
            Err(_) => tracing::warn!(
                selector = %self.config.block_selector,
                demand,
                "no offer block rendered within {selector_ms}ms"
            ),
        }
        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

        self.demand = demand;
        self.seq += 1;
        Ok(Observation {
            seq: self.seq,
            demand,
        })
    }

    async fn wait_ready(&self) -> SourceResult<()> {
        loop {
            let state: String = self.eval("document.readyState").await?;
            if state == "complete" {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Poll until at least one element matches the block selector.
    async fn wait_for_blocks(&self) -> SourceResult<()> {
        let script = presence_script(&self.config.block_selector)?;
        loop {
            let present: bool = self.eval(&script).await?;
            if present {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> SourceResult<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| SourceError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| SourceError::Script(format!("failed to convert JS result: {e:?}")))
    }
}

fn js_string(value: &str) -> SourceResult<String> {
    serde_json::to_string(value).map_err(|e| SourceError::Script(e.to_string()))
}

fn listing_script(selector: &str) -> SourceResult<String> {
    let selector = js_string(selector)?;
    Ok(format!(
        "Array.from(document.querySelectorAll({selector})).map(e => (e.innerText || '').trim())"
    ))
}

fn presence_script(selector: &str) -> SourceResult<String> {
    Ok(format!("document.querySelector({}) !== null", js_string(selector)?))
}

#[async_trait]
impl ContentSource for ChromiumSource {
    async fn navigate(&mut self, request: &SearchRequest) -> SourceResult<Observation> {
        self.request = Some(request.clone());
        self.load(request.demand).await
    }

    async fn list_blocks(&mut self, observation: &Observation) -> SourceResult<Vec<String>> {
        if observation.seq != self.seq {
            return Err(SourceError::Other(format!(
                "observation {} is stale, page is at {}",
                observation.seq, self.seq
            )));
        }
        let script = listing_script(&self.config.block_selector)?;
        self.eval(&script).await
    }

    async fn increase_demand(&mut self) -> SourceResult<Observation> {
        self.load(self.demand + 1).await
    }

    async fn capture_snapshot(&mut self) -> SourceResult<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| SourceError::Script(format!("screenshot failed: {e}")))
    }

    async fn close(self: Box<Self>) -> SourceResult<()> {
        let Self {
            mut browser,
            page,
            handler,
            ..
        } = *self;
        let _ = page.close().await;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler.abort();
        tracing::info!("Chromium session closed");
        closed
            .map(|_| ())
            .map_err(|e| SourceError::Other(format!("browser close failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capacity_probe::{build_request, OfferQuery};
    use chrono::NaiveDate;

    #[test]
    fn test_listing_script_quotes_selector() {
        let script = listing_script(r#"li[data-kind="offer"]"#).unwrap();
        assert!(script.contains(r#"querySelectorAll("li[data-kind=\"offer\"]")"#));
    }

    #[test]
    fn test_presence_script_quotes_selector() {
        let script = presence_script("div[aria-label='Voo']").unwrap();
        assert_eq!(script, r#"document.querySelector("div[aria-label='Voo']") !== null"#);
    }

    #[test]
    fn test_extra_headers_follow_config() {
        let mut config: SourceConfig = serde_json::from_str(
            r#"{"url_template": "https://example.test/?adults={demand}", "block_selector": "li"}"#,
        )
        .unwrap();
        let headers = extra_headers(&config);
        assert_eq!(headers.len(), 1);
        assert!(headers["Accept-Language"].as_str().unwrap().starts_with("pt-BR"));

        config.accept_language = None;
        assert!(extra_headers(&config).is_empty());

        config.referer = Some("https://www.google.com/".to_string());
        let headers = extra_headers(&config);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["Referer"], "https://www.google.com/");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_lists_blocks() {
        let mut config: SourceConfig = serde_json::from_str(
            r#"{"url_template": "data:text/html,<ul><li>10:05 AA 954</li><li>demand {demand}</li></ul>", "block_selector": "li"}"#,
        )
        .unwrap();
        config.settle_ms = 0;
        config.navigation_timeout_ms = 10_000;
        config.selector_timeout_ms = 5_000;
        config.interaction_timeout_ms = 10_000;
        let today = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        let query = OfferQuery::one_way("GRU", "MIA", NaiveDate::from_ymd_opt(2026, 11, 2).unwrap());
        let request = build_request(&query, today).unwrap();

        let mut source = ChromiumProvider::new(config).open().await.expect("launch");
        let observation = source.navigate(&request).await.expect("navigate");
        let blocks = source.list_blocks(&observation).await.expect("list");
        assert_eq!(blocks, vec!["10:05 AA 954", "demand 1"]);

        let observation = source.increase_demand().await.expect("increase");
        assert_eq!(observation.demand, 2);
        let blocks = source.list_blocks(&observation).await.expect("list");
        assert_eq!(blocks[1], "demand 2");

        assert!(!source.capture_snapshot().await.expect("screenshot").is_empty());
        source.close().await.expect("close");
    }
}
