use std::collections::HashMap;
use std::time::Duration;

use fantoccini::{Client, ClientBuilder};
use fieldtrip_common::{FieldtripError, Locator, Result, ViewportPolicy, WaitCondition};
use serde_json::json;
use tracing::{debug, info, warn};
use webdriver::capabilities::Capabilities;

use crate::fieldtrip_browser::page::FieldtripPage;

/// Chromedriver's default endpoint.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// How a browser session is launched and how its waits poll.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub viewport: ViewportPolicy,
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: false,
            viewport: ViewportPolicy::default(),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Thin wrapper around a `fantoccini` WebDriver client owning one browser
/// session.
///
/// The client lives in an `Option` so [`FieldtripDriver::close`] stays
/// idempotent and safe even when `start` never fully succeeded.
pub struct FieldtripDriver {
    client: Option<Client>,
    viewport: (u32, u32),
    poll_interval: Duration,
}

impl FieldtripDriver {
    /// Launch a browser session against a running WebDriver service and
    /// apply the viewport policy.
    ///
    /// Any failure before the session is usable maps to
    /// [`FieldtripError::SessionStart`]; a half-configured browser is closed
    /// before the error is returned.
    pub async fn start(options: SessionOptions) -> Result<Self> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();

        let mut args: Vec<String> = vec![
            "--disable-dev-shm-usage".to_string(),
            "--no-sandbox".to_string(),
        ];
        if let ViewportPolicy::Fixed { width, height } = options.viewport {
            args.push(format!("--window-size={},{}", width, height));
        }
        if options.headless {
            args.push("--headless".to_string());
            args.push("--disable-gpu".to_string());
        }
        chrome_opts.insert("args".to_string(), json!(args));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await
            .map_err(|e| {
                FieldtripError::SessionStart(format!(
                    "webdriver connect to {} failed: {e}",
                    options.webdriver_url
                ))
            })?;

        let viewport = match apply_viewport(&client, options.viewport).await {
            Ok(size) => size,
            Err(e) => {
                let _ = client.close().await;
                return Err(FieldtripError::SessionStart(format!(
                    "viewport setup failed: {e}"
                )));
            }
        };

        info!(
            target: "browser.session",
            width = viewport.0,
            height = viewport.1,
            headless = options.headless,
            "browser session started"
        );

        Ok(Self {
            client: Some(client),
            viewport,
            poll_interval: options.poll_interval,
        })
    }

    /// Window dimensions recorded when the session started.
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Navigate to `url`, blocking until the document is interactive.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let client = self.client()?;
        info!(target: "browser.session", %url, "navigating");
        client.goto(url).await.map_err(|e| FieldtripError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Page-level interaction handle sharing this session.
    pub fn page(&self) -> Result<FieldtripPage> {
        Ok(FieldtripPage::new(self.client()?.clone(), self.poll_interval))
    }

    /// Try to dismiss a blocking overlay such as a consent banner.
    ///
    /// Returns `Ok(false)` when the dialog never appears within the
    /// timeout; that is an expected outcome, not a failure.
    pub async fn dismiss_blocking_dialog(&self, locator: &Locator, timeout: Duration) -> Result<bool> {
        let page = self.page()?;
        match page.wait_for(locator, WaitCondition::Clickable, timeout).await {
            Ok(control) => {
                let (x, y) = control.click_at_center().await?;
                info!(target: "browser.session", %locator, x, y, "dismissed blocking dialog");
                Ok(true)
            }
            Err(FieldtripError::ElementNotReady { .. }) => {
                debug!(target: "browser.session", %locator, "no blocking dialog appeared");
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    /// Release the browser session. Idempotent; later calls are no-ops. A
    /// failed session delete is logged at warn level, never raised.
    pub async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            match client.close().await {
                Ok(()) => info!(target: "browser.session", "browser session closed"),
                Err(e) => {
                    warn!(target: "browser.session", error = %e, "browser session delete failed");
                }
            }
        }
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| FieldtripError::Driver(anyhow::anyhow!("browser session already closed")))
    }
}

async fn apply_viewport(
    client: &Client,
    policy: ViewportPolicy,
) -> std::result::Result<(u32, u32), fantoccini::error::CmdError> {
    match policy {
        ViewportPolicy::Maximize => client.maximize_window().await?,
        ViewportPolicy::Fixed { width, height } => {
            client.set_window_size(width, height).await?;
        }
    }
    let (width, height) = client.get_window_size().await?;
    Ok((width as u32, height as u32))
}
