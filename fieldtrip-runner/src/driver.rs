//! The capability seam between scenario execution and the browser.
//!
//! Scenarios run against [`SessionDriver`], never against fantoccini
//! types. Production wires in [`WebDriverSession`]; the interpreter tests
//! script the trait directly and need no browser at all.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use fieldtrip_common::{FieldtripError, Locator, Result, WaitCondition};
use fieldtrip_drivers::fieldtrip_browser::{
    FieldtripDriver, FieldtripElement, FieldtripPage, SessionOptions, WindowHandle,
};

/// Opaque identifier for one browsing context (tab or window).
///
/// Identifiers are only meaningful within the session that produced them;
/// equality is all a caller may rely on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a scenario needs from a live browser session.
///
/// Item operations take the item locator plus an index and re-resolve the
/// match on every call: detail visits navigate between contexts, and a
/// held element reference would go stale across that boundary.
#[async_trait::async_trait]
pub trait SessionDriver: Send {
    /// Window dimensions recorded when the session started.
    fn viewport(&self) -> (u32, u32);

    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Try to dismiss a blocking dialog; `Ok(false)` means none appeared.
    async fn dismiss_blocking_dialog(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<bool>;

    /// Wait until the target is clickable, then click its center. Returns
    /// the computed center for reporting.
    async fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(i64, i64)>;

    async fn read_text(&mut self, locator: &Locator, timeout: Duration) -> Result<String>;

    async fn read_attribute(
        &mut self,
        locator: &Locator,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<String>>;

    /// Scroll the target into view without clicking it.
    async fn scroll_to(&mut self, locator: &Locator, timeout: Duration) -> Result<()>;

    async fn scroll_down_pages(&mut self, pages: u32) -> Result<()>;

    /// Number of elements matching `items` once the match count settles.
    async fn count_items(&mut self, items: &Locator, timeout: Duration) -> Result<usize>;

    /// Label of the `index`-th item: the text of `inner` resolved relative
    /// to the item when given, the item's own text otherwise.
    async fn item_label(
        &mut self,
        items: &Locator,
        index: usize,
        inner: Option<&Locator>,
    ) -> Result<String>;

    async fn item_attribute(
        &mut self,
        items: &Locator,
        index: usize,
        name: &str,
    ) -> Result<Option<String>>;

    /// Scroll the `index`-th item into view and click its center.
    async fn click_item(&mut self, items: &Locator, index: usize) -> Result<(i64, i64)>;

    async fn window_handles(&mut self) -> Result<Vec<ContextId>>;

    async fn current_window(&mut self) -> Result<ContextId>;

    async fn switch_to_window(&mut self, context: &ContextId) -> Result<()>;

    /// Close the current context. The driver does not switch anywhere
    /// afterwards; callers follow up with [`SessionDriver::switch_to_window`].
    async fn close_window(&mut self) -> Result<()>;
}

/// Concrete session backed by the fantoccini-based driver.
pub struct WebDriverSession {
    driver: FieldtripDriver,
    page: FieldtripPage,
    // WindowHandle does not round-trip through a string, so every handle
    // seen is kept here keyed by the id handed out for it.
    known_windows: HashMap<ContextId, WindowHandle>,
}

impl WebDriverSession {
    pub async fn start(options: SessionOptions) -> Result<Self> {
        let driver = FieldtripDriver::start(options).await?;
        let page = driver.page()?;
        Ok(Self {
            driver,
            page,
            known_windows: HashMap::new(),
        })
    }

    pub async fn close(&mut self) {
        self.driver.close().await;
    }

    async fn nth_item(&self, items: &Locator, index: usize) -> Result<FieldtripElement> {
        let matches = self.page.find_all(items).await?;
        matches
            .into_iter()
            .nth(index)
            .ok_or_else(|| FieldtripError::ElementNotReady {
                locator: format!("{items} [item {}]", index + 1),
                waited_ms: 0,
            })
    }

    fn remember(&mut self, handle: WindowHandle) -> ContextId {
        let id = ContextId::new(format!("{handle:?}"));
        self.known_windows.insert(id.clone(), handle);
        id
    }
}

#[async_trait::async_trait]
impl SessionDriver for WebDriverSession {
    fn viewport(&self) -> (u32, u32) {
        self.driver.viewport()
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.driver.navigate(url).await
    }

    async fn dismiss_blocking_dialog(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<bool> {
        self.driver.dismiss_blocking_dialog(locator, timeout).await
    }

    async fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(i64, i64)> {
        let element = self
            .page
            .wait_for(locator, WaitCondition::Clickable, timeout)
            .await?;
        element.click_at_center().await
    }

    async fn read_text(&mut self, locator: &Locator, timeout: Duration) -> Result<String> {
        let element = self
            .page
            .wait_for(locator, WaitCondition::Visible, timeout)
            .await?;
        element.read_text().await
    }

    async fn read_attribute(
        &mut self,
        locator: &Locator,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        // Presence suffices: attributes are readable on hidden elements.
        let element = self
            .page
            .wait_for(locator, WaitCondition::Present, timeout)
            .await?;
        element.read_attribute(name).await
    }

    async fn scroll_to(&mut self, locator: &Locator, timeout: Duration) -> Result<()> {
        let element = self
            .page
            .wait_for(locator, WaitCondition::Present, timeout)
            .await?;
        element.scroll_into_view().await
    }

    async fn scroll_down_pages(&mut self, pages: u32) -> Result<()> {
        self.page.scroll_down_pages(pages).await
    }

    async fn count_items(&mut self, items: &Locator, timeout: Duration) -> Result<usize> {
        Ok(self.page.wait_for_settled(items, timeout).await?.len())
    }

    async fn item_label(
        &mut self,
        items: &Locator,
        index: usize,
        inner: Option<&Locator>,
    ) -> Result<String> {
        let item = self.nth_item(items, index).await?;
        match inner {
            Some(locator) => item.find(locator).await?.read_text().await,
            None => item.read_text().await,
        }
    }

    async fn item_attribute(
        &mut self,
        items: &Locator,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        self.nth_item(items, index).await?.read_attribute(name).await
    }

    async fn click_item(&mut self, items: &Locator, index: usize) -> Result<(i64, i64)> {
        let item = self.nth_item(items, index).await?;
        item.scroll_into_view().await?;
        item.click_at_center().await
    }

    async fn window_handles(&mut self) -> Result<Vec<ContextId>> {
        let handles = self.page.window_handles().await?;
        Ok(handles.into_iter().map(|h| self.remember(h)).collect())
    }

    async fn current_window(&mut self) -> Result<ContextId> {
        let handle = self.page.current_window().await?;
        Ok(self.remember(handle))
    }

    async fn switch_to_window(&mut self, context: &ContextId) -> Result<()> {
        let handle = self
            .known_windows
            .get(context)
            .cloned()
            .ok_or_else(|| FieldtripError::ContextSwitch(format!("unknown context {context}")))?;
        self.page.switch_to_window(handle).await
    }

    async fn close_window(&mut self) -> Result<()> {
        self.page.close_window().await
    }
}
