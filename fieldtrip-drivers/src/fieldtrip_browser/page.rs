use std::time::Duration;

use fantoccini::actions::{InputSource, MouseActions, PointerAction, MOUSE_BUTTON_LEFT};
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::wd::WindowHandle;
use fantoccini::Client;
use fieldtrip_common::{FieldtripError, Locator, Result, WaitCondition};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::fieldtrip_browser::selector::{compile, CompiledLocator};

/// Delay between viewport-height scrolls; lazy loaders give no readiness
/// signal, so this is the capped last-resort fixed delay.
const SCROLL_SETTLE: Duration = Duration::from_millis(500);

/// How long the pointer takes to travel during a geometric click.
const POINTER_TRAVEL: Duration = Duration::from_millis(100);

/// Element queries and waits against the current document.
///
/// Cheap to clone into; holds a handle to the session's client plus the
/// polling interval every wait uses.
pub struct FieldtripPage {
    client: Client,
    poll_interval: Duration,
}

impl FieldtripPage {
    pub fn new(client: Client, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Poll until some element matching `locator` satisfies `condition`.
    ///
    /// This is the sole suspension point of the interaction layer: bounded
    /// polling at the configured interval, failing with
    /// [`FieldtripError::ElementNotReady`] carrying the locator and the
    /// elapsed time.
    pub async fn wait_for(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        timeout: Duration,
    ) -> Result<FieldtripElement> {
        let compiled = compile(locator);
        let started = Instant::now();
        loop {
            if let Some(element) = self.probe(&compiled, condition).await? {
                debug!(
                    target: "browser.wait",
                    %locator,
                    %condition,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "element ready"
                );
                return Ok(FieldtripElement::new(element, self.client.clone()));
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                let waited_ms = elapsed.as_millis() as u64;
                warn!(target: "browser.wait", %locator, %condition, waited_ms, "wait timed out");
                return Err(FieldtripError::ElementNotReady {
                    locator: locator.to_string(),
                    waited_ms,
                });
            }
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Bounded poll until two consecutive polls observe the same match
    /// count, then return the matches.
    ///
    /// Zero matches is a legitimate settled state here; callers decide
    /// whether an empty result is worth reporting. On deadline the current
    /// matches are returned even if the count never stabilised.
    pub async fn wait_for_settled(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Vec<FieldtripElement>> {
        let compiled = compile(locator);
        let started = Instant::now();
        let mut last_count: Option<usize> = None;
        loop {
            let matches = self
                .client
                .find_all(compiled.as_locator())
                .await
                .map_err(wire_err)?;

            let settled = last_count == Some(matches.len());
            let elapsed = started.elapsed();
            if settled || elapsed >= timeout {
                if !settled {
                    debug!(
                        target: "browser.wait",
                        %locator,
                        count = matches.len(),
                        "match count never settled; using current matches"
                    );
                }
                return Ok(self.wrap_all(matches));
            }

            last_count = Some(matches.len());
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// All current matches, without waiting.
    pub async fn find_all(&self, locator: &Locator) -> Result<Vec<FieldtripElement>> {
        let compiled = compile(locator);
        let matches = self
            .client
            .find_all(compiled.as_locator())
            .await
            .map_err(wire_err)?;
        Ok(self.wrap_all(matches))
    }

    /// Scroll down by whole viewport heights, pausing briefly between
    /// scrolls so lazy-loaded sections can attach.
    pub async fn scroll_down_pages(&self, pages: u32) -> Result<()> {
        for _ in 0..pages {
            self.client
                .execute("window.scrollBy(0, window.innerHeight);", vec![])
                .await
                .map_err(wire_err)?;
            tokio::time::sleep(SCROLL_SETTLE).await;
        }
        Ok(())
    }

    pub async fn window_handles(&self) -> Result<Vec<WindowHandle>> {
        self.client.windows().await.map_err(wire_err)
    }

    pub async fn current_window(&self) -> Result<WindowHandle> {
        self.client.window().await.map_err(wire_err)
    }

    pub async fn switch_to_window(&self, handle: WindowHandle) -> Result<()> {
        self.client.switch_to_window(handle).await.map_err(wire_err)
    }

    /// Close the current window. The caller must switch to a surviving
    /// window afterwards before issuing further commands.
    pub async fn close_window(&self) -> Result<()> {
        self.client.close_window().await.map_err(wire_err)
    }

    async fn probe(
        &self,
        compiled: &CompiledLocator,
        condition: WaitCondition,
    ) -> Result<Option<Element>> {
        let candidates = self
            .client
            .find_all(compiled.as_locator())
            .await
            .map_err(wire_err)?;
        for element in candidates {
            if satisfies(&element, condition).await {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    fn wrap_all(&self, elements: Vec<Element>) -> Vec<FieldtripElement> {
        elements
            .into_iter()
            .map(|element| FieldtripElement::new(element, self.client.clone()))
            .collect()
    }
}

/// Probe errors count as "not ready yet": elements routinely go stale
/// between the find and the predicate while the page is still settling.
async fn satisfies(element: &Element, condition: WaitCondition) -> bool {
    match condition {
        WaitCondition::Present => true,
        WaitCondition::Visible => element.is_displayed().await.unwrap_or(false),
        WaitCondition::Clickable => {
            element.is_displayed().await.unwrap_or(false)
                && element.is_enabled().await.unwrap_or(false)
        }
    }
}

/// A located element, valid until the next navigation or DOM mutation.
#[derive(Clone)]
pub struct FieldtripElement {
    element: Element,
    client: Client,
}

impl FieldtripElement {
    pub(crate) fn new(element: Element, client: Client) -> Self {
        Self { element, client }
    }

    /// The element's visible text.
    pub async fn read_text(&self) -> Result<String> {
        self.element.text().await.map_err(wire_err)
    }

    /// An attribute value; `None` when the attribute does not exist.
    pub async fn read_attribute(&self, name: &str) -> Result<Option<String>> {
        self.element.attr(name).await.map_err(wire_err)
    }

    /// Find a child element relative to this one.
    pub async fn find(&self, locator: &Locator) -> Result<FieldtripElement> {
        let compiled = compile(locator);
        let element = self
            .element
            .find(compiled.as_locator())
            .await
            .map_err(wire_err)?;
        Ok(Self::new(element, self.client.clone()))
    }

    /// Midpoint of the element's bounding box, rounded to whole pixels.
    pub async fn center(&self) -> Result<(i64, i64)> {
        let rect = self.element.rectangle().await.map_err(wire_err)?;
        Ok(center_of(rect))
    }

    /// Bring the element into the viewport via a page-context script.
    pub async fn scroll_into_view(&self) -> Result<()> {
        let element_arg =
            serde_json::to_value(&self.element).map_err(|e| FieldtripError::Driver(e.into()))?;
        self.client
            .execute(
                "arguments[0].scrollIntoView({block: 'center'});",
                vec![element_arg],
            )
            .await
            .map_err(wire_err)?;
        Ok(())
    }

    /// Click the element, preferring the direct WebDriver click and falling
    /// back to a geometric pointer click at the element's center when the
    /// direct click is intercepted by an overlapping element.
    ///
    /// Returns the computed center either way so callers can record where
    /// the click landed. The center is measured before clicking; an element
    /// animating between measurement and click is a known, accepted race.
    pub async fn click_at_center(&self) -> Result<(i64, i64)> {
        let center = self.center().await?;
        match self.element.click().await {
            Ok(()) => {
                debug!(target: "browser.click", x = center.0, y = center.1, "direct click");
                Ok(center)
            }
            Err(e) if is_intercepted(&e) => {
                info!(
                    target: "browser.click",
                    x = center.0,
                    y = center.1,
                    error = %e,
                    "direct click intercepted; retrying with pointer at center"
                );
                self.pointer_click().await?;
                Ok(center)
            }
            Err(other) => Err(wire_err(other)),
        }
    }

    /// W3C pointer sequence: move to the element's center, press, release.
    async fn pointer_click(&self) -> Result<()> {
        let sequence = MouseActions::new("mouse".to_string())
            .then(PointerAction::MoveToElement {
                element: self.element.clone(),
                duration: Some(POINTER_TRAVEL),
                x: 0.0,
                y: 0.0,
            })
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        self.client.perform_actions(sequence).await.map_err(wire_err)
    }
}

/// Midpoint of a WebDriver bounding box `(x, y, width, height)`.
pub fn center_of(rect: (f64, f64, f64, f64)) -> (i64, i64) {
    let (x, y, width, height) = rect;
    (
        (x + width / 2.0).round() as i64,
        (y + height / 2.0).round() as i64,
    )
}

fn is_intercepted(err: &CmdError) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("click intercepted") || msg.contains("not clickable") || msg.contains("obscure")
}

fn wire_err(err: CmdError) -> FieldtripError {
    FieldtripError::Driver(anyhow::Error::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_the_bounding_box_midpoint() {
        assert_eq!(center_of((100.0, 50.0, 40.0, 20.0)), (120, 60));
    }

    #[test]
    fn center_rounds_fractional_midpoints() {
        // 10 + 5/2 = 12.5 rounds away from zero.
        assert_eq!(center_of((10.0, 20.0, 5.0, 5.0)), (13, 23));
        assert_eq!(center_of((0.0, 0.0, 0.0, 0.0)), (0, 0));
    }
}
