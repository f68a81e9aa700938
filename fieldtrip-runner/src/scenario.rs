//! The step interpreter.
//!
//! One scenario is one ordered list of steps executed against a
//! [`SessionDriver`]. Failures are data: a failed step becomes an error
//! entry in the scenario's report block and execution moves on. Only two
//! conditions cut a scenario short, a failed navigation (every later step
//! would be probing the wrong page) and a lost browser session (nothing
//! can run at all).

use std::time::Duration;

use fieldtrip_common::{FieldtripError, Result};
use fieldtrip_config::{
    ConsentConfig, MAX_PAUSE_MS, ScenarioSpec, Step, StepDefaults, VisitItemsSpec,
};
use tokio::time::Instant;
use tracing::warn;
use url::Url;

use crate::driver::{ContextId, SessionDriver};
use crate::normalize::normalize_lines;
use crate::report::{ExtractedValue, ScenarioReport, SessionReport};

/// Run one scenario and record its block into the session report.
///
/// When `consent` is given, the blocking dialog is answered right after
/// the opening navigation, before any step runs. An absent dialog is a
/// note, not an error.
///
/// The block is recorded whatever happens, partial results included. The
/// returned error, if any, means the browser session itself is gone and
/// the caller should stop scheduling further scenarios.
pub async fn run_scenario(
    driver: &mut dyn SessionDriver,
    base_url: &Url,
    spec: &ScenarioSpec,
    consent: Option<&ConsentConfig>,
    defaults: &StepDefaults,
    session: &mut SessionReport,
) -> Result<()> {
    let mut report = ScenarioReport::begin(&spec.name, driver.viewport());
    let outcome = drive_steps(driver, base_url, spec, consent, defaults, &mut report).await;
    session.record(report);
    outcome
}

async fn drive_steps(
    driver: &mut dyn SessionDriver,
    base_url: &Url,
    spec: &ScenarioSpec,
    consent: Option<&ConsentConfig>,
    defaults: &StepDefaults,
    report: &mut ScenarioReport,
) -> Result<()> {
    if let Some(description) = &spec.description {
        report.note(description.clone());
    }

    // Every scenario starts from the site root, so scenario order never
    // matters.
    if let Err(e) = driver.navigate(base_url.as_str()).await {
        report.error(format!("could not open {base_url}: {e}"));
        return if e.is_session_lost() { Err(e) } else { Ok(()) };
    }

    // The dialog is part of the loaded page; it has to be answered here,
    // after the navigation, or every later click lands on its overlay.
    if let Some(consent) = consent {
        let timeout = Duration::from_millis(consent.timeout_ms);
        match driver.dismiss_blocking_dialog(&consent.target, timeout).await {
            Ok(true) => report.note("consent dialog dismissed"),
            Ok(false) => report.note("no consent dialog appeared"),
            Err(e) if e.is_session_lost() => {
                report.error(format!("browser session lost: {e}"));
                return Err(e);
            }
            Err(e) => report.error(format!("consent dialog: {e}")),
        }
    }

    for step in &spec.steps {
        match execute_step(driver, base_url, step, defaults, report).await {
            Ok(()) => {}
            Err(e) if e.is_session_lost() => {
                report.error(format!("browser session lost: {e}"));
                return Err(e);
            }
            Err(e @ FieldtripError::Navigation { .. }) => {
                report.error(format!("abandoning remaining steps: {e}"));
                return Ok(());
            }
            Err(e) => report.error(e.to_string()),
        }
    }
    Ok(())
}

async fn execute_step(
    driver: &mut dyn SessionDriver,
    base_url: &Url,
    step: &Step,
    defaults: &StepDefaults,
    report: &mut ScenarioReport,
) -> Result<()> {
    let wait = Duration::from_millis(defaults.wait_timeout_ms);
    match step {
        Step::Navigate { url } => {
            let resolved = resolve_url(base_url, url)?;
            driver.navigate(resolved.as_str()).await?;
            report.note(format!("opened {resolved}"));
        }
        Step::Click { target, label } => {
            let (x, y) = driver.click(target, wait).await?;
            let what = label.clone().unwrap_or_else(|| target.to_string());
            report.note(format!("clicked {what} at ({x}, {y})"));
        }
        Step::ScrollTo { target } => {
            driver.scroll_to(target, wait).await?;
            report.note(format!("scrolled to {target}"));
        }
        Step::ScrollDown { pages } => {
            driver.scroll_down_pages(*pages).await?;
            report.note(format!("scrolled down {pages} page(s)"));
        }
        Step::Pause { ms } => {
            let capped = (*ms).min(MAX_PAUSE_MS);
            if capped < *ms {
                warn!(
                    target: "trip.scenario",
                    requested_ms = ms,
                    capped_ms = capped,
                    "pause clamped"
                );
            }
            tokio::time::sleep(Duration::from_millis(capped)).await;
            report.note(format!("paused {capped} ms"));
        }
        Step::ExtractText { name, target } => {
            let text = driver.read_text(target, wait).await?;
            report.extraction(name, ExtractedValue::Text(text));
        }
        Step::ExtractList {
            name,
            target,
            exclude,
        } => {
            let raw = driver.read_text(target, wait).await?;
            let items = normalize_lines(&raw, exclude);
            if items.is_empty() {
                report.note(format!("no list items matched {target} for \"{name}\""));
            }
            report.extraction(name, ExtractedValue::List(items));
        }
        Step::VisitItems(visit) => visit_items(driver, visit, defaults, report).await?,
    }
    Ok(())
}

fn resolve_url(base: &Url, candidate: &str) -> Result<Url> {
    base.join(candidate)
        .map_err(|e| FieldtripError::Config(format!("bad step url {candidate}: {e}")))
}

#[derive(Debug, Clone)]
struct VisitedItem {
    label: String,
    url: Option<String>,
    detail: String,
}

/// Visit each matching item in its own browsing context.
///
/// Per item: capture the originating context, click, diff the context set
/// until exactly one new context appears, probe the detail inside it,
/// close it, switch back. Per-item failures are recorded and the loop
/// continues with the next item.
async fn visit_items(
    driver: &mut dyn SessionDriver,
    spec: &VisitItemsSpec,
    defaults: &StepDefaults,
    report: &mut ScenarioReport,
) -> Result<()> {
    let wait = Duration::from_millis(defaults.wait_timeout_ms);
    let poll = Duration::from_millis(defaults.poll_interval_ms);

    let total = driver.count_items(&spec.items, wait).await?;
    if total == 0 {
        report.note(format!("no elements matched {}", spec.items));
    } else {
        report.note(format!("found {total} item(s) matching {}", spec.items));
    }

    let cap = spec.limit.unwrap_or(total).min(total);
    let mut matched: Vec<Option<VisitedItem>> = vec![None; spec.categories.len()];

    for index in 0..cap {
        if !spec.categories.is_empty() && matched.iter().all(Option::is_some) {
            report.note(format!("all categories matched after {index} item(s)"));
            break;
        }

        match visit_one(driver, spec, index, wait, poll).await {
            Ok(visited) => {
                if spec.categories.is_empty() {
                    let value = match visited.url {
                        Some(url) => ExtractedValue::Link {
                            label: visited.label,
                            url,
                        },
                        None => ExtractedValue::Text(visited.label),
                    };
                    report.extraction(&format!("{} {}", spec.name, index + 1), value);
                    report.note(format!("  detail: {}", visited.detail));
                } else {
                    let slot = spec.categories.iter().enumerate().find_map(|(i, rule)| {
                        (matched[i].is_none() && contains_ci(&visited.detail, &rule.needle))
                            .then_some(i)
                    });
                    match slot {
                        Some(i) => {
                            report.note(format!(
                                "item \"{}\" matched {}",
                                visited.label, spec.categories[i].name
                            ));
                            matched[i] = Some(visited);
                        }
                        None => report.note(format!(
                            "item \"{}\" ({}) matched no category",
                            visited.label, visited.detail
                        )),
                    }
                }
            }
            Err(e) if e.is_session_lost() => return Err(e),
            Err(e) => report.error(format!("item {}: {e}", index + 1)),
        }
    }

    for (rule, entry) in spec.categories.iter().zip(&matched) {
        match entry {
            Some(item) => {
                let value = match &item.url {
                    Some(url) => ExtractedValue::Link {
                        label: item.label.clone(),
                        url: url.clone(),
                    },
                    None => ExtractedValue::Text(item.label.clone()),
                };
                report.extraction(&format!("{} in {}", spec.name, rule.name), value);
            }
            None => report.note(format!("no {} found in {}", spec.name, rule.name)),
        }
    }

    Ok(())
}

async fn visit_one(
    driver: &mut dyn SessionDriver,
    spec: &VisitItemsSpec,
    index: usize,
    wait: Duration,
    poll: Duration,
) -> Result<VisitedItem> {
    let label = driver
        .item_label(&spec.items, index, spec.item_label.as_ref())
        .await?
        .trim()
        .to_string();
    let url = match &spec.link_attribute {
        Some(attribute) => driver.item_attribute(&spec.items, index, attribute).await?,
        None => None,
    };

    let origin = driver.current_window().await?;
    let before = driver.window_handles().await?;
    driver.click_item(&spec.items, index).await?;

    let fresh = match wait_for_new_context(driver, &before, wait, poll).await {
        Ok(context) => context,
        Err(e) => {
            // Nothing opened; make sure we are still where we started.
            let _ = driver.switch_to_window(&origin).await;
            return Err(e);
        }
    };

    if let Err(e) = driver.switch_to_window(&fresh).await {
        let _ = driver.switch_to_window(&origin).await;
        return Err(e);
    }

    let probed = probe_detail(driver, spec, wait).await;

    // The origin context is restored even when the probe failed.
    let _ = driver.close_window().await;
    driver.switch_to_window(&origin).await?;

    let detail = probed?.trim().to_string();
    Ok(VisitedItem { label, url, detail })
}

/// Poll the context set until exactly one context not present in `before`
/// shows up. More than one new context at once is ambiguous and reported
/// as such.
async fn wait_for_new_context(
    driver: &mut dyn SessionDriver,
    before: &[ContextId],
    timeout: Duration,
    poll: Duration,
) -> Result<ContextId> {
    let started = Instant::now();
    loop {
        let handles = driver.window_handles().await?;
        let mut fresh: Vec<ContextId> = handles
            .into_iter()
            .filter(|context| !before.contains(context))
            .collect();

        if fresh.len() > 1 {
            return Err(FieldtripError::ContextSwitch(format!(
                "{} new contexts appeared at once",
                fresh.len()
            )));
        }
        if let Some(context) = fresh.pop() {
            return Ok(context);
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(FieldtripError::ContextSwitch(format!(
                "no new context within {} ms",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(poll.min(timeout - elapsed)).await;
    }
}

async fn probe_detail(
    driver: &mut dyn SessionDriver,
    spec: &VisitItemsSpec,
    wait: Duration,
) -> Result<String> {
    match &spec.detail.attribute {
        Some(attribute) => {
            let value = driver
                .read_attribute(&spec.detail.target, attribute, wait)
                .await?;
            value.ok_or_else(|| {
                FieldtripError::Driver(anyhow::anyhow!(
                    "attribute \"{attribute}\" absent on {}",
                    spec.detail.target
                ))
            })
        }
        None => driver.read_text(&spec.detail.target, wait).await,
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
