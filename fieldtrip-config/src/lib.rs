//! Loader for trip plans with YAML + environment overlays.
//!
//! A *trip plan* describes one site survey: where the browser should go,
//! how the window is sized, which consent dialog to dismiss, and the named
//! scenarios with their ordered steps. Plans are plain YAML merged with
//! `FIELDTRIP__`-prefixed environment variables; `${VAR}` placeholders are
//! expanded after merging.
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use fieldtrip_common::{Locator, ViewportPolicy};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

/// Fixed delays are a last resort; anything longer than this is clamped.
pub const MAX_PAUSE_MS: u64 = 10_000;

/// A complete survey description: one site, one report, many scenarios.
#[derive(Debug, Deserialize)]
pub struct TripPlan {
    pub version: Option<String>,
    pub site: SiteProfile,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub defaults: StepDefaults,
    pub scenarios: Vec<ScenarioSpec>,
}

impl TripPlan {
    /// Look up a scenario by its exact name.
    pub fn scenario(&self, name: &str) -> Option<&ScenarioSpec> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

/// Everything specific to the surveyed site lives here, never in the runner.
#[derive(Debug, Deserialize)]
pub struct SiteProfile {
    /// Root the browser navigates to before every scenario.
    pub base_url: Url,
    #[serde(default)]
    pub viewport: ViewportPolicy,
    /// Blocking overlay (consent banner and the like) dismissed once after
    /// the first navigation. Absence of the dialog is not an error.
    #[serde(default)]
    pub consent: Option<ConsentConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ConsentConfig {
    pub target: Locator,
    #[serde(default = "default_consent_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_title")]
    pub title: String,
    /// Filename prefix for the flushed artifact.
    #[serde(default = "default_report_prefix")]
    pub prefix: String,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_report_title(),
            prefix: default_report_prefix(),
            out_dir: default_out_dir(),
        }
    }
}

/// Timing knobs shared by every wait in the run.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StepDefaults {
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// One named end-to-end interaction sequence.
#[derive(Debug, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<Step>,
}

/// The step vocabulary. The tag is `action`; payload fields sit beside it.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Load a URL, absolute or relative to the site base.
    Navigate { url: String },

    /// Wait until the target is clickable, then click its center.
    Click {
        target: Locator,
        /// Human label for report entries; the locator is used when absent.
        #[serde(default)]
        label: Option<String>,
    },

    /// Scroll the matched element into view.
    ScrollTo { target: Locator },

    /// Scroll down by viewport heights, for lazy-loaded content.
    ScrollDown {
        #[serde(default = "default_scroll_pages")]
        pages: u32,
    },

    /// Fixed delay, clamped to [`MAX_PAUSE_MS`]. Last resort only.
    Pause { ms: u64 },

    /// Read one element's text into a named result.
    ExtractText { name: String, target: Locator },

    /// Read multi-line text and split it into normalized items.
    ExtractList {
        name: String,
        target: Locator,
        /// Lines equal to any of these (case-insensitive) are dropped.
        #[serde(default)]
        exclude: Vec<String>,
    },

    /// Open each matched item in its own browsing context and probe it.
    VisitItems(VisitItemsSpec),
}

/// The multi-context compound step: click an item, find the one new
/// context, probe a detail inside it, close it, return.
#[derive(Debug, Deserialize)]
pub struct VisitItemsSpec {
    pub name: String,
    /// Matches the clickable items themselves.
    pub items: Locator,
    /// Relative locator for an item's display label; the item's own text
    /// is used when absent.
    #[serde(default)]
    pub item_label: Option<Locator>,
    /// Attribute on the item that carries its link (typically `href`).
    #[serde(default)]
    pub link_attribute: Option<String>,
    /// What to read inside the newly opened context.
    pub detail: DetailProbe,
    /// When present, items are classified into the first unfilled category
    /// whose needle occurs in the probed value, and the loop stops once
    /// every category is filled.
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
    /// Hard cap on visited items, independent of category matching.
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DetailProbe {
    pub target: Locator,
    /// Attribute to read from the probed element; its text when absent.
    #[serde(default)]
    pub attribute: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    /// Substring looked for in the probed detail value, ignoring case.
    pub needle: String,
}

fn default_consent_timeout_ms() -> u64 {
    5_000
}
fn default_report_title() -> String {
    "Site Survey Results".into()
}
fn default_report_prefix() -> String {
    "site_survey".into()
}
fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_wait_timeout_ms() -> u64 {
    15_000
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_scroll_pages() -> u32 {
    1
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct TripPlanLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for TripPlanLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TripPlanLoader {
    /// Start an empty loader. Attach files or snippets, then [`load`].
    ///
    /// `FIELDTRIP__` environment overrides are applied in [`load`], after
    /// every attached source, so they win over file contents.
    ///
    /// [`load`]: TripPlanLoader::load
    ///
    /// ```
    /// use fieldtrip_config::TripPlanLoader;
    ///
    /// let plan = TripPlanLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// version: "1"
    /// site:
    ///   base_url: "https://example.com/"
    /// scenarios: []
    /// "#,
    ///     )
    ///     .load()
    ///     .expect("valid plan");
    ///
    /// assert_eq!(plan.version.as_deref(), Some("1"));
    /// assert!(plan.scenarios.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a plan file; the `config` crate infers the format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self.builder.add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Merge an inline YAML snippet. Used by tests and the CLI.
    ///
    /// ```
    /// use fieldtrip_config::{Step, TripPlanLoader};
    ///
    /// let plan = TripPlanLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// site:
    ///   base_url: "https://careers.example.com/"
    /// scenarios:
    ///   - name: locations
    ///     steps:
    ///       - action: click
    ///         target: { by: link_text, text: "Locations" }
    ///       - action: extract_list
    ///         name: locations
    ///         target: { by: class_name, name: "header-locations" }
    ///         exclude: ["View all locations"]
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(plan.scenarios[0].steps.len(), 2);
    /// assert!(matches!(plan.scenarios[0].steps[0], Step::Click { .. }));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources.
    ///
    /// `${VAR}` placeholders are expanded after merging, so secrets and
    /// host-specific paths can stay out of the plan file.
    ///
    /// ```
    /// use fieldtrip_config::TripPlanLoader;
    ///
    /// unsafe { std::env::set_var("SURVEY_HOST", "careers.example.com"); }
    ///
    /// let plan = TripPlanLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// site:
    ///   base_url: "https://${SURVEY_HOST}/"
    /// scenarios: []
    /// "#,
    ///     )
    ///     .load()
    ///     .expect("valid plan");
    ///
    /// assert_eq!(plan.site.base_url.host_str(), Some("careers.example.com"));
    ///
    /// unsafe { std::env::remove_var("SURVEY_HOST"); }
    /// ```
    pub fn load(self) -> Result<TripPlan, ConfigError> {
        // Environment last: overrides beat every attached file or snippet.
        let cfg = self
            .builder
            .add_source(Environment::with_prefix("FIELDTRIP").separator("__"))
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: TripPlan =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Tartu")), ("COUNTRY", Some("EE"))], || {
            let mut v = json!([
                "hello-$CITY",
                { "loc": "${CITY}-${COUNTRY}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Tartu", { "loc": "Tartu-EE" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles_and_leaves_value_reasonable() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            // Only termination matters here; the depth cap breaks the cycle.
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn visit_items_step_deserializes_with_categories() {
        let plan = TripPlanLoader::new()
            .with_yaml_str(
                r#"
site:
  base_url: "https://careers.example.com/"
scenarios:
  - name: regional-jobs
    steps:
      - action: visit_items
        name: estonian_jobs
        items: { by: xpath, expr: "//a[contains(@class, 'job-item')]" }
        item_label: { by: xpath, expr: ".//h6" }
        link_attribute: href
        detail:
          target: { by: attr, name: formattedAddress }
          attribute: formattedAddress
        categories:
          - { name: Tartu, needle: Tartu }
          - { name: Tallinn, needle: Tallinn }
"#,
            )
            .load()
            .expect("valid plan");

        let Step::VisitItems(spec) = &plan.scenarios[0].steps[0] else {
            panic!("expected a visit_items step");
        };
        assert_eq!(spec.name, "estonian_jobs");
        assert_eq!(spec.link_attribute.as_deref(), Some("href"));
        assert_eq!(spec.detail.attribute.as_deref(), Some("formattedAddress"));
        assert_eq!(spec.categories.len(), 2);
        assert!(spec.limit.is_none());
    }

    #[test]
    fn pause_and_scroll_steps_carry_their_knobs() {
        let plan = TripPlanLoader::new()
            .with_yaml_str(
                r#"
site:
  base_url: "https://example.com/"
defaults:
  wait_timeout_ms: 20000
scenarios:
  - name: scrolling
    steps:
      - action: scroll_down
        pages: 3
      - action: pause
        ms: 1000
"#,
            )
            .load()
            .expect("valid plan");

        assert_eq!(plan.defaults.wait_timeout_ms, 20_000);
        assert_eq!(plan.defaults.poll_interval_ms, 500);
        assert!(matches!(
            plan.scenarios[0].steps[0],
            Step::ScrollDown { pages: 3 }
        ));
        assert!(matches!(plan.scenarios[0].steps[1], Step::Pause { ms: 1000 }));
    }
}
