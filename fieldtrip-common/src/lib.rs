//! Common types shared across Fieldtrip crates.
//!
//! This crate defines the element [`Locator`] grammar, wait and viewport
//! policies, observability helpers, and the shared error taxonomy used
//! throughout the Fieldtrip workspace. It is intentionally lightweight so
//! that every crate can depend on it without heavy transitive costs.
//!
//! # Overview
//!
//! - [`Locator`]: declarative element lookup strategies
//! - [`WaitCondition`]: readiness predicates for polling waits
//! - [`ViewportPolicy`]: window sizing applied at session start
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`FieldtripError`] and [`Result`]: shared error handling
//!
//! # Examples
//!
//! Describing an element to click:
//!
//! ```rust
//! use fieldtrip_common::Locator;
//!
//! let tab = Locator::link_text("Locations");
//! assert_eq!(tab.to_string(), "link text \"Locations\"");
//! ```
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod observability;

/// Declarative description of how to find an element in the live page.
///
/// A locator is resolved fresh at every lookup and never caches elements;
/// the underlying document mutates between steps, so a cached match would
/// go stale without warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    /// Anchor elements whose visible text equals the given string.
    LinkText { text: String },
    /// Elements carrying the given CSS class.
    ClassName { name: String },
    /// Elements with a named attribute, optionally constrained to a value.
    Attr {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Structural lookup via an XPath expression.
    #[serde(rename = "xpath")]
    XPath { expr: String },
}

impl Locator {
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::LinkText { text: text.into() }
    }

    pub fn class_name(name: impl Into<String>) -> Self {
        Self::ClassName { name: name.into() }
    }

    /// Matches any element that carries `name`, whatever its value.
    pub fn attr_present(name: impl Into<String>) -> Self {
        Self::Attr {
            name: name.into(),
            value: None,
        }
    }

    pub fn attr(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attr {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath { expr: expr.into() }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkText { text } => write!(f, "link text \"{text}\""),
            Self::ClassName { name } => write!(f, "class \"{name}\""),
            Self::Attr {
                name,
                value: Some(value),
            } => write!(f, "attribute {name}=\"{value}\""),
            Self::Attr { name, value: None } => write!(f, "attribute {name}"),
            Self::XPath { expr } => write!(f, "xpath \"{expr}\""),
        }
    }
}

/// Readiness predicate evaluated by polling waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// The element exists in the document.
    Present,
    /// The element exists and is displayed.
    Visible,
    /// The element is displayed and enabled.
    Clickable,
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Present => "present",
            Self::Visible => "visible",
            Self::Clickable => "clickable",
        };
        f.write_str(label)
    }
}

/// Window sizing applied when a browser session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportPolicy {
    /// Grow the window to the largest size the environment allows.
    #[default]
    Maximize,
    /// Force an exact window size in CSS pixels.
    Fixed { width: u32, height: u32 },
}

/// Error types used across the Fieldtrip system.
#[derive(thiserror::Error, Debug)]
pub enum FieldtripError {
    /// The browser session could not be launched or configured. Fatal to
    /// the whole run.
    #[error("session start failed: {0}")]
    SessionStart(String),

    /// A page load never reached an interactive document. Fatal to the
    /// current scenario only.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// An element never satisfied its wait condition within the timeout.
    /// Recoverable; the step or item is skipped.
    #[error("element not ready: {locator} after {waited_ms} ms")]
    ElementNotReady { locator: String, waited_ms: u64 },

    /// A new browsing context could not be identified or entered.
    /// Recoverable; the item is skipped and the main context restored.
    #[error("context switch failed: {0}")]
    ContextSwitch(String),

    /// The report artifact could not be written. A warning, never a reason
    /// to skip teardown.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The underlying browser driver reported an error.
    #[error("driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// Configuration was incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FieldtripError {
    /// True when the browser session itself is gone and the run cannot
    /// continue. Driver errors are classified by message because the
    /// WebDriver client surfaces a dead session the same way it surfaces
    /// any other failed command.
    pub fn is_session_lost(&self) -> bool {
        match self {
            Self::SessionStart(_) => true,
            Self::Driver(err) => {
                let msg = format!("{err:#}").to_ascii_lowercase();
                msg.contains("invalid session id")
                    || msg.contains("session deleted")
                    || msg.contains("session not created")
                    || msg.contains("connection refused")
                    || msg.contains("connection reset")
            }
            _ => false,
        }
    }
}

/// Convenient alias for results that use [`FieldtripError`].
pub type Result<T> = std::result::Result<T, FieldtripError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_display_names_the_strategy() {
        assert_eq!(
            Locator::attr("id", "accept-all").to_string(),
            "attribute id=\"accept-all\""
        );
        assert_eq!(
            Locator::attr_present("formattedAddress").to_string(),
            "attribute formattedAddress"
        );
        assert_eq!(
            Locator::class_name("header-locations").to_string(),
            "class \"header-locations\""
        );
    }

    #[test]
    fn lost_session_is_detected_from_driver_messages() {
        let dead = FieldtripError::Driver(anyhow::anyhow!("invalid session id"));
        assert!(dead.is_session_lost());

        let flaky = FieldtripError::Driver(anyhow::anyhow!("stale element reference"));
        assert!(!flaky.is_session_lost());

        let not_ready = FieldtripError::ElementNotReady {
            locator: "link text \"Jobs\"".to_string(),
            waited_ms: 15_000,
        };
        assert!(!not_ready.is_session_lost());
    }
}
