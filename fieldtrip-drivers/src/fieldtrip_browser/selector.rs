//! Compilation of declarative [`Locator`]s into wire selectors.

use fantoccini::Locator as WireLocator;
use fieldtrip_common::Locator;

/// Owned wire form of a [`Locator`].
///
/// `fantoccini::Locator` borrows its selector text, so the compiled form
/// owns the string and hands out borrows at call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledLocator {
    Css(String),
    XPath(String),
    LinkText(String),
}

impl CompiledLocator {
    pub fn as_locator(&self) -> WireLocator<'_> {
        match self {
            Self::Css(css) => WireLocator::Css(css),
            Self::XPath(expr) => WireLocator::XPath(expr),
            Self::LinkText(text) => WireLocator::LinkText(text),
        }
    }
}

pub fn compile(locator: &Locator) -> CompiledLocator {
    match locator {
        Locator::LinkText { text } => CompiledLocator::LinkText(text.clone()),
        Locator::ClassName { name } => CompiledLocator::Css(format!(".{name}")),
        Locator::Attr {
            name,
            value: Some(value),
        } => CompiledLocator::Css(format!("[{name}='{}']", value.replace('\'', "\\'"))),
        Locator::Attr { name, value: None } => CompiledLocator::Css(format!("[{name}]")),
        Locator::XPath { expr } => CompiledLocator::XPath(expr.clone()),
    }
}
