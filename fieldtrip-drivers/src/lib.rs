//! Driver layer for browser automation.
//!
//! This crate wraps a WebDriver session behind the interaction primitives
//! the scenario runner needs: polling waits, center-point clicks with a
//! direct-click fast path, non-mutating reads, and window management.
//!
//! - [`fieldtrip_browser::driver::FieldtripDriver`]: session lifecycle
//! - [`fieldtrip_browser::page::FieldtripPage`]: element queries and waits
//! - [`fieldtrip_browser::page::FieldtripElement`]: clicks, reads, geometry
//! - [`fieldtrip_browser::selector`]: locator compilation to wire selectors
pub mod fieldtrip_browser;
