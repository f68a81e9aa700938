//! Scenario execution over a live browser session.
//!
//! The crate wires three layers together:
//!
//! - [`driver`]: the [`SessionDriver`] capability trait that scenarios run
//!   against, plus [`WebDriverSession`], the production implementation
//!   backed by `fieldtrip-drivers`.
//! - [`report`]: the in-memory session report and its on-disk artifact.
//! - [`scenario`]: the step interpreter, including the multi-context item
//!   visiting loop.
//!
//! Scenario code never touches fantoccini directly; everything it needs
//! goes through the trait, which is what keeps the interpreter testable
//! without a browser.

pub mod driver;
pub mod normalize;
pub mod report;
pub mod scenario;

pub use driver::{ContextId, SessionDriver, WebDriverSession};
pub use report::{ExtractedValue, ScenarioReport, SessionReport};
pub use scenario::run_scenario;
