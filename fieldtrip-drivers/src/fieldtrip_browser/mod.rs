pub mod driver;
pub mod page;
pub mod selector;

pub use driver::{FieldtripDriver, SessionOptions, DEFAULT_WEBDRIVER_URL};
pub use page::{FieldtripElement, FieldtripPage};

// Re-exported so downstream crates can manage browsing contexts without
// depending on fantoccini themselves.
pub use fantoccini::wd::WindowHandle;
