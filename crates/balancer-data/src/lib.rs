//! Loading balancer layouts and test options from RON, JSON or TOML files.

pub mod loader;

pub use loader::{DataLoadError, EntityRecord, LayoutFile, load_layout, load_options};
