//! Utility functions and data structures.
//!
//! ## Modules
//!
//! - [`app_data`] - Application configuration in the app data directory
//! - [`cancel`] - Cancellation flag shared with long-running scans
//! - [`progress`] - Progress bars, no-op without the `progress` feature

pub mod app_data;
pub mod cancel;
pub mod progress;

pub use app_data::*;
pub use cancel::*;
