//! Command handlers
//!
//! The operations a front end can invoke, grouped by concern. Every handler
//! takes the shared [`AppState`](crate::AppState) and reports errors as
//! display strings.

pub mod config;
pub mod download;
pub mod system;
pub mod youtube;

// Re-export all command functions for easy access
pub use config::*;
pub use download::*;
pub use system::*;
pub use youtube::*;
