//! Utility modules and helper functions
//!
//! This module contains shared utilities and helper functions used across the application.

pub mod constants;
pub mod file_utils;
pub mod format;
pub mod logging;

// Re-export commonly used utilities
pub use file_utils::*;
pub use format::*;
pub use logging::*;
