//! Utils module - Utility functions and helpers

pub mod locks;
pub mod logging;

pub use logging::init_logging;
