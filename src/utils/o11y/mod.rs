//! Common observability utilities.
//!
//! This module provides the tracing subscriber and the error-logging macros
//! used throughout the application.
pub mod logging;
