//! Foundation module - Core utilities and types
//!
//! - Math types and the triangle's per-frame transform
//! - Time measurement
//! - Logging setup

pub mod logging;
pub mod math;
pub mod time;
