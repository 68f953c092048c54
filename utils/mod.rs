//! Utility functions
//!
//! This module contains helpers used throughout the firmware that are not
//! part of the power-management logic itself.

pub mod log;

pub use self::log::{PmuLogger, Sink};
