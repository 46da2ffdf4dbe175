//! # Alert Classification
//!
//! Maps reported alarm criteria (or, failing that, the reporter's severity)
//! onto one of the four alert levels.

mod classifier;

pub use classifier::{alarm_score, determine_alert_level};
