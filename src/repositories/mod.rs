//! # Repository Layer
//!
//! Storage abstraction for incident records. Every record handed out by a
//! repository is an owned copy; stored state only changes through
//! [`IncidentRepository::update`].

pub mod incident;

pub use incident::{InMemoryIncidentRepository, IncidentRepository};
