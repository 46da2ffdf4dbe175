//! # Services
//!
//! Business operations composed from repositories and collaborators.

pub mod incident;

pub use incident::IncidentService;
