//! Seed data
//!
//! Demo records loaded into the in-memory store when running with the
//! `local` profile.

pub mod incident;

pub use incident::seed_demo_incidents;
