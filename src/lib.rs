//! # Emergency Alerting Library
//!
//! Incident reporting, alert-level classification, approval and SMS alert
//! fan-out for an industrial site, served over an HTTP API.

pub mod alerts;
pub mod approvers;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod services;
pub mod telemetry;
