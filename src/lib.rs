//! Tollgate - HTTP Request Admission Control
//!
//! This crate decides whether an inbound HTTP request must be rejected for
//! exceeding a configured rate. It derives rate-limit keys from the client
//! address, path, method, headers and Basic-Auth user, resolves per-route
//! overrides, and keeps a concurrent registry of per-key counters.

pub mod config;
pub mod error;
pub mod ratelimit;
