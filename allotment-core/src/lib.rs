// allotment-core/src/lib.rs

#![allow(missing_docs)]
// Memory safety
#![deny(unsafe_code)]
// Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (store and notification contracts)
pub mod ports;

// 2. Domain (entities, conversion, outcomes, rules, alerts)
// Depends on nothing but the ports' value types.
pub mod domain;

// 3. Infrastructure (DuckDB, schema bootstrap, YAML config, sinks)
pub mod infrastructure;

// 4. Application (registry, staging, transforms, orchestrator, quality, monitoring)
pub mod application;

// --- GLOBAL ERROR HANDLING ---
pub mod error;

pub use error::AllotmentError;
