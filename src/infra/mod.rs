//! Infrastructure - configuration, metrics, run-once guard
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, env overrides, defaults)
//! - `metrics` - Lock-free synchronization counters
//! - `single_flight` - Async initialization that runs at most once

pub mod config;
pub mod metrics;
pub mod single_flight;

// Re-export commonly used types
pub use config::Config;
pub use metrics::{MetricsSummary, SyncMetrics};
pub use single_flight::SingleFlight;
