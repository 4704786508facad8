//! Utility module
//!
//! This module provides:
//! - Configuration management
//! - Logging setup
//! - Classification metrics

mod config;
mod logging;
mod metrics;

pub use config::{Config, DataConfig, LoggingConfig, ModelConfig, TrainingConfig};
pub use logging::setup_logging;
pub use metrics::Metrics;
