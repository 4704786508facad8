//! Configuration management
//!
//! This module handles loading, saving and validating configuration.

use crate::data::{DEFAULT_SHUFFLE_SEED, FOLD_COUNT};
use crate::error::{Error, Result};
use crate::model::Wavelet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Data preparation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    /// Requested window length before the power-of-two derivation
    pub window_length: usize,
    /// 0 = no holdout, 1..=5 selects the validation fold
    pub fold_id: usize,
    /// Per-window z-score normalization
    pub normalize: bool,
    pub shuffle_seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("data/train.csv"),
            test_path: PathBuf::from("data/test.csv"),
            window_length: 1024,
            fold_id: 0,
            normalize: true,
            shuffle_seed: DEFAULT_SHUFFLE_SEED,
        }
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Wavelet family of the decomposition low-pass kernel
    pub wavelet: String,
    /// Number of decomposition levels
    pub max_level: usize,
    /// Slope of the leaky activation
    pub leakiness: f32,
    /// L2 weight-decay coefficient
    pub reg_rate: f32,
    /// Use bottleneck residual blocks
    pub bottleneck: bool,
    /// Channels produced by every branch encoder
    pub encoder_channels: usize,
    /// Seed for weight initialization; random when unset
    pub init_seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            wavelet: "db4".to_string(),
            max_level: 3,
            leakiness: 0.2,
            reg_rate: 1e-4,
            bottleneck: false,
            encoder_channels: 64,
            init_seed: None,
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub epochs: usize,
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            epochs: 1,
            shuffle: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.as_ref().display(), error = %e, "using default configuration");
                Self::default()
            }
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject option combinations that can never run
    pub fn validate(&self) -> Result<()> {
        if self.data.fold_id > FOLD_COUNT {
            return Err(Error::Config(format!(
                "fold_id must be in 0..={}, got {}",
                FOLD_COUNT, self.data.fold_id
            )));
        }
        if self.data.window_length == 0 {
            return Err(Error::Config("window_length must be positive".into()));
        }
        if self.training.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.model.encoder_channels == 0 {
            return Err(Error::Config("encoder_channels must be positive".into()));
        }
        if !(self.model.reg_rate.is_finite() && self.model.reg_rate >= 0.0) {
            return Err(Error::Config(format!(
                "reg_rate must be finite and non-negative, got {}",
                self.model.reg_rate
            )));
        }
        if !(self.model.leakiness.is_finite() && self.model.leakiness >= 0.0) {
            return Err(Error::Config(format!(
                "leakiness must be finite and non-negative, got {}",
                self.model.leakiness
            )));
        }
        Wavelet::by_name(&self.model.wavelet)?;
        Ok(())
    }
}
