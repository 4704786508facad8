//! # Wavelet ResNet
//!
//! Fault classification of fixed-channel signals (bearing vibration records
//! and the like) with a multi-resolution residual network.
//!
//! ## Features
//!
//! - CSV record loading with seeded shuffling and five-fold validation split
//! - Sliding-window expansion and per-window z-score normalization
//! - Wavelet low-pass decomposition into several resolutions
//! - Per-level encoders feeding a 1D ResNet with a dense classifier head
//! - Train / Eval / Predict passes with versioned batch-norm statistics
//!
//! ## Example
//!
//! ```rust,ignore
//! use wavelet_resnet::{data, model::{Mode, MultiResolutionNet}, Config};
//!
//! fn main() -> wavelet_resnet::Result<()> {
//!     let config = Config::load("config/default.toml")?;
//!     let prepared = data::prepare(&config.data)?;
//!
//!     let mut net = MultiResolutionNet::new(
//!         &config.model,
//!         1,
//!         prepared.train.window_len,
//!         prepared.classes_num(),
//!     )?;
//!
//!     for batch in prepared.train.batch_iter(32, Some(7)) {
//!         let labels = data::one_hot(&batch.labels, net.classes_num)?;
//!         net.forward(&batch.inputs, Mode::Train(&labels))?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod model;
pub mod utils;

pub use data::{Dataset, PreparedData, WindowedSet};
pub use error::{Error, Result};
pub use model::{Mode, ModeOutput, MultiResolutionNet};
pub use utils::{setup_logging, Config, Metrics};
