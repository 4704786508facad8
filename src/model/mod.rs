//! Multi-resolution residual network
//!
//! Wavelet decomposition, per-level branch encoders, a 1D ResNet stack and
//! a dense classifier head, all on channels-first `[batch, channels, len]`
//! tensors.

mod blocks;
mod encoder;
mod layers;
mod net;
mod resnet;
mod stats;
mod wavelet;

pub use blocks::{BasicBlock, BlockKind, BottleneckBlock, Projection, ResidualBlock};
pub use encoder::{concat_levels, BranchEncoder};
pub use layers::{BatchNorm1d, Conv1d, GlobalAvgPool1d, LeakyReLU, Linear, MaxPool1d, Padding};
pub use net::{
    accuracy, argmax, cross_entropy, label_classes, softmax, EvalOutput, Mode, ModeOutput,
    MultiResolutionNet, Predictions, TrainOutput, UpdateRequest,
};
pub use resnet::{ResidualStack, BLOCKS_PER_STAGE, STAGE_WIDTHS};
pub use stats::{LayerStats, RunningStats, StatsMode};
pub use wavelet::{
    decompose_signal, level_len, lowpass_level, DecompositionPlan, Decomposer, Wavelet,
};
