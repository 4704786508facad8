//! Residual blocks

use super::layers::{BatchNorm1d, Conv1d, LeakyReLU, Padding};
use super::stats::{RunningStats, StatsMode};
use crate::error::Result;
use ndarray::Array3;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which residual block to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Two 3-wide convolutions
    Basic,
    /// 1 -> 3 -> 1 convolutions, last one widening by four
    Bottleneck,
}

impl BlockKind {
    pub fn from_flag(bottleneck: bool) -> Self {
        if bottleneck {
            BlockKind::Bottleneck
        } else {
            BlockKind::Basic
        }
    }

    /// Output channels per nominal block width
    pub fn expansion(self) -> usize {
        match self {
            BlockKind::Basic => BasicBlock::EXPANSION,
            BlockKind::Bottleneck => BottleneckBlock::EXPANSION,
        }
    }
}

/// Projection shortcut: conv(k1, stride) + BN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub conv: Conv1d,
    pub bn: BatchNorm1d,
}

impl Projection {
    /// Projection when channels or resolution change, identity otherwise
    fn needed<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        stats: &mut RunningStats,
        rng: &mut R,
    ) -> Option<Self> {
        if in_channels != out_channels || stride != 1 {
            Some(Self {
                conv: Conv1d::new(in_channels, out_channels, 1, stride, Padding::Same, rng),
                bn: BatchNorm1d::new(out_channels, stats),
            })
        } else {
            None
        }
    }

    fn forward(&self, x: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array3<f32>> {
        let projected = self.conv.forward(x)?;
        self.bn.forward(&projected, stats)
    }

    fn num_params(&self) -> usize {
        self.conv.num_params() + self.bn.num_params()
    }
}

/// Add the shortcut and apply the activation
fn merge(
    out: Array3<f32>,
    x: &Array3<f32>,
    shortcut: Option<&Projection>,
    act: &LeakyReLU,
    stats: &mut StatsMode<'_>,
) -> Result<Array3<f32>> {
    let sum = match shortcut {
        Some(projection) => out + &projection.forward(x, stats)?,
        None => out + x,
    };
    Ok(act.forward(&sum))
}

/// Basic residual block with two 3-wide convolutions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    /// First convolution, carries the stride
    pub conv1: Conv1d,
    pub bn1: BatchNorm1d,
    pub conv2: Conv1d,
    pub bn2: BatchNorm1d,
    pub act: LeakyReLU,
    /// Projection for the skip connection (if needed)
    pub shortcut: Option<Projection>,
    pub stride: usize,
}

impl BasicBlock {
    /// Expansion factor for this block type
    pub const EXPANSION: usize = 1;

    /// Create a new BasicBlock
    ///
    /// # Arguments
    ///
    /// * `in_channels` - Number of input channels
    /// * `out_channels` - Number of output channels
    /// * `stride` - Stride for the first convolution (for downsampling)
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        leakiness: f32,
        stats: &mut RunningStats,
        rng: &mut R,
    ) -> Self {
        let conv1 = Conv1d::new(in_channels, out_channels, 3, stride, Padding::Same, rng);
        let bn1 = BatchNorm1d::new(out_channels, stats);
        let conv2 = Conv1d::new(out_channels, out_channels, 3, 1, Padding::Same, rng);
        let bn2 = BatchNorm1d::new(out_channels, stats);
        let shortcut = Projection::needed(in_channels, out_channels, stride, stats, rng);

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            act: LeakyReLU::new(leakiness),
            shortcut,
            stride,
        }
    }

    /// Forward pass
    pub fn forward(&self, x: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array3<f32>> {
        let mut out = self.conv1.forward(x)?;
        out = self.bn1.forward(&out, stats)?;
        out = self.act.forward(&out);

        out = self.conv2.forward(&out)?;
        out = self.bn2.forward(&out, stats)?;

        merge(out, x, self.shortcut.as_ref(), &self.act, stats)
    }

    pub fn out_channels(&self) -> usize {
        self.conv2.out_channels
    }

    pub fn squared_norm(&self) -> f32 {
        self.conv1.squared_norm()
            + self.conv2.squared_norm()
            + self.shortcut.as_ref().map_or(0.0, |p| p.conv.squared_norm())
    }

    /// Get number of parameters
    pub fn num_params(&self) -> usize {
        self.conv1.num_params()
            + self.conv2.num_params()
            + self.bn1.num_params()
            + self.bn2.num_params()
            + self.shortcut.as_ref().map_or(0, Projection::num_params)
    }
}

/// Bottleneck residual block with 1x1, 3x3, 1x1 convolutions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckBlock {
    /// 1-wide reduce, carries the stride
    pub conv1: Conv1d,
    pub bn1: BatchNorm1d,
    /// 3-wide process
    pub conv2: Conv1d,
    pub bn2: BatchNorm1d,
    /// 1-wide expand to `out_channels * EXPANSION`
    pub conv3: Conv1d,
    pub bn3: BatchNorm1d,
    pub act: LeakyReLU,
    pub shortcut: Option<Projection>,
    pub stride: usize,
}

impl BottleneckBlock {
    /// Expansion factor for this block type
    pub const EXPANSION: usize = 4;

    /// Create a new BottleneckBlock
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        leakiness: f32,
        stats: &mut RunningStats,
        rng: &mut R,
    ) -> Self {
        let expanded = out_channels * Self::EXPANSION;

        let conv1 = Conv1d::new(in_channels, out_channels, 1, stride, Padding::Same, rng);
        let bn1 = BatchNorm1d::new(out_channels, stats);
        let conv2 = Conv1d::new(out_channels, out_channels, 3, 1, Padding::Same, rng);
        let bn2 = BatchNorm1d::new(out_channels, stats);
        let conv3 = Conv1d::new(out_channels, expanded, 1, 1, Padding::Same, rng);
        let bn3 = BatchNorm1d::new(expanded, stats);
        let shortcut = Projection::needed(in_channels, expanded, stride, stats, rng);

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            act: LeakyReLU::new(leakiness),
            shortcut,
            stride,
        }
    }

    /// Forward pass
    pub fn forward(&self, x: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array3<f32>> {
        let mut out = self.conv1.forward(x)?;
        out = self.bn1.forward(&out, stats)?;
        out = self.act.forward(&out);

        out = self.conv2.forward(&out)?;
        out = self.bn2.forward(&out, stats)?;
        out = self.act.forward(&out);

        out = self.conv3.forward(&out)?;
        out = self.bn3.forward(&out, stats)?;

        merge(out, x, self.shortcut.as_ref(), &self.act, stats)
    }

    pub fn out_channels(&self) -> usize {
        self.conv3.out_channels
    }

    pub fn squared_norm(&self) -> f32 {
        self.conv1.squared_norm()
            + self.conv2.squared_norm()
            + self.conv3.squared_norm()
            + self.shortcut.as_ref().map_or(0.0, |p| p.conv.squared_norm())
    }

    /// Get number of parameters
    pub fn num_params(&self) -> usize {
        self.conv1.num_params()
            + self.conv2.num_params()
            + self.conv3.num_params()
            + self.bn1.num_params()
            + self.bn2.num_params()
            + self.bn3.num_params()
            + self.shortcut.as_ref().map_or(0, Projection::num_params)
    }
}

/// A residual block of either shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResidualBlock {
    Basic(BasicBlock),
    Bottleneck(BottleneckBlock),
}

impl ResidualBlock {
    /// Build a block of `kind` with nominal width `out_channels`
    pub fn new<R: Rng + ?Sized>(
        kind: BlockKind,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        leakiness: f32,
        stats: &mut RunningStats,
        rng: &mut R,
    ) -> Self {
        match kind {
            BlockKind::Basic => ResidualBlock::Basic(BasicBlock::new(
                in_channels,
                out_channels,
                stride,
                leakiness,
                stats,
                rng,
            )),
            BlockKind::Bottleneck => ResidualBlock::Bottleneck(BottleneckBlock::new(
                in_channels,
                out_channels,
                stride,
                leakiness,
                stats,
                rng,
            )),
        }
    }

    pub fn forward(&self, x: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array3<f32>> {
        match self {
            ResidualBlock::Basic(block) => block.forward(x, stats),
            ResidualBlock::Bottleneck(block) => block.forward(x, stats),
        }
    }

    /// Channels actually produced (nominal width times expansion)
    pub fn out_channels(&self) -> usize {
        match self {
            ResidualBlock::Basic(block) => block.out_channels(),
            ResidualBlock::Bottleneck(block) => block.out_channels(),
        }
    }

    pub fn has_projection(&self) -> bool {
        match self {
            ResidualBlock::Basic(block) => block.shortcut.is_some(),
            ResidualBlock::Bottleneck(block) => block.shortcut.is_some(),
        }
    }

    pub fn squared_norm(&self) -> f32 {
        match self {
            ResidualBlock::Basic(block) => block.squared_norm(),
            ResidualBlock::Bottleneck(block) => block.squared_norm(),
        }
    }

    pub fn num_params(&self) -> usize {
        match self {
            ResidualBlock::Basic(block) => block.num_params(),
            ResidualBlock::Bottleneck(block) => block.num_params(),
        }
    }
}
