//! Residual feature extractor

use super::blocks::{BlockKind, ResidualBlock};
use super::layers::GlobalAvgPool1d;
use super::stats::{RunningStats, StatsMode};
use crate::error::Result;
use ndarray::{Array2, Array3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Nominal widths of the four stages
pub const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];

/// Blocks per stage
pub const BLOCKS_PER_STAGE: usize = 2;

/// Four residual stages followed by global average pooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualStack {
    /// Stage 1 keeps resolution, stages 2-4 halve it in their first block
    pub stages: Vec<Vec<ResidualBlock>>,
    pub avgpool: GlobalAvgPool1d,
    pub kind: BlockKind,
    pub in_channels: usize,
}

impl ResidualStack {
    /// Create the stack for inputs with `in_channels` channels
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        kind: BlockKind,
        leakiness: f32,
        stats: &mut RunningStats,
        rng: &mut R,
    ) -> Self {
        let mut stages = Vec::with_capacity(STAGE_WIDTHS.len());
        let mut channels = in_channels;

        for (i, &width) in STAGE_WIDTHS.iter().enumerate() {
            let stride = if i == 0 { 1 } else { 2 };
            let stage = Self::make_stage(kind, channels, width, stride, leakiness, stats, rng);
            channels = width * kind.expansion();
            stages.push(stage);
        }

        Self {
            stages,
            avgpool: GlobalAvgPool1d,
            kind,
            in_channels,
        }
    }

    /// First block may stride and change width, the rest keep both
    fn make_stage<R: Rng + ?Sized>(
        kind: BlockKind,
        in_channels: usize,
        width: usize,
        stride: usize,
        leakiness: f32,
        stats: &mut RunningStats,
        rng: &mut R,
    ) -> Vec<ResidualBlock> {
        let mut blocks = Vec::with_capacity(BLOCKS_PER_STAGE);
        blocks.push(ResidualBlock::new(kind, in_channels, width, stride, leakiness, stats, rng));

        let expanded = width * kind.expansion();
        for _ in 1..BLOCKS_PER_STAGE {
            blocks.push(ResidualBlock::new(kind, expanded, width, 1, leakiness, stats, rng));
        }

        blocks
    }

    /// Size of the pooled embedding
    pub fn embedding_dim(&self) -> usize {
        STAGE_WIDTHS[STAGE_WIDTHS.len() - 1] * self.kind.expansion()
    }

    /// Feature maps after the last stage, before pooling
    pub fn features(&self, x: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array3<f32>> {
        let mut out = x.clone();
        for block in self.stages.iter().flatten() {
            out = block.forward(&out, stats)?;
        }
        Ok(out)
    }

    /// Forward pass to the pooled embedding [batch, embedding_dim]
    pub fn forward(&self, x: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array2<f32>> {
        let features = self.features(x, stats)?;
        self.avgpool.forward(&features)
    }

    pub fn squared_norm(&self) -> f32 {
        self.stages.iter().flatten().map(ResidualBlock::squared_norm).sum()
    }

    /// Get total number of parameters
    pub fn num_params(&self) -> usize {
        self.stages.iter().flatten().map(ResidualBlock::num_params).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_stage_layout() {
        let mut stats = RunningStats::new();
        let stack = ResidualStack::new(64, BlockKind::Basic, 0.2, &mut stats, &mut StdRng::seed_from_u64(1));

        assert_eq!(stack.stages.len(), 4);
        assert!(stack.stages.iter().all(|s| s.len() == 2));
        // Stage 1 is pure identity shortcuts, later stages project once
        assert!(!stack.stages[0][0].has_projection());
        for stage in &stack.stages[1..] {
            assert!(stage[0].has_projection());
            assert!(!stage[1].has_projection());
        }
        assert_eq!(stack.embedding_dim(), 512);
    }

    #[test]
    fn test_forward_pools_any_length() {
        let mut stats = RunningStats::new();
        let stack = ResidualStack::new(8, BlockKind::Basic, 0.2, &mut stats, &mut StdRng::seed_from_u64(2));

        for len in [9, 20] {
            let x = Array3::from_shape_fn((2, 8, len), |(b, c, l)| ((b + c + l) as f32 * 0.1).cos());
            let features = stack.features(&x, &mut StatsMode::Frozen(&stats)).unwrap();
            assert_eq!(features.shape()[1], 512);
            assert_eq!(features.shape()[2], (len + 7) / 8);

            let embedding = stack.forward(&x, &mut StatsMode::Frozen(&stats)).unwrap();
            assert_eq!(embedding.shape(), &[2, 512]);
        }
    }

    #[test]
    fn test_bottleneck_embedding() {
        let mut stats = RunningStats::new();
        let stack = ResidualStack::new(64, BlockKind::Bottleneck, 0.2, &mut stats, &mut StdRng::seed_from_u64(3));
        assert_eq!(stack.embedding_dim(), 2048);
        assert_eq!(stack.stages[3][1].out_channels(), 2048);
    }
}
