//! Per-level branch encoders

use super::layers::{BatchNorm1d, Conv1d, LeakyReLU, MaxPool1d, Padding};
use super::stats::{RunningStats, StatsMode};
use crate::error::{Error, Result};
use ndarray::{concatenate, Array3, ArrayView3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Projects one decomposition level to a fixed channel count.
///
/// conv(k = F - 1, stride 2, same) -> BN -> leaky -> maxpool(3, 2, same),
/// so the sequence length shrinks by about four.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchEncoder {
    pub conv: Conv1d,
    pub bn: BatchNorm1d,
    pub act: LeakyReLU,
    pub pool: MaxPool1d,
}

impl BranchEncoder {
    /// Create an encoder for a wavelet with `filter_len` taps
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        filter_len: usize,
        leakiness: f32,
        stats: &mut RunningStats,
        rng: &mut R,
    ) -> Self {
        let kernel_size = filter_len.saturating_sub(1).max(1);

        Self {
            conv: Conv1d::new(in_channels, out_channels, kernel_size, 2, Padding::Same, rng),
            bn: BatchNorm1d::new(out_channels, stats),
            act: LeakyReLU::new(leakiness),
            pool: MaxPool1d::new(3, 2, Padding::Same),
        }
    }

    /// Channels of every output
    pub fn out_channels(&self) -> usize {
        self.conv.out_channels
    }

    /// Output length for a level of `in_len` samples
    pub fn output_len(&self, in_len: usize) -> Option<usize> {
        let conv_len = self.conv.output_len(in_len)?;
        self.pool
            .padding
            .resolve(conv_len, self.pool.kernel_size, self.pool.stride)
            .map(|(len, _)| len)
    }

    /// Forward pass
    pub fn forward(&self, x: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array3<f32>> {
        let out = self.conv.forward(x)?;
        let out = self.bn.forward(&out, stats)?;
        let out = self.act.forward(&out);
        self.pool.forward(&out)
    }

    pub fn squared_norm(&self) -> f32 {
        self.conv.squared_norm()
    }

    pub fn num_params(&self) -> usize {
        self.conv.num_params() + self.bn.num_params()
    }
}

/// Join encoded levels along the sequence axis.
///
/// Every level must agree on batch size and channel count; lengths may differ.
pub fn concat_levels(levels: &[Array3<f32>]) -> Result<Array3<f32>> {
    let first = levels
        .first()
        .ok_or_else(|| Error::EmptyData("no encoded levels to concatenate".into()))?;
    let (batch, channels, _) = first.dim();

    for level in levels.iter().skip(1) {
        let (b, c, _) = level.dim();
        if b != batch || c != channels {
            return Err(Error::shape(
                "level concatenation",
                format!("[{}, {}, _]", batch, channels),
                format!("[{}, {}, _]", b, c),
            ));
        }
    }

    let views: Vec<ArrayView3<'_, f32>> = levels.iter().map(|l| l.view()).collect();
    concatenate(Axis(2), &views).map_err(|e| Error::shape("level concatenation", "matching shapes", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_encoder_shapes() {
        let mut stats = RunningStats::new();
        let mut rng = StdRng::seed_from_u64(3);
        let enc = BranchEncoder::new(1, 64, 4, 0.2, &mut stats, &mut rng);
        assert_eq!(enc.conv.kernel_size, 3);

        let x = Array3::from_shape_fn((2, 1, 31), |(b, _, l)| (l as f32 - b as f32).sin());
        let y = enc.forward(&x, &mut StatsMode::Frozen(&stats)).unwrap();
        // 31 -> 16 -> 8
        assert_eq!(y.shape(), &[2, 64, 8]);
        assert_eq!(enc.output_len(31), Some(8));
        assert_eq!(enc.output_len(64), Some(16));
    }

    #[test]
    fn test_haar_encoder_kernel_is_one() {
        let mut stats = RunningStats::new();
        let mut rng = StdRng::seed_from_u64(3);
        let enc = BranchEncoder::new(1, 8, 2, 0.2, &mut stats, &mut rng);
        assert_eq!(enc.conv.kernel_size, 1);
    }

    #[test]
    fn test_concat_along_sequence() {
        let a = Array3::<f32>::ones((2, 64, 16));
        let b = Array3::<f32>::zeros((2, 64, 8));
        let joined = concat_levels(&[a, b]).unwrap();
        assert_eq!(joined.shape(), &[2, 64, 24]);
        assert_eq!(joined[[1, 5, 15]], 1.0);
        assert_eq!(joined[[1, 5, 16]], 0.0);
    }

    #[test]
    fn test_concat_rejects_channel_mismatch() {
        let a = Array3::<f32>::ones((2, 64, 16));
        let b = Array3::<f32>::ones((2, 32, 16));
        assert!(matches!(
            concat_levels(&[a, b]),
            Err(Error::Shape { .. })
        ));
    }
}
