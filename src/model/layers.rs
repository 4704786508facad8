//! Neural network layer implementations
//!
//! All layers work on channels-first tensors `[batch, channels, length]`.

use super::stats::{RunningStats, StatsMode};
use crate::error::{Error, Result};
use ndarray::{s, Array1, Array2, Array3, Axis};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Padding rule of a sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    /// No padding; the window must fit inside the input
    Valid,
    /// Output length `ceil(in / stride)`, padding split evenly with the
    /// extra element on the right
    Same,
}

impl Padding {
    /// Output length and left padding, or `None` when no window fits
    pub fn resolve(self, in_len: usize, kernel_size: usize, stride: usize) -> Option<(usize, usize)> {
        match self {
            Padding::Valid => {
                if in_len < kernel_size {
                    None
                } else {
                    Some(((in_len - kernel_size) / stride + 1, 0))
                }
            }
            Padding::Same => {
                if in_len == 0 {
                    return None;
                }
                let out_len = (in_len + stride - 1) / stride;
                let total = ((out_len - 1) * stride + kernel_size).saturating_sub(in_len);
                Some((out_len, total / 2))
            }
        }
    }
}

/// Glorot/Xavier uniform sampler for a layer with the given fans
fn glorot<R: Rng + ?Sized>(fan_in: usize, fan_out: usize, rng: &mut R) -> impl FnMut() -> f32 + '_ {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    move || dist.sample(&mut *rng)
}

/// 1D convolution (cross-correlation, no bias)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv1d {
    /// Weight tensor [out_channels, in_channels, kernel_size]
    pub weight: Array3<f32>,
    /// Stride
    pub stride: usize,
    /// Padding
    pub padding: Padding,
    /// Input channels
    pub in_channels: usize,
    /// Output channels
    pub out_channels: usize,
    /// Kernel size
    pub kernel_size: usize,
}

impl Conv1d {
    /// Create a new Conv1d layer with Glorot-uniform weights
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: Padding,
        rng: &mut R,
    ) -> Self {
        let mut sample = glorot(in_channels * kernel_size, out_channels * kernel_size, rng);
        let weight = Array3::from_shape_fn((out_channels, in_channels, kernel_size), |_| sample());

        Self {
            weight,
            stride,
            padding,
            in_channels,
            out_channels,
            kernel_size,
        }
    }

    /// Output length for an input of `in_len`, if the input is long enough
    pub fn output_len(&self, in_len: usize) -> Option<usize> {
        self.padding
            .resolve(in_len, self.kernel_size, self.stride)
            .map(|(len, _)| len)
    }

    /// Forward pass
    /// Input shape: [batch, in_channels, length]
    /// Output shape: [batch, out_channels, new_length]
    pub fn forward(&self, input: &Array3<f32>) -> Result<Array3<f32>> {
        let (batch_size, in_channels, in_len) = input.dim();

        if in_channels != self.in_channels {
            return Err(Error::shape("conv1d input channels", self.in_channels, in_channels));
        }

        let (out_len, pad_left) = self
            .padding
            .resolve(in_len, self.kernel_size, self.stride)
            .ok_or_else(|| {
                Error::shape(
                    "conv1d input length",
                    format!(">= {}", self.kernel_size),
                    in_len,
                )
            })?;

        let kernel = self
            .weight
            .to_shape((self.out_channels, self.in_channels * self.kernel_size))
            .map_err(|e| Error::shape("conv1d weight", "contiguous kernel", e))?;

        let mut output = Array3::zeros((batch_size, self.out_channels, out_len));
        let mut cols = Array2::<f32>::zeros((self.in_channels * self.kernel_size, out_len));

        for b in 0..batch_size {
            cols.fill(0.0);
            for ic in 0..self.in_channels {
                for k in 0..self.kernel_size {
                    let row = ic * self.kernel_size + k;
                    for ol in 0..out_len {
                        let pos = (ol * self.stride + k) as isize - pad_left as isize;
                        if pos >= 0 && (pos as usize) < in_len {
                            cols[[row, ol]] = input[[b, ic, pos as usize]];
                        }
                    }
                }
            }
            output.slice_mut(s![b, .., ..]).assign(&kernel.dot(&cols));
        }

        Ok(output)
    }

    /// Sum of squared weights
    pub fn squared_norm(&self) -> f32 {
        self.weight.iter().map(|w| w * w).sum()
    }

    /// Get number of parameters
    pub fn num_params(&self) -> usize {
        self.out_channels * self.in_channels * self.kernel_size
    }
}

/// Batch Normalization 1D
///
/// Running statistics are kept in the model's [`RunningStats`] under
/// `slot`; the layer itself only owns the affine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm1d {
    /// Number of features (channels)
    pub num_features: usize,
    /// Scale parameter (gamma)
    pub weight: Array1<f32>,
    /// Shift parameter (beta)
    pub bias: Array1<f32>,
    /// Small constant for numerical stability
    pub eps: f32,
    /// Decay of the running statistics
    pub momentum: f32,
    /// Index into the running statistics record
    pub slot: usize,
}

impl BatchNorm1d {
    /// Create a new BatchNorm1d layer and register its statistics
    pub fn new(num_features: usize, stats: &mut RunningStats) -> Self {
        Self {
            num_features,
            weight: Array1::ones(num_features),
            bias: Array1::zeros(num_features),
            eps: 1e-3,
            momentum: 0.99,
            slot: stats.register(num_features),
        }
    }

    /// Forward pass
    /// Input shape: [batch, channels, length]
    pub fn forward(&self, input: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array3<f32>> {
        let channels = input.shape()[1];
        if channels != self.num_features {
            return Err(Error::shape("batchnorm channels", self.num_features, channels));
        }

        let mut output = input.clone();

        match stats {
            StatsMode::Update(record) => {
                let layer = record
                    .layer_mut(self.slot)
                    .filter(|l| l.num_features() == self.num_features)
                    .ok_or_else(|| self.missing_slot())?;

                for c in 0..self.num_features {
                    let x = input.slice(s![.., c, ..]);
                    let mean = x.mean().unwrap_or(0.0);
                    let var = x.mapv(|v| (v - mean) * (v - mean)).mean().unwrap_or(0.0);

                    layer.mean[c] = self.momentum * layer.mean[c] + (1.0 - self.momentum) * mean;
                    layer.var[c] = self.momentum * layer.var[c] + (1.0 - self.momentum) * var;

                    self.normalize_channel(&mut output, c, mean, var);
                }
            }
            StatsMode::Frozen(record) => {
                let layer = record
                    .layer(self.slot)
                    .filter(|l| l.num_features() == self.num_features)
                    .ok_or_else(|| self.missing_slot())?;

                for c in 0..self.num_features {
                    self.normalize_channel(&mut output, c, layer.mean[c], layer.var[c]);
                }
            }
        }

        Ok(output)
    }

    fn normalize_channel(&self, output: &mut Array3<f32>, c: usize, mean: f32, var: f32) {
        let std = (var + self.eps).sqrt();
        let (gamma, beta) = (self.weight[c], self.bias[c]);
        output
            .slice_mut(s![.., c, ..])
            .mapv_inplace(|v| gamma * (v - mean) / std + beta);
    }

    fn missing_slot(&self) -> Error {
        Error::shape(
            "batchnorm running statistics",
            format!("slot {} with {} features", self.slot, self.num_features),
            "missing or different width",
        )
    }

    /// Get number of parameters
    pub fn num_params(&self) -> usize {
        self.num_features * 2
    }
}

/// Leaky ReLU activation function
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeakyReLU {
    /// Slope for negative inputs
    pub slope: f32,
}

impl LeakyReLU {
    pub fn new(slope: f32) -> Self {
        Self { slope }
    }

    /// Forward pass
    pub fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        let slope = self.slope;
        input.mapv(|x| if x > 0.0 { x } else { slope * x })
    }
}

/// Max Pooling 1D
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxPool1d {
    /// Kernel size
    pub kernel_size: usize,
    /// Stride
    pub stride: usize,
    /// Padding
    pub padding: Padding,
}

impl MaxPool1d {
    /// Create a new MaxPool1d layer
    pub fn new(kernel_size: usize, stride: usize, padding: Padding) -> Self {
        Self {
            kernel_size,
            stride,
            padding,
        }
    }

    /// Forward pass; padded positions never win the maximum
    pub fn forward(&self, input: &Array3<f32>) -> Result<Array3<f32>> {
        let (batch_size, channels, in_len) = input.dim();

        let (out_len, pad_left) = self
            .padding
            .resolve(in_len, self.kernel_size, self.stride)
            .ok_or_else(|| {
                Error::shape("maxpool input length", format!(">= {}", self.kernel_size), in_len)
            })?;

        let mut output = Array3::from_elem((batch_size, channels, out_len), f32::NEG_INFINITY);

        for b in 0..batch_size {
            for c in 0..channels {
                for ol in 0..out_len {
                    let start_idx = ol * self.stride;

                    for k in 0..self.kernel_size {
                        let padded_idx = (start_idx + k) as isize - pad_left as isize;

                        if padded_idx >= 0 && (padded_idx as usize) < in_len {
                            output[[b, c, ol]] =
                                output[[b, c, ol]].max(input[[b, c, padded_idx as usize]]);
                        }
                    }
                }
            }
        }

        Ok(output)
    }
}

/// Mean over the length axis
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GlobalAvgPool1d;

impl GlobalAvgPool1d {
    /// [batch, channels, length] -> [batch, channels]
    pub fn forward(&self, input: &Array3<f32>) -> Result<Array2<f32>> {
        input
            .mean_axis(Axis(2))
            .ok_or_else(|| Error::shape("global average pool length", "> 0", 0))
    }
}

/// Linear (Fully Connected) layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix [out_features, in_features]
    pub weight: Array2<f32>,
    /// Bias vector [out_features]
    pub bias: Array1<f32>,
    /// Input features
    pub in_features: usize,
    /// Output features
    pub out_features: usize,
}

impl Linear {
    /// Create a new Linear layer with Glorot-uniform weights and zero bias
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let mut sample = glorot(in_features, out_features, rng);
        let weight = Array2::from_shape_fn((out_features, in_features), |_| sample());

        Self {
            weight,
            bias: Array1::zeros(out_features),
            in_features,
            out_features,
        }
    }

    /// Forward pass
    /// Input shape: [batch, in_features]
    /// Output shape: [batch, out_features]
    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        if input.ncols() != self.in_features {
            return Err(Error::shape("linear input features", self.in_features, input.ncols()));
        }

        let mut output = input.dot(&self.weight.t());
        output += &self.bias;
        Ok(output)
    }

    /// Get number of parameters
    pub fn num_params(&self) -> usize {
        self.in_features * self.out_features + self.out_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn test_padding_resolve() {
        assert_eq!(Padding::Valid.resolve(64, 4, 2), Some((31, 0)));
        assert_eq!(Padding::Valid.resolve(3, 4, 2), None);
        assert_eq!(Padding::Same.resolve(10, 3, 2), Some((5, 0)));
        assert_eq!(Padding::Same.resolve(31, 7, 2), Some((16, 3)));
        assert_eq!(Padding::Same.resolve(8, 4, 1), Some((8, 1)));
        assert_eq!(Padding::Same.resolve(0, 3, 1), None);
    }

    #[test]
    fn test_conv1d_forward_shape() {
        let conv = Conv1d::new(2, 4, 3, 1, Padding::Same, &mut rng());
        let input = Array3::ones((1, 2, 10));
        let output = conv.forward(&input).unwrap();
        assert_eq!(output.shape(), &[1, 4, 10]);

        let strided = Conv1d::new(2, 4, 7, 2, Padding::Same, &mut rng());
        assert_eq!(strided.forward(&input).unwrap().shape(), &[1, 4, 5]);
    }

    #[test]
    fn test_conv1d_values() {
        let mut conv = Conv1d::new(1, 1, 3, 1, Padding::Same, &mut rng());
        conv.weight = Array3::from_shape_vec((1, 1, 3), vec![1.0, 2.0, 3.0]).unwrap();
        let input = Array3::from_shape_vec((1, 1, 4), vec![1.0, 1.0, 2.0, 0.0]).unwrap();

        let out = conv.forward(&input).unwrap();
        // Zero padding one on each side, no kernel flip
        assert_eq!(out.iter().cloned().collect::<Vec<_>>(), vec![5.0, 9.0, 5.0, 2.0]);
    }

    #[test]
    fn test_conv1d_rejects_wrong_channels() {
        let conv = Conv1d::new(3, 4, 3, 1, Padding::Same, &mut rng());
        let input = Array3::ones((1, 2, 10));
        assert!(matches!(conv.forward(&input), Err(Error::Shape { .. })));
    }

    #[test]
    fn test_batchnorm_train_updates_stats() {
        let mut stats = RunningStats::new();
        let bn = BatchNorm1d::new(2, &mut stats);
        let input = Array3::from_shape_fn((2, 2, 4), |(b, c, l)| (b * 4 + l) as f32 + c as f32 * 10.0);

        let output = bn.forward(&input, &mut StatsMode::Update(&mut stats)).unwrap();
        for c in 0..2 {
            let channel = output.slice(s![.., c, ..]);
            assert_abs_diff_eq!(channel.mean().unwrap(), 0.0, epsilon = 1e-5);
        }

        let layer = stats.layer(0).unwrap();
        // batch mean of channel 0 is 3.5, momentum 0.99
        assert_abs_diff_eq!(layer.mean[0], 0.035, epsilon = 1e-5);
        assert_abs_diff_eq!(layer.mean[1], 0.135, epsilon = 1e-5);
        assert!(layer.var[0] > 1.0);
    }

    #[test]
    fn test_batchnorm_frozen_uses_running_stats() {
        let mut stats = RunningStats::new();
        let bn = BatchNorm1d::new(3, &mut stats);
        let input = Array3::from_elem((2, 3, 5), 2.0);

        let output = bn.forward(&input, &mut StatsMode::Frozen(&stats)).unwrap();
        let expected = 2.0 / (1.0f32 + 1e-3).sqrt();
        assert!(output.iter().all(|&v| (v - expected).abs() < 1e-6));
        assert_eq!(stats.layer(0).unwrap().mean[0], 0.0);
    }

    #[test]
    fn test_batchnorm_missing_slot() {
        let mut stats = RunningStats::new();
        let bn = BatchNorm1d::new(3, &mut stats);
        let empty = RunningStats::new();
        let input = Array3::ones((1, 3, 4));
        assert!(bn.forward(&input, &mut StatsMode::Frozen(&empty)).is_err());
    }

    #[test]
    fn test_leaky_relu_forward() {
        let act = LeakyReLU::new(0.2);
        let input = Array3::from_shape_vec((1, 1, 3), vec![-1.0, 0.0, 2.0]).unwrap();
        let output = act.forward(&input);
        assert_abs_diff_eq!(output[[0, 0, 0]], -0.2);
        assert_eq!(output[[0, 0, 1]], 0.0);
        assert_eq!(output[[0, 0, 2]], 2.0);
    }

    #[test]
    fn test_maxpool1d_same() {
        let pool = MaxPool1d::new(3, 2, Padding::Same);
        let input = Array3::from_shape_vec((1, 1, 5), vec![-1.0, -5.0, -2.0, -7.0, -3.0]).unwrap();
        let output = pool.forward(&input).unwrap();
        // left pad 1: windows start at -1, 1, 3; padding never wins
        assert_eq!(output.iter().cloned().collect::<Vec<_>>(), vec![-1.0, -2.0, -3.0]);

        let input = Array3::ones((1, 2, 10));
        assert_eq!(pool.forward(&input).unwrap().shape(), &[1, 2, 5]);
    }

    #[test]
    fn test_global_avg_pool() {
        let input = Array3::from_shape_fn((2, 3, 4), |(_, c, l)| (c * 4 + l) as f32);
        let out = GlobalAvgPool1d.forward(&input).unwrap();
        assert_eq!(out.shape(), &[2, 3]);
        assert_abs_diff_eq!(out[[1, 2]], 9.5);
    }

    #[test]
    fn test_linear_forward() {
        let linear = Linear::new(10, 5, &mut rng());
        let input = Array2::ones((2, 10));
        let output = linear.forward(&input).unwrap();
        assert_eq!(output.shape(), &[2, 5]);
        assert!(linear.forward(&Array2::ones((2, 9))).is_err());
    }
}
