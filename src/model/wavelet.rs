//! Multi-resolution decomposition
//!
//! Each level is the previous one passed through a wavelet's decomposition
//! low-pass filter in valid mode at stride 2, i.e. the approximation branch
//! of a discrete wavelet transform without boundary extension.

use crate::error::{Error, Result};
use ndarray::{s, Array1, Array3, ArrayView1};
use serde::{Deserialize, Serialize};

const HAAR: [f64; 2] = [0.7071067811865476, 0.7071067811865476];

const DB2: [f64; 4] = [
    -0.12940952255092145,
    0.22414386804185735,
    0.836516303737469,
    0.48296291314469025,
];

const DB3: [f64; 6] = [
    0.035226291882100656,
    -0.08544127388224149,
    -0.13501102001039084,
    0.4598775021193313,
    0.8068915093133388,
    0.3326705529509569,
];

const DB4: [f64; 8] = [
    -0.010597401784997278,
    0.032883011666982945,
    0.030841381835986965,
    -0.18703481171888114,
    -0.02798376941698385,
    0.6308807679295904,
    0.7148465705525415,
    0.23037781330885523,
];

const SYM4: [f64; 8] = [
    -0.07576571478927333,
    -0.02963552764599851,
    0.49761866763201545,
    0.8037387518059161,
    0.29785779560527736,
    -0.09921954357684722,
    -0.012603967262037833,
    0.0322231006040427,
];

const COIF1: [f64; 6] = [
    -0.01565572813546454,
    -0.0727326195128539,
    0.38486484686420286,
    0.8525720202122554,
    0.3378976624578092,
    -0.0727326195128539,
];

/// A named wavelet and its decomposition low-pass kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wavelet {
    pub name: String,
    /// Decomposition low-pass coefficients, in published order
    pub dec_lo: Vec<f32>,
}

impl Wavelet {
    /// Names accepted by [`Wavelet::by_name`]
    pub const KNOWN: [&'static str; 9] = [
        "haar", "db1", "db2", "db3", "db4", "sym2", "sym3", "sym4", "coif1",
    ];

    /// Look up a wavelet family by name.
    ///
    /// Only the names in [`Wavelet::KNOWN`] are available; higher orders such
    /// as `db6` are rejected with [`Error::UnknownWavelet`].
    pub fn by_name(name: &str) -> Result<Self> {
        let coeffs: &[f64] = match name.to_ascii_lowercase().as_str() {
            "haar" | "db1" => &HAAR,
            // Symlets of order 2 and 3 coincide with the Daubechies filters
            "db2" | "sym2" => &DB2,
            "db3" | "sym3" => &DB3,
            "db4" => &DB4,
            "sym4" => &SYM4,
            "coif1" => &COIF1,
            _ => {
                return Err(Error::UnknownWavelet(format!(
                    "{} (supported: {})",
                    name,
                    Self::KNOWN.join(", ")
                )))
            }
        };

        Ok(Self {
            name: name.to_string(),
            dec_lo: coeffs.iter().map(|&c| c as f32).collect(),
        })
    }

    /// Filter length `F`
    pub fn dec_len(&self) -> usize {
        self.dec_lo.len()
    }
}

/// Length of one low-pass step applied to `len` samples
pub fn level_len(len: usize, filter_len: usize) -> Option<usize> {
    if len < filter_len {
        None
    } else {
        Some((len - filter_len) / 2 + 1)
    }
}

/// One decomposition step over a single channel.
///
/// Valid-mode convolution with the low-pass kernel at stride 2:
/// `out[i] = sum_k x[2i + k] * dec_lo[F - 1 - k]`.
pub fn lowpass_level(signal: ArrayView1<'_, f32>, dec_lo: &[f32]) -> Result<Array1<f32>> {
    let f = dec_lo.len();
    let out_len = level_len(signal.len(), f)
        .ok_or_else(|| Error::shape("wavelet level input", format!(">= {}", f), signal.len()))?;

    Ok(Array1::from_shape_fn(out_len, |i| {
        let window = signal.slice(s![2 * i..2 * i + f]);
        window
            .iter()
            .zip(dec_lo.iter().rev())
            .map(|(x, h)| x * h)
            .sum::<f32>()
    }))
}

/// All `max_level + 1` levels of one sequence, level 0 first
pub fn decompose_signal(
    signal: ArrayView1<'_, f32>,
    dec_lo: &[f32],
    max_level: usize,
) -> Result<Vec<Array1<f32>>> {
    let mut levels = Vec::with_capacity(max_level + 1);
    levels.push(signal.to_owned());

    for _ in 0..max_level {
        let next = match levels.last() {
            Some(prev) => lowpass_level(prev.view(), dec_lo)?,
            None => break,
        };
        levels.push(next);
    }

    Ok(levels)
}

/// Level lengths of a decomposition, validated up front
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionPlan {
    pub wavelet: Wavelet,
    pub max_level: usize,
    /// Length of every level, level 0 = window length
    pub level_lens: Vec<usize>,
}

impl DecompositionPlan {
    /// Check that `max_level` steps fit a window of `window_len`
    pub fn new(wavelet: Wavelet, max_level: usize, window_len: usize) -> Result<Self> {
        let mut level_lens = vec![window_len];

        for level in 0..max_level {
            let len = level_lens[level];
            let next = level_len(len, wavelet.dec_len()).ok_or_else(|| {
                Error::Config(format!(
                    "decomposition level {} has {} samples, shorter than the {} filter ({} taps); \
                     lower max_level or raise window_length",
                    level + 1,
                    len,
                    wavelet.name,
                    wavelet.dec_len()
                ))
            })?;
            level_lens.push(next);
        }

        Ok(Self {
            wavelet,
            max_level,
            level_lens,
        })
    }

    /// Number of representations (`max_level + 1`)
    pub fn num_levels(&self) -> usize {
        self.level_lens.len()
    }

    /// Input length the plan was validated for
    pub fn window_len(&self) -> usize {
        self.level_lens.first().copied().unwrap_or(0)
    }
}

/// Applies the decomposition to model batches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposer {
    pub plan: DecompositionPlan,
}

impl Decomposer {
    pub fn new(plan: DecompositionPlan) -> Self {
        Self { plan }
    }

    /// Decompose every (sample, channel) sequence independently.
    ///
    /// Input [batch, channels, len]; output one tensor per level with the
    /// same batch and channel axes.
    pub fn decompose(&self, x: &Array3<f32>) -> Result<Vec<Array3<f32>>> {
        let (batch, channels, _) = x.dim();
        let dec_lo = &self.plan.wavelet.dec_lo;

        let mut levels = vec![x.clone()];
        for _ in 0..self.plan.max_level {
            let prev = match levels.last() {
                Some(prev) => prev,
                None => break,
            };
            let next_len = level_len(prev.shape()[2], dec_lo.len()).ok_or_else(|| {
                Error::shape(
                    "wavelet level input",
                    format!(">= {}", dec_lo.len()),
                    prev.shape()[2],
                )
            })?;

            let mut next = Array3::zeros((batch, channels, next_len));
            for b in 0..batch {
                for c in 0..channels {
                    let level = lowpass_level(prev.slice(s![b, c, ..]), dec_lo)?;
                    next.slice_mut(s![b, c, ..]).assign(&level);
                }
            }
            levels.push(next);
        }

        Ok(levels)
    }
}
