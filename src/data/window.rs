//! Sliding-window augmentation
//!
//! Turns a handful of long labeled signals into many fixed-length windows.
//! The window length is always a power of two derived from the requested
//! length, and every offset of the window inside a row becomes a sample.

use crate::error::{Error, Result};
use ndarray::{s, Array2};
use tracing::debug;

/// Derive the canonical window length.
///
/// Takes half of `min(ori_len, requested)` as a threshold and returns the
/// smallest power of two strictly greater than it.
pub fn derive_window_len(ori_len: usize, requested: usize) -> usize {
    // Integer halving is exact here: for a power of two p, p > n / 2 iff p > floor(n / 2)
    let threshold = ori_len.min(requested) / 2;
    let mut length = 1usize;
    while length <= threshold {
        length <<= 1;
    }
    length
}

/// Windows produced from a 2D signal array
#[derive(Debug, Clone)]
pub struct Windows {
    /// Window rows [n * windows_per_row, window_len]
    pub data: Array2<f64>,
    /// Label of every window
    pub labels: Vec<usize>,
    /// Derived window length
    pub window_len: usize,
    /// Number of sliding offsets per source row
    pub windows_per_row: usize,
}

/// Expand every row of `signals` into all its windows.
///
/// Output is grouped by source row, then by increasing offset, so window
/// `i * windows_per_row + j` is `signals[i][j..j + window_len]`.
pub fn slice_windows(signals: &Array2<f64>, labels: &[usize], requested: usize) -> Result<Windows> {
    let (rows, ori_len) = signals.dim();

    if labels.len() != rows {
        return Err(Error::shape(
            "slice_windows labels",
            format!("{} labels", rows),
            format!("{} labels", labels.len()),
        ));
    }

    let window_len = derive_window_len(ori_len, requested);
    if window_len > ori_len {
        return Err(Error::Config(format!(
            "window length {} (from requested {}) exceeds signal length {}",
            window_len, requested, ori_len
        )));
    }
    let windows_per_row = ori_len - window_len + 1;

    debug!(
        rows,
        ori_len, requested, window_len, windows_per_row, "slicing windows"
    );

    let total = rows * windows_per_row;
    let mut data = Array2::zeros((total, window_len));
    let mut out_labels = Vec::with_capacity(total);

    for (i, &label) in labels.iter().enumerate() {
        for j in 0..windows_per_row {
            data.row_mut(i * windows_per_row + j)
                .assign(&signals.slice(s![i, j..j + window_len]));
            out_labels.push(label);
        }
    }

    Ok(Windows {
        data,
        labels: out_labels,
        window_len,
        windows_per_row,
    })
}
