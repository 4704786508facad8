//! Per-window z-score normalization

use ndarray::{Array2, Axis};

/// Standardize every row independently: `(row - mean) / std`.
///
/// Uses the population standard deviation (ddof 0) with no epsilon: a
/// constant row divides zero by zero and comes out as NaN, which callers can
/// detect with [`degenerate_rows`].
pub fn normalize_rows(data: &Array2<f64>) -> Array2<f64> {
    let mean = match data.mean_axis(Axis(1)) {
        Some(mean) => mean.insert_axis(Axis(1)),
        None => return data.clone(),
    };
    let std = data.std_axis(Axis(1), 0.0).insert_axis(Axis(1));

    (data - &mean) / &std
}

/// Indices of rows holding non-finite values
pub fn degenerate_rows(data: &Array2<f64>) -> Vec<usize> {
    data.axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().any(|v| !v.is_finite()))
        .map(|(i, _)| i)
        .collect()
}
