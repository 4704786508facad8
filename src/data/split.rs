//! Train/validation fold selection

use super::dataset::Dataset;
use crate::error::{Error, Result};
use std::ops::Range;
use tracing::info;

/// Number of holdout folds
pub const FOLD_COUNT: usize = 5;

/// Index range of validation fold `fold` (1-based) in a collection of `n`.
///
/// `None` for fold 0, which holds nothing out, and for folds past [`FOLD_COUNT`].
pub fn fold_range(n: usize, fold: usize) -> Option<Range<usize>> {
    if fold == 0 || fold > FOLD_COUNT {
        return None;
    }
    Some(n * (fold - 1) / FOLD_COUNT..n * fold / FOLD_COUNT)
}

/// Split a shuffled training collection into `(train, validation)`.
///
/// `fold_id == 0` keeps everything for training and returns a full copy of
/// it as the validation set. `fold_id` in `1..=5` holds out the contiguous
/// range [`fold_range`] and trains on the rest, order preserved.
pub fn split_fold(dataset: &Dataset, fold_id: usize) -> Result<(Dataset, Dataset)> {
    if fold_id == 0 {
        info!(rows = dataset.len(), "no holdout fold, validating on the training set");
        return Ok((dataset.clone(), dataset.clone()));
    }

    let n = dataset.len();
    let range = fold_range(n, fold_id).ok_or_else(|| {
        Error::Config(format!("fold id {} out of range 0..={}", fold_id, FOLD_COUNT))
    })?;
    let train_idx: Vec<usize> = (0..n).filter(|i| !range.contains(i)).collect();
    let valid_idx: Vec<usize> = range.clone().collect();

    info!(
        fold = fold_id,
        valid_start = range.start,
        valid_end = range.end,
        train_rows = train_idx.len(),
        "selected holdout fold"
    );

    Ok((dataset.select(&train_idx), dataset.select(&valid_idx)))
}
