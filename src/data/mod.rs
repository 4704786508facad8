//! Data preparation module
//!
//! Loads labeled records, selects the validation fold, expands every signal
//! into sliding windows and standardizes them.

mod dataset;
mod loader;
mod normalize;
mod split;
mod window;

pub use dataset::{
    one_hot, prepare, prepare_datasets, Batch, BatchIterator, Dataset, PreparedData, RawSample,
    WindowedSet,
};
pub use loader::{load_records, parse_records, shuffle_samples, DEFAULT_SHUFFLE_SEED, MAX_LABEL};
pub use normalize::{degenerate_rows, normalize_rows};
pub use split::{fold_range, split_fold, FOLD_COUNT};
pub use window::{derive_window_len, slice_windows, Windows};
