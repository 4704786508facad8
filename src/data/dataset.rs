//! Dataset creation and management

use super::loader::load_records;
use super::normalize::normalize_rows;
use super::split::split_fold;
use super::window::slice_windows;
use crate::error::{Error, Result};
use crate::utils::DataConfig;
use ndarray::{Array1, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

/// A single labeled raw signal
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Class label
    pub label: usize,
    /// Raw signal values
    pub signal: Array1<f64>,
}

/// Ordered collection of raw signals with a fixed signal length
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// One label per row
    pub labels: Vec<usize>,
    /// Raw signals [rows, signal_len]
    pub signals: Array2<f64>,
}

impl Dataset {
    /// Create a dataset from a label vector and a signal matrix
    pub fn from_rows(labels: Vec<usize>, signals: Array2<f64>) -> Result<Self> {
        if labels.len() != signals.nrows() {
            return Err(Error::shape(
                "dataset rows",
                format!("{} labels", signals.nrows()),
                format!("{} labels", labels.len()),
            ));
        }
        Ok(Self { labels, signals })
    }

    /// Create a dataset from individual samples, all of the same length
    pub fn from_samples(samples: Vec<RawSample>) -> Result<Self> {
        let width = samples.first().map(|s| s.signal.len()).unwrap_or(0);
        let mut signals = Array2::zeros((samples.len(), width));
        let mut labels = Vec::with_capacity(samples.len());

        for (i, sample) in samples.into_iter().enumerate() {
            if sample.signal.len() != width {
                return Err(Error::shape(
                    "dataset signal length",
                    width,
                    sample.signal.len(),
                ));
            }
            signals.row_mut(i).assign(&sample.signal);
            labels.push(sample.label);
        }

        Ok(Self { labels, signals })
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Length of every signal
    pub fn signal_len(&self) -> usize {
        self.signals.ncols()
    }

    /// New dataset made of the given rows, in the given order
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Self {
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            signals: self.signals.select(Axis(0), indices),
        }
    }

    /// Expand into sliding windows of the length derived from `requested`
    pub fn windows(&self, requested: usize) -> Result<WindowedSet> {
        let w = slice_windows(&self.signals, &self.labels, requested)?;
        Ok(WindowedSet {
            labels: w.labels,
            windows: w.data,
            window_len: w.window_len,
            windows_per_row: w.windows_per_row,
        })
    }
}

/// Fixed-length windows ready for the model
#[derive(Debug, Clone)]
pub struct WindowedSet {
    /// One label per window
    pub labels: Vec<usize>,
    /// Windows [n, window_len]
    pub windows: Array2<f64>,
    /// Window length
    pub window_len: usize,
    /// Windows contributed by each source row
    pub windows_per_row: usize,
}

impl WindowedSet {
    /// Number of windows
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if set is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Z-score every window
    pub fn normalize(&mut self) {
        self.windows = normalize_rows(&self.windows);
        let bad = super::normalize::degenerate_rows(&self.windows);
        if !bad.is_empty() {
            warn!(count = bad.len(), "constant windows normalized to NaN");
        }
    }

    /// Largest label + 1
    pub fn num_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m + 1)
    }

    /// All windows as model input [n, 1, window_len]
    pub fn to_input(&self) -> Array3<f32> {
        self.windows
            .mapv(|v| v as f32)
            .insert_axis(Axis(1))
    }

    /// Gather selected windows as a batch
    pub fn get_batch(&self, indices: &[usize]) -> Batch {
        let inputs = self
            .windows
            .select(Axis(0), indices)
            .mapv(|v| v as f32)
            .insert_axis(Axis(1));
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        Batch { inputs, labels }
    }

    /// Iterate over batches, optionally in a seeded shuffled order
    pub fn batch_iter(&self, batch_size: usize, shuffle_seed: Option<u64>) -> BatchIterator<'_> {
        let mut indices: Vec<usize> = (0..self.len()).collect();

        if let Some(seed) = shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }

        BatchIterator {
            set: self,
            indices,
            batch_size: batch_size.max(1),
            current_idx: 0,
        }
    }
}

/// One model batch
#[derive(Debug, Clone)]
pub struct Batch {
    /// Inputs [batch, 1, window_len]
    pub inputs: Array3<f32>,
    /// Labels
    pub labels: Vec<usize>,
}

/// Iterator over batches
pub struct BatchIterator<'a> {
    set: &'a WindowedSet,
    indices: Vec<usize>,
    batch_size: usize,
    current_idx: usize,
}

impl<'a> Iterator for BatchIterator<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.indices.len() {
            return None;
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.current_idx..end_idx];
        self.current_idx = end_idx;

        Some(self.set.get_batch(batch_indices))
    }
}

/// One-hot label matrix [batch, classes_num]
pub fn one_hot(labels: &[usize], classes_num: usize) -> Result<Array2<f32>> {
    let mut out = Array2::zeros((labels.len(), classes_num));
    for (i, &label) in labels.iter().enumerate() {
        if label >= classes_num {
            return Err(Error::shape(
                "one_hot",
                format!("label < {}", classes_num),
                label,
            ));
        }
        out[[i, label]] = 1.0;
    }
    Ok(out)
}

/// Train, validation and test windows
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train: WindowedSet,
    pub valid: WindowedSet,
    pub test: WindowedSet,
}

impl PreparedData {
    /// Number of classes seen across all three sets
    pub fn classes_num(&self) -> usize {
        self.train
            .num_classes()
            .max(self.valid.num_classes())
            .max(self.test.num_classes())
    }
}

/// Window (and optionally normalize) already loaded collections
pub fn prepare_datasets(train: &Dataset, test: &Dataset, config: &DataConfig) -> Result<PreparedData> {
    let (train, valid) = split_fold(train, config.fold_id)?;

    let mut sets = [train, valid, test.clone()]
        .iter()
        .map(|ds| ds.windows(config.window_length))
        .collect::<Result<Vec<_>>>()?;

    let train_len = sets[0].window_len;
    for (name, set) in [("validation", &sets[1]), ("test", &sets[2])] {
        if set.window_len != train_len {
            return Err(Error::Config(format!(
                "{} windows have {} samples but training windows have {}; \
                 records shorter than the training records change the window length",
                name, set.window_len, train_len
            )));
        }
    }

    if config.normalize {
        sets.iter_mut().for_each(WindowedSet::normalize);
    }

    let test = sets.pop().ok_or_else(|| Error::EmptyData("test set".into()))?;
    let valid = sets.pop().ok_or_else(|| Error::EmptyData("validation set".into()))?;
    let train = sets.pop().ok_or_else(|| Error::EmptyData("training set".into()))?;

    info!(
        window_len = train.window_len,
        train = train.len(),
        valid = valid.len(),
        test = test.len(),
        normalize = config.normalize,
        "prepared windows"
    );

    Ok(PreparedData { train, valid, test })
}

/// Load both record files and prepare all three window sets
pub fn prepare(config: &DataConfig) -> Result<PreparedData> {
    let train = load_records(&config.train_path, config.shuffle_seed)?;
    let test = load_records(&config.test_path, config.shuffle_seed)?;
    prepare_datasets(&train, &test, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_dataset(rows: usize, len: usize) -> Dataset {
        let signals = Array2::from_shape_fn((rows, len), |(i, j)| {
            ((j as f64) * 0.2 * (i + 1) as f64).sin() + i as f64
        });
        Dataset::from_rows((0..rows).map(|i| i % 2).collect(), signals).unwrap()
    }

    #[test]
    fn test_from_samples_checks_width() {
        let samples = vec![
            RawSample { label: 0, signal: Array1::zeros(4) },
            RawSample { label: 1, signal: Array1::zeros(5) },
        ];
        assert!(matches!(Dataset::from_samples(samples), Err(Error::Shape { .. })));
    }

    #[test]
    fn test_windows_and_batches() {
        let ds = sine_dataset(3, 20);
        let set = ds.windows(16).unwrap();

        assert_eq!(set.window_len, 16);
        assert_eq!(set.windows_per_row, 5);
        assert_eq!(set.len(), 15);

        let mut count = 0;
        for batch in set.batch_iter(4, Some(7)) {
            assert_eq!(batch.inputs.shape()[1], 1);
            assert_eq!(batch.inputs.shape()[2], 16);
            assert_eq!(batch.inputs.shape()[0], batch.labels.len());
            count += batch.labels.len();
        }
        assert_eq!(count, set.len());
    }

    #[test]
    fn test_ordered_batches_follow_windows() {
        let ds = sine_dataset(2, 10);
        let set = ds.windows(8).unwrap();
        let first = set.batch_iter(3, None).next().unwrap();
        assert_eq!(first.labels, vec![0, 0, 0]);
        assert_eq!(first.inputs[[1, 0, 0]], set.windows[[1, 0]] as f32);
    }

    #[test]
    fn test_one_hot() {
        let m = one_hot(&[2, 0], 3).unwrap();
        assert_eq!(m.row(0).to_vec(), vec![0.0, 0.0, 1.0]);
        assert_eq!(m.row(1).to_vec(), vec![1.0, 0.0, 0.0]);
        assert!(one_hot(&[3], 3).is_err());
    }

    #[test]
    fn test_prepare_datasets_with_fold() {
        let train = sine_dataset(10, 40);
        let test = sine_dataset(4, 40);
        let config = DataConfig {
            window_length: 32,
            fold_id: 2,
            normalize: true,
            ..DataConfig::default()
        };

        let data = prepare_datasets(&train, &test, &config).unwrap();
        // 32-long request -> threshold 16 -> window 32, 9 offsets
        assert_eq!(data.train.window_len, 32);
        assert_eq!(data.train.len(), 8 * 9);
        assert_eq!(data.valid.len(), 2 * 9);
        assert_eq!(data.test.len(), 4 * 9);
        assert_eq!(data.classes_num(), 2);

        let mean: f64 = data.test.windows.row(0).sum() / 32.0;
        assert!(mean.abs() < 1e-9);
    }

    #[test]
    fn test_prepare_rejects_shorter_test_records() {
        // Train: min(40, 32) / 2 = 16 -> 32; test: min(20, 32) / 2 = 10 -> 16
        let train = sine_dataset(10, 40);
        let test = sine_dataset(4, 20);
        let config = DataConfig {
            window_length: 32,
            fold_id: 1,
            ..DataConfig::default()
        };
        assert!(matches!(
            prepare_datasets(&train, &test, &config),
            Err(Error::Config(_))
        ));

        // Longer test rows still derive the same window and are accepted
        let test = sine_dataset(4, 60);
        let data = prepare_datasets(&train, &test, &config).unwrap();
        assert_eq!(data.test.window_len, 32);
        assert_eq!(data.test.windows_per_row, 29);
    }

    #[test]
    fn test_prepare_rejects_unreachable_window() {
        // Empty signals: even the shortest window (1) does not fit
        let train = Dataset::from_rows(vec![0, 1], Array2::zeros((2, 0))).unwrap();
        let test = train.clone();
        let config = DataConfig::default();
        assert!(matches!(
            prepare_datasets(&train, &test, &config),
            Err(Error::Config(_))
        ));
    }
}
