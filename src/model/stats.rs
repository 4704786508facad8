//! Batch-normalization running statistics
//!
//! The statistics live outside the layers that use them. Every
//! [`BatchNorm1d`](super::layers::BatchNorm1d) owns a slot index into a
//! [`RunningStats`] record held by the network; forward passes receive a
//! [`StatsMode`] telling them whether they may write to it.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Running mean/variance of one batch-norm layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    pub mean: Array1<f32>,
    pub var: Array1<f32>,
}

impl LayerStats {
    /// Fresh statistics: zero mean, unit variance
    pub fn new(num_features: usize) -> Self {
        Self {
            mean: Array1::zeros(num_features),
            var: Array1::ones(num_features),
        }
    }

    /// Number of channels tracked
    pub fn num_features(&self) -> usize {
        self.mean.len()
    }
}

/// Versioned statistics of every batch-norm layer of a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    version: u64,
    layers: Vec<LayerStats>,
}

impl RunningStats {
    /// Empty record, slots are added while the model is built
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for a layer with `num_features` channels
    pub fn register(&mut self, num_features: usize) -> usize {
        self.layers.push(LayerStats::new(num_features));
        self.layers.len() - 1
    }

    /// Number of committed training passes
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Mark one more training pass as committed
    pub fn bump(&mut self) {
        self.version += 1;
    }

    /// Number of registered layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True when no layer registered
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, slot: usize) -> Option<&LayerStats> {
        self.layers.get(slot)
    }

    pub fn layer_mut(&mut self, slot: usize) -> Option<&mut LayerStats> {
        self.layers.get_mut(slot)
    }

    /// True when `other` has the same slots with the same widths
    pub fn same_layout(&self, other: &RunningStats) -> bool {
        self.layers.len() == other.layers.len()
            && self
                .layers
                .iter()
                .zip(&other.layers)
                .all(|(a, b)| a.num_features() == b.num_features())
    }
}

/// How a forward pass may touch the running statistics
#[derive(Debug)]
pub enum StatsMode<'a> {
    /// Training: normalize with batch statistics and fold them into the record
    Update(&'a mut RunningStats),
    /// Evaluation / prediction: normalize with the recorded statistics
    Frozen(&'a RunningStats),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_layout() {
        let mut a = RunningStats::new();
        assert_eq!(a.register(4), 0);
        assert_eq!(a.register(8), 1);
        assert_eq!(a.len(), 2);
        assert_eq!(a.layer(1).unwrap().num_features(), 8);
        assert_eq!(a.layer(0).unwrap().var[0], 1.0);

        let mut b = RunningStats::new();
        b.register(4);
        assert!(!a.same_layout(&b));
        b.register(8);
        assert!(a.same_layout(&b));
    }

    #[test]
    fn test_version_bump() {
        let mut stats = RunningStats::new();
        assert_eq!(stats.version(), 0);
        stats.bump();
        stats.bump();
        assert_eq!(stats.version(), 2);
    }
}
