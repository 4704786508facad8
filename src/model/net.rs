//! Multi-resolution residual classifier
//!
//! Input windows are decomposed into `max_level + 1` resolutions, each level
//! goes through its own [`BranchEncoder`], the encoded levels are joined
//! along the sequence axis and fed to the [`ResidualStack`]. A dense head
//! maps the pooled embedding to class logits.

use super::blocks::BlockKind;
use super::encoder::{concat_levels, BranchEncoder};
use super::layers::Linear;
use super::resnet::ResidualStack;
use super::stats::{RunningStats, StatsMode};
use super::wavelet::{Decomposer, DecompositionPlan, Wavelet};
use crate::error::{Error, Result};
use crate::utils::ModelConfig;
use ndarray::{Array2, Array3, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What a forward pass is for; labels are one-hot [batch, classes_num]
#[derive(Debug, Clone, Copy)]
pub enum Mode<'a> {
    Train(&'a Array2<f32>),
    Eval(&'a Array2<f32>),
    Predict,
}

/// Result of a forward pass, one variant per [`Mode`]
#[derive(Debug, Clone)]
pub enum ModeOutput {
    Train(TrainOutput),
    Eval(EvalOutput),
    Predict(Predictions),
}

/// Predict-mode output
#[derive(Debug, Clone)]
pub struct Predictions {
    /// Arg-max class per sample
    pub classes: Vec<usize>,
    /// Softmax probabilities [batch, classes_num]
    pub probabilities: Array2<f32>,
}

/// Eval-mode output
#[derive(Debug, Clone, Copy)]
pub struct EvalOutput {
    pub loss: f32,
    pub accuracy: f32,
}

/// Train-mode output
#[derive(Debug, Clone)]
pub struct TrainOutput {
    pub loss: f32,
    pub update: UpdateRequest,
}

/// Everything an external optimizer needs to take a step.
///
/// The network does not differentiate through itself; it hands out the
/// gradient of the data loss with respect to the logits together with the
/// embedding that produced them.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// Total loss (data + regularization)
    pub loss: f32,
    /// Weight-decay part of `loss`
    pub regularization: f32,
    /// d(cross-entropy)/d(logits), already divided by the batch size
    pub logit_grad: Array2<f32>,
    /// Pooled embedding fed to the classifier head [batch, embedding_dim]
    pub embedding: Array2<f32>,
    /// Running-statistics version after this pass
    pub stats_version: u64,
}

/// Row-wise numerically stable softmax
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();

    for mut row in probs.rows_mut() {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp_sum: f32 = row.iter().map(|&x| (x - max).exp()).sum();

        for val in row.iter_mut() {
            *val = (*val - max).exp() / exp_sum;
        }
    }

    probs
}

/// Index of the largest value; first one wins ties
pub fn argmax(row: ArrayView1<'_, f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}

/// Mean softmax cross-entropy between one-hot `labels` and `logits`
pub fn cross_entropy(logits: &Array2<f32>, labels: &Array2<f32>) -> f32 {
    let batch = logits.nrows().max(1) as f32;
    let mut total = 0.0f32;

    for (row, target) in logits.rows().into_iter().zip(labels.rows()) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = row.iter().map(|&x| (x - max).exp()).sum::<f32>().ln() + max;
        total -= row
            .iter()
            .zip(target.iter())
            .map(|(&x, &t)| t * (x - log_sum))
            .sum::<f32>();
    }

    total / batch
}

/// Fraction of rows where the label and logit arg-max agree
pub fn accuracy(logits: &Array2<f32>, labels: &Array2<f32>) -> f32 {
    if logits.nrows() == 0 {
        return 0.0;
    }
    let correct = logits
        .rows()
        .into_iter()
        .zip(labels.rows())
        .filter(|(l, t)| argmax(*l) == argmax(*t))
        .count();
    correct as f32 / logits.nrows() as f32
}

/// Multi-resolution residual classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiResolutionNet {
    pub decomposer: Decomposer,
    /// One encoder per decomposition level
    pub encoders: Vec<BranchEncoder>,
    pub stack: ResidualStack,
    /// Classifier head
    pub head: Linear,
    pub in_channels: usize,
    pub classes_num: usize,
    pub reg_rate: f32,
    stats: RunningStats,
}

impl MultiResolutionNet {
    /// Build a network for windows of `window_len` samples.
    ///
    /// Fails if the wavelet is unknown or `max_level` steps do not fit the
    /// window, before any weight is allocated.
    pub fn new(
        config: &ModelConfig,
        in_channels: usize,
        window_len: usize,
        classes_num: usize,
    ) -> Result<Self> {
        if classes_num == 0 || in_channels == 0 {
            return Err(Error::Config(format!(
                "need at least one class and one channel, got {} and {}",
                classes_num, in_channels
            )));
        }

        let wavelet = Wavelet::by_name(&config.wavelet)?;
        let plan = DecompositionPlan::new(wavelet, config.max_level, window_len)?;
        debug!(levels = ?plan.level_lens, wavelet = %plan.wavelet.name, "decomposition plan");

        let mut rng = match config.init_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut stats = RunningStats::new();
        let filter_len = plan.wavelet.dec_len();

        let encoders = (0..plan.num_levels())
            .map(|_| {
                BranchEncoder::new(
                    in_channels,
                    config.encoder_channels,
                    filter_len,
                    config.leakiness,
                    &mut stats,
                    &mut rng,
                )
            })
            .collect();

        let stack = ResidualStack::new(
            config.encoder_channels,
            BlockKind::from_flag(config.bottleneck),
            config.leakiness,
            &mut stats,
            &mut rng,
        );
        let head = Linear::new(stack.embedding_dim(), classes_num, &mut rng);

        let net = Self {
            decomposer: Decomposer::new(plan),
            encoders,
            stack,
            head,
            in_channels,
            classes_num,
            reg_rate: config.reg_rate,
            stats,
        };

        info!(
            levels = net.encoders.len(),
            embedding = net.stack.embedding_dim(),
            classes = classes_num,
            params = net.num_params(),
            "built multi-resolution network"
        );

        Ok(net)
    }

    /// Run one forward pass in the given mode
    pub fn forward(&mut self, x: &Array3<f32>, mode: Mode<'_>) -> Result<ModeOutput> {
        match mode {
            Mode::Train(labels) => self.train_step(x, labels).map(ModeOutput::Train),
            Mode::Eval(labels) => self.evaluate(x, labels).map(ModeOutput::Eval),
            Mode::Predict => self.predict(x).map(ModeOutput::Predict),
        }
    }

    /// Train-mode pass: loss, update request, and new running statistics.
    ///
    /// Statistics are updated on a copy that replaces the current record
    /// only if the whole pass succeeds.
    pub fn train_step(&mut self, x: &Array3<f32>, labels: &Array2<f32>) -> Result<TrainOutput> {
        self.check_labels(x, labels)?;

        let mut next = self.stats.clone();
        let embedding = self.embed(x, &mut StatsMode::Update(&mut next))?;
        let logits = self.head.forward(&embedding)?;

        let regularization = self.regularization();
        let loss = cross_entropy(&logits, labels) + regularization;
        let batch = logits.nrows().max(1) as f32;
        let logit_grad = (softmax(&logits) - labels) / batch;

        next.bump();
        self.stats = next;

        debug!(loss, version = self.stats.version(), "train pass");

        Ok(TrainOutput {
            loss,
            update: UpdateRequest {
                loss,
                regularization,
                logit_grad,
                embedding,
                stats_version: self.stats.version(),
            },
        })
    }

    /// Eval-mode pass: loss and accuracy, statistics untouched
    pub fn evaluate(&self, x: &Array3<f32>, labels: &Array2<f32>) -> Result<EvalOutput> {
        self.check_labels(x, labels)?;

        let logits = self.logits(x)?;
        Ok(EvalOutput {
            loss: cross_entropy(&logits, labels) + self.regularization(),
            accuracy: accuracy(&logits, labels),
        })
    }

    /// Predict-mode pass: classes and probabilities
    pub fn predict(&self, x: &Array3<f32>) -> Result<Predictions> {
        let logits = self.logits(x)?;
        let probabilities = softmax(&logits);
        let classes = probabilities.rows().into_iter().map(argmax).collect();

        Ok(Predictions {
            classes,
            probabilities,
        })
    }

    /// Logits with frozen statistics [batch, classes_num]
    pub fn logits(&self, x: &Array3<f32>) -> Result<Array2<f32>> {
        let embedding = self.embed(x, &mut StatsMode::Frozen(&self.stats))?;
        self.head.forward(&embedding)
    }

    /// Decompose, encode every level, join, and run the residual stack
    fn embed(&self, x: &Array3<f32>, stats: &mut StatsMode<'_>) -> Result<Array2<f32>> {
        let channels = x.shape()[1];
        if channels != self.in_channels {
            return Err(Error::shape("network input channels", self.in_channels, channels));
        }
        if x.shape()[0] == 0 {
            return Err(Error::EmptyData("empty batch".into()));
        }
        let len = x.shape()[2];
        if len != self.window_len() {
            return Err(Error::shape("network input length", self.window_len(), len));
        }

        let levels = self.decomposer.decompose(x)?;
        let encoded = levels
            .iter()
            .zip(&self.encoders)
            .map(|(level, encoder)| encoder.forward(level, stats))
            .collect::<Result<Vec<_>>>()?;

        let joined = concat_levels(&encoded)?;
        self.stack.forward(&joined, stats)
    }

    fn check_labels(&self, x: &Array3<f32>, labels: &Array2<f32>) -> Result<()> {
        let expected = (x.shape()[0], self.classes_num);
        if labels.dim() != expected {
            return Err(Error::shape(
                "one-hot labels",
                format!("{:?}", expected),
                format!("{:?}", labels.dim()),
            ));
        }
        Ok(())
    }

    /// `reg_rate * sum(||W||^2 / 2)` over every convolution kernel
    pub fn regularization(&self) -> f32 {
        let squared: f32 = self
            .encoders
            .iter()
            .map(BranchEncoder::squared_norm)
            .sum::<f32>()
            + self.stack.squared_norm();
        self.reg_rate * squared / 2.0
    }

    /// Current running statistics
    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Copy of the running statistics, e.g. to evaluate while training goes on
    pub fn snapshot_stats(&self) -> RunningStats {
        self.stats.clone()
    }

    /// Replace the running statistics with a record of the same layout
    pub fn restore_stats(&mut self, stats: RunningStats) -> Result<()> {
        if !self.stats.same_layout(&stats) {
            return Err(Error::shape(
                "running statistics layout",
                format!("{} layers", self.stats.len()),
                format!("{} layers", stats.len()),
            ));
        }
        self.stats = stats;
        Ok(())
    }

    /// Window length the decomposition plan was checked against
    pub fn window_len(&self) -> usize {
        self.decomposer.plan.window_len()
    }

    /// Number of decomposition levels including the input itself
    pub fn num_levels(&self) -> usize {
        self.encoders.len()
    }

    /// Get total number of parameters
    pub fn num_params(&self) -> usize {
        self.encoders.iter().map(BranchEncoder::num_params).sum::<usize>()
            + self.stack.num_params()
            + self.head.num_params()
    }
}

/// Batch labels as class indices, for metrics
pub fn label_classes(labels: &Array2<f32>) -> Vec<usize> {
    labels.axis_iter(Axis(0)).map(argmax).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn small_config() -> ModelConfig {
        ModelConfig {
            wavelet: "db2".into(),
            max_level: 2,
            leakiness: 0.2,
            reg_rate: 1e-3,
            bottleneck: false,
            encoder_channels: 64,
            init_seed: Some(42),
        }
    }

    fn batch(n: usize, len: usize) -> Array3<f32> {
        Array3::from_shape_fn((n, 1, len), |(b, _, l)| {
            ((l as f32) * 0.25 * (b + 1) as f32).sin()
        })
    }

    fn labels(classes: &[usize], num: usize) -> Array2<f32> {
        let mut m = Array2::zeros((classes.len(), num));
        for (i, &c) in classes.iter().enumerate() {
            m[[i, c]] = 1.0;
        }
        m
    }

    #[test]
    fn test_softmax() {
        let logits = Array2::from_shape_vec((1, 3), vec![1.0, 2.0, 3.0]).unwrap();
        let probs = softmax(&logits);

        let sum: f32 = probs.row(0).iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(argmax(probs.row(0)), 2);
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let logits = Array2::zeros((2, 4));
        let y = labels(&[0, 3], 4);
        assert_abs_diff_eq!(cross_entropy(&logits, &y), (4.0f32).ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_accuracy_counts_argmax_matches() {
        let logits = Array2::from_shape_vec((3, 2), vec![2.0, 1.0, 0.0, 1.0, 5.0, 0.0]).unwrap();
        let y = labels(&[0, 1, 1], 2);
        assert_abs_diff_eq!(accuracy(&logits, &y), 2.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_new_rejects_deep_plan_and_unknown_wavelet() {
        let mut config = small_config();
        config.max_level = 5;
        assert!(matches!(
            MultiResolutionNet::new(&config, 1, 64, 3),
            Err(Error::Config(_))
        ));

        let mut config = small_config();
        config.wavelet = "shannon".into();
        assert!(matches!(
            MultiResolutionNet::new(&config, 1, 64, 3),
            Err(Error::UnknownWavelet(_))
        ));
    }

    #[test]
    fn test_predict_shapes() {
        let net = MultiResolutionNet::new(&small_config(), 1, 64, 3).unwrap();
        assert_eq!(net.num_levels(), 3);

        let out = net.predict(&batch(2, 64)).unwrap();
        assert_eq!(out.classes.len(), 2);
        assert_eq!(out.probabilities.shape(), &[2, 3]);
        for row in out.probabilities.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
        }
        assert!(out.classes.iter().all(|&c| c < 3));
    }

    #[test]
    fn test_train_updates_stats_eval_does_not() {
        let mut net = MultiResolutionNet::new(&small_config(), 1, 64, 3).unwrap();
        let x = batch(2, 64);
        let y = labels(&[0, 2], 3);

        let before = net.snapshot_stats();
        let eval = net.evaluate(&x, &y).unwrap();
        assert!(eval.loss.is_finite());
        assert!((0.0..=1.0).contains(&eval.accuracy));
        assert_eq!(net.stats(), &before);

        let train = net.train_step(&x, &y).unwrap();
        assert!(train.loss > train.update.regularization);
        assert_eq!(train.update.stats_version, 1);
        assert_eq!(train.update.logit_grad.shape(), &[2, 3]);
        assert_eq!(train.update.embedding.shape(), &[2, 512]);
        assert_ne!(net.stats(), &before);

        // Each gradient row sums to zero: softmax and one-hot both sum to one
        for row in train.update.logit_grad.rows() {
            assert_abs_diff_eq!(row.sum(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_failed_train_pass_keeps_stats() {
        let mut net = MultiResolutionNet::new(&small_config(), 1, 64, 3).unwrap();
        let before = net.snapshot_stats();

        let wrong_channels = Array3::zeros((2, 2, 64));
        let y = labels(&[0, 1], 3);
        assert!(net.train_step(&wrong_channels, &y).is_err());
        assert_eq!(net.stats(), &before);

        let bad_labels = labels(&[0], 3);
        assert!(net.train_step(&batch(2, 64), &bad_labels).is_err());
        assert_eq!(net.stats().version(), 0);
    }

    #[test]
    fn test_input_length_must_match_plan() {
        let config = ModelConfig {
            wavelet: "db4".into(),
            max_level: 3,
            ..small_config()
        };
        let mut net = MultiResolutionNet::new(&config, 1, 128, 2).unwrap();
        assert_eq!(net.window_len(), 128);
        assert!(net.predict(&batch(2, 128)).is_ok());

        for len in [32, 512] {
            match net.predict(&batch(2, len)) {
                Err(Error::Shape { context, .. }) => assert_eq!(context, "network input length"),
                other => panic!("expected length error, got {:?}", other),
            }
        }

        let y = labels(&[0, 1], 2);
        assert!(net.train_step(&batch(2, 32), &y).is_err());
        assert_eq!(net.stats().version(), 0);
    }

    #[test]
    fn test_mode_dispatch() {
        let mut net = MultiResolutionNet::new(&small_config(), 1, 64, 2).unwrap();
        let x = batch(2, 64);
        let y = labels(&[1, 0], 2);

        assert!(matches!(net.forward(&x, Mode::Predict).unwrap(), ModeOutput::Predict(_)));
        assert!(matches!(net.forward(&x, Mode::Eval(&y)).unwrap(), ModeOutput::Eval(_)));
        assert!(matches!(net.forward(&x, Mode::Train(&y)).unwrap(), ModeOutput::Train(_)));
        assert_eq!(net.stats().version(), 1);
    }

    #[test]
    fn test_regularization_scales_with_rate() {
        let mut config = small_config();
        config.reg_rate = 0.0;
        let net = MultiResolutionNet::new(&config, 1, 64, 2).unwrap();
        assert_eq!(net.regularization(), 0.0);

        config.reg_rate = 2.0;
        let net = MultiResolutionNet::new(&config, 1, 64, 2).unwrap();
        let squared: f32 = net.encoders.iter().map(|e| e.squared_norm()).sum::<f32>()
            + net.stack.squared_norm();
        assert_abs_diff_eq!(net.regularization(), squared, epsilon = 1e-3);
    }

    #[test]
    fn test_restore_stats_checks_layout() {
        let mut net = MultiResolutionNet::new(&small_config(), 1, 64, 2).unwrap();
        let snapshot = net.snapshot_stats();
        assert!(net.restore_stats(snapshot).is_ok());
        assert!(net.restore_stats(RunningStats::new()).is_err());
    }

    #[test]
    fn test_label_classes() {
        let y = labels(&[2, 0, 1], 3);
        assert_eq!(label_classes(&y), vec![2, 0, 1]);
    }
}
