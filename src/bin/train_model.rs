//! Run the multi-resolution network over prepared signal windows
//!
//! Performs Train-mode passes over the training windows, evaluates on the
//! validation fold and predicts the test set. Parameter updates are left to
//! an external optimizer; this driver reports the update requests it would
//! hand over.
//!
//! Usage:
//!   cargo run --release --bin train_model -- --config config/default.toml --fold 1

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use wavelet_resnet::{
    data::{self, WindowedSet},
    model::{EvalOutput, MultiResolutionNet},
    setup_logging, Config, Metrics,
};

#[derive(Parser)]
#[command(name = "train_model")]
#[command(about = "Train and evaluate the multi-resolution residual classifier")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Training records CSV (overrides config)
    #[arg(long)]
    train: Option<PathBuf>,

    /// Test records CSV (overrides config)
    #[arg(long)]
    test: Option<PathBuf>,

    /// Validation fold, 0 = validate on the training set (overrides config)
    #[arg(short, long)]
    fold: Option<usize>,

    /// Number of epochs (overrides config)
    #[arg(short, long)]
    epochs: Option<usize>,
}

/// Eval-mode pass over a whole set, batch by batch, weighted by batch size
fn evaluate_set(net: &MultiResolutionNet, set: &WindowedSet, batch_size: usize) -> Result<EvalOutput> {
    let mut loss = 0.0f32;
    let mut accuracy = 0.0f32;

    for batch in set.batch_iter(batch_size, None) {
        let labels = data::one_hot(&batch.labels, net.classes_num)?;
        let out = net.evaluate(&batch.inputs, &labels)?;
        let weight = batch.labels.len() as f32;
        loss += out.loss * weight;
        accuracy += out.accuracy * weight;
    }

    let n = set.len().max(1) as f32;
    Ok(EvalOutput {
        loss: loss / n,
        accuracy: accuracy / n,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default(&args.config);
    if let Some(path) = args.train {
        config.data.train_path = path;
    }
    if let Some(path) = args.test {
        config.data.test_path = path;
    }
    if let Some(fold) = args.fold {
        config.data.fold_id = fold;
    }
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }

    setup_logging(&config.logging.level);
    config.validate().context("invalid configuration")?;

    println!("\nMulti-Resolution ResNet");
    println!("═══════════════════════════════════════════════════════════════\n");

    println!("[CONFIG] Configuration: {}", args.config);
    println!("[CONFIG] Train records: {}", config.data.train_path.display());
    println!("[CONFIG] Test records:  {}", config.data.test_path.display());
    println!("[CONFIG] Fold:          {}", config.data.fold_id);
    println!();

    let prepared = data::prepare(&config.data).context("failed to prepare data")?;
    let classes_num = prepared.classes_num();

    println!("[DATA] Window length:   {}", prepared.train.window_len);
    println!("[DATA] Train windows:   {}", prepared.train.len());
    println!("[DATA] Valid windows:   {}", prepared.valid.len());
    println!("[DATA] Test windows:    {}", prepared.test.len());
    println!("[DATA] Classes:         {}", classes_num);
    println!();

    let mut net = MultiResolutionNet::new(&config.model, 1, prepared.train.window_len, classes_num)
        .context("failed to build model")?;

    println!("[MODEL] Wavelet:        {}", config.model.wavelet);
    println!("[MODEL] Levels:         {}", net.num_levels());
    println!("[MODEL] Bottleneck:     {}", config.model.bottleneck);
    println!("[MODEL] Parameters:     {}", net.num_params());
    println!();

    let batch_size = config.training.batch_size;

    for epoch in 0..config.training.epochs {
        let seed = config
            .training
            .shuffle
            .then(|| config.data.shuffle_seed.wrapping_add(epoch as u64));

        let mut total_loss = 0.0f32;
        let mut batches = 0usize;

        for batch in prepared.train.batch_iter(batch_size, seed) {
            let labels = data::one_hot(&batch.labels, classes_num)?;
            let out = net.train_step(&batch.inputs, &labels)?;

            total_loss += out.loss;
            batches += 1;

            if batches % 10 == 0 {
                info!(
                    epoch = epoch + 1,
                    batch = batches,
                    loss = out.loss,
                    regularization = out.update.regularization,
                    stats_version = out.update.stats_version,
                    "update request ready"
                );
            }
        }

        let valid = evaluate_set(&net, &prepared.valid, batch_size)?;
        println!(
            "Epoch {}/{}: train loss {:.4}, valid loss {:.4}, valid accuracy {:.2}%",
            epoch + 1,
            config.training.epochs,
            total_loss / batches.max(1) as f32,
            valid.loss,
            valid.accuracy * 100.0
        );
    }

    println!("\n=== Test Set ===");

    let mut all_preds = Vec::with_capacity(prepared.test.len());
    let mut all_labels = Vec::with_capacity(prepared.test.len());

    for batch in prepared.test.batch_iter(batch_size, None) {
        let predictions = net.predict(&batch.inputs)?;
        all_preds.extend(predictions.classes);
        all_labels.extend(batch.labels);
    }

    let metrics = Metrics::new(all_labels, all_preds, classes_num);
    println!("{}", metrics.classification_report());

    info!(
        stats_version = net.stats().version(),
        accuracy = metrics.accuracy(),
        "run complete"
    );

    Ok(())
}
