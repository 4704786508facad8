//! Record loading
//!
//! Records are comma-delimited rows without a header: column 0 is the
//! integer class label, the remaining columns are the raw signal.

use super::dataset::{Dataset, RawSample};
use crate::error::{Error, Result};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

/// Seed of the reproducible record shuffle
pub const DEFAULT_SHUFFLE_SEED: u64 = 472_943;

/// Largest class label accepted in a record
pub const MAX_LABEL: usize = u16::MAX as usize;

/// Load a record file and shuffle its rows with `seed`
pub fn load_records<P: AsRef<Path>>(path: P, seed: u64) -> Result<Dataset> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut samples = parse_records(BufReader::new(file))?;

    if samples.is_empty() {
        return Err(Error::EmptyData(format!("no records in {}", path.display())));
    }

    shuffle_samples(&mut samples, seed);
    let dataset = Dataset::from_samples(samples)?;

    info!(
        path = %path.display(),
        rows = dataset.len(),
        signal_len = dataset.signal_len(),
        "loaded records"
    );

    Ok(dataset)
}

/// Parse records from any reader, keeping file order
pub fn parse_records<R: Read>(reader: R) -> Result<Vec<RawSample>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    let mut width: Option<usize> = None;

    for (idx, result) in csv_reader.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 1);

        if record.len() < 2 {
            return Err(Error::Parse {
                line,
                message: "expected a label followed by at least one value".into(),
            });
        }

        match width {
            Some(w) if w != record.len() => {
                return Err(Error::Parse {
                    line,
                    message: format!("row has {} columns, expected {}", record.len(), w),
                });
            }
            None => width = Some(record.len()),
            _ => {}
        }

        let label = parse_label(&record[0]).ok_or_else(|| Error::Parse {
            line,
            message: format!(
                "invalid label '{}', expected an integer in 0..={}",
                &record[0], MAX_LABEL
            ),
        })?;

        let signal = record
            .iter()
            .skip(1)
            .map(|field| {
                field.parse::<f64>().map_err(|e| Error::Parse {
                    line,
                    message: format!("invalid value '{}': {}", field, e),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        samples.push(RawSample {
            label,
            signal: Array1::from(signal),
        });
    }

    Ok(samples)
}

/// Shuffle rows deterministically
pub fn shuffle_samples(samples: &mut [RawSample], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);
}

/// Labels may be written as integers or integral floats ("2" or "2.0")
fn parse_label(field: &str) -> Option<usize> {
    if let Ok(v) = field.parse::<usize>() {
        return (v <= MAX_LABEL).then_some(v);
    }
    let v = field.parse::<f64>().ok()?;
    if v.is_finite() && (0.0..=MAX_LABEL as f64).contains(&v) && v.fract() == 0.0 {
        Some(v as usize)
    } else {
        None
    }
}
