//! Error types for the wavelet ResNet library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (unreachable window length, fold id, plan depth, ...)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Wavelet family not present in the kernel table
    #[error("Unknown wavelet: {0}")]
    UnknownWavelet(String),

    /// Tensor shape does not fit the operation
    #[error("Shape error in {context}: expected {expected}, got {got}")]
    Shape {
        context: &'static str,
        expected: String,
        got: String,
    },

    /// Malformed record
    #[error("Failed to parse record at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Nothing to work on
    #[error("Empty data: {0}")]
    EmptyData(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML decoding error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML encoding error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Build a shape error from anything printable
    pub fn shape(
        context: &'static str,
        expected: impl std::fmt::Display,
        got: impl std::fmt::Display,
    ) -> Self {
        Error::Shape {
            context,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_error_message() {
        let err = Error::shape("concat", "64 channels", "32 channels");
        assert_eq!(
            err.to_string(),
            "Shape error in concat: expected 64 channels, got 32 channels"
        );
    }

    #[test]
    fn test_parse_error_names_line() {
        let err = Error::Parse {
            line: 3,
            message: "bad label".into(),
        };
        assert!(err.to_string().contains("line 3"));
    }
}
