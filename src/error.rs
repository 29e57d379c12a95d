use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Feature dimension mismatch: expected {expected}, got {actual}")]
    FeatureDimension { expected: usize, actual: usize },

    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Detection {index} has a degenerate bounding box")]
    DegenerateBox { index: usize },

    #[error("Projected covariance of track {track_id} is not positive definite")]
    DegenerateCovariance { track_id: u64 },

    #[error("Feature extractor error: {0}")]
    Extractor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config Error: {0}")]
    Config(#[from] serde_json::Error),
}
