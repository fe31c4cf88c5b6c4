use thiserror::Error;

use crate::model::{MatchId, PlayerId};

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("unknown player id {0}")]
    UnknownPlayer(PlayerId),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("signal {signal} unavailable for match {match_id}")]
    MissingSignal { signal: &'static str, match_id: MatchId },

    #[error("{what} = {value} outside [{lo}, {hi}]")]
    OutOfRange {
        what: &'static str,
        value: f64,
        lo: f64,
        hi: f64,
    },

    #[error("all signals older than {threshold_days} days")]
    StaleData { threshold_days: i64 },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PredictionError {
    /// Errors that make a prediction impossible. Everything else degrades the result instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PredictionError::UnknownPlayer(_)
                | PredictionError::Identity(_)
                | PredictionError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PredictionError>;
