//! Tennis match outcome engine: independent signal estimators fused into a bounded win
//! probability with an explainable confidence score.

pub mod behavior;
pub mod calibration;
pub mod config;
pub mod data_source;
pub mod elo;
pub mod environment;
pub mod error;
pub mod fake_feed;
pub mod form;
pub mod head_to_head;
pub mod injury;
pub mod logging;
pub mod market;
pub mod model;
pub mod win_prob;

pub use config::{EngineConfig, WeightTable};
pub use data_source::{MemoryStore, RatingSink, SignalSource};
pub use error::{PredictionError, Result};
pub use model::{
    Category, CompletedMatch, Factor, Finalize, MatchRequest, PlayerId, Round, Side, Surface,
};
pub use win_prob::{PredictionAggregator, PredictionFlag, PredictionResult};
