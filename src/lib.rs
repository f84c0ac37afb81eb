//! Serving layer for the Maia2 human-move prediction model.
//!
//! The crate loads rating-regime variants of the network (`rapid`,
//! `blitz`) on demand, validates untrusted requests (FEN, Elo ratings,
//! variant, top-k) and answers with a ranked list of move probabilities
//! plus a win probability for the side to move.
//!
//! The principal types are [`RequestPipeline`], the single entry point
//! shared by the HTTP API and the interactive session, and
//! [`ModelVariantCache`], which guarantees that each variant is loaded at
//! most once even under concurrent demand. The network itself sits behind
//! the [`InferenceEngine`] / [`ModelLoader`] traits; [`Maia`] and
//! [`OnnxLoader`] run exported `.onnx` models through ONNX Runtime.
//!
//! The library re‑exports `shakmaty` to make position construction easy.

mod assemble;
mod cache;
mod config;
mod engine;
mod error;
mod fetch;
pub mod http;
mod maia;
mod moves;
mod pipeline;
mod position;
pub mod session;
mod tensor;
#[doc(hidden)]
pub mod test_support;
mod types;
mod validate;

pub use assemble::assemble;
pub use cache::{CacheStatus, LoadedModel, ModelVariantCache};
pub use config::ServiceConfig;
pub use engine::{Backend, InferenceEngine, ModelLoader, OnnxLoader, install_backend};
pub use error::{ConfigError, Field, MaiaError, ServiceError};
pub use fetch::fetch_model;
pub use maia::Maia;
pub use moves::{ALL_MOVES, VOCABULARY_SIZE};
pub use pipeline::{PredictRequest, RequestPipeline};
pub use position::Position;
pub use types::{
    Device, EvaluationResult, InferenceResult, ModelVariant, MoveProbability, RatingPair,
};
pub use validate::{
    DEFAULT_RATING, FenCheck, MAX_RATING, MIN_RATING, check_fen, clamp_rating, validate_device,
    validate_position, validate_rating, validate_top_k, validate_variant,
};

/// Re-export of `shakmaty` for convenience when building positions.
pub use shakmaty;
