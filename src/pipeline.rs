//! One request/response cycle shared by every front-end.
//!
//! HTTP handlers and the interactive session translate their own input
//! into a [`PredictRequest`] and call [`RequestPipeline::handle`]; the
//! clamping, defaults and error mapping live here and nowhere else.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    assemble::assemble,
    cache::{CacheStatus, LoadedModel, ModelVariantCache, panic_message},
    config::ServiceConfig,
    engine::OnnxLoader,
    error::{Field, MaiaError, ServiceError},
    types::{Device, EvaluationResult, InferenceResult, ModelVariant, RatingPair},
    validate::{
        FenCheck, check_fen, validate_device, validate_position, validate_rating, validate_top_k,
        validate_variant,
    },
};

/// An untrusted prediction request. Fields stay raw JSON so that every
/// malformed value is reported against its own field.
///
/// `elo_opponent` and `game_type` are accepted as second names for
/// `elo_oppo` and `model_type`; when both names are present the first
/// one wins. Unknown keys are ignored.
#[derive(Debug, Clone, Default)]
pub struct PredictRequest {
    pub fen: Option<Value>,
    pub elo_self: Option<Value>,
    pub elo_oppo: Option<Value>,
    pub model_type: Option<Value>,
    pub device: Option<Value>,
    pub top_k: Option<Value>,
}

fn take(object: &mut Map<String, Value>, name: &str, second: Option<&str>) -> Option<Value> {
    let primary = object.remove(name).filter(|v| !v.is_null());
    let secondary = second.and_then(|k| object.remove(k)).filter(|v| !v.is_null());
    primary.or(secondary)
}

impl<'de> Deserialize<'de> for PredictRequest {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(d).map(Self::from_object)
    }
}

impl PredictRequest {
    /// Build a request from the fields of a JSON object.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        Self {
            fen: take(&mut object, "fen", None),
            elo_self: take(&mut object, "elo_self", None),
            elo_oppo: take(&mut object, "elo_oppo", Some("elo_opponent")),
            model_type: take(&mut object, "model_type", Some("game_type")),
            device: take(&mut object, "device", None),
            top_k: take(&mut object, "top_k", None),
        }
    }

    pub fn new(fen: impl Into<String>) -> Self {
        Self {
            fen: Some(Value::String(fen.into())),
            ..Self::default()
        }
    }

    pub fn elos(mut self, elo_self: i64, elo_oppo: i64) -> Self {
        self.elo_self = Some(elo_self.into());
        self.elo_oppo = Some(elo_oppo.into());
        self
    }

    pub fn model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(Value::String(model_type.into()));
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(Value::String(device.into()));
        self
    }

    pub fn top_k(mut self, top_k: i64) -> Self {
        self.top_k = Some(top_k.into());
        self
    }
}

/// A string field; any other JSON type is invalid for `field`.
pub(crate) fn text(raw: Option<&Value>, field: Field) -> Result<Option<&str>, ServiceError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ServiceError::invalid(
            field,
            format!("expected a string, got {other}"),
        )),
    }
}

pub struct RequestPipeline {
    cache: Arc<ModelVariantCache>,
    default_variant: ModelVariant,
    default_device: Device,
    default_top_k: usize,
}

impl RequestPipeline {
    pub fn new(cache: Arc<ModelVariantCache>, config: &ServiceConfig) -> Self {
        Self {
            cache,
            default_variant: config.default_variant,
            default_device: config.device,
            default_top_k: config.top_k,
        }
    }

    /// Pipeline over ONNX models found in `config.model_dir`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let loader = OnnxLoader::new(&config.model_dir, config.backend);
        Self::new(Arc::new(ModelVariantCache::new(loader)), config)
    }

    pub fn cache(&self) -> &ModelVariantCache {
        &self.cache
    }

    pub fn default_variant(&self) -> ModelVariant {
        self.default_variant
    }

    pub fn default_device(&self) -> Device {
        self.default_device
    }

    pub fn status(&self) -> CacheStatus {
        self.cache.status()
    }

    /// Validate, load, predict and rank.
    pub fn handle(&self, request: &PredictRequest) -> Result<InferenceResult, ServiceError> {
        let result = self.run(request);
        match &result {
            Ok(r) => tracing::info!(
                variant = %r.variant,
                elo_self = r.ratings.own,
                elo_oppo = r.ratings.opponent,
                moves = r.ranked_moves.len(),
                "prediction served"
            ),
            Err(e) if e.is_client_error() => tracing::debug!(error = %e, "rejected request"),
            Err(e) => tracing::error!(error = %e, "prediction failed"),
        }
        result
    }

    fn run(&self, request: &PredictRequest) -> Result<InferenceResult, ServiceError> {
        let variant = validate_variant(
            text(request.model_type.as_ref(), Field::ModelType)?,
            self.default_variant,
        )?;
        let position = validate_position(text(request.fen.as_ref(), Field::Fen)?)?;
        let ratings = RatingPair {
            own: validate_rating(request.elo_self.as_ref())?,
            opponent: validate_rating(request.elo_oppo.as_ref())?,
        };
        let device = validate_device(
            text(request.device.as_ref(), Field::Device)?,
            self.default_device,
        )?;
        let top_k = validate_top_k(request.top_k.as_ref(), self.default_top_k)?;

        let model = self.cache.get_or_load(variant, device)?;

        let evaluation = catch_unwind(AssertUnwindSafe(|| {
            model.engine.predict(&position, ratings.own, ratings.opponent)
        }))
        .unwrap_or_else(|panic| Err(MaiaError::Panic(panic_message(panic.as_ref()))))
        .and_then(check_finite)
        .map_err(ServiceError::InferenceFailure)?;

        Ok(assemble(variant, ratings, evaluation, top_k))
    }

    /// Eagerly load a variant, as `/api/init` does.
    pub fn init(
        &self,
        model_type: Option<&Value>,
        device: Option<&Value>,
    ) -> Result<Arc<LoadedModel>, ServiceError> {
        let variant = validate_variant(text(model_type, Field::ModelType)?, self.default_variant)?;
        let device = validate_device(text(device, Field::Device)?, self.default_device)?;
        self.cache.get_or_load(variant, device)
    }

    /// Lenient FEN check; never an error.
    pub fn validate_fen(&self, fen: Option<&Value>) -> FenCheck {
        match text(fen, Field::Fen) {
            Ok(raw) => check_fen(raw),
            Err(_) => check_fen(None),
        }
    }
}

fn check_finite(evaluation: EvaluationResult) -> Result<EvaluationResult, MaiaError> {
    let finite = evaluation.value.is_finite()
        && evaluation.policy.iter().all(|m| m.probability.is_finite());
    if finite {
        Ok(evaluation)
    } else {
        Err(MaiaError::NonFiniteOutput)
    }
}
