//! Normalization of untrusted client input.
//!
//! Every function here is total: whatever JSON or CLI text comes in, the
//! result is either a normalized value or a [`ServiceError::InvalidInput`]
//! naming the field.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Field, ServiceError};
use crate::position::Position;
use crate::types::{Device, ModelVariant};

pub const MIN_RATING: u32 = 600;
pub const MAX_RATING: u32 = 3000;
pub const DEFAULT_RATING: u32 = 1500;
pub const DEFAULT_TOP_K: usize = 5;

/// Pull a rating into `[MIN_RATING, MAX_RATING]`.
pub fn clamp_rating(raw: i64) -> u32 {
    raw.clamp(MIN_RATING as i64, MAX_RATING as i64) as u32
}

/// Read an integer the way a lenient JSON client would send it: a number,
/// a finite float (truncated), or a string holding a decimal integer.
/// `Ok(None)` means absent.
fn integer(raw: Option<&Value>) -> Result<Option<i64>, String> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                // saturating cast, then the caller clamps
                Ok(Some(f.trunc() as i64))
            } else {
                Err(format!("{n} is not an integer"))
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("'{s}' is not an integer")),
        Some(other) => Err(format!("expected an integer, got {other}")),
    }
}

/// Validate one Elo value; absent means [`DEFAULT_RATING`].
pub fn validate_rating(raw: Option<&Value>) -> Result<u32, ServiceError> {
    let value = integer(raw).map_err(|reason| ServiceError::invalid(Field::Elo, reason))?;
    Ok(value.map_or(DEFAULT_RATING, clamp_rating))
}

/// Requested number of ranked moves; non-positive values become 1.
pub fn validate_top_k(raw: Option<&Value>, default: usize) -> Result<usize, ServiceError> {
    let value = integer(raw).map_err(|reason| ServiceError::invalid(Field::TopK, reason))?;
    Ok(match value {
        None => default.max(1),
        Some(k) => usize::try_from(k).unwrap_or(0).max(1),
    })
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

pub fn validate_variant(
    raw: Option<&str>,
    default: ModelVariant,
) -> Result<ModelVariant, ServiceError> {
    match non_empty(raw) {
        None => Ok(default),
        Some(s) => s.parse().map_err(|_| {
            ServiceError::invalid(
                Field::ModelType,
                format!("model_type must be 'rapid' or 'blitz', got '{s}'"),
            )
        }),
    }
}

pub fn validate_device(raw: Option<&str>, default: Device) -> Result<Device, ServiceError> {
    match non_empty(raw) {
        None => Ok(default),
        Some(s) => s.parse().map_err(|_| {
            ServiceError::invalid(
                Field::Device,
                format!("device must be 'cpu' or 'gpu', got '{s}'"),
            )
        }),
    }
}

pub fn validate_position(raw: Option<&str>) -> Result<Position, ServiceError> {
    let fen = non_empty(raw).ok_or_else(|| ServiceError::invalid(Field::Fen, "fen is required"))?;
    Position::parse(fen).map_err(|e| ServiceError::invalid(Field::Fen, e.to_string()))
}

/// Outcome of the lenient FEN check behind `/api/validate_fen`.
#[derive(Debug, Clone, Serialize)]
pub struct FenCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<&'static str>,
    pub message: String,
}

/// Like [`validate_position`] but reports problems instead of failing.
pub fn check_fen(raw: Option<&str>) -> FenCheck {
    match validate_position(raw) {
        Ok(position) => FenCheck {
            valid: true,
            turn: Some(position.turn_name()),
            message: "valid FEN".to_string(),
        },
        Err(ServiceError::InvalidInput { reason, .. }) => FenCheck {
            valid: false,
            turn: None,
            message: reason,
        },
        Err(other) => FenCheck {
            valid: false,
            turn: None,
            message: other.to_string(),
        },
    }
}
