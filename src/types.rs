use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use shakmaty::uci::UciMove;

/// Rating-regime model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    Blitz,
    Rapid,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Blitz, ModelVariant::Rapid];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelVariant::Blitz => "blitz",
            ModelVariant::Rapid => "rapid",
        }
    }

    /// File name of the exported network inside the model directory.
    pub fn artifact_name(self) -> String {
        format!("maia_{}.onnx", self.as_str())
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            ModelVariant::Blitz => 0,
            ModelVariant::Rapid => 1,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by the `FromStr` impls of [`ModelVariant`] and [`Device`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownTag {}

impl FromStr for ModelVariant {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blitz" => Ok(ModelVariant::Blitz),
            "rapid" => Ok(ModelVariant::Rapid),
            _ => Err(UnknownTag(s.to_string())),
        }
    }
}

/// Where a model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "gpu" => Ok(Device::Gpu),
            _ => Err(UnknownTag(s.to_string())),
        }
    }
}

/// Self/opponent skill conditioning, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingPair {
    #[serde(rename = "self")]
    pub own: u32,
    pub opponent: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveProbability {
    #[serde(serialize_with = "serialize_uci")]
    pub uci: UciMove,
    pub probability: f32,
}

fn serialize_uci<S: Serializer>(uci: &UciMove, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(uci)
}

/// Raw engine output for one position.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// Legal moves with their probabilities, in the order the engine emitted them
    pub policy: Vec<MoveProbability>,
    /// Win probability (0.0 to 1.0) for the side to move
    pub value: f32,
}

/// Ranked answer to one prediction request.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub variant: ModelVariant,
    pub ratings: RatingPair,
    pub win_probability: f32,
    /// Highest probability first; ties keep engine order.
    pub ranked_moves: Vec<MoveProbability>,
}
