//! Service configuration.
//!
//! Defaults, then an optional TOML file, then command-line overrides
//! applied by the binary.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    engine::Backend,
    error::ConfigError,
    types::{Device, ModelVariant},
    validate::DEFAULT_TOP_K,
};

pub const DEFAULT_MODEL_DIR: &str = "./maia2_models";
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";
pub const DEFAULT_DOWNLOAD_BASE_URL: &str =
    "https://github.com/CSSLab/maia-platform-frontend/raw/c2afee/public/maia2";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory holding `maia_rapid.onnx` / `maia_blitz.onnx`.
    pub model_dir: PathBuf,
    #[serde(deserialize_with = "de_variant")]
    pub default_variant: ModelVariant,
    #[serde(deserialize_with = "de_device")]
    pub device: Device,
    pub backend: Backend,
    pub top_k: usize,
    pub bind: String,
    pub download_base_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            default_variant: ModelVariant::Rapid,
            device: Device::Cpu,
            backend: Backend::default(),
            top_k: DEFAULT_TOP_K,
            bind: DEFAULT_BIND.to_string(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
        }
    }
}

fn de_variant<'de, D: serde::Deserializer<'de>>(d: D) -> Result<ModelVariant, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn de_device<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Device, D::Error> {
    let raw = String::deserialize(d)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl ServiceConfig {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn download_url(&self, variant: ModelVariant) -> String {
        format!(
            "{}/{}",
            self.download_base_url.trim_end_matches('/'),
            variant.artifact_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_means_defaults() {
        let config = ServiceConfig::load(None).unwrap();
        assert_eq!(config.default_variant, ModelVariant::Rapid);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.bind, DEFAULT_BIND);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_variant = \"Blitz\"\nbackend = \"candle\"\ntop_k = 3").unwrap();

        let config = ServiceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_variant, ModelVariant::Blitz);
        assert_eq!(config.backend, Backend::Candle);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.model_dir, PathBuf::from(DEFAULT_MODEL_DIR));
    }

    #[test]
    fn bad_values_are_reported_with_path() {
        let path = Path::new("maia.toml");
        let err = ServiceConfig::from_toml_str("device = \"tpu\"", path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("maia.toml"));

        assert!(ServiceConfig::from_toml_str("colour = 1", path).is_err());
        assert!(matches!(
            ServiceConfig::from_file(Path::new("/definitely/not/here.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn download_url_joins_artifact_name() {
        let config = ServiceConfig {
            download_base_url: "https://example.org/models/".to_string(),
            ..ServiceConfig::default()
        };
        assert_eq!(
            config.download_url(ModelVariant::Blitz),
            "https://example.org/models/maia_blitz.onnx"
        );
    }
}
