//! Format-agnostic configuration loading and saving

use crate::{Error, NormalizedPath, Result, io};
use serde::{Serialize, de::DeserializeOwned};

/// Format-agnostic configuration store.
///
/// Detects the format from the file extension (`.toml`, `.json`,
/// `.yaml`/`.yml`) and handles serialization transparently.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore;

impl ConfigStore {
    /// Create a new ConfigStore.
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a file.
    pub fn load<T: DeserializeOwned>(&self, path: &NormalizedPath) -> Result<T> {
        let content = io::read_text(path)?;
        Self::parse(path, &content)
    }

    /// Load configuration from a file, falling back to `T::default()` when
    /// the file does not exist. Parse errors are still reported.
    pub fn load_or_default<T: DeserializeOwned + Default>(
        &self,
        path: &NormalizedPath,
    ) -> Result<T> {
        match io::read_text(path) {
            Ok(content) => Self::parse(path, &content),
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %path, "Config file absent, using defaults");
                Ok(T::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Parse `content` using the format implied by `path`'s extension.
    pub fn parse<T: DeserializeOwned>(path: &NormalizedPath, content: &str) -> Result<T> {
        let extension = path.extension().unwrap_or("");
        let parse_error = |format: &str, message: String| Error::ConfigParse {
            path: path.to_native(),
            format: format.into(),
            message,
        };

        match extension.to_lowercase().as_str() {
            "toml" => toml::from_str(content).map_err(|e| parse_error("TOML", e.to_string())),
            "json" => {
                serde_json::from_str(content).map_err(|e| parse_error("JSON", e.to_string()))
            }
            "yaml" | "yml" => {
                serde_yaml::from_str(content).map_err(|e| parse_error("YAML", e.to_string()))
            }
            _ => Err(Error::UnsupportedFormat {
                extension: extension.to_string(),
            }),
        }
    }

    /// Save configuration to a file.
    ///
    /// Format is determined from file extension. Uses atomic write.
    pub fn save<T: Serialize>(&self, path: &NormalizedPath, value: &T) -> Result<()> {
        let extension = path.extension().unwrap_or("");
        let serialize_error = |format: &str, message: String| Error::ConfigSerialize {
            path: path.to_native(),
            format: format.into(),
            message,
        };

        let content = match extension.to_lowercase().as_str() {
            "toml" => {
                toml::to_string_pretty(value).map_err(|e| serialize_error("TOML", e.to_string()))?
            }
            "json" => serde_json::to_string_pretty(value)
                .map_err(|e| serialize_error("JSON", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::to_string(value).map_err(|e| serialize_error("YAML", e.to_string()))?
            }
            _ => {
                return Err(Error::UnsupportedFormat {
                    extension: extension.to_string(),
                });
            }
        };

        io::write_text(path, &content)
    }
}
