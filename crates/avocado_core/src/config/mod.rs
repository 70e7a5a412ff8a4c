//! Configuration system

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Tunables for the document core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Duration of one page-transition animation, in seconds
    pub transition_duration_secs: f32,
    /// Color assigned to newly created elements
    pub default_color: (u8, u8, u8),
    /// Library material assigned to newly created elements
    pub default_material_id: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            transition_duration_secs: 1.0,
            default_color: (200, 200, 200),
            default_material_id: 0,
        }
    }
}

impl Config for CoreConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.toml");
        let path = path.to_str().unwrap();

        let config = CoreConfig {
            transition_duration_secs: 0.25,
            ..CoreConfig::default()
        };
        config.save_to_file(path).unwrap();

        let loaded = CoreConfig::load_from_file(path).unwrap();
        assert_eq!(loaded.transition_duration_secs, 0.25);
        assert_eq!(loaded.default_material_id, 0);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        assert!(matches!(
            CoreConfig::load_from_file("core.yaml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
