//! Configuration system
//!
//! Scene-level settings live in [`SceneConfig`]. Any configuration type can
//! be loaded from or saved to TOML or RON files through the [`Config`] trait;
//! the format is picked from the file extension.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

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
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
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

    /// A value was parsed but is not usable
    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// # Scene Configuration
///
/// Settings owned by one scene instance. Missing fields in a config file fall
/// back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Identifier of the canvas the rendering context belongs to
    pub canvas_id: String,
    /// RGBA colour the colour buffer is cleared to before each render
    pub clear_color: [f32; 4],
    /// Whether the depth buffer is cleared before each render
    pub clear_depth: bool,
    /// Upper bound on nested Instance expansion within one traversal
    pub max_instance_depth: usize,
    /// Log per-render statistics at debug level
    pub log_stats: bool,
}

impl SceneConfig {
    /// Create a configuration bound to the given canvas
    pub fn new(canvas_id: impl Into<String>) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            ..Self::default()
        }
    }

    /// Set the clear colour
    pub fn with_clear_color(mut self, rgba: [f32; 4]) -> Self {
        self.clear_color = rgba;
        self
    }

    /// Set the instance nesting limit
    pub fn with_max_instance_depth(mut self, depth: usize) -> Self {
        self.max_instance_depth = depth;
        self
    }

    /// Enable or disable statistics logging
    pub fn with_log_stats(mut self, enabled: bool) -> Self {
        self.log_stats = enabled;
        self
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_instance_depth == 0 {
            return Err(ConfigError::Invalid("max_instance_depth must be at least 1".to_string()));
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::Invalid("clear_color must be finite".to_string()));
        }
        Ok(())
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            canvas_id: "theCanvas".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: true,
            max_instance_depth: 32,
            log_stats: false,
        }
    }
}

impl Config for SceneConfig {}
