//! Layer stack configuration.

use common::{CanvasError, CanvasResult, Color, Size};
use serde::{Deserialize, Serialize};

/// Layer stack configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Name given to the initial layer.
    pub background_name: String,
    /// Fill color of the initial layer.
    pub background: Color,
    /// Whether the initial layer starts locked.
    pub lock_background: bool,
    /// Reuse filtered layer images between compose passes.
    pub effects_caching: bool,
    /// Split compositing rows across the rayon pool.
    pub parallel_compose: bool,
    /// Longest edge an imported image may be placed at.
    pub max_import_size: Option<u32>,
}

impl StackConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        serde_json::from_str(json).map_err(|e| CanvasError::config(e.to_string()))
    }

    /// Transparent, unlocked initial layer.
    pub fn transparent() -> Self {
        Self {
            background: Color::TRANSPARENT,
            lock_background: false,
            ..Self::default()
        }
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    pub fn with_locked_background(mut self, locked: bool) -> Self {
        self.lock_background = locked;
        self
    }

    pub fn with_effects_caching(mut self, enabled: bool) -> Self {
        self.effects_caching = enabled;
        self
    }

    pub fn with_parallel_compose(mut self, enabled: bool) -> Self {
        self.parallel_compose = enabled;
        self
    }

    pub fn with_max_import_size(mut self, edge: u32) -> Self {
        self.max_import_size = Some(edge);
        self
    }

    /// Check the configuration against a canvas size.
    pub fn validate(&self, size: Size) -> CanvasResult<()> {
        if size.is_empty() {
            return Err(CanvasError::config(format!(
                "canvas size {}x{} is empty",
                size.width, size.height
            )));
        }
        if self.max_import_size == Some(0) {
            return Err(CanvasError::config("max_import_size must be positive"));
        }
        Ok(())
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            background_name: "Background".to_string(),
            background: Color::WHITE,
            lock_background: true,
            effects_caching: true,
            parallel_compose: true,
            max_import_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_config_defaults() {
        let config = StackConfig::default();
        assert!(config.lock_background);
        assert!(config.effects_caching);
        assert_eq!(config.background, Color::WHITE);
    }

    #[test]
    fn test_from_json_partial() {
        let config = StackConfig::from_json(r#"{"parallel_compose": false, "max_import_size": 512}"#)
            .unwrap();
        assert!(!config.parallel_compose);
        assert_eq!(config.max_import_size, Some(512));
        assert_eq!(config.background_name, "Background");

        assert!(matches!(
            StackConfig::from_json("{not json"),
            Err(CanvasError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate() {
        let config = StackConfig::new();
        assert!(config.validate(Size::new(4, 4)).is_ok());
        assert!(config.validate(Size::new(0, 4)).is_err());
        assert!(config.with_max_import_size(0).validate(Size::new(4, 4)).is_err());
    }
}
