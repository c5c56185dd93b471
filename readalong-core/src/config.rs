use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Overlay fill: an RGB colour blended at `alpha` over the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub rgb: [u8; 3],
    pub alpha: f32,
}

impl Fill {
    pub fn is_visible(&self) -> bool {
        self.alpha > 0.0
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Horizontal space of the surface not available to the page.
    pub fixed_padding_px: f32,
    pub page_gap_px: u32,
    pub auto_scroll: bool,
    pub smooth_scroll: bool,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "smooth_scroll_ms")]
    pub smooth_scroll_duration: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "double_activation_ms")]
    pub double_activation: Duration,
    pub words_per_minute: f32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "min_sentence_ms")]
    pub min_sentence: Duration,
    pub active_fill: Fill,
    pub inactive_fill: Fill,
    pub merge_adjacent_regions: bool,
    pub render_cache_pages: usize,
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fixed_padding_px: 32.0,
            page_gap_px: 12,
            auto_scroll: true,
            smooth_scroll: true,
            smooth_scroll_duration: Duration::from_millis(280),
            double_activation: Duration::from_millis(400),
            words_per_minute: 170.0,
            min_sentence: Duration::from_millis(900),
            active_fill: Fill {
                rgb: [255, 214, 10],
                alpha: 0.42,
            },
            inactive_fill: Fill {
                rgb: [110, 150, 255],
                alpha: 0.0,
            },
            merge_adjacent_regions: true,
            render_cache_pages: 10,
            log_filter: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "readalong", "readalong")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads `path` if given, otherwise the platform default location. Only
    /// a missing default file falls back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = Self::from_toml_str(&raw).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.words_per_minute.is_finite() && self.words_per_minute > 0.0) {
            return Err(ConfigError::Invalid {
                field: "words_per_minute",
                reason: format!("must be positive, got {}", self.words_per_minute),
            });
        }
        if !(self.fixed_padding_px.is_finite() && self.fixed_padding_px >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "fixed_padding_px",
                reason: format!("must be non-negative, got {}", self.fixed_padding_px),
            });
        }
        for (field, fill) in [
            ("active_fill", self.active_fill),
            ("inactive_fill", self.inactive_fill),
        ] {
            if !(0.0..=1.0).contains(&fill.alpha) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("alpha must be within 0..=1, got {}", fill.alpha),
                });
            }
        }
        Ok(())
    }

    /// Emphasis depends on the active flag alone.
    pub fn fill_for(&self, is_active: bool) -> Fill {
        if is_active {
            self.active_fill
        } else {
            self.inactive_fill
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_keys_take_defaults() {
        let config = Config::from_toml_str("words_per_minute = 200.0\nauto_scroll = false\n").unwrap();
        assert_eq!(config.words_per_minute, 200.0);
        assert!(!config.auto_scroll);
        assert_eq!(config.double_activation, Duration::from_millis(400));
        assert_eq!(config.page_gap_px, Config::default().page_gap_px);
    }

    #[test]
    fn durations_are_read_as_milliseconds() {
        let config =
            Config::from_toml_str("double_activation_ms = 250\nsmooth_scroll_ms = 0\n").unwrap();
        assert_eq!(config.double_activation, Duration::from_millis(250));
        assert_eq!(config.smooth_scroll_duration, Duration::ZERO);
    }

    #[test]
    fn fills_parse_and_validate() {
        let config = Config::from_toml_str(
            "[active_fill]\nrgb = [1, 2, 3]\nalpha = 0.5\n",
        )
        .unwrap();
        assert_eq!(config.fill_for(true).rgb, [1, 2, 3]);
        assert_eq!(config.fill_for(false), config.inactive_fill);

        let err = Config::from_toml_str("[active_fill]\nrgb = [1, 2, 3]\nalpha = 2.0\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "active_fill",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_positive_reading_speed() {
        let err = Config::from_toml_str("words_per_minute = 0.0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "words_per_minute",
                ..
            }
        ));
    }

    #[test]
    fn explicit_path_must_exist_and_parse() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "auto_scroll = [").unwrap();
        match Config::load(Some(&broken)) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, broken),
            other => panic!("unexpected result: {:?}", other),
        }

        let good = dir.path().join("config.toml");
        std::fs::write(&good, "page_gap_px = 4\n").unwrap();
        assert_eq!(Config::load(Some(&good)).unwrap().page_gap_px, 4);
    }
}
