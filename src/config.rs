use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::render::WinnerPolicy;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download: DownloadConfig,
    pub render: RenderConfig,
    pub output: OutputConfig,
}

/// Download pacing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Minimum gap between API requests, in milliseconds.
    pub request_delay_ms: u64,
}

/// Rendering choices that change what ends up in the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Include reader post bodies, not just their dice rolls.
    pub include_reader_posts: bool,
    /// List spoiler tags on the title page and in the package metadata.
    pub include_spoiler_tags: bool,
    /// How the winner rows of a closed vote are chosen.
    pub winner_policy: WinnerPolicy,
}

/// Output location configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory books are written to. Defaults to the working directory.
    pub out_dir: Option<PathBuf>,
    /// Replace an existing file instead of suffixing the new one.
    pub overwrite: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            render: RenderConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 250,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            include_reader_posts: false,
            include_spoiler_tags: false,
            winner_policy: WinnerPolicy::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: None,
            overwrite: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from `~/.config/questbind/config.toml`.
    /// Returns `Default` if the file is missing or unparseable.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config at {}: {e} — using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {} — using defaults",
                    config_path.display()
                );
                Self::default()
            }
        }
    }

    /// Minimum gap between API requests.
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.download.request_delay_ms)
    }

    /// Resolved output directory (override or the working directory).
    #[must_use]
    pub fn out_dir(&self) -> PathBuf {
        self.output
            .out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("questbind").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.download.request_delay_ms, 250);
        assert!(!config.render.include_reader_posts);
        assert!(!config.render.include_spoiler_tags);
        assert_eq!(config.render.winner_policy, WinnerPolicy::HalfBand);
        assert!(config.output.out_dir.is_none());
        assert!(!config.output.overwrite);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let config: AppConfig = toml::from_str(
            "[render]\nwinner_policy = \"strict-max\"\n\n[output]\noverwrite = true\n",
        )
        .unwrap();
        assert_eq!(config.render.winner_policy, WinnerPolicy::StrictMax);
        assert!(config.output.overwrite);
        assert_eq!(config.download.request_delay_ms, 250);
    }

    #[test]
    fn test_out_dir_override() {
        let mut config = AppConfig::default();
        assert_eq!(config.out_dir(), PathBuf::from("."));
        config.output.out_dir = Some(PathBuf::from("/tmp/books"));
        assert_eq!(config.out_dir(), PathBuf::from("/tmp/books"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(
            deserialized.download.request_delay_ms,
            config.download.request_delay_ms
        );
        assert_eq!(deserialized.render.winner_policy, config.render.winner_policy);
    }
}
