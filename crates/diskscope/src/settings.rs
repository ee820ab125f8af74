//! Configuration and settings management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub view: ViewSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerSettings {
    /// Filesystem types whose mounts may be scanned; everything else mounted
    /// is excluded.
    #[serde(default = "default_fs_types")]
    pub fs_types: Vec<String>,
    /// Idle/pause poll interval of the worker thread.
    #[serde(default = "default_queue_poll_ms")]
    pub queue_poll_ms: u64,
    /// How close to the platform watch limit counts as "near exceeded".
    #[serde(default = "default_watch_limit_margin")]
    pub watch_limit_margin: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSettings {
    /// Cap on children copied per level into a view snapshot.
    #[serde(default = "default_max_children")]
    pub max_children: usize,
    /// Cells whose proportional area falls below this many pixels are
    /// dropped from the layout.
    #[serde(default = "default_min_pixel_area")]
    pub min_pixel_area: i64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            fs_types: default_fs_types(),
            queue_poll_ms: default_queue_poll_ms(),
            watch_limit_margin: default_watch_limit_margin(),
        }
    }
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            max_children: default_max_children(),
            min_pixel_area: default_min_pixel_area(),
        }
    }
}

fn default_fs_types() -> Vec<String> {
    platform::default_fs_allowlist()
}

fn default_queue_poll_ms() -> u64 {
    20
}

fn default_watch_limit_margin() -> i64 {
    64
}

fn default_max_children() -> usize {
    100
}

fn default_min_pixel_area() -> i64 {
    50
}

impl Settings {
    /// Reads settings from a TOML file. A missing file is not an error;
    /// scanning should work out of the box, so defaults are returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading settings file {}", path.display()));
            }
        };
        toml::from_str(&contents)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }

    /// Writes the settings as pretty TOML, creating missing parent
    /// directories on the way.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let rendered = toml::to_string_pretty(self).context("serializing settings")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating settings directory {}", parent.display()))?;
        }
        std::fs::write(path, rendered)
            .with_context(|| format!("writing settings file {}", path.display()))
    }

    /// Where settings live when the host doesn't pick a location:
    /// `settings.toml` in a `diskscope` folder under the platform config
    /// directory, or the working directory if the platform reports none.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("diskscope")
            .join("settings.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.scanner.fs_types.iter().any(|t| t == "ext4"));
        assert_eq!(settings.scanner.queue_poll_ms, 20);
        assert_eq!(settings.view.max_children, 100);
        assert_eq!(settings.view.min_pixel_area, 50);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.scanner.queue_poll_ms = 5;
        settings.view.max_children = 50;

        settings.save(&settings_path).unwrap();

        let loaded = Settings::load(&settings_path).unwrap();
        assert_eq!(loaded.scanner.queue_poll_ms, 5);
        assert_eq!(loaded.view.max_children, 50);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("nonexistent.toml");

        let settings = Settings::load(&settings_path).unwrap();
        assert_eq!(settings.scanner.queue_poll_ms, 20);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.toml");
        std::fs::write(&settings_path, "[scanner]\nqueue_poll_ms = 7\n").unwrap();

        let loaded = Settings::load(&settings_path).unwrap();
        assert_eq!(loaded.scanner.queue_poll_ms, 7);
        assert_eq!(loaded.view.min_pixel_area, 50);
        assert!(!loaded.scanner.fs_types.is_empty());
    }

    #[test]
    fn test_settings_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir
            .path()
            .join("subdir")
            .join("nested")
            .join("settings.toml");

        assert!(!nested_path.parent().unwrap().exists());

        let settings = Settings::default();
        settings.save(&nested_path).unwrap();

        assert!(nested_path.exists());
        let loaded = Settings::load(&nested_path).unwrap();
        assert_eq!(loaded.scanner.queue_poll_ms, 20);
    }
}
