//! The `ROLLCALL_CONFIG` TOML layer and the data paths every binary shares.
//!
//! The daemon and the CLI both resolve the gallery, model directory and
//! database through [`DataPaths`] so they always agree on which attendance
//! database is in use.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Optional TOML layer. Every key is optional; missing keys fall back
/// to environment variables and then to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub camera_device: Option<String>,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
    pub open_backoff_ms: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
    pub skip_factor: Option<u64>,
    pub tolerance: Option<f32>,
    pub match_policy: Option<String>,
    pub gallery_path: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub shift_start: Option<String>,
    pub late_threshold_minutes: Option<i64>,
    pub unregistered: Option<String>,
    pub snapshot_path: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// The file named by `ROLLCALL_CONFIG`, or an empty layer when unset.
    pub fn from_env(env: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        match env("ROLLCALL_CONFIG") {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}

/// Where rollcall keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub gallery_path: PathBuf,
    pub model_dir: PathBuf,
    pub db_path: PathBuf,
}

impl DataPaths {
    /// Resolve from the process environment and the `ROLLCALL_CONFIG` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let file = FileConfig::from_env(&env)?;
        Ok(Self::resolve(&file, &env))
    }

    /// Each path is `ROLLCALL_*` env > file > `$XDG_DATA_HOME/rollcall/...`.
    pub fn resolve(file: &FileConfig, env: &impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let pick = |key: &str, from_file: &Option<PathBuf>, default: &str| {
            env(key)
                .map(PathBuf::from)
                .or_else(|| from_file.clone())
                .unwrap_or_else(|| data_dir.join(default))
        };

        Self {
            gallery_path: pick("ROLLCALL_GALLERY_PATH", &file.gallery_path, "gallery.json"),
            model_dir: pick("ROLLCALL_MODEL_DIR", &file.model_dir, "models"),
            db_path: pick("ROLLCALL_DB_PATH", &file.db_path, "attendance.db"),
        }
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(crate::DETECTOR_MODEL)
    }

    pub fn embedder_model_path(&self) -> PathBuf {
        self.model_dir.join(crate::EMBEDDER_MODEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_under_xdg_data_home() {
        let paths = DataPaths::resolve(&FileConfig::default(), &env_from(&[("XDG_DATA_HOME", "/data")]));
        assert_eq!(paths.db_path, PathBuf::from("/data/rollcall/attendance.db"));
        assert_eq!(paths.gallery_path, PathBuf::from("/data/rollcall/gallery.json"));
        assert_eq!(
            paths.detector_model_path(),
            PathBuf::from("/data/rollcall/models").join(crate::DETECTOR_MODEL)
        );
    }

    #[test]
    fn test_file_paths_used_when_env_unset() {
        let file: FileConfig = toml::from_str("db_path = \"/srv/school.db\"\nmodel_dir = \"/opt/models\"").unwrap();
        let paths = DataPaths::resolve(&file, &env_from(&[("HOME", "/home/ada")]));
        assert_eq!(paths.db_path, PathBuf::from("/srv/school.db"));
        assert_eq!(paths.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(paths.gallery_path, PathBuf::from("/home/ada/.local/share/rollcall/gallery.json"));
    }

    #[test]
    fn test_env_beats_file() {
        let file: FileConfig = toml::from_str("db_path = \"/srv/school.db\"").unwrap();
        let paths = DataPaths::resolve(&file, &env_from(&[("ROLLCALL_DB_PATH", "/tmp/override.db")]));
        assert_eq!(paths.db_path, PathBuf::from("/tmp/override.db"));
    }

    #[test]
    fn test_config_file_named_by_env_is_loaded() {
        let path = std::env::temp_dir().join(format!("rollcall-settings-{}.toml", std::process::id()));
        std::fs::write(&path, "db_path = \"/srv/school.db\"\n").unwrap();
        let path_str = path.display().to_string();

        let file = FileConfig::from_env(&env_from(&[("ROLLCALL_CONFIG", path_str.as_str())])).unwrap();
        assert_eq!(file.db_path, Some(PathBuf::from("/srv/school.db")));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unknown_and_missing_files_rejected() {
        assert!(toml::from_str::<FileConfig>("camera = \"/dev/video0\"").is_err());
        assert!(matches!(
            FileConfig::load(Path::new("/nonexistent/rollcall.toml")),
            Err(ConfigError::Unreadable { .. })
        ));
    }
}
