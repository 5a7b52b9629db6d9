use chrono::NaiveTime;
use rollcall_core::settings::{ConfigError, DataPaths, FileConfig};
use rollcall_core::{LatePolicy, MatchPolicy, UnregisteredPolicy, DEFAULT_TOLERANCE};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Every frame is resized to this resolution before processing.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Wait between failed camera open attempts.
    pub open_backoff: Duration,
    /// Wait after a mid-run read failure before reopening.
    pub reconnect_delay: Duration,
    /// Run the locator on every Nth frame.
    pub skip_factor: u64,
    /// Maximum Euclidean distance for a positive match.
    pub tolerance: f32,
    pub match_policy: MatchPolicy,
    /// Gallery file, model directory and database, shared with the CLI.
    pub paths: DataPaths,
    pub shift_start: NaiveTime,
    pub late_threshold_minutes: i64,
    pub unregistered: UnregisteredPolicy,
    /// Where to write the latest annotated frame; `None` runs headless.
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables, layered
    /// over the TOML file named by `ROLLCALL_CONFIG` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let file = FileConfig::from_env(&env)?;
        Self::from_sources(file, env)
    }

    /// Resolve each key as env > file > default.
    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let paths = DataPaths::resolve(&file, &env);

        let match_policy = match env("ROLLCALL_MATCH_POLICY").or(file.match_policy) {
            Some(v) => v.parse::<MatchPolicy>().map_err(|e| ConfigError::Invalid {
                key: "match_policy",
                value: v.clone(),
                reason: e.to_string(),
            })?,
            None => MatchPolicy::default(),
        };

        let unregistered = match env("ROLLCALL_UNREGISTERED").or(file.unregistered) {
            Some(v) => v.parse::<UnregisteredPolicy>().map_err(|reason| ConfigError::Invalid {
                key: "unregistered",
                value: v.clone(),
                reason,
            })?,
            None => UnregisteredPolicy::default(),
        };

        let shift_start = match env("ROLLCALL_SHIFT_START").or(file.shift_start) {
            Some(v) => parse_time(&v).ok_or_else(|| ConfigError::Invalid {
                key: "shift_start",
                value: v.clone(),
                reason: "expected HH:MM or HH:MM:SS".to_string(),
            })?,
            None => LatePolicy::default().shift_start,
        };

        let config = Self {
            camera_device: env("ROLLCALL_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            frame_width: env_parse(&env, "ROLLCALL_FRAME_WIDTH", "frame_width")?
                .or(file.frame_width)
                .unwrap_or(640),
            frame_height: env_parse(&env, "ROLLCALL_FRAME_HEIGHT", "frame_height")?
                .or(file.frame_height)
                .unwrap_or(480),
            open_backoff: Duration::from_millis(
                env_parse(&env, "ROLLCALL_OPEN_BACKOFF_MS", "open_backoff_ms")?
                    .or(file.open_backoff_ms)
                    .unwrap_or(2000),
            ),
            reconnect_delay: Duration::from_millis(
                env_parse(&env, "ROLLCALL_RECONNECT_DELAY_MS", "reconnect_delay_ms")?
                    .or(file.reconnect_delay_ms)
                    .unwrap_or(1000),
            ),
            skip_factor: env_parse(&env, "ROLLCALL_SKIP_FACTOR", "skip_factor")?
                .or(file.skip_factor)
                .unwrap_or(3),
            tolerance: env_parse(&env, "ROLLCALL_TOLERANCE", "tolerance")?
                .or(file.tolerance)
                .unwrap_or(DEFAULT_TOLERANCE),
            match_policy,
            paths,
            shift_start,
            late_threshold_minutes: env_parse(&env, "ROLLCALL_LATE_THRESHOLD_MINUTES", "late_threshold_minutes")?
                .or(file.late_threshold_minutes)
                .unwrap_or(LatePolicy::default().late_threshold_minutes),
            unregistered,
            snapshot_path: env("ROLLCALL_SNAPSHOT_PATH").map(PathBuf::from).or(file.snapshot_path),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: String, reason: &str| ConfigError::Invalid {
            key,
            value,
            reason: reason.to_string(),
        };
        if self.skip_factor == 0 {
            return Err(invalid("skip_factor", "0".into(), "must be at least 1"));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(invalid(
                "frame_width/frame_height",
                format!("{}x{}", self.frame_width, self.frame_height),
                "must be non-zero",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(invalid("tolerance", self.tolerance.to_string(), "must be a positive number"));
        }
        if self.late_threshold_minutes < 0 {
            return Err(invalid(
                "late_threshold_minutes",
                self.late_threshold_minutes.to_string(),
                "must not be negative",
            ));
        }
        Ok(())
    }

    pub fn late_policy(&self) -> LatePolicy {
        LatePolicy {
            shift_start: self.shift_start,
            late_threshold_minutes: self.late_threshold_minutes,
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &str,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env(var) {
        Some(v) => v.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: v.clone(),
            reason: e.to_string(),
        }),
        None => Ok(None),
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
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
    fn test_defaults() {
        let config = Config::from_sources(FileConfig::default(), env_from(&[("HOME", "/home/ada")])).unwrap();
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!((config.frame_width, config.frame_height), (640, 480));
        assert_eq!(config.open_backoff, Duration::from_secs(2));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.skip_factor, 3);
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.match_policy, MatchPolicy::Nearest);
        assert_eq!(config.unregistered, UnregisteredPolicy::Register);
        assert_eq!(config.late_policy(), LatePolicy::default());
        assert_eq!(
            config.paths.gallery_path,
            PathBuf::from("/home/ada/.local/share/rollcall/gallery.json")
        );
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            camera_device = "/dev/video4"
            skip_factor = 5
            match_policy = "first"
            shift_start = "08:30"
            "#,
        )
        .unwrap();
        let env = env_from(&[("ROLLCALL_SKIP_FACTOR", "2"), ("ROLLCALL_UNREGISTERED", "reject")]);
        let config = Config::from_sources(file, env).unwrap();

        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.skip_factor, 2);
        assert_eq!(config.match_policy, MatchPolicy::FirstMatch);
        assert_eq!(config.unregistered, UnregisteredPolicy::Reject);
        assert_eq!(config.shift_start, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let zero_skip = Config::from_sources(FileConfig::default(), env_from(&[("ROLLCALL_SKIP_FACTOR", "0")]));
        assert!(matches!(zero_skip, Err(ConfigError::Invalid { key: "skip_factor", .. })));

        let bad_number = Config::from_sources(FileConfig::default(), env_from(&[("ROLLCALL_TOLERANCE", "close")]));
        assert!(matches!(bad_number, Err(ConfigError::Invalid { key: "tolerance", .. })));

        let bad_policy = Config::from_sources(FileConfig::default(), env_from(&[("ROLLCALL_MATCH_POLICY", "best")]));
        assert!(matches!(bad_policy, Err(ConfigError::Invalid { key: "match_policy", .. })));

        let bad_time = Config::from_sources(FileConfig::default(), env_from(&[("ROLLCALL_SHIFT_START", "9am")]));
        assert!(matches!(bad_time, Err(ConfigError::Invalid { key: "shift_start", .. })));
    }

    #[test]
    fn test_file_db_path_matches_shared_resolution() {
        let raw = r#"db_path = "/srv/rollcall/school.db""#;
        let env = env_from(&[("HOME", "/home/ada")]);

        let config = Config::from_sources(toml::from_str(raw).unwrap(), &env).unwrap();
        let shared = DataPaths::resolve(&toml::from_str(raw).unwrap(), &env);

        assert_eq!(config.paths.db_path, PathBuf::from("/srv/rollcall/school.db"));
        assert_eq!(config.paths, shared);
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        assert!(toml::from_str::<FileConfig>("camera = \"/dev/video0\"").is_err());
    }
}
