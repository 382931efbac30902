//! Configuration vault – reads/writes `~/.trackable/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use trackable_fetch::FetchConfig;
use trackable_types::DEFAULT_VRPN_PORT;

/// How fetched samples are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}' (text / json)")),
        }
    }
}

/// Persisted user configuration stored in `~/.trackable/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host used when a shell command omits one.
    #[serde(default = "default_host")]
    pub default_host: String,

    /// Port used when a shell command omits one.
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// How long to wait for the first report, in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub output: OutputFormat,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    DEFAULT_VRPN_PORT
}
fn default_deadline_ms() -> u64 {
    1000
}
fn default_connect_timeout_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_host: default_host(),
            default_port: default_port(),
            deadline_ms: default_deadline_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            output: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Timing settings for the fetch library.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig::default()
            .with_deadline(Duration::from_millis(self.deadline_ms))
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Return the path to `~/.trackable/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".trackable").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Load the config, falling back to defaults (plus env overrides) when the
/// file is missing.
pub fn load_or_default() -> Result<Config, String> {
    match load()? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Apply `TRACKABLE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TRACKABLE_HOST` | `default_host` |
/// | `TRACKABLE_PORT` | `default_port` |
/// | `TRACKABLE_DEADLINE_MS` | `deadline_ms` |
/// | `TRACKABLE_CONNECT_TIMEOUT_MS` | `connect_timeout_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TRACKABLE_HOST") {
        cfg.default_host = v;
    }
    if let Ok(v) = std::env::var("TRACKABLE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.default_port = port;
    }
    if let Ok(v) = std::env::var("TRACKABLE_DEADLINE_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.deadline_ms = ms;
    }
    if let Ok(v) = std::env::var("TRACKABLE_CONNECT_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.connect_timeout_ms = ms;
    }
}

/// Save the config to disk, creating `~/.trackable/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_custom_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            default_host: "mocap.lab".to_string(),
            default_port: 3884,
            deadline_ms: 250,
            connect_timeout_ms: 500,
            output: OutputFormat::Json,
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.default_port, 3884);
        assert_eq!(loaded.output, OutputFormat::Json);
        assert_eq!(loaded.connect_timeout_ms, 500);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = toml::from_str("default_host = \"10.0.0.5\"\n").expect("parse");
        assert_eq!(cfg.default_host, "10.0.0.5");
        assert_eq!(cfg.default_port, 3883);
        assert_eq!(cfg.deadline_ms, 1000);
        assert_eq!(cfg.output, OutputFormat::Text);
    }

    #[test]
    fn fetch_config_uses_millisecond_fields() {
        let cfg = Config {
            deadline_ms: 250,
            connect_timeout_ms: 40,
            ..Config::default()
        };
        let fetch = cfg.fetch_config();
        assert_eq!(fetch.deadline, Duration::from_millis(250));
        assert_eq!(fetch.connect_timeout, Duration::from_millis(40));
    }

    #[test]
    fn config_path_points_to_trackable_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".trackable"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn output_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn apply_env_overrides_changes_host() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("TRACKABLE_HOST", "192.168.1.145") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.default_host, "192.168.1.145");
        unsafe { std::env::remove_var("TRACKABLE_HOST") };
    }

    #[test]
    fn apply_env_overrides_changes_deadline() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("TRACKABLE_DEADLINE_MS", "2500") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.deadline_ms, 2500);
        unsafe { std::env::remove_var("TRACKABLE_DEADLINE_MS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_port() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("TRACKABLE_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.default_port, DEFAULT_VRPN_PORT);
        unsafe { std::env::remove_var("TRACKABLE_PORT") };
    }
}
