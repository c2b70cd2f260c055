//! Configuration Vault – reads/writes `~/.ethos/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use ethos_runtime::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Persisted user configuration stored in `~/.ethos/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Number of synthetic decisions `ethos demo` runs when no count is
    /// given.
    #[serde(default = "default_demo_steps")]
    pub demo_steps: u64,

    /// Pipeline construction parameters.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_demo_steps() -> u64 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo_steps: default_demo_steps(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Where the config lives: `$ETHOS_CONFIG` when set and non-empty,
/// otherwise `~/.ethos/config.toml`.
pub fn config_path() -> PathBuf {
    resolve_config_path(|var| std::env::var(var).ok())
}

fn resolve_config_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(explicit) = lookup("ETHOS_CONFIG").filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(explicit);
    }
    let home = lookup("HOME")
        .or_else(|| lookup("USERPROFILE"))
        .unwrap_or_else(|| ".".to_string());
    config_path_for_home(&home)
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".ethos").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// The config on disk, or the default one, with environment overrides
/// applied either way.
pub fn load_effective() -> Result<Config, String> {
    match load()? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
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

/// Apply `ETHOS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ETHOS_MEMORY_SIZE` | `pipeline.memory_size` |
/// | `ETHOS_RECALL_WINDOW` | `pipeline.recall_window` |
/// | `ETHOS_INTRINSIC_RATE` | `pipeline.intrinsic.rate` |
/// | `ETHOS_ARCHIVE_PATH` | `pipeline.archive_path` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    let pipeline = &mut cfg.pipeline;
    if let Ok(v) = std::env::var("ETHOS_MEMORY_SIZE")
        && let Ok(n) = v.parse::<usize>()
    {
        pipeline.memory_size = n;
    }
    if let Ok(v) = std::env::var("ETHOS_RECALL_WINDOW")
        && let Ok(n) = v.parse::<usize>()
    {
        pipeline.recall_window = n;
    }
    if let Ok(v) = std::env::var("ETHOS_INTRINSIC_RATE")
        && let Ok(rate) = v.parse::<f32>()
    {
        pipeline.intrinsic.rate = rate;
    }
    if let Ok(v) = std::env::var("ETHOS_ARCHIVE_PATH") {
        pipeline.archive_path = (!v.is_empty()).then_some(v);
    }
}

/// Save the config to [`config_path`], creating its directory if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Write `cfg` to `path`.
///
/// A pipeline section that would not build is refused, so `ethos demo` never
/// meets a config it wrote itself and cannot use.  The file is written next
/// to `path` and renamed into place; a failed write leaves the old file.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    cfg.pipeline
        .validate()
        .map_err(|e| format!("Refusing to save config: {}", e))?;
    let raw = to_toml(cfg)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to restrict {}: {}", parent.display(), e))?;
        }
    }

    let staging = path.with_extension("toml.new");
    write_private(&staging, raw.as_bytes())
        .and_then(|()| fs::rename(&staging, path))
        .map_err(|e| {
            let _ = fs::remove_file(&staging);
            format!("Failed to write config at {}: {}", path.display(), e)
        })
}

/// Create or truncate `path` readable by the owner only.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(bytes)
}

/// Render `cfg` as it would be written to disk.
pub fn to_toml(cfg: &Config) -> Result<String, String> {
    toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))
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
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_config_with_overrides() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.demo_steps = 7;
        cfg.pipeline.thresholds.insert("zealot".to_string(), 0.25);
        cfg.pipeline.intrinsic.max = Some(5.0);
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.demo_steps, 7);
        assert_eq!(loaded.pipeline.thresholds.get("zealot"), Some(&0.25));
        assert_eq!(loaded.pipeline.intrinsic.max, Some(5.0));
        assert_eq!(loaded.pipeline.layout, cfg.pipeline.layout);
        assert!(loaded.pipeline.validate().is_ok());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nrecall_window = 3\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.demo_steps, 20);
        assert_eq!(loaded.pipeline.recall_window, 3);
        assert_eq!(loaded.pipeline.transparency_capacity, 1000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "demo_steps = \"many\"").unwrap();
        assert!(load_from(&path).unwrap_err().contains("Failed to parse config"));
    }

    #[test]
    fn explicit_config_path_wins_over_home() {
        let lookup = |var: &str| match var {
            "ETHOS_CONFIG" => Some("/etc/ethos/site.toml".to_string()),
            "HOME" => Some("/home/testuser".to_string()),
            _ => None,
        };
        assert_eq!(resolve_config_path(lookup), PathBuf::from("/etc/ethos/site.toml"));

        let blank = |var: &str| match var {
            "ETHOS_CONFIG" => Some(" ".to_string()),
            "HOME" => Some("/home/testuser".to_string()),
            _ => None,
        };
        assert_eq!(
            resolve_config_path(blank),
            PathBuf::from("/home/testuser/.ethos/config.toml")
        );
    }

    #[test]
    fn invalid_pipeline_is_not_saved() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let mut bad = Config::default();
        bad.pipeline.memory_size = 0;
        let err = save_to(&bad, &path).unwrap_err();
        assert!(err.contains("Refusing to save config"), "{err}");

        let kept = load_from(&path).expect("load ok").expect("some");
        assert_eq!(kept.pipeline.memory_size, PipelineConfig::default().memory_size);
        assert!(!path.with_extension("toml.new").exists());
    }

    #[test]
    fn config_path_points_to_ethos_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".ethos"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    // Each override test uses its own variable so parallel tests don't race.

    #[test]
    fn apply_env_overrides_changes_memory_size() {
        // SAFETY: no other test reads ETHOS_MEMORY_SIZE.
        unsafe { std::env::set_var("ETHOS_MEMORY_SIZE", "64") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.memory_size, 64);
        unsafe { std::env::remove_var("ETHOS_MEMORY_SIZE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_window() {
        // SAFETY: no other test reads ETHOS_RECALL_WINDOW.
        unsafe { std::env::set_var("ETHOS_RECALL_WINDOW", "lots") };
        let mut cfg = Config::default();
        let original = cfg.pipeline.recall_window;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.recall_window, original);
        unsafe { std::env::remove_var("ETHOS_RECALL_WINDOW") };
    }

    #[test]
    fn apply_env_overrides_changes_intrinsic_rate() {
        // SAFETY: no other test reads ETHOS_INTRINSIC_RATE.
        unsafe { std::env::set_var("ETHOS_INTRINSIC_RATE", "0.05") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.intrinsic.rate, 0.05);
        unsafe { std::env::remove_var("ETHOS_INTRINSIC_RATE") };
    }

    #[test]
    fn apply_env_overrides_sets_and_clears_archive_path() {
        // SAFETY: no other test reads ETHOS_ARCHIVE_PATH.
        unsafe { std::env::set_var("ETHOS_ARCHIVE_PATH", "/tmp/ethos.db") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.archive_path.as_deref(), Some("/tmp/ethos.db"));

        unsafe { std::env::set_var("ETHOS_ARCHIVE_PATH", "") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pipeline.archive_path, None);
        unsafe { std::env::remove_var("ETHOS_ARCHIVE_PATH") };
    }
}
