//! CLI configuration – reads/writes `~/.graspkit/config.toml`.
//!
//! The file holds two tables: `[filter]` is a
//! [`FilterPipelineConfig`] and `[demo]` a [`DemoConfig`].  Missing tables
//! and fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use graspkit_filter::FilterPipelineConfig;
use graspkit_geometry::Vec3;
use serde::{Deserialize, Serialize};

/// Parameters of the bundled filter demo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of objects to generate and filter grasps for.
    pub num_trials: usize,
    /// Worker threads per run; unset means one per CPU.
    pub worker_count: Option<usize>,
    /// Nominal object centre; each trial shifts it slightly.
    pub object_centre: Vec3,
    /// Cube edge length (m).
    pub object_size: f64,
    /// Extra clearance added to every collision sphere (m).
    pub collision_padding: f64,
    /// Append markers as JSON lines to this file.
    pub markers_path: Option<PathBuf>,
    /// Length of the approach arrows in the marker file (m).
    pub arrow_length: f64,
    /// Contact markers written per collision-rejected candidate.
    pub max_contacts: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            num_trials: 3,
            worker_count: None,
            object_centre: Vec3::new(0.28, -0.2, 0.5),
            object_size: 0.03,
            collision_padding: 0.0,
            markers_path: None,
            arrow_length: 0.1,
            max_contacts: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterPipelineConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// `GRASPKIT_CONFIG` if set, otherwise `~/.graspkit/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("GRASPKIT_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".graspkit").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `GRASPKIT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `GRASPKIT_WORKERS` | `demo.worker_count` |
/// | `GRASPKIT_TRIALS` | `demo.num_trials` |
/// | `GRASPKIT_MARKERS` | `demo.markers_path` |
/// | `GRASPKIT_PLANNING_GROUP` | `filter.planning_group_name` |
/// | `GRASPKIT_EE_GROUP` | `filter.end_effector_group_name` |
/// | `GRASPKIT_STATISTICS_VERBOSE` | `filter.visualization.statistics_verbose` |
///
/// Unparseable numbers and booleans are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GRASPKIT_WORKERS")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.demo.worker_count = Some(n);
    }
    if let Ok(v) = std::env::var("GRASPKIT_TRIALS")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.demo.num_trials = n;
    }
    if let Ok(v) = std::env::var("GRASPKIT_MARKERS") {
        cfg.demo.markers_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("GRASPKIT_PLANNING_GROUP") {
        cfg.filter.planning_group_name = v;
    }
    if let Ok(v) = std::env::var("GRASPKIT_EE_GROUP") {
        cfg.filter.end_effector_group_name = v;
    }
    if let Ok(v) = std::env::var("GRASPKIT_STATISTICS_VERBOSE")
        && let Some(flag) = parse_bool(&v)
    {
        cfg.filter.visualization.statistics_verbose = flag;
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating the parent directory if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graspkit_types::StageKind;

    #[test]
    fn config_path_points_to_graspkit_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".graspkit"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.demo.num_trials, 3);
        assert_eq!(loaded.filter.planning_group_name, "arm");
        assert_eq!(loaded.filter.stages.len(), 4);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[filter]\nstages = [\"cutting_plane\", \"ik_feasibility\"]\n\n[demo]\nobject_size = 0.05\n",
        )
        .expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.filter.stages, vec![StageKind::CuttingPlane, StageKind::IkFeasibility]);
        assert_eq!(loaded.filter.end_effector_group_name, "hand");
        assert!((loaded.demo.object_size - 0.05).abs() < 1e-12);
        assert_eq!(loaded.demo.num_trials, 3);
        assert_eq!(loaded.demo.max_contacts, 10);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[demo]\nnum_trials = \"many\"\n").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn apply_env_overrides_changes_worker_count() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("GRASPKIT_WORKERS", "3") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.demo.worker_count, Some(3));
        unsafe { std::env::remove_var("GRASPKIT_WORKERS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_trials() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("GRASPKIT_TRIALS", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.demo.num_trials, 3);
        unsafe { std::env::remove_var("GRASPKIT_TRIALS") };
    }

    #[test]
    fn apply_env_overrides_changes_group_names() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe {
            std::env::set_var("GRASPKIT_PLANNING_GROUP", "left_arm");
            std::env::set_var("GRASPKIT_EE_GROUP", "left_hand");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.filter.planning_group_name, "left_arm");
        assert_eq!(cfg.filter.end_effector_group_name, "left_hand");
        unsafe {
            std::env::remove_var("GRASPKIT_PLANNING_GROUP");
            std::env::remove_var("GRASPKIT_EE_GROUP");
        }
    }

    #[test]
    fn apply_env_overrides_parses_statistics_flag() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("GRASPKIT_STATISTICS_VERBOSE", "yes") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.filter.visualization.statistics_verbose);
        unsafe { std::env::remove_var("GRASPKIT_STATISTICS_VERBOSE") };
    }
}
