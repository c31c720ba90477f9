//! Run configuration – reads/writes `~/.rockhound/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use rockhound_hal::SimConfig;
use rockhound_perception::PerceptionConfig;
use rockhound_runtime::DriveConfig;
use rockhound_types::{Mode, Pose, RoverError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Everything a headless run needs.  Every field has a default, so an empty
/// file (or no file at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Ticks to run before exiting.
    #[serde(default = "default_ticks")]
    pub ticks: u64,

    /// Mode the rover starts in.
    #[serde(default)]
    pub initial_mode: Mode,

    /// Starting `[x, y, yaw]` in world units and degrees.
    #[serde(default = "default_start")]
    pub start: [f64; 3],

    /// Sample rock positions `[x, y]` placed in the simulated arena.
    #[serde(default = "default_samples")]
    pub samples: Vec<[f64; 2]>,

    #[serde(default)]
    pub drive: DriveConfig,

    #[serde(default)]
    pub perception: PerceptionConfig,

    #[serde(default)]
    pub sim: SimConfig,
}

fn default_ticks() -> u64 {
    600
}
fn default_start() -> [f64; 3] {
    [100.0, 100.0, 0.0]
}
fn default_samples() -> Vec<[f64; 2]> {
    vec![[112.0, 103.0], [85.0, 120.0], [130.0, 80.0]]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticks: default_ticks(),
            initial_mode: Mode::default(),
            start: default_start(),
            samples: default_samples(),
            drive: DriveConfig::default(),
            perception: PerceptionConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    pub fn start_pose(&self) -> Pose {
        let [x, y, yaw] = self.start;
        Pose::new(x, y, yaw)
    }

    /// Validate the nested drive, perception and simulator settings.
    pub fn validate(&self) -> Result<(), RoverError> {
        self.drive.validate()?;
        self.perception.validate()?;
        self.sim.validate()
    }
}

/// Return the path to `~/.rockhound/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rockhound").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

/// Apply `ROCKHOUND_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROCKHOUND_THROTTLE_SET` | `drive.throttle_set` |
/// | `ROCKHOUND_BRAKE_SET` | `drive.brake_set` |
/// | `ROCKHOUND_MAX_VEL` | `drive.max_vel` |
/// | `ROCKHOUND_SAMPLE_TIMEOUT` | `drive.sample_timeout` |
/// | `ROCKHOUND_TICKS` | `ticks` |
/// | `ROCKHOUND_INITIAL_MODE` | `initial_mode` |
///
/// Unparsable numbers are ignored with a warning.  An unknown mode name is
/// an error: starting in a mode the rover does not have is never safe.
pub fn apply_env_overrides(cfg: &mut Config) -> Result<(), RoverError> {
    apply_overrides(cfg, |key| std::env::var(key).ok())
}

pub(crate) fn apply_overrides(
    cfg: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), RoverError> {
    let floats: [(&str, &mut f64); 4] = [
        ("ROCKHOUND_THROTTLE_SET", &mut cfg.drive.throttle_set),
        ("ROCKHOUND_BRAKE_SET", &mut cfg.drive.brake_set),
        ("ROCKHOUND_MAX_VEL", &mut cfg.drive.max_vel),
        ("ROCKHOUND_SAMPLE_TIMEOUT", &mut cfg.drive.sample_timeout),
    ];
    for (key, slot) in floats {
        if let Some(v) = lookup(key) {
            match v.trim().parse::<f64>() {
                Ok(parsed) => *slot = parsed,
                Err(_) => warn!(key, value = %v, "ignoring unparsable override"),
            }
        }
    }
    if let Some(v) = lookup("ROCKHOUND_TICKS") {
        match v.trim().parse::<u64>() {
            Ok(parsed) => cfg.ticks = parsed,
            Err(_) => warn!(key = "ROCKHOUND_TICKS", value = %v, "ignoring unparsable override"),
        }
    }
    if let Some(v) = lookup("ROCKHOUND_INITIAL_MODE") {
        cfg.initial_mode = v.parse()?;
    }
    Ok(())
}
