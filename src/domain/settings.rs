use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// Knobs for the in-process demo accessories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorSettings {
    #[serde(default = "default_accessories")]
    pub accessories: u32,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Samples each accessory produces before it stops on its own
    #[serde(default = "default_samples_per_accessory")]
    pub samples_per_accessory: u32,
    /// When false, samples only carry a horizontal angle
    #[serde(default = "default_true")]
    pub report_direction: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            accessories: default_accessories(),
            sample_interval_ms: default_sample_interval_ms(),
            samples_per_accessory: default_samples_per_accessory(),
            report_direction: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    /// Connect to accessories as soon as they are discovered
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Let the engine use the camera to refine direction estimates
    #[serde(default = "default_true")]
    pub camera_assistance: bool,

    #[serde(default)]
    pub simulator: SimulatorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            auto_connect: default_true(),
            camera_assistance: default_true(),
            simulator: SimulatorSettings::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "uwb_accessory_tracker".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_accessories() -> u32 {
    1
}
fn default_sample_interval_ms() -> u64 {
    200
}
fn default_samples_per_accessory() -> u32 {
    25
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit path, falling back to defaults if the file is
    /// missing or malformed.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("UwbAccessoryTracker");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
