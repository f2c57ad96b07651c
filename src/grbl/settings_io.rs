//! Settings persistence: TOML on disk, `$id=value` on the wire. Bridges
//! `grbl4-core`'s `Settings` (which deliberately carries no serde/IO
//! concerns of its own) to the host's config file and the `$$`/`$id=value`
//! protocol spec.md §6 describes.
//!
//! Grounded on `src/config.rs`'s `serde` + `toml::from_str` loading
//! pattern, with `#[serde(default)]` so a config file missing newer
//! fields still loads.

use std::path::{Path, PathBuf};

use grbl4_core::settings::{SettingOutcome, Settings};
use grbl4_core::{SettingsError, AXES};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsIoError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize settings TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("malformed $id=value command: {0}")]
    MalformedCommand(String),
    #[error(transparent)]
    Setting(#[from] SettingsError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsSnapshot {
    #[serde(default = "default_steps_per_mm")]
    steps_per_mm: [f64; AXES],
    #[serde(default = "default_max_rate")]
    max_rate_mm_per_min: [f64; AXES],
    #[serde(default = "default_acceleration")]
    acceleration_mm_per_s2: [f64; AXES],
    #[serde(default = "default_max_travel")]
    max_travel_mm: [f64; AXES],
    #[serde(default = "default_junction_deviation")]
    junction_deviation_mm: f64,
    #[serde(default = "default_arc_tolerance")]
    arc_tolerance_mm: f64,
}

fn default_steps_per_mm() -> [f64; AXES] {
    [250.0; AXES]
}
fn default_max_rate() -> [f64; AXES] {
    [1000.0; AXES]
}
fn default_acceleration() -> [f64; AXES] {
    [100.0; AXES]
}
fn default_max_travel() -> [f64; AXES] {
    [200.0; AXES]
}
fn default_junction_deviation() -> f64 {
    0.01
}
fn default_arc_tolerance() -> f64 {
    0.002
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            steps_per_mm: default_steps_per_mm(),
            max_rate_mm_per_min: default_max_rate(),
            acceleration_mm_per_s2: default_acceleration(),
            max_travel_mm: default_max_travel(),
            junction_deviation_mm: default_junction_deviation(),
            arc_tolerance_mm: default_arc_tolerance(),
        }
    }
}

impl SettingsSnapshot {
    fn from_settings(s: &Settings) -> Self {
        Self {
            steps_per_mm: std::array::from_fn(|a| s.steps_per_mm(a)),
            max_rate_mm_per_min: std::array::from_fn(|a| s.max_velocity_mm_per_min(a)),
            acceleration_mm_per_s2: std::array::from_fn(|a| s.acceleration_mm_per_s2(a)),
            max_travel_mm: std::array::from_fn(|a| s.max_travel_mm(a)),
            junction_deviation_mm: s.junction_deviation_mm(),
            arc_tolerance_mm: s.arc_tolerance_mm(),
        }
    }

    fn into_settings(self) -> Settings {
        let mut settings = Settings::new(self.steps_per_mm, self.max_rate_mm_per_min, self.acceleration_mm_per_s2);
        for (axis, travel) in self.max_travel_mm.into_iter().enumerate() {
            let _ = settings.set_setting(130 + axis as u32, travel);
        }
        let _ = settings.set_setting(11, self.junction_deviation_mm);
        let _ = settings.set_setting(12, self.arc_tolerance_mm);
        settings
    }
}

/// The `$id` ordering a `$$` dump reports settings in, per spec.md §6.
const DOLLAR_IDS: &[u32] = &[
    100, 101, 102, 103, 110, 111, 112, 113, 120, 121, 122, 123, 130, 131, 132, 133, 11, 12,
];

pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Loads settings from `path`, falling back to defaults if the file
    /// does not exist yet (first boot).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsIoError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str::<SettingsSnapshot>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SettingsSnapshot::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, settings: snapshot.into_settings() })
    }

    pub fn save(&self) -> Result<(), SettingsIoError> {
        let snapshot = SettingsSnapshot::from_settings(&self.settings);
        let text = toml::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies a `$id=value` command, persisting the new value to disk on
    /// success.
    pub fn apply_dollar_command(&mut self, line: &str) -> Result<SettingOutcome, SettingsIoError> {
        let body = line.strip_prefix('$').unwrap_or(line);
        let (id_str, value_str) = body
            .split_once('=')
            .ok_or_else(|| SettingsIoError::MalformedCommand(line.to_string()))?;
        let id: u32 = id_str
            .trim()
            .parse()
            .map_err(|_| SettingsIoError::MalformedCommand(line.to_string()))?;
        let value: f64 = value_str
            .trim()
            .parse()
            .map_err(|_| SettingsIoError::MalformedCommand(line.to_string()))?;
        let outcome = self.settings.set_setting(id, value)?;
        self.save()?;
        Ok(outcome)
    }

    /// Renders a `$$` dump: one `$id=value` line per known setting, in
    /// GRBL's conventional id order.
    pub fn dump(&self) -> Vec<String> {
        DOLLAR_IDS
            .iter()
            .map(|&id| format!("${id}={:.3}", self.value_for(id)))
            .collect()
    }

    fn value_for(&self, id: u32) -> f64 {
        match id {
            100..=103 => self.settings.steps_per_mm((id - 100) as usize),
            110..=113 => self.settings.max_velocity_mm_per_min((id - 110) as usize),
            120..=123 => self.settings.acceleration_mm_per_s2((id - 120) as usize),
            130..=133 => self.settings.max_travel_mm((id - 130) as usize),
            11 => self.settings.junction_deviation_mm(),
            12 => self.settings.arc_tolerance_mm(),
            _ => 0.0,
        }
    }
}
