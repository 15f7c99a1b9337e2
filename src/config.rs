use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "termdeck";
const SETTINGS_FILE: &str = "settings.json";
const LOG_FILE: &str = "termdeck.log";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Percent added or removed by one volume key press.
    pub volume_step: i32,
    pub resample_quality: usize,
    /// Length of one sink chunk.
    pub buffer_millis: u64,
    /// File extensions the decoder accepts, without the dot.
    pub formats: Vec<String>,
    /// Gain deviation at the last quit.
    pub volume_change: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume_step: 10,
            resample_quality: 4,
            buffer_millis: 100,
            formats: vec![String::from("mp3")],
            volume_change: 0,
        }
    }
}

// Longest device chunk a settings file can ask for.
const MAX_BUFFER_MILLIS: u64 = 10_000;

impl Settings {
    pub fn buffer_frames(&self, sample_rate: u32) -> usize {
        let millis = self.buffer_millis.clamp(1, MAX_BUFFER_MILLIS);
        let frames = u64::from(sample_rate).saturating_mul(millis) / 1000;
        usize::try_from(frames).unwrap_or(usize::MAX).max(1)
    }
}

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("TERMDECK_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(config_root()?.join(SETTINGS_FILE))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(config_root()?.join(LOG_FILE))
}

pub fn ensure_config_dir() -> Result<PathBuf> {
    let root = config_root()?;
    fs::create_dir_all(&root).with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

pub fn load_settings() -> Result<Settings> {
    read_settings(&settings_path()?)
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    ensure_config_dir()?;
    write_settings(&settings_path()?, settings)
}

pub fn read_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    Ok(settings)
}

pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn normalize_path(path: &Path) -> PathBuf {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    strip_windows_verbatim_prefix(&canonical)
}

pub fn strip_windows_verbatim_prefix(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();

    if let Some(trimmed) = raw.strip_prefix(r"\\?\UNC\") {
        return PathBuf::from(format!(r"\\{trimmed}"));
    }

    if let Some(trimmed) = raw.strip_prefix(r"\\?\") {
        return PathBuf::from(trimmed);
    }

    path.to_path_buf()
}
