// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SoundError};

/// One character's clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSettings {
    /// URL or filesystem path of the encoded clip
    pub source: String,
    /// How long the clip fades out after it starts, in ms
    pub fade_ms: u32,
}

impl ClipSettings {
    pub fn new(source: impl Into<String>, fade_ms: u32) -> Self {
        Self {
            source: source.into(),
            fade_ms,
        }
    }
}

/// Sound settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundSettings {
    pub version: i32, // Settings schema version for future migrations
    pub sound_enabled: bool,
    pub volume: u8, // 0-100, 0 skips playback entirely
    pub clips: Vec<ClipSettings>,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            version: 1,
            sound_enabled: true,
            volume: 50,
            clips: vec![
                ClipSettings::new("assets/shibuki/shibuki.mp3", 1000),
                ClipSettings::new("assets/mochi/mochi.mp3", 600),
            ],
        }
    }
}

impl SoundSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("sound_settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            log::info!("[Settings] No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| SoundError::Settings(format!("Failed to read settings file: {}", e)))?;

        let mut settings: SoundSettings = serde_json::from_str(&content)
            .map_err(|e| SoundError::Settings(format!("Failed to parse settings: {}", e)))?;
        settings.set_volume(settings.volume);

        log::info!("[Settings] Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<()> {
        fs::create_dir_all(app_dir)
            .map_err(|e| SoundError::Settings(format!("Failed to create settings directory: {}", e)))?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SoundError::Settings(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&path, content)
            .map_err(|e| SoundError::Settings(format!("Failed to write settings file: {}", e)))?;

        log::info!("[Settings] Saved settings to {:?}", path);
        Ok(())
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    pub fn registry(&self) -> ClipRegistry {
        ClipRegistry::new(self.clips.clone())
    }
}

/// The fixed clip list for a session, indexed by character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRegistry {
    clips: Vec<ClipSettings>,
}

impl ClipRegistry {
    pub fn new(clips: Vec<ClipSettings>) -> Self {
        Self { clips }
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ClipSettings> {
        self.clips.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClipSettings> {
        self.clips.iter()
    }
}
