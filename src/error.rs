// Error types for the sound player
use thiserror::Error;

/// Everything that can go wrong inside the sound player.
///
/// None of these reach callers of `SoundPlayer::initialize` or
/// `SoundPlayer::play`; they are logged and degrade to silence.
#[derive(Error, Debug)]
pub enum SoundError {
    /// Clip bytes could not be fetched
    #[error("Failed to fetch '{location}': {reason}")]
    Fetch { location: String, reason: String },

    /// Clip bytes could not be decoded into samples
    #[error("Failed to decode '{location}': {reason}")]
    Decode { location: String, reason: String },

    #[error("Resampling failed: {0}")]
    Resample(String),

    /// No output device, or the platform has no audio API
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio device is closed")]
    DeviceClosed,

    /// Stop requested for a voice that already ran to its end
    #[error("Voice already finished")]
    VoiceFinished,

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl SoundError {
    pub fn fetch(location: impl Into<String>, reason: impl ToString) -> Self {
        SoundError::Fetch {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(location: impl Into<String>, reason: impl ToString) -> Self {
        SoundError::Decode {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SoundError>;
