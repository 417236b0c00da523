// Output device abstraction
// The player only talks to these traits; `output::CpalDevice` is the real backend

use std::fmt;
use std::sync::Arc;

use super::buffer::DecodedBuffer;
use super::envelope::GainEnvelope;
use super::mixer::VoiceId;
use crate::error::Result;

/// Lifecycle of the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No device has been opened yet
    Uninitialized,
    /// Open but not producing sound; the device clock is stopped
    Suspended,
    Running,
    Closed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Uninitialized => "uninitialized",
            DeviceState::Suspended => "suspended",
            DeviceState::Running => "running",
            DeviceState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// An open audio output that can play decoded buffers as voices
pub trait AudioDevice: Send + Sync {
    fn state(&self) -> DeviceState;

    /// Start (or restart) output. Suspended -> Running.
    fn resume(&self) -> Result<()>;

    /// Pause output. Running -> Suspended.
    fn suspend(&self) -> Result<()>;

    /// Release the device; every later call fails with `DeviceClosed`
    fn close(&self) -> Result<()>;

    fn sample_rate(&self) -> u32;

    /// Device clock in seconds, the time base for gain envelopes
    fn current_time(&self) -> f64;

    /// Play `buffer` from its first frame through `envelope`
    fn start_voice(&self, buffer: Arc<DecodedBuffer>, envelope: GainEnvelope) -> Result<VoiceId>;

    /// Stop a voice. Fails with `VoiceFinished` if it already ran out.
    fn stop_voice(&self, voice: VoiceId) -> Result<()>;
}

/// Opens output devices; one provider per environment
pub trait DeviceProvider: Send + Sync {
    fn open(&self) -> Result<Arc<dyn AudioDevice>>;
}
