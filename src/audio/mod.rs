// Audio playback module
// Uses Symphonia for decoding and cpal for output

pub mod buffer;
pub mod cache;
pub mod context;
pub mod decoder;
pub mod device;
pub mod envelope;
pub mod fade;
pub mod fetch;
pub mod mixer;
pub mod output;
pub mod player;
pub mod resample;
pub mod unlock;

pub use buffer::DecodedBuffer;
pub use cache::BufferCache;
pub use context::{AudioEnvironment, SharedDevice};
pub use device::{AudioDevice, DeviceProvider, DeviceState};
pub use envelope::{volume_to_gain, GainEnvelope};
pub use fetch::{ClipFetcher, SourceFetcher};
pub use mixer::VoiceId;
pub use player::{PlayerState, SoundPlayer};
pub use unlock::{DeviceUnlock, NoUnlock, PageEvent, SilentBufferUnlock};
