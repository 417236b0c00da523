// Sound player: loads the character clips and plays one at a time
//
// Nothing here returns an error to the caller. A missing clip, a missing
// device or a failed decode all end in silence plus a log line, so a tap
// handler never fails because of audio.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::{JoinHandle, JoinSet};

use super::buffer::DecodedBuffer;
use super::context::{AudioEnvironment, SharedDevice};
use super::decoder::decode_clip;
use super::device::{AudioDevice, DeviceState};
use super::envelope::{volume_to_gain, GainEnvelope};
use super::fade::PendingFade;
use super::mixer::VoiceId;
use super::unlock::spawn_page_event_listener;
use crate::error::{Result, SoundError};
use crate::settings::{ClipRegistry, SoundSettings};

/// Gain a clip starts from before the attack ramp
const START_GAIN: f32 = 0.001;

/// Length of the fade-in that avoids a click at the start of a clip
const ATTACK_SECS: f64 = 0.01;

/// The fade-out runs over the clip's fade duration stretched by this factor
const FADE_TAIL_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Uninitialized,
    Initializing,
    Ready,
}

struct ActiveSession {
    clip: usize,
    voice: VoiceId,
    device: Arc<dyn AudioDevice>,
}

impl ActiveSession {
    fn release(self) {
        // The voice may have reached its end already; that is not an error
        let _ = self.device.stop_voice(self.voice);
    }
}

/// The one voice this player owns and the timer that will end it
#[derive(Default)]
struct SessionSlot {
    current: Option<ActiveSession>,
    fade: Option<PendingFade>,
    generation: u64,
}

impl SessionSlot {
    /// Cancel the pending fade and stop the current voice
    fn clear(&mut self) {
        if let Some(fade) = self.fade.take() {
            fade.cancel();
        }
        if let Some(session) = self.current.take() {
            session.release();
        }
        self.generation += 1;
    }
}

pub struct SoundPlayer {
    registry: ClipRegistry,
    env: AudioEnvironment,
    sound_enabled: AtomicBool,
    volume: AtomicU8,
    buffers: Arc<RwLock<Vec<Option<Arc<DecodedBuffer>>>>>,
    ready: OnceCell<()>,
    initializing: AtomicBool,
    session: Arc<Mutex<SessionSlot>>,
    page_listener: Mutex<Option<JoinHandle<()>>>,
}

impl SoundPlayer {
    /// Build a player over `env`.
    ///
    /// When called inside a tokio runtime this also starts listening for the
    /// environment's page events, resuming a suspended device on each one.
    pub fn new(settings: &SoundSettings, env: AudioEnvironment) -> Self {
        let registry = settings.registry();
        let page_listener = tokio::runtime::Handle::try_current()
            .ok()
            .map(|_| spawn_page_event_listener(env.subscribe(), env.device.clone()));

        Self {
            buffers: Arc::new(RwLock::new(vec![None; registry.len()])),
            registry,
            env,
            sound_enabled: AtomicBool::new(settings.sound_enabled),
            volume: AtomicU8::new(settings.volume.min(100)),
            ready: OnceCell::new(),
            initializing: AtomicBool::new(false),
            session: Arc::new(Mutex::new(SessionSlot::default())),
            page_listener: Mutex::new(page_listener),
        }
    }

    pub fn state(&self) -> PlayerState {
        if self.ready.initialized() {
            PlayerState::Ready
        } else if self.initializing.load(Ordering::SeqCst) {
            PlayerState::Initializing
        } else {
            PlayerState::Uninitialized
        }
    }

    pub fn set_volume(&self, volume: u8) {
        self.volume.store(volume.min(100), Ordering::SeqCst);
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::SeqCst)
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.sound_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled.load(Ordering::SeqCst)
    }

    /// Index of the clip currently sounding, if any
    pub fn active_clip(&self) -> Option<usize> {
        self.session.lock().current.as_ref().map(|s| s.clip)
    }

    /// Whether the clip at `index` decoded and can be played
    pub fn is_loaded(&self, index: usize) -> bool {
        matches!(self.buffers.read().get(index), Some(Some(_)))
    }

    /// Open the device and load every clip.
    ///
    /// Returns at once if already done or if sound is disabled. Concurrent
    /// callers all wait on the same in-flight load. Should be called from a
    /// user-gesture handler at least once so strict hosts allow output.
    pub async fn initialize(&self) {
        if !self.sound_enabled() || self.ready.initialized() {
            return;
        }
        self.ready.get_or_init(|| self.load_all()).await;
    }

    async fn load_all(&self) {
        let _initializing = InitializingGuard::enter(&self.initializing);

        let device = match open_device(&self.env.device).await {
            Ok(device) => device,
            Err(e) => {
                log::error!("Audio initialization failed: {}", e);
                return;
            }
        };

        if device.state() == DeviceState::Suspended {
            if let Err(e) = resume_device(device.clone()).await {
                log::warn!("Audio device could not start yet: {}", e);
            }
        }

        // One load per distinct source, shared by every index that uses it
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, clip) in self.registry.iter().enumerate() {
            groups.entry(clip.source.clone()).or_default().push(index);
        }

        let mut loads = JoinSet::new();
        for (source, indices) in groups {
            let env = self.env.clone();
            let sample_rate = device.sample_rate();
            loads.spawn(async move {
                let loaded = load_clip(&env, &source, sample_rate).await;
                (indices, source, loaded)
            });
        }

        let mut loaded_count = 0;
        while let Some(joined) = loads.join_next().await {
            match joined {
                Ok((indices, _, Ok(buffer))) => {
                    let mut buffers = self.buffers.write();
                    for index in indices {
                        buffers[index] = Some(buffer.clone());
                        loaded_count += 1;
                    }
                }
                Ok((_, source, Err(e))) => {
                    log::error!("Failed to load audio {}: {}", source, e);
                }
                Err(e) => log::error!("Clip load task failed: {}", e),
            }
        }

        self.env.unlock.unlock(device.as_ref());

        log::info!(
            "Audio initialized: {}/{} clips loaded",
            loaded_count,
            self.registry.len()
        );
    }

    /// Play the clip for character `index`, replacing whatever is sounding.
    ///
    /// Initializes first if needed. A volume of 0, a disabled player, a
    /// missing device or an unloaded clip all make this a no-op.
    pub async fn play(&self, index: usize) {
        if !self.sound_enabled() {
            return;
        }
        if !self.ready.initialized() {
            self.initialize().await;
        }

        let volume = self.volume();
        if volume == 0 {
            return;
        }

        let Some(device) = self.env.device.current() else {
            return;
        };

        if device.state() == DeviceState::Suspended {
            if let Err(e) = resume_device(device.clone()).await {
                log::warn!("Audio device resume failed, playing anyway: {}", e);
            }
        }

        if let Err(e) = self.start_session(device, index, volume) {
            log::error!("Sound playback error: {}", e);
        }
    }

    fn start_session(&self, device: Arc<dyn AudioDevice>, index: usize, volume: u8) -> Result<()> {
        // Held for the whole swap so the latest play always wins
        let mut slot = self.session.lock();
        slot.clear();

        let buffer = self.buffers.read().get(index).cloned().flatten();
        let (Some(buffer), Some(clip)) = (buffer, self.registry.get(index)) else {
            log::warn!("Audio buffer at index {} not loaded", index);
            return Ok(());
        };

        let (envelope, fade_secs) = clip_envelope(device.current_time(), volume, clip.fade_ms);

        let voice = device.start_voice(buffer, envelope)?;
        slot.current = Some(ActiveSession {
            clip: index,
            voice,
            device,
        });

        let generation = slot.generation;
        let session = Arc::downgrade(&self.session);
        slot.fade = PendingFade::schedule(Duration::from_secs_f64(fade_secs), move || {
            let Some(session) = session.upgrade() else {
                return;
            };
            let mut slot = session.lock();
            // A newer play already replaced this voice
            if slot.generation != generation {
                return;
            }
            slot.fade = None;
            if let Some(active) = slot.current.take() {
                active.release();
            }
        });

        Ok(())
    }

    /// Stop playback, drop the timer and release the shared device
    pub fn shutdown(&self) {
        self.stop();
        self.env.device.close();
    }

    fn stop(&self) {
        self.session.lock().clear();
        if let Some(listener) = self.page_listener.lock().take() {
            listener.abort();
        }
    }
}

impl Drop for SoundPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Gain envelope for one play and the time its fade-out ends, in seconds
/// after `now`. The fade never ends before the attack does.
fn clip_envelope(now: f64, volume: u8, fade_ms: u32) -> (GainEnvelope, f64) {
    let fade_secs = (f64::from(fade_ms) / 1000.0 * FADE_TAIL_FACTOR).max(ATTACK_SECS);
    let envelope = GainEnvelope::constant(START_GAIN)
        .set_value_at_time(START_GAIN, now)
        .exponential_ramp_to_value_at_time(volume_to_gain(volume), now + ATTACK_SECS)
        .linear_ramp_to_value_at_time(0.0, now + fade_secs);
    (envelope, fade_secs)
}

/// Keeps `state()` at Initializing only while a load is actually running,
/// including when the awaiting caller is dropped mid-flight
struct InitializingGuard<'a>(&'a AtomicBool);

impl<'a> InitializingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// Opening and resuming wait on the output thread, so keep them off the workers
async fn open_device(device: &SharedDevice) -> Result<Arc<dyn AudioDevice>> {
    let device = device.clone();
    tokio::task::spawn_blocking(move || device.get_or_open())
        .await
        .map_err(|e| SoundError::DeviceUnavailable(e.to_string()))?
}

async fn resume_device(device: Arc<dyn AudioDevice>) -> Result<()> {
    tokio::task::spawn_blocking(move || device.resume())
        .await
        .map_err(|e| SoundError::Stream(e.to_string()))?
}

/// Cached buffer for `source`, or fetch + decode it and fill the cache
async fn load_clip(env: &AudioEnvironment, source: &str, sample_rate: u32) -> Result<Arc<DecodedBuffer>> {
    if let Some(cached) = env.cache.get(source) {
        log::debug!("Audio cache hit for {}", source);
        return Ok(cached);
    }

    let bytes = env.fetcher.fetch(source).await?;

    let location = source.to_string();
    let decoded = tokio::task::spawn_blocking(move || decode_clip(&location, bytes, sample_rate))
        .await
        .map_err(|e| SoundError::decode(source, e))??;

    let buffer = Arc::new(decoded);
    env.cache.insert(source, buffer.clone());
    Ok(buffer)
}
