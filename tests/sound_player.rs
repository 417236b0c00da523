use approx::assert_relative_eq;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use clicker_sound_lib::audio::{
    volume_to_gain, AudioDevice, AudioEnvironment, ClipFetcher, DecodedBuffer, DeviceProvider,
    DeviceState, DeviceUnlock, GainEnvelope, NoUnlock, PageEvent, PlayerState,
    SilentBufferUnlock, SoundPlayer, VoiceId,
};
use clicker_sound_lib::settings::{ClipSettings, SoundSettings};
use clicker_sound_lib::SoundError;

const RATE: u32 = 8000;

fn wav_bytes(frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(8000i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[derive(Debug, Clone)]
enum DeviceEvent {
    Start {
        voice: VoiceId,
        buffer: Arc<DecodedBuffer>,
        envelope: GainEnvelope,
        at: f64,
    },
    Stop(VoiceId),
}

/// Records every voice started and stopped; the clock follows tokio time
struct FakeDevice {
    state: Mutex<DeviceState>,
    epoch: Instant,
    next_voice: AtomicU64,
    active: Mutex<HashMap<VoiceId, Arc<DecodedBuffer>>>,
    events: Mutex<Vec<DeviceEvent>>,
}

impl FakeDevice {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DeviceState::Suspended),
            epoch: Instant::now(),
            next_voice: AtomicU64::new(0),
            active: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        })
    }

    fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    fn starts(&self) -> Vec<(VoiceId, Arc<DecodedBuffer>, GainEnvelope, f64)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Start { voice, buffer, envelope, at } => {
                    Some((*voice, buffer.clone(), envelope.clone(), *at))
                }
                DeviceEvent::Stop(_) => None,
            })
            .collect()
    }

    fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().clone()
    }
}

impl AudioDevice for FakeDevice {
    fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    fn resume(&self) -> Result<(), SoundError> {
        let mut state = self.state.lock();
        if *state == DeviceState::Closed {
            return Err(SoundError::DeviceClosed);
        }
        *state = DeviceState::Running;
        Ok(())
    }

    fn suspend(&self) -> Result<(), SoundError> {
        *self.state.lock() = DeviceState::Suspended;
        Ok(())
    }

    fn close(&self) -> Result<(), SoundError> {
        *self.state.lock() = DeviceState::Closed;
        self.active.lock().clear();
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn start_voice(
        &self,
        buffer: Arc<DecodedBuffer>,
        envelope: GainEnvelope,
    ) -> Result<VoiceId, SoundError> {
        let voice = VoiceId(self.next_voice.fetch_add(1, Ordering::SeqCst));
        self.active.lock().insert(voice, buffer.clone());
        self.events.lock().push(DeviceEvent::Start {
            voice,
            buffer,
            envelope,
            at: self.current_time(),
        });
        Ok(voice)
    }

    fn stop_voice(&self, voice: VoiceId) -> Result<(), SoundError> {
        self.events.lock().push(DeviceEvent::Stop(voice));
        match self.active.lock().remove(&voice) {
            Some(_) => Ok(()),
            None => Err(SoundError::VoiceFinished),
        }
    }
}

struct FakeProvider {
    device: Option<Arc<FakeDevice>>,
}

impl DeviceProvider for FakeProvider {
    fn open(&self) -> Result<Arc<dyn AudioDevice>, SoundError> {
        match &self.device {
            Some(device) => Ok(device.clone()),
            None => Err(SoundError::DeviceUnavailable("no audio API".to_string())),
        }
    }
}

/// Serves canned bytes after a short delay and counts requests per source
#[derive(Default)]
struct CountingFetcher {
    clips: HashMap<String, Vec<u8>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingFetcher {
    fn with(clips: &[(&str, Vec<u8>)]) -> Arc<Self> {
        Arc::new(Self {
            clips: clips.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            calls: Mutex::new(HashMap::new()),
        })
    }

    fn calls(&self, source: &str) -> usize {
        self.calls.lock().get(source).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ClipFetcher for CountingFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, SoundError> {
        *self.calls.lock().entry(source.to_string()).or_default() += 1;
        sleep(Duration::from_millis(5)).await;
        self.clips
            .get(source)
            .cloned()
            .ok_or_else(|| SoundError::fetch(source, "404"))
    }
}

fn settings(clips: &[(&str, u32)], volume: u8) -> SoundSettings {
    SoundSettings {
        version: 1,
        sound_enabled: true,
        volume,
        clips: clips.iter().map(|(s, f)| ClipSettings::new(*s, *f)).collect(),
    }
}

struct Harness {
    device: Arc<FakeDevice>,
    fetcher: Arc<CountingFetcher>,
    env: AudioEnvironment,
}

fn harness_with_unlock(unlock: Arc<dyn DeviceUnlock>) -> Harness {
    let device = FakeDevice::new();
    let fetcher = CountingFetcher::with(&[
        ("a.wav", wav_bytes(RATE as usize * 3)),
        ("b.wav", wav_bytes(RATE as usize * 3)),
        ("corrupt.wav", vec![0x42; 128]),
    ]);
    let env = AudioEnvironment::new(
        Arc::new(FakeProvider { device: Some(device.clone()) }),
        fetcher.clone(),
        unlock,
    );
    Harness { device, fetcher, env }
}

fn harness() -> Harness {
    harness_with_unlock(Arc::new(NoUnlock))
}

#[tokio::test(start_paused = true)]
async fn initialize_loads_every_clip_into_the_shared_cache() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000), ("b.wav", 1000)], 50), h.env.clone());
    assert_eq!(player.state(), PlayerState::Uninitialized);

    player.initialize().await;

    assert_eq!(player.state(), PlayerState::Ready);
    assert!(player.is_loaded(0));
    assert!(player.is_loaded(1));
    assert!(h.env.cache.contains("a.wav"));
    assert!(h.env.cache.contains("b.wav"));
    assert_eq!(h.device.state(), DeviceState::Running);
    assert_eq!(h.device.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_initialize_fetches_each_source_once() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000), ("b.wav", 1000)], 50), h.env.clone());

    tokio::join!(player.initialize(), player.initialize(), player.initialize());
    player.initialize().await;

    assert_eq!(h.fetcher.calls("a.wav"), 1);
    assert_eq!(h.fetcher.calls("b.wav"), 1);
}

#[tokio::test(start_paused = true)]
async fn identical_sources_share_one_cache_entry() {
    let h = harness();
    let first = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), h.env.clone());
    first.initialize().await;

    let second = SoundPlayer::new(&settings(&[("b.wav", 500), ("a.wav", 800)], 50), h.env.clone());
    second.initialize().await;

    assert_eq!(h.fetcher.calls("a.wav"), 1);
    assert_eq!(h.fetcher.calls("b.wav"), 1);
    assert_eq!(h.env.cache.len(), 2);
    assert!(second.is_loaded(1));
}

#[tokio::test(start_paused = true)]
async fn duplicate_sources_load_once() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000), ("a.wav", 500)], 50), h.env.clone());

    player.initialize().await;

    assert_eq!(h.fetcher.calls("a.wav"), 1);
    assert!(player.is_loaded(0));
    assert!(player.is_loaded(1));
    assert_eq!(h.env.cache.len(), 1);

    player.play(1).await;
    assert_eq!(player.active_clip(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn abandoned_initialize_does_not_stay_initializing() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), h.env.clone());

    // The fetch takes 5ms, so this gives up mid-load
    let result = tokio::time::timeout(Duration::from_millis(1), player.initialize()).await;
    assert!(result.is_err());
    assert_eq!(player.state(), PlayerState::Uninitialized);

    player.initialize().await;
    assert_eq!(player.state(), PlayerState::Ready);
    assert!(player.is_loaded(0));
}

#[tokio::test(start_paused = true)]
async fn failed_clips_are_absent_and_play_is_a_noop() {
    let h = harness();
    let player = SoundPlayer::new(
        &settings(&[("a.wav", 1000), ("missing.wav", 1000), ("corrupt.wav", 1000)], 50),
        h.env.clone(),
    );
    player.initialize().await;

    assert_eq!(player.state(), PlayerState::Ready);
    assert!(h.env.cache.contains("a.wav"));
    assert!(!h.env.cache.contains("missing.wav"));
    assert!(!h.env.cache.contains("corrupt.wav"));
    assert!(!player.is_loaded(1));

    player.play(1).await;
    player.play(2).await;
    player.play(7).await;
    assert!(h.device.starts().is_empty());

    player.play(0).await;
    assert_eq!(h.device.starts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn volume_zero_never_creates_a_session() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 0), h.env.clone());

    player.play(0).await;
    player.play(0).await;
    assert!(h.device.starts().is_empty());

    player.set_volume(30);
    player.play(0).await;
    assert_eq!(h.device.starts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn play_initializes_on_first_use() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), h.env.clone());

    player.play(0).await;

    assert_eq!(player.state(), PlayerState::Ready);
    assert_eq!(h.fetcher.calls("a.wav"), 1);
    assert_eq!(player.active_clip(), Some(0));
    assert_eq!(h.device.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_sound_skips_everything() {
    let h = harness();
    let mut config = settings(&[("a.wav", 1000)], 50);
    config.sound_enabled = false;
    let player = SoundPlayer::new(&config, h.env.clone());

    player.initialize().await;
    player.play(0).await;

    assert_eq!(player.state(), PlayerState::Uninitialized);
    assert_eq!(h.fetcher.calls("a.wav"), 0);
    assert_eq!(h.env.device.state(), DeviceState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn rapid_plays_leave_exactly_one_session() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000), ("b.wav", 1000)], 50), h.env.clone());
    player.initialize().await;

    for i in 0..10 {
        player.play(i % 2).await;
        assert_eq!(h.device.active_count(), 1);
    }

    assert_eq!(player.active_clip(), Some(1));
    assert_eq!(h.device.starts().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn fade_reaches_silence_and_session_is_torn_down() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), h.env.clone());
    player.initialize().await;

    player.play(0).await;
    let starts = h.device.starts();
    let (voice, _, envelope, at) = starts[0].clone();

    assert_relative_eq!(envelope.value_at(at), 0.001);
    assert_relative_eq!(envelope.value_at(at + 0.01), volume_to_gain(50), epsilon = 1e-6);
    assert!(envelope.value_at(at + 0.6) < volume_to_gain(50));
    assert_relative_eq!(envelope.value_at(at + 1.2), 0.0, epsilon = 1e-6);

    sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.device.active_count(), 1);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(h.device.active_count(), 0);
    assert_eq!(player.active_clip(), None);
    assert!(h
        .device
        .events()
        .iter()
        .any(|e| matches!(e, DeviceEvent::Stop(v) if *v == voice)));
}

#[tokio::test(start_paused = true)]
async fn newer_play_stops_previous_session_first() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000), ("b.wav", 1000)], 50), h.env.clone());
    player.initialize().await;
    let a = h.env.cache.get("a.wav").unwrap();
    let b = h.env.cache.get("b.wav").unwrap();

    player.play(0).await;
    let starts = h.device.starts();
    assert_eq!(starts.len(), 1);
    assert!(Arc::ptr_eq(&starts[0].1, &a));
    assert!(!Arc::ptr_eq(&starts[0].1, &b));
    let first = starts[0].0;

    sleep(Duration::from_millis(10)).await;
    player.play(1).await;

    let events = h.device.events();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[1], DeviceEvent::Stop(v) if *v == first));
    match &events[2] {
        DeviceEvent::Start { buffer, .. } => assert!(Arc::ptr_eq(buffer, &b)),
        other => panic!("expected a start, got {:?}", other),
    }
    assert_eq!(h.device.active_count(), 1);
    assert_eq!(player.active_clip(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn superseded_fade_timer_leaves_new_session_alone() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 100), ("b.wav", 1000)], 50), h.env.clone());
    player.initialize().await;

    player.play(0).await;
    sleep(Duration::from_millis(50)).await;
    player.play(1).await;

    // Well past the first clip's 120 ms teardown
    sleep(Duration::from_millis(200)).await;
    assert_eq!(player.active_clip(), Some(1));
    assert_eq!(h.device.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn suspended_device_is_resumed_on_play() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), h.env.clone());
    player.initialize().await;

    h.device.suspend().unwrap();
    player.play(0).await;

    assert_eq!(h.device.state(), DeviceState::Running);
    assert_eq!(h.device.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn focus_event_resumes_suspended_device() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), h.env.clone());
    player.initialize().await;

    h.device.suspend().unwrap();
    h.env.notify(PageEvent::FocusGained);
    sleep(Duration::from_millis(1)).await;

    assert_eq!(h.device.state(), DeviceState::Running);
}

#[tokio::test(start_paused = true)]
async fn missing_audio_device_degrades_to_silence() {
    let fetcher = CountingFetcher::with(&[("a.wav", wav_bytes(800))]);
    let env = AudioEnvironment::new(
        Arc::new(FakeProvider { device: None }),
        fetcher.clone(),
        Arc::new(NoUnlock),
    );
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), env.clone());

    player.initialize().await;
    player.play(0).await;

    assert_eq!(player.state(), PlayerState::Ready);
    assert_eq!(player.active_clip(), None);
    assert_eq!(env.device.state(), DeviceState::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn silent_unlock_runs_after_loading() {
    let h = harness_with_unlock(Arc::new(SilentBufferUnlock));
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), h.env.clone());
    player.initialize().await;

    let starts = h.device.starts();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].1.frames(), 1);
    assert_eq!(player.active_clip(), None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_playback_and_closes_device() {
    let h = harness();
    let player = SoundPlayer::new(&settings(&[("a.wav", 1000)], 50), h.env.clone());
    player.play(0).await;
    assert_eq!(h.device.active_count(), 1);

    player.shutdown();

    assert_eq!(h.device.active_count(), 0);
    assert_eq!(h.device.state(), DeviceState::Closed);
    assert_eq!(player.active_clip(), None);

    // Nothing left to fire
    sleep(Duration::from_millis(2000)).await;
    assert_eq!(h.device.events().len(), 2);
}
