// Application state management
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::audio::{AudioEnvironment, SoundPlayer};
use crate::settings::SoundSettings;

pub struct AppState {
    pub player: SoundPlayer,
    pub env: AudioEnvironment,
    pub settings: Mutex<SoundSettings>,
    pub app_dir: PathBuf,
    selected: AtomicUsize,
    clicks: Mutex<Vec<u64>>,
}

impl AppState {
    pub fn new(settings: SoundSettings, env: AudioEnvironment, app_dir: PathBuf) -> Self {
        let player = SoundPlayer::new(&settings, env.clone());
        let clicks = vec![0; settings.clips.len()];
        Self {
            player,
            env,
            settings: Mutex::new(settings),
            app_dir,
            selected: AtomicUsize::new(0),
            clicks: Mutex::new(clicks),
        }
    }

    pub fn character_count(&self) -> usize {
        self.clicks.lock().len()
    }

    pub fn selected(&self) -> usize {
        self.selected.load(Ordering::SeqCst)
    }

    pub fn select(&self, index: usize) {
        self.selected.store(index, Ordering::SeqCst);
    }

    /// Count a click on `index` and return the new total
    pub fn record_click(&self, index: usize) -> u64 {
        let mut clicks = self.clicks.lock();
        match clicks.get_mut(index) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => 0,
        }
    }
}
