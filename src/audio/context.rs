// Shared audio environment: the device slot, the decoded-clip cache and the
// collaborators every player of an app is built from.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::cache::BufferCache;
use super::device::{AudioDevice, DeviceProvider, DeviceState};
use super::fetch::{ClipFetcher, SourceFetcher};
use super::output::CpalProvider;
use super::unlock::{DeviceUnlock, PageEvent, SilentBufferUnlock};
use crate::error::Result;

const PAGE_EVENT_CAPACITY: usize = 16;

/// Process-wide slot holding the one open output device
#[derive(Clone)]
pub struct SharedDevice {
    provider: Arc<dyn DeviceProvider>,
    slot: Arc<Mutex<Option<Arc<dyn AudioDevice>>>>,
}

impl SharedDevice {
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        Self {
            provider,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// The open device, opening one if there is none or the last was closed
    pub fn get_or_open(&self) -> Result<Arc<dyn AudioDevice>> {
        let mut slot = self.slot.lock();
        if let Some(device) = slot.as_ref() {
            if device.state() != DeviceState::Closed {
                return Ok(device.clone());
            }
        }

        let device = self.provider.open()?;
        *slot = Some(device.clone());
        Ok(device)
    }

    /// The open device, if any, without opening one
    pub fn current(&self) -> Option<Arc<dyn AudioDevice>> {
        self.slot
            .lock()
            .as_ref()
            .filter(|d| d.state() != DeviceState::Closed)
            .cloned()
    }

    pub fn state(&self) -> DeviceState {
        match self.slot.lock().as_ref() {
            Some(device) => device.state(),
            None => DeviceState::Uninitialized,
        }
    }

    /// Try to resume a suspended device. Returns true if it was resumed.
    pub fn resume_if_suspended(&self) -> bool {
        let Some(device) = self.current() else {
            return false;
        };
        if device.state() != DeviceState::Suspended {
            return false;
        }
        match device.resume() {
            Ok(()) => true,
            Err(e) => {
                log::error!("Audio device resume failed: {}", e);
                false
            }
        }
    }

    pub fn close(&self) {
        if let Some(device) = self.slot.lock().take() {
            if let Err(e) = device.close() {
                log::error!("Failed to close audio device: {}", e);
            }
        }
    }
}

/// Everything a `SoundPlayer` shares with the other players of the app.
///
/// Create one per app run and hand clones to each player.
#[derive(Clone)]
pub struct AudioEnvironment {
    pub cache: BufferCache,
    pub device: SharedDevice,
    pub fetcher: Arc<dyn ClipFetcher>,
    pub unlock: Arc<dyn DeviceUnlock>,
    page_events: broadcast::Sender<PageEvent>,
}

impl AudioEnvironment {
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        fetcher: Arc<dyn ClipFetcher>,
        unlock: Arc<dyn DeviceUnlock>,
    ) -> Self {
        let (page_events, _) = broadcast::channel(PAGE_EVENT_CAPACITY);
        Self {
            cache: BufferCache::new(),
            device: SharedDevice::new(provider),
            fetcher,
            unlock,
            page_events,
        }
    }

    /// cpal output, filesystem/HTTP fetching and the silent-buffer unlock
    pub fn system() -> Self {
        Self::new(
            Arc::new(CpalProvider),
            Arc::new(SourceFetcher::new()),
            Arc::new(SilentBufferUnlock),
        )
    }

    /// Report a focus/visibility/interaction event from the host
    pub fn notify(&self, event: PageEvent) {
        // No listeners is fine; nothing is open yet
        let _ = self.page_events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.page_events.subscribe()
    }
}
