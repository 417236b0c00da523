// Platform unlock workarounds
//
// Some hosts only let output start after a user gesture, and some suspend it
// again when the window loses focus. These helpers are kept apart from the
// player so playback logic never has to know about them.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::buffer::DecodedBuffer;
use super::context::SharedDevice;
use super::device::AudioDevice;
use super::envelope::GainEnvelope;

/// Host events that are a chance to bring a suspended device back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    FocusGained,
    BecameVisible,
    UserInteraction,
}

/// Extra step run once the device is open and clips are loaded
pub trait DeviceUnlock: Send + Sync {
    fn unlock(&self, device: &dyn AudioDevice);
}

/// Plays a one-frame silent buffer so strict hosts treat output as started
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBufferUnlock;

impl DeviceUnlock for SilentBufferUnlock {
    fn unlock(&self, device: &dyn AudioDevice) {
        let silence = Arc::new(DecodedBuffer::silence(1, device.sample_rate()));
        match device.start_voice(silence, GainEnvelope::constant(1.0)) {
            Ok(_) => log::debug!("Played silent unlock buffer"),
            Err(e) => log::debug!("Silent unlock buffer failed: {}", e),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoUnlock;

impl DeviceUnlock for NoUnlock {
    fn unlock(&self, _device: &dyn AudioDevice) {}
}

/// Resume `device` whenever a page event arrives while it is suspended.
///
/// Runs until every sender of `events` is dropped.
pub fn spawn_page_event_listener(
    mut events: broadcast::Receiver<PageEvent>,
    device: SharedDevice,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    // Resuming waits on the output thread
                    let shared = device.clone();
                    match tokio::task::spawn_blocking(move || shared.resume_if_suspended()).await {
                        Ok(true) => log::info!("Audio device resumed on {:?}", event),
                        Ok(false) => {}
                        Err(e) => log::error!("Audio resume task failed: {}", e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Page event listener skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
