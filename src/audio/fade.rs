// Single-slot scheduled fade teardown
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A teardown scheduled to run once after a delay.
///
/// The owner keeps at most one of these; scheduling a new fade always
/// cancels the previous one first. Cancelling cannot interrupt a callback
/// that has already started, so callbacks must re-check that they are
/// still current.
#[derive(Debug)]
pub struct PendingFade {
    handle: JoinHandle<()>,
}

impl PendingFade {
    /// Run `on_elapsed` after `delay`.
    ///
    /// Returns `None` when called outside a tokio runtime; the voice then
    /// simply plays out to the end of its buffer.
    pub fn schedule<F>(delay: Duration, on_elapsed: F) -> Option<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log::warn!("No async runtime available, fade teardown not scheduled");
                return None;
            }
        };

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_elapsed();
        });
        Some(Self { handle })
    }

    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }
}
