//! Detection sources: device enumeration plus continuous frame decoding,
//! surfaced as a lazy, infinite, cancelable stream of decode events.

#[cfg(feature = "camera")]
pub mod camera;
pub mod mock;

#[cfg(feature = "camera")]
pub use camera::CameraSource;
pub use mock::ScriptedSource;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors from device enumeration and capture startup
#[derive(Error, Debug)]
pub enum DetectError {
    /// No capture device is present; terminal for the operation and
    /// surfaced to the caller immediately
    #[error("no capture device available")]
    DeviceUnavailable,

    /// Capture could not be started on the device
    #[error("capture failed on {device}: {details}")]
    Capture { device: String, details: String },
}

/// A capture device, ordered by index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: u32,
    pub label: String,
    pub path: String,
}

/// One decode attempt from the capture loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A code was decoded from the current frame
    Matched(String),
    /// The frame contained no decodable code; not an error, never
    /// surfaced to the user
    NoMatchThisFrame,
    /// The decoder failed on this frame; the stream continues
    Fault(String),
}

/// Source of decode events
#[async_trait]
pub trait DetectionSource: Send + Sync {
    /// List capture devices; fails with `DeviceUnavailable` when none exist
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, DetectError>;

    /// Begin continuous decoding on the given device. The device is held
    /// exclusively for the lifetime of the returned stream.
    async fn start(&self, device: &DeviceDescriptor) -> Result<DecodeStream, DetectError>;
}

/// Lazy, infinite sequence of decode events backed by a capture task.
///
/// There is no natural end: the stream terminates only through
/// [`cancel`](DecodeStream::cancel), which stops the capture task and
/// releases the underlying device on every exit path, including drop.
pub struct DecodeStream {
    rx: mpsc::Receiver<DecodeEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DecodeStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<DecodeEvent>,
        cancel: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { rx, cancel, task }
    }

    /// Receive the next decode event; `None` once the stream has been
    /// cancelled and drained.
    pub async fn next(&mut self) -> Option<DecodeEvent> {
        self.rx.recv().await
    }

    /// Stop the capture task and release the device. Idempotent: safe to
    /// call when already stopped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observers can use to stop the stream from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the capture task to finish after cancellation
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for DecodeStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for DecodeStream {
    type Item = DecodeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<DecodeEvent>> {
        self.rx.poll_recv(cx)
    }
}
