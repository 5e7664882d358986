//! Scripted detection source for tests and demos

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{DecodeEvent, DecodeStream, DetectError, DetectionSource, DeviceDescriptor};

/// Emits a fixed sequence of decode events at a steady interval, then
/// idles with `NoMatchThisFrame` frames until cancelled, the same shape
/// a real camera produces, without hardware.
pub struct ScriptedSource {
    script: Vec<DecodeEvent>,
    interval: Duration,
}

impl ScriptedSource {
    pub fn new(script: Vec<DecodeEvent>, interval: Duration) -> Self {
        Self { script, interval }
    }
}

#[async_trait]
impl DetectionSource for ScriptedSource {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, DetectError> {
        Ok(vec![DeviceDescriptor {
            index: 0,
            label: "scripted source".to_string(),
            path: "mock://scripted".to_string(),
        }])
    }

    async fn start(&self, device: &DeviceDescriptor) -> Result<DecodeStream, DetectError> {
        debug!(device = %device.path, "starting scripted capture");

        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let script = self.script.clone();
        let interval = self.interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut queued = script.into_iter();

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let event = queued.next().unwrap_or(DecodeEvent::NoMatchThisFrame);
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("scripted capture stopped");
        });

        Ok(DecodeStream::new(rx, cancel, Some(task)))
    }
}
