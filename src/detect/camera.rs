//! GStreamer-backed camera detection source with per-frame code decoding

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
#[cfg(target_os = "linux")]
use tracing::{debug, info, trace};
#[cfg(not(target_os = "linux"))]
use tracing::{debug, warn};

use super::{DecodeEvent, DecodeStream, DetectError, DetectionSource, DeviceDescriptor};
use crate::config::ScannerConfig;

#[cfg(target_os = "linux")]
use gstreamer::prelude::*;
#[cfg(target_os = "linux")]
use gstreamer::Pipeline;
#[cfg(target_os = "linux")]
use gstreamer_app::AppSink;

/// Highest v4l2 device index probed during enumeration
#[cfg(target_os = "linux")]
const PROBE_LIMIT: u32 = 10;

/// Camera-backed detection source: MJPEG capture via a GStreamer v4l2
/// pipeline, one decode attempt per frame.
pub struct CameraSource {
    config: ScannerConfig,
}

impl CameraSource {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    #[cfg(target_os = "linux")]
    fn pipeline_description(&self, device: &DeviceDescriptor) -> String {
        format!(
            "v4l2src device={} io-mode=mmap do-timestamp=true ! \
             image/jpeg,framerate={}/1 ! \
             queue max-size-buffers=4 leaky=downstream ! \
             appsink name=sink sync=false max-buffers=4 drop=true emit-signals=false",
            device.path,
            self.config.fps.max(1)
        )
    }

    #[cfg(target_os = "linux")]
    async fn start_capture(&self, device: &DeviceDescriptor) -> Result<DecodeStream, DetectError> {
        let capture_error = |details: String| DetectError::Capture {
            device: device.path.clone(),
            details,
        };

        gstreamer::init()
            .map_err(|e| capture_error(format!("failed to initialize GStreamer: {}", e)))?;

        let description = self.pipeline_description(device);
        info!("creating capture pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| capture_error(format!("failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| capture_error("failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| capture_error("appsink missing from pipeline".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| capture_error("failed to downcast to AppSink".to_string()))?;

        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let _ = sample_tx.send(sample);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| capture_error(format!("failed to start pipeline: {}", e)))?;

        info!("camera capture started on {}", device.path);

        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let device_path = device.path.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    sample = sample_rx.recv() => {
                        let Some(sample) = sample else { break };
                        let event = decode_sample(&sample);
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }

            // Releases the camera on every exit path
            let _ = pipeline.set_state(gstreamer::State::Null);
            debug!("capture loop for {} stopped", device_path);
        });

        Ok(DecodeStream::new(rx, cancel, Some(task)))
    }

    /// Capture loop when camera hardware support is unavailable on this
    /// platform: emits idle frames at the configured rate.
    #[cfg(not(target_os = "linux"))]
    async fn start_capture(&self, device: &DeviceDescriptor) -> Result<DecodeStream, DetectError> {
        warn!("camera capture is only available on Linux; emitting idle frames");

        let frame_interval =
            std::time::Duration::from_millis(1000 / self.config.fps.max(1) as u64);
        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let device_path = device.path.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(DecodeEvent::NoMatchThisFrame).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("mock capture loop for {} stopped", device_path);
        });

        Ok(DecodeStream::new(rx, cancel, Some(task)))
    }
}

#[async_trait]
impl DetectionSource for CameraSource {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, DetectError> {
        #[cfg(target_os = "linux")]
        {
            let mut devices = Vec::new();
            for index in 0..PROBE_LIMIT {
                let path = format!("/dev/video{}", index);
                if std::path::Path::new(&path).exists() {
                    devices.push(DeviceDescriptor {
                        index,
                        label: format!("v4l2 device {}", index),
                        path,
                    });
                }
            }

            if devices.is_empty() {
                return Err(DetectError::DeviceUnavailable);
            }

            debug!(devices = devices.len(), "enumerated capture devices");
            Ok(devices)
        }

        #[cfg(not(target_os = "linux"))]
        {
            Ok(vec![DeviceDescriptor {
                index: self.config.device_index,
                label: "mock camera".to_string(),
                path: "mock://camera".to_string(),
            }])
        }
    }

    async fn start(&self, device: &DeviceDescriptor) -> Result<DecodeStream, DetectError> {
        self.start_capture(device).await
    }
}

/// Extract the JPEG payload from a sample and attempt one decode
#[cfg(target_os = "linux")]
fn decode_sample(sample: &gstreamer::Sample) -> DecodeEvent {
    let Some(buffer) = sample.buffer() else {
        return DecodeEvent::Fault("sample contained no buffer".to_string());
    };

    let map = match buffer.map_readable() {
        Ok(map) => map,
        Err(e) => return DecodeEvent::Fault(format!("failed to map buffer: {}", e)),
    };

    decode_frame(map.as_slice())
}

/// Decode one MJPEG frame: JPEG → grayscale → QR grid detection
#[cfg(target_os = "linux")]
fn decode_frame(jpeg: &[u8]) -> DecodeEvent {
    let luma = match image::load_from_memory(jpeg) {
        Ok(frame) => frame.to_luma8(),
        Err(e) => return DecodeEvent::Fault(format!("frame decode failed: {}", e)),
    };

    let mut prepared = rqrr::PreparedImage::prepare(luma);
    let grids = prepared.detect_grids();
    let Some(grid) = grids.first() else {
        return DecodeEvent::NoMatchThisFrame;
    };

    match grid.decode() {
        Ok((_meta, text)) => {
            trace!(%text, "decoded code from frame");
            DecodeEvent::Matched(text)
        }
        Err(e) => DecodeEvent::Fault(format!("code decode failed: {}", e)),
    }
}
