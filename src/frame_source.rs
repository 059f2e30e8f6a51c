// src/frame_source.rs
//
// Resilient per-camera frame ingestion. A dedicated capture thread keeps a
// single "latest frame" slot refreshed; readers never block and may see the
// same frame twice, which consumers detect through `Frame::seq`. Transport
// failures are retried indefinitely and never surface to callers.

use crate::types::{now_ms, CropConfig, Frame};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("stream read failed: {0}")]
    Read(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// An open video stream yielding decoded frames.
pub trait VideoStream: Send {
    fn read(&mut self) -> Result<Frame, CaptureError>;
}

/// Opens a `VideoStream`; called again after every stream failure.
pub trait StreamConnector: Send + Sync + 'static {
    fn connect(&self) -> Result<Box<dyn VideoStream>, CaptureError>;
}

struct Shared {
    slot: Mutex<Option<Arc<Frame>>>,
    running: AtomicBool,
}

pub struct FrameSource {
    name: String,
    shared: Arc<Shared>,
    crop: Option<CropConfig>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl FrameSource {
    /// Spawns the capture thread and returns immediately; the slot stays
    /// empty until the first successful read.
    pub fn start(
        name: String,
        connector: Box<dyn StreamConnector>,
        reconnect_interval: Duration,
        crop: Option<CropConfig>,
    ) -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(None),
            running: AtomicBool::new(true),
        });
        let loop_shared = shared.clone();
        let loop_name = name.clone();
        let handle = thread::Builder::new()
            .name(format!("capture-{name}"))
            .spawn(move || capture_loop(loop_name, connector, loop_shared, reconnect_interval))
            .ok();
        if handle.is_none() {
            warn!(camera = %name, "failed to spawn capture thread");
        }
        Self {
            name,
            shared,
            crop,
            handle: Mutex::new(handle),
        }
    }

    /// Most recent frame, with the per-camera crop applied, or `None` while
    /// the stream is down. Never blocks on capture.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        let frame = self
            .shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        match &self.crop {
            Some(crop) => Some(Arc::new(crop_frame(&frame, crop))),
            None => Some(frame),
        }
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(camera = %self.name, "capture thread panicked");
            }
        }
    }
}

fn capture_loop(
    name: String,
    connector: Box<dyn StreamConnector>,
    shared: Arc<Shared>,
    reconnect_interval: Duration,
) {
    let mut seq: u64 = 0;
    while shared.running.load(Ordering::SeqCst) {
        let mut stream = match connector.connect() {
            Ok(stream) => {
                info!(camera = %name, "stream connected");
                stream
            }
            Err(e) => {
                warn!(camera = %name, "stream open failed: {e}");
                sleep_while_running(&shared, reconnect_interval);
                continue;
            }
        };

        while shared.running.load(Ordering::SeqCst) {
            match stream.read() {
                Ok(mut frame) => {
                    seq += 1;
                    frame.seq = seq;
                    *shared.slot.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(Arc::new(frame));
                }
                Err(e) => {
                    warn!(camera = %name, "frame read failed: {e}, reconnecting");
                    break;
                }
            }
        }

        sleep_while_running(&shared, reconnect_interval);
    }
}

/// Sleeps in short steps so `stop()` is not held up by a long reconnect wait.
fn sleep_while_running(shared: &Shared, total: Duration) {
    let step = Duration::from_millis(100);
    let mut remaining = total;
    while shared.running.load(Ordering::SeqCst) && remaining > Duration::ZERO {
        let chunk = remaining.min(step);
        thread::sleep(chunk);
        remaining = remaining.saturating_sub(chunk);
    }
}

/// Trims fixed margins from each edge. An over-large crop leaves the frame
/// untouched rather than producing an empty image.
fn crop_frame(frame: &Frame, crop: &CropConfig) -> Frame {
    if crop.left + crop.right >= frame.width || crop.top + crop.bottom >= frame.height {
        return frame.clone();
    }
    let new_width = frame.width - crop.left - crop.right;
    let new_height = frame.height - crop.top - crop.bottom;
    let mut data = Vec::with_capacity((new_width * new_height * 3) as usize);
    for row in crop.top..frame.height - crop.bottom {
        let start = ((row * frame.width + crop.left) * 3) as usize;
        let end = start + (new_width * 3) as usize;
        data.extend_from_slice(&frame.data[start..end]);
    }
    Frame {
        data,
        width: new_width,
        height: new_height,
        timestamp_ms: frame.timestamp_ms,
        seq: frame.seq,
    }
}

// ---------------------------------------------------------------------------
// MJPEG-over-HTTP transport
// ---------------------------------------------------------------------------

/// Connects to an MJPEG (multipart/x-mixed-replace) HTTP stream.
pub struct MjpegConnector {
    url: String,
    agent: ureq::Agent,
}

impl MjpegConnector {
    pub fn new(url: &str, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(read_timeout)
            .timeout_read(read_timeout)
            .build();
        Self {
            url: url.to_string(),
            agent,
        }
    }
}

impl StreamConnector for MjpegConnector {
    fn connect(&self) -> Result<Box<dyn VideoStream>, CaptureError> {
        let response = self.agent.get(&self.url).call().map_err(|_| CaptureError::Open {
            uri: self.url.clone(),
        })?;
        Ok(Box::new(MjpegStream {
            reader: Box::new(response.into_reader()),
            buf: Vec::new(),
        }))
    }
}

const MAX_PART_BYTES: usize = 16 * 1024 * 1024;

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buf: Vec<u8>,
}

impl VideoStream for MjpegStream {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        let mut chunk = [0u8; 8192];
        loop {
            if let Some(jpeg) = extract_jpeg(&mut self.buf) {
                return decode_jpeg(&jpeg);
            }
            if self.buf.len() > MAX_PART_BYTES {
                return Err(CaptureError::Read("no frame boundary found".to_string()));
            }
            let n = self
                .reader
                .read(&mut chunk)
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            if n == 0 {
                return Err(CaptureError::Read("stream closed".to_string()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Pulls one complete JPEG (SOI..EOI) out of the buffer, discarding any
/// multipart headers or garbage before it.
fn extract_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let soi = find_marker(buf, 0, [0xFF, 0xD8])?;
    if soi > 0 {
        buf.drain(..soi);
    }
    let eoi = find_marker(buf, 2, [0xFF, 0xD9])?;
    let jpeg: Vec<u8> = buf.drain(..eoi + 2).collect();
    Some(jpeg)
}

fn find_marker(buf: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    if buf.len() < from + 2 {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|i| i + from)
}

fn decode_jpeg(jpeg: &[u8]) -> Result<Frame, CaptureError> {
    let image = image::load_from_memory(jpeg)
        .map_err(|e| CaptureError::Read(format!("jpeg decode failed: {e}")))?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame {
        data: rgb.into_raw(),
        width,
        height,
        timestamp_ms: now_ms(),
        seq: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct StubStream {
        frames: VecDeque<Frame>,
    }

    impl VideoStream for StubStream {
        fn read(&mut self) -> Result<Frame, CaptureError> {
            self.frames
                .pop_front()
                .ok_or_else(|| CaptureError::Read("out of frames".to_string()))
        }
    }

    struct StubConnector {
        per_connect: usize,
    }

    impl StreamConnector for StubConnector {
        fn connect(&self) -> Result<Box<dyn VideoStream>, CaptureError> {
            let frames = (0..self.per_connect)
                .map(|i| Frame {
                    data: vec![i as u8; 4 * 4 * 3],
                    width: 4,
                    height: 4,
                    timestamp_ms: now_ms(),
                    seq: 0,
                })
                .collect();
            Ok(Box::new(StubStream { frames }))
        }
    }

    fn wait_for_frame(source: &FrameSource) -> Arc<Frame> {
        for _ in 0..100 {
            if let Some(frame) = source.latest_frame() {
                return frame;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("no frame captured within timeout");
    }

    #[test]
    fn test_capture_fills_latest_slot_with_increasing_seq() {
        let source = FrameSource::start(
            "test".to_string(),
            Box::new(StubConnector { per_connect: 3 }),
            Duration::from_millis(10),
            None,
        );
        let frame = wait_for_frame(&source);
        assert!(frame.seq >= 1);
        // seq keeps increasing across reconnects
        thread::sleep(Duration::from_millis(100));
        let later = source.latest_frame().unwrap();
        assert!(later.seq > frame.seq);
        source.stop();
    }

    #[test]
    fn test_crop_applied_at_read_time() {
        let crop = CropConfig {
            left: 1,
            right: 1,
            top: 1,
            bottom: 1,
        };
        let source = FrameSource::start(
            "test".to_string(),
            Box::new(StubConnector { per_connect: 2 }),
            Duration::from_millis(10),
            Some(crop),
        );
        let frame = wait_for_frame(&source);
        assert_eq!(frame.size(), (2, 2));
        source.stop();
    }

    #[test]
    fn test_crop_frame_extracts_interior() {
        let mut data = Vec::new();
        for i in 0..16u8 {
            data.extend_from_slice(&[i, i, i]);
        }
        let frame = Frame {
            data,
            width: 4,
            height: 4,
            timestamp_ms: 0.0,
            seq: 7,
        };
        let crop = CropConfig {
            left: 1,
            right: 1,
            top: 1,
            bottom: 1,
        };
        let cropped = crop_frame(&frame, &crop);
        assert_eq!(cropped.size(), (2, 2));
        assert_eq!(cropped.seq, 7);
        // interior pixels of the 4x4 grid are 5, 6, 9, 10
        assert_eq!(cropped.data, vec![5, 5, 5, 6, 6, 6, 9, 9, 9, 10, 10, 10]);
    }

    #[test]
    fn test_oversized_crop_is_ignored() {
        let frame = Frame {
            data: vec![0; 4 * 4 * 3],
            width: 4,
            height: 4,
            timestamp_ms: 0.0,
            seq: 1,
        };
        let crop = CropConfig {
            left: 3,
            right: 3,
            ..Default::default()
        };
        assert_eq!(crop_frame(&frame, &crop).size(), (4, 4));
    }

    #[test]
    fn test_extract_jpeg_skips_multipart_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        buf.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]);
        buf.extend_from_slice(b"\r\n--frame");
        let jpeg = extract_jpeg(&mut buf).unwrap();
        assert_eq!(jpeg, vec![0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]);
        // the trailing boundary stays for the next part
        assert_eq!(buf, b"\r\n--frame");
    }

    #[test]
    fn test_extract_jpeg_waits_for_complete_image() {
        let mut buf = vec![0xFF, 0xD8, 0x01, 0x02];
        assert!(extract_jpeg(&mut buf).is_none());
        buf.extend_from_slice(&[0xFF, 0xD9]);
        assert!(extract_jpeg(&mut buf).is_some());
    }
}
