//! Frame Producer (§4.6): drives a raw-frame source through an encoder,
//! post-processes the output, and publishes it through the [`PublisherHub`].
//!
//! Two variants exist upstream (camera capture vs. synthetic test pattern);
//! both only differ in [`FrameSource`] implementation and converge on the
//! same encode → scan → publish path, so this module models that seam as
//! a pair of traits rather than branching on a variant enum.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::bitstream;
use crate::error::{Result, RtspError};
use crate::hub::PublisherHub;

/// One raw frame pulled from the capture device or the test-pattern
/// generator, ready to hand to the encoder.
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub index: u64,
}

/// Upstream raw-frame source (camera capture ring buffer or synthetic
/// pattern). `next_frame` blocks until a frame is available; returning
/// `None` ends the producer loop.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<RawFrame>;
}

/// Hardware (or software) H.264 encoder boundary.
///
/// `encode` writes into `out` and returns the number of bytes written,
/// which the encoder itself may over-report — [`bitstream::find_data_end`]
/// recovers the true length from its output. Mirrors the reference
/// firmware's `esp_h264_enc_process` contract.
pub trait Encoder: Send {
    fn encode(&mut self, frame: &RawFrame, out: &mut [u8]) -> Result<usize>;
}

/// Maximum encoder output buffer size, generous enough for 1080p H.264 at
/// the reference bitrate with headroom for the encoder's padding.
pub const ENCODER_BUF_CAP: usize = 1 << 20;

/// Drives one [`FrameSource`]/[`Encoder`] pair and publishes frames to a
/// [`PublisherHub`] at a fixed clock rate.
pub struct Producer<S, E> {
    source: S,
    encoder: E,
    hub: Arc<PublisherHub>,
    fps: u32,
    running: Arc<AtomicBool>,
    out_buf: Vec<u8>,
}

impl<S: FrameSource, E: Encoder> Producer<S, E> {
    pub fn new(source: S, encoder: E, hub: Arc<PublisherHub>, fps: u32) -> Self {
        Self {
            source,
            encoder,
            hub,
            fps,
            running: Arc::new(AtomicBool::new(true)),
            out_buf: vec![0u8; ENCODER_BUF_CAP],
        }
    }

    /// Shared flag a caller can use to ask [`Self::run`] to stop after its
    /// current frame.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Drive the source → encode → scan → publish loop until the source is
    /// exhausted or `running` is cleared. 90 kHz RTP clock per §4.2; the
    /// timestamp is `frame_index * (90000 / fps)`, derived from a
    /// monotonic frame counter so that skipped frames (encoder failures)
    /// never desynchronize the clock.
    pub fn run(mut self) {
        let ts_increment = 90_000 / self.fps.max(1);

        while self.running.load(Ordering::SeqCst) {
            let Some(frame) = self.source.next_frame() else {
                tracing::info!("frame source exhausted, producer exiting");
                break;
            };

            match self.encoder.encode(&frame, &mut self.out_buf) {
                Ok(cap) if cap > 0 => {
                    let actual = bitstream::find_data_end(&self.out_buf, cap);
                    self.hub.observe_frame(&self.out_buf, actual);

                    let ts = (frame.index as u64 * ts_increment as u64) as u32;
                    self.hub.publish_frame(&self.out_buf[..actual], ts);
                }
                Ok(_) => {
                    tracing::warn!(index = frame.index, "encoder returned zero bytes, skipping");
                }
                Err(e) => {
                    tracing::warn!(index = frame.index, error = %e, "encoder failed, skipping frame");
                }
            }
        }
    }
}

/// Synthetic color-bar test pattern (Variant B, §4.6) — paces itself to a
/// fixed frame period instead of waiting on real capture hardware.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_period: Duration,
    index: u64,
    frame: Vec<u8>,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let frame_size = (width as usize * height as usize * 3) / 2;
        Self {
            width,
            height,
            frame_period: Duration::from_millis(1000 / fps.max(1) as u64),
            index: 0,
            frame: vec![128u8; frame_size],
        }
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Option<RawFrame> {
        thread::sleep(self.frame_period);
        let raw = RawFrame {
            data: self.frame.clone(),
            width: self.width,
            height: self.height,
            index: self.index,
        };
        self.index += 1;
        Some(raw)
    }
}

/// Encoder failure placeholder used when no hardware encoder is wired up.
/// Always returns [`RtspError::EncoderFailed`] — `camstream` never ships a
/// software H.264 encoder of its own (§6: the encoder is an external
/// collaborator).
pub struct NoEncoder;

impl Encoder for NoEncoder {
    fn encode(&mut self, _frame: &RawFrame, _out: &mut [u8]) -> Result<usize> {
        Err(RtspError::EncoderFailed(
            "no encoder configured".to_string(),
        ))
    }
}
