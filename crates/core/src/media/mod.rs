//! Media codec and RTP packetization.
//!
//! This module provides the [`Packetizer`] trait and its one implementation
//! for the codec this server ever runs: H.264.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame is split into one or more RTP packets.
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping) — for reordering and loss detection.
//! - **Timestamp** (32-bit) — media clock, 90 kHz for this server.
//! - **SSRC** (32-bit) — randomly chosen to identify the sender.
//! - **Marker bit** — set on the last packet of an access unit (frame).

pub mod h264;
pub mod rtp;

/// Codec-specific RTP packetizer.
///
/// Kept as a trait (rather than inlining H.264 directly into the session
/// layer) so the session/transport code never needs to know a codec's wire
/// format — only this seam. This server wires exactly one implementation,
/// [`h264::H264Packetizer`].
pub trait Packetizer: Send {
    /// Packetize raw encoded data (e.g. Annex B bitstream) into RTP packets.
    ///
    /// Each returned `Vec<u8>` is a complete RTP packet: 12-byte header
    /// (RFC 3550 §5.1) followed by the codec-specific payload.
    ///
    /// `timestamp_increment` advances the RTP timestamp after this frame,
    /// typically `clock_rate / fps` (e.g. 3000 for 30 fps at 90 kHz).
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>>;

    /// Codec name for the SDP `a=rtpmap` attribute (e.g. `"H264"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz. 90000 for this server, per RFC 3551 §4.
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (RFC 3551). 96 for this server.
    fn payload_type(&self) -> u8;

    /// SDP media-level attribute lines for this codec.
    ///
    /// Returned strings include the `a=` prefix, e.g.:
    /// - `"a=rtpmap:96 H264/90000"`
    /// - `"a=fmtp:96 packetization-mode=1"`
    /// - `"a=control:track1"`
    fn sdp_attributes(&self) -> Vec<String>;

    /// Current RTP sequence number (for the `RTP-Info` header in PLAY responses).
    fn next_sequence(&self) -> u16;

    /// Current RTP timestamp as u32 (for the `RTP-Info` header in PLAY responses).
    fn next_rtp_timestamp(&self) -> u32;
}
