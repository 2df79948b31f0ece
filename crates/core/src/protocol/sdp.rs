//! SDP (Session Description Protocol) generation (RFC 4566).
//!
//! Produces the SDP body returned by DESCRIBE responses. The template
//! mirrors the reference firmware's hardcoded string exactly — including
//! the `c=IN IP4 0.0.0.0` line, which is never rewritten to the server's
//! real address, and the fixed RTP port substituted into `m=video`:
//!
//! ```text
//! v=0
//! o=- <sid> <sid> IN IP4 <ip>
//! s=Connected Experimental 0.1
//! c=IN IP4 0.0.0.0
//! t=0 0
//! m=video <rtp_port> RTP/AVP 96
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1;profile-level-id=42001f
//! a=control:track0
//! ```
//!
//! `<sid>` is a freshly chosen random 32-bit number used for both `o=`
//! fields (not the session's RTSP `Session` header — DESCRIBE precedes
//! SETUP and has no session yet). `<ip>` is the server's local address.
//! Once SPS/PPS have been captured, the `a=fmtp` line is enriched with the
//! real `profile-level-id` and `sprop-parameter-sets` (RFC 6184 §8.1)
//! instead of the hardcoded guess — see [`H264Packetizer::fmtp_value`].

use rand::RngExt;

use crate::bitstream::ParamSets;
use crate::config;
use crate::media::h264::H264Packetizer;

/// Generate the SDP session description sent in a DESCRIBE response.
pub fn generate_sdp(ip: &str, params: &ParamSets) -> String {
    let sid: u32 = rand::rng().random();

    let mut sdp: Vec<String> = Vec::new();
    sdp.push("v=0".to_string());
    sdp.push(format!("o=- {} {} IN IP4 {}", sid, sid, ip));
    sdp.push("s=Connected Experimental 0.1".to_string());
    sdp.push("c=IN IP4 0.0.0.0".to_string());
    sdp.push("t=0 0".to_string());
    sdp.push(format!("m=video {} RTP/AVP 96", config::RTP_PORT));
    sdp.push("a=rtpmap:96 H264/90000".to_string());
    sdp.push(format!(
        "a=fmtp:{}",
        H264Packetizer::fmtp_value(96, params)
    ));
    sdp.push("a=control:track0".to_string());

    tracing::debug!("SDP: {}", sdp.join("\r\n"));

    format!("{}\r\n", sdp.join("\r\n"))
}
