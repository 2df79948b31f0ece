//! Server-wide constants and configuration.

/// Default RTSP control port (RFC 2326 §1.2 uses 554; this follows the
/// reference firmware's 8554 to avoid requiring root on most systems).
pub const DEFAULT_RTSP_PORT: u16 = 8554;

/// Fixed server-side UDP port for outbound RTP, shared by every client
/// (§4.4 — not allocated per-session).
pub const RTP_PORT: u16 = 5004;

/// Fixed server-side UDP port for RTCP. Bound for Transport-header
/// conformance but never read or written (§9 design notes).
pub const RTCP_PORT: u16 = 5005;

/// Maximum RTP payload size before FU-A fragmentation kicks in (§4.2).
pub const RTP_MTU: usize = 1400;

/// Server-level configuration used by protocol handlers.
///
/// The SDP origin/session fields the reference firmware hardcodes
/// (`o=-`, `s=Connected Experimental 0.1`) are not configurable here —
/// [`crate::protocol::sdp::generate_sdp`] reproduces that literal template
/// directly, matching the reference's fixed strings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the RTSP listener binds to.
    pub rtsp_port: u16,
    /// Public host advertised in SDP `o=` line. When `None`, the host is
    /// inferred from the request URI or the client's own address.
    pub public_host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rtsp_port: DEFAULT_RTSP_PORT,
            public_host: None,
        }
    }
}
