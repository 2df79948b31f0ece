use std::net::UdpSocket;

use crate::config;
use crate::error::Result;

/// The two fixed UDP sockets the server binds once at startup (§4.4).
///
/// Every client shares the same server-side RTP/RTCP port pair — there is
/// no per-session port allocation, matching the reference firmware's single
/// hardware UDP endpoint. RTCP is bound for `Transport` header conformance
/// only; nothing reads from it.
pub struct UdpTransport {
    pub rtp: UdpSocket,
    pub rtcp: UdpSocket,
}

impl UdpTransport {
    /// Bind the fixed RTP ([`config::RTP_PORT`]) and RTCP
    /// ([`config::RTCP_PORT`]) sockets.
    pub fn bind() -> Result<Self> {
        let rtp = UdpSocket::bind(("0.0.0.0", config::RTP_PORT))?;
        let rtcp = UdpSocket::bind(("0.0.0.0", config::RTCP_PORT))?;
        tracing::info!(
            rtp_port = config::RTP_PORT,
            rtcp_port = config::RTCP_PORT,
            "UDP sockets bound"
        );
        Ok(Self { rtp, rtcp })
    }
}
