//! Network transport layer for RTSP signaling and RTP media delivery.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling. One TCP
//!   connection per client, with a thread per connection.
//!
//! - **UDP** ([`udp`]): carries RTP/RTCP media packets, bound once to the
//!   fixed server-side port pair and shared by every client (§4.4).
//!
//! Interleaved TCP transport (RFC 2326 §10.12), which multiplexes RTP data
//! onto the RTSP TCP connection using `$` framing, is out of scope.

pub mod tcp;
pub mod udp;

pub use udp::UdpTransport;
