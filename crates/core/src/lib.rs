//! # camstream — embedded RTSP/H.264 streaming server
//!
//! A Rust library for publishing one live H.264 video stream to a handful
//! of simultaneous viewers over the Real-Time Streaming Protocol (RTSP),
//! modeled after single-camera embedded firmware: one encoder, one stream,
//! a fixed-size client table instead of a general session store.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, transport negotiation |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP | Packet header format, SSRC generation, sequence/timestamp semantics |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Session description generation for DESCRIBE responses |
//! | [RFC 6184](https://tools.ietf.org/html/rfc6184) | H.264 RTP payload | NAL unit packetization, FU-A fragmentation, SDP fmtp attributes |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  CLI                                      │
//! ├──────────────────────────────────────────┤
//! │  Producer      — source → encode → hub   │
//! │  PublisherHub  — fan-out, SPS/PPS cache  │
//! ├──────────────────────────────────────────┤
//! │  Protocol      — RTSP parsing, SDP, etc. │
//! │  Session       — state machine, transport│
//! ├──────────────────────────────────────────┤
//! │  Transport     — TCP signaling, UDP data │
//! │  Media         — RTP header, packetizers │
//! │  Bitstream     — Annex B scanning         │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use camstream::Server;
//! use camstream::producer::{NoEncoder, Producer, TestPatternSource};
//!
//! let mut server = Server::new("0.0.0.0:8554");
//! let hub = server.start().unwrap();
//!
//! let producer = Producer::new(TestPatternSource::new(640, 480, 30), NoEncoder, hub, 30);
//! producer.run();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — High-level [`Server`] orchestrator and [`crate::config::ServerConfig`].
//! - [`hub`] — [`hub::PublisherHub`]: fan-out to PLAYING clients, SPS/PPS cache.
//! - [`producer`] — [`producer::Producer`]: capture/encode/publish loop.
//! - [`protocol`] — RTSP request/response parsing, method handling, SDP generation.
//! - [`session`] — RTSP session state machine, fixed-size client table, transport negotiation.
//! - [`transport`] — TCP listener for RTSP signaling, fixed UDP sockets for RTP/RTCP.
//! - [`media`] — [`Packetizer`] trait, RTP header builder, H.264 packetizer.
//! - [`bitstream`] — Annex B NAL scanning, SPS/PPS extraction, IDR classification.
//! - [`config`] — server-wide port/MTU constants and [`config::ServerConfig`].
//! - [`error`] — [`RtspError`] enum and [`Result`] alias.

pub mod bitstream;
pub mod config;
pub mod error;
pub mod hub;
pub mod media;
pub mod producer;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Result, RtspError};
pub use hub::PublisherHub;
pub use media::Packetizer;
pub use server::{Server, Viewer};
