//! Publisher Hub (§4.5): fans one encoded frame out to every PLAYING
//! client and owns the process-wide SPS/PPS cache.
//!
//! The Frame Producer calls [`PublisherHub::observe_frame`] once per frame
//! to populate the cache (a no-op after the first success) and
//! [`PublisherHub::publish_frame`] to deliver it. Each client session keeps
//! its own [`H264Packetizer`](crate::media::h264::H264Packetizer), so
//! every client gets an independent SSRC and sequence-number stream even
//! though all clients receive the same timestamps for the same frame.

use std::net::UdpSocket;
use std::sync::Arc;

use crate::bitstream::{self, ParamSets};
use crate::session::{ClientTable, Session, Transport};

/// Owns the client table (shared with the Listener) and the parameter-set
/// cache; holds the bound RTP socket used for every outbound packet.
pub struct PublisherHub {
    clients: ClientTable,
    params: ParamSets,
    rtp_socket: Arc<UdpSocket>,
}

impl PublisherHub {
    pub fn new(clients: ClientTable, params: ParamSets, rtp_socket: Arc<UdpSocket>) -> Self {
        Self {
            clients,
            params,
            rtp_socket,
        }
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn params(&self) -> &ParamSets {
        &self.params
    }

    /// `ExtractSpsPps`, delegated — idempotent, a no-op once captured.
    pub fn observe_frame(&self, frame: &[u8], len: usize) {
        bitstream::extract_sps_pps(frame, len, &self.params);
    }

    /// `PublishFrame(bytes, ts)`: deliver one encoded access unit to every
    /// `active && PLAYING` session. Ahead of an IDR, cached SPS/PPS are
    /// sent first (on the same timestamp) if the cache is populated.
    ///
    /// Takes a table snapshot before touching the network so a slow
    /// client's `sendto` cannot block the fan-out to the others, and so
    /// concurrent TEARDOWNs clearing `active` never race this loop (§5).
    pub fn publish_frame(&self, frame: &[u8], ts: u32) {
        let is_idr = bitstream::classify_and_find_idr(frame, frame.len());
        let nals: Vec<_> = bitstream::iter_annex_b(frame).collect();

        for session in self.clients.snapshot() {
            if !session.is_playing() {
                continue;
            }
            let Some(transport) = session.get_transport() else {
                continue;
            };

            let mut packetizer = session.packetizer.lock();

            if is_idr {
                if let (Some(sps), Some(pps)) = (self.params.sps(), self.params.pps()) {
                    let sps_packets = packetizer.send_nal(bitstream::strip_start_code(&sps), ts);
                    self.deliver(&transport, sps_packets);
                    let pps_packets = packetizer.send_nal(bitstream::strip_start_code(&pps), ts);
                    self.deliver(&transport, pps_packets);
                }
            }

            for nal in &nals {
                let packets = packetizer.send_nal(nal.payload(frame), ts);
                self.deliver(&transport, packets);
            }
        }
    }

    /// Prime a single newly-playing session with cached SPS/PPS at
    /// timestamp 0 (RFC 2326 §10.5, invoked from the PLAY handler).
    /// A no-op if the cache has not been populated yet.
    pub fn prime_on_play(&self, session: &Session) {
        let Some(transport) = session.get_transport() else {
            return;
        };
        let (Some(sps), Some(pps)) = (self.params.sps(), self.params.pps()) else {
            return;
        };

        let mut packetizer = session.packetizer.lock();
        let sps_packets = packetizer.send_nal(bitstream::strip_start_code(&sps), 0);
        self.deliver(&transport, sps_packets);
        let pps_packets = packetizer.send_nal(bitstream::strip_start_code(&pps), 0);
        self.deliver(&transport, pps_packets);
    }

    fn deliver(&self, transport: &Transport, packets: Vec<Vec<u8>>) {
        for packet in packets {
            if let Err(e) = self.rtp_socket.send_to(&packet, transport.client_addr) {
                tracing::warn!(error = %e, addr = %transport.client_addr, "RTP send failed");
            }
        }
    }
}
