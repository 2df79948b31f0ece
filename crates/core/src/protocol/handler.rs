use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::hub::PublisherHub;
use crate::media::Packetizer;
use crate::protocol::request::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::session::transport::TransportHeader;
use crate::session::{Session, SessionState, Transport};

/// Handles RTSP method requests for a single TCP connection.
///
/// One connection owns exactly one [`Session`] — the client table slot is
/// allocated at accept time (§4.4), not at SETUP, mirroring the reference
/// firmware's one `client_t` per socket. There is no session-ID lookup: the
/// `Session` header on PLAY/TEARDOWN is accepted but not required to match,
/// since the TCP connection itself is the only channel by which a peer can
/// reach this handler.
pub struct MethodHandler {
    session: Arc<Session>,
    hub: Arc<PublisherHub>,
    client_addr: SocketAddr,
    config: Arc<ServerConfig>,
}

impl MethodHandler {
    pub fn new(
        session: Arc<Session>,
        hub: Arc<PublisherHub>,
        client_addr: SocketAddr,
        config: Arc<ServerConfig>,
    ) -> Self {
        MethodHandler {
            session,
            hub,
            client_addr,
            config,
        }
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let cseq = request.cseq().to_string();

        match request.method.as_str() {
            "OPTIONS" => self.handle_options(&cseq),
            "DESCRIBE" => self.handle_describe(&cseq, &request.uri),
            "SETUP" => self.handle_setup(&cseq, request),
            "PLAY" => self.handle_play(&cseq, &request.uri),
            "TEARDOWN" => self.handle_teardown(&cseq),
            other => {
                tracing::warn!(method = other, %cseq, "unsupported RTSP method");
                RtspResponse::new(501, "Not Implemented").add_header("CSeq", &cseq)
            }
        }
    }

    /// `Public: OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN` — exactly the
    /// five methods the reference server implements (no PAUSE, no
    /// GET_PARAMETER).
    fn handle_options(&self, cseq: &str) -> RtspResponse {
        tracing::debug!(%cseq, "OPTIONS");
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Public", "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN")
    }

    fn host_from_uri_or_client(&self, uri: &str) -> String {
        if let Some(host) = &self.config.public_host {
            return host.clone();
        }

        if let Some(after_scheme) = uri
            .strip_prefix("rtsp://")
            .or_else(|| uri.strip_prefix("rtsps://"))
        {
            let host = after_scheme
                .split('/')
                .next()
                .and_then(|host_port| host_port.split(':').next())
                .unwrap_or("")
                .trim();
            if !host.is_empty() {
                return host.to_string();
            }
        }
        self.client_addr.ip().to_string()
    }

    fn handle_describe(&self, cseq: &str, uri: &str) -> RtspResponse {
        tracing::debug!(%cseq, uri, "DESCRIBE");
        let host = self.host_from_uri_or_client(uri);
        let sdp = sdp::generate_sdp(&host, self.hub.params());

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Type", "application/sdp")
            .add_header("Content-Base", uri)
            .with_body(sdp)
    }

    fn handle_setup(&mut self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        if self.session.get_state() >= SessionState::Playing {
            tracing::warn!(%cseq, "SETUP received after PLAY");
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        }

        let transport_header = match request.get_header("Transport") {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, "SETUP missing Transport header");
                return RtspResponse::bad_request().add_header("CSeq", cseq);
            }
        };

        if transport_header.contains("RTP/AVP/TCP") || transport_header.contains("interleaved=") {
            tracing::warn!(%cseq, transport = %transport_header, "client requested TCP transport (not implemented)");
            return RtspResponse::new(461, "Unsupported Transport")
                .add_header("CSeq", cseq)
                .add_header(
                    "Unsupported",
                    "RTP/AVP/TCP (interleaved) not supported; use RTP/AVP (UDP)",
                );
        }

        let client_transport = match TransportHeader::parse(transport_header) {
            Some(t) => t,
            None => {
                tracing::warn!(%cseq, transport_header, "SETUP invalid Transport header");
                return RtspResponse::bad_request().add_header("CSeq", cseq);
            }
        };

        let client_rtp_addr =
            SocketAddr::new(self.client_addr.ip(), client_transport.client_rtp_port);

        self.session.set_transport(Transport {
            client_rtp_port: client_transport.client_rtp_port,
            client_rtcp_port: client_transport.client_rtcp_port,
            server_rtp_port: crate::config::RTP_PORT,
            server_rtcp_port: crate::config::RTCP_PORT,
            client_addr: client_rtp_addr,
        });
        self.session.try_transition(SessionState::Ready);

        tracing::info!(
            session_id = %self.session.id,
            client_rtp = %client_rtp_addr,
            "session transport configured via SETUP"
        );

        let transport_response = format!(
            "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
            client_transport.client_rtp_port,
            client_transport.client_rtcp_port,
            crate::config::RTP_PORT,
            crate::config::RTCP_PORT,
        );

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &transport_response)
            .add_header("Session", &self.session.session_header_value())
    }

    fn handle_play(&mut self, cseq: &str, uri: &str) -> RtspResponse {
        if self.session.get_state() == SessionState::Init || self.session.get_transport().is_none()
        {
            tracing::warn!(%cseq, "PLAY before SETUP");
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        }
        if self.session.get_state() == SessionState::Teardown {
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        }

        self.session.try_transition(SessionState::Playing);
        tracing::info!(session_id = %self.session.id, "session started playing");

        self.hub.prime_on_play(&self.session);

        let (seq, rtptime) = {
            let packetizer = self.session.packetizer.lock();
            (packetizer.next_sequence(), packetizer.next_rtp_timestamp())
        };
        let rtp_info = format!("url={}/track0;seq={};rtptime={}", uri, seq, rtptime);

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Session", &self.session.session_header_value())
            .add_header("Range", "npt=0.000-")
            .add_header("RTP-Info", &rtp_info)
    }

    fn handle_teardown(&mut self, cseq: &str) -> RtspResponse {
        if self.session.get_state() == SessionState::Teardown {
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        }

        self.session.try_transition(SessionState::Teardown);
        self.session
            .active
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!(session_id = %self.session.id, "session terminated via TEARDOWN");

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Session", &self.session.session_header_value())
    }
}
