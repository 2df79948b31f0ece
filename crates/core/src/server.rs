use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::bitstream::ParamSets;
use crate::config::ServerConfig;
use crate::error::{Result, RtspError};
use crate::hub::PublisherHub;
use crate::session::{ClientTable, Session};
use crate::transport::UdpTransport;
use crate::transport::tcp;

/// High-level RTSP server orchestrator.
///
/// Owns the [`ClientTable`] (shared between the TCP accept loop and the
/// [`PublisherHub`]), the fixed RTP/RTCP sockets, and the TCP listener
/// thread. A [`crate::producer::Producer`] is driven separately by the
/// caller and publishes frames through the [`PublisherHub`] returned by
/// [`Server::start`].
pub struct Server {
    clients: ClientTable,
    hub: Option<Arc<PublisherHub>>,
    running: Arc<AtomicBool>,
    bind_addr: String,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            clients: ClientTable::new(),
            hub: None,
            running: Arc::new(AtomicBool::new(false)),
            bind_addr: bind_addr.to_string(),
            config: Arc::new(config),
        }
    }

    /// Bind the fixed UDP ports and the TCP listener, then spawn the accept
    /// loop on a background thread. Returns the [`PublisherHub`] the caller
    /// should hand to a [`crate::producer::Producer`].
    pub fn start(&mut self) -> Result<Arc<PublisherHub>> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let udp = UdpTransport::bind()?;
        let hub = Arc::new(PublisherHub::new(
            self.clients.clone(),
            ParamSets::new(),
            Arc::new(udp.rtp),
        ));
        drop(udp.rtcp); // bound only for Transport-header conformance

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;

        self.running.store(true, Ordering::SeqCst);
        self.hub = Some(hub.clone());

        let clients = self.clients.clone();
        let h = hub.clone();
        let config = self.config.clone();
        let running = self.running.clone();

        tracing::info!(addr = %self.bind_addr, "RTSP server listening");

        thread::spawn(move || {
            tcp::accept_loop(listener, clients, h, config, running);
        });

        Ok(hub)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn hub(&self) -> Option<Arc<PublisherHub>> {
        self.hub.clone()
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    /// Snapshot of currently connected viewers (clients in the `Playing`
    /// state with a negotiated transport).
    pub fn get_viewers(&self) -> Vec<Viewer> {
        self.clients
            .snapshot()
            .iter()
            .filter(|s| s.is_playing())
            .filter_map(viewer_from_session)
            .collect()
    }
}

fn viewer_from_session(session: &Arc<Session>) -> Option<Viewer> {
    session.get_transport().map(|transport| Viewer {
        session_id: session.id.clone(),
        client_addr: transport.client_addr.to_string(),
        client_rtp_port: transport.client_rtp_port,
    })
}

/// Information about a connected viewer (client in PLAY state).
#[derive(Debug, Clone)]
pub struct Viewer {
    pub session_id: String,
    pub client_addr: String,
    pub client_rtp_port: u16,
}
