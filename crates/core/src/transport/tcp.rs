use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::hub::PublisherHub;
use crate::protocol::MethodHandler;
use crate::protocol::RtspRequest;
use crate::protocol::response::RtspResponse;
use crate::session::{ClientTable, Session};

/// Non-blocking TCP accept loop.
///
/// A slot in the [`ClientTable`] is claimed here, at accept time, not in
/// the SETUP handler — mirroring the reference firmware's one `client_t`
/// per accepted socket. If the table is full the new connection is closed
/// immediately (§4.4) rather than queued.
pub fn accept_loop(
    listener: TcpListener,
    clients: ClientTable,
    hub: Arc<PublisherHub>,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }

                let session = Arc::new(Session::new("", hub.params().clone()));
                if clients.insert(session.clone()).is_none() {
                    tracing::warn!(%peer_addr, "client table full, rejecting connection");
                    drop(stream);
                    continue;
                }

                let c = clients.clone();
                let h = hub.clone();
                let cfg = config.clone();
                let r = running.clone();
                thread::spawn(move || {
                    Connection::handle(stream, peer_addr, session, c, h, cfg, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single RTSP client connection with its own lifecycle, bound 1:1 to
/// one [`Session`] for the life of the TCP socket.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    handler: MethodHandler,
    peer_addr: SocketAddr,
    session: Arc<Session>,
    clients: ClientTable,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    fn handle(
        stream: TcpStream,
        peer_addr: SocketAddr,
        session: Arc<Session>,
        clients: ClientTable,
        hub: Arc<PublisherHub>,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        tracing::info!(%peer_addr, session_id = %session.id, "client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => {
                clients.remove(&session.id);
                return;
            }
        };

        let handler = MethodHandler::new(session.clone(), hub, peer_addr, config);

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer: stream,
            handler,
            peer_addr,
            session,
            clients,
        };

        let reason = conn.run(&running);
        conn.cleanup();

        tracing::info!(peer = %peer_addr, reason, "client disconnected");
    }

    /// RTSP request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let mut request_text = String::new();
            loop {
                let mut line = String::new();
                match self.reader.read_line(&mut line) {
                    Ok(0) => return "connection closed by client",
                    Ok(_) => {
                        request_text.push_str(&line);
                        if line == "\r\n" || line == "\n" {
                            break;
                        }
                    }
                    Err(_) => return "read error",
                }
            }

            if request_text.trim().is_empty() {
                continue;
            }

            match RtspRequest::parse(&request_text) {
                Ok(request) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method,
                        uri = %request.uri,
                        version = %request.version,
                        "request"
                    );

                    let response = self.handler.handle(&request);

                    tracing::debug!(
                        peer = %self.peer_addr,
                        status = response.status_code,
                        "response"
                    );

                    if self
                        .writer
                        .write_all(response.serialize().as_bytes())
                        .is_err()
                    {
                        return "write error";
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                    let response = RtspResponse::bad_request().add_header("CSeq", "0");
                    if self
                        .writer
                        .write_all(response.serialize().as_bytes())
                        .is_err()
                    {
                        return "write error";
                    }
                }
            }
        }

        "server shutting down"
    }

    /// Free this connection's client-table slot on disconnect.
    fn cleanup(&self) {
        self.session.active.store(false, Ordering::SeqCst);
        self.clients.remove(&self.session.id);
    }
}
