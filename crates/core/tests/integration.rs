//! Integration test: full RTSP handshake OPTIONS → DESCRIBE → SETUP → PLAY →
//! TEARDOWN, plus the out-of-order-method and client-table-capacity
//! behaviors called out as testable properties.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use camstream::Server;

// `Server::start` binds a single fixed RTP/RTCP UDP port pair regardless of
// the TCP bind address (§4.4 — one shared hardware UDP endpoint), so any two
// servers started concurrently in this process collide. cargo runs `#[test]`
// functions on separate threads by default; serialize them here so each
// test's server fully owns the UDP ports while it runs.
static SERVER_LOCK: Mutex<()> = Mutex::new(());

fn rtsp_request(stream: &mut TcpStream, request: &str) -> std::io::Result<String> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        response.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    if let Some(len) = response
        .lines()
        .find(|l| l.to_lowercase().starts_with("content-length:"))
        .and_then(|l| l.split(':').nth(1))
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        if len > 0 {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;
            response.push_str(&String::from_utf8_lossy(&body));
        }
    }

    Ok(response)
}

fn connect(bind: &str) -> TcpStream {
    let addr = bind.to_socket_addrs().unwrap().next().unwrap();
    let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2)).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
        .set_write_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

#[test]
fn full_handshake_options_describe_setup_play_teardown() {
    let _guard = SERVER_LOCK.lock().unwrap();
    const BIND: &str = "127.0.0.1:18554";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let base_uri = "rtsp://127.0.0.1:18554/stream".to_string();

    let opt_req = format!("OPTIONS {} RTSP/1.0\r\nCSeq: 1\r\n\r\n", base_uri);
    let opt_resp = rtsp_request(&mut stream, &opt_req).expect("OPTIONS response");
    assert!(
        opt_resp.starts_with("RTSP/1.0 200 OK\r\nCSeq: 1\r\n"),
        "CSeq must immediately follow the status line, got: {:?}",
        opt_resp
    );
    assert_eq!(
        opt_resp
            .lines()
            .find(|l| l.starts_with("Public:"))
            .unwrap()
            .trim(),
        "Public: OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN",
        "Public header must list exactly the five supported methods"
    );

    let desc_req = format!(
        "DESCRIBE {} RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n\r\n",
        base_uri
    );
    let desc_resp = rtsp_request(&mut stream, &desc_req).expect("DESCRIBE response");
    assert!(desc_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(desc_resp.contains("Content-Type: application/sdp"));
    assert!(desc_resp.contains("c=IN IP4 0.0.0.0\r\n"));
    assert!(desc_resp.contains("m=video 5004 RTP/AVP 96\r\n"));
    assert!(desc_resp.contains("a=rtpmap:96 H264/90000\r\n"));
    assert!(desc_resp.contains("a=control:track0\r\n"));

    let setup_req = format!(
        "SETUP {}/track0 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=5000-5001\r\n\r\n",
        base_uri
    );
    let setup_resp = rtsp_request(&mut stream, &setup_req).expect("SETUP response");
    assert!(setup_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(setup_resp.contains("server_port=5004-5005"));

    let session_line = setup_resp
        .lines()
        .find(|l| l.to_lowercase().starts_with("session:"))
        .expect("Session header");
    let session_id = session_line.split(':').nth(1).unwrap().trim();
    assert_eq!(
        session_id.len(),
        8,
        "Session header must be exactly 8 hex digits, got {:?}",
        session_id
    );
    assert!(session_id.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(
        !session_line.contains(';'),
        "Session header must not carry a timeout suffix"
    );

    let play_req = format!(
        "PLAY {} RTSP/1.0\r\nCSeq: 4\r\nSession: {}\r\n\r\n",
        base_uri, session_id
    );
    let play_resp = rtsp_request(&mut stream, &play_req).expect("PLAY response");
    assert!(play_resp.starts_with("RTSP/1.0 200 OK"));
    assert!(play_resp.contains("RTP-Info:"));

    let teardown_req = format!(
        "TEARDOWN {} RTSP/1.0\r\nCSeq: 5\r\nSession: {}\r\n\r\n",
        base_uri, session_id
    );
    let teardown_resp = rtsp_request(&mut stream, &teardown_req).expect("TEARDOWN response");
    assert!(teardown_resp.starts_with("RTSP/1.0 200 OK"));

    server.stop();
    // Give the background accept-loop thread time to observe the
    // stop flag and release the fixed UDP RTP/RTCP ports (it polls at a
    // 50ms interval) before the next serialized test tries to bind them.
    std::thread::sleep(Duration::from_millis(150));
}

#[test]
fn play_before_setup_is_rejected() {
    let _guard = SERVER_LOCK.lock().unwrap();
    const BIND: &str = "127.0.0.1:18555";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    let mut stream = connect(BIND);
    let play_req = "PLAY rtsp://127.0.0.1:18555/stream RTSP/1.0\r\nCSeq: 1\r\n\r\n";
    let resp = rtsp_request(&mut stream, play_req).expect("PLAY response");
    assert!(
        resp.starts_with("RTSP/1.0 455"),
        "PLAY before SETUP must be rejected with 455, got: {}",
        resp.lines().next().unwrap_or("")
    );

    server.stop();
    // Give the background accept-loop thread time to observe the
    // stop flag and release the fixed UDP RTP/RTCP ports (it polls at a
    // 50ms interval) before the next serialized test tries to bind them.
    std::thread::sleep(Duration::from_millis(150));
}

#[test]
fn fifth_connection_is_refused_when_table_is_full() {
    let _guard = SERVER_LOCK.lock().unwrap();
    const BIND: &str = "127.0.0.1:18556";
    let mut server = Server::new(BIND);
    server.start().expect("server start");

    // MAX_CLIENTS is 4 — hold four connections open, then a fifth must be
    // closed immediately rather than queued.
    let mut held = Vec::new();
    for _ in 0..4 {
        held.push(connect(BIND));
    }

    let mut fifth = connect(BIND);
    let opt_req = "OPTIONS rtsp://127.0.0.1:18556/stream RTSP/1.0\r\nCSeq: 1\r\n\r\n";
    // The server closes the socket without writing a response; a zero-byte
    // read (or a write/read error) signals that closure.
    let result = rtsp_request(&mut fifth, opt_req);
    let refused = match result {
        Ok(resp) => resp.is_empty(),
        Err(_) => true,
    };
    assert!(refused, "fifth connection should be closed, not served");

    server.stop();
    // Give the background accept-loop thread time to observe the
    // stop flag and release the fixed UDP RTP/RTCP ports (it polls at a
    // 50ms interval) before the next serialized test tries to bind them.
    std::thread::sleep(Duration::from_millis(150));
}
