//! RTSP client sessions and the fixed-size client table (RFC 2326 §3, §12.37).
//!
//! A session is a server-side state object created during SETUP and
//! destroyed by TEARDOWN (or TCP disconnect). It tracks:
//!
//! - A unique session ID (8-hex-upper string, returned in the `Session`
//!   header — the reference firmware formats it as `%08X` of a random
//!   value; this crate keeps that wire format).
//! - The playback state: a monotonic `Init -> Ready -> Playing -> Teardown`.
//!   There is no PAUSE state (pause/seek is out of scope for this server).
//! - Transport parameters (client ports; server ports are the fixed pair
//!   bound once at server start, see [`crate::transport::udp`]).
//! - Its own H.264 packetizer, so each client gets an independent SSRC and
//!   sequence-number stream even though every client's timestamp advances
//!   in lockstep with the same encoded frames.
//!
//! Sessions live in a fixed-size [`ClientTable`] (capacity [`MAX_CLIENTS`]),
//! not an unbounded map — a device with one hardware encoder and limited
//! memory only ever serves a handful of simultaneous viewers.

pub mod transport;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use rand::RngExt;

use crate::media::h264::H264Packetizer;
pub use transport::Transport;

/// Maximum number of simultaneous client sessions (the reference firmware's
/// `MAX_CLIENTS`). A connection past this limit is closed immediately.
pub const MAX_CLIENTS: usize = 4;

/// RTSP session state machine. Strictly monotonic: a later variant can
/// only be reached from an earlier one, and `Teardown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Slot allocated at TCP accept, no SETUP received yet.
    Init,
    /// SETUP completed; transport negotiated, not yet playing.
    Ready,
    /// PLAY completed; media is being delivered.
    Playing,
    /// TEARDOWN received (or connection closing); terminal.
    Teardown,
}

/// A single RTSP client session (RFC 2326 §3).
///
/// Holds interior-mutable state so it can be shared (via `Arc`) between the
/// connection's request-handling thread and the Producer thread's fan-out.
pub struct Session {
    /// Unique session identifier, 8 uppercase hex digits.
    pub id: String,
    /// The RTSP URI this session was created for (from the SETUP request).
    pub uri: String,
    /// Transport parameters negotiated during SETUP (RFC 2326 §12.39).
    pub transport: RwLock<Option<Transport>>,
    state: RwLock<SessionState>,
    /// Whether this slot currently counts toward the fan-out and table
    /// capacity. Cleared on TEARDOWN/disconnect so the slot can be reused.
    pub active: AtomicBool,
    /// This client's own RTP packetizer: independent SSRC and sequence
    /// number, sharing the server-wide SPS/PPS cache for SDP/fmtp purposes.
    pub packetizer: Mutex<H264Packetizer>,
}

impl Session {
    /// Create a new session for `uri` with a fresh random 8-hex-upper ID
    /// and its own H.264 packetizer (random SSRC, per RFC 3550 §8.1).
    pub fn new(uri: &str, params: crate::bitstream::ParamSets) -> Self {
        let id = format!("{:08X}", rand::rng().random::<u32>());
        let packetizer = H264Packetizer::with_random_ssrc(96, params);
        Session {
            id,
            uri: uri.to_string(),
            transport: RwLock::new(None),
            state: RwLock::new(SessionState::Init),
            active: AtomicBool::new(true),
            packetizer: Mutex::new(packetizer),
        }
    }

    /// Set the transport parameters (called during SETUP).
    pub fn set_transport(&self, transport: Transport) {
        tracing::debug!(session_id = %self.id, client_addr = %transport.client_addr, "transport configured");
        *self.transport.write() = Some(transport);
    }

    /// Returns a clone of the transport parameters, if configured.
    pub fn get_transport(&self) -> Option<Transport> {
        self.transport.read().clone()
    }

    /// Returns the current playback state.
    pub fn get_state(&self) -> SessionState {
        *self.state.read()
    }

    /// Attempt a forward state transition. Returns `false` (no-op) if
    /// `new` is not strictly later than the current state, or if the
    /// session has already reached `Teardown`.
    pub fn try_transition(&self, new: SessionState) -> bool {
        let mut guard = self.state.write();
        if *guard == SessionState::Teardown || new <= *guard {
            return false;
        }
        tracing::debug!(session_id = %self.id, old_state = ?*guard, new_state = ?new, "state transition");
        *guard = new;
        true
    }

    /// Whether this session is actively receiving media.
    pub fn is_playing(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.get_state() == SessionState::Playing
    }

    /// Format the `Session` response header value per RFC 2326 §12.37 —
    /// the bare 8-hex-upper id, with no `;timeout=` suffix (the reference
    /// implementation does not advertise one, and the session's testable
    /// wire format is exactly 8 hex digits).
    pub fn session_header_value(&self) -> String {
        self.id.clone()
    }
}

/// Fixed-size table of client sessions (the reference firmware's
/// `client_t s_clients[MAX_CLIENTS]`, with slot reuse instead of a
/// per-process array of structs).
///
/// Both the Listener (which allocates a slot per accepted TCP connection)
/// and the Publisher Hub (which iterates active/playing slots to fan out
/// frames) share this table.
#[derive(Clone)]
pub struct ClientTable {
    slots: Arc<Mutex<[Option<Arc<Session>>; MAX_CLIENTS]>>,
}

impl ClientTable {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new([None, None, None, None])),
        }
    }

    /// Find a free (empty or inactive) slot and place `session` there.
    /// Returns `None` if the table is full — the caller should close the
    /// new connection immediately (§4.4).
    pub fn insert(&self, session: Arc<Session>) -> Option<usize> {
        let mut slots = self.slots.lock();
        for (i, slot) in slots.iter_mut().enumerate() {
            let free = match slot {
                None => true,
                Some(existing) => !existing.active.load(Ordering::SeqCst),
            };
            if free {
                *slot = Some(session);
                return Some(i);
            }
        }
        None
    }

    /// Look up a session by ID among active slots.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.slots
            .lock()
            .iter()
            .flatten()
            .find(|s| s.active.load(Ordering::SeqCst) && s.id == id)
            .cloned()
    }

    /// Mark the session with `id` inactive, freeing its slot for reuse.
    pub fn remove(&self, id: &str) {
        if let Some(session) = self.slots.lock().iter().flatten().find(|s| s.id == id) {
            session.active.store(false, Ordering::SeqCst);
        }
    }

    /// Snapshot of currently active sessions, for the Publisher Hub to
    /// iterate without holding the table lock across encoder/network calls.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.slots
            .lock()
            .iter()
            .flatten()
            .filter(|s| s.active.load(Ordering::SeqCst))
            .cloned()
            .collect()
    }
}

impl Default for ClientTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::ParamSets;

    #[test]
    fn state_transitions_are_monotonic() {
        let s = Session::new("/stream", ParamSets::new());
        assert!(s.try_transition(SessionState::Ready));
        assert!(!s.try_transition(SessionState::Ready)); // no self-transition
        assert!(s.try_transition(SessionState::Playing));
        assert!(!s.try_transition(SessionState::Ready)); // no backward
        assert!(s.try_transition(SessionState::Teardown));
        assert!(!s.try_transition(SessionState::Ready)); // terminal
    }

    #[test]
    fn table_reuses_inactive_slots() {
        let table = ClientTable::new();
        let mut ids = Vec::new();
        for _ in 0..MAX_CLIENTS {
            let s = Arc::new(Session::new("/stream", ParamSets::new()));
            ids.push(s.id.clone());
            assert!(table.insert(s).is_some());
        }

        let overflow = Arc::new(Session::new("/stream", ParamSets::new()));
        assert!(table.insert(overflow.clone()).is_none(), "table should be full");

        table.remove(&ids[0]);
        assert!(table.insert(overflow).is_some(), "freed slot should be reusable");
    }

    #[test]
    fn snapshot_excludes_inactive() {
        let table = ClientTable::new();
        let s = Arc::new(Session::new("/stream", ParamSets::new()));
        let id = s.id.clone();
        table.insert(s).unwrap();
        assert_eq!(table.snapshot().len(), 1);
        table.remove(&id);
        assert!(table.snapshot().is_empty());
    }
}
