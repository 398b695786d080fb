//! UDP relay scaffolding (§4.7 / C8): an "allocation" port that learns
//! client-chosen session ids, a "relayed" port that forwards peer traffic
//! keyed by the same id, and the session map tying the two together.
//!
//! Grounded on `bench/udp_relay_server.cpp`'s `relay_t`: two sockets sharing
//! one [`Service`], a pool of outstanding receives kept topped up on each
//! port, and a mutex-guarded session map. Simplified from that file in one
//! respect: the session map here stores the client's [`Endpoint`] rather
//! than a dedicated, connected socket per session. The bench's per-session
//! socket exists so replies can be sent without re-specifying the remote
//! address; since every async socket in this crate has no close/deregister
//! path (see `DESIGN.md`), one socket per session would leak a registration
//! for the life of the process. `start_send_to` already takes a remote
//! endpoint per call, so the relayed port's own socket can serve every
//! session, matching the simpler mapping spec.md's glossary describes
//! ("session id to remote endpoint") rather than the bench's heavier one.
//!
//! An `Io`'s role (which port it was submitted against, and as what kind of
//! operation) is tracked with [`Io::set_context`]/[`Io::context`] tagged by
//! a zero-sized marker type, rather than by inspecting which socket raised
//! the completion the way the bench does with `socket_context<socket_t>()`
//! — this crate's `Io::context` already exists for exactly this purpose
//! (§4.2: "a caller context is stored verbatim alongside the operation").

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use crate::io::IoHandle;
use crate::net::{AsyncUdpSocket, BasicUdpSocket, Endpoint, ReceiveFromResult};
use crate::service::Service;
use crate::worker::Worker;

/// An 8-byte, client-chosen identifier keying the session map, matching
/// spec.md's glossary entry for "session id".
pub type SessionId = u64;

/// Tag for an `Io` submitted as a receive on the allocation port.
struct ClientReceive;
/// Tag for an `Io` submitted as a receive on the relayed port.
struct PeerReceive;
/// Tag for an `Io` submitted as a forwarding send on the relayed port.
struct PeerSend;

/// What a single completed or failed `Io` turned out to be, returned by
/// [`Relay::route`] so a caller (typically a demo binary) can maintain its
/// own counters without this module hard-coding any particular metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    /// A datagram arrived on the allocation port and was not a fresh session
    /// announcement (already known, too short, or a read error).
    AllocationReceived,
    /// A datagram arrived on the allocation port whose 8 bytes established a
    /// new session.
    SessionCreated(SessionId),
    /// A datagram arrived on the relayed port with no matching session; the
    /// buffer was recycled without being forwarded.
    PeerReceivedUnmatched,
    /// A datagram arrived on the relayed port matching a known session and
    /// was submitted for forwarding.
    PeerForwarded(SessionId),
    /// A previously submitted forward either completed or failed; the
    /// buffer has been recycled into a new peer receive either way.
    ForwardSettled { ok: bool },
    /// A receive on either port failed; the buffer was recycled regardless.
    ReceiveFailed,
}

/// Two UDP ports and the session map between them (§4.7 / C8).
pub struct Relay {
    service: Arc<Service>,
    client: Arc<AsyncUdpSocket>,
    peer: Arc<AsyncUdpSocket>,
    sessions: Mutex<HashMap<SessionId, Endpoint>>,
}

impl Relay {
    /// Bind the allocation and relayed endpoints and associate both with
    /// `service`. `max_outstanding` bounds how many receives/sends either
    /// socket may have in flight at once (§4.5); pass a generous value —
    /// this relay never synchronously rejects a submit, it only ever delays
    /// one past the cap onto the error queue.
    pub fn bind(
        service: Arc<Service>,
        allocation_endpoint: Endpoint,
        relayed_endpoint: Endpoint,
        max_outstanding: usize,
    ) -> io::Result<Arc<Self>> {
        let client = AsyncUdpSocket::open(
            service.clone(),
            BasicUdpSocket::bind(allocation_endpoint)?,
            max_outstanding,
            max_outstanding,
        )?;
        let peer = AsyncUdpSocket::open(
            service.clone(),
            BasicUdpSocket::bind(relayed_endpoint)?,
            max_outstanding,
            max_outstanding,
        )?;
        Ok(Arc::new(Self {
            service,
            client,
            peer,
            sessions: Mutex::new(HashMap::new()),
        }))
    }

    pub fn allocation_endpoint(&self) -> io::Result<Endpoint> {
        self.client.local_endpoint()
    }

    pub fn relayed_endpoint(&self) -> io::Result<Endpoint> {
        self.peer.local_endpoint()
    }

    /// Number of sessions learned so far.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Submit `count` outstanding receives on each port. Call once, before
    /// any worker starts draining, to seed the continuous-receive pool the
    /// bench's `relay_t::start` keeps up with `receives_per_thread`.
    pub fn prime(self: &Arc<Self>, count: usize) {
        for _ in 0..count {
            self.submit_client_receive();
            self.submit_peer_receive();
        }
    }

    fn submit_client_receive(self: &Arc<Self>) {
        let io = self.service.make_io();
        io.set_context::<ClientReceive>(std::ptr::null_mut());
        self.client.start_receive_from(io);
    }

    fn submit_peer_receive(self: &Arc<Self>) {
        let io = self.service.make_io();
        io.set_context::<PeerReceive>(std::ptr::null_mut());
        self.peer.start_receive_from(io);
    }

    /// Pop and route whatever a worker's completion queue and this relay's
    /// two sockets' error queues hold right now, without ever blocking.
    /// Returns the number of `Io` blocks routed.
    pub fn drain(self: &Arc<Self>, worker: &mut Worker, on_event: &mut dyn FnMut(RelayEvent)) -> usize {
        let mut routed = 0;
        while let Some(io) = worker.poll() {
            on_event(self.route(io));
            routed += 1;
        }
        while let Some(ptr) = self.service.dequeue_error() {
            let io = unsafe { IoHandle::from_raw(ptr, self.service.pool().clone()) };
            on_event(self.route(io));
            routed += 1;
        }
        routed
    }

    /// Block on `worker` for at least one completion (or error-queue entry,
    /// checked first), then route it. Intended to be called in a loop from
    /// a thread dedicated to this relay, mirroring the bench's one-thread-
    /// per-worker `handle_completions`.
    pub fn drive_one(
        self: &Arc<Self>,
        worker: &mut Worker,
        timeout: Option<std::time::Duration>,
    ) -> io::Result<Option<RelayEvent>> {
        if let Some(ptr) = self.service.dequeue_error() {
            let io = unsafe { IoHandle::from_raw(ptr, self.service.pool().clone()) };
            return Ok(Some(self.route(io)));
        }
        Ok(worker.wait_for(timeout)?.map(|io| self.route(io)))
    }

    /// Dispatch one `Io`, whichever port and operation kind it was
    /// submitted as, and recycle it into a fresh submission.
    fn route(self: &Arc<Self>, io: IoHandle) -> RelayEvent {
        if io.context::<ClientReceive>().is_some() {
            self.on_client_receive(io)
        } else if io.context::<PeerReceive>().is_some() {
            self.on_peer_receive(io)
        } else if io.context::<PeerSend>().is_some() {
            self.on_peer_send_settled(io)
        } else {
            log::error!("relay: Io completed with no recognized role, dropping it");
            RelayEvent::ReceiveFailed
        }
    }

    fn on_client_receive(self: &Arc<Self>, io: IoHandle) -> RelayEvent {
        let event = match io.result_of::<ReceiveFromResult>() {
            Ok(ReceiveFromResult { transferred, remote }) if transferred == std::mem::size_of::<SessionId>() => {
                let id = session_id_from(io.buffer());
                self.sessions.lock().unwrap().insert(id, remote);
                // A new session means the relayed port now has one more
                // client to hear from; keep its receive pool growing to
                // match, as the bench does in `on_client_receive`.
                self.submit_peer_receive();
                RelayEvent::SessionCreated(id)
            }
            Ok(_) => RelayEvent::AllocationReceived,
            Err(e) => {
                log::debug!("relay: allocation port receive failed: {e}");
                RelayEvent::ReceiveFailed
            }
        };
        io.reset_buffer();
        self.client.start_receive_from(io);
        event
    }

    fn on_peer_receive(self: &Arc<Self>, io: IoHandle) -> RelayEvent {
        let forward_to = match io.result_of::<ReceiveFromResult>() {
            Ok(ReceiveFromResult { transferred, .. }) if transferred >= std::mem::size_of::<SessionId>() => {
                let id = session_id_from(io.buffer());
                self.sessions.lock().unwrap().get(&id).map(|endpoint| (id, *endpoint, transferred))
            }
            Ok(_) => None,
            Err(e) => {
                log::debug!("relay: relayed port receive failed: {e}");
                None
            }
        };

        match forward_to {
            Some((id, remote, transferred)) => {
                io.set_buffer_window(0, transferred);
                io.set_context::<PeerSend>(std::ptr::null_mut());
                self.peer.start_send_to(io, remote);
                RelayEvent::PeerForwarded(id)
            }
            None => {
                io.reset_buffer();
                self.peer.start_receive_from(io);
                RelayEvent::PeerReceivedUnmatched
            }
        }
    }

    fn on_peer_send_settled(self: &Arc<Self>, io: IoHandle) -> RelayEvent {
        let ok = io.status() == 0;
        io.reset_buffer();
        io.set_context::<PeerReceive>(std::ptr::null_mut());
        self.peer.start_receive_from(io);
        RelayEvent::ForwardSettled { ok }
    }
}

/// Reinterpret the first 8 bytes of `buf` as a session id, matching the
/// bench's `reinterpret_cast<const session_map::key_type *>(io->data())` —
/// native byte order, not a wire-format conversion, since both ends of a
/// session are expected to be the same process's `u64` representation.
fn session_id_from(buf: &[u8]) -> SessionId {
    let mut bytes = [0u8; std::mem::size_of::<SessionId>()];
    bytes.copy_from_slice(&buf[..std::mem::size_of::<SessionId>()]);
    SessionId::from_ne_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Address, Protocol};

    fn loopback(port: u16) -> Endpoint {
        Endpoint::new(Address::V4(std::net::Ipv4Addr::LOCALHOST), port, Protocol::Udp)
    }

    #[test]
    fn session_id_round_trips_native_endian() {
        let id: SessionId = 0x0123_4567_89AB_CDEF;
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&id.to_ne_bytes());
        assert_eq!(session_id_from(&buf), id);
    }

    #[test]
    fn bind_picks_ephemeral_ports_and_starts_with_no_sessions() {
        let service = Service::new().expect("service");
        let relay = Relay::bind(service, loopback(0), loopback(0), 64).expect("bind");
        assert_eq!(relay.session_count(), 0);
        assert_ne!(relay.allocation_endpoint().unwrap().port(), 0);
        assert_ne!(relay.relayed_endpoint().unwrap().port(), 0);
    }

    #[test]
    fn end_to_end_session_and_forward() {
        let service = Service::new().expect("service");
        let relay = Relay::bind(service, loopback(0), loopback(0), 64).expect("bind");
        relay.prime(4);

        let mut worker = Worker::new(relay.service.clone(), 32, 8);

        let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let alloc_addr = relay.allocation_endpoint().unwrap().to_socket_addr();
        let relayed_addr = relay.relayed_endpoint().unwrap().to_socket_addr();

        let session_id: SessionId = rand::random();
        client.send_to(&session_id.to_ne_bytes(), alloc_addr).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut saw_session = false;
        while std::time::Instant::now() < deadline && !saw_session {
            if let Ok(Some(event)) = relay.drive_one(&mut worker, Some(std::time::Duration::from_millis(50))) {
                if matches!(event, RelayEvent::SessionCreated(id) if id == session_id) {
                    saw_session = true;
                }
            }
        }
        assert!(saw_session, "allocation datagram never produced a session");
        assert_eq!(relay.session_count(), 1);

        let mut peer_payload = session_id.to_ne_bytes().to_vec();
        peer_payload.extend_from_slice(b"hello");
        let peer = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(&peer_payload, relayed_addr).unwrap();

        client.set_read_timeout(Some(std::time::Duration::from_millis(50))).unwrap();
        let mut buf = [0u8; 64];
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if let Ok(Some(_)) = relay.drive_one(&mut worker, Some(std::time::Duration::from_millis(10))) {
                // keep draining while we race the client's recv below
            }
            if std::time::Instant::now() >= deadline {
                break;
            }
            match client.recv_from(&mut buf) {
                Ok((n, _)) => {
                    assert_eq!(&buf[..n], &peer_payload[..]);
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => panic!("unexpected recv error: {e}"),
            }
        }
        panic!("forwarded datagram never arrived at the client");
    }
}
