#![cfg(all(feature = "os-poll", feature = "net"))]

// Socket scenarios from spec §8, driven purely through the public API:
// echo round-trip, a send that arrives before the receive was posted, a
// TCP accept whose `accepted_socket` is single-take, and a back-pressure
// cap delivering its overflow through the error queue.

use std::net::UdpSocket;
use std::time::Duration;

use ferrite::net::{
    AcceptResult, AsyncTcpListener, AsyncUdpSocket, BasicTcpListener, BasicUdpSocket, Endpoint,
    ReceiveFromResult,
};
use ferrite::{Service, Worker};

fn loopback(port: u16) -> Endpoint {
    format!("127.0.0.1:{port}").parse().unwrap()
}

#[test]
fn echo_round_trip_reports_length_and_peer() {
    let service = Service::new().expect("service");
    let socket =
        AsyncUdpSocket::open(service.clone(), BasicUdpSocket::bind(loopback(0)).expect("bind"), 4, 4)
            .expect("open");
    let local = socket.local_endpoint().expect("local endpoint");

    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer bind");
    let peer_addr = peer.local_addr().expect("peer addr");

    socket.start_receive_from(service.make_io());
    peer.send_to(b"hello", local.to_socket_addr()).expect("send");

    let mut worker = Worker::new(service.clone(), 16, 4);
    let io = worker
        .wait_for(Some(Duration::from_secs(2)))
        .expect("wait_for")
        .expect("a completion arrived");
    let ReceiveFromResult { transferred, remote } =
        io.result_of::<ReceiveFromResult>().expect("receive result");
    assert_eq!(transferred, 5);
    assert_eq!(remote.port(), peer_addr.port());
}

#[test]
fn pre_arrival_send_completes_without_polling() {
    let service = Service::new().expect("service");
    let socket =
        AsyncUdpSocket::open(service.clone(), BasicUdpSocket::bind(loopback(0)).expect("bind"), 4, 4)
            .expect("open");
    let local = socket.local_endpoint().expect("local endpoint");

    let peer = UdpSocket::bind("127.0.0.1:0").expect("peer bind");
    peer.send_to(b"hello", local.to_socket_addr()).expect("send");
    // Give the datagram a moment to land in the receive buffer before any
    // `start_receive_from` is posted at all.
    std::thread::sleep(Duration::from_millis(50));

    socket.start_receive_from(service.make_io());

    let mut worker = Worker::new(service, 16, 4);
    let io = worker.try_get().expect("completion ready synchronously, no poll needed");
    let result = io.result_of::<ReceiveFromResult>().expect("receive result");
    assert_eq!(result.transferred, 5);
}

#[test]
fn tcp_accepted_socket_is_single_take() {
    let service = Service::new().expect("service");
    let listener_socket = BasicTcpListener::bind(loopback(0)).expect("bind");
    let local = listener_socket.local_endpoint().expect("local endpoint");
    let listener = AsyncTcpListener::open(service.clone(), listener_socket).expect("open listener");

    listener.start_accept(service.make_io());
    let client = std::net::TcpStream::connect(local.to_socket_addr()).expect("connect");
    let client_local = client.local_addr().expect("client local addr");

    let mut worker = Worker::new(service, 16, 4);
    let io = worker
        .wait_for(Some(Duration::from_secs(2)))
        .expect("wait_for")
        .expect("accept completed");
    let result = io.result_of::<AcceptResult>().expect("accept result");
    assert_eq!(result.remote.port(), client_local.port());

    let accepted = result.accepted_socket(&io).expect("first take succeeds");
    assert_eq!(
        accepted.local_endpoint().expect("accepted local endpoint").port(),
        local.port()
    );

    let second = result.accepted_socket(&io);
    assert!(second.is_err(), "a second take on the same io must fail");
}

#[test]
fn back_pressure_cap_routes_overflow_through_error_queue() {
    let service = Service::new().expect("service");
    let socket =
        AsyncUdpSocket::open(service.clone(), BasicUdpSocket::bind(loopback(0)).expect("bind"), 1, 1)
            .expect("open");

    socket.start_receive_from(service.make_io());
    socket.start_receive_from(service.make_io());

    let rejected = service
        .dequeue_error()
        .expect("second receive rejected by the outstanding-receive cap");
    let status = unsafe { rejected.as_ref() }.status();
    assert_ne!(status, 0, "a would-block rejection must carry a nonzero status");
}
