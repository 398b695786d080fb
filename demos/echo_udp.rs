// You can run this demo from the root of the repo:
// cargo run --example echo_udp --features="os-poll net"
//
// Echoes every datagram it receives back to whoever sent it, using the
// async UDP socket and worker drain loop instead of blocking `recv_from`.

use std::io;
use std::sync::Arc;

use ferrite::net::{AsyncUdpSocket, BasicUdpSocket, Endpoint, ReceiveFromResult, SendToResult};
use ferrite::{Service, Worker};

// How many receives we keep outstanding at once; more than one lets the
// worker drain a burst of datagrams without round-tripping through the OS
// for each one individually.
const OUTSTANDING: usize = 16;

fn prime_receives(socket: &Arc<AsyncUdpSocket>, service: &Arc<Service>) {
    for _ in 0..OUTSTANDING {
        socket.start_receive_from(service.make_io());
    }
}

fn main() -> io::Result<()> {
    env_logger::init();

    let addr: Endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9000".to_string())
        .parse()
        .expect("usage: echo_udp [ADDR:PORT]");

    let service = Service::new()?;
    let socket = AsyncUdpSocket::open(service.clone(), BasicUdpSocket::bind(addr)?, OUTSTANDING, OUTSTANDING)?;

    println!("You can connect to the server using `nc`:");
    println!(" $ nc -u {}", socket.local_endpoint()?);
    println!("Anything you type will be echoed back to you.");

    prime_receives(&socket, &service);

    let mut worker = Worker::new(service, 128, 32);
    loop {
        let io = match worker.wait_for(None)? {
            Some(io) => io,
            None => continue,
        };

        if let Ok(ReceiveFromResult { transferred, remote }) = io.result_of::<ReceiveFromResult>() {
            println!("Got packet ({transferred} bytes) from '{remote}'.");
            io.set_buffer_window(0, transferred);
            socket.start_send_to(io, remote);
            continue;
        }

        if let Ok(SendToResult { .. }) = io.result_of::<SendToResult>() {
            // A send completed; recycle its block into a fresh receive.
            io.reset_buffer();
            socket.start_receive_from(io);
            continue;
        }

        // Neither a receive nor a send succeeded — log and recycle into a
        // receive regardless, so the outstanding pool never runs dry.
        eprintln!("operation failed with status {}", io.status());
        io.reset_buffer();
        socket.start_receive_from(io);
    }
}
