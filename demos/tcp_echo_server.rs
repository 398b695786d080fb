// You can run this demo from the root of the repo:
// cargo run --example tcp_echo_server --features="os-poll net"
//
// Accepts connections and echoes back whatever each one sends, using the
// async TCP listener/stream wrappers and a single worker drain loop.

use std::io;
use std::sync::Arc;

use ferrite::net::{AsyncTcpListener, AsyncTcpStream, BasicTcpListener, Endpoint};
use ferrite::{Service, Worker};

const OUTSTANDING: usize = 4;
const OUTSTANDING_ACCEPTS: usize = 4;

// Tags an `Io` by what kind of operation produced it, the same way
// `ferrite::relay` tags its own receives/sends, so the one worker loop
// below can route a completion without tracking its own token table.
struct Accept;
struct Receive(Arc<AsyncTcpStream>);
struct Send(Arc<AsyncTcpStream>);

fn main() -> io::Result<()> {
    env_logger::init();

    let addr: Endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:13265".to_string())
        .parse()
        .expect("usage: tcp_echo_server [ADDR:PORT]");

    let service = Service::new()?;
    let listener = AsyncTcpListener::open(service.clone(), BasicTcpListener::bind(addr)?)?;

    println!("You can connect to the server using `nc`:");
    println!(" $ nc {}", listener.local_endpoint()?);
    println!("You'll see our welcome message and anything you type will be echoed back.");

    for _ in 0..OUTSTANDING_ACCEPTS {
        let io = service.make_io();
        io.set_context(Box::into_raw(Box::new(Accept)));
        listener.start_accept(io);
    }

    let mut worker = Worker::new(service.clone(), 128, 32);
    loop {
        let io = match worker.wait_for(None)? {
            Some(io) => io,
            None => continue,
        };

        if let Some(tag) = io.context::<Accept>() {
            drop(unsafe { Box::from_raw(tag) });
            handle_accept(&service, &listener, io);
            continue;
        }

        if let Some(tag) = io.context::<Receive>() {
            let stream = unsafe { Box::from_raw(tag) }.0;
            handle_receive(io, stream);
            continue;
        }

        if let Some(tag) = io.context::<Send>() {
            let stream = unsafe { Box::from_raw(tag) }.0;
            handle_send(io, stream);
            continue;
        }

        eprintln!("completion with no recognized role, dropping it");
    }
}

fn handle_accept(service: &Arc<Service>, listener: &Arc<AsyncTcpListener>, io: ferrite::io::IoHandle) {
    use ferrite::net::AcceptResult;

    match io.result_of::<AcceptResult>() {
        Ok(result) => {
            println!("Accepted connection from: {}", result.remote);
            match result.accepted_socket(&io) {
                Ok(socket) => match AsyncTcpStream::open(service.clone(), socket, OUTSTANDING, OUTSTANDING) {
                    Ok(stream) => {
                        for _ in 0..OUTSTANDING {
                            let io = service.make_io();
                            io.set_context(Box::into_raw(Box::new(Receive(stream.clone()))));
                            stream.start_receive(io);
                        }
                    }
                    Err(e) => eprintln!("failed to associate accepted socket: {e}"),
                },
                Err(e) => eprintln!("accepted_socket failed: {e}"),
            }
        }
        Err(e) => eprintln!("accept failed: {e}"),
    }

    // Keep the accept pool topped up regardless of outcome.
    let retry = io;
    retry.reset_buffer();
    retry.set_context(Box::into_raw(Box::new(Accept)));
    listener.start_accept(retry);
}

fn handle_receive(io: ferrite::io::IoHandle, stream: Arc<AsyncTcpStream>) {
    match io.result_of::<usize>() {
        Ok(0) => {
            // Peer closed its side; this demo has no connection teardown
            // path (see `DESIGN.md`), so the block is simply dropped
            // rather than recycled into another receive.
        }
        Ok(transferred) => {
            io.set_buffer_window(0, transferred);
            io.set_context(Box::into_raw(Box::new(Send(stream.clone()))));
            stream.start_send(io);
        }
        Err(e) => eprintln!("receive failed: {e}"),
    }
}

fn handle_send(io: ferrite::io::IoHandle, stream: Arc<AsyncTcpStream>) {
    if let Err(e) = io.result_of::<usize>() {
        eprintln!("send failed: {e}");
    }
    io.reset_buffer();
    io.set_context(Box::into_raw(Box::new(Receive(stream.clone()))));
    stream.start_receive(io);
}
