// You can run this demo from the root of the repo:
// cargo run --example relay_server --features="relay"
//
// Two UDP ports: clients announce an 8-byte session id on the allocation
// port, peers send session-prefixed traffic on the relayed port, and this
// forwards it back to whichever client announced that id. Grounded on
// `bench/udp_relay_server.cpp`'s `relay_t`/`io_stats_t`; the relay's own
// mechanism lives in `ferrite::relay`, this binary only adds threading and
// the periodic packet/byte/error counters the library itself does not
// keep (§6: the core never timestamps completions).

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ferrite::net::Endpoint;
use ferrite::relay::{Relay, RelayEvent};
use ferrite::{Service, Worker};

const PRIME_RECEIVES_PER_PORT: usize = 32;
const WORKER_CAPACITY: usize = 128;
const PRINT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Stats {
    sessions: AtomicUsize,
    forwarded: AtomicUsize,
    unmatched: AtomicUsize,
    errors: AtomicUsize,
}

impl Stats {
    fn record(&self, event: RelayEvent) {
        match event {
            RelayEvent::SessionCreated(_) => {
                self.sessions.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::PeerForwarded(_) => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::PeerReceivedUnmatched => {
                self.unmatched.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::ForwardSettled { ok: false } | RelayEvent::ReceiveFailed => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            RelayEvent::ForwardSettled { ok: true } | RelayEvent::AllocationReceived => {}
        }
    }

    fn print(&self, last: &mut (usize, usize), elapsed: Duration) {
        let forwarded = self.forwarded.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64().max(1.0);
        println!(
            "sessions: {}  |  forwarded: {:.0}pps  |  unmatched: {}  |  errors: {:.0}/s",
            self.sessions.load(Ordering::Relaxed),
            (forwarded - last.0) as f64 / secs,
            self.unmatched.load(Ordering::Relaxed),
            (errors - last.1) as f64 / secs,
        );
        *last = (forwarded, errors);
    }
}

fn parse_endpoint(arg: Option<String>, default: &str) -> Endpoint {
    arg.unwrap_or_else(|| default.to_string())
        .parse()
        .expect("usage: relay_server [ALLOCATION_ADDR:PORT] [RELAYED_ADDR:PORT] [THREADS]")
}

fn main() -> io::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let allocation_endpoint = parse_endpoint(args.next(), "0.0.0.0:3478");
    let relayed_endpoint = parse_endpoint(args.next(), "0.0.0.0:3479");
    let thread_count: usize = args
        .next()
        .map(|s| s.parse().expect("THREADS must be a positive integer"))
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

    println!("allocation: {allocation_endpoint}");
    println!("relayed:    {relayed_endpoint}");
    println!("threads:    {thread_count}");

    let service = Service::new()?;
    let relay = Relay::bind(service.clone(), allocation_endpoint, relayed_endpoint, 10_000)?;
    relay.prime(PRIME_RECEIVES_PER_PORT);

    let stats = Arc::new(Stats::default());

    let mut workers = Vec::with_capacity(thread_count);
    for _ in 0..thread_count {
        let relay = relay.clone();
        let service = service.clone();
        let stats = stats.clone();
        workers.push(std::thread::spawn(move || {
            let mut worker = Worker::new(service, WORKER_CAPACITY, 32);
            loop {
                match relay.drive_one(&mut worker, Some(Duration::from_millis(200))) {
                    Ok(Some(event)) => stats.record(event),
                    Ok(None) => {}
                    Err(e) => eprintln!("relay worker error: {e}"),
                }
            }
        }));
    }

    let start = Instant::now();
    let mut last = (0usize, 0usize);
    loop {
        std::thread::sleep(PRINT_INTERVAL);
        stats.print(&mut last, start.elapsed());
    }
}
