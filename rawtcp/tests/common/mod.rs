//! An in-process network connecting two TCP endpoints.
#![allow(dead_code)]
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use rawtcp::layer::ip::Network;
use rawtcp::layer::tcp::{Config, Connection, Endpoint};
use rawtcp::wire::{IpProtocol, Ipv4Address, TcpChecksum, TcpRepr, TcpSegment};

pub const CLIENT: Ipv4Address = Ipv4Address([10, 0, 0, 1]);
pub const SERVER: Ipv4Address = Ipv4Address([10, 0, 0, 2]);

/// Decides whether a segment is lost on the wire.
type Filter = Box<dyn FnMut(&TcpRepr) -> bool + Send>;

/// One direction of the wire, as seen by the sending endpoint.
pub struct FakeNetwork {
    local: Ipv4Address,
    queue: Mutex<Sender<Vec<u8>>>,
    sent: Mutex<Vec<TcpSegment>>,
    held: Mutex<bool>,
    opened: Condvar,
    filter: Mutex<Option<Filter>>,
}

pub struct Pair {
    pub client: Endpoint,
    pub server: Endpoint,
    /// Carries everything the client sends.
    pub client_net: Arc<FakeNetwork>,
    /// Carries everything the server sends.
    pub server_net: Arc<FakeNetwork>,
}

/// Short timers so that closing does not take ages.
pub fn fast_config() -> Config {
    Config {
        msl: Duration::from_millis(10),
        rto: Duration::from_millis(200),
        tick: Duration::from_millis(10),
        handshake_timeout: Some(Duration::from_secs(5)),
        .. Config::default()
    }
}

pub fn pair(config: Config) -> Pair {
    let (client_tx, client_rx) = mpsc::channel();
    let (server_tx, server_rx) = mpsc::channel();
    let client_net = Arc::new(FakeNetwork::new(CLIENT, client_tx));
    let server_net = Arc::new(FakeNetwork::new(SERVER, server_tx));

    let client = Endpoint::new(client_net.clone(), config.clone());
    let server = Endpoint::new(server_net.clone(), config);

    pump(client_rx, client_net.clone(), server.clone());
    pump(server_rx, server_net.clone(), client.clone());

    Pair { client, server, client_net, server_net }
}

impl Pair {
    /// Dial from the client and accept on the server.
    pub fn connect(&self, port: u16) -> (Connection, Connection) {
        let mut listener = self.server.listen("0.0.0.0", port).unwrap();
        let accept = thread::spawn(move || listener.accept().unwrap());
        let client = self.client.dial(&SERVER.to_string(), port).unwrap();
        let server = accept.join().unwrap();
        (client, server)
    }
}

impl FakeNetwork {
    fn new(local: Ipv4Address, queue: Sender<Vec<u8>>) -> Self {
        FakeNetwork {
            local,
            queue: Mutex::new(queue),
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(false),
            opened: Condvar::new(),
            filter: Mutex::new(None),
        }
    }

    /// Stop delivering, queueing everything sent from now on.
    pub fn hold(&self) {
        *self.held.lock().unwrap() = true;
    }

    /// Deliver everything queued and continue delivering.
    pub fn open(&self) {
        *self.held.lock().unwrap() = false;
        self.opened.notify_all();
    }

    /// Lose every segment for which the filter returns `true`.
    pub fn set_filter<F>(&self, filter: F)
        where F: FnMut(&TcpRepr) -> bool + Send + 'static
    {
        *self.filter.lock().unwrap() = Some(Box::new(filter));
    }

    /// All segments sent so far, including lost ones.
    pub fn sent(&self) -> Vec<TcpSegment> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until the sent segments satisfy the predicate.
    pub fn wait_for<F>(&self, mut done: F) -> bool
        where F: FnMut(&[TcpSegment]) -> bool
    {
        eventually(|| done(&self.sent.lock().unwrap()[..]))
    }

    fn wait_open(&self) {
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.opened.wait(held).unwrap();
        }
    }
}

impl Network for FakeNetwork {
    fn local_addr(&self) -> Ipv4Address {
        self.local
    }

    fn send(&self, _: Ipv4Address, protocol: IpProtocol, payload: &[u8]) -> io::Result<usize> {
        assert_eq!(protocol, IpProtocol::Tcp);
        let segment = TcpSegment::parse(payload, TcpChecksum::Ignored)
            .expect("endpoint emitted a malformed segment");
        self.sent.lock().unwrap().push(segment.clone());

        if let Some(filter) = self.filter.lock().unwrap().as_mut() {
            if filter(&segment.repr) {
                return Ok(payload.len());
            }
        }

        self.queue.lock().unwrap()
            .send(payload.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "wire cut"))?;
        Ok(payload.len())
    }
}

fn pump(queue: Receiver<Vec<u8>>, net: Arc<FakeNetwork>, to: Endpoint) {
    thread::spawn(move || {
        for bytes in queue {
            net.wait_open();
            to.handle_inbound(net.local, &bytes).expect("malformed segment on the wire");
        }
    });
}

/// Poll a condition for up to five seconds.
pub fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
