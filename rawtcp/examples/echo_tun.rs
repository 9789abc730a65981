//! Echoes every connection on a tun interface.
//!
//! # Usage
//!
//! The example opens a tun interface and answers TCP on one port of its address, sending back
//! whatever each client writes until the client closes. Connections are served one at a time.
//!
//! The following steps are necessary to set the example up (likely requires root or sudo):
//!
//! 1. Setup the tun interface, named `tun0` here:
//!
//!   > $ ip tuntap add mode tun name tun0
//! 2. Assign an address on the host system and bring up the interface
//!
//!   > $ ip addr add 10.0.0.1/24 dev tun0
//!
//!   > $ ip link set up dev tun0
//! 3. Start the example with a different address of the same network
//!
//!   > $ cargo run --example echo_tun -- tun0 10.0.0.2 7
//! 4. Talk to it from the host
//!
//!   > $ nc 10.0.0.2 7
use std::sync::Arc;
use std::thread;
use structopt::StructOpt;

use rawtcp::layer::{ip, tcp};
use rawtcp::nic::TunInterface;
use rawtcp::wire::Ipv4Address;

fn main() {
    let Config {
        name,
        address,
        port,
    } = Config::from_args();

    let interface = TunInterface::new(&name, address)
        .unwrap_or_else(|err| panic!("Couldn't initialize interface {}: {:?}", name, err));
    let ip = Arc::new(ip::Endpoint::new(interface));
    let tcp = tcp::Endpoint::new(ip.clone(), tcp::Config::default());

    let inbound = tcp.clone();
    thread::spawn(move || ip.receive_loop(&inbound));

    println!("Echoing on {}:{}", address, port);
    loop {
        let mut listener = tcp.listen("0.0.0.0", port).unwrap();
        let connection = match listener.accept() {
            Ok(connection) => connection,
            Err(err) => {
                eprintln!("Handshake failed: {}", err);
                continue;
            },
        };

        let peer = connection.peer();
        println!("Connection from {:?}:{}", peer.remote_addr, peer.remote_port);
        if let Err(err) = echo(&connection) {
            eprintln!("Connection aborted: {}", err);
        }
    }
}

fn echo(connection: &tcp::Connection) -> tcp::Result<()> {
    let mut buffer = vec![0; 1 << 12];
    loop {
        let len = connection.read(&mut buffer)?;
        if len == 0 {
            break;
        }
        connection.write(&buffer[..len])?;
    }
    connection.close()
}

#[derive(StructOpt)]
struct Config {
    name: String,
    address: Ipv4Address,
    port: u16,
}
