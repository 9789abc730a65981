use std::thread;
use std::time::Duration;

use rawtcp::layer::tcp::{Config, State};
use rawtcp::wire::{TcpFlags, TcpRepr, TcpSegment};

mod common;

use common::{CLIENT, SERVER};

const RTO: Duration = Duration::from_millis(100);

fn config() -> Config {
    Config {
        rto: RTO,
        tick: Duration::from_millis(10),
        .. common::fast_config()
    }
}

fn data_segments(segments: &[TcpSegment]) -> usize {
    segments.iter().filter(|segment| !segment.payload.is_empty()).count()
}

#[test]
fn resent_until_acknowledged() {
    let pair = common::pair(config());
    let (client, server) = pair.connect(8080);
    let before = server.recv_sequence().nxt;

    // The server receives the data but its acknowledgements are stuck.
    pair.server_net.hold();
    client.write(b"hello").unwrap();
    assert!(pair.client_net.wait_for(|segments| data_segments(segments) >= 2));

    let sent = pair.client_net.sent();
    let resent: Vec<_> = sent.iter().filter(|segment| !segment.payload.is_empty()).collect();
    assert!(resent.iter().all(|segment| segment.repr.seq_number == resent[0].repr.seq_number));
    assert!(resent.iter().all(|segment| segment.payload == b"hello"));

    pair.server_net.open();
    thread::sleep(RTO * 2);
    let count = data_segments(&pair.client_net.sent());
    thread::sleep(RTO * 3);
    assert_eq!(data_segments(&pair.client_net.sent()), count);

    // Duplicates were not delivered a second time.
    let mut buffer = [0; 64];
    assert_eq!(server.read(&mut buffer).unwrap(), 5);
    assert_eq!(&buffer[..5], b"hello");
    assert_eq!(server.recv_sequence().nxt - before, 5);
    assert_eq!(client.send_sequence().una, client.send_sequence().nxt);
}

#[test]
fn lost_segment_is_resent() {
    let pair = common::pair(config());
    let (client, server) = pair.connect(8080);

    // Lose the first transmission of the data only.
    let mut lost = false;
    pair.client_net.set_filter(move |repr| {
        if repr.payload_len > 0 && !lost {
            lost = true;
            return true;
        }
        false
    });
    client.write(b"again").unwrap();

    let mut buffer = [0; 64];
    assert_eq!(server.read(&mut buffer).unwrap(), 5);
    assert_eq!(&buffer[..5], b"again");
    assert!(data_segments(&pair.client_net.sent()) >= 2);
}

#[test]
fn lost_fin_is_resent() {
    let pair = common::pair(config());
    let (client, server) = pair.connect(8080);

    let mut lost = false;
    pair.client_net.set_filter(move |repr| {
        if repr.flags.fin() && !lost {
            lost = true;
            return true;
        }
        false
    });

    let closer = thread::spawn(move || client.close());
    assert_eq!(server.read(&mut [0; 16]), Ok(0));
    server.close().unwrap();
    closer.join().unwrap().unwrap();

    let fins = pair.client_net.sent().iter().filter(|segment| segment.repr.flags.fin()).count();
    assert!(fins >= 2);
}

#[test]
fn reset_stops_retransmission() {
    let pair = common::pair(config());
    let (client, _server) = pair.connect(8080);

    pair.client_net.set_filter(|repr| repr.payload_len > 0);
    client.write(b"lost").unwrap();
    assert!(pair.client_net.wait_for(|segments| data_segments(segments) >= 2));

    let mut reset = TcpRepr::new(8080, client.local_port(), client.recv_sequence().nxt);
    reset.flags = TcpFlags::RST;
    let reset = TcpSegment::new(reset, Vec::new());
    pair.client.handle_inbound(SERVER, &reset.to_bytes(SERVER, CLIENT)).unwrap();
    assert_eq!(client.state(), State::Closed);

    // A resend may have raced the reset.
    thread::sleep(RTO * 2);
    let count = data_segments(&pair.client_net.sent());
    thread::sleep(RTO * 8);
    assert_eq!(data_segments(&pair.client_net.sent()), count);
}
