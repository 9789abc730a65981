use std::thread;

use rawtcp::layer::tcp::{Error, State};

mod common;

#[test]
fn active_and_passive_close() {
    let pair = common::pair(common::fast_config());
    let (client, server) = pair.connect(8080);

    let closer = thread::spawn(move || {
        client.close().unwrap();
        client
    });

    assert_eq!(server.read(&mut [0; 16]), Ok(0));
    server.close().unwrap();
    let client = closer.join().unwrap();

    assert_eq!(client.state(), State::Closed);
    assert_eq!(client.history()[2..],
        [State::Established, State::FinWait1, State::FinWait2, State::TimeWait, State::Closed]);
    assert_eq!(server.state(), State::Closed);
    assert_eq!(server.history()[3..],
        [State::Established, State::CloseWait, State::LastAck, State::Closed]);

    assert!(pair.client.ports().is_empty());
    assert!(common::eventually(|| pair.server.ports().is_empty()));
}

#[test]
fn simultaneous_close() {
    let pair = common::pair(common::fast_config());
    let (client, server) = pair.connect(8080);

    // Both FINs must be in flight before either arrives.
    pair.client_net.hold();
    pair.server_net.hold();

    let client = thread::spawn(move || client.close().map(|_| client));
    let server = thread::spawn(move || server.close().map(|_| server));

    let has_fin = |sent: &[rawtcp::wire::TcpSegment]| sent.iter().any(|s| s.repr.flags.fin());
    assert!(pair.client_net.wait_for(has_fin));
    assert!(pair.server_net.wait_for(has_fin));
    pair.client_net.open();
    pair.server_net.open();

    for side in vec![client.join().unwrap().unwrap(), server.join().unwrap().unwrap()] {
        assert_eq!(side.state(), State::Closed);
        assert_eq!(side.history().iter().rev().take(4).rev().cloned().collect::<Vec<_>>(),
            vec![State::FinWait1, State::Closing, State::TimeWait, State::Closed]);
    }

    assert!(pair.client.ports().is_empty());
    assert!(pair.server.ports().is_empty());
}

#[test]
fn close_twice() {
    let pair = common::pair(common::fast_config());
    let (client, server) = pair.connect(8080);

    client.close().unwrap();
    assert_eq!(client.close(), Ok(()));
    // The passive side closed on its own, closing it only waits.
    assert_eq!(server.close(), Ok(()));
    assert_eq!(server.close(), Ok(()));
}

#[test]
fn close_while_closing() {
    let pair = common::pair(common::fast_config());
    let (client, _server) = pair.connect(8080);

    // Without the FIN of the server the client is stuck in FIN-WAIT-2.
    pair.server_net.set_filter(|repr| repr.flags.fin());
    let closing = client.clone();
    thread::spawn(move || closing.close());

    assert!(common::eventually(|| client.state() == State::FinWait2));
    assert_eq!(client.close(), Err(Error::InvalidState(State::FinWait2)));
    assert_eq!(client.write(b"late"), Err(Error::InvalidState(State::FinWait2)));
}
