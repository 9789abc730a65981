use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::sync::mpsc::Receiver;
use std::thread;

use super::buffer::RecvBuffer;
use super::control::{Addressed, ControlBlock, RecvSequence, SendSequence, State};
use super::endpoint::{Owner, Shared};
use super::retransmit::Retransmitter;
use super::{Error, Peer, Reject, Result};

/// An established connection.
///
/// All operations block the calling thread. The handle can be shared between threads, for
/// example to read and write concurrently, and stays valid after the connection closed. Dropping
/// the last handle abandons the connection without closing it and frees its port.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// The state of a connection, owned by its handles.
///
/// The endpoint only refers to it weakly.
pub(crate) struct Inner {
    control: Mutex<Control>,
    /// Signalled whenever a segment was processed.
    changed: Condvar,
    shared: Arc<Shared>,
}

struct Control {
    tcb: ControlBlock,
    buffer: RecvBuffer,
    retransmit: Retransmitter,
    /// The remote reset the connection.
    reset: bool,
    /// The remote closed its side.
    fin_received: bool,
    /// The port was given back to the endpoint.
    released: bool,
}

impl Connection {
    /// Turn the control block of a completed handshake into a connection.
    ///
    /// Segments that arrived on the handshake queue in the meantime are processed before any
    /// other segment can reach the connection.
    pub(crate) fn establish(
        shared: &Arc<Shared>,
        tcb: ControlBlock,
        pending: &Receiver<Addressed>,
    ) -> Self {
        let peer = tcb.peer();
        let inner = Arc::new(Inner::new(shared.clone(), tcb));

        let mut owners = shared.owners();
        let mut control = inner.lock();
        owners.insert(peer.local_port, Owner::Connection(Arc::downgrade(&inner)));
        drop(owners);

        net_debug!("tcp {}: established with {:?}:{}",
            peer.local_port, peer.remote_addr, peer.remote_port);

        let mut release = false;
        while let Ok(incoming) = pending.try_recv() {
            release |= inner.process(&mut control, incoming);
        }
        inner.changed.notify_all();
        drop(control);

        if release {
            shared.release(peer.local_port);
        }

        Connection { inner }
    }

    /// Read received data.
    ///
    /// Blocks until the remote pushed data or the receive buffer is full. Returns `Ok(0)` once
    /// the remote closed its side and all data was read.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut control = self.inner.lock();
        loop {
            let state = control.tcb.state();
            let drain = control.buffer.is_ready()
                || (!state.can_receive() && !control.buffer.is_empty());
            if drain {
                let len = control.buffer.take(buf);
                let free = control.buffer.free();
                control.tcb.set_window(free);
                return Ok(len);
            }

            if control.reset {
                return Err(Error::ConnectionReset);
            }

            if !state.can_receive() {
                return if control.fin_received {
                    Ok(0)
                } else {
                    Err(Error::InvalidState(state))
                };
            }

            control = self.inner.wait(control);
        }
    }

    /// Send data, returning the number of bytes queued.
    ///
    /// The data is split into segments of at most one MSS, the last of them pushed.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut control = self.inner.lock();
        let state = control.tcb.state();
        if !state.can_send() {
            return Err(Error::InvalidState(state));
        }

        let mss = usize::from(self.inner.shared.config.mss.max(1));
        let count = buf.chunks(mss).len();
        for (idx, chunk) in buf.chunks(mss).enumerate() {
            let segment = control.tcb.send_data(chunk.to_vec(), idx + 1 == count);
            if state.can_receive() {
                control.retransmit.push(segment.clone());
            }
            self.inner.shared.send(segment);
        }

        Ok(buf.len())
    }

    /// Close the connection and wait until it is fully closed.
    ///
    /// After an active close this includes the quiet time of TIME-WAIT. Closing a closed
    /// connection succeeds unless it was reset, while another close is still in progress it
    /// fails.
    pub fn close(&self) -> Result<()> {
        let mut control = self.inner.lock();
        match control.tcb.state() {
            State::Established | State::SynReceived => {
                let fin = control.tcb.send_fin();
                control.tcb.set_state(State::FinWait1);
                control.retransmit.push(fin.clone());
                self.inner.shared.send(fin);

                control = self.inner.wait_until(control, |state| match state {
                    State::TimeWait | State::Closed => true,
                    _ => false,
                });
                if control.reset {
                    return Err(Error::ConnectionReset);
                }
                drop(control);

                thread::sleep(self.inner.shared.config.time_wait());
                let mut control = self.inner.lock();
                control.tcb.set_state(State::Closed);
                self.inner.finish(control);
            },
            State::CloseWait => {
                let fin = control.tcb.send_fin();
                control.tcb.set_state(State::LastAck);
                control.retransmit.push(fin.clone());
                self.inner.shared.send(fin);
                self.inner.await_closed(control)?;
            },
            State::LastAck | State::Closed => self.inner.await_closed(control)?,
            state => return Err(Error::InvalidState(state)),
        }

        Ok(())
    }

    /// The current state of the control block.
    pub fn state(&self) -> State {
        self.inner.lock().tcb.state()
    }

    /// Every state the control block went through, starting with CLOSED.
    pub fn history(&self) -> Vec<State> {
        self.inner.lock().tcb.history().to_vec()
    }

    /// A snapshot of the send sequence variables.
    pub fn send_sequence(&self) -> SendSequence {
        self.inner.lock().tcb.send_sequence()
    }

    /// A snapshot of the receive sequence variables.
    pub fn recv_sequence(&self) -> RecvSequence {
        self.inner.lock().tcb.recv_sequence()
    }

    /// The addressing of the connection.
    pub fn peer(&self) -> Peer {
        self.inner.lock().tcb.peer()
    }

    /// The local port of the connection.
    pub fn local_port(&self) -> u16 {
        self.peer().local_port
    }
}

impl Inner {
    fn new(shared: Arc<Shared>, tcb: ControlBlock) -> Self {
        let config = &shared.config;
        let retransmit = Retransmitter::spawn(
            tcb.peer().local_port,
            shared.outbound(),
            config.rto,
            config.tick);
        let buffer = RecvBuffer::new(config.recv_buffer);

        Inner {
            control: Mutex::new(Control {
                tcb,
                buffer,
                retransmit,
                reset: false,
                fin_received: false,
                released: false,
            }),
            changed: Condvar::new(),
            shared,
        }
    }

    /// Process a segment routed to this connection.
    pub(crate) fn handle(&self, incoming: Addressed) {
        let mut control = self.lock();
        let release = self.process(&mut control, incoming);
        self.changed.notify_all();
        let port = control.tcb.peer().local_port;
        drop(control);

        if release {
            self.shared.release(port);
        }
    }

    /// Returns if the connection reached CLOSED and the port must be released.
    fn process(&self, control: &mut Control, incoming: Addressed) -> bool {
        let shared = &self.shared;
        let signals = control.tcb.arrives(&incoming, |peer| shared.isn(peer));

        if signals.deliver {
            let push = incoming.repr().flags.psh();
            if control.buffer.push(&incoming.segment.payload, push) {
                net_debug!("tcp {}: receive buffer overflow", control.tcb.peer().local_port);
            }
            let free = control.buffer.free();
            control.tcb.set_window(free);
        }

        if signals.reject.is_none() && incoming.repr().flags.fin() {
            control.fin_received = true;
        }

        if signals.reject == Some(Reject::ConnectionReset) {
            control.reset = true;
        }

        if let Some(ack) = signals.acked {
            control.retransmit.acked(ack);
        }

        if let Some(track) = signals.track {
            control.retransmit.push(track);
        }

        if signals.closed {
            control.retransmit.clear();
        }

        for answer in signals.answers {
            shared.send(answer);
        }

        signals.closed && Self::take_release(control)
    }

    fn await_closed(&self, control: MutexGuard<Control>) -> Result<()> {
        let control = self.wait_until(control, |state| state == State::Closed);
        let reset = control.reset;
        self.finish(control);
        if reset {
            return Err(Error::ConnectionReset);
        }
        Ok(())
    }

    /// Release the port of a closed connection if that did not happen yet.
    fn finish(&self, mut control: MutexGuard<Control>) {
        let port = control.tcb.peer().local_port;
        let release = Self::take_release(&mut control);
        drop(control);
        if release {
            self.shared.release(port);
        }
    }

    fn take_release(control: &mut Control) -> bool {
        !std::mem::replace(&mut control.released, true)
    }

    fn wait_until<'a, F>(&self, mut control: MutexGuard<'a, Control>, done: F)
        -> MutexGuard<'a, Control>
        where F: Fn(State) -> bool
    {
        while !done(control.tcb.state()) {
            control = self.wait(control);
        }
        control
    }

    fn wait<'a>(&self, control: MutexGuard<'a, Control>) -> MutexGuard<'a, Control> {
        self.changed.wait(control).unwrap_or_else(|err| err.into_inner())
    }

    // Every critical section leaves the control block consistent, even when panicking.
    fn lock(&self) -> MutexGuard<Control> {
        self.control.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(|err| err.into_inner());
        if Self::take_release(control) {
            let port = control.tcb.peer().local_port;
            net_debug!("tcp {}: abandoned in {}", port, control.tcb.state());
            self.shared.release(port);
        }
    }
}

impl io::Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Connection::read(self, buf).map_err(Into::into)
    }
}

impl io::Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Connection::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
