//! Resending of unacknowledged segments.
//!
//! One thread per connection owns a queue of segments consuming sequence space. Entries are
//! retired by acknowledgments and resent unchanged whenever they are older than the fixed
//! retransmission timeout. There is no backoff and no fast retransmit.
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::wire::TcpSeqNumber;
use super::control::Addressed;

/// An unacknowledged segment.
#[derive(Debug)]
struct Entry {
    since: Instant,
    /// The acknowledgment which retires this entry.
    expected: TcpSeqNumber,
    segment: Addressed,
}

/// The retransmission buffer, without any timer.
#[derive(Debug, Default)]
pub(crate) struct Queue {
    entries: VecDeque<Entry>,
}

enum Event {
    Push(Addressed),
    Acked(TcpSeqNumber),
    Clear,
}

/// Handle to the retransmission thread of one connection.
///
/// The thread stops when the handle is dropped.
#[derive(Debug)]
pub(crate) struct Retransmitter {
    events: Sender<Event>,
}

impl Queue {
    pub(crate) fn push(&mut self, segment: Addressed, now: Instant) {
        let expected = segment.repr().seq_number + segment.segment.sequence_len();
        self.entries.push_back(Entry { since: now, expected, segment });
    }

    /// Retire all entries covered by a cumulative acknowledgment.
    ///
    /// Returns the number of retired entries.
    pub(crate) fn acked(&mut self, ack: TcpSeqNumber) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.expected > ack);
        before - self.entries.len()
    }

    /// Collect all segments older than `rto`, restarting their timer.
    pub(crate) fn expired(&mut self, now: Instant, rto: Duration) -> Vec<Addressed> {
        self.entries.iter_mut()
            .filter(|entry| now.duration_since(entry.since) >= rto)
            .map(|entry| {
                entry.since = now;
                entry.segment.clone()
            })
            .collect()
    }

    /// Forget all entries, nothing is resent anymore.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Retransmitter {
    /// Start the thread, resending into `outbound`.
    pub(crate) fn spawn(
        local_port: u16,
        outbound: Sender<Addressed>,
        rto: Duration,
        tick: Duration,
    ) -> Self {
        let (events, receiver) = mpsc::channel();
        thread::spawn(move || run(local_port, receiver, outbound, rto, tick));
        Retransmitter { events }
    }

    /// Track a segment until it is acknowledged.
    pub(crate) fn push(&self, segment: Addressed) {
        // Can only fail when the outbound queue is gone, then nothing is sent anymore anyways.
        let _ = self.events.send(Event::Push(segment));
    }

    /// Notify about a new value of `SND.UNA`.
    pub(crate) fn acked(&self, ack: TcpSeqNumber) {
        let _ = self.events.send(Event::Acked(ack));
    }

    /// Stop resending, the connection is closed.
    pub(crate) fn clear(&self) {
        let _ = self.events.send(Event::Clear);
    }
}

fn run(
    local_port: u16,
    events: Receiver<Event>,
    outbound: Sender<Addressed>,
    rto: Duration,
    tick: Duration,
) {
    let mut queue = Queue::default();
    loop {
        match events.recv_timeout(tick) {
            Ok(Event::Push(segment)) => queue.push(segment, Instant::now()),
            Ok(Event::Acked(ack)) => {
                let retired = queue.acked(ack);
                net_trace!("tcp {}: ack {} retired {} segments", local_port, ack, retired);
            },
            Ok(Event::Clear) => {
                if !queue.entries.is_empty() {
                    net_debug!("tcp {}: dropping {} unacknowledged segments", local_port, queue.len());
                }
                queue.clear();
            },
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for segment in queue.expired(Instant::now(), rto) {
            net_debug!("tcp {}: retransmit {}", local_port, segment.segment);
            if outbound.send(segment).is_err() {
                return;
            }
        }
    }

    if !queue.entries.is_empty() {
        net_debug!("tcp {}: dropping {} unacknowledged segments", local_port, queue.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Ipv4Address, TcpRepr, TcpSegment};

    fn data(seq: i32, len: usize) -> Addressed {
        let repr = TcpRepr::new(40000, 80, TcpSeqNumber(seq));
        Addressed {
            addr: Ipv4Address::new(10, 0, 0, 2),
            segment: TcpSegment::new(repr, vec![0; len]),
        }
    }

    #[test]
    fn acks_are_cumulative() {
        let now = Instant::now();
        let mut queue = Queue::default();
        queue.push(data(0, 10), now);
        queue.push(data(10, 10), now);
        queue.push(data(20, 10), now);

        assert_eq!(queue.acked(TcpSeqNumber(5)), 0);
        assert_eq!(queue.acked(TcpSeqNumber(20)), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.acked(TcpSeqNumber(20)), 0);
        assert_eq!(queue.acked(TcpSeqNumber(30)), 1);
    }

    #[test]
    fn expiry_restarts_timer() {
        let rto = Duration::from_secs(30);
        let start = Instant::now();
        let mut queue = Queue::default();
        queue.push(data(0, 10), start);
        queue.push(data(10, 10), start + Duration::from_secs(20));

        assert!(queue.expired(start + Duration::from_secs(29), rto).is_empty());
        let resent = queue.expired(start + Duration::from_secs(30), rto);
        assert_eq!(resent, vec![data(0, 10)]);
        assert!(queue.expired(start + Duration::from_secs(31), rto).is_empty());
        assert_eq!(queue.expired(start + Duration::from_secs(60), rto).len(), 2);
    }

    #[test]
    fn resends_until_acked() {
        let (outbound, sent) = mpsc::channel();
        let retransmit = Retransmitter::spawn(
            40000, outbound, Duration::from_millis(20), Duration::from_millis(5));

        retransmit.push(data(100, 10));
        let resent = sent.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(resent, data(100, 10));

        retransmit.acked(TcpSeqNumber(110));
        // At most one resend may have raced the acknowledgment.
        thread::sleep(Duration::from_millis(50));
        while sent.try_recv().is_ok() { }
        assert!(sent.recv_timeout(Duration::from_millis(100)).is_err());

        drop(retransmit);
    }

    #[test]
    fn cleared_segments_are_not_resent() {
        let (outbound, sent) = mpsc::channel();
        let retransmit = Retransmitter::spawn(
            40000, outbound, Duration::from_millis(20), Duration::from_millis(5));

        retransmit.push(data(100, 10));
        retransmit.push(data(110, 10));
        retransmit.clear();
        assert!(sent.recv_timeout(Duration::from_millis(200)).is_err());

        // The thread still serves new segments.
        retransmit.push(data(120, 10));
        let resent = sent.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(resent, data(120, 10));
    }
}
