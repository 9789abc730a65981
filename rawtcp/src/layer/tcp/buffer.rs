/// The receive buffer of a connection.
///
/// Accepted payload accumulates until the sender pushes or the accumulated bytes reach the
/// capacity. Then the whole chunk is handed over to the reader, behind anything the reader did not
/// take yet. Since the advertised window is the free space, a remote respecting it never makes the
/// buffer hold more than its capacity plus one segment.
///
/// Only a remote overrunning twice the capacity loses data: the unread bytes are dropped.
#[derive(Clone, Debug)]
pub(crate) struct RecvBuffer {
    /// Bytes handed over to the reader.
    ready: Vec<u8>,
    /// Bytes accumulating until the next hand over.
    pending: Vec<u8>,
    capacity: usize,
}

impl RecvBuffer {
    pub(crate) fn new(capacity: u16) -> Self {
        RecvBuffer {
            ready: Vec::new(),
            pending: Vec::with_capacity(capacity.into()),
            capacity: capacity.into(),
        }
    }

    /// Append the payload of a segment.
    ///
    /// Returns `true` if the buffer overflowed and unread bytes were dropped.
    pub(crate) fn push(&mut self, payload: &[u8], push: bool) -> bool {
        self.pending.extend_from_slice(payload);
        if push || self.pending.len() >= self.capacity {
            return self.hand_over();
        }
        false
    }

    /// Copy out as much as fits, the rest stays ready for the next read.
    ///
    /// When nothing is ready the accumulated bytes are handed over first. The reader only does
    /// so once no more data can arrive.
    pub(crate) fn take(&mut self, out: &mut [u8]) -> usize {
        if self.ready.is_empty() {
            self.hand_over();
        }

        let len = out.len().min(self.ready.len());
        out[..len].copy_from_slice(&self.ready[..len]);
        self.ready.drain(..len);
        len
    }

    pub(crate) fn is_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.pending.is_empty()
    }

    /// The free space, to be advertised as receive window.
    pub(crate) fn free(&self) -> u16 {
        let used = self.ready.len() + self.pending.len();
        self.capacity.saturating_sub(used) as u16
    }

    fn hand_over(&mut self) -> bool {
        let overflow = !self.ready.is_empty()
            && self.ready.len() + self.pending.len() > 2 * self.capacity;
        if overflow {
            self.ready.clear();
        }
        self.ready.append(&mut self.pending);
        overflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_on_push() {
        let mut buffer = RecvBuffer::new(100);
        assert!(!buffer.push(&[1; 10], false));
        assert!(!buffer.is_ready());
        assert!(!buffer.push(&[2; 10], true));
        assert!(buffer.is_ready());
        assert_eq!(buffer.free(), 80);

        let mut out = [0; 15];
        assert_eq!(buffer.take(&mut out), 15);
        assert_eq!(&out[..10], &[1; 10]);
        assert!(buffer.is_ready());

        assert_eq!(buffer.take(&mut out), 5);
        assert_eq!(&out[..5], &[2; 5]);
        assert!(!buffer.is_ready());
        assert!(buffer.is_empty());
        assert_eq!(buffer.free(), 100);
    }

    #[test]
    fn ready_when_full() {
        let mut buffer = RecvBuffer::new(20);
        buffer.push(&[1; 12], false);
        assert!(!buffer.is_ready());
        buffer.push(&[2; 8], false);
        assert!(buffer.is_ready());
        assert_eq!(buffer.free(), 0);
    }

    #[test]
    fn segments_beyond_capacity_are_kept() {
        let mut buffer = RecvBuffer::new(3000);
        assert!(!buffer.push(&[1; 1448], false));
        assert!(!buffer.push(&[2; 1448], false));
        assert!(!buffer.is_ready());
        assert!(!buffer.push(&[3; 1448], false));
        assert!(buffer.is_ready());
        assert_eq!(buffer.free(), 0);

        let mut out = vec![0; 5000];
        assert_eq!(buffer.take(&mut out), 4344);
        assert_eq!(&out[..1448], &[1; 1448][..]);
        assert_eq!(&out[2896..4344], &[3; 1448][..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn unread_chunks_queue_up() {
        let mut buffer = RecvBuffer::new(20);
        assert!(!buffer.push(b"first", true));
        assert!(!buffer.push(b"second", true));

        let mut out = [0; 20];
        assert_eq!(buffer.take(&mut out), 11);
        assert_eq!(&out[..11], b"firstsecond");
    }

    #[test]
    fn take_hands_over_the_rest() {
        let mut buffer = RecvBuffer::new(20);
        buffer.push(&[7; 5], false);
        assert!(!buffer.is_ready());
        assert!(!buffer.is_empty());

        let mut out = [0; 20];
        assert_eq!(buffer.take(&mut out), 5);
        assert!(buffer.is_empty());
    }

    #[test]
    fn overrun_drops_unread() {
        let mut buffer = RecvBuffer::new(20);
        assert!(!buffer.push(&[1; 25], false));
        assert!(!buffer.push(&[2; 10], true));
        assert!(buffer.push(&[3; 10], true));

        let mut out = [0; 64];
        assert_eq!(buffer.take(&mut out), 10);
        assert_eq!(&out[..10], &[3; 10]);
    }
}
