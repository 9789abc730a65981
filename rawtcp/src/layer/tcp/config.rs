use std::ops::RangeInclusive;
use std::time::Duration;

/// Tunables of the TCP engine.
///
/// The defaults describe a conservative, slow stack: a fixed 30 second retransmission timeout and
/// a 10 second quiet time after an active close. Tests usually shorten the timers.
#[derive(Clone, Debug)]
pub struct Config {
    /// Largest payload put into one outgoing segment.
    pub mss: u16,
    /// Maximum segment size advertised in our SYN.
    pub syn_mss: u16,
    /// Window scale advertised in our SYN.
    pub window_scale: u8,
    /// Window advertised in SYN segments.
    pub syn_window: u16,
    /// Capacity of the receive buffer of each connection, also the initial receive window.
    pub recv_buffer: u16,
    /// Age after which an unacknowledged segment is sent again.
    pub rto: Duration,
    /// Interval at which the retransmission buffer is inspected.
    pub tick: Duration,
    /// Maximum segment lifetime, TIME-WAIT lasts for twice this.
    pub msl: Duration,
    /// How long dial and accept wait for the peer, `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// Local ports handed out to dialing connections.
    pub ephemeral_ports: RangeInclusive<u16>,
    /// Drop inbound segments with a wrong checksum.
    pub verify_checksum: bool,
}

impl Config {
    /// The quiet time after an active close.
    pub fn time_wait(&self) -> Duration {
        self.msl * 2
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mss: 1448,
            syn_mss: 1460,
            window_scale: 7,
            syn_window: 29200,
            recv_buffer: 3000,
            rto: Duration::from_secs(30),
            tick: Duration::from_secs(1),
            msl: Duration::from_secs(5),
            handshake_timeout: Some(Duration::from_secs(30)),
            ephemeral_ports: 40000..=65535,
            verify_checksum: true,
        }
    }
}
