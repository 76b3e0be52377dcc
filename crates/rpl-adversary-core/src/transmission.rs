//! Transmission Engine
//!
//! The node's ordinary job: a periodic `hello <seq>` datagram to the DODAG
//! root, with tx/rx/missed accounting and a summary every few sends.

use core::fmt;
use std::net::{Ipv6Addr, SocketAddrV6};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::TransmissionConfig;
use crate::errors::Result;
use crate::transport::DatagramTransport;

// ----------------------------------------------------------------------------
// Counters
// ----------------------------------------------------------------------------

/// Monotonic tx/rx/missed counters; wrap at `u32::MAX`, never reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub sent: u32,
    pub received: u32,
    pub missed: u32,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tx/Rx/MissedTx: {}/{}/{}", self.sent, self.received, self.missed)
    }
}

// ----------------------------------------------------------------------------
// Payload
// ----------------------------------------------------------------------------

/// Fixed prefix of every periodic payload
pub const PAYLOAD_PREFIX: &[u8] = b"hello ";
/// Payload buffer size
pub const PAYLOAD_CAPACITY: usize = 32;
/// Decimal digits of `u32::MAX`
const MAX_SEQ_DIGITS: usize = 10;

const _: () = assert!(PAYLOAD_PREFIX.len() + MAX_SEQ_DIGITS <= PAYLOAD_CAPACITY);

/// Periodic payload in a fixed-size buffer
///
/// The buffer holds the prefix plus the widest possible counter, so encoding
/// can never overflow.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    buf: [u8; PAYLOAD_CAPACITY],
    len: usize,
}

impl Payload {
    /// Encode `hello <seq>`
    pub fn hello(seq: u32) -> Self {
        let mut digits = [0u8; MAX_SEQ_DIGITS];
        let mut start = MAX_SEQ_DIGITS;
        let mut n = seq;
        loop {
            start -= 1;
            digits[start] = b'0' + (n % 10) as u8;
            n /= 10;
            if n == 0 {
                break;
            }
        }
        let digits = &digits[start..];

        let mut buf = [0u8; PAYLOAD_CAPACITY];
        let prefix_len = PAYLOAD_PREFIX.len();
        buf[..prefix_len].copy_from_slice(PAYLOAD_PREFIX);
        buf[prefix_len..prefix_len + digits.len()].copy_from_slice(digits);

        Self {
            buf,
            len: prefix_len + digits.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

// ----------------------------------------------------------------------------
// Transmission Engine
// ----------------------------------------------------------------------------

/// Periodic sender and receive-callback owner
#[derive(Debug, Clone)]
pub struct TransmissionEngine {
    counters: Counters,
    summary_every: u32,
    client_port: u16,
    server_port: u16,
}

impl TransmissionEngine {
    pub fn new(config: &TransmissionConfig) -> Self {
        Self {
            counters: Counters::default(),
            summary_every: config.summary_every.max(1),
            client_port: config.client_port,
            server_port: config.server_port,
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Log and return a summary when `sent` is a multiple of the summary period
    pub fn summary_due(&self) -> Option<Counters> {
        if self.counters.sent % self.summary_every != 0 {
            return None;
        }
        info!(
            sent = self.counters.sent,
            received = self.counters.received,
            missed = self.counters.missed,
            "{}",
            self.counters
        );
        Some(self.counters)
    }

    /// Send the next payload to the server port on `root`
    ///
    /// The sequence number is consumed whether or not the transport accepts
    /// the datagram. Returns the sequence number used.
    pub fn send(&mut self, transport: &mut dyn DatagramTransport, root: Ipv6Addr) -> Result<u32> {
        let seq = self.counters.sent;
        let payload = Payload::hello(seq);
        let dest = SocketAddrV6::new(root, self.server_port, 0, 0);
        info!(seq, %dest, "Sending request");

        let result = transport.send(payload.as_bytes(), self.client_port, dest);
        self.counters.sent = seq.wrapping_add(1);
        result.map(|()| seq)
    }

    /// Consume a sequence number without transmitting
    pub fn skip(&mut self) -> u32 {
        let seq = self.counters.sent;
        self.counters.sent = seq.wrapping_add(1);
        seq
    }

    /// Account for a cycle with no route to the root
    ///
    /// Misses are only counted once something has been sent, so the start-up
    /// period before the root is known does not inflate them.
    pub fn record_unreachable(&mut self) -> bool {
        info!("Not reachable yet");
        if self.counters.sent == 0 {
            return false;
        }
        self.counters.missed = self.counters.missed.wrapping_add(1);
        true
    }

    /// Receive callback for replies from the root
    pub fn on_receive(&mut self, sender: Ipv6Addr, payload: &[u8]) {
        info!(
            %sender,
            response = %String::from_utf8_lossy(payload),
            "Received response"
        );
        self.counters.received = self.counters.received.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AdversaryError;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<(Vec<u8>, u16, SocketAddrV6)>,
        fail: bool,
    }

    impl DatagramTransport for RecordingTransport {
        fn send(&mut self, payload: &[u8], src_port: u16, dest: SocketAddrV6) -> Result<()> {
            if self.fail {
                return Err(AdversaryError::transport_error("link down"));
            }
            self.sent.push((payload.to_vec(), src_port, dest));
            Ok(())
        }
    }

    fn engine() -> TransmissionEngine {
        TransmissionEngine::new(&TransmissionConfig::default())
    }

    fn root() -> Ipv6Addr {
        "fd00::201:1:1:1".parse().unwrap()
    }

    #[test]
    fn test_payload_encoding() {
        assert_eq!(Payload::hello(0).as_bytes(), b"hello 0");
        assert_eq!(Payload::hello(42).as_bytes(), b"hello 42");
        assert_eq!(Payload::hello(u32::MAX).as_bytes(), b"hello 4294967295");
        assert!(Payload::hello(u32::MAX).len() <= PAYLOAD_CAPACITY);
    }

    #[test]
    fn test_send_embeds_counter_and_increments() {
        let mut engine = engine();
        let mut transport = RecordingTransport::default();

        assert_eq!(engine.send(&mut transport, root()).unwrap(), 0);
        assert_eq!(engine.send(&mut transport, root()).unwrap(), 1);

        assert_eq!(engine.counters().sent, 2);
        assert_eq!(transport.sent[0].0, b"hello 0".to_vec());
        assert_eq!(transport.sent[1].0, b"hello 1".to_vec());
        assert_eq!(transport.sent[1].1, 8765);
        assert_eq!(transport.sent[1].2, SocketAddrV6::new(root(), 5678, 0, 0));
    }

    #[test]
    fn test_send_uses_configured_ports() {
        let config = TransmissionConfig {
            client_port: 4000,
            server_port: 4001,
            ..Default::default()
        };
        let mut engine = TransmissionEngine::new(&config);
        let mut transport = RecordingTransport::default();

        engine.send(&mut transport, root()).unwrap();

        let (_, src_port, dest) = &transport.sent[0];
        assert_eq!(*src_port, 4000);
        assert_eq!(dest.port(), 4001);
        assert_eq!(*dest.ip(), root());
    }

    #[test]
    fn test_failed_send_still_consumes_sequence() {
        let mut engine = engine();
        let mut transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };

        assert!(engine.send(&mut transport, root()).is_err());
        assert_eq!(engine.counters().sent, 1);
    }

    #[test]
    fn test_skip_counts_without_sending() {
        let mut engine = engine();
        assert_eq!(engine.skip(), 0);
        assert_eq!(engine.skip(), 1);
        assert_eq!(engine.counters().sent, 2);
    }

    #[test]
    fn test_missed_only_after_first_send() {
        let mut engine = engine();
        assert!(!engine.record_unreachable());
        assert_eq!(engine.counters().missed, 0);

        engine.skip();
        assert!(engine.record_unreachable());
        assert_eq!(engine.counters().missed, 1);
    }

    #[test]
    fn test_summary_every_tenth() {
        let mut engine = engine();
        assert!(engine.summary_due().is_some());
        for _ in 0..9 {
            engine.skip();
            assert!(engine.summary_due().is_none());
        }
        engine.skip();
        assert_eq!(engine.summary_due().map(|c| c.sent), Some(10));
    }

    #[test]
    fn test_receive_callback_counts() {
        let mut engine = engine();
        engine.on_receive(root(), b"hello 0");
        engine.on_receive(root(), b"hello 1");
        assert_eq!(engine.counters().received, 2);
    }

    #[test]
    fn test_counters_wrap() {
        let mut engine = engine();
        engine.counters.sent = u32::MAX;
        assert_eq!(engine.skip(), u32::MAX);
        assert_eq!(engine.counters().sent, 0);
    }

    #[test]
    fn test_counters_display() {
        let counters = Counters {
            sent: 10,
            received: 8,
            missed: 1,
        };
        assert_eq!(counters.to_string(), "Tx/Rx/MissedTx: 10/8/1");
    }
}
