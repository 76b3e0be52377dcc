//! Datagram transport abstraction
//!
//! The UDP-like connection that carries the periodic payload to the root.
//! Inbound replies do not come through this trait: whoever owns the transport
//! hands them to [`crate::AdversaryNode::on_receive`], which plays the part of
//! the registered receive callback.

use std::net::SocketAddrV6;

use crate::errors::Result;

/// Outbound side of the application transport
pub trait DatagramTransport: Send {
    /// Send `payload` from local UDP port `src_port` to `dest`
    fn send(&mut self, payload: &[u8], src_port: u16, dest: SocketAddrV6) -> Result<()>;
}
