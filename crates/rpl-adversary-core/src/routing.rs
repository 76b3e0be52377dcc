//! Routing collaborators
//!
//! Narrow interfaces onto the RPL engine and the identity/address layer. The
//! engine owns the DODAG state and keeps updating it on its own (DIO
//! processing, parent switches, global repair); the core only borrows it for a
//! single read-modify-write at a time.

use std::net::Ipv6Addr;

use crate::errors::Result;
use crate::types::{DagVersion, LinkAddr, Rank};

// ----------------------------------------------------------------------------
// Topology
// ----------------------------------------------------------------------------

/// The node's view of the DODAG it has joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub instance_id: u8,
    pub dodag_id: Ipv6Addr,
    pub rank: Rank,
    pub version: DagVersion,
}

// ----------------------------------------------------------------------------
// Collaborator Traits
// ----------------------------------------------------------------------------

/// Routing protocol engine as seen by the adversary core
pub trait RoutingEngine: Send {
    /// Whether a route towards the DODAG root currently exists
    fn is_reachable(&self) -> bool;

    /// Address of the DODAG root, if known
    fn root_address(&self) -> Option<Ipv6Addr>;

    /// Snapshot of the active topology
    fn active_topology(&self) -> Option<Topology>;

    /// Apply `update` to the active topology in place
    ///
    /// Returns `false` without calling `update` if the node has no active
    /// topology. The engine may overwrite the result at any later point.
    fn modify_topology(&mut self, update: &mut dyn FnMut(&mut Topology)) -> bool;

    /// Emit a DIS; `None` means multicast to all neighbours
    fn send_control_solicitation(&mut self, target: Option<Ipv6Addr>) -> Result<()>;
}

/// Link identity and address management
pub trait IdentityManager: Send {
    /// Current link-layer identity
    fn node_identity(&self) -> LinkAddr;

    /// Replace the link-layer identity
    fn set_node_identity(&mut self, id: LinkAddr);

    /// Regenerate the node's IPv6 address fields from `id`
    fn derive_network_address(&mut self, id: &LinkAddr) -> Ipv6Addr;
}

// ----------------------------------------------------------------------------
// Reachability Gate
// ----------------------------------------------------------------------------

/// Result of the per-cycle reachability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable { root: Ipv6Addr },
    Unreachable,
}

/// Gate deciding whether a cycle attempts a send
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachabilityGate;

impl ReachabilityGate {
    /// Reachable only when a route exists and the root address is known
    pub fn check(&self, engine: &dyn RoutingEngine) -> Reachability {
        if !engine.is_reachable() {
            return Reachability::Unreachable;
        }
        match engine.root_address() {
            Some(root) => Reachability::Reachable { root },
            None => Reachability::Unreachable,
        }
    }
}

// ----------------------------------------------------------------------------
// Routing State Mutator
// ----------------------------------------------------------------------------

/// Borrowed write access to the node's protocol state for one cycle
///
/// Every write is a single read-modify-write against whatever the engine holds
/// right now. The engine is not locked out between cycles, so a forced rank or
/// bumped version may be overwritten before the next cycle (last writer wins).
pub struct RoutingStateMutator<'a> {
    routing: &'a mut dyn RoutingEngine,
    identity: &'a mut dyn IdentityManager,
}

impl<'a> RoutingStateMutator<'a> {
    pub fn new(routing: &'a mut dyn RoutingEngine, identity: &'a mut dyn IdentityManager) -> Self {
        Self { routing, identity }
    }

    pub fn rank(&self) -> Option<Rank> {
        self.routing.active_topology().map(|topology| topology.rank)
    }

    pub fn version(&self) -> Option<DagVersion> {
        self.routing.active_topology().map(|topology| topology.version)
    }

    /// Overwrite the rank, returning the value it replaced
    pub fn force_rank(&mut self, rank: Rank) -> Option<Rank> {
        let mut previous = None;
        self.routing.modify_topology(&mut |topology| {
            previous = Some(topology.rank);
            topology.rank = rank;
        });
        previous
    }

    /// Increment the version by one (mod 256), returning `(old, new)`
    pub fn bump_version(&mut self) -> Option<(DagVersion, DagVersion)> {
        let mut change = None;
        self.routing.modify_topology(&mut |topology| {
            let old = topology.version;
            topology.version = old.next();
            change = Some((old, topology.version));
        });
        change
    }

    pub fn node_identity(&self) -> LinkAddr {
        self.identity.node_identity()
    }

    /// Take on `id` as the link identity and rebuild the IPv6 address from it
    pub fn assume_identity(&mut self, id: LinkAddr) -> Ipv6Addr {
        self.identity.set_node_identity(id);
        self.identity.derive_network_address(&id)
    }

    pub fn send_control_solicitation(&mut self, target: Option<Ipv6Addr>) -> Result<()> {
        self.routing.send_control_solicitation(target)
    }
}
