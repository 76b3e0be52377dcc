//! In-memory RPL network
//!
//! Stand-ins for the collaborators a real node would have: the routing
//! protocol engine holding the DODAG state, the link identity layer and the
//! UDP connection to a root that echoes every payload back.
//!
//! All three keep their state behind `Arc<Mutex<..>>` handles so the
//! executor (or the live runner) can keep observing and perturbing it while
//! the node owns the collaborator itself.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rpl_adversary_core::{
    AdversaryError, DagVersion, Datagram, DatagramTransport, IdentityManager, LinkAddr, Rank,
    Result, RoutingEngine, Topology,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::scenario_config::NetworkConfig;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// DODAG State
// ----------------------------------------------------------------------------

/// Protocol-engine state shared between the engine and the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DodagState {
    pub root: Ipv6Addr,
    pub reachable: bool,
    pub topology: Option<Topology>,
    /// Rank the engine would compute from its parent set
    pub legitimate_rank: Rank,
    pub solicitations: u32,
    /// Times maintenance overwrote a rank the engine did not compute
    pub rank_repairs: u32,
    pub delivered: u32,
    pub lost: u32,
}

pub type SharedDodag = Arc<Mutex<DodagState>>;

/// Owner of the simulated DODAG; drives legitimate protocol activity
#[derive(Debug, Clone)]
pub struct SimNetwork {
    dodag: SharedDodag,
    config: NetworkConfig,
}

impl SimNetwork {
    pub fn new(config: &NetworkConfig) -> Self {
        let topology = config.joined.then(|| Self::initial_topology(config));
        let state = DodagState {
            root: config.root,
            reachable: config.reachable,
            topology,
            legitimate_rank: Rank::new(config.rank),
            solicitations: 0,
            rank_repairs: 0,
            delivered: 0,
            lost: 0,
        };

        Self {
            dodag: Arc::new(Mutex::new(state)),
            config: config.clone(),
        }
    }

    fn initial_topology(config: &NetworkConfig) -> Topology {
        Topology {
            instance_id: config.instance_id,
            dodag_id: config.root,
            rank: Rank::new(config.rank),
            version: DagVersion::new(config.version),
        }
    }

    /// Routing engine handle for the node
    pub fn engine(&self) -> SimRoutingEngine {
        SimRoutingEngine {
            dodag: Arc::clone(&self.dodag),
        }
    }

    /// Transport handle for the node
    pub fn transport(&self) -> SimTransport {
        let reply = if self.config.server_reply {
            ReplyPath::Queue
        } else {
            ReplyPath::Disabled
        };
        SimTransport::new(Arc::clone(&self.dodag), self.config.server_port, reply)
    }

    pub fn dodag(&self) -> SharedDodag {
        Arc::clone(&self.dodag)
    }

    pub fn snapshot(&self) -> DodagState {
        lock(&self.dodag).clone()
    }

    pub fn set_reachable(&self, reachable: bool) {
        info!(reachable, "root reachability changed");
        lock(&self.dodag).reachable = reachable;
    }

    /// Join the DODAG with the engine's own rank and the configured version
    pub fn join(&self) {
        let mut state = lock(&self.dodag);
        if state.topology.is_none() {
            let mut topology = Self::initial_topology(&self.config);
            topology.rank = state.legitimate_rank;
            state.topology = Some(topology);
            info!(instance = topology.instance_id, "joined DODAG");
        }
    }

    /// Leave the DODAG; the root becomes unknown
    pub fn detach(&self) {
        let mut state = lock(&self.dodag);
        state.topology = None;
        info!("left DODAG");
    }

    /// Root-initiated global repair: the version moves on by one
    pub fn global_repair(&self) {
        let mut state = lock(&self.dodag);
        if let Some(topology) = state.topology.as_mut() {
            topology.version = topology.version.next();
            info!(version = %topology.version, "global repair");
        }
    }

    /// Periodic engine work: recompute the rank from the parent set
    ///
    /// Returns `true` if the rank had been altered and was overwritten.
    pub fn maintain(&self) -> bool {
        let mut state = lock(&self.dodag);
        let legitimate = state.legitimate_rank;
        let Some(topology) = state.topology.as_mut() else {
            return false;
        };
        if topology.rank == legitimate {
            return false;
        }

        debug!(from = %topology.rank, to = %legitimate, "rank recomputed");
        topology.rank = legitimate;
        state.rank_repairs += 1;
        true
    }
}

// ----------------------------------------------------------------------------
// Routing Engine
// ----------------------------------------------------------------------------

/// Node-side view of the simulated protocol engine
#[derive(Debug, Clone)]
pub struct SimRoutingEngine {
    dodag: SharedDodag,
}

impl RoutingEngine for SimRoutingEngine {
    fn is_reachable(&self) -> bool {
        let state = lock(&self.dodag);
        state.reachable && state.topology.is_some()
    }

    fn root_address(&self) -> Option<Ipv6Addr> {
        let state = lock(&self.dodag);
        state.topology.map(|topology| topology.dodag_id)
    }

    fn active_topology(&self) -> Option<Topology> {
        lock(&self.dodag).topology
    }

    fn modify_topology(&mut self, update: &mut dyn FnMut(&mut Topology)) -> bool {
        let mut state = lock(&self.dodag);
        match state.topology.as_mut() {
            Some(topology) => {
                update(topology);
                true
            }
            None => false,
        }
    }

    fn send_control_solicitation(&mut self, target: Option<Ipv6Addr>) -> Result<()> {
        let mut state = lock(&self.dodag);
        state.solicitations += 1;
        match target {
            Some(target) => debug!(%target, "DIS unicast"),
            None => debug!(total = state.solicitations, "DIS multicast"),
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// Link-local address for a link identity
///
/// `fe80::/64` followed by the link address as interface identifier, with
/// the universal/local bit inverted.
pub fn link_local_address(id: &LinkAddr) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[0] = 0xfe;
    octets[1] = 0x80;
    octets[8..].copy_from_slice(id.as_bytes());
    octets[8] ^= 0x02;
    Ipv6Addr::from(octets)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    pub link_addr: LinkAddr,
    pub address: Ipv6Addr,
    pub assignments: u32,
}

/// Identity layer with an observable handle
#[derive(Debug, Clone)]
pub struct SimIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl SimIdentity {
    pub fn new(link_addr: LinkAddr) -> Self {
        Self {
            state: Arc::new(Mutex::new(IdentityState {
                link_addr,
                address: link_local_address(&link_addr),
                assignments: 0,
            })),
        }
    }

    pub fn snapshot(&self) -> IdentityState {
        lock(&self.state).clone()
    }
}

impl IdentityManager for SimIdentity {
    fn node_identity(&self) -> LinkAddr {
        lock(&self.state).link_addr
    }

    fn set_node_identity(&mut self, id: LinkAddr) {
        let mut state = lock(&self.state);
        state.link_addr = id;
        state.assignments += 1;
    }

    fn derive_network_address(&mut self, id: &LinkAddr) -> Ipv6Addr {
        let address = link_local_address(id);
        lock(&self.state).address = address;
        address
    }
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// Where the root's echo goes
#[derive(Debug, Clone)]
pub enum ReplyPath {
    /// Root does not reply
    Disabled,
    /// Replies wait in the log until the executor schedules them
    Queue,
    /// Replies are pushed to a live receiver
    Channel(mpsc::UnboundedSender<Datagram>),
}

/// A datagram handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub payload: Vec<u8>,
    pub src_port: u16,
    pub dest: SocketAddrV6,
    pub delivered: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TransportLog {
    pub sent: Vec<SentDatagram>,
    pub pending_replies: Vec<Datagram>,
}

impl TransportLog {
    pub fn payloads(&self) -> Vec<String> {
        self.sent
            .iter()
            .map(|datagram| String::from_utf8_lossy(&datagram.payload).into_owned())
            .collect()
    }
}

/// UDP-like connection towards the DODAG root
#[derive(Debug, Clone)]
pub struct SimTransport {
    dodag: SharedDodag,
    server_port: u16,
    log: Arc<Mutex<TransportLog>>,
    reply: ReplyPath,
}

impl SimTransport {
    pub fn new(dodag: SharedDodag, server_port: u16, reply: ReplyPath) -> Self {
        Self {
            dodag,
            server_port,
            log: Arc::new(Mutex::new(TransportLog::default())),
            reply,
        }
    }

    pub fn with_reply_path(mut self, reply: ReplyPath) -> Self {
        self.reply = reply;
        self
    }

    pub fn snapshot(&self) -> TransportLog {
        lock(&self.log).clone()
    }

    /// Take queued replies in send order
    pub fn take_replies(&self) -> Vec<Datagram> {
        std::mem::take(&mut lock(&self.log).pending_replies)
    }
}

impl DatagramTransport for SimTransport {
    fn send(&mut self, payload: &[u8], src_port: u16, dest: SocketAddrV6) -> Result<()> {
        let (delivered, root) = {
            let mut state = lock(&self.dodag);
            let delivered =
                state.reachable && *dest.ip() == state.root && dest.port() == self.server_port;
            if delivered {
                state.delivered += 1;
            } else {
                state.lost += 1;
            }
            (delivered, state.root)
        };

        let mut log = lock(&self.log);
        log.sent.push(SentDatagram {
            payload: payload.to_vec(),
            src_port,
            dest,
            delivered,
        });
        if !delivered {
            debug!(src_port, %dest, "datagram lost");
            return Ok(());
        }

        let echo = Datagram::new(root, payload);
        match &self.reply {
            ReplyPath::Disabled => {}
            ReplyPath::Queue => log.pending_replies.push(echo),
            ReplyPath::Channel(sender) => sender
                .send(echo)
                .map_err(|_| AdversaryError::transport_error("reply receiver closed"))?,
        }
        Ok(())
    }
}
