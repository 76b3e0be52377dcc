//! Shared-state mocks for runtime tests
//!
//! The runtime takes ownership of its collaborators, so these mocks keep their
//! state behind an `Arc<Mutex<..>>` the test can still inspect.

#![allow(dead_code)]

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::{Arc, Mutex};

use rpl_adversary_core::{
    AdversaryConfig, AttackProfile, DagVersion, DatagramTransport, IdentityManager, LinkAddr,
    Rank, Result, RoutingEngine, Topology,
};

pub fn root_address() -> Ipv6Addr {
    "fd00::201:1:1:1".parse().unwrap()
}

pub fn full_config() -> AdversaryConfig {
    AdversaryConfig::for_profile(AttackProfile::Full)
}

// ----------------------------------------------------------------------------
// Shared Routing Engine
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RoutingState {
    pub reachable: bool,
    pub topology: Option<Topology>,
    pub solicitations: usize,
}

#[derive(Debug, Clone)]
pub struct SharedRouting(pub Arc<Mutex<RoutingState>>);

impl SharedRouting {
    pub fn joined() -> Self {
        Self(Arc::new(Mutex::new(RoutingState {
            reachable: true,
            topology: Some(Topology {
                instance_id: 30,
                dodag_id: root_address(),
                rank: Rank::new(512),
                version: DagVersion::new(10),
            }),
            solicitations: 0,
        })))
    }

    pub fn state(&self) -> RoutingState {
        self.0.lock().unwrap().clone()
    }
}

impl RoutingEngine for SharedRouting {
    fn is_reachable(&self) -> bool {
        self.0.lock().unwrap().reachable
    }

    fn root_address(&self) -> Option<Ipv6Addr> {
        Some(root_address())
    }

    fn active_topology(&self) -> Option<Topology> {
        self.0.lock().unwrap().topology
    }

    fn modify_topology(&mut self, update: &mut dyn FnMut(&mut Topology)) -> bool {
        let mut state = self.0.lock().unwrap();
        match state.topology.as_mut() {
            Some(topology) => {
                update(topology);
                true
            }
            None => false,
        }
    }

    fn send_control_solicitation(&mut self, _target: Option<Ipv6Addr>) -> Result<()> {
        self.0.lock().unwrap().solicitations += 1;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Static Identity
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SharedIdentity(pub Arc<Mutex<LinkAddr>>);

impl SharedIdentity {
    pub fn current(&self) -> LinkAddr {
        *self.0.lock().unwrap()
    }
}

impl IdentityManager for SharedIdentity {
    fn node_identity(&self) -> LinkAddr {
        *self.0.lock().unwrap()
    }

    fn set_node_identity(&mut self, id: LinkAddr) {
        *self.0.lock().unwrap() = id;
    }

    fn derive_network_address(&mut self, id: &LinkAddr) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets[0] = 0xfe;
        octets[1] = 0x80;
        octets[8..].copy_from_slice(id.as_bytes());
        octets[8] ^= 0x02;
        Ipv6Addr::from(octets)
    }
}

// ----------------------------------------------------------------------------
// Shared Transport
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SharedTransport(pub Arc<Mutex<Vec<(Vec<u8>, SocketAddrV6)>>>);

impl SharedTransport {
    pub fn sent(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|(payload, _)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }
}

impl DatagramTransport for SharedTransport {
    fn send(&mut self, payload: &[u8], _src_port: u16, dest: SocketAddrV6) -> Result<()> {
        self.0.lock().unwrap().push((payload.to_vec(), dest));
        Ok(())
    }
}
