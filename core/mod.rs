//! Power-management engine
//!
//! This module contains the request-processing core: the node registry,
//! processor and power-domain state machines, master/slave requirements,
//! notifier registrations, the system shutdown coordinator and the PM API
//! dispatcher.
//!
//! All runtime state lives in one [`Topology`] built at startup and passed
//! to every operation. Requests are processed one at a time, to completion,
//! so no locking happens inside the engine; a caller dispatching from more
//! than one context must serialize access to the topology itself.

pub mod api;
pub mod master;
pub mod node;
pub mod notifier;
pub mod system;

use crate::config::{self, ConfigError, MmioRegion, TopologyConfig};
use crate::drivers::ipi::IpiChannel;
use crate::drivers::Platform;

use self::api::PayloadError;
use self::master::requirement::{Requirement, RequirementTable};
use self::master::{Master, MasterTable};
use self::node::{Node, NodeId, NodeRegistry};
use self::notifier::NotifierTable;
use self::system::SystemState;

pub use self::master::handle_wake_event;
pub use self::node::proc::handle_wfi;
pub use self::system::finish_shutdown;

/// Runtime power-management context
#[derive(Debug)]
pub struct Topology {
    /// All power-manageable nodes
    pub nodes: NodeRegistry,
    /// All masters
    pub masters: MasterTable,
    /// One requirement per legal master/slave pair
    pub requirements: RequirementTable,
    /// Notifier registrations
    pub notifiers: NotifierTable,
    /// System shutdown state
    pub system: SystemState,
    /// Protected MMIO regions
    pub mmio: &'static [MmioRegion],
}

impl Topology {
    /// Build the runtime context from a topology description
    pub fn new(cfg: &TopologyConfig) -> Result<Self, ConfigError> {
        config::validate_config(cfg)?;

        let mut nodes = NodeRegistry::new();
        for desc in cfg.nodes {
            nodes
                .insert(Node::from_desc(desc))
                .map_err(|_| ConfigError::TooManyNodes)?;
        }

        let mut masters = MasterTable::new();
        let mut requirements = RequirementTable::new();
        for desc in cfg.masters {
            masters
                .insert(Master::from_desc(desc))
                .map_err(|_| ConfigError::TooManyMasters)?;

            for &slave in desc.slaves {
                requirements
                    .insert(Requirement::new(desc.id, slave))
                    .map_err(|_| ConfigError::TooManyRequirements)?;
            }
        }

        log::info!(
            "PM: topology ready, {} nodes, {} masters",
            nodes.len(),
            cfg.masters.len()
        );

        Ok(Self {
            nodes,
            masters,
            requirements,
            notifiers: NotifierTable::new(),
            system: SystemState::new(),
            mmio: cfg.mmio,
        })
    }

    /// Find the master listening on an IPI channel
    pub fn master_for_channel(&self, channel: IpiChannel) -> Option<NodeId> {
        self.masters.by_channel(channel).map(|m| m.id)
    }

    /// Check if a master may access an address through the MMIO APIs
    pub fn mmio_access_allowed(&self, master: NodeId, address: u32) -> bool {
        self.mmio.iter().any(|region| region.allows(master, address))
    }
}

/// Process a request that arrived on an IPI channel
pub fn handle_ipi(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    channel: IpiChannel,
    payload: &[u32],
) -> Result<(), PayloadError> {
    let master = topo.master_for_channel(channel).ok_or_else(|| {
        log::warn!("PM: request on unknown channel {:?}", channel);
        PayloadError::Master
    })?;

    api::process_request(topo, hw, master, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::zynqmp::*;
    use crate::drivers::mock::MockPlatform;

    #[test]
    fn test_topology_from_builtin_config() {
        let topo = Topology::new(&TOPOLOGY).unwrap();
        assert_eq!(topo.nodes.len(), TOPOLOGY.nodes.len());
        assert_eq!(topo.masters.iter().count(), TOPOLOGY.masters.len());
        assert_eq!(topo.requirements.iter().count(), 11 + 7 + 5);
        assert!(!topo.system.is_shutting_down());
        assert!(topo.notifiers.is_empty());
    }

    #[test]
    fn test_bad_config_is_rejected() {
        static MASTERS: [config::MasterDesc; 1] = [config::MasterDesc {
            id: NODE_APU,
            channel: IPI_APU,
            procs: &[NODE_APU_0],
            may_suspend: &[],
            system_privileged: false,
            slaves: &[NODE_UART_0],
        }];
        let cfg = TopologyConfig { nodes: &[], masters: &MASTERS, mmio: &[] };
        assert_eq!(Topology::new(&cfg).err(), Some(ConfigError::UnknownNode(NODE_APU_0)));
    }

    #[test]
    fn test_master_for_channel() {
        let topo = Topology::new(&TOPOLOGY).unwrap();
        assert_eq!(topo.master_for_channel(IPI_APU), Some(NODE_APU));
        assert_eq!(topo.master_for_channel(IPI_RPU_0), Some(NODE_RPU_0));
        assert_eq!(topo.master_for_channel(IpiChannel(0x8000)), None);
    }

    #[test]
    fn test_mmio_access() {
        let topo = Topology::new(&TOPOLOGY).unwrap();
        assert!(topo.mmio_access_allowed(NODE_APU, 0xFD1A_0010));
        assert!(!topo.mmio_access_allowed(NODE_RPU_0, 0xFD1A_0010));
        assert!(topo.mmio_access_allowed(NODE_RPU_1, 0xFF18_0000));
        assert!(!topo.mmio_access_allowed(NODE_APU, 0x0));
    }

    #[test]
    fn test_handle_ipi_unknown_channel() {
        let mut topo = Topology::new(&TOPOLOGY).unwrap();
        let mut hw = MockPlatform::new();
        assert_eq!(
            handle_ipi(&mut topo, &mut hw, IpiChannel(0x8000), &[1, 0, 0, 0, 0, 0]),
            Err(PayloadError::Master)
        );
        assert!(hw.responses.is_empty());
    }
}
