//! Configuration management
//!
//! This module describes the static power topology handed to the engine at
//! startup: the power-manageable nodes, the masters that issue requests,
//! which slaves each master may use, and which MMIO ranges a master may
//! reach through the protected MMIO APIs.
//!
//! The description is plain `'static` data; [`validate_config`] checks it and
//! [`crate::core::Topology::new`] turns it into the runtime context.

use crate::core::node::power::{PowerClass, PowerState};
use crate::core::node::proc::{ProcState, ResumePolicy};
use crate::core::node::slave::SlaveClass;
use crate::core::node::NodeId;
use crate::drivers::ipi::IpiChannel;

pub mod zynqmp;

/// Build-time generated constants (capacities, API version, feature flags)
pub mod build {
    include!(concat!(env!("OUT_DIR"), "/pmu_config.rs"));
}

pub use self::build::{
    MAX_MASTERS, MAX_NODES, MAX_NOTIFIERS, MAX_PROCS_PER_MASTER, MAX_REQUIREMENTS,
    PM_VERSION_MAJOR, PM_VERSION_MINOR,
};

/// Packed PM API version word (`major << 16 | minor`)
pub const fn api_version() -> u32 {
    (PM_VERSION_MAJOR << 16) | PM_VERSION_MINOR
}

/// Static description of a single node
#[derive(Debug, Clone, Copy)]
pub struct NodeDesc {
    /// Node identifier
    pub id: NodeId,
    /// Power island/domain feeding this node
    pub parent: Option<NodeId>,
    /// Type specific attributes
    pub kind: NodeDescKind,
}

/// Type specific part of a node description
#[derive(Debug, Clone, Copy)]
pub enum NodeDescKind {
    /// Processor owned by a master
    Processor {
        /// Owning master
        master: NodeId,
        /// Time needed to power the processor down
        pwr_dn_latency: u32,
        /// Time needed to power the processor back up
        pwr_up_latency: u32,
        /// Which resume addresses the processor accepts
        resume: ResumePolicy,
        /// Power consumption per processor state
        power: [u32; 4],
        /// State at startup
        initial: ProcState,
    },
    /// Power island or power domain
    Power {
        /// Island or domain
        class: PowerClass,
        /// Power-up latency
        up_latency: u32,
        /// Power-down latency
        down_latency: u32,
        /// Power consumption in Off and On
        power: [u32; 2],
        /// State at startup
        initial: PowerState,
    },
    /// Slave whose usage is tracked per master
    Slave {
        /// Capability/state table to use
        class: SlaveClass,
        /// Interrupt usable as a wake-up source
        wake_irq: Option<u32>,
    },
}

/// Static description of a master
#[derive(Debug, Clone, Copy)]
pub struct MasterDesc {
    /// Placeholder node id the master is addressed by
    pub id: NodeId,
    /// IPI channel carrying requests and replies
    pub channel: IpiChannel,
    /// Processors owned by the master, primary first
    pub procs: &'static [NodeId],
    /// Masters this one may ask to suspend
    pub may_suspend: &'static [NodeId],
    /// May trigger system shutdown/restart
    pub system_privileged: bool,
    /// Slaves this master may request
    pub slaves: &'static [NodeId],
}

/// Register window reachable through the protected MMIO APIs
#[derive(Debug, Clone, Copy)]
pub struct MmioRegion {
    /// First address of the region
    pub base: u32,
    /// Size of the region in bytes
    pub size: u32,
    /// Masters allowed to access the region
    pub masters: &'static [NodeId],
}

impl MmioRegion {
    /// Check if an address falls inside the region
    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && address - self.base < self.size
    }

    /// Check if a master may access an address of this region
    pub fn allows(&self, master: NodeId, address: u32) -> bool {
        self.contains(address) && self.masters.contains(&master)
    }
}

/// Complete topology description
#[derive(Debug, Clone, Copy)]
pub struct TopologyConfig {
    /// All nodes, parents before children is not required
    pub nodes: &'static [NodeDesc],
    /// All masters
    pub masters: &'static [MasterDesc],
    /// Protected MMIO regions
    pub mmio: &'static [MmioRegion],
}

/// Topology description errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Two nodes share an identifier
    DuplicateNode(NodeId),
    /// Two masters share an identifier
    DuplicateMaster(NodeId),
    /// A reference to a node that is not described
    UnknownNode(NodeId),
    /// A node's parent is not a power island/domain
    BadParent(NodeId),
    /// A master lists something that is not a slave
    NotASlave(NodeId),
    /// Processor and master descriptions disagree on ownership
    ProcessorOwner(NodeId),
    /// A master has no processor
    NoProcessors(NodeId),
    /// Node table capacity exceeded
    TooManyNodes,
    /// Master table capacity exceeded
    TooManyMasters,
    /// A master owns more processors than supported
    TooManyProcessors(NodeId),
    /// Requirement table capacity exceeded
    TooManyRequirements,
}

fn find_node(cfg: &TopologyConfig, id: NodeId) -> Option<&'static NodeDesc> {
    cfg.nodes.iter().find(|n| n.id == id)
}

/// Validate a topology description
pub fn validate_config(cfg: &TopologyConfig) -> Result<(), ConfigError> {
    if cfg.nodes.len() > MAX_NODES {
        return Err(ConfigError::TooManyNodes);
    }

    if cfg.masters.len() > MAX_MASTERS {
        return Err(ConfigError::TooManyMasters);
    }

    let requirements: usize = cfg.masters.iter().map(|m| m.slaves.len()).sum();
    if requirements > MAX_REQUIREMENTS {
        return Err(ConfigError::TooManyRequirements);
    }

    for (i, node) in cfg.nodes.iter().enumerate() {
        if cfg.nodes[..i].iter().any(|n| n.id == node.id) {
            return Err(ConfigError::DuplicateNode(node.id));
        }

        if let Some(parent) = node.parent {
            match find_node(cfg, parent) {
                Some(NodeDesc { kind: NodeDescKind::Power { .. }, .. }) => {}
                Some(_) => return Err(ConfigError::BadParent(node.id)),
                None => return Err(ConfigError::UnknownNode(parent)),
            }
        }

        if let NodeDescKind::Processor { master, .. } = node.kind {
            let owner = cfg
                .masters
                .iter()
                .find(|m| m.id == master)
                .ok_or(ConfigError::UnknownNode(master))?;
            if !owner.procs.contains(&node.id) {
                return Err(ConfigError::ProcessorOwner(node.id));
            }
        }
    }

    for (i, master) in cfg.masters.iter().enumerate() {
        if cfg.masters[..i].iter().any(|m| m.id == master.id) {
            return Err(ConfigError::DuplicateMaster(master.id));
        }

        if master.procs.is_empty() {
            return Err(ConfigError::NoProcessors(master.id));
        }

        if master.procs.len() > MAX_PROCS_PER_MASTER {
            return Err(ConfigError::TooManyProcessors(master.id));
        }

        for &proc in master.procs {
            match find_node(cfg, proc) {
                Some(NodeDesc { kind: NodeDescKind::Processor { master: owner, .. }, .. })
                    if *owner == master.id => {}
                Some(_) => return Err(ConfigError::ProcessorOwner(proc)),
                None => return Err(ConfigError::UnknownNode(proc)),
            }
        }

        for &slave in master.slaves {
            match find_node(cfg, slave) {
                Some(NodeDesc { kind: NodeDescKind::Slave { .. }, .. }) => {}
                Some(_) => return Err(ConfigError::NotASlave(slave)),
                None => return Err(ConfigError::UnknownNode(slave)),
            }
        }

        for &target in master.may_suspend {
            if !cfg.masters.iter().any(|m| m.id == target) {
                return Err(ConfigError::UnknownNode(target));
            }
        }
    }

    log::debug!(
        "Config: {} nodes, {} masters, {} requirements validated",
        cfg.nodes.len(),
        cfg.masters.len(),
        requirements
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC: NodeId = NodeId(2);
    const MASTER: NodeId = NodeId(1);
    const ISLAND: NodeId = NodeId(1);
    const SLAVE: NodeId = NodeId(3);

    static NODES: [NodeDesc; 3] = [
        NodeDesc {
            id: ISLAND,
            parent: None,
            kind: NodeDescKind::Power {
                class: PowerClass::Island,
                up_latency: 10,
                down_latency: 10,
                power: [0, 5],
                initial: PowerState::On,
            },
        },
        NodeDesc {
            id: PROC,
            parent: Some(ISLAND),
            kind: NodeDescKind::Processor {
                master: MASTER,
                pwr_dn_latency: 1,
                pwr_up_latency: 2,
                resume: ResumePolicy::Any,
                power: [0, 10, 1, 10],
                initial: ProcState::Active,
            },
        },
        NodeDesc {
            id: SLAVE,
            parent: Some(PROC),
            kind: NodeDescKind::Slave { class: SlaveClass::Generic, wake_irq: None },
        },
    ];

    static MASTERS: [MasterDesc; 1] = [MasterDesc {
        id: MASTER,
        channel: IpiChannel(1),
        procs: &[PROC],
        may_suspend: &[],
        system_privileged: true,
        slaves: &[SLAVE],
    }];

    #[test]
    fn test_builtin_topology_is_valid() {
        assert_eq!(validate_config(&zynqmp::TOPOLOGY), Ok(()));
    }

    #[test]
    fn test_parent_must_be_power_node() {
        let cfg = TopologyConfig { nodes: &NODES, masters: &MASTERS, mmio: &[] };
        assert_eq!(validate_config(&cfg), Err(ConfigError::BadParent(SLAVE)));
    }

    #[test]
    fn test_master_slave_must_be_slave() {
        static BAD_MASTERS: [MasterDesc; 1] = [MasterDesc {
            id: MASTER,
            channel: IpiChannel(1),
            procs: &[PROC],
            may_suspend: &[],
            system_privileged: false,
            slaves: &[PROC],
        }];
        let cfg = TopologyConfig { nodes: &NODES[..2], masters: &BAD_MASTERS, mmio: &[] };
        assert_eq!(validate_config(&cfg), Err(ConfigError::NotASlave(PROC)));
    }

    #[test]
    fn test_mmio_region() {
        let region = MmioRegion { base: 0x1000, size: 0x100, masters: &[MASTER] };
        assert!(region.contains(0x1000));
        assert!(region.contains(0x10fc));
        assert!(!region.contains(0x1100));
        assert!(!region.contains(0xfff));
        assert!(region.allows(MASTER, 0x1004));
        assert!(!region.allows(NodeId(7), 0x1004));
    }

    #[test]
    fn test_api_version() {
        assert_eq!(api_version() >> 16, PM_VERSION_MAJOR);
        assert_eq!(api_version() & 0xffff, PM_VERSION_MINOR);
    }
}
