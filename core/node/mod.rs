//! Node registry
//!
//! Every power-manageable entity is a [`Node`]: processors, power islands,
//! power domains and slaves. The type specific data lives in the
//! [`NodeKind`] variant; parent links are plain node ids resolved through
//! the registry, which owns all nodes.

pub mod power;
pub mod proc;
pub mod slave;

use heapless::Vec;

use crate::config::{NodeDesc, NodeDescKind, MAX_NODES};
use crate::core::notifier::{self, Event};
use crate::core::Topology;
use crate::drivers::Platform;

use self::power::{Power, PowerClass};
use self::proc::Processor;
use self::slave::Slave;

/// Node identifier as used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Reported when a reply refers to no particular node
    pub const UNKNOWN: NodeId = NodeId(0);

    /// Get raw value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Node type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Processor
    Processor,
    /// Power island
    PowerIsland,
    /// Power domain
    PowerDomain,
    /// Slave
    Slave,
}

/// Type specific node data
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Processor and its FSM state
    Processor(Processor),
    /// Power island or domain
    Power(Power),
    /// Slave and its capability state
    Slave(Slave),
}

/// A node of the power topology
#[derive(Debug, Clone)]
pub struct Node {
    /// Node identifier
    pub id: NodeId,
    /// Power island/domain feeding this node
    pub parent: Option<NodeId>,
    /// Type specific data
    pub kind: NodeKind,
}

impl Node {
    /// Build a node from its static description
    pub fn from_desc(desc: &NodeDesc) -> Self {
        let kind = match desc.kind {
            NodeDescKind::Processor {
                master,
                pwr_dn_latency,
                pwr_up_latency,
                resume,
                power,
                initial,
            } => NodeKind::Processor(Processor::new(
                master,
                pwr_dn_latency,
                pwr_up_latency,
                resume,
                power,
                initial,
            )),
            NodeDescKind::Power { class, up_latency, down_latency, power, initial } => {
                NodeKind::Power(Power::new(class, up_latency, down_latency, power, initial))
            }
            NodeDescKind::Slave { class, wake_irq } => NodeKind::Slave(Slave::new(class, wake_irq)),
        };

        Self { id: desc.id, parent: desc.parent, kind }
    }

    /// Get the type tag
    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            NodeKind::Processor(_) => NodeType::Processor,
            NodeKind::Power(p) => match p.class {
                PowerClass::Island => NodeType::PowerIsland,
                PowerClass::Domain => NodeType::PowerDomain,
            },
            NodeKind::Slave(_) => NodeType::Slave,
        }
    }

    /// Current operating point as reported to masters
    pub fn state(&self) -> u32 {
        match &self.kind {
            NodeKind::Processor(p) => p.state.raw(),
            NodeKind::Power(p) => p.state.raw(),
            NodeKind::Slave(s) => s.state,
        }
    }

    /// Check if the node is powered down
    pub fn is_down(&self) -> bool {
        match &self.kind {
            NodeKind::Processor(p) => p.is_down(),
            NodeKind::Power(p) => p.is_off(),
            NodeKind::Slave(s) => s.is_off(),
        }
    }

    /// Power consumption in the current state
    pub fn power_consumption(&self) -> u32 {
        match &self.kind {
            NodeKind::Processor(p) => p.power_consumption(),
            NodeKind::Power(p) => p.power_consumption(),
            NodeKind::Slave(s) => s.power_consumption(),
        }
    }

    /// Latency of bringing this node alone back to its highest state
    fn own_wake_latency(&self) -> u32 {
        match &self.kind {
            NodeKind::Processor(p) => p.wake_latency(),
            NodeKind::Power(p) => p.wake_latency(),
            NodeKind::Slave(s) => s.wake_latency(),
        }
    }
}

/// Registry owning all nodes of the topology
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node, MAX_NODES>,
}

/// Child id list returned by [`NodeRegistry::child_ids`]
pub type ChildIds = Vec<NodeId, MAX_NODES>;

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, giving it back if the registry is full
    pub fn insert(&mut self, node: Node) -> Result<(), Node> {
        self.nodes.push(node)
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if no node is registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Get node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Get mutable node by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Get the parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Collect the ids of all direct children of a node
    pub fn child_ids(&self, parent: NodeId) -> ChildIds {
        let mut ids = ChildIds::new();
        for node in self.nodes.iter().filter(|n| n.parent == Some(parent)) {
            // Never more children than nodes
            let _ = ids.push(node.id);
        }
        ids
    }

    /// Check if every direct child of a node is powered down
    pub fn all_children_down(&self, parent: NodeId) -> bool {
        self.nodes
            .iter()
            .filter(|n| n.parent == Some(parent))
            .all(Node::is_down)
    }

    /// Get processor data by node id
    pub fn proc(&self, id: NodeId) -> Option<&Processor> {
        match &self.get(id)?.kind {
            NodeKind::Processor(p) => Some(p),
            _ => None,
        }
    }

    /// Get mutable processor data by node id
    pub fn proc_mut(&mut self, id: NodeId) -> Option<&mut Processor> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Processor(p) => Some(p),
            _ => None,
        }
    }

    /// Get power island/domain data by node id
    pub fn power(&self, id: NodeId) -> Option<&Power> {
        match &self.get(id)?.kind {
            NodeKind::Power(p) => Some(p),
            _ => None,
        }
    }

    /// Get mutable power island/domain data by node id
    pub fn power_mut(&mut self, id: NodeId) -> Option<&mut Power> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Power(p) => Some(p),
            _ => None,
        }
    }

    /// Get slave data by node id
    pub fn slave(&self, id: NodeId) -> Option<&Slave> {
        match &self.get(id)?.kind {
            NodeKind::Slave(s) => Some(s),
            _ => None,
        }
    }

    /// Get mutable slave data by node id
    pub fn slave_mut(&mut self, id: NodeId) -> Option<&mut Slave> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Slave(s) => Some(s),
            _ => None,
        }
    }

    /// Time needed to bring a node back to its highest state, including
    /// every ancestor that is currently powered off
    pub fn wake_latency(&self, id: NodeId) -> u32 {
        let mut latency = 0u32;
        let mut current = self.get(id);

        if let Some(node) = current {
            latency = node.own_wake_latency();
            current = node.parent.and_then(|p| self.get(p));
        }

        while let Some(node) = current {
            if !node.is_down() {
                break;
            }
            latency = latency.saturating_add(node.own_wake_latency());
            current = node.parent.and_then(|p| self.get(p));
        }

        latency
    }
}

/// Report a node state change to the notifier subsystem
pub(crate) fn state_changed(topo: &mut Topology, hw: &mut dyn Platform, id: NodeId) {
    if let Some(node) = topo.nodes.get(id) {
        log::trace!("Node: {:?} now in state {}", id, node.state());
    }
    notifier::notifier_event(topo, hw, id, Event::StateChange);
}
