//! Power islands and power domains
//!
//! A power node is On while anything below it needs power. Powering a node
//! up powers its parent chain first; powering down walks the other way:
//! - [`force_down_tree`] forces every processor below a node off
//! - [`opportunistic_suspend`] turns a node off once all its children are
//!   down and retries on the parent

use crate::core::node::proc::{self, ProcEvent};
use crate::core::node::{state_changed, NodeId, NodeType};
use crate::core::Topology;
use crate::drivers::{Platform, PowerAction};
use crate::{Error, Result};

/// Power node class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerClass {
    /// Island feeding a processor cluster
    Island,
    /// Domain feeding islands and slaves
    Domain,
}

/// Power node state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PowerState {
    /// Powered off
    Off = 0,
    /// Powered on
    On = 1,
}

impl PowerState {
    /// Get raw value
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

/// Power island/domain data
#[derive(Debug, Clone)]
pub struct Power {
    /// Island or domain
    pub class: PowerClass,
    /// Current state
    pub state: PowerState,
    /// Power-up latency
    pub up_latency: u32,
    /// Power-down latency
    pub down_latency: u32,
    power: [u32; 2],
}

impl Power {
    /// Create a power node in its initial state
    pub fn new(
        class: PowerClass,
        up_latency: u32,
        down_latency: u32,
        power: [u32; 2],
        initial: PowerState,
    ) -> Self {
        Self { class, state: initial, up_latency, down_latency, power }
    }

    /// Check if the node is off
    pub fn is_off(&self) -> bool {
        self.state == PowerState::Off
    }

    /// Power consumption in the current state
    pub fn power_consumption(&self) -> u32 {
        self.power[self.state as usize]
    }

    /// Time needed to power back on
    pub fn wake_latency(&self) -> u32 {
        match self.state {
            PowerState::Off => self.up_latency,
            PowerState::On => 0,
        }
    }
}

fn set_state(topo: &mut Topology, hw: &mut dyn Platform, id: NodeId, state: PowerState) {
    if let Some(power) = topo.nodes.power_mut(id) {
        power.state = state;
    }
    log::debug!("Power: {:?} -> {:?}", id, state);
    state_changed(topo, hw, id);
}

/// Power a node on, parents first
pub fn power_up(topo: &mut Topology, hw: &mut dyn Platform, id: NodeId) -> Result<()> {
    let power = topo.nodes.power(id).ok_or(Error::InvalidNode)?;
    if !power.is_off() {
        return Ok(());
    }

    if let Some(parent) = topo.nodes.parent(id) {
        power_up(topo, hw, parent)?;
    }

    hw.power_action(id, PowerAction::PowerUp)?;
    set_state(topo, hw, id, PowerState::On);
    Ok(())
}

/// Power a node off if every child is already down
pub fn power_down(topo: &mut Topology, hw: &mut dyn Platform, id: NodeId) -> Result<()> {
    let power = topo.nodes.power(id).ok_or(Error::InvalidNode)?;
    if power.is_off() {
        return Ok(());
    }

    if !topo.nodes.all_children_down(id) {
        return Err(Error::Failure);
    }

    hw.power_action(id, PowerAction::PowerDown)?;
    set_state(topo, hw, id, PowerState::Off);
    Ok(())
}

/// Force every processor below a power node off, then the node itself
///
/// Stops at the first child that fails; children forced before the failure
/// stay down. Slaves are left alone, so a node still feeding a used slave
/// stays on.
pub fn force_down_tree(topo: &mut Topology, hw: &mut dyn Platform, id: NodeId) -> Result<()> {
    if topo.nodes.power(id).is_none() {
        return Err(Error::InvalidNode);
    }

    for child in topo.nodes.child_ids(id) {
        match topo.nodes.get(child).map(|n| n.node_type()) {
            Some(NodeType::Processor) => proc::proc_fsm(topo, hw, child, ProcEvent::ForcePowerdown)?,
            Some(NodeType::PowerIsland) | Some(NodeType::PowerDomain) => {
                force_down_tree(topo, hw, child)?
            }
            _ => {}
        }
    }

    if topo.nodes.all_children_down(id) {
        power_down(topo, hw, id)?;
    } else {
        log::debug!("Power: {:?} kept on, children still in use", id);
    }

    Ok(())
}

/// Turn a power node off once all of its children are down, continuing up
/// the tree until an ancestor still has a child that needs power
pub fn opportunistic_suspend(topo: &mut Topology, hw: &mut dyn Platform, id: NodeId) {
    let mut current = Some(id);

    while let Some(node) = current {
        if topo.nodes.power(node).is_none() || !topo.nodes.all_children_down(node) {
            break;
        }

        if let Err(err) = power_down(topo, hw, node) {
            log::warn!("Power: opportunistic suspend of {:?} failed: {}", node, err);
            break;
        }

        current = topo.nodes.parent(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::zynqmp::*;
    use crate::core::node::proc::ProcState;
    use crate::drivers::mock::MockPlatform;

    fn setup() -> (Topology, MockPlatform) {
        (Topology::new(&TOPOLOGY).unwrap(), MockPlatform::new())
    }

    fn is_off(topo: &Topology, id: NodeId) -> bool {
        topo.nodes.power(id).unwrap().is_off()
    }

    #[test]
    fn test_power_down_needs_children_down() {
        let (mut topo, mut hw) = setup();
        assert_eq!(power_down(&mut topo, &mut hw, NODE_APU), Err(Error::Failure));
        assert!(!is_off(&topo, NODE_APU));
    }

    #[test]
    fn test_force_down_tree_powers_off_island_and_domain() {
        let (mut topo, mut hw) = setup();
        assert_eq!(force_down_tree(&mut topo, &mut hw, NODE_APU), Ok(()));
        for core in [NODE_APU_0, NODE_APU_1, NODE_APU_2, NODE_APU_3] {
            assert_eq!(topo.nodes.proc(core).unwrap().state, ProcState::ForcedDown);
        }
        assert!(is_off(&topo, NODE_APU));

        // The domain is only turned off by opportunistic suspend
        assert!(!is_off(&topo, NODE_FPD));
        opportunistic_suspend(&mut topo, &mut hw, NODE_FPD);
        assert!(is_off(&topo, NODE_FPD));
    }

    #[test]
    fn test_force_down_tree_stops_on_failure() {
        let (mut topo, mut hw) = setup();
        hw.fail_action = Some((NODE_RPU_1, PowerAction::ProcOff));
        assert_eq!(force_down_tree(&mut topo, &mut hw, NODE_RPU), Err(Error::Failure));
        assert_eq!(topo.nodes.proc(NODE_RPU_0).unwrap().state, ProcState::ForcedDown);
        assert_eq!(topo.nodes.proc(NODE_RPU_1).unwrap().state, ProcState::Active);
        assert!(!is_off(&topo, NODE_RPU));
    }

    #[test]
    fn test_power_up_parents_first() {
        let (mut topo, mut hw) = setup();
        force_down_tree(&mut topo, &mut hw, NODE_APU).unwrap();
        opportunistic_suspend(&mut topo, &mut hw, NODE_FPD);
        hw.actions.clear();

        assert_eq!(power_up(&mut topo, &mut hw, NODE_APU), Ok(()));
        assert_eq!(
            hw.actions,
            vec![(NODE_FPD, PowerAction::PowerUp), (NODE_APU, PowerAction::PowerUp)]
        );
        assert!(!is_off(&topo, NODE_FPD));
    }

    #[test]
    fn test_opportunistic_suspend_stops_at_busy_ancestor() {
        let (mut topo, mut hw) = setup();
        // RPU_1 still active
        opportunistic_suspend(&mut topo, &mut hw, NODE_RPU);
        assert!(!is_off(&topo, NODE_RPU));
        assert!(!is_off(&topo, NODE_LPD));
    }
}
