//! Master/slave requirements
//!
//! Every legal (master, slave) pair has exactly one [`Requirement`], created
//! with the topology. A requirement records whether the master currently
//! uses the slave, the capabilities it asked for, its latency bound and a
//! capability change scheduled for the master's next suspend.

use bitflags::bitflags;
use heapless::Vec;

use crate::config::MAX_REQUIREMENTS;
use crate::core::node::slave::{self, Capabilities};
use crate::core::node::NodeId;
use crate::core::notifier::{self, Event};
use crate::core::Topology;
use crate::drivers::Platform;
use crate::{Error, Result};

bitflags! {
    /// Requirement bookkeeping flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReqFlags: u32 {
        /// Master has requested the slave
        const USING = 1 << 0;
        /// Slave is a wake-up source of the master
        const WAKEUP = 1 << 1;
        /// `next_caps` is applied on the master's next suspend
        const SCHEDULED = 1 << 2;
    }
}

/// Usage status bit: the asking master uses the slave
pub const USAGE_THIS_MASTER: u32 = 1 << 0;
/// Usage status bit: some other master uses the slave
pub const USAGE_OTHER_MASTERS: u32 = 1 << 1;

/// Static master/slave relationship
#[derive(Debug, Clone)]
pub struct Requirement {
    /// Master side
    pub master: NodeId,
    /// Slave side
    pub slave: NodeId,
    /// Bookkeeping flags
    pub flags: ReqFlags,
    /// Capabilities currently required
    pub curr_caps: Capabilities,
    /// Capabilities to apply on the master's next suspend
    pub next_caps: Capabilities,
    /// Maximum wake latency the master tolerates
    pub latency_req: u32,
}

impl Requirement {
    /// Create an unused requirement
    pub fn new(master: NodeId, slave: NodeId) -> Self {
        Self {
            master,
            slave,
            flags: ReqFlags::empty(),
            curr_caps: Capabilities::empty(),
            next_caps: Capabilities::empty(),
            latency_req: u32::MAX,
        }
    }

    /// Check if the master has requested the slave
    pub fn is_using(&self) -> bool {
        self.flags.contains(ReqFlags::USING)
    }
}

/// Index of a requirement in its table
pub type ReqIndex = usize;

/// Table of all requirements
#[derive(Debug, Default)]
pub struct RequirementTable {
    reqs: Vec<Requirement, MAX_REQUIREMENTS>,
}

impl RequirementTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a requirement, giving it back if the table is full
    pub fn insert(&mut self, req: Requirement) -> ::core::result::Result<(), Requirement> {
        self.reqs.push(req)
    }

    /// Iterate over all requirements
    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.reqs.iter()
    }

    /// Find the requirement of a master/slave pair
    pub fn find(&self, master: NodeId, slave: NodeId) -> Option<ReqIndex> {
        self.reqs
            .iter()
            .position(|r| r.master == master && r.slave == slave)
    }

    /// Get requirement by index
    pub fn get(&self, index: ReqIndex) -> Option<&Requirement> {
        self.reqs.get(index)
    }

    /// Get mutable requirement by index
    pub fn get_mut(&mut self, index: ReqIndex) -> Option<&mut Requirement> {
        self.reqs.get_mut(index)
    }

    fn users(&self, slave: NodeId) -> impl Iterator<Item = &Requirement> {
        self.reqs
            .iter()
            .filter(move |r| r.slave == slave && r.is_using())
    }

    /// Union of required capabilities and tightest latency bound over all
    /// masters using a slave
    pub fn slave_demand(&self, slave: NodeId) -> (Capabilities, u32) {
        self.users(slave).fold((Capabilities::empty(), u32::MAX), |(caps, latency), r| {
            (caps | r.curr_caps, latency.min(r.latency_req))
        })
    }

    /// Check if any master uses a slave
    pub fn has_users(&self, slave: NodeId) -> bool {
        self.users(slave).next().is_some()
    }

    /// Usage status of a slave as seen by `master`
    pub fn usage_status(&self, slave: NodeId, master: NodeId) -> u32 {
        self.users(slave).fold(0, |usage, r| {
            usage | if r.master == master { USAGE_THIS_MASTER } else { USAGE_OTHER_MASTERS }
        })
    }

    /// Capabilities `master` currently requires from a slave
    pub fn master_caps(&self, slave: NodeId, master: NodeId) -> Capabilities {
        self.users(slave)
            .find(|r| r.master == master)
            .map_or(Capabilities::empty(), |r| r.curr_caps)
    }

    /// Masters that enabled a slave as their wake-up source
    pub fn wake_masters(&self, slave: NodeId) -> Vec<NodeId, MAX_REQUIREMENTS> {
        let mut masters = Vec::new();
        for req in self
            .reqs
            .iter()
            .filter(|r| r.slave == slave && r.flags.contains(ReqFlags::WAKEUP))
        {
            // Never more matches than requirements
            let _ = masters.push(req.master);
        }
        masters
    }

    fn indices_of(&self, master: NodeId, flags: ReqFlags) -> Vec<ReqIndex, MAX_REQUIREMENTS> {
        let mut indices = Vec::new();
        for (index, _) in self
            .reqs
            .iter()
            .enumerate()
            .filter(|(_, r)| r.master == master && r.flags.contains(flags))
        {
            let _ = indices.push(index);
        }
        indices
    }
}

fn parse_caps(raw: u32) -> Result<Capabilities> {
    Capabilities::from_bits(raw).ok_or_else(|| {
        log::warn!("Req: invalid capabilities {:#x}", raw);
        Error::InvalidParam
    })
}

/// Set the capabilities a master requires and update the slave
///
/// On failure the previous capabilities are restored.
pub fn requirement_update(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    index: ReqIndex,
    caps: u32,
) -> Result<()> {
    let caps = parse_caps(caps)?;
    let req = topo.requirements.get_mut(index).ok_or(Error::Failure)?;
    let prev = req.curr_caps;
    let slave = req.slave;
    req.curr_caps = caps;

    let result = slave::update_slave(topo, hw, slave);
    if result.is_err() {
        if let Some(req) = topo.requirements.get_mut(index) {
            req.curr_caps = prev;
        }
    }
    result
}

/// Remember capabilities to apply when the master's primary processor
/// completes its suspend
pub fn requirement_schedule(topo: &mut Topology, index: ReqIndex, caps: u32) -> Result<()> {
    let caps = parse_caps(caps)?;
    let req = topo.requirements.get_mut(index).ok_or(Error::Failure)?;
    req.next_caps = caps;
    req.flags.insert(ReqFlags::SCHEDULED);
    log::debug!("Req: {:?} scheduled {:?} for {:?}", req.master, caps, req.slave);
    Ok(())
}

/// Apply every scheduled requirement of a master
pub fn apply_scheduled(topo: &mut Topology, hw: &mut dyn Platform, master: NodeId) -> Result<()> {
    let mut result = Ok(());

    for index in topo.requirements.indices_of(master, ReqFlags::SCHEDULED) {
        let Some(req) = topo.requirements.get_mut(index) else {
            continue;
        };
        req.flags.remove(ReqFlags::SCHEDULED);
        let caps = req.next_caps.bits();

        if let Err(err) = requirement_update(topo, hw, index, caps) {
            log::error!("Req: scheduled update {} of {:?} failed: {}", index, master, err);
            result = result.and(Err(err));
        }
    }

    result
}

/// Drop every scheduled requirement of a master
pub fn cancel_scheduled(topo: &mut Topology, master: NodeId) {
    for index in topo.requirements.indices_of(master, ReqFlags::SCHEDULED) {
        if let Some(req) = topo.requirements.get_mut(index) {
            req.flags.remove(ReqFlags::SCHEDULED);
        }
    }
}

/// Stop using a slave
///
/// Clears the usage, lets the slave drop to what remaining users need and
/// fires [`Event::ZeroUsers`] when nobody uses it any more.
pub fn release(topo: &mut Topology, hw: &mut dyn Platform, index: ReqIndex) -> Result<()> {
    let req = topo.requirements.get_mut(index).ok_or(Error::Failure)?;
    let was_using = req.is_using();
    let slave = req.slave;

    req.flags.remove(ReqFlags::USING | ReqFlags::SCHEDULED);
    req.curr_caps = Capabilities::empty();
    req.latency_req = u32::MAX;

    let result = slave::update_slave(topo, hw, slave);

    if was_using && !topo.requirements.has_users(slave) {
        notifier::notifier_event(topo, hw, slave, Event::ZeroUsers);
    }

    result
}

/// Release every slave a master is using
pub fn release_all(topo: &mut Topology, hw: &mut dyn Platform, master: NodeId) {
    for index in topo.requirements.indices_of(master, ReqFlags::USING) {
        if let Err(err) = release(topo, hw, index) {
            log::error!("Req: releasing {} of {:?} failed: {}", index, master, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::zynqmp::*;
    use crate::drivers::mock::MockPlatform;

    fn setup() -> (Topology, MockPlatform) {
        (Topology::new(&TOPOLOGY).unwrap(), MockPlatform::new())
    }

    fn request(topo: &mut Topology, hw: &mut MockPlatform, master: NodeId, slave: NodeId, caps: u32) {
        let index = topo.requirements.find(master, slave).unwrap();
        topo.requirements.get_mut(index).unwrap().flags.insert(ReqFlags::USING);
        requirement_update(topo, hw, index, caps).unwrap();
    }

    #[test]
    fn test_every_master_slave_pair_has_a_requirement() {
        let (topo, _) = setup();
        for master in TOPOLOGY.masters {
            for &slave in master.slaves {
                assert!(topo.requirements.find(master.id, slave).is_some());
            }
        }
        assert!(topo.requirements.find(NODE_RPU_1, NODE_USB_0).is_none());
    }

    #[test]
    fn test_demand_is_union_of_users() {
        let (mut topo, mut hw) = setup();
        request(&mut topo, &mut hw, NODE_APU, NODE_OCM_BANK_0, Capabilities::CONTEXT.bits());
        request(&mut topo, &mut hw, NODE_RPU_0, NODE_OCM_BANK_0, Capabilities::ACCESS.bits());

        let (caps, latency) = topo.requirements.slave_demand(NODE_OCM_BANK_0);
        assert_eq!(caps, Capabilities::ACCESS | Capabilities::CONTEXT);
        assert_eq!(latency, u32::MAX);
        assert_eq!(
            topo.requirements.usage_status(NODE_OCM_BANK_0, NODE_APU),
            USAGE_THIS_MASTER | USAGE_OTHER_MASTERS
        );
        assert_eq!(topo.requirements.usage_status(NODE_OCM_BANK_1, NODE_APU), 0);
    }

    #[test]
    fn test_failed_update_restores_caps() {
        let (mut topo, mut hw) = setup();
        request(&mut topo, &mut hw, NODE_APU, NODE_L2, Capabilities::ACCESS.bits());
        let index = topo.requirements.find(NODE_APU, NODE_L2).unwrap();

        assert_eq!(
            requirement_update(&mut topo, &mut hw, index, Capabilities::WAKEUP.bits()),
            Err(Error::NoFeature)
        );
        assert_eq!(topo.requirements.get(index).unwrap().curr_caps, Capabilities::ACCESS);

        assert_eq!(requirement_update(&mut topo, &mut hw, index, 0x80), Err(Error::InvalidParam));
    }

    #[test]
    fn test_scheduled_applied_and_cancelled() {
        let (mut topo, mut hw) = setup();
        request(&mut topo, &mut hw, NODE_RPU_0, NODE_TCM_0_A, Capabilities::ACCESS.bits());
        let index = topo.requirements.find(NODE_RPU_0, NODE_TCM_0_A).unwrap();

        requirement_schedule(&mut topo, index, Capabilities::CONTEXT.bits()).unwrap();
        cancel_scheduled(&mut topo, NODE_RPU_0);
        assert_eq!(apply_scheduled(&mut topo, &mut hw, NODE_RPU_0), Ok(()));
        assert_eq!(topo.requirements.get(index).unwrap().curr_caps, Capabilities::ACCESS);

        requirement_schedule(&mut topo, index, Capabilities::CONTEXT.bits()).unwrap();
        assert_eq!(apply_scheduled(&mut topo, &mut hw, NODE_RPU_0), Ok(()));
        assert_eq!(topo.requirements.get(index).unwrap().curr_caps, Capabilities::CONTEXT);
        assert_eq!(topo.nodes.slave(NODE_TCM_0_A).unwrap().state, slave::SRAM_RETENTION);
    }

    #[test]
    fn test_release_all_turns_slaves_off() {
        let (mut topo, mut hw) = setup();
        request(&mut topo, &mut hw, NODE_RPU_1, NODE_UART_1, Capabilities::ACCESS.bits());
        request(&mut topo, &mut hw, NODE_RPU_1, NODE_TCM_1_A, Capabilities::ACCESS.bits());

        release_all(&mut topo, &mut hw, NODE_RPU_1);
        assert!(!topo.requirements.has_users(NODE_UART_1));
        assert!(topo.nodes.slave(NODE_UART_1).unwrap().is_off());
        assert!(topo.nodes.slave(NODE_TCM_1_A).unwrap().is_off());
    }

    #[test]
    fn test_wake_masters() {
        let (mut topo, _) = setup();
        let index = topo.requirements.find(NODE_RPU_0, NODE_USB_0).unwrap();
        topo.requirements.get_mut(index).unwrap().flags.insert(ReqFlags::WAKEUP);
        assert_eq!(topo.requirements.wake_masters(NODE_USB_0).as_slice(), &[NODE_RPU_0]);
        assert!(topo.requirements.wake_masters(NODE_UART_0).is_empty());
    }
}
