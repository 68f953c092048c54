//! Masters
//!
//! A master is a hardware agent issuing PM requests over its own IPI
//! channel. It owns one or more processors, the first being the primary
//! one whose suspend stands for the whole master. The hooks in this module
//! are called by the processor state machine and resolve whatever the
//! master left pending:
//! - scheduled requirements
//! - a suspend requested by another master
//! - requirements of a master that lost all of its processors

pub mod requirement;

use heapless::Vec;
use num_derive::FromPrimitive;

use crate::config::{MasterDesc, MAX_MASTERS};
use crate::core::api::ack::{process_ack, Ack};
use crate::core::node::proc::{self, ProcEvent, ProcState};
use crate::core::node::NodeId;
use crate::core::Topology;
use crate::drivers::ipi::IpiChannel;
use crate::drivers::Platform;
use crate::{status_word, Error, Result};

/// Why a master is asked to suspend
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum SuspendReason {
    /// Another master requested it
    PuRequest = 201,
    /// Unrecoverable condition
    Alert = 202,
    /// System shutdown or restart in progress
    SystemShutdown = 203,
}

/// Why a processor withdrew its suspend
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum AbortReason {
    /// Wake-up interrupt arrived meanwhile
    WakeupEvent = 100,
    /// Power unit busy
    PuBusy = 101,
    /// No power-down possible
    NoPowerdown = 102,
    /// Unknown reason
    Unknown = 103,
}

/// Suspend requested by another master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendRequest {
    /// Master that asked
    pub initiator: NodeId,
    /// How the initiator wants to be told about the outcome
    pub ack: Ack,
}

/// Runtime master data
#[derive(Debug, Clone)]
pub struct Master {
    /// Placeholder node id
    pub id: NodeId,
    /// Reply channel
    pub channel: IpiChannel,
    /// Owned processors, primary first
    pub procs: &'static [NodeId],
    /// Masters this one may ask to suspend
    pub may_suspend: &'static [NodeId],
    /// May shut down or restart the system
    pub system_privileged: bool,
    /// Outstanding suspend request targeting this master
    pub suspend_request: Option<SuspendRequest>,
}

impl Master {
    /// Create runtime data from a master description
    pub fn from_desc(desc: &MasterDesc) -> Self {
        Self {
            id: desc.id,
            channel: desc.channel,
            procs: desc.procs,
            may_suspend: desc.may_suspend,
            system_privileged: desc.system_privileged,
            suspend_request: None,
        }
    }

    /// Primary processor
    pub fn primary(&self) -> Option<NodeId> {
        self.procs.first().copied()
    }

    /// Check if a processor belongs to this master
    pub fn owns(&self, proc: NodeId) -> bool {
        self.procs.contains(&proc)
    }

    /// Check if this master may ask `target` to suspend
    pub fn can_request_suspend(&self, target: NodeId) -> bool {
        self.may_suspend.contains(&target)
    }
}

/// Table of all masters
#[derive(Debug, Default)]
pub struct MasterTable {
    masters: Vec<Master, MAX_MASTERS>,
}

impl MasterTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a master, giving it back if the table is full
    pub fn insert(&mut self, master: Master) -> ::core::result::Result<(), Master> {
        self.masters.push(master)
    }

    /// Iterate over all masters
    pub fn iter(&self) -> impl Iterator<Item = &Master> {
        self.masters.iter()
    }

    /// Get master by placeholder id
    pub fn get(&self, id: NodeId) -> Option<&Master> {
        self.masters.iter().find(|m| m.id == id)
    }

    /// Get mutable master by placeholder id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Master> {
        self.masters.iter_mut().find(|m| m.id == id)
    }

    /// Find the master listening on a channel
    pub fn by_channel(&self, channel: IpiChannel) -> Option<&Master> {
        self.masters.iter().find(|m| m.channel == channel)
    }

    /// Find the master owning a processor
    pub fn owner_of(&self, proc: NodeId) -> Option<&Master> {
        self.masters.iter().find(|m| m.owns(proc))
    }
}

fn primary_owner(topo: &Topology, proc: NodeId) -> Option<NodeId> {
    topo.masters
        .owner_of(proc)
        .filter(|m| m.primary() == Some(proc))
        .map(|m| m.id)
}

/// Tell the initiator of a pending suspend request how it ended
fn resolve_suspend_request(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    target: NodeId,
    result: Result<()>,
    oppoint: u32,
) {
    let Some(request) = topo.masters.get_mut(target).and_then(|m| m.suspend_request.take()) else {
        return;
    };

    let Some(initiator) = topo.masters.get(request.initiator) else {
        log::error!("PM: suspend initiator {:?} vanished", request.initiator);
        return;
    };

    log::debug!(
        "PM: suspend of {:?} requested by {:?} resolved: {}",
        target,
        request.initiator,
        status_word(&result)
    );
    process_ack(hw, initiator.channel, request.ack, target, status_word(&result), oppoint);
}

/// Primary processor completed its suspend
pub fn on_proc_sleep(topo: &mut Topology, hw: &mut dyn Platform, proc: NodeId) {
    let Some(master) = primary_owner(topo, proc) else {
        return;
    };

    if let Err(err) = requirement::apply_scheduled(topo, hw, master) {
        log::warn!("PM: scheduled requirements of {:?} failed: {}", master, err);
    }
    resolve_suspend_request(topo, hw, master, Ok(()), ProcState::Suspended.raw());
}

/// Primary processor went back to active before sleeping
pub fn on_proc_abort(topo: &mut Topology, hw: &mut dyn Platform, proc: NodeId) {
    let Some(master) = primary_owner(topo, proc) else {
        return;
    };

    requirement::cancel_scheduled(topo, master);
    resolve_suspend_request(topo, hw, master, Err(Error::AbortSuspend), ProcState::Active.raw());
}

/// A processor was forced down
pub fn on_proc_forced_down(topo: &mut Topology, hw: &mut dyn Platform, proc: NodeId) {
    if let Some(master) = primary_owner(topo, proc) {
        requirement::cancel_scheduled(topo, master);
        resolve_suspend_request(topo, hw, master, Ok(()), ProcState::ForcedDown.raw());
    }

    let Some(master) = topo.masters.owner_of(proc) else {
        return;
    };
    let id = master.id;
    let all_down = master
        .procs
        .iter()
        .all(|&p| topo.nodes.proc(p).map_or(true, |p| p.state == ProcState::ForcedDown));

    if all_down {
        log::info!("PM: all processors of {:?} forced down, releasing its slaves", id);
        requirement::release_all(topo, hw, id);
    }
}

/// Wake the primary processor of a master if it is suspended
pub fn wake_master(topo: &mut Topology, hw: &mut dyn Platform, master: NodeId) -> Result<()> {
    let primary = topo
        .masters
        .get(master)
        .and_then(Master::primary)
        .ok_or(Error::InvalidNode)?;

    match topo.nodes.proc(primary).map(|p| p.state) {
        Some(ProcState::Suspended) => {
            log::debug!("PM: waking {:?} through {:?}", master, primary);
            proc::proc_fsm(topo, hw, primary, ProcEvent::Wake)
        }
        Some(_) => Ok(()),
        None => Err(Error::InvalidNode),
    }
}

/// Interrupt from a wake-up source slave
///
/// Wakes every master that enabled the slave as its wake-up source.
pub fn handle_wake_event(topo: &mut Topology, hw: &mut dyn Platform, source: NodeId) {
    let masters = topo.requirements.wake_masters(source);
    if masters.is_empty() {
        log::debug!("PM: wake event from {:?} has no listener", source);
    }

    for master in masters {
        if let Err(err) = wake_master(topo, hw, master) {
            log::error!("PM: waking {:?} on event from {:?} failed: {}", master, source, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::zynqmp::*;
    use crate::core::master::requirement::ReqFlags;
    use crate::drivers::mock::MockPlatform;

    fn setup() -> (Topology, MockPlatform) {
        (Topology::new(&TOPOLOGY).unwrap(), MockPlatform::new())
    }

    fn suspend(topo: &mut Topology, hw: &mut MockPlatform, proc: NodeId) {
        proc::proc_fsm(topo, hw, proc, ProcEvent::SelfSuspend).unwrap();
        proc::handle_wfi(topo, hw, proc).unwrap();
    }

    #[test]
    fn test_master_table() {
        let (topo, _) = setup();
        let apu = topo.masters.get(NODE_APU).unwrap();
        assert_eq!(apu.primary(), Some(NODE_APU_0));
        assert!(apu.owns(NODE_APU_3));
        assert!(!apu.owns(NODE_RPU_0));
        assert!(apu.can_request_suspend(NODE_RPU_0));
        assert!(!apu.can_request_suspend(NODE_APU));
        assert_eq!(topo.masters.by_channel(IPI_RPU_1).map(|m| m.id), Some(NODE_RPU_1));
        assert_eq!(topo.masters.owner_of(NODE_APU_2).map(|m| m.id), Some(NODE_APU));
    }

    #[test]
    fn test_sleep_resolves_suspend_request() {
        let (mut topo, mut hw) = setup();
        topo.masters.get_mut(NODE_RPU_0).unwrap().suspend_request =
            Some(SuspendRequest { initiator: NODE_APU, ack: Ack::NonBlocking });

        suspend(&mut topo, &mut hw, NODE_RPU_0);
        assert_eq!(topo.masters.get(NODE_RPU_0).unwrap().suspend_request, None);
        assert_eq!(hw.acks, vec![(IPI_APU, NODE_RPU_0, 0, ProcState::Suspended.raw())]);
    }

    #[test]
    fn test_abort_resolves_with_abort_status() {
        let (mut topo, mut hw) = setup();
        topo.masters.get_mut(NODE_RPU_0).unwrap().suspend_request =
            Some(SuspendRequest { initiator: NODE_APU, ack: Ack::NonBlocking });

        proc::proc_fsm(&mut topo, &mut hw, NODE_RPU_0, ProcEvent::SelfSuspend).unwrap();
        proc::proc_fsm(&mut topo, &mut hw, NODE_RPU_0, ProcEvent::AbortSuspend).unwrap();
        assert_eq!(
            hw.acks,
            vec![(IPI_APU, NODE_RPU_0, Error::AbortSuspend.code(), ProcState::Active.raw())]
        );
    }

    #[test]
    fn test_secondary_processor_does_not_resolve() {
        let (mut topo, mut hw) = setup();
        proc::proc_fsm(&mut topo, &mut hw, NODE_APU_1, ProcEvent::Wake).unwrap();
        topo.masters.get_mut(NODE_APU).unwrap().suspend_request =
            Some(SuspendRequest { initiator: NODE_RPU_0, ack: Ack::NonBlocking });

        suspend(&mut topo, &mut hw, NODE_APU_1);
        assert!(topo.masters.get(NODE_APU).unwrap().suspend_request.is_some());
        assert!(hw.acks.is_empty());
    }

    #[test]
    fn test_forced_down_master_releases_slaves() {
        let (mut topo, mut hw) = setup();
        let index = topo.requirements.find(NODE_RPU_1, NODE_UART_1).unwrap();
        topo.requirements.get_mut(index).unwrap().flags.insert(ReqFlags::USING);
        requirement::requirement_update(&mut topo, &mut hw, index, 1).unwrap();
        assert!(!topo.nodes.slave(NODE_UART_1).unwrap().is_off());

        proc::proc_fsm(&mut topo, &mut hw, NODE_RPU_1, ProcEvent::ForcePowerdown).unwrap();
        assert!(!topo.requirements.get(index).unwrap().is_using());
        assert!(topo.nodes.slave(NODE_UART_1).unwrap().is_off());
    }

    #[test]
    fn test_wake_event_wakes_listening_master() {
        let (mut topo, mut hw) = setup();
        let index = topo.requirements.find(NODE_RPU_0, NODE_TTC_0).unwrap();
        topo.requirements.get_mut(index).unwrap().flags.insert(ReqFlags::WAKEUP);
        suspend(&mut topo, &mut hw, NODE_RPU_0);
        suspend(&mut topo, &mut hw, NODE_RPU_1);

        handle_wake_event(&mut topo, &mut hw, NODE_TTC_0);
        assert_eq!(topo.nodes.proc(NODE_RPU_0).unwrap().state, ProcState::Active);
        assert_eq!(topo.nodes.proc(NODE_RPU_1).unwrap().state, ProcState::Suspended);
    }
}
