//! Processor state machine
//!
//! Processor states:
//! - ForcedDown: powered off without the processor's cooperation
//! - Active: running
//! - Suspending: announced a self suspend, waiting for its WFI
//! - Suspended: WFI observed, processor asleep
//!
//! Transitions are driven by [`proc_fsm`]. Every physical transition goes
//! through [`SystemControl::power_action`](crate::drivers::SystemControl),
//! which may refuse it; the state only changes once the hardware agreed.

use crate::core::master;
use crate::core::notifier;
use crate::core::node::{power, state_changed, NodeId};
use crate::core::Topology;
use crate::drivers::{Platform, PowerAction};
use crate::{Error, Result};

/// Low exception vector base, accepted under [`ResumePolicy::Vectors`]
pub const RESUME_VECTOR_LOW: u64 = 0x0000_0000;
/// High exception vector base, accepted under [`ResumePolicy::Vectors`]
pub const RESUME_VECTOR_HIGH: u64 = 0xFFFF_0000;

/// Processor FSM state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcState {
    /// Powered off without notice
    ForcedDown = 0,
    /// Running
    Active = 1,
    /// Asleep after a completed self suspend
    Suspended = 2,
    /// Self suspend announced, WFI not yet observed
    Suspending = 3,
}

impl ProcState {
    /// Get raw value
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Check if the processor counts as powered down
    pub fn is_down(self) -> bool {
        matches!(self, Self::ForcedDown | Self::Suspended)
    }
}

/// Events fed into the processor FSM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcEvent {
    /// Processor announced its own suspend
    SelfSuspend,
    /// WFI interrupt of a suspending processor
    Sleep,
    /// Wake request
    Wake,
    /// Processor withdrew its suspend
    AbortSuspend,
    /// Immediate power down
    ForcePowerdown,
}

/// Which resume addresses a processor accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Any address
    Any,
    /// Only the low or high exception vector base
    Vectors,
}

impl ResumePolicy {
    /// Check if an address is an acceptable resume address
    pub fn accepts(self, address: u64) -> bool {
        match self {
            ResumePolicy::Any => true,
            ResumePolicy::Vectors => {
                address == RESUME_VECTOR_LOW || address == RESUME_VECTOR_HIGH
            }
        }
    }
}

/// Processor node data
#[derive(Debug, Clone)]
pub struct Processor {
    /// Owning master
    pub master: NodeId,
    /// FSM state
    pub state: ProcState,
    /// Time needed to power down
    pub pwr_dn_latency: u32,
    /// Time needed to power up
    pub pwr_up_latency: u32,
    /// Wake latency bound given with the last self suspend
    pub latency_req: u32,
    /// Address to resume from on the next wake
    pub resume_addr: Option<u64>,
    /// Accepted resume addresses
    pub resume_policy: ResumePolicy,
    power: [u32; 4],
}

impl Processor {
    /// Create a processor in its initial state
    pub fn new(
        master: NodeId,
        pwr_dn_latency: u32,
        pwr_up_latency: u32,
        resume_policy: ResumePolicy,
        power: [u32; 4],
        initial: ProcState,
    ) -> Self {
        Self {
            master,
            state: initial,
            pwr_dn_latency,
            pwr_up_latency,
            latency_req: u32::MAX,
            resume_addr: None,
            resume_policy,
            power,
        }
    }

    /// Check if the processor is powered down
    pub fn is_down(&self) -> bool {
        self.state.is_down()
    }

    /// Smallest latency a self suspend may ask for
    pub fn min_suspend_latency(&self) -> u32 {
        self.pwr_dn_latency.saturating_add(self.pwr_up_latency)
    }

    /// Power consumption in the current state
    pub fn power_consumption(&self) -> u32 {
        self.power[self.state as usize]
    }

    /// Time needed to become active again
    pub fn wake_latency(&self) -> u32 {
        match self.state {
            ProcState::Active => 0,
            _ => self.pwr_up_latency,
        }
    }

    /// Remember the address to resume from
    pub fn save_resume_addr(&mut self, address: u64) -> Result<()> {
        if !self.resume_policy.accepts(address) {
            log::warn!("Proc: resume address {:#x} not supported", address);
            return Err(Error::InvalidParam);
        }
        self.resume_addr = Some(address);
        Ok(())
    }
}

/// Feed an event into a processor's state machine
pub fn proc_fsm(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    id: NodeId,
    event: ProcEvent,
) -> Result<()> {
    let prev = topo.nodes.proc(id).ok_or(Error::InvalidNode)?.state;

    let next = match (prev, event) {
        (ProcState::Active, ProcEvent::SelfSuspend) => {
            hw.power_action(id, PowerAction::ArmWfi)?;
            ProcState::Suspending
        }
        (ProcState::Suspending, ProcEvent::Sleep) => {
            hw.power_action(id, PowerAction::ProcSleep)?;
            ProcState::Suspended
        }
        (ProcState::Suspending, ProcEvent::AbortSuspend)
        | (ProcState::Suspending, ProcEvent::Wake) => {
            hw.power_action(id, PowerAction::DisarmWfi)?;
            ProcState::Active
        }
        (ProcState::Suspended, ProcEvent::Wake) | (ProcState::ForcedDown, ProcEvent::Wake) => {
            if let Some(parent) = topo.nodes.parent(id) {
                power::power_up(topo, hw, parent)?;
            }
            let resume = topo.nodes.proc(id).and_then(|p| p.resume_addr);
            hw.power_action(id, PowerAction::ProcWake { resume })?;
            ProcState::Active
        }
        (ProcState::Active, ProcEvent::Wake) => return Ok(()),
        (ProcState::ForcedDown, ProcEvent::ForcePowerdown) => return Ok(()),
        (_, ProcEvent::ForcePowerdown) => {
            hw.power_action(id, PowerAction::ProcOff)?;
            ProcState::ForcedDown
        }
        (state, event) => {
            log::warn!("Proc: {:?} illegal event {:?} in state {:?}", id, event, state);
            return Err(Error::Internal);
        }
    };

    if let Some(proc) = topo.nodes.proc_mut(id) {
        proc.state = next;
        if next == ProcState::Active {
            proc.resume_addr = None;
            proc.latency_req = u32::MAX;
        }
    }
    log::debug!("Proc: {:?} {:?} -> {:?}", id, prev, next);

    // Notifier wake-ups wait until the transition is complete
    notifier::hold_wakes(topo);

    match (prev, next) {
        (ProcState::Suspending, ProcState::Suspended) => {
            master::on_proc_sleep(topo, hw, id);
            if let Some(parent) = topo.nodes.parent(id) {
                power::opportunistic_suspend(topo, hw, parent);
            }
        }
        (ProcState::Suspending, ProcState::Active) => master::on_proc_abort(topo, hw, id),
        (_, ProcState::ForcedDown) => master::on_proc_forced_down(topo, hw, id),
        _ => {}
    }
    state_changed(topo, hw, id);

    notifier::release_wakes(topo, hw);
    Ok(())
}

/// WFI interrupt of a processor: completes its self suspend
pub fn handle_wfi(topo: &mut Topology, hw: &mut dyn Platform, id: NodeId) -> Result<()> {
    log::trace!("Proc: WFI from {:?}", id);
    proc_fsm(topo, hw, id, ProcEvent::Sleep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::zynqmp::*;
    use crate::drivers::mock::MockPlatform;

    fn setup() -> (Topology, MockPlatform) {
        (Topology::new(&TOPOLOGY).unwrap(), MockPlatform::new())
    }

    fn state(topo: &Topology, id: NodeId) -> ProcState {
        topo.nodes.proc(id).unwrap().state
    }

    #[test]
    fn test_resume_policy() {
        assert!(ResumePolicy::Any.accepts(0x8000_1000));
        assert!(ResumePolicy::Vectors.accepts(RESUME_VECTOR_LOW));
        assert!(ResumePolicy::Vectors.accepts(RESUME_VECTOR_HIGH));
        assert!(!ResumePolicy::Vectors.accepts(0x1000));
    }

    #[test]
    fn test_save_resume_addr_rejects_bad_vector() {
        let mut proc = Processor::new(
            NODE_RPU_0,
            1,
            1,
            ResumePolicy::Vectors,
            [0; 4],
            ProcState::Active,
        );
        assert_eq!(proc.save_resume_addr(0x1234), Err(Error::InvalidParam));
        assert_eq!(proc.resume_addr, None);
        assert_eq!(proc.save_resume_addr(RESUME_VECTOR_HIGH), Ok(()));
        assert_eq!(proc.resume_addr, Some(RESUME_VECTOR_HIGH));
    }

    #[test]
    fn test_suspend_then_sleep() {
        let (mut topo, mut hw) = setup();
        assert_eq!(proc_fsm(&mut topo, &mut hw, NODE_RPU_0, ProcEvent::SelfSuspend), Ok(()));
        assert_eq!(state(&topo, NODE_RPU_0), ProcState::Suspending);
        assert_eq!(handle_wfi(&mut topo, &mut hw, NODE_RPU_0), Ok(()));
        assert_eq!(state(&topo, NODE_RPU_0), ProcState::Suspended);
        assert!(hw.actions.contains(&(NODE_RPU_0, PowerAction::ArmWfi)));
        assert!(hw.actions.contains(&(NODE_RPU_0, PowerAction::ProcSleep)));
    }

    #[test]
    fn test_abort_only_from_suspending() {
        let (mut topo, mut hw) = setup();
        assert_eq!(
            proc_fsm(&mut topo, &mut hw, NODE_RPU_0, ProcEvent::AbortSuspend),
            Err(Error::Internal)
        );
        assert_eq!(state(&topo, NODE_RPU_0), ProcState::Active);

        proc_fsm(&mut topo, &mut hw, NODE_RPU_0, ProcEvent::SelfSuspend).unwrap();
        assert_eq!(proc_fsm(&mut topo, &mut hw, NODE_RPU_0, ProcEvent::AbortSuspend), Ok(()));
        assert_eq!(state(&topo, NODE_RPU_0), ProcState::Active);
    }

    #[test]
    fn test_sleep_without_suspend_is_illegal() {
        let (mut topo, mut hw) = setup();
        assert_eq!(handle_wfi(&mut topo, &mut hw, NODE_APU_0), Err(Error::Internal));
        assert_eq!(state(&topo, NODE_APU_0), ProcState::Active);
    }

    #[test]
    fn test_refused_power_action_keeps_state() {
        let (mut topo, mut hw) = setup();
        hw.fail_action = Some((NODE_RPU_1, PowerAction::ProcOff));
        assert_eq!(
            proc_fsm(&mut topo, &mut hw, NODE_RPU_1, ProcEvent::ForcePowerdown),
            Err(Error::Failure)
        );
        assert_eq!(state(&topo, NODE_RPU_1), ProcState::Active);
    }

    #[test]
    fn test_wake_from_forced_down_uses_resume_address() {
        let (mut topo, mut hw) = setup();
        topo.nodes.proc_mut(NODE_APU_1).unwrap().save_resume_addr(0x8000_0000).unwrap();
        assert_eq!(proc_fsm(&mut topo, &mut hw, NODE_APU_1, ProcEvent::Wake), Ok(()));
        assert_eq!(state(&topo, NODE_APU_1), ProcState::Active);
        assert!(hw
            .actions
            .contains(&(NODE_APU_1, PowerAction::ProcWake { resume: Some(0x8000_0000) })));
        assert_eq!(topo.nodes.proc(NODE_APU_1).unwrap().resume_addr, None);
    }

    #[test]
    fn test_wake_active_is_noop() {
        let (mut topo, mut hw) = setup();
        assert_eq!(proc_fsm(&mut topo, &mut hw, NODE_APU_0, ProcEvent::Wake), Ok(()));
        assert!(hw.actions.is_empty());
    }

    #[test]
    fn test_not_a_processor() {
        let (mut topo, mut hw) = setup();
        assert_eq!(
            proc_fsm(&mut topo, &mut hw, NODE_UART_0, ProcEvent::Wake),
            Err(Error::InvalidNode)
        );
    }
}
