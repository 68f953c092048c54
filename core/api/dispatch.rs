//! PM API handlers
//!
//! One handler per [`ApiId`]. Each handler acknowledges its request exactly
//! once: a fixed blocking reply, or through [`process_ack`] with the mode the
//! master passed in. `RequestSuspend` is the only handler that, on success,
//! leaves the acknowledge to a later event.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::ack::{process_ack, Ack};
use super::{ApiId, PAYLOAD_LEN};
use crate::config::api_version;
use crate::core::master::requirement::{self, ReqFlags};
use crate::core::master::{AbortReason, SuspendReason, SuspendRequest};
use crate::core::node::power;
use crate::core::node::proc::{self, ProcEvent, ProcState};
use crate::core::node::{slave, Node, NodeId, NodeType};
use crate::core::notifier::Events;
use crate::core::system;
use crate::core::Topology;
use crate::drivers::ipi::{self, IpiChannel};
use crate::drivers::{Platform, ResetAction};
use crate::{status_word, Error, Result, STATUS_SUCCESS};

/// Operating characteristic queried by `GetOpCharacteristic`
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum OpCharType {
    /// Power consumption in the current state
    Power = 1,
    /// Temperature
    Temperature = 2,
    /// Latency back to the highest state
    Latency = 3,
}

/// Master a request came from
#[derive(Debug, Clone, Copy)]
struct Caller {
    id: NodeId,
    channel: IpiChannel,
}

fn ack_arg(word: u32) -> Ack {
    Ack::from_u32(word).unwrap_or(Ack::No)
}

/// Dispatch a validated request to its handler
pub fn process_api_call(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    master: NodeId,
    channel: IpiChannel,
    api: ApiId,
    pload: &[u32; PAYLOAD_LEN],
) {
    let caller = Caller { id: master, channel };
    log::debug!("PM: {:?} from {:?} args {:?}", api, master, &pload[1..]);

    match api {
        ApiId::SelfSuspend => {
            let address = (u64::from(pload[5]) << 32) | u64::from(pload[4]);
            self_suspend(topo, hw, caller, NodeId(pload[1]), pload[2], pload[3], address)
        }
        ApiId::RequestSuspend => request_suspend(
            topo,
            hw,
            caller,
            NodeId(pload[1]),
            ack_arg(pload[2]),
            pload[3],
            pload[4],
        ),
        ApiId::ForcePowerdown => force_powerdown(topo, hw, caller, NodeId(pload[1]), ack_arg(pload[2])),
        ApiId::AbortSuspend => abort_suspend(topo, hw, caller, pload[1], NodeId(pload[2])),
        ApiId::RequestWakeup => {
            // Bit 0 of the low address word flags a valid address
            let set_address = pload[2] & 0x1 != 0;
            let address = (u64::from(pload[3]) << 32) | u64::from(pload[2] & !0x1);
            let address = set_address.then_some(address);
            request_wakeup(topo, hw, caller, NodeId(pload[1]), address, ack_arg(pload[4]))
        }
        ApiId::SetWakeupSource => {
            set_wakeup_source(topo, hw, caller, NodeId(pload[1]), NodeId(pload[2]), pload[3])
        }
        ApiId::SystemShutdown => system_shutdown(topo, hw, caller, pload[1]),
        ApiId::RequestNode => {
            request_node(topo, hw, caller, NodeId(pload[1]), pload[2], ack_arg(pload[4]))
        }
        ApiId::ReleaseNode => release_node(topo, hw, caller, NodeId(pload[1])),
        ApiId::SetRequirement => {
            set_requirement(topo, hw, caller, NodeId(pload[1]), pload[2], ack_arg(pload[4]))
        }
        ApiId::SetMaxLatency => set_max_latency(topo, hw, caller, NodeId(pload[1]), pload[2]),
        ApiId::GetApiVersion => get_api_version(hw, caller),
        ApiId::SetConfiguration => set_configuration(hw, caller, pload[1]),
        ApiId::GetNodeStatus => get_node_status(topo, hw, caller, NodeId(pload[1])),
        ApiId::GetOpCharacteristic => {
            get_op_characteristic(topo, hw, caller, NodeId(pload[1]), pload[2])
        }
        ApiId::RegisterNotifier => register_notifier(
            topo,
            hw,
            caller,
            NodeId(pload[1]),
            pload[2],
            pload[3],
            pload[4],
        ),
        ApiId::ResetAssert => reset_assert(hw, caller, pload[1], pload[2]),
        ApiId::ResetGetStatus => reset_get_status(hw, caller, pload[1]),
        ApiId::MmioWrite => mmio_write(topo, hw, caller, pload[1], pload[2], pload[3]),
        ApiId::MmioRead => mmio_read(topo, hw, caller, pload[1]),
    }
}

/// Processor `node` if it belongs to `master`
fn proc_of_master(topo: &Topology, master: NodeId, node: NodeId) -> Option<NodeId> {
    let owned = topo.masters.get(master).map_or(false, |m| m.owns(node));
    (owned && topo.nodes.proc(node).is_some()).then_some(node)
}

/// Requirement of the caller for a slave it has requested
fn requested(topo: &Topology, master: NodeId, slave: NodeId) -> Result<requirement::ReqIndex> {
    let index = topo.requirements.find(master, slave).ok_or_else(|| {
        log::warn!("PM: {:?} may not use {:?}", master, slave);
        Error::NoAccess
    })?;

    match topo.requirements.get(index) {
        Some(req) if req.is_using() => Ok(index),
        _ => {
            log::warn!("PM: {:?} has not requested {:?}", master, slave);
            Err(Error::NoAccess)
        }
    }
}

fn node_state(topo: &Topology, node: NodeId) -> u32 {
    topo.nodes.get(node).map_or(0, Node::state)
}

fn do_self_suspend(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    latency: u32,
    address: u64,
) -> Result<()> {
    let proc_id = proc_of_master(topo, caller.id, node).ok_or_else(|| {
        log::warn!("PM: {:?} is not a processor of {:?}", node, caller.id);
        Error::InvalidParam
    })?;
    let processor = topo.nodes.proc(proc_id).ok_or(Error::InvalidParam)?;

    let worst_case = processor.min_suspend_latency();
    if latency < worst_case {
        log::warn!("PM: latency {} below worst case {}", latency, worst_case);
        return Err(Error::InvalidParam);
    }

    if !processor.resume_policy.accepts(address) {
        log::warn!("PM: {:?} cannot resume from {:#x}", node, address);
        return Err(Error::InvalidParam);
    }

    proc::proc_fsm(topo, hw, proc_id, ProcEvent::SelfSuspend)?;

    if let Some(processor) = topo.nodes.proc_mut(proc_id) {
        processor.latency_req = latency;
        processor.resume_addr = Some(address);
    }
    Ok(())
}

fn self_suspend(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    latency: u32,
    state: u32,
    address: u64,
) {
    log::debug!("PM: self suspend {:?} latency {} state {}", node, latency, state);

    let result = do_self_suspend(topo, hw, caller, node, latency, address);
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn do_request_suspend(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    ack: Ack,
    latency: u32,
    state: u32,
) -> Result<()> {
    // Completion depends on another master, blocking would stall us
    if ack == Ack::Blocking {
        log::warn!("PM: blocking acknowledge not allowed for suspend requests");
        return Err(Error::InvalidParam);
    }

    if topo.system.is_shutting_down() {
        return Err(Error::Conflict);
    }

    let target = topo.masters.get(node).ok_or_else(|| {
        log::warn!("PM: {:?} is not a master", node);
        Error::InvalidParam
    })?;

    let allowed = topo
        .masters
        .get(caller.id)
        .map_or(false, |m| m.can_request_suspend(node));
    if !allowed {
        log::warn!("PM: {:?} may not suspend {:?}", caller.id, node);
        return Err(Error::NoAccess);
    }

    if target.suspend_request.is_some() {
        return Err(Error::DoubleRequest);
    }

    let channel = target.channel;
    if let Some(target) = topo.masters.get_mut(node) {
        target.suspend_request = Some(SuspendRequest { initiator: caller.id, ack });
    }
    hw.init_suspend(channel, SuspendReason::PuRequest, latency, state, 0);
    Ok(())
}

fn request_suspend(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    ack: Ack,
    latency: u32,
    state: u32,
) {
    let result = do_request_suspend(topo, hw, caller, node, ack, latency, state);

    // Success is acknowledged once the target suspends or aborts
    if let Err(err) = result {
        process_ack(hw, caller.channel, ack, node, err.code(), 0);
    }
}

fn force_powerdown(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, node: NodeId, ack: Ack) {
    let result = match topo.nodes.get(node).map(Node::node_type) {
        Some(NodeType::Processor) => proc::proc_fsm(topo, hw, node, ProcEvent::ForcePowerdown),
        Some(NodeType::PowerIsland) | Some(NodeType::PowerDomain) => {
            power::force_down_tree(topo, hw, node)
        }
        _ => {
            log::warn!("PM: {:?} cannot be forced down", node);
            Err(Error::InvalidParam)
        }
    };

    let oppoint = node_state(topo, node);

    if result.is_ok() {
        if let Some(parent) = topo.nodes.parent(node) {
            power::opportunistic_suspend(topo, hw, parent);
        }
    }

    process_ack(hw, caller.channel, ack, node, status_word(&result), oppoint);
}

fn abort_suspend(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, reason: u32, node: NodeId) {
    match AbortReason::from_u32(reason) {
        Some(reason) => log::debug!("PM: abort suspend of {:?}: {:?}", node, reason),
        None => log::debug!("PM: abort suspend of {:?}: reason {}", node, reason),
    }

    let result = match proc_of_master(topo, caller.id, node) {
        Some(proc_id) => proc::proc_fsm(topo, hw, proc_id, ProcEvent::AbortSuspend),
        None => {
            log::warn!("PM: {:?} may not abort suspend of {:?}", caller.id, node);
            Err(Error::InvalidNode)
        }
    };

    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn do_request_wakeup(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    node: NodeId,
    address: Option<u64>,
) -> Result<()> {
    if topo.system.is_shutting_down() {
        return Err(Error::Conflict);
    }

    let processor = topo.nodes.proc_mut(node).ok_or(Error::InvalidNode)?;
    if let Some(address) = address {
        processor.save_resume_addr(address)?;
    }

    proc::proc_fsm(topo, hw, node, ProcEvent::Wake)
}

fn request_wakeup(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    address: Option<u64>,
    ack: Ack,
) {
    let result = do_request_wakeup(topo, hw, node, address);

    let oppoint = node_state(topo, node);
    process_ack(hw, caller.channel, ack, node, status_word(&result), oppoint);
}

fn do_set_wakeup_source(
    topo: &mut Topology,
    caller: Caller,
    target: NodeId,
    source: NodeId,
    enable: u32,
) -> Result<()> {
    if target != caller.id && proc_of_master(topo, caller.id, target).is_none() {
        return Err(Error::InvalidParam);
    }

    let index = topo.requirements.find(caller.id, source).ok_or(Error::NoAccess)?;

    if topo.nodes.slave(source).and_then(|s| s.wake_irq).is_none() {
        log::warn!("PM: {:?} has no wake-up interrupt", source);
        return Err(Error::NoFeature);
    }

    let req = topo.requirements.get_mut(index).ok_or(Error::Failure)?;
    req.flags.set(ReqFlags::WAKEUP, enable != 0);
    Ok(())
}

fn set_wakeup_source(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    target: NodeId,
    source: NodeId,
    enable: u32,
) {
    let result = do_set_wakeup_source(topo, caller, target, source, enable);

    log::debug!("PM: wake-up source {:?} for {:?}: {}", source, target, enable);
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn system_shutdown(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, restart: u32) {
    let result = system::system_shutdown(topo, hw, caller.id, restart);
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn do_request_node(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    caps: u32,
) -> Result<()> {
    // Every legal master/slave pair has one requirement
    let index = topo.requirements.find(caller.id, node).ok_or_else(|| {
        log::warn!("PM: {:?} may not use {:?}", caller.id, node);
        Error::NoAccess
    })?;

    let req = topo.requirements.get_mut(index).ok_or(Error::Failure)?;
    if req.is_using() {
        return Err(Error::DoubleRequest);
    }
    req.flags.insert(ReqFlags::USING);

    let result = requirement::requirement_update(topo, hw, index, caps);
    if result.is_err() {
        if let Some(req) = topo.requirements.get_mut(index) {
            req.flags.remove(ReqFlags::USING);
        }
    }
    result
}

fn request_node(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    caps: u32,
    ack: Ack,
) {
    let result = do_request_node(topo, hw, caller, node, caps);

    let oppoint = node_state(topo, node);
    process_ack(hw, caller.channel, ack, node, status_word(&result), oppoint);
}

fn do_release_node(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
) -> Result<()> {
    let index = topo.requirements.find(caller.id, node).ok_or_else(|| {
        log::warn!("PM: {:?} may not use {:?}", caller.id, node);
        Error::NoAccess
    })?;

    if !topo.requirements.get(index).map_or(false, |r| r.is_using()) {
        log::warn!("PM: {:?} releases {:?} without previous request", caller.id, node);
    }

    requirement::release(topo, hw, index)
}

fn release_node(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, node: NodeId) {
    let result = do_release_node(topo, hw, caller, node);
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn do_set_requirement(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    caps: u32,
) -> Result<()> {
    let index = requested(topo, caller.id, node)?;

    let primary = topo.masters.get(caller.id).and_then(|m| m.primary());
    match primary.and_then(|p| topo.nodes.proc(p)).map(|p| p.state) {
        // Applied once the primary processor is asleep
        Some(ProcState::Suspending) => requirement::requirement_schedule(topo, index, caps),
        Some(ProcState::Active) => requirement::requirement_update(topo, hw, index, caps),
        state => {
            log::error!("PM: {:?} sets requirements in state {:?}", caller.id, state);
            Err(Error::Failure)
        }
    }
}

fn set_requirement(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    caps: u32,
    ack: Ack,
) {
    let result = do_set_requirement(topo, hw, caller, node, caps);

    let oppoint = node_state(topo, node);
    process_ack(hw, caller.channel, ack, node, status_word(&result), oppoint);
}

fn do_set_max_latency(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    latency: u32,
) -> Result<()> {
    let index = requested(topo, caller.id, node)?;
    let req = topo.requirements.get_mut(index).ok_or(Error::Failure)?;
    let prev = req.latency_req;
    req.latency_req = latency;

    let result = slave::update_slave(topo, hw, node);
    if result.is_err() {
        if let Some(req) = topo.requirements.get_mut(index) {
            req.latency_req = prev;
        }
    }
    result
}

fn set_max_latency(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, node: NodeId, latency: u32) {
    let result = do_set_max_latency(topo, hw, caller, node, latency);
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn get_api_version(hw: &mut dyn Platform, caller: Caller) {
    ipi::respond2(hw, caller.channel, STATUS_SUCCESS, api_version());
}

fn set_configuration(hw: &mut dyn Platform, caller: Caller, address: u32) {
    log::debug!("PM: configuration object at {:#x} from {:?}", address, caller.id);
    let result = hw.set_configuration(caller.id, address);
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn get_node_status(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, node: NodeId) {
    let Some(entry) = topo.nodes.get(node) else {
        ipi::respond4(hw, caller.channel, Error::InvalidParam.code(), 0, 0, 0);
        return;
    };

    let oppoint = entry.state();
    let (requirements, usage) = match entry.node_type() {
        NodeType::Slave => (
            topo.requirements.master_caps(node, caller.id).bits(),
            topo.requirements.usage_status(node, caller.id),
        ),
        _ => (0, 0),
    };

    ipi::respond4(hw, caller.channel, STATUS_SUCCESS, oppoint, requirements, usage);
}

fn do_get_op_characteristic(topo: &Topology, node: NodeId, kind: u32) -> Result<u32> {
    let entry = topo.nodes.get(node).ok_or(Error::InvalidParam)?;

    match OpCharType::from_u32(kind) {
        Some(OpCharType::Power) => Ok(entry.power_consumption()),
        Some(OpCharType::Temperature) => {
            log::warn!("PM: temperature of {:?} unsupported", node);
            Ok(0)
        }
        Some(OpCharType::Latency) => Ok(topo.nodes.wake_latency(node)),
        None => {
            log::warn!("PM: invalid characteristic {} for {:?}", kind, node);
            Err(Error::InvalidParam)
        }
    }
}

fn get_op_characteristic(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, node: NodeId, kind: u32) {
    let result = do_get_op_characteristic(topo, node, kind);

    let value = result.unwrap_or(0);
    ipi::respond2(hw, caller.channel, status_word(&result), value);
}

fn do_register_notifier(
    topo: &mut Topology,
    caller: Caller,
    node: NodeId,
    event: u32,
    wake: u32,
    enable: u32,
) -> Result<()> {
    if topo.nodes.get(node).is_none() {
        return Err(Error::InvalidParam);
    }

    let events = Events::from_bits(event)
        .filter(|e| !e.is_empty())
        .ok_or(Error::InvalidParam)?;

    if enable == 0 {
        topo.notifiers.unregister(caller.id, node, events);
        Ok(())
    } else {
        topo.notifiers.register(caller.id, node, events, wake != 0)
    }
}

fn register_notifier(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    node: NodeId,
    event: u32,
    wake: u32,
    enable: u32,
) {
    let result = do_register_notifier(topo, caller, node, event, wake, enable);
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn reset_assert(hw: &mut dyn Platform, caller: Caller, line: u32, action: u32) {
    let result = match ResetAction::from_u32(action) {
        Some(action) => hw.reset_assert(line, action),
        None => Err(Error::InvalidParam),
    };
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn reset_get_status(hw: &mut dyn Platform, caller: Caller, line: u32) {
    let result = hw.reset_status(line);
    ipi::respond2(hw, caller.channel, status_word(&result), result.unwrap_or(0));
}

fn do_mmio_write(
    topo: &Topology,
    hw: &mut dyn Platform,
    caller: Caller,
    address: u32,
    mask: u32,
    value: u32,
) -> Result<()> {
    // Nothing to update
    if mask == 0 {
        return Ok(());
    }

    if !topo.mmio_access_allowed(caller.id, address) {
        log::warn!("PM: {:?} denied write to {:#x}", caller.id, address);
        return Err(Error::NoAccess);
    }

    let value = if mask == u32::MAX {
        value
    } else {
        (hw.read32(address) & !mask) | (value & mask)
    };
    hw.write32(address, value);
    Ok(())
}

fn mmio_write(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, address: u32, mask: u32, value: u32) {
    let result = do_mmio_write(topo, hw, caller, address, mask, value);
    ipi::respond1(hw, caller.channel, status_word(&result));
}

fn mmio_read(topo: &mut Topology, hw: &mut dyn Platform, caller: Caller, address: u32) {
    if !topo.mmio_access_allowed(caller.id, address) {
        log::warn!("PM: {:?} denied read of {:#x}", caller.id, address);
        ipi::respond2(hw, caller.channel, Error::NoAccess.code(), 0);
        return;
    }

    let value = hw.read32(address);
    log::trace!("PM: {:?} read {:#x} = {:#x}", caller.id, address, value);
    ipi::respond2(hw, caller.channel, STATUS_SUCCESS, value);
}
