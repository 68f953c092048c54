//! Notifier registrations
//!
//! Masters register interest in events of a node. When such an event
//! fires every registered master gets a notification through the
//! [`Callbacks`](crate::drivers::Callbacks) collaborator and, if it asked
//! for it, its suspended primary processor is woken.
//!
//! Wake-ups raised while a processor transition is still running its hooks
//! are held back and carried out once the outermost transition finished.

use bitflags::bitflags;
use heapless::Vec;

use crate::config::{MAX_MASTERS, MAX_NOTIFIERS};
use crate::core::master;
use crate::core::node::NodeId;
use crate::core::Topology;
use crate::drivers::Platform;
use crate::{Error, Result};

bitflags! {
    /// Event mask of a registration
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Events: u32 {
        /// Node changed state
        const STATE_CHANGE = 1 << 0;
        /// Last user released a slave
        const ZERO_USERS = 1 << 1;
    }
}

/// A single node event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Node changed state
    StateChange,
    /// Last user released a slave
    ZeroUsers,
}

impl Event {
    /// Mask bit of this event
    pub fn flag(self) -> Events {
        match self {
            Event::StateChange => Events::STATE_CHANGE,
            Event::ZeroUsers => Events::ZERO_USERS,
        }
    }

    /// Get raw value as delivered to masters
    pub fn raw(self) -> u32 {
        self.flag().bits()
    }
}

/// A master's interest in events of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Master to notify
    pub master: NodeId,
    /// Node the events relate to
    pub node: NodeId,
    /// Events of interest
    pub events: Events,
    /// Wake the master when notifying
    pub wake: bool,
}

/// Table of notifier registrations
#[derive(Debug, Default)]
pub struct NotifierTable {
    regs: Vec<Registration, MAX_NOTIFIERS>,
    /// Masters to wake once no transition holds wake-ups back
    pending: Vec<NodeId, MAX_MASTERS>,
    /// Nesting depth of transitions holding wake-ups back
    hold: u32,
}

impl NotifierTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    /// Check if there is no registration
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// Registration of a master for a node
    pub fn get(&self, master: NodeId, node: NodeId) -> Option<&Registration> {
        self.regs.iter().find(|r| r.master == master && r.node == node)
    }

    /// Register a master for events of a node
    ///
    /// An existing registration of the same pair is extended with the new
    /// events and takes over the wake flag.
    pub fn register(&mut self, master: NodeId, node: NodeId, events: Events, wake: bool) -> Result<()> {
        if let Some(reg) = self
            .regs
            .iter_mut()
            .find(|r| r.master == master && r.node == node)
        {
            reg.events |= events;
            reg.wake = wake;
            return Ok(());
        }

        self.regs
            .push(Registration { master, node, events, wake })
            .map_err(|_| {
                log::error!("Notifier: no free slot for {:?} on {:?}", master, node);
                Error::Failure
            })
    }

    /// Remove events from a master's registration for a node
    pub fn unregister(&mut self, master: NodeId, node: NodeId, events: Events) {
        if let Some(reg) = self
            .regs
            .iter_mut()
            .find(|r| r.master == master && r.node == node)
        {
            reg.events.remove(events);
        }
        self.regs.retain(|r| !r.events.is_empty());
    }

    fn listeners(&self, node: NodeId, event: Event) -> Vec<(NodeId, bool), MAX_NOTIFIERS> {
        let mut listeners = Vec::new();
        for reg in self
            .regs
            .iter()
            .filter(|r| r.node == node && r.events.contains(event.flag()))
        {
            // Never more listeners than registrations
            let _ = listeners.push((reg.master, reg.wake));
        }
        listeners
    }
}

/// Hold back notifier wake-ups until the matching [`release_wakes`]
pub(crate) fn hold_wakes(topo: &mut Topology) {
    topo.notifiers.hold += 1;
}

/// End a hold; the outermost one wakes every master queued meanwhile
pub(crate) fn release_wakes(topo: &mut Topology, hw: &mut dyn Platform) {
    topo.notifiers.hold = topo.notifiers.hold.saturating_sub(1);
    if topo.notifiers.hold > 0 {
        return;
    }

    while let Some(master) = topo.notifiers.pending.pop() {
        wake_listener(topo, hw, master);
    }
}

fn wake_listener(topo: &mut Topology, hw: &mut dyn Platform, master: NodeId) {
    if let Err(err) = master::wake_master(topo, hw, master) {
        log::warn!("Notifier: waking {:?} failed: {}", master, err);
    }
}

/// Deliver an event of a node to every registered master
pub fn notifier_event(topo: &mut Topology, hw: &mut dyn Platform, node: NodeId, event: Event) {
    let listeners = topo.notifiers.listeners(node, event);
    if listeners.is_empty() {
        return;
    }

    let oppoint = topo.nodes.get(node).map_or(0, |n| n.state());

    for (master, wake) in listeners {
        let Some(channel) = topo.masters.get(master).map(|m| m.channel) else {
            continue;
        };

        log::debug!("Notifier: {:?} on {:?} to {:?}", event, node, master);
        hw.notify(channel, node, event.raw(), oppoint);

        if !wake {
            continue;
        }

        if topo.notifiers.hold == 0 {
            wake_listener(topo, hw, master);
        } else if !topo.notifiers.pending.contains(&master) {
            log::trace!("Notifier: wake of {:?} deferred", master);
            // One slot per master
            let _ = topo.notifiers.pending.push(master);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::zynqmp::*;
    use crate::core::node::proc::{self, ProcEvent, ProcState};
    use crate::drivers::mock::MockPlatform;

    #[test]
    fn test_register_merges_events() {
        let mut table = NotifierTable::new();
        table.register(NODE_APU, NODE_UART_0, Events::STATE_CHANGE, false).unwrap();
        table.register(NODE_APU, NODE_UART_0, Events::ZERO_USERS, true).unwrap();
        assert_eq!(table.len(), 1);

        let reg = table.get(NODE_APU, NODE_UART_0).unwrap();
        assert_eq!(reg.events, Events::all());
        assert!(reg.wake);
    }

    #[test]
    fn test_unregister_removes_empty_registration() {
        let mut table = NotifierTable::new();
        table.register(NODE_APU, NODE_UART_0, Events::all(), false).unwrap();
        table.unregister(NODE_APU, NODE_UART_0, Events::STATE_CHANGE);
        assert_eq!(table.get(NODE_APU, NODE_UART_0).unwrap().events, Events::ZERO_USERS);
        table.unregister(NODE_APU, NODE_UART_0, Events::ZERO_USERS);
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_full() {
        let mut table = NotifierTable::new();
        for id in 0..MAX_NOTIFIERS as u32 {
            table.register(NODE_APU, NodeId(100 + id), Events::STATE_CHANGE, false).unwrap();
        }
        assert_eq!(
            table.register(NODE_RPU_0, NODE_UART_0, Events::STATE_CHANGE, false),
            Err(Error::Failure)
        );
    }

    #[test]
    fn test_event_delivery_and_wake() {
        let mut topo = Topology::new(&TOPOLOGY).unwrap();
        let mut hw = MockPlatform::new();
        topo.notifiers.register(NODE_RPU_0, NODE_UART_1, Events::ZERO_USERS, true).unwrap();
        topo.notifiers.register(NODE_RPU_1, NODE_UART_1, Events::STATE_CHANGE, false).unwrap();

        proc::proc_fsm(&mut topo, &mut hw, NODE_RPU_0, ProcEvent::SelfSuspend).unwrap();
        proc::handle_wfi(&mut topo, &mut hw, NODE_RPU_0).unwrap();

        notifier_event(&mut topo, &mut hw, NODE_UART_1, Event::ZeroUsers);
        assert_eq!(hw.notifications, vec![(IPI_RPU_0, NODE_UART_1, Event::ZeroUsers.raw(), 0)]);
        assert_eq!(topo.nodes.proc(NODE_RPU_0).unwrap().state, ProcState::Active);
    }

    #[test]
    fn test_wake_held_back_until_released() {
        let mut topo = Topology::new(&TOPOLOGY).unwrap();
        let mut hw = MockPlatform::new();
        topo.notifiers.register(NODE_RPU_0, NODE_UART_1, Events::STATE_CHANGE, true).unwrap();
        proc::proc_fsm(&mut topo, &mut hw, NODE_RPU_0, ProcEvent::SelfSuspend).unwrap();
        proc::handle_wfi(&mut topo, &mut hw, NODE_RPU_0).unwrap();

        hold_wakes(&mut topo);
        hold_wakes(&mut topo);
        notifier_event(&mut topo, &mut hw, NODE_UART_1, Event::StateChange);
        notifier_event(&mut topo, &mut hw, NODE_UART_1, Event::StateChange);
        assert_eq!(hw.notifications.len(), 2);

        release_wakes(&mut topo, &mut hw);
        assert_eq!(topo.nodes.proc(NODE_RPU_0).unwrap().state, ProcState::Suspended);

        release_wakes(&mut topo, &mut hw);
        assert_eq!(topo.nodes.proc(NODE_RPU_0).unwrap().state, ProcState::Active);
        assert!(topo.notifiers.pending.is_empty());
    }
}
