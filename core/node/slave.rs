//! Slave nodes
//!
//! A slave's state is an index into the state table of its class. States
//! are ordered by increasing power consumption and each one provides a set
//! of [`Capabilities`]. The slave always sits in the cheapest state that
//! satisfies every master using it.

use bitflags::bitflags;

use crate::core::node::{power, state_changed, NodeId};
use crate::core::Topology;
use crate::drivers::{Platform, PowerAction};
use crate::{Error, Result};

bitflags! {
    /// Capabilities a slave state provides
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u32 {
        /// Slave is accessible
        const ACCESS = 1 << 0;
        /// Slave keeps its context
        const CONTEXT = 1 << 1;
        /// Slave can raise wake-up interrupts
        const WAKEUP = 1 << 2;
    }
}

/// State index shared by every class: the slave is off
pub const STATE_OFF: u32 = 0;
/// Generic slave powered on
pub const GENERIC_ON: u32 = 1;
/// Memory bank kept in retention
pub const SRAM_RETENTION: u32 = 1;
/// Memory bank powered on
pub const SRAM_ON: u32 = 2;

/// One entry of a slave class state table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveStateDesc {
    /// Capabilities provided in this state
    pub caps: Capabilities,
    /// Power consumption in this state
    pub power: u32,
    /// Time needed to get back to the highest state
    pub wake_latency: u32,
}

const fn state(caps: Capabilities, power: u32, wake_latency: u32) -> SlaveStateDesc {
    SlaveStateDesc { caps, power, wake_latency }
}

static GENERIC_STATES: [SlaveStateDesc; 2] = [
    state(Capabilities::empty(), 0, 1000),
    state(Capabilities::all(), 100, 0),
];

static SRAM_STATES: [SlaveStateDesc; 3] = [
    state(Capabilities::empty(), 0, 3000),
    state(Capabilities::CONTEXT, 5, 400),
    state(Capabilities::ACCESS.union(Capabilities::CONTEXT), 30, 0),
];

/// Slave class, selecting the state table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveClass {
    /// Off or fully on
    Generic,
    /// Memory bank with a retention state
    Sram,
}

impl SlaveClass {
    /// State table ordered by increasing power
    pub fn states(self) -> &'static [SlaveStateDesc] {
        match self {
            SlaveClass::Generic => &GENERIC_STATES,
            SlaveClass::Sram => &SRAM_STATES,
        }
    }

    /// Union of everything this class can provide
    pub fn all_caps(self) -> Capabilities {
        self.states()
            .iter()
            .fold(Capabilities::empty(), |acc, s| acc | s.caps)
    }
}

/// Slave node data
#[derive(Debug, Clone)]
pub struct Slave {
    /// State table in use
    pub class: SlaveClass,
    /// Index into the class state table
    pub state: u32,
    /// Interrupt usable as a wake-up source
    pub wake_irq: Option<u32>,
}

impl Slave {
    /// Create a slave, initially off
    pub fn new(class: SlaveClass, wake_irq: Option<u32>) -> Self {
        Self { class, state: STATE_OFF, wake_irq }
    }

    fn desc(&self) -> Option<&'static SlaveStateDesc> {
        self.class.states().get(self.state as usize)
    }

    /// Check if the slave is off
    pub fn is_off(&self) -> bool {
        self.state == STATE_OFF
    }

    /// Capabilities of the current state
    pub fn caps(&self) -> Capabilities {
        self.desc().map_or(Capabilities::empty(), |d| d.caps)
    }

    /// Power consumption in the current state
    pub fn power_consumption(&self) -> u32 {
        self.desc().map_or(0, |d| d.power)
    }

    /// Time needed to get back to the highest state
    pub fn wake_latency(&self) -> u32 {
        self.desc().map_or(0, |d| d.wake_latency)
    }
}

/// Pick the cheapest state providing `caps` within `max_latency`
///
/// When no state providing `caps` meets the latency bound the fastest one
/// that provides them is used.
pub fn select_state(class: SlaveClass, caps: Capabilities, max_latency: u32) -> Result<u32> {
    let mut fallback = None;

    for (index, desc) in class.states().iter().enumerate() {
        if !desc.caps.contains(caps) {
            continue;
        }
        if desc.wake_latency <= max_latency {
            return Ok(index as u32);
        }
        fallback = match fallback {
            Some((_, latency)) if latency <= desc.wake_latency => fallback,
            _ => Some((index as u32, desc.wake_latency)),
        };
    }

    fallback.map(|(index, _)| index).ok_or(Error::NoFeature)
}

/// Move a slave to the state its current users need
pub fn update_slave(topo: &mut Topology, hw: &mut dyn Platform, id: NodeId) -> Result<()> {
    let (caps, max_latency) = topo.requirements.slave_demand(id);
    let slave = topo.nodes.slave(id).ok_or(Error::InvalidNode)?;
    let prev = slave.state;

    let next = select_state(slave.class, caps, max_latency).map_err(|err| {
        log::warn!("Slave: {:?} cannot provide {:?}", id, caps);
        err
    })?;

    if next == prev {
        return Ok(());
    }

    let parent = topo.nodes.parent(id);
    if prev == STATE_OFF {
        if let Some(parent) = parent {
            power::power_up(topo, hw, parent)?;
        }
    }

    hw.power_action(id, PowerAction::SlaveState(next))?;
    if let Some(slave) = topo.nodes.slave_mut(id) {
        slave.state = next;
    }
    log::debug!("Slave: {:?} state {} -> {}", id, prev, next);
    state_changed(topo, hw, id);

    if next == STATE_OFF {
        if let Some(parent) = parent {
            power::opportunistic_suspend(topo, hw, parent);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(SlaveClass::Generic, Capabilities::empty(), u32::MAX => Ok(STATE_OFF); "generic idle")]
    #[test_case(SlaveClass::Generic, Capabilities::CONTEXT, u32::MAX => Ok(GENERIC_ON); "generic context")]
    #[test_case(SlaveClass::Generic, Capabilities::empty(), 10 => Ok(GENERIC_ON); "generic tight latency")]
    #[test_case(SlaveClass::Sram, Capabilities::CONTEXT, u32::MAX => Ok(SRAM_RETENTION); "sram retention")]
    #[test_case(SlaveClass::Sram, Capabilities::CONTEXT, 100 => Ok(SRAM_ON); "sram latency bound")]
    #[test_case(SlaveClass::Sram, Capabilities::ACCESS, u32::MAX => Ok(SRAM_ON); "sram access")]
    #[test_case(SlaveClass::Sram, Capabilities::WAKEUP, u32::MAX => Err(Error::NoFeature); "sram no wakeup")]
    fn test_select_state(class: SlaveClass, caps: Capabilities, latency: u32) -> Result<u32> {
        select_state(class, caps, latency)
    }

    #[test]
    fn test_state_tables_are_ordered() {
        for class in [SlaveClass::Generic, SlaveClass::Sram] {
            let states = class.states();
            assert_eq!(states[STATE_OFF as usize].caps, Capabilities::empty());
            assert!(states.windows(2).all(|w| w[0].power < w[1].power));
        }
    }

    #[test]
    fn test_all_caps() {
        assert_eq!(SlaveClass::Generic.all_caps(), Capabilities::all());
        assert!(!SlaveClass::Sram.all_caps().contains(Capabilities::WAKEUP));
    }

    #[test]
    fn test_new_slave_is_off() {
        let slave = Slave::new(SlaveClass::Sram, None);
        assert!(slave.is_off());
        assert_eq!(slave.power_consumption(), 0);
        assert_eq!(slave.wake_latency(), 3000);
    }
}
