//! Platform collaborators
//!
//! The engine never touches hardware directly. Everything outside the
//! coordination logic is reached through the traits below:
//! - [`IpiTransport`]: reply buffers of the masters' IPI channels
//! - [`Callbacks`]: asynchronous acknowledges, suspend requests, notifications
//! - [`MmioBus`]: register access for the protected MMIO APIs
//! - [`ResetControl`]: reset lines
//! - [`SystemControl`]: physical power transitions, configuration loading
//!   and system shutdown
//!
//! [`Platform`] bundles all of them and is implemented for every type that
//! implements each one.

use num_derive::FromPrimitive;

use crate::core::master::SuspendReason;
use crate::core::node::NodeId;
use crate::core::system::ShutdownKind;
use crate::Result;

pub mod ipi;
pub mod mmio;

#[cfg(test)]
pub mod mock;

use self::ipi::IpiChannel;

/// Physical transition requested from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    /// Enable the WFI interrupt of a processor about to suspend
    ArmWfi,
    /// Disable the WFI interrupt again
    DisarmWfi,
    /// Put a processor to sleep
    ProcSleep,
    /// Power a processor up, optionally from a resume address
    ProcWake {
        /// Address to resume from
        resume: Option<u64>,
    },
    /// Cut a processor's power
    ProcOff,
    /// Power an island or domain up
    PowerUp,
    /// Power an island or domain down
    PowerDown,
    /// Move a slave to a state of its class
    SlaveState(u32),
}

/// Reset line action
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum ResetAction {
    /// Release the line
    Release = 0,
    /// Assert the line
    Assert = 1,
    /// Assert and release
    Pulse = 2,
}

/// IPI reply buffers
pub trait IpiTransport {
    /// Write a reply into a channel's response buffer
    fn write_response(&mut self, channel: IpiChannel, response: &[u32]);
}

/// Asynchronous messages to masters
pub trait Callbacks {
    /// Deliver a non-blocking acknowledge
    fn acknowledge(&mut self, channel: IpiChannel, node: NodeId, status: u32, oppoint: u32);

    /// Ask a master to start suspending
    fn init_suspend(
        &mut self,
        channel: IpiChannel,
        reason: SuspendReason,
        latency: u32,
        state: u32,
        timeout: u32,
    );

    /// Deliver a node event to a registered master
    fn notify(&mut self, channel: IpiChannel, node: NodeId, event: u32, oppoint: u32);
}

/// Register access
pub trait MmioBus {
    /// Read a 32-bit register
    fn read32(&mut self, address: u32) -> u32;

    /// Write a 32-bit register
    fn write32(&mut self, address: u32, value: u32);
}

/// Reset lines
pub trait ResetControl {
    /// Act on a reset line
    fn reset_assert(&mut self, line: u32, action: ResetAction) -> Result<()>;

    /// Current status of a reset line
    fn reset_status(&mut self, line: u32) -> Result<u32>;
}

/// Power transitions and system-level actions
pub trait SystemControl {
    /// Carry out a physical transition of a node
    fn power_action(&mut self, node: NodeId, action: PowerAction) -> Result<()>;

    /// Load a configuration object
    fn set_configuration(&mut self, master: NodeId, address: u32) -> Result<()>;

    /// Start a system shutdown or restart
    fn shutdown(&mut self, master: NodeId, kind: ShutdownKind) -> Result<()>;
}

/// Everything the engine needs from the platform
pub trait Platform: IpiTransport + Callbacks + MmioBus + ResetControl + SystemControl {}

impl<T> Platform for T where T: IpiTransport + Callbacks + MmioBus + ResetControl + SystemControl {}
