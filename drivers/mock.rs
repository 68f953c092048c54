//! Recording platform for tests

use std::collections::HashMap;

use super::ipi::IpiChannel;
use super::{Callbacks, IpiTransport, MmioBus, PowerAction, ResetAction, ResetControl, SystemControl};
use crate::core::master::SuspendReason;
use crate::core::node::NodeId;
use crate::core::system::ShutdownKind;
use crate::{Error, Result};

/// Platform that records every call and can be told to refuse some
#[derive(Debug, Default)]
pub struct MockPlatform {
    /// Replies written to IPI buffers
    pub responses: Vec<(IpiChannel, Vec<u32>)>,
    /// Non-blocking acknowledges: channel, node, status, operating point
    pub acks: Vec<(IpiChannel, NodeId, u32, u32)>,
    /// Suspend requests: channel, reason, latency, state
    pub suspend_calls: Vec<(IpiChannel, SuspendReason, u32, u32)>,
    /// Notifications: channel, node, event, operating point
    pub notifications: Vec<(IpiChannel, NodeId, u32, u32)>,
    /// Physical transitions carried out
    pub actions: Vec<(NodeId, PowerAction)>,
    /// Register contents
    pub regs: HashMap<u32, u32>,
    /// Reset line actions
    pub resets: Vec<(u32, ResetAction)>,
    /// Configuration objects loaded
    pub configs: Vec<(NodeId, u32)>,
    /// System transitions started
    pub shutdowns: Vec<(NodeId, ShutdownKind)>,
    /// Transition to refuse with `Failure`
    pub fail_action: Option<(NodeId, PowerAction)>,
    /// Refuse system transitions
    pub fail_shutdown: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reply written to a channel
    pub fn last_response(&self, channel: IpiChannel) -> Option<&[u32]> {
        self.responses
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, words)| words.as_slice())
    }
}

impl IpiTransport for MockPlatform {
    fn write_response(&mut self, channel: IpiChannel, response: &[u32]) {
        self.responses.push((channel, response.to_vec()));
    }
}

impl Callbacks for MockPlatform {
    fn acknowledge(&mut self, channel: IpiChannel, node: NodeId, status: u32, oppoint: u32) {
        self.acks.push((channel, node, status, oppoint));
    }

    fn init_suspend(
        &mut self,
        channel: IpiChannel,
        reason: SuspendReason,
        latency: u32,
        state: u32,
        _timeout: u32,
    ) {
        self.suspend_calls.push((channel, reason, latency, state));
    }

    fn notify(&mut self, channel: IpiChannel, node: NodeId, event: u32, oppoint: u32) {
        self.notifications.push((channel, node, event, oppoint));
    }
}

impl MmioBus for MockPlatform {
    fn read32(&mut self, address: u32) -> u32 {
        self.regs.get(&address).copied().unwrap_or(0)
    }

    fn write32(&mut self, address: u32, value: u32) {
        self.regs.insert(address, value);
    }
}

impl ResetControl for MockPlatform {
    fn reset_assert(&mut self, line: u32, action: ResetAction) -> Result<()> {
        self.resets.push((line, action));
        Ok(())
    }

    fn reset_status(&mut self, line: u32) -> Result<u32> {
        match self.resets.iter().rev().find(|(l, _)| *l == line) {
            Some((_, ResetAction::Assert)) => Ok(1),
            Some(_) => Ok(0),
            None => Err(Error::InvalidParam),
        }
    }
}

impl SystemControl for MockPlatform {
    fn power_action(&mut self, node: NodeId, action: PowerAction) -> Result<()> {
        if self.fail_action == Some((node, action)) {
            return Err(Error::Failure);
        }
        self.actions.push((node, action));
        Ok(())
    }

    fn set_configuration(&mut self, master: NodeId, address: u32) -> Result<()> {
        self.configs.push((master, address));
        Ok(())
    }

    fn shutdown(&mut self, master: NodeId, kind: ShutdownKind) -> Result<()> {
        if self.fail_shutdown {
            return Err(Error::Failure);
        }
        self.shutdowns.push((master, kind));
        Ok(())
    }
}
