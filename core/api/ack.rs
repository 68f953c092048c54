//! Request acknowledgement
//!
//! A request is acknowledged in exactly one of three ways, chosen by the
//! master through the `ack` argument:
//! - Blocking: status written to the reply buffer right away
//! - NonBlocking: status delivered later through the callback collaborator
//! - No: nothing is sent

use num_derive::FromPrimitive;

use crate::core::node::NodeId;
use crate::drivers::ipi::{self, IpiChannel};
use crate::drivers::Platform;
use crate::STATUS_SUCCESS;

/// Acknowledge mode requested by a master
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum Ack {
    /// No acknowledge
    No = 1,
    /// Reply immediately
    Blocking = 2,
    /// Reply through a callback
    NonBlocking = 3,
}

/// Acknowledge a request the way the master asked for
pub fn process_ack(
    hw: &mut dyn Platform,
    channel: IpiChannel,
    ack: Ack,
    node: NodeId,
    status: u32,
    oppoint: u32,
) {
    if status != STATUS_SUCCESS {
        log::debug!("PM: operation on {:?} failed with status {}", node, status);
    }

    match ack {
        Ack::Blocking => ipi::respond1(hw, channel, status),
        Ack::NonBlocking => hw.acknowledge(channel, node, status, oppoint),
        Ack::No => {}
    }
}
