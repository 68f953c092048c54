//! System shutdown coordination
//!
//! A privileged master may start a system-wide shutdown or restart. While
//! that transition is in progress suspend and wake requests are refused
//! with [`Error::Conflict`] and further shutdown requests with
//! [`Error::DoubleRequest`].

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::core::master::SuspendReason;
use crate::core::node::NodeId;
use crate::core::Topology;
use crate::drivers::Platform;
use crate::{Error, Result};

/// Requested system transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum ShutdownKind {
    /// Power the system off
    Shutdown = 0,
    /// Restart the system
    Restart = 1,
}

/// Transition in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown {
    /// Master that started it
    pub master: NodeId,
    /// Shutdown or restart
    pub kind: ShutdownKind,
}

/// Process-wide system state
#[derive(Debug, Default)]
pub struct SystemState {
    shutdown: Option<Shutdown>,
}

impl SystemState {
    /// Create an idle system state
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a shutdown or restart is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Transition in progress, if any
    pub fn shutdown(&self) -> Option<Shutdown> {
        self.shutdown
    }
}

/// Start a system shutdown or restart on behalf of a master
///
/// `restart` is the raw [`ShutdownKind`] word of the request. Privilege is
/// checked before the word is parsed. Every other master is asked to
/// suspend; the transition itself is carried out by the platform.
pub fn system_shutdown(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    master: NodeId,
    restart: u32,
) -> Result<()> {
    let privileged = topo.masters.get(master).map_or(false, |m| m.system_privileged);
    if !privileged {
        log::warn!("System: {:?} may not shut the system down", master);
        return Err(Error::NoAccess);
    }

    let kind = ShutdownKind::from_u32(restart).ok_or_else(|| {
        log::warn!("System: invalid shutdown kind {}", restart);
        Error::InvalidParam
    })?;

    if topo.system.is_shutting_down() {
        return Err(Error::DoubleRequest);
    }

    hw.shutdown(master, kind)?;
    topo.system.shutdown = Some(Shutdown { master, kind });
    log::info!("System: {:?} started by {:?}", kind, master);

    for other in topo.masters.iter().filter(|m| m.id != master) {
        hw.init_suspend(other.channel, SuspendReason::SystemShutdown, u32::MAX, 0, 0);
    }

    Ok(())
}

/// End the system transition
pub fn finish_shutdown(topo: &mut Topology) {
    if let Some(shutdown) = topo.system.shutdown.take() {
        log::info!("System: {:?} by {:?} finished", shutdown.kind, shutdown.master);
    }
}
