//! PM API request processing
//!
//! A request is a fixed-size payload of 32-bit words: the API id followed
//! by up to five arguments. [`process_request`] validates the payload
//! against the per-API table, dispatches it to its handler and takes care
//! of acknowledging malformed requests where possible.

pub mod ack;
pub mod dispatch;


use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::core::node::NodeId;
use crate::core::Topology;
use crate::drivers::Platform;
use crate::Error;

use self::ack::{process_ack, Ack};

/// Number of words in a request payload
pub const PAYLOAD_LEN: usize = 6;

/// PM API identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum ApiId {
    GetApiVersion = 1,
    SetConfiguration = 2,
    GetNodeStatus = 3,
    GetOpCharacteristic = 4,
    RegisterNotifier = 5,
    RequestSuspend = 6,
    SelfSuspend = 7,
    ForcePowerdown = 8,
    AbortSuspend = 9,
    RequestWakeup = 10,
    SetWakeupSource = 11,
    SystemShutdown = 12,
    RequestNode = 13,
    ReleaseNode = 14,
    SetRequirement = 15,
    SetMaxLatency = 16,
    ResetAssert = 17,
    ResetGetStatus = 18,
    MmioWrite = 19,
    MmioRead = 20,
}

/// Payload validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    /// Unknown API id, no acknowledge possible
    ApiId,
    /// Missing or malformed arguments
    Args,
    /// Request came from an unknown master
    Master,
}

/// How a request is acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    /// Always answered with a blocking reply
    Fixed,
    /// Answered according to the `ack` argument at this payload index
    AckArg(usize),
}

/// Payload table entry
#[derive(Debug, Clone, Copy)]
struct ApiInfo {
    /// Minimum number of arguments after the API id
    min_args: usize,
    reply: Reply,
}

impl ApiId {
    fn info(self) -> ApiInfo {
        let (min_args, reply) = match self {
            ApiId::GetApiVersion => (0, Reply::Fixed),
            ApiId::SetConfiguration => (1, Reply::Fixed),
            ApiId::GetNodeStatus => (1, Reply::Fixed),
            ApiId::GetOpCharacteristic => (2, Reply::Fixed),
            ApiId::RegisterNotifier => (4, Reply::Fixed),
            ApiId::RequestSuspend => (4, Reply::AckArg(2)),
            ApiId::SelfSuspend => (5, Reply::Fixed),
            ApiId::ForcePowerdown => (2, Reply::AckArg(2)),
            ApiId::AbortSuspend => (2, Reply::Fixed),
            ApiId::RequestWakeup => (4, Reply::AckArg(4)),
            ApiId::SetWakeupSource => (3, Reply::Fixed),
            ApiId::SystemShutdown => (1, Reply::Fixed),
            ApiId::RequestNode => (4, Reply::AckArg(4)),
            ApiId::ReleaseNode => (1, Reply::Fixed),
            ApiId::SetRequirement => (4, Reply::AckArg(4)),
            ApiId::SetMaxLatency => (2, Reply::Fixed),
            ApiId::ResetAssert => (2, Reply::Fixed),
            ApiId::ResetGetStatus => (1, Reply::Fixed),
            ApiId::MmioWrite => (3, Reply::Fixed),
            ApiId::MmioRead => (1, Reply::Fixed),
        };
        ApiInfo { min_args, reply }
    }
}

/// Validate a payload
///
/// `payload[0]` must be a known API id and the payload must carry at least
/// the number of arguments that API needs. An `ack` argument must hold a
/// known acknowledge mode.
pub fn check_payload(payload: &[u32]) -> Result<ApiId, PayloadError> {
    let api = payload
        .first()
        .and_then(|&id| ApiId::from_u32(id))
        .ok_or(PayloadError::ApiId)?;
    let info = api.info();

    if payload.len() < 1 + info.min_args || payload.len() > PAYLOAD_LEN {
        return Err(PayloadError::Args);
    }

    if let Reply::AckArg(index) = info.reply {
        if payload.get(index).and_then(|&v| Ack::from_u32(v)).is_none() {
            return Err(PayloadError::Args);
        }
    }

    Ok(api)
}

/// Recover the acknowledge mode a payload asks for
///
/// `None` when no acknowledge can be sent: unknown API id, or an `ack`
/// argument that is missing or invalid.
pub fn request_acknowledge(payload: &[u32]) -> Option<Ack> {
    let api = payload.first().and_then(|&id| ApiId::from_u32(id))?;
    match api.info().reply {
        Reply::Fixed => Some(Ack::Blocking),
        Reply::AckArg(index) => payload.get(index).and_then(|&v| Ack::from_u32(v)),
    }
}

/// Process one PM request from a master
///
/// Every valid request is acknowledged by its handler. For a malformed one
/// the error is returned for logging by the transport glue, after replying
/// `InvalidParam` if the acknowledge mode could be recovered.
pub fn process_request(
    topo: &mut Topology,
    hw: &mut dyn Platform,
    master: NodeId,
    payload: &[u32],
) -> Result<(), PayloadError> {
    let channel = topo
        .masters
        .get(master)
        .map(|m| m.channel)
        .ok_or(PayloadError::Master)?;

    if let Err(err) = check_payload(payload) {
        log::warn!("PM: invalid payload from {:?}: {:?}", master, err);
        if err != PayloadError::ApiId {
            if let Some(ack) = request_acknowledge(payload) {
                process_ack(hw, channel, ack, NodeId::UNKNOWN, Error::InvalidParam.code(), 0);
            }
        }
        return Err(err);
    }

    let mut words = [0u32; PAYLOAD_LEN];
    words[..payload.len()].copy_from_slice(payload);

    match ApiId::from_u32(words[0]) {
        Some(api) => dispatch::process_api_call(topo, hw, master, channel, api, &words),
        None => {
            log::error!("PM: unsupported API #{}", words[0]);
            let ack = request_acknowledge(&words).unwrap_or(Ack::Blocking);
            process_ack(hw, channel, ack, NodeId::UNKNOWN, Error::InvalidVersion.code(), 0);
        }
    }

    Ok(())
}
