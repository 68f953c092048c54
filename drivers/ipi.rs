//! IPI reply helpers
//!
//! Replies are one, two or four words long: the status word followed by
//! API specific results.

use super::IpiTransport;

/// IPI channel of a master, identified by its interrupt mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpiChannel(pub u32);

impl IpiChannel {
    /// Get raw mask
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Reply with a status word
pub fn respond1<T: IpiTransport + ?Sized>(ipi: &mut T, channel: IpiChannel, status: u32) {
    ipi.write_response(channel, &[status]);
}

/// Reply with a status word and one result
pub fn respond2<T: IpiTransport + ?Sized>(ipi: &mut T, channel: IpiChannel, status: u32, value: u32) {
    ipi.write_response(channel, &[status, value]);
}

/// Reply with a status word and three results
pub fn respond4<T: IpiTransport + ?Sized>(
    ipi: &mut T,
    channel: IpiChannel,
    status: u32,
    value1: u32,
    value2: u32,
    value3: u32,
) {
    ipi.write_response(channel, &[status, value1, value2, value3]);
}
