//! Memory-mapped register bus
//!
//! [`VolatileMmio`] is the production [`MmioBus`]: every access is a single
//! volatile 32-bit load or store at `base + address`.

use core::ptr::NonNull;

use volatile::VolatilePtr;

use super::MmioBus;

/// Volatile register access relative to a base address
#[derive(Debug)]
pub struct VolatileMmio {
    base: usize,
}

impl VolatileMmio {
    /// Create a bus over the address space starting at `base`
    ///
    /// # Safety
    ///
    /// Every address handed to the bus, offset by `base`, must be a valid,
    /// aligned 32-bit register for as long as the bus is in use.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn register(&self, address: u32) -> Option<VolatilePtr<'_, u32>> {
        let ptr = NonNull::new(self.base.wrapping_add(address as usize) as *mut u32)?;
        // SAFETY: validity of the register is guaranteed by the caller of `new`
        Some(unsafe { VolatilePtr::new(ptr) })
    }
}

impl MmioBus for VolatileMmio {
    fn read32(&mut self, address: u32) -> u32 {
        match self.register(address) {
            Some(reg) => reg.read(),
            None => {
                log::error!("MMIO: read of null register {:#x}", address);
                0
            }
        }
    }

    fn write32(&mut self, address: u32, value: u32) {
        match self.register(address) {
            Some(reg) => reg.write(value),
            None => log::error!("MMIO: write of null register {:#x}", address),
        }
    }
}
