//! Buffer ownership ledger.
//!
//! # State Machine
//! ```text
//!              allocate() / receive
//!     IN_AURA ───────────────────────> DRIVER ──submit()──> DEVICE
//!        ▲                               │                    │
//!        └──────────release()────────────┘                    │
//!        └───────────hardware frees after transmit────────────┘
//! ```
//!
//! Each buffer is in exactly one state, so no address can be both free
//! and outstanding. Transitions that do not appear above are rejected
//! before the caller touches hardware.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{NixError, Result};

/// Who holds a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOwnership {
    /// On the hardware free stack.
    InAura,
    /// Held by software; may be read and written.
    Driver,
    /// Referenced by a submitted descriptor.
    Device,
}

impl BufferOwnership {
    /// Buffer can be handed out by the aura.
    pub fn is_free(&self) -> bool {
        matches!(self, Self::InAura)
    }

    /// Software may access the memory.
    pub fn can_access(&self) -> bool {
        matches!(self, Self::Driver)
    }

    pub fn is_device_owned(&self) -> bool {
        matches!(self, Self::Device)
    }
}

/// Per-pool ownership table indexed by buffer slot.
#[derive(Debug, Clone)]
pub struct OwnershipLedger {
    base: u64,
    stride: usize,
    states: Vec<BufferOwnership>,
    in_aura: usize,
    device: usize,
}

impl OwnershipLedger {
    /// Ledger for `count` buffers at `base + i * stride`, all driver-held.
    pub fn new(base: u64, stride: usize, count: usize) -> Self {
        Self {
            base,
            stride,
            states: vec![BufferOwnership::Driver; count],
            in_aura: 0,
            device: 0,
        }
    }

    /// Slot of `addr`, if it is the start of one of our buffers.
    pub fn index_of(&self, addr: u64) -> Option<usize> {
        let delta = addr.checked_sub(self.base)?;
        if self.stride == 0 || delta % self.stride as u64 != 0 {
            return None;
        }
        let index = (delta / self.stride as u64) as usize;
        (index < self.states.len()).then_some(index)
    }

    pub fn state(&self, addr: u64) -> Option<BufferOwnership> {
        self.index_of(addr).map(|i| self.states[i])
    }

    fn slot(&self, addr: u64) -> Result<usize> {
        self.index_of(addr).ok_or(NixError::UnknownBuffer)
    }

    fn set(&mut self, index: usize, to: BufferOwnership) {
        let from = self.states[index];
        match from {
            BufferOwnership::InAura => self.in_aura -= 1,
            BufferOwnership::Device => self.device -= 1,
            BufferOwnership::Driver => {}
        }
        match to {
            BufferOwnership::InAura => self.in_aura += 1,
            BufferOwnership::Device => self.device += 1,
            BufferOwnership::Driver => {}
        }
        self.states[index] = to;
    }

    /// Aura handed the buffer to software (allocate).
    pub fn on_allocated(&mut self, addr: u64) -> Result<()> {
        let index = self.slot(addr)?;
        if self.states[index] != BufferOwnership::InAura {
            return Err(NixError::OwnershipViolation);
        }
        self.set(index, BufferOwnership::Driver);
        Ok(())
    }

    /// Hardware filled the buffer with a received packet.
    ///
    /// Seeing the same packet twice (receive before free) is fine.
    pub fn on_received(&mut self, addr: u64) -> Result<()> {
        let index = self.slot(addr)?;
        match self.states[index] {
            BufferOwnership::Device => Err(NixError::OwnershipViolation),
            BufferOwnership::InAura => {
                self.set(index, BufferOwnership::Driver);
                Ok(())
            }
            BufferOwnership::Driver => Ok(()),
        }
    }

    /// Buffer referenced by a submitted descriptor.
    pub fn on_submitted(&mut self, addr: u64) -> Result<()> {
        let index = self.slot(addr)?;
        if self.states[index] != BufferOwnership::Driver {
            return Err(NixError::OwnershipViolation);
        }
        self.set(index, BufferOwnership::Device);
        Ok(())
    }

    /// Check that software may return `addr` to the aura.
    pub fn check_release(&self, addr: u64) -> Result<usize> {
        let index = self.slot(addr)?;
        match self.states[index] {
            BufferOwnership::InAura => Err(NixError::DoubleFree),
            BufferOwnership::Device => Err(NixError::OwnershipViolation),
            BufferOwnership::Driver => Ok(index),
        }
    }

    /// Software returned the buffer to the aura.
    pub fn on_released(&mut self, addr: u64) -> Result<()> {
        let index = self.check_release(addr)?;
        self.set(index, BufferOwnership::InAura);
        Ok(())
    }

    /// Hardware returned a transmitted buffer to the aura.
    pub fn on_device_returned(&mut self, addr: u64) -> Result<()> {
        let index = self.slot(addr)?;
        if self.states[index] != BufferOwnership::Device {
            return Err(NixError::OwnershipViolation);
        }
        self.set(index, BufferOwnership::InAura);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.states.len()
    }

    /// Buffers on the hardware free stack.
    pub fn free_count(&self) -> usize {
        self.in_aura
    }

    /// Buffers held by software.
    pub fn driver_count(&self) -> usize {
        self.states.len() - self.in_aura - self.device
    }

    /// Buffers referenced by in-flight descriptors.
    pub fn device_count(&self) -> usize {
        self.device
    }

    /// Buffers not in the aura.
    pub fn outstanding(&self) -> usize {
        self.states.len() - self.in_aura
    }

    /// Recount every slot and compare with the running totals.
    pub fn check_invariants(&self) -> bool {
        let in_aura = self.states.iter().filter(|s| s.is_free()).count();
        let device = self.states.iter().filter(|s| s.is_device_owned()).count();
        in_aura == self.in_aura && device == self.device && in_aura + device <= self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of() {
        let ledger = OwnershipLedger::new(0x1000, 128, 4);
        assert_eq!(ledger.index_of(0x1000), Some(0));
        assert_eq!(ledger.index_of(0x1180), Some(3));
        assert_eq!(ledger.index_of(0x1200), None);
        assert_eq!(ledger.index_of(0x1040), None);
        assert_eq!(ledger.index_of(0x800), None);
    }

    #[test]
    fn test_release_allocate_cycle() {
        let mut ledger = OwnershipLedger::new(0x1000, 128, 2);
        ledger.on_released(0x1000).unwrap();
        assert_eq!(ledger.free_count(), 1);
        assert_eq!(ledger.on_released(0x1000), Err(NixError::DoubleFree));

        ledger.on_allocated(0x1000).unwrap();
        assert_eq!(ledger.on_allocated(0x1000), Err(NixError::OwnershipViolation));
        assert_eq!(ledger.on_released(0x9000), Err(NixError::UnknownBuffer));
        assert!(ledger.check_invariants());
    }

    #[test]
    fn test_device_path() {
        let mut ledger = OwnershipLedger::new(0, 64, 1);
        ledger.on_submitted(0).unwrap();
        assert_eq!(ledger.device_count(), 1);
        assert_eq!(ledger.check_release(0), Err(NixError::OwnershipViolation));
        ledger.on_device_returned(0).unwrap();
        assert_eq!(ledger.free_count(), 1);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn test_receive_twice_is_idempotent() {
        let mut ledger = OwnershipLedger::new(0, 64, 1);
        ledger.on_released(0).unwrap();
        ledger.on_received(0).unwrap();
        ledger.on_received(0).unwrap();
        assert_eq!(ledger.driver_count(), 1);
    }
}
