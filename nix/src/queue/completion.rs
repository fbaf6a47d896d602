//! Completion ring.
//!
//! # State Machine
//! ```text
//!   IDLE ──status shows entries──> ARMED ──drain()──> DRAINING ──> IDLE
//! ```
//!
//! Hardware advances the tail; software advances the head only by writing
//! the doorbell, one consumed entry at a time.

use dma_pool::DmaAllocation;

use crate::error::{NixError, Result};
use crate::hw::barrier;
use crate::hw::regs::{NIXX_LF_CQ_OP_DOOR, NIXX_LF_CQ_OP_STATUS, NIX_BASE};
use crate::hw::wire::{cq_door_word, cq_status_operand, CqStatus, CQE_SIZE, CQE_WORDS};
use crate::hw::RegisterIo;

/// Ring lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingState {
    Idle,
    Armed,
    Draining,
}

/// Masked head/tail snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingPosition {
    pub head: u32,
    pub tail: u32,
    mask: u32,
}

impl RingPosition {
    /// Mask a status response for a ring of `size` entries (power of two).
    pub fn from_status(status: &CqStatus, size: u32) -> Self {
        let mask = size - 1;
        Self {
            head: status.head & mask,
            tail: status.tail & mask,
            mask,
        }
    }

    /// Entries hardware has posted and software has not consumed.
    pub fn pending(&self) -> u32 {
        self.tail.wrapping_sub(self.head) & self.mask
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}

/// One hardware completion queue.
pub struct CompletionRing {
    id: u32,
    memory: DmaAllocation,
    size: u32,
    state: RingState,
}

impl CompletionRing {
    /// Wrap ring memory for completion queue `id`.
    ///
    /// `memory` must hold `size` W16 entries; `size` must be a power of two.
    pub fn new(id: u32, memory: DmaAllocation, size: u32) -> Result<Self> {
        if !size.is_power_of_two() || memory.len() < size as usize * CQE_SIZE {
            return Err(NixError::InvalidParameter);
        }
        Ok(Self {
            id,
            memory,
            size,
            state: RingState::Idle,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn state(&self) -> RingState {
        self.state
    }

    pub fn memory(&self) -> DmaAllocation {
        self.memory
    }

    /// Read the hardware head/tail.
    ///
    /// # Returns
    /// Masked positions, or `DeviceError` when the queue or the operation
    /// reports an error.
    pub fn poll_status<R: RegisterIo>(&mut self, io: &R) -> Result<RingPosition> {
        let raw = io.fetch_add64(NIX_BASE + NIXX_LF_CQ_OP_STATUS, cq_status_operand(self.id));
        let status = CqStatus::decode(raw);
        if status.is_error() {
            log::error!("cq{}: status error {:#x}", self.id, raw);
            return Err(NixError::DeviceError);
        }
        barrier::read_barrier();

        let pos = RingPosition::from_status(&status, self.size);
        if self.state == RingState::Idle && !pos.is_empty() {
            self.state = RingState::Armed;
        } else if self.state == RingState::Armed && pos.is_empty() {
            self.state = RingState::Idle;
        }
        Ok(pos)
    }

    /// Consume `count` entries at the head.
    ///
    /// The barrier orders reads of the consumed entries before the
    /// doorbell hands their slots back to hardware.
    pub fn advance<R: RegisterIo>(&mut self, io: &R, count: u16) {
        io.write_barrier();
        io.write64(NIX_BASE + NIXX_LF_CQ_OP_DOOR, cq_door_word(self.id, count));
    }

    /// Read the entry at `index` (masked to the ring size).
    pub fn entry(&self, index: u32) -> [u64; CQE_WORDS] {
        let slot = (index & (self.size - 1)) as usize;
        let base = self.memory.cpu_ptr() as *const u64;
        let mut words = [0u64; CQE_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            // SAFETY: slot < size and the ring holds size * CQE_WORDS words.
            *word = unsafe { core::ptr::read_volatile(base.add(slot * CQE_WORDS + i)) };
        }
        words
    }

    /// Consume every entry posted at the time of the call.
    ///
    /// Bounded to one pass over the ring; entries posted meanwhile wait for
    /// the next drain. Returns the number of entries handed to `f`.
    pub fn drain<R, F>(&mut self, io: &R, mut f: F) -> Result<u32>
    where
        R: RegisterIo,
        F: FnMut(&[u64; CQE_WORDS]),
    {
        let pos = self.poll_status(io)?;
        if pos.is_empty() {
            return Ok(0);
        }

        self.state = RingState::Draining;
        let count = pos.pending();
        for i in 0..count {
            let entry = self.entry(pos.head.wrapping_add(i));
            f(&entry);
            self.advance(io, 1);
        }
        self.state = RingState::Idle;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::wire::CqStatusFlags;

    fn status(head: u32, tail: u32) -> CqStatus {
        CqStatus {
            head,
            tail,
            flags: CqStatusFlags::empty(),
        }
    }

    #[test]
    fn test_position_masking() {
        let pos = RingPosition::from_status(&status(1030, 1026), 1024);
        assert_eq!((pos.head, pos.tail), (6, 2));
        assert_eq!(pos.pending(), 1020);

        let wrapped = RingPosition::from_status(&status(1022, 2), 1024);
        assert_eq!(wrapped.pending(), 4);
        assert!(RingPosition::from_status(&status(7, 7), 16).is_empty());
    }

    #[test]
    fn test_rejects_short_memory() {
        let mut arena = dma_pool::DmaArena::with_capacity(4096).unwrap();
        let block = arena.alloc(CQE_SIZE * 16, 128).unwrap();
        assert!(CompletionRing::new(0, block, 16).is_ok());
        assert!(CompletionRing::new(0, block, 32).is_err());
        assert!(CompletionRing::new(0, block, 12).is_err());
    }
}
