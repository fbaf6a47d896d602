//! Hardware access layer.
//!
//! Everything the engine does to silicon goes through [`RegisterIo`]; the
//! memory-mapped implementation is [`Mmio`], the software model lives in
//! [`crate::sim`].

pub mod barrier;
pub mod chip;
pub mod regs;
pub mod wire;

use core::sync::atomic::{AtomicU64, Ordering};

// ═══════════════════════════════════════════════════════════════════════════
// TRAITS
// ═══════════════════════════════════════════════════════════════════════════

/// Register and LMT access for one NIX/NPA local function.
///
/// Offsets are relative to the PF BAR (see [`regs`]).
pub trait RegisterIo {
    /// Plain 64-bit register read.
    fn read64(&self, offset: u64) -> u64;

    /// Plain 64-bit register write.
    fn write64(&self, offset: u64, value: u64);

    /// Atomic fetch-and-add on an operation register; returns the response.
    fn fetch_add64(&self, offset: u64, value: u64) -> u64;

    /// Store descriptor words into the LMT region at `line_offset` bytes.
    fn lmt_store(&self, line_offset: usize, words: &[u64]);

    /// Order prior memory accesses before the next submit or doorbell.
    fn write_barrier(&self);

    /// Submit the LMT line(s) selected by `value` to the operation at `offset`.
    ///
    /// Callers issue [`write_barrier`](Self::write_barrier) first.
    fn lmt_submit(&self, offset: u64, value: u64);
}

/// Busy-wait delay source.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

// ═══════════════════════════════════════════════════════════════════════════
// MMIO IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

/// Memory-mapped register window plus LMT region.
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    bar: usize,
    lmt: usize,
}

impl Mmio {
    /// Create an accessor.
    ///
    /// # Safety
    /// - `bar` must be the mapped PF BAR of the RVU function (device memory)
    /// - `lmt` must be this core's mapped LMT region
    pub const unsafe fn new(bar: usize, lmt: usize) -> Self {
        Self { bar, lmt }
    }

    #[inline]
    fn reg(&self, offset: u64) -> *mut u64 {
        (self.bar + offset as usize) as *mut u64
    }

    #[inline]
    fn atomic(&self, offset: u64) -> &AtomicU64 {
        // SAFETY: offsets come from `regs` and stay inside the mapped BAR;
        // operation registers are 8-byte aligned.
        unsafe { &*(self.reg(offset) as *const AtomicU64) }
    }
}

impl RegisterIo for Mmio {
    fn read64(&self, offset: u64) -> u64 {
        // SAFETY: see `Mmio::new`.
        unsafe { core::ptr::read_volatile(self.reg(offset)) }
    }

    fn write64(&self, offset: u64, value: u64) {
        // SAFETY: see `Mmio::new`.
        unsafe { core::ptr::write_volatile(self.reg(offset), value) }
    }

    fn fetch_add64(&self, offset: u64, value: u64) -> u64 {
        self.atomic(offset).fetch_add(value, Ordering::Relaxed)
    }

    fn lmt_store(&self, line_offset: usize, words: &[u64]) {
        let base = (self.lmt + line_offset) as *mut u64;
        for (i, word) in words.iter().enumerate() {
            // SAFETY: LMT lines are 128 bytes; callers store at most 16 words.
            unsafe { core::ptr::write_volatile(base.add(i), *word) };
        }
    }

    fn write_barrier(&self) {
        barrier::write_barrier();
    }

    fn lmt_submit(&self, offset: u64, value: u64) {
        // LMTST: the atomic XOR to the I/O address carries the line id.
        self.atomic(offset).fetch_xor(value, Ordering::Release);
    }
}
