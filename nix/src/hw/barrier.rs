//! Memory barriers.
//!
//! Descriptors and buffers live in normal memory that the device reads by
//! DMA, so ordering has to reach the outer-shareable domain. On AArch64
//! that is `dmb oshst`/`dmb oshld`; an inner-shareable fence is not enough.
//! Other targets (host tests) fall back to compiler fences.

#[cfg(not(target_arch = "aarch64"))]
use core::sync::atomic::{fence, Ordering};

/// Order all prior stores before any later store or doorbell.
#[inline]
pub fn write_barrier() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: barrier only, no memory or register operands.
    unsafe {
        core::arch::asm!("dmb oshst", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::Release);
}

/// Order a status read before reads of the memory it describes.
#[inline]
pub fn read_barrier() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: as `write_barrier`.
    unsafe {
        core::arch::asm!("dmb oshld", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    fence(Ordering::Acquire);
}
