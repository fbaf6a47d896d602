//! DMA memory arena for bare-metal drivers.
//!
//! Hands out cache-line or page aligned blocks from one contiguous,
//! device-visible memory region. Unlike a bump allocator every block can be
//! returned, which lets drivers unwind a half-finished setup without leaking
//! the region.
//!
//! # Design
//!
//! - **Instance based**: each driver owns its arena, there is no global pool
//! - **Tracked**: a fixed table of live allocations, sorted by offset
//! - **First fit**: gaps between live allocations are reused
//! - **Scoped rollback**: [`ArenaScope`] frees everything it handed out
//!   unless [`ArenaScope::commit`] is called
//!
//! # Usage
//!
//! ```ignore
//! use dma_pool::{DmaArena, MemoryRegion, CACHE_LINE};
//!
//! // Firmware-provided, identity mapped region
//! let mut arena = unsafe { DmaArena::from_region(MemoryRegion::identity(base, size))? };
//!
//! let mut scope = arena.scope();
//! let ring = scope.alloc(16 * 1024, CACHE_LINE)?;
//! let stack = scope.alloc(4096, CACHE_LINE)?;
//! scope.commit(); // keep both; dropping the scope instead frees both
//! ```

#![no_std]

extern crate alloc;

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::fmt;
use core::ptr::NonNull;

/// Page size (4KB).
pub const PAGE_SIZE: usize = 4096;

/// Hardware cache line size on OcteonTX2/CN10K.
pub const CACHE_LINE: usize = 128;

/// Maximum live allocations tracked per arena.
pub const MAX_ALLOCATIONS: usize = 128;

// ============================================================================
// Utility functions
// ============================================================================

/// Align a value up to the given alignment.
#[inline]
pub const fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// Align a value down to the given alignment.
#[inline]
pub const fn align_down(val: usize, align: usize) -> usize {
    val & !(align - 1)
}

/// Convert bytes to pages (rounded up).
#[inline]
pub const fn bytes_to_pages(bytes: usize) -> usize {
    align_up(bytes, PAGE_SIZE) / PAGE_SIZE
}

// ============================================================================
// Error types
// ============================================================================

/// DMA arena errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaError {
    /// Requested 0 bytes.
    ZeroSize,
    /// No gap in the arena is large enough.
    OutOfMemory,
    /// Region is empty or not page aligned.
    InvalidRegion,
    /// Alignment is not a power of two or exceeds a page.
    InvalidAlignment,
    /// Allocation table is full.
    TooManyAllocations,
    /// Block was not handed out by this arena.
    UnknownAllocation,
}

impl DmaError {
    /// Short human-readable description.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ZeroSize => "zero-sized DMA allocation",
            Self::OutOfMemory => "DMA arena exhausted",
            Self::InvalidRegion => "invalid DMA region",
            Self::InvalidAlignment => "invalid DMA alignment",
            Self::TooManyAllocations => "DMA allocation table full",
            Self::UnknownAllocation => "unknown DMA allocation",
        }
    }
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Result type for DMA operations.
pub type Result<T> = core::result::Result<T, DmaError>;

// ============================================================================
// Memory region
// ============================================================================

/// A device-visible memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// CPU address of the first byte.
    pub base: usize,
    /// Address the device uses for the first byte.
    pub bus: u64,
    /// Size in bytes.
    pub size: usize,
}

impl MemoryRegion {
    /// Create a region with distinct CPU and bus views.
    pub const fn new(base: usize, bus: u64, size: usize) -> Self {
        Self { base, bus, size }
    }

    /// Create an identity-mapped region (bus == CPU address).
    pub const fn identity(base: usize, size: usize) -> Self {
        Self { base, bus: base as u64, size }
    }

    /// Check if region is usable for DMA (page-aligned, non-empty).
    pub fn is_usable(&self) -> bool {
        self.base % PAGE_SIZE == 0 && self.size >= PAGE_SIZE
    }
}

// ============================================================================
// Allocation handle
// ============================================================================

/// A block handed out by a [`DmaArena`].
///
/// The handle is a plain description of the block; it does not free on drop.
/// Return it with [`DmaArena::free`] or let an [`ArenaScope`] do it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaAllocation {
    cpu: NonNull<u8>,
    bus: u64,
    size: usize,
    offset: usize,
}

impl DmaAllocation {
    /// CPU pointer to the first byte.
    pub fn cpu_ptr(&self) -> *mut u8 {
        self.cpu.as_ptr()
    }

    /// Device-visible address of the first byte.
    pub fn bus_addr(&self) -> u64 {
        self.bus
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Always false; zero-sized blocks are never handed out.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Offset of the block inside its arena.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Check whether a bus address range lies inside this block.
    pub fn contains(&self, bus: u64, len: usize) -> bool {
        bus >= self.bus
            && bus
                .checked_add(len as u64)
                .map_or(false, |end| end <= self.bus + self.size as u64)
    }

    /// Translate a bus address inside this block to a CPU pointer.
    pub fn cpu_for_bus(&self, bus: u64) -> Option<*mut u8> {
        if !self.contains(bus, 1) {
            return None;
        }
        let delta = (bus - self.bus) as usize;
        // SAFETY: delta < size, so the result stays inside the block.
        Some(unsafe { self.cpu.as_ptr().add(delta) })
    }
}

// ============================================================================
// Allocation tracking
// ============================================================================

#[derive(Clone, Copy)]
struct Allocation {
    offset: usize,
    size: usize,
}

impl Allocation {
    const fn empty() -> Self {
        Self { offset: 0, size: 0 }
    }

    const fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Heap memory owned by the arena itself.
struct HeapBacking {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Drop for HeapBacking {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// ============================================================================
// DmaArena
// ============================================================================

/// First-fit DMA arena over one contiguous region.
pub struct DmaArena {
    region: MemoryRegion,
    /// Live allocations, sorted by offset.
    live: [Allocation; MAX_ALLOCATIONS],
    live_count: usize,
    used: usize,
    _backing: Option<HeapBacking>,
}

impl DmaArena {
    /// Create an arena over an externally provided region.
    ///
    /// The region is zeroed.
    ///
    /// # Safety
    ///
    /// - `region.base` must point to `region.size` writable bytes.
    /// - `region.bus` must be the address the device uses for `region.base`.
    /// - Nothing else may use the region while the arena exists.
    pub unsafe fn from_region(region: MemoryRegion) -> Result<Self> {
        if !region.is_usable() {
            return Err(DmaError::InvalidRegion);
        }
        core::ptr::write_bytes(region.base as *mut u8, 0, region.size);
        Ok(Self::with_region(region, None))
    }

    /// Create an identity-mapped arena backed by the global allocator.
    ///
    /// Used before firmware memory maps are available and by host tests.
    pub fn with_capacity(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(DmaError::ZeroSize);
        }
        let size = align_up(size, PAGE_SIZE);
        let layout =
            Layout::from_size_align(size, PAGE_SIZE).map_err(|_| DmaError::InvalidRegion)?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(DmaError::OutOfMemory)?;
        let region = MemoryRegion::identity(ptr.as_ptr() as usize, size);
        Ok(Self::with_region(region, Some(HeapBacking { ptr, layout })))
    }

    fn with_region(region: MemoryRegion, backing: Option<HeapBacking>) -> Self {
        log::debug!(
            "dma arena: {:#x} bus {:#x}, {} KiB",
            region.base,
            region.bus,
            region.size / 1024
        );
        Self {
            region,
            live: [Allocation::empty(); MAX_ALLOCATIONS],
            live_count: 0,
            used: 0,
            _backing: backing,
        }
    }

    /// Allocate a zeroed block.
    ///
    /// # Arguments
    /// - `size`: Block size in bytes
    /// - `align`: Power-of-two alignment, at most [`PAGE_SIZE`]
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<DmaAllocation> {
        if size == 0 {
            return Err(DmaError::ZeroSize);
        }
        if !align.is_power_of_two() || align > PAGE_SIZE {
            return Err(DmaError::InvalidAlignment);
        }
        if self.live_count == MAX_ALLOCATIONS {
            return Err(DmaError::TooManyAllocations);
        }

        // Walk the gaps between live blocks, lowest offset first.
        let mut cursor = 0usize;
        let mut slot = self.live_count;
        let mut start = None;
        for (i, block) in self.live[..self.live_count].iter().enumerate() {
            let candidate = align_up(cursor, align);
            if candidate + size <= block.offset {
                slot = i;
                start = Some(candidate);
                break;
            }
            cursor = block.end();
        }
        let offset = match start {
            Some(offset) => offset,
            None => {
                let candidate = align_up(cursor, align);
                if candidate + size > self.region.size {
                    return Err(DmaError::OutOfMemory);
                }
                candidate
            }
        };

        self.live.copy_within(slot..self.live_count, slot + 1);
        self.live[slot] = Allocation { offset, size };
        self.live_count += 1;
        self.used += size;

        let cpu_raw = (self.region.base + offset) as *mut u8;
        // SAFETY: offset + size <= region.size and the region is writable.
        unsafe { core::ptr::write_bytes(cpu_raw, 0, size) };
        let cpu = NonNull::new(cpu_raw).ok_or(DmaError::InvalidRegion)?;

        Ok(DmaAllocation {
            cpu,
            bus: self.region.bus + offset as u64,
            size,
            offset,
        })
    }

    /// Return a block to the arena.
    pub fn free(&mut self, block: DmaAllocation) -> Result<()> {
        let index = self.live[..self.live_count]
            .iter()
            .position(|a| a.offset == block.offset && a.size == block.size)
            .ok_or(DmaError::UnknownAllocation)?;
        self.live.copy_within(index + 1..self.live_count, index);
        self.live_count -= 1;
        self.live[self.live_count] = Allocation::empty();
        self.used -= block.size;
        Ok(())
    }

    /// Open a rollback scope over this arena.
    pub fn scope(&mut self) -> ArenaScope<'_> {
        ArenaScope {
            arena: self,
            taken: [None; MAX_ALLOCATIONS],
            count: 0,
        }
    }

    /// Region backing this arena.
    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    /// Total arena size in bytes.
    pub fn total_size(&self) -> usize {
        self.region.size
    }

    /// Bytes currently handed out (excluding alignment padding).
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes not handed out.
    pub fn free_space(&self) -> usize {
        self.region.size - self.used
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.live_count
    }
}

// ============================================================================
// Scoped rollback
// ============================================================================

/// Construct-or-rollback guard.
///
/// Every block allocated through the scope is freed when the scope is
/// dropped, unless [`commit`](Self::commit) was called first.
pub struct ArenaScope<'a> {
    arena: &'a mut DmaArena,
    taken: [Option<DmaAllocation>; MAX_ALLOCATIONS],
    count: usize,
}

impl<'a> ArenaScope<'a> {
    /// Allocate a block that is released again if the scope unwinds.
    pub fn alloc(&mut self, size: usize, align: usize) -> Result<DmaAllocation> {
        let block = self.arena.alloc(size, align)?;
        self.taken[self.count] = Some(block);
        self.count += 1;
        Ok(block)
    }

    /// Number of blocks handed out through this scope.
    pub fn allocated(&self) -> usize {
        self.count
    }

    /// Keep every block allocated through this scope.
    pub fn commit(mut self) {
        self.count = 0;
    }
}

impl Drop for ArenaScope<'_> {
    fn drop(&mut self) {
        if self.count == 0 {
            return;
        }
        log::debug!("dma arena: rolling back {} allocations", self.count);
        for slot in self.taken[..self.count].iter_mut().rev() {
            if let Some(block) = slot.take() {
                // Blocks came from this arena, so free cannot fail.
                let _ = self.arena.free(block);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
