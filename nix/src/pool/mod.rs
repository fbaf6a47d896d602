//! Buffer Pool Manager.
//!
//! Each pool is a fixed set of equally sized buffers carved from one
//! contiguous arena block. The hardware aura is the free list: software
//! allocates with an atomic fetch-and-add on the aura's ALLOC register and
//! returns buffers through an LMT batch-free line. The [`OwnershipLedger`]
//! mirrors who holds each buffer so misuse is caught before hardware sees it.

pub mod ledger;

use alloc::vec::Vec;

use dma_pool::{align_up, ArenaScope, DmaAllocation, CACHE_LINE};

use crate::admin::{AdminQueue, AfCapabilities};
use crate::config::NixConfig;
use crate::error::{NixError, Result};
use crate::hw::regs::{npa_lf_aura_op_allocx, LMT_LINE_SIZE, NPA_BASE, NPA_LF_AURA_BATCH_FREE0};
use crate::hw::wire::{AuraContext, FreeDescriptor, PoolContext, CTX_SIZE};
use crate::hw::RegisterIo;

pub use ledger::{BufferOwnership, OwnershipLedger};

/// Number of pool classes.
pub const POOL_COUNT: usize = 4;

/// Highest address a pool accepts (40-bit physical).
pub const POOL_PTR_END: u64 = (1 << 40) - 1;

/// Pool class; the discriminant is both the pool id and the aura id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PoolClass {
    RxSmall = 0,
    Tx = 1,
    Sqb = 2,
    RxLarge = 3,
}

impl PoolClass {
    pub const ALL: [PoolClass; POOL_COUNT] = [Self::RxSmall, Self::Tx, Self::Sqb, Self::RxLarge];

    pub const fn id(&self) -> u32 {
        *self as u32
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::RxSmall => "rx",
            Self::Tx => "tx",
            Self::Sqb => "sqb",
            Self::RxLarge => "rx-lpb",
        }
    }

    /// RX pool a frame of `len` bytes lands in.
    pub const fn for_rx_len(len: usize, max_mtu: usize) -> Self {
        if len > max_mtu {
            Self::RxLarge
        } else {
            Self::RxSmall
        }
    }
}

/// `log2`-style shift the NPA uses to scale counts: max(bits(n) - 8, 0).
#[inline]
pub(crate) fn count_shift(n: u64) -> u8 {
    (64 - n.leading_zeros()).saturating_sub(8) as u8
}

// ═══════════════════════════════════════════════════════════════════════════
// POOL SPEC
// ═══════════════════════════════════════════════════════════════════════════

/// Geometry of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSpec {
    pub class: PoolClass,
    /// Usable bytes per buffer.
    pub buffer_size: usize,
    /// Number of buffers (power of two).
    pub capacity: u32,
}

impl PoolSpec {
    pub const fn new(class: PoolClass, buffer_size: usize, capacity: u32) -> Self {
        Self {
            class,
            buffer_size,
            capacity,
        }
    }

    /// Distance between consecutive buffers.
    pub const fn stride(&self) -> usize {
        align_up(self.buffer_size, CACHE_LINE)
    }

    /// Aura count shift.
    pub fn aura_shift(&self) -> u8 {
        count_shift(self.capacity as u64)
    }

    /// Hardware stack pages needed to hold every pointer.
    pub fn stack_pages(&self, caps: &AfCapabilities) -> u32 {
        self.capacity.div_ceil(caps.stack_page_ptrs)
    }

    pub fn validate(&self, caps: &AfCapabilities) -> Result<()> {
        if self.buffer_size == 0 || !self.capacity.is_power_of_two() {
            return Err(NixError::InvalidParameter);
        }
        // buf_size is a 12-bit count of cache lines.
        if self.stride() / CACHE_LINE > 0xfff {
            return Err(NixError::InvalidParameter);
        }
        if caps.stack_page_ptrs == 0 || caps.stack_page_bytes == 0 {
            return Err(NixError::InvalidParameter);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BUFFER POOL
// ═══════════════════════════════════════════════════════════════════════════

/// One hardware-backed buffer pool.
pub struct BufferPool {
    spec: PoolSpec,
    buffers: DmaAllocation,
    stack: DmaAllocation,
    context: DmaAllocation,
    ledger: OwnershipLedger,
}

impl BufferPool {
    /// Create a pool and seed its aura with every buffer.
    ///
    /// All memory comes from `scope`; if anything fails the caller drops the
    /// scope and every block made here is returned to the arena.
    ///
    /// # Arguments
    /// - `spec`: Pool geometry
    /// - `caps`: Admin-function limits (stack page size)
    /// - `scope`: Rollback scope to allocate from
    /// - `admin`: Installs the aura and pool contexts
    /// - `io`: Register access for seeding
    pub fn create<A: AdminQueue, R: RegisterIo>(
        spec: PoolSpec,
        caps: &AfCapabilities,
        scope: &mut ArenaScope<'_>,
        admin: &mut A,
        io: &R,
    ) -> Result<Self> {
        spec.validate(caps)?;

        let stride = spec.stride();
        let capacity = spec.capacity as usize;
        let stack_pages = spec.stack_pages(caps);
        let total = stride
            .checked_mul(capacity)
            .ok_or(NixError::InvalidParameter)?;

        let context = scope.alloc(CTX_SIZE, CACHE_LINE)?;
        let stack = scope.alloc(stack_pages as usize * caps.stack_page_bytes, CACHE_LINE)?;
        let buffers = scope.alloc(total, CACHE_LINE)?;

        let id = spec.class.id();
        let aura = AuraContext {
            pool_addr: context.bus_addr(),
            ena: true,
            shift: spec.aura_shift(),
            count: spec.capacity as u64,
            limit: spec.capacity as u64,
        };
        let pool = PoolContext {
            stack_base: stack.bus_addr(),
            ena: true,
            nat_align: true,
            buf_size: (stride / CACHE_LINE) as u16,
            stack_max_pages: stack_pages,
            stack_pages,
            shift: count_shift(caps.stack_page_ptrs as u64),
            ptr_start: 0,
            ptr_end: POOL_PTR_END,
        };
        admin.attach_aura(id, &aura)?;
        admin.attach_pool(id, &pool)?;

        let mut this = Self {
            spec,
            buffers,
            stack,
            context,
            ledger: OwnershipLedger::new(buffers.bus_addr(), stride, capacity),
        };
        for i in 0..capacity {
            this.release(io, buffers.bus_addr() + (i * stride) as u64)?;
        }

        log::debug!(
            "pool {}: {} x {} bytes at {:#x}, {} stack pages",
            spec.class.name(),
            capacity,
            stride,
            buffers.bus_addr(),
            stack_pages
        );
        Ok(this)
    }

    /// Take one buffer from the aura.
    ///
    /// A buffer the ledger still holds as device-owned was put back by
    /// hardware after transmit ahead of its send completion; it is
    /// reclaimed and handed out. Any other address the ledger rejects is
    /// pushed back to the aura before the error is returned.
    ///
    /// # Returns
    /// - `Ok(Some(addr))`: Buffer now driver-held
    /// - `Ok(None)`: Aura empty
    pub fn allocate<R: RegisterIo>(&mut self, io: &R) -> Result<Option<u64>> {
        let addr = io.fetch_add64(
            NPA_BASE + npa_lf_aura_op_allocx(0),
            self.spec.class.id() as u64,
        );
        if addr == 0 {
            return Ok(None);
        }
        if self.ledger.state(addr) == Some(BufferOwnership::Device) {
            log::debug!(
                "pool {}: {:#x} returned by hardware before its completion",
                self.spec.class.name(),
                addr
            );
            self.ledger.on_device_returned(addr)?;
        }
        if let Err(err) = self.ledger.on_allocated(addr) {
            log::error!("pool {}: aura returned {:#x}: {}", self.spec.class.name(), addr, err);
            self.push_free(io, addr);
            return Err(err);
        }
        Ok(Some(addr))
    }

    /// Return a driver-held buffer to the aura.
    ///
    /// Rejected releases (`DoubleFree`, `UnknownBuffer`) never reach hardware.
    pub fn release<R: RegisterIo>(&mut self, io: &R, addr: u64) -> Result<()> {
        self.ledger.check_release(addr)?;
        self.push_free(io, addr);
        self.ledger.on_released(addr)
    }

    /// Batch-free one pointer to the aura without touching the ledger.
    fn push_free<R: RegisterIo>(&self, io: &R, addr: u64) {
        let id = self.spec.class.id();
        let desc = FreeDescriptor { pool_id: id, addr };
        io.lmt_store(id as usize * LMT_LINE_SIZE, &desc.pack());
        io.write_barrier();
        io.lmt_submit(NPA_BASE + NPA_LF_AURA_BATCH_FREE0, id as u64);
    }

    /// Read access to a driver-held buffer.
    pub fn buffer(&self, addr: u64, len: usize) -> Result<&[u8]> {
        let ptr = self.checked_ptr(addr, len)?;
        // SAFETY: the ledger says software owns the buffer and `len` fits it.
        Ok(unsafe { core::slice::from_raw_parts(ptr, len) })
    }

    /// Write access to a driver-held buffer.
    pub fn buffer_mut(&mut self, addr: u64, len: usize) -> Result<&mut [u8]> {
        let ptr = self.checked_ptr(addr, len)?;
        // SAFETY: as `buffer`; `&mut self` makes the borrow unique.
        Ok(unsafe { core::slice::from_raw_parts_mut(ptr, len) })
    }

    fn checked_ptr(&self, addr: u64, len: usize) -> Result<*mut u8> {
        match self.ledger.state(addr) {
            None => return Err(NixError::UnknownBuffer),
            Some(state) if !state.can_access() => return Err(NixError::OwnershipViolation),
            Some(_) => {}
        }
        if len > self.spec.buffer_size {
            return Err(NixError::SegmentOverflow);
        }
        self.buffers
            .cpu_for_bus(addr)
            .ok_or(NixError::UnknownBuffer)
    }

    pub(crate) fn mark_received(&mut self, addr: u64) -> Result<()> {
        self.ledger.on_received(addr)
    }

    pub(crate) fn mark_submitted(&mut self, addr: u64) -> Result<()> {
        self.ledger.on_submitted(addr)
    }

    pub(crate) fn mark_device_returned(&mut self, addr: u64) -> Result<()> {
        self.ledger.on_device_returned(addr)
    }

    /// Check that `addr` is the start of one of this pool's buffers.
    pub fn owns(&self, addr: u64) -> bool {
        self.ledger.index_of(addr).is_some()
    }

    pub fn spec(&self) -> &PoolSpec {
        &self.spec
    }

    pub fn class(&self) -> PoolClass {
        self.spec.class
    }

    pub fn ledger(&self) -> &OwnershipLedger {
        &self.ledger
    }

    /// Buffers currently in the aura.
    pub fn free_count(&self) -> usize {
        self.ledger.free_count()
    }

    /// Buffers held by software or hardware descriptors.
    pub fn outstanding(&self) -> usize {
        self.ledger.outstanding()
    }

    pub fn check_invariants(&self) -> bool {
        self.ledger.check_invariants()
    }

    /// Arena blocks owned by this pool.
    pub fn memory_blocks(&self) -> [DmaAllocation; 3] {
        [self.context, self.stack, self.buffers]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// POOL SET
// ═══════════════════════════════════════════════════════════════════════════

/// The four pools the engine runs on.
pub struct PoolSet {
    aura_table: DmaAllocation,
    pools: Vec<BufferPool>,
}

impl PoolSet {
    /// Pool geometry for `config`.
    pub fn specs(config: &NixConfig, caps: &AfCapabilities) -> [PoolSpec; POOL_COUNT] {
        [
            PoolSpec::new(PoolClass::RxSmall, config.rx_buffer_size(), config.rx_qlen),
            PoolSpec::new(PoolClass::Tx, config.rx_buffer_size(), config.tx_qlen),
            PoolSpec::new(PoolClass::Sqb, caps.sqb_size, config.sqb_qlen),
            PoolSpec::new(PoolClass::RxLarge, config.rx_large_buffer_size(), config.rx_large_qlen),
        ]
    }

    /// Attach the NPA local function and build every pool.
    pub fn create<A: AdminQueue, R: RegisterIo>(
        config: &NixConfig,
        caps: &AfCapabilities,
        scope: &mut ArenaScope<'_>,
        admin: &mut A,
        io: &R,
    ) -> Result<Self> {
        let aura_table = scope.alloc(CTX_SIZE * POOL_COUNT, CACHE_LINE)?;
        admin.npa_lf_setup(aura_table.bus_addr(), POOL_COUNT as u32)?;

        let mut pools = Vec::with_capacity(POOL_COUNT);
        for spec in Self::specs(config, caps) {
            pools.push(BufferPool::create(spec, caps, scope, admin, io)?);
        }
        Ok(Self { aura_table, pools })
    }

    pub fn get(&self, class: PoolClass) -> &BufferPool {
        &self.pools[class.id() as usize]
    }

    pub fn get_mut(&mut self, class: PoolClass) -> &mut BufferPool {
        &mut self.pools[class.id() as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferPool> {
        self.pools.iter()
    }

    /// Every arena block owned by the set.
    pub fn memory_blocks(&self) -> Vec<DmaAllocation> {
        let mut blocks = Vec::with_capacity(1 + 3 * self.pools.len());
        blocks.push(self.aura_table);
        for pool in &self.pools {
            blocks.extend_from_slice(&pool.memory_blocks());
        }
        blocks
    }
}
