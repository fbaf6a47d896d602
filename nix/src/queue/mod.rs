//! Descriptor Ring Driver: completion queues and queue contexts.

pub mod completion;

use dma_pool::{ArenaScope, DmaAllocation, CACHE_LINE};

use crate::admin::{AdminQueue, AfCapabilities, NixLfLayout};
use crate::config::NixConfig;
use crate::error::{NixError, Result};
use crate::hw::wire::{CqContext, RqContext, SqContext, CQE_SIZE};
use crate::pool::PoolClass;

pub use completion::{CompletionRing, RingPosition, RingState};

/// Completion queue for send completions.
pub const CQ_TX: u32 = 0;
/// Completion queue for received packets.
pub const CQ_RX: u32 = 1;
/// The single receive queue.
pub const RQ_ID: u32 = 0;
/// The single send queue.
pub const SQ_ID: u32 = 0;

/// Largest send descriptor, in words.
const MAX_SQE_WORDS: u8 = 16;

/// Queue contexts plus both completion rings.
pub struct QueueSet {
    pub tx: CompletionRing,
    pub rx: CompletionRing,
    rq_ctx: DmaAllocation,
    sq_ctx: DmaAllocation,
    cq_ctx: DmaAllocation,
}

impl QueueSet {
    /// Attach the NIX local function and initialize CQs, RQ and SQ.
    ///
    /// The RQ places frames up to `max_mtu` in the small pool and larger
    /// ones in the large pool.
    pub fn create<A: AdminQueue>(
        config: &NixConfig,
        caps: &AfCapabilities,
        scope: &mut ArenaScope<'_>,
        admin: &mut A,
    ) -> Result<Self> {
        let qsize = config.cq_size_code().ok_or(NixError::InvalidParameter)?;
        let entries = config.cq_entries;

        let rq_ctx = scope.alloc(caps.rq_ctx_size, CACHE_LINE)?;
        let sq_ctx = scope.alloc(caps.sq_ctx_size, CACHE_LINE)?;
        let cq_ctx = scope.alloc(caps.cq_ctx_size * 2, CACHE_LINE)?;
        admin.nix_lf_setup(&NixLfLayout {
            rq_ctx_base: rq_ctx.bus_addr(),
            sq_ctx_base: sq_ctx.bus_addr(),
            cq_ctx_base: cq_ctx.bus_addr(),
            rq_count: 1,
            sq_count: 1,
            cq_count: 2,
        })?;

        let ring_bytes = entries as usize * CQE_SIZE;
        let tx_mem = scope.alloc(ring_bytes, CACHE_LINE)?;
        let rx_mem = scope.alloc(ring_bytes, CACHE_LINE)?;
        for (cq, mem) in [(CQ_TX, tx_mem), (CQ_RX, rx_mem)] {
            admin.init_cq(
                cq,
                &CqContext {
                    base: mem.bus_addr(),
                    ena: true,
                    qsize,
                },
            )?;
        }

        admin.init_rq(
            RQ_ID,
            &RqContext {
                cq: CQ_RX,
                ena: true,
                spb_ena: true,
                lpb_aura: PoolClass::RxLarge.id(),
                spb_aura: PoolClass::RxSmall.id(),
                spb_max_len: config.max_mtu as u16,
                lpb_max_len: config.hw_max_mtu as u16,
            },
        )?;
        admin.init_sq(
            SQ_ID,
            &SqContext {
                cq: CQ_TX,
                ena: true,
                sqb_aura: PoolClass::Sqb.id(),
                max_sqe_words: MAX_SQE_WORDS,
            },
        )?;

        log::debug!("queues: {} entry CQs at {:#x} / {:#x}", entries, tx_mem.bus_addr(), rx_mem.bus_addr());
        Ok(Self {
            tx: CompletionRing::new(CQ_TX, tx_mem, entries)?,
            rx: CompletionRing::new(CQ_RX, rx_mem, entries)?,
            rq_ctx,
            sq_ctx,
            cq_ctx,
        })
    }

    /// Every arena block owned by the set.
    pub fn memory_blocks(&self) -> [DmaAllocation; 5] {
        [
            self.rq_ctx,
            self.sq_ctx,
            self.cq_ctx,
            self.tx.memory(),
            self.rx.memory(),
        ]
    }
}
