//! Admin-function mailbox interface.
//!
//! Context writes for auras, pools and queues are privileged: the local
//! function asks the admin function to install them. The engine only sees
//! this trait; the mailbox transport belongs to the board layer.

use crate::error::Result;
use crate::hw::wire::{AuraContext, CqContext, PoolContext, RqContext, SqContext};

/// Sizes and limits reported by the admin function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfCapabilities {
    /// Pointers held by one NPA stack page.
    pub stack_page_ptrs: u32,
    /// Bytes per NPA stack page.
    pub stack_page_bytes: usize,
    /// Send-queue buffer size.
    pub sqb_size: usize,
    /// Bytes per RQ context.
    pub rq_ctx_size: usize,
    /// Bytes per SQ context.
    pub sq_ctx_size: usize,
    /// Bytes per CQ context.
    pub cq_ctx_size: usize,
}

/// Context memory handed to the NIX local function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NixLfLayout {
    pub rq_ctx_base: u64,
    pub sq_ctx_base: u64,
    pub cq_ctx_base: u64,
    pub rq_count: u32,
    pub sq_count: u32,
    pub cq_count: u32,
}

/// Privileged context operations.
///
/// Every method maps to one mailbox request; a rejected request is
/// reported as [`NixError::AdminFailed`](crate::NixError::AdminFailed).
pub trait AdminQueue {
    /// Query hardware limits.
    fn capabilities(&mut self) -> Result<AfCapabilities>;

    /// Attach the NPA local function with its aura context table.
    fn npa_lf_setup(&mut self, aura_table: u64, aura_count: u32) -> Result<()>;

    /// Install an aura context.
    fn attach_aura(&mut self, aura_id: u32, ctx: &AuraContext) -> Result<()>;

    /// Install a pool context.
    fn attach_pool(&mut self, pool_id: u32, ctx: &PoolContext) -> Result<()>;

    /// Attach the NIX local function with its context memory.
    fn nix_lf_setup(&mut self, layout: &NixLfLayout) -> Result<()>;

    fn init_cq(&mut self, cq_id: u32, ctx: &CqContext) -> Result<()>;

    fn init_rq(&mut self, rq_id: u32, ctx: &RqContext) -> Result<()>;

    fn init_sq(&mut self, sq_id: u32, ctx: &SqContext) -> Result<()>;

    /// Detach both local functions; contexts become invalid.
    fn teardown(&mut self) -> Result<()>;
}
