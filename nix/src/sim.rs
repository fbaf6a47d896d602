//! Software model of the NPA/NIX/LMT blocks.
//!
//! [`SimNic`] implements every collaborator trait the engine uses, so the
//! whole packet path can run without silicon:
//!
//! - auras are LIFO stacks fed by batch-free LMT submits
//! - send submits record the frame, return the buffer to its aura and post
//!   a send completion
//! - [`SimNic::inject_rx`] plays the receive side: takes a buffer from the
//!   small or large aura, copies the frame in and posts an RX completion
//! - every LMT submit not preceded by a write barrier is counted as a
//!   [`barrier_violations`](SimNic::barrier_violations)
//! - every CQ doorbell whose last preceding access was not a write barrier
//!   is counted as a [`door_barrier_violations`](SimNic::door_barrier_violations)
//!
//! Handles are cheap clones of shared state; tests keep one and give others
//! to the engine.
//!
//! The model dereferences bus addresses directly, so the arena must be
//! identity mapped ([`DmaArena::with_capacity`](dma_pool::DmaArena::with_capacity)).

use alloc::collections::{BTreeMap, VecDeque};
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::admin::{AdminQueue, AfCapabilities, NixLfLayout};
use crate::error::{NixError, Result};
use crate::hw::chip::PlatformRegisters;
use crate::hw::regs::{
    npa_lf_aura_op_allocx, nixx_lf_op_sendx, LMT_LINE_SIZE, NIXX_LF_CQ_OP_DOOR,
    NIXX_LF_CQ_OP_STATUS, NIX_BASE, NPA_BASE, NPA_LF_AURA_BATCH_FREE0,
};
use crate::hw::wire::{
    cq_door_decode, AuraContext, CqContext, CqStatus, CqStatusFlags, CqeHeader, CqeType,
    FreeDescriptor, PoolContext, RqContext, RxCqe, RxParse, SendCompletion, SendDescriptor,
    SgDescriptor, SqContext, CQE_SIZE, CQE_WORDS,
};
use crate::hw::{Delay, RegisterIo};
use crate::link::{LinkLayer, LinkStatus, MacAddress};
use crate::pool::POOL_COUNT;
use crate::queue::{CQ_RX, CQ_TX, RQ_ID};

/// LMT lines modelled.
const LMT_LINES: usize = 32;
/// Head/tail width of the CQ status response.
const CQ_INDEX_MASK: u32 = 0xf_ffff;

/// Capabilities reported unless overridden.
pub const SIM_CAPS: AfCapabilities = AfCapabilities {
    stack_page_ptrs: 510,
    stack_page_bytes: 4096,
    sqb_size: 512,
    rq_ctx_size: 128,
    sq_ctx_size: 128,
    cq_ctx_size: 128,
};

#[derive(Default)]
struct SimAura {
    stack: Vec<u64>,
    aura: Option<AuraContext>,
    pool: Option<PoolContext>,
}

struct SimCq {
    base: u64,
    entries: u32,
    /// Free-running counters.
    head: u32,
    tail: u32,
    flags: CqStatusFlags,
    doors: u64,
}

impl SimCq {
    fn pending(&self) -> u32 {
        self.tail.wrapping_sub(self.head)
    }
}

struct PendingSend {
    addr: u64,
    aura: u32,
    df: bool,
    pnc: bool,
}

struct SimState {
    caps: AfCapabilities,
    admin_ops: usize,
    fail_admin_at: Option<usize>,
    npa_attached: bool,
    nix_layout: Option<NixLfLayout>,
    auras: Vec<SimAura>,
    cqs: [Option<SimCq>; 2],
    rq: Option<RqContext>,
    sq: Option<SqContext>,
    teardowns: usize,

    regs: BTreeMap<u64, u64>,
    lmt: Vec<[u64; CQE_WORDS]>,
    barrier_pending: bool,
    barrier_violations: usize,
    /// Last register access was a write barrier.
    fenced: bool,
    door_barrier_violations: usize,
    double_frees: usize,
    unknown_submits: usize,
    door_overruns: usize,

    auto_complete: bool,
    pending_sends: VecDeque<PendingSend>,
    transmitted: Vec<Vec<u8>>,
    rx_drops: usize,

    link_up: bool,
    rx_tx_enabled: bool,
    link_enable_calls: usize,
    rx_tx_calls: usize,
    mac: Option<MacAddress>,
    mac_writes: usize,
    delay_ms: u64,

    midr: u64,
    rst_boot: u64,
}

impl SimState {
    fn new(caps: AfCapabilities) -> Self {
        Self {
            caps,
            admin_ops: 0,
            fail_admin_at: None,
            npa_attached: false,
            nix_layout: None,
            auras: (0..POOL_COUNT).map(|_| SimAura::default()).collect(),
            cqs: [None, None],
            rq: None,
            sq: None,
            teardowns: 0,
            regs: BTreeMap::new(),
            lmt: vec![[0u64; CQE_WORDS]; LMT_LINES],
            barrier_pending: false,
            barrier_violations: 0,
            fenced: false,
            door_barrier_violations: 0,
            double_frees: 0,
            unknown_submits: 0,
            door_overruns: 0,
            auto_complete: true,
            pending_sends: VecDeque::new(),
            transmitted: Vec::new(),
            rx_drops: 0,
            link_up: true,
            rx_tx_enabled: false,
            link_enable_calls: 0,
            rx_tx_calls: 0,
            mac: None,
            mac_writes: 0,
            delay_ms: 0,
            midr: 0x43 << 24 | 0xB2 << 4,
            rst_boot: 0,
        }
    }

    fn admin_op(&mut self) -> Result<()> {
        self.admin_ops += 1;
        if self.fail_admin_at == Some(self.admin_ops) {
            return Err(NixError::AdminFailed);
        }
        Ok(())
    }

    fn aura_mut(&mut self, id: u32) -> Option<&mut SimAura> {
        self.auras.get_mut(id as usize)
    }

    fn batch_free(&mut self, line: usize) {
        let words = self.lmt[line % LMT_LINES];
        let (desc, count) = FreeDescriptor::unpack(&[words[0], words[1]]);
        if count != 1 {
            self.unknown_submits += 1;
            return;
        }
        let mut double = false;
        match self.aura_mut(desc.pool_id) {
            Some(aura) if aura.stack.contains(&desc.addr) => double = true,
            Some(aura) => aura.stack.push(desc.addr),
            None => {}
        }
        if double {
            self.double_frees += 1;
        }
    }

    fn send(&mut self, line: usize) {
        let words = self.lmt[line % LMT_LINES];
        let desc = match SendDescriptor::from_words(&words) {
            Some(desc) => desc,
            None => {
                self.unknown_submits += 1;
                return;
            }
        };
        let len = desc.sg.seg_sizes[0] as usize;
        let mut frame = vec![0u8; len];
        // SAFETY: identity-mapped arena; the engine owns `len` bytes at addr.
        unsafe { core::ptr::copy_nonoverlapping(desc.addr as *const u8, frame.as_mut_ptr(), len) };
        self.transmitted.push(frame);
        self.pending_sends.push_back(PendingSend {
            addr: desc.addr,
            aura: desc.hdr.aura,
            df: desc.hdr.df,
            pnc: desc.hdr.pnc,
        });
        if self.auto_complete {
            self.complete_sends();
        }
    }

    fn complete_sends(&mut self) -> usize {
        let mut done = 0;
        while let Some(send) = self.pending_sends.pop_front() {
            if !send.df {
                if let Some(aura) = self.aura_mut(send.aura) {
                    aura.stack.push(send.addr);
                }
            }
            if send.pnc {
                let mut words = [0u64; CQE_WORDS];
                words[0] = CqeHeader {
                    tag: 0,
                    q: 0,
                    cqe_type: CqeType::Send,
                }
                .pack();
                words[1] = SendCompletion::default().pack();
                self.post(CQ_TX, &words);
            }
            done += 1;
        }
        done
    }

    fn post(&mut self, cq_id: u32, words: &[u64; CQE_WORDS]) -> bool {
        let cq = match self.cqs.get_mut(cq_id as usize).and_then(|c| c.as_mut()) {
            Some(cq) => cq,
            None => return false,
        };
        if cq.pending() >= cq.entries - 1 {
            cq.flags |= CqStatusFlags::CQ_ERR;
            return false;
        }
        let slot = (cq.tail & (cq.entries - 1)) as usize;
        let dst = (cq.base as usize + slot * CQE_SIZE) as *mut u64;
        for (i, word) in words.iter().enumerate() {
            // SAFETY: identity-mapped ring of `entries` W16 slots.
            unsafe { core::ptr::write_volatile(dst.add(i), *word) };
        }
        cq.tail = cq.tail.wrapping_add(1);
        true
    }

    fn status(&self, cq_id: u32) -> u64 {
        match self.cqs.get(cq_id as usize).and_then(|c| c.as_ref()) {
            Some(cq) => CqStatus {
                head: cq.head & CQ_INDEX_MASK,
                tail: cq.tail & CQ_INDEX_MASK,
                flags: cq.flags,
            }
            .encode(),
            None => CqStatusFlags::OP_ERR.bits(),
        }
    }

    fn door(&mut self, word: u64) {
        let (cq_id, count) = cq_door_decode(word);
        let mut overrun = false;
        if let Some(cq) = self.cqs.get_mut(cq_id as usize).and_then(|c| c.as_mut()) {
            cq.doors += 1;
            if count as u32 > cq.pending() {
                overrun = true;
            } else {
                cq.head = cq.head.wrapping_add(count as u32);
            }
        }
        if overrun {
            self.door_overruns += 1;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HANDLE
// ═══════════════════════════════════════════════════════════════════════════

/// Shared handle to one simulated NIC.
#[derive(Clone)]
pub struct SimNic {
    state: Rc<RefCell<SimState>>,
}

impl Default for SimNic {
    fn default() -> Self {
        Self::new()
    }
}

impl SimNic {
    pub fn new() -> Self {
        Self::with_caps(SIM_CAPS)
    }

    pub fn with_caps(caps: AfCapabilities) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::new(caps))),
        }
    }

    /// Fail the `n`th admin request (1-based, counted from now on).
    pub fn fail_admin_op(&self, n: usize) {
        let mut s = self.state.borrow_mut();
        s.fail_admin_at = Some(s.admin_ops + n);
    }

    pub fn set_link_up(&self, up: bool) {
        self.state.borrow_mut().link_up = up;
    }

    /// Complete sends immediately (default) or hold them for [`complete_tx`](Self::complete_tx).
    pub fn set_auto_complete(&self, on: bool) {
        self.state.borrow_mut().auto_complete = on;
    }

    /// Complete every held send; returns how many.
    pub fn complete_tx(&self) -> usize {
        self.state.borrow_mut().complete_sends()
    }

    /// Raise error bits in the status of `cq`.
    pub fn set_cq_error(&self, cq: u32, flags: CqStatusFlags) {
        if let Some(cq) = self.state.borrow_mut().cqs.get_mut(cq as usize).and_then(|c| c.as_mut()) {
            cq.flags = flags;
        }
    }

    pub fn set_platform(&self, midr: u64, rst_boot: u64) {
        let mut s = self.state.borrow_mut();
        s.midr = midr;
        s.rst_boot = rst_boot;
    }

    /// Receive `frame` from the wire.
    ///
    /// Returns the buffer address used, or `None` when the frame was
    /// dropped (queue not set up, too long, or aura empty).
    pub fn inject_rx(&self, frame: &[u8]) -> Option<u64> {
        let mut s = self.state.borrow_mut();
        let rq = s.rq;
        let rq = match rq {
            Some(rq) if rq.ena && !frame.is_empty() => rq,
            _ => {
                s.rx_drops += 1;
                return None;
            }
        };
        if frame.len() > rq.lpb_max_len as usize {
            s.rx_drops += 1;
            return None;
        }
        let aura_id = if rq.spb_ena && frame.len() <= rq.spb_max_len as usize {
            rq.spb_aura
        } else {
            rq.lpb_aura
        };
        let addr = match s.aura_mut(aura_id).and_then(|a| a.stack.pop()) {
            Some(addr) => addr,
            None => {
                s.rx_drops += 1;
                return None;
            }
        };
        // SAFETY: identity-mapped arena; the aura only holds whole buffers.
        unsafe { core::ptr::copy_nonoverlapping(frame.as_ptr(), addr as *mut u8, frame.len()) };

        let cqe = RxCqe {
            hdr: CqeHeader {
                tag: 0,
                q: RQ_ID,
                cqe_type: CqeType::Rx,
            },
            parse: RxParse {
                pkt_lenm1: (frame.len() - 1) as u16,
                ..RxParse::default()
            },
            sg: SgDescriptor {
                ld_type: 0,
                ..SgDescriptor::single(frame.len() as u16)
            },
            seg_addrs: [addr, 0, 0],
        };
        if !s.post(rq.cq, &cqe.to_words()) {
            if let Some(aura) = s.aura_mut(aura_id) {
                aura.stack.push(addr);
            }
            s.rx_drops += 1;
            return None;
        }
        Some(addr)
    }

    /// Post arbitrary completion words to `cq`.
    pub fn inject_raw_cqe(&self, cq: u32, words: [u64; CQE_WORDS]) -> bool {
        self.state.borrow_mut().post(cq, &words)
    }

    /// Buffers currently on aura `id`'s stack.
    pub fn aura_depth(&self, id: u32) -> usize {
        self.state
            .borrow()
            .auras
            .get(id as usize)
            .map_or(0, |a| a.stack.len())
    }

    pub fn aura_context(&self, id: u32) -> Option<AuraContext> {
        self.state.borrow().auras.get(id as usize).and_then(|a| a.aura)
    }

    pub fn pool_context(&self, id: u32) -> Option<PoolContext> {
        self.state.borrow().auras.get(id as usize).and_then(|a| a.pool)
    }

    pub fn rq_context(&self) -> Option<RqContext> {
        self.state.borrow().rq
    }

    pub fn sq_context(&self) -> Option<SqContext> {
        self.state.borrow().sq
    }

    pub fn is_attached(&self) -> bool {
        let s = self.state.borrow();
        s.npa_attached && s.nix_layout.is_some()
    }

    /// Frames sent so far, oldest first.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.state.borrow().transmitted.clone()
    }

    /// Entries posted and not yet consumed on `cq`.
    pub fn cq_pending(&self, cq: u32) -> u32 {
        self.state
            .borrow()
            .cqs
            .get(cq as usize)
            .and_then(|c| c.as_ref())
            .map_or(0, SimCq::pending)
    }

    /// Doorbell writes seen on `cq`.
    pub fn doors(&self, cq: u32) -> u64 {
        self.state
            .borrow()
            .cqs
            .get(cq as usize)
            .and_then(|c| c.as_ref())
            .map_or(0, |c| c.doors)
    }

    pub fn barrier_violations(&self) -> usize {
        self.state.borrow().barrier_violations
    }

    pub fn door_barrier_violations(&self) -> usize {
        self.state.borrow().door_barrier_violations
    }

    pub fn double_frees(&self) -> usize {
        self.state.borrow().double_frees
    }

    pub fn door_overruns(&self) -> usize {
        self.state.borrow().door_overruns
    }

    pub fn unknown_submits(&self) -> usize {
        self.state.borrow().unknown_submits
    }

    pub fn rx_drops(&self) -> usize {
        self.state.borrow().rx_drops
    }

    pub fn rx_tx_enabled(&self) -> bool {
        self.state.borrow().rx_tx_enabled
    }

    pub fn rx_tx_calls(&self) -> usize {
        self.state.borrow().rx_tx_calls
    }

    pub fn link_enable_calls(&self) -> usize {
        self.state.borrow().link_enable_calls
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.state.borrow().mac
    }

    pub fn mac_writes(&self) -> usize {
        self.state.borrow().mac_writes
    }

    pub fn delay_total_ms(&self) -> u64 {
        self.state.borrow().delay_ms
    }

    pub fn teardowns(&self) -> usize {
        self.state.borrow().teardowns
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TRAIT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl RegisterIo for SimNic {
    fn read64(&self, offset: u64) -> u64 {
        let mut s = self.state.borrow_mut();
        s.fenced = false;
        s.regs.get(&offset).copied().unwrap_or(0)
    }

    fn write64(&self, offset: u64, value: u64) {
        let mut s = self.state.borrow_mut();
        let fenced = core::mem::replace(&mut s.fenced, false);
        if offset == NIX_BASE + NIXX_LF_CQ_OP_DOOR {
            if !fenced {
                s.door_barrier_violations += 1;
            }
            s.door(value);
        } else {
            s.regs.insert(offset, value);
        }
    }

    fn fetch_add64(&self, offset: u64, value: u64) -> u64 {
        let mut s = self.state.borrow_mut();
        s.fenced = false;
        if offset == NPA_BASE + npa_lf_aura_op_allocx(0) {
            return s
                .aura_mut(value as u32)
                .and_then(|a| a.stack.pop())
                .unwrap_or(0);
        }
        if offset == NIX_BASE + NIXX_LF_CQ_OP_STATUS {
            return s.status((value >> 32) as u32);
        }
        let old = s.regs.get(&offset).copied().unwrap_or(0);
        s.regs.insert(offset, old.wrapping_add(value));
        old
    }

    fn lmt_store(&self, line_offset: usize, words: &[u64]) {
        let mut s = self.state.borrow_mut();
        let line = (line_offset / LMT_LINE_SIZE) % LMT_LINES;
        let start = (line_offset % LMT_LINE_SIZE) / 8;
        for (i, word) in words.iter().enumerate().take(CQE_WORDS - start) {
            s.lmt[line][start + i] = *word;
        }
        s.barrier_pending = true;
        s.fenced = false;
    }

    fn write_barrier(&self) {
        let mut s = self.state.borrow_mut();
        s.barrier_pending = false;
        s.fenced = true;
    }

    fn lmt_submit(&self, offset: u64, value: u64) {
        let mut s = self.state.borrow_mut();
        s.fenced = false;
        if s.barrier_pending {
            s.barrier_violations += 1;
        }
        let line = value as usize;
        if offset == NPA_BASE + NPA_LF_AURA_BATCH_FREE0 {
            s.batch_free(line);
        } else if offset & !0xf0 == NIX_BASE + nixx_lf_op_sendx(0) {
            s.send(line);
        } else {
            s.unknown_submits += 1;
        }
    }
}

impl AdminQueue for SimNic {
    fn capabilities(&mut self) -> Result<AfCapabilities> {
        let mut s = self.state.borrow_mut();
        s.admin_op()?;
        Ok(s.caps)
    }

    fn npa_lf_setup(&mut self, _aura_table: u64, aura_count: u32) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.admin_op()?;
        if aura_count as usize > POOL_COUNT {
            return Err(NixError::AdminFailed);
        }
        s.npa_attached = true;
        Ok(())
    }

    fn attach_aura(&mut self, aura_id: u32, ctx: &AuraContext) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.admin_op()?;
        let aura = s.aura_mut(aura_id).ok_or(NixError::AdminFailed)?;
        aura.aura = Some(*ctx);
        aura.stack.clear();
        Ok(())
    }

    fn attach_pool(&mut self, pool_id: u32, ctx: &PoolContext) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.admin_op()?;
        let aura = s.aura_mut(pool_id).ok_or(NixError::AdminFailed)?;
        aura.pool = Some(*ctx);
        Ok(())
    }

    fn nix_lf_setup(&mut self, layout: &NixLfLayout) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.admin_op()?;
        s.nix_layout = Some(*layout);
        Ok(())
    }

    fn init_cq(&mut self, cq_id: u32, ctx: &CqContext) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.admin_op()?;
        let slot = s.cqs.get_mut(cq_id as usize).ok_or(NixError::AdminFailed)?;
        *slot = Some(SimCq {
            base: ctx.base,
            entries: ctx.entries(),
            head: 0,
            tail: 0,
            flags: CqStatusFlags::empty(),
            doors: 0,
        });
        Ok(())
    }

    fn init_rq(&mut self, rq_id: u32, ctx: &RqContext) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.admin_op()?;
        if rq_id != RQ_ID || ctx.cq != CQ_RX {
            return Err(NixError::AdminFailed);
        }
        s.rq = Some(*ctx);
        Ok(())
    }

    fn init_sq(&mut self, _sq_id: u32, ctx: &SqContext) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.admin_op()?;
        s.sq = Some(*ctx);
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.teardowns += 1;
        s.npa_attached = false;
        s.nix_layout = None;
        s.rq = None;
        s.sq = None;
        s.cqs = [None, None];
        for aura in s.auras.iter_mut() {
            *aura = SimAura::default();
        }
        Ok(())
    }
}

impl LinkLayer for SimNic {
    fn link_enable(&mut self) -> Result<u64> {
        let mut s = self.state.borrow_mut();
        s.link_enable_calls += 1;
        s.rx_tx_enabled = true;
        Ok(sim_link_word(s.link_up))
    }

    fn link_status(&mut self) -> Result<u64> {
        Ok(sim_link_word(self.state.borrow().link_up))
    }

    fn set_rx_tx_enable(&mut self, enable: bool) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.rx_tx_calls += 1;
        s.rx_tx_enabled = enable;
        Ok(())
    }

    fn set_mac_filter(&mut self, mac: &MacAddress) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.mac = Some(*mac);
        s.mac_writes += 1;
        Ok(())
    }
}

fn sim_link_word(up: bool) -> u64 {
    LinkStatus {
        up,
        speed: 6,
        errcode: 0,
        lmac_type: 3,
    }
    .encode()
}

impl Delay for SimNic {
    fn delay_ms(&mut self, ms: u32) {
        self.state.borrow_mut().delay_ms += ms as u64;
    }
}

impl PlatformRegisters for SimNic {
    fn midr(&self) -> u64 {
        self.state.borrow().midr
    }

    fn rst_boot(&self) -> u64 {
        self.state.borrow().rst_boot
    }
}
