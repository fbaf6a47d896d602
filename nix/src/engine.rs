//! Packet I/O Engine.
//!
//! Single-threaded, polling packet path on top of the pools and rings:
//!
//! - **Transmit** copies the payload into a TX buffer, writes one send
//!   descriptor to an LMT line and submits it. Hardware returns the buffer
//!   to the TX aura after transmission and posts a send completion.
//! - **Receive** peeks at the head of the RX completion ring. The packet
//!   stays there (buffer held, ring not advanced) until [`free_packet`]
//!   returns the buffer and rings the doorbell, so at most one received
//!   packet is in flight.
//! - **Halt** stops the link and reconciles every outstanding buffer.
//!
//! [`free_packet`]: NixEngine::free_packet

use alloc::collections::VecDeque;

use dma_pool::DmaArena;

use crate::admin::{AdminQueue, AfCapabilities};
use crate::config::NixConfig;
use crate::error::{NixError, Result};
use crate::hw::regs::{nixx_lf_op_sendx, LMT_LINE_SIZE, NIX_BASE};
use crate::hw::wire::{
    CqeHeader, CqeType, RxCqe, SendCompletion, SendDescriptor, SendHeader, SgDescriptor,
};
use crate::hw::{Delay, RegisterIo};
use crate::link::{LinkLayer, LinkStatus, MacAddress, MacDisplay};
use crate::pool::{PoolClass, PoolSet};
use crate::queue::{QueueSet, SQ_ID};

/// Send operation size bits: one 128-bit LMT transfer beyond the first.
const SEND_LMT_SIZE: u64 = 1 << 4;

/// Send descriptor size in 16-byte units beyond the header, minus one.
const SEND_SIZEM1: u8 = 1;

// ═══════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Contexts installed, link not started.
    Ready,
    /// Link up, packets flowing.
    Running,
    /// RX/TX disabled and rings drained.
    Halted,
}

/// Packet counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_completions: u64,
    pub tx_errors: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_released: u64,
    pub unexpected_cqes: u64,
}

/// Borrowed view of the packet at the head of the RX ring.
#[derive(Debug, PartialEq, Eq)]
pub struct RxPacket<'a> {
    pub data: &'a [u8],
    /// Buffer address; pass back to [`NixEngine::free_packet`].
    pub addr: u64,
    pub len: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════

/// NIX packet engine for one local function.
pub struct NixEngine<R: RegisterIo, L: LinkLayer, D: Delay> {
    io: R,
    link: L,
    delay: D,
    config: NixConfig,
    pools: PoolSet,
    queues: QueueSet,
    state: EngineState,
    /// First start() enables the LMAC; later ones only query it.
    link_initialized: bool,
    rx_tx_enabled: bool,
    mac: Option<MacAddress>,
    /// Buffer of the packet last returned by receive().
    pending_rx: Option<u64>,
    /// TX buffers submitted and not yet completed, oldest first. `None`
    /// marks a send whose buffer the aura already handed out again.
    tx_inflight: VecDeque<Option<u64>>,
    stats: EngineStats,
}

impl<R: RegisterIo, L: LinkLayer, D: Delay> NixEngine<R, L, D> {
    /// Build pools, queues and contexts.
    ///
    /// Everything is allocated from `arena` inside one rollback scope: on
    /// failure every block is returned and the admin function is asked to
    /// detach whatever it already attached.
    ///
    /// # Arguments
    /// - `config`: Engine configuration
    /// - `arena`: DMA memory for buffers, stacks, contexts and rings
    /// - `admin`: Admin-function mailbox
    /// - `io`, `link`, `delay`: Collaborators kept by the engine
    pub fn setup<A: AdminQueue>(
        config: NixConfig,
        arena: &mut DmaArena,
        admin: &mut A,
        io: R,
        link: L,
        delay: D,
    ) -> Result<Self> {
        config.validate()?;
        let caps = admin.capabilities()?;

        let mut scope = arena.scope();
        let built = Self::build(&config, &caps, &mut scope, admin, &io);
        let (pools, queues) = match built {
            Ok(parts) => {
                scope.commit();
                parts
            }
            Err(err) => {
                drop(scope);
                log::error!("nix: setup failed: {}", err);
                if let Err(e) = admin.teardown() {
                    log::warn!("nix: teardown after failed setup: {}", e);
                }
                return Err(err);
            }
        };

        log::info!(
            "nix: ready, {} rx / {} tx buffers, {} entry CQs",
            config.rx_qlen,
            config.tx_qlen,
            config.cq_entries
        );
        Ok(Self {
            io,
            link,
            delay,
            config,
            pools,
            queues,
            state: EngineState::Ready,
            link_initialized: false,
            rx_tx_enabled: false,
            mac: None,
            pending_rx: None,
            tx_inflight: VecDeque::new(),
            stats: EngineStats::default(),
        })
    }

    fn build<A: AdminQueue>(
        config: &NixConfig,
        caps: &AfCapabilities,
        scope: &mut dma_pool::ArenaScope<'_>,
        admin: &mut A,
        io: &R,
    ) -> Result<(PoolSet, QueueSet)> {
        let pools = PoolSet::create(config, caps, scope, admin, io)?;
        let queues = QueueSet::create(config, caps, scope, admin)?;
        Ok((pools, queues))
    }

    /// Bring the link up and start packet flow.
    pub fn start(&mut self) -> Result<LinkStatus> {
        let raw = if self.link_initialized {
            let raw = self.link.link_status()?;
            self.link.set_rx_tx_enable(true)?;
            raw
        } else {
            self.link.link_enable()?
        };
        self.link_initialized = true;
        self.rx_tx_enabled = true;

        let status = LinkStatus::decode(raw);
        if !status.up {
            log::warn!("nix: link down: {}", status);
            return Err(NixError::LinkDown);
        }
        log::info!("nix: link {}", status);
        self.state = EngineState::Running;
        Ok(status)
    }

    /// Current link status.
    pub fn link_status(&mut self) -> Result<LinkStatus> {
        self.link.link_status().map(LinkStatus::decode)
    }

    /// Program the MAC filter if `mac` differs from the current address.
    pub fn set_mac_address(&mut self, mac: MacAddress) -> Result<()> {
        if self.mac == Some(mac) {
            return Ok(());
        }
        self.link.set_mac_filter(&mac)?;
        self.mac = Some(mac);
        log::info!("nix: mac {}", MacDisplay(&mac));
        Ok(())
    }

    pub fn mac_address(&self) -> Option<MacAddress> {
        self.mac
    }

    /// Largest payload `transmit` accepts.
    pub fn max_tx_len(&self) -> usize {
        self.config
            .max_mtu
            .min(self.pools.get(PoolClass::Tx).spec().buffer_size)
            .min(u16::MAX as usize)
    }

    /// Queue one frame for transmission.
    ///
    /// # Returns
    /// - `Ok(())`: Descriptor submitted (fire-and-forget)
    /// - `Err(NoBuffers)`: TX aura empty, retry after completions drain
    pub fn transmit(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(NixError::InvalidParameter);
        }
        if payload.len() > self.max_tx_len() {
            return Err(NixError::PayloadTooLarge);
        }
        if self.state != EngineState::Running {
            return Err(NixError::LinkDown);
        }

        self.flush_tx()?;

        let len = payload.len();
        let pool = self.pools.get_mut(PoolClass::Tx);
        let addr = match pool.allocate(&self.io)? {
            Some(addr) => addr,
            None => {
                log::debug!("nix: tx aura empty");
                return Err(NixError::NoBuffers);
            }
        };
        // Hardware may free a sent buffer before its completion is read.
        if let Some(slot) = self.tx_inflight.iter_mut().find(|s| **s == Some(addr)) {
            *slot = None;
        }
        match pool.buffer_mut(addr, len) {
            Ok(buf) => buf.copy_from_slice(payload),
            Err(err) => {
                pool.release(&self.io, addr)?;
                return Err(err);
            }
        }

        let desc = SendDescriptor {
            hdr: SendHeader {
                total: len as u32,
                df: false,
                aura: PoolClass::Tx.id(),
                sizem1: SEND_SIZEM1,
                pnc: true,
                sq: SQ_ID,
            },
            sg: SgDescriptor::single(len as u16),
            addr,
        };
        pool.mark_submitted(addr)?;

        let line = self.config.lmt_tx_line;
        self.io.lmt_store(line * LMT_LINE_SIZE, &desc.to_words());
        self.io.write_barrier();
        self.io
            .lmt_submit(NIX_BASE + nixx_lf_op_sendx(0) + SEND_LMT_SIZE, line as u64);

        self.tx_inflight.push_back(Some(addr));
        self.stats.tx_packets += 1;
        self.stats.tx_bytes += len as u64;
        log::debug!("nix: tx {} bytes from {:#x}", len, addr);
        Ok(())
    }

    /// Retire send completions posted so far.
    fn flush_tx(&mut self) -> Result<u32> {
        let pools = &mut self.pools;
        let inflight = &mut self.tx_inflight;
        let stats = &mut self.stats;
        self.queues.tx.drain(&self.io, |entry| {
            let hdr = CqeHeader::unpack(entry[0]);
            if hdr.cqe_type != CqeType::Send {
                log::warn!("nix: tx cq: unexpected cqe type {:?}", hdr.cqe_type);
                stats.unexpected_cqes += 1;
                return;
            }
            let comp = SendCompletion::unpack(entry[1]);
            if comp.status != 0 {
                log::warn!("nix: send error status {:#x}", comp.status);
                stats.tx_errors += 1;
            }
            match inflight.pop_front() {
                Some(Some(addr)) => {
                    if let Err(err) = pools.get_mut(PoolClass::Tx).mark_device_returned(addr) {
                        log::warn!("nix: tx buffer {:#x}: {}", addr, err);
                    }
                    stats.tx_completions += 1;
                }
                Some(None) => stats.tx_completions += 1,
                None => log::warn!("nix: send completion with nothing in flight"),
            }
        })
    }

    /// Peek at the next received packet.
    ///
    /// # Returns
    /// - `Ok(packet)`: Packet at the head of the RX ring; the same packet is
    ///   returned until it is freed
    /// - `Err(WouldBlock)`: Ring empty, nothing changed
    pub fn receive(&mut self) -> Result<RxPacket<'_>> {
        let pos = self.queues.rx.poll_status(&self.io)?;
        if pos.is_empty() {
            return Err(NixError::WouldBlock);
        }

        let cqe = RxCqe::from_words(&self.queues.rx.entry(pos.head));
        if cqe.hdr.cqe_type != CqeType::Rx {
            log::warn!("nix: rx cq: unexpected cqe type {:?}", cqe.hdr.cqe_type);
            return Err(NixError::ProtocolMismatch);
        }

        let len = cqe.packet_len();
        let (addr, seg_len) = cqe.first_segment();
        let class = PoolClass::for_rx_len(len, self.config.max_mtu);
        if len > seg_len || len > self.pools.get(class).spec().buffer_size {
            log::warn!("nix: rx length {} exceeds segment {}", len, seg_len);
            return Err(NixError::SegmentOverflow);
        }

        self.pools.get_mut(class).mark_received(addr)?;
        if self.pending_rx != Some(addr) {
            self.pending_rx = Some(addr);
            self.stats.rx_packets += 1;
            self.stats.rx_bytes += len as u64;
            log::debug!("nix: rx {} bytes at {:#x}", len, addr);
        }

        let data = self.pools.get(class).buffer(addr, len)?;
        Ok(RxPacket { data, addr, len })
    }

    /// Return a received buffer and consume its completion entry.
    ///
    /// A no-op when the RX ring is already empty (halt drained it).
    pub fn free_packet(&mut self, addr: u64, len: usize) -> Result<()> {
        let pos = self.queues.rx.poll_status(&self.io)?;
        if pos.is_empty() {
            log::debug!("nix: free_packet on empty ring");
            return Ok(());
        }

        let class = PoolClass::for_rx_len(len, self.config.max_mtu);
        self.pools.get_mut(class).release(&self.io, addr)?;
        self.queues.rx.advance(&self.io, 1);
        self.pending_rx = None;
        self.stats.rx_released += 1;

        self.flush_tx()?;
        Ok(())
    }

    /// Stop packet flow and reconcile outstanding buffers.
    ///
    /// Idempotent: a second call finds both rings empty.
    pub fn halt(&mut self) -> Result<()> {
        if self.rx_tx_enabled {
            self.link.set_rx_tx_enable(false)?;
            self.rx_tx_enabled = false;
            self.delay.delay_ms(self.config.settle_ms);
        }

        let max_mtu = self.config.max_mtu;
        let io = &self.io;
        let pools = &mut self.pools;
        let stats = &mut self.stats;
        let released = self.queues.rx.drain(io, |entry| {
            let cqe = RxCqe::from_words(entry);
            if cqe.hdr.cqe_type != CqeType::Rx {
                stats.unexpected_cqes += 1;
                return;
            }
            let (addr, _) = cqe.first_segment();
            let pool = pools.get_mut(PoolClass::for_rx_len(cqe.packet_len(), max_mtu));
            let result = match pool.mark_received(addr) {
                Ok(()) => pool.release(io, addr),
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => stats.rx_released += 1,
                Err(err) => log::warn!("nix: halt: rx buffer {:#x}: {}", addr, err),
            }
        })?;
        self.pending_rx = None;

        let completed = self.flush_tx()?;
        if self.state != EngineState::Halted {
            log::info!(
                "nix: halted, {} rx entries released, {} tx completions",
                released,
                completed
            );
        }
        self.state = EngineState::Halted;
        Ok(())
    }

    /// Halt, detach the contexts and return all memory to `arena`.
    pub fn shutdown<A: AdminQueue>(mut self, admin: &mut A, arena: &mut DmaArena) -> Result<()> {
        self.halt()?;
        admin.teardown()?;
        for block in self.pools.memory_blocks() {
            arena.free(block)?;
        }
        for block in self.queues.memory_blocks() {
            arena.free(block)?;
        }
        log::info!("nix: shut down");
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn config(&self) -> &NixConfig {
        &self.config
    }

    pub fn pools(&self) -> &PoolSet {
        &self.pools
    }

    /// TX buffers awaiting a send completion.
    pub fn tx_in_flight(&self) -> usize {
        self.tx_inflight.len()
    }
}
