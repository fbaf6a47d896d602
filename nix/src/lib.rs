//! OcteonTX2/CN10K NIX packet engine for boot firmware.
//!
//! Drives one NIX local function with its NPA buffer pools: enough to move
//! Ethernet frames for network boot, nothing more.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ NixEngine  transmit / receive / free /   │
//! │            halt / start / shutdown       │
//! ├────────────────────┬─────────────────────┤
//! │ PoolSet            │ QueueSet            │
//! │  BufferPool x4     │  CompletionRing x2  │
//! │  OwnershipLedger   │  RQ / SQ contexts   │
//! ├────────────────────┴─────────────────────┤
//! │ hw: regs, wire, chip   │ admin │ link     │
//! ├──────────────────────────────────────────┤
//! │ RegisterIo (Mmio | SimNic)               │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut arena = DmaArena::with_capacity(4 << 20)?;
//! let mut engine = NixEngine::setup(NixConfig::default(), &mut arena, &mut mbox, io, link, delay)?;
//! engine.start()?;
//! engine.transmit(&frame)?;
//! if let Ok(pkt) = engine.receive() {
//!     let (addr, len) = (pkt.addr, pkt.len);
//!     handle(pkt.data);
//!     engine.free_packet(addr, len)?;
//! }
//! engine.halt()?;
//! ```

#![no_std]

extern crate alloc;

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod hw;
pub mod link;
pub mod pool;
pub mod queue;

#[cfg(feature = "sim")]
pub mod sim;

pub use admin::{AdminQueue, AfCapabilities, NixLfLayout};
pub use config::NixConfig;
pub use engine::{EngineState, EngineStats, NixEngine, RxPacket};
pub use error::{NixError, Result};
pub use hw::chip::{ChipInfo, ChipVariant, PlatformRegisters, RstBoot};
pub use hw::{Delay, Mmio, RegisterIo};
pub use link::{LinkLayer, LinkStatus, MacAddress};
pub use pool::{BufferOwnership, BufferPool, PoolClass, PoolSet, PoolSpec};
pub use queue::{CompletionRing, QueueSet, RingPosition, RingState};
