//! Common test rigs on top of the simulated NIC

#![allow(dead_code)]

use dma_pool::DmaArena;
use octeon_nix::sim::SimNic;
use octeon_nix::{NixConfig, NixEngine, NixError};

pub type SimEngine = NixEngine<SimNic, SimNic, SimNic>;

/// Arena large enough for `small_config` with room to spare.
pub const ARENA_SIZE: usize = 1 << 20;

/// Shallow pools and rings so tests can exhaust them quickly.
pub fn small_config() -> NixConfig {
    NixConfig::new()
        .with_queue_lengths(16, 8, 4, 4)
        .with_cq_entries(64)
}

/// Engine plus the arena it lives in and a handle to the device model.
pub struct Rig {
    pub arena: DmaArena,
    pub nic: SimNic,
    pub admin: SimNic,
    pub engine: SimEngine,
}

impl Rig {
    pub fn new(config: NixConfig) -> Self {
        let mut arena = DmaArena::with_capacity(ARENA_SIZE).expect("arena");
        let nic = SimNic::new();
        let mut admin = nic.clone();
        let engine = NixEngine::setup(
            config,
            &mut arena,
            &mut admin,
            nic.clone(),
            nic.clone(),
            nic.clone(),
        )
        .expect("setup");
        Self {
            arena,
            nic,
            admin,
            engine,
        }
    }

    /// Set up and bring the link up.
    pub fn started() -> Self {
        let mut rig = Self::new(small_config());
        rig.engine.start().expect("link up");
        rig
    }
}

/// Build a test frame: broadcast header plus a counting payload.
pub fn frame(len: usize) -> Vec<u8> {
    let mut f = vec![0u8; len];
    for (i, b) in f.iter_mut().enumerate() {
        *b = if i < 6 { 0xff } else { (i % 251) as u8 };
    }
    f
}

/// Receive, copy and free one packet.
pub fn receive_one(engine: &mut SimEngine) -> Result<Vec<u8>, NixError> {
    let (data, addr, len) = {
        let pkt = engine.receive()?;
        (pkt.data.to_vec(), pkt.addr, pkt.len)
    };
    engine.free_packet(addr, len)?;
    Ok(data)
}
