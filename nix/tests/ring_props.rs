//! Completion ring arithmetic and drain behaviour

use dma_pool::{DmaArena, CACHE_LINE};
use octeon_nix::hw::wire::{CqContext, CqStatus, CqStatusFlags, CQE_SIZE, CQE_WORDS};
use octeon_nix::sim::SimNic;
use octeon_nix::{AdminQueue, CompletionRing, NixError, RingPosition, RingState};
use proptest::prelude::*;

const CQ: u32 = 0;

fn ring(arena: &mut DmaArena, nic: &SimNic, qsize: u8) -> CompletionRing {
    let entries = 16u32 << (2 * qsize);
    let mem = arena.alloc(entries as usize * CQE_SIZE, CACHE_LINE).unwrap();
    let mut admin = nic.clone();
    admin
        .init_cq(CQ, &CqContext { base: mem.bus_addr(), ena: true, qsize })
        .unwrap();
    CompletionRing::new(CQ, mem, entries).unwrap()
}

fn tagged(tag: u64) -> [u64; CQE_WORDS] {
    let mut words = [0u64; CQE_WORDS];
    words[0] = 8 << 60 | tag;
    words
}

proptest! {
    #[test]
    fn masked_positions_stay_in_range(
        size_log2 in 4u32..14,
        head in 0u32..0x10_0000,
        tail in 0u32..0x10_0000,
    ) {
        let size = 1u32 << size_log2;
        let status = CqStatus { head, tail, flags: CqStatusFlags::empty() };
        let pos = RingPosition::from_status(&status, size);
        prop_assert!(pos.head < size);
        prop_assert!(pos.tail < size);

        // A consumer stepping head to tail runs exactly `pending` times.
        let mut h = pos.head;
        let mut iterations = 0u32;
        while h != pos.tail {
            h = (h + 1) & (size - 1);
            iterations += 1;
        }
        prop_assert_eq!(iterations, pos.pending());
    }

    #[test]
    fn drain_consumes_what_was_posted(batches in prop::collection::vec(0usize..16, 1..12)) {
        let mut arena = DmaArena::with_capacity(64 * 1024).unwrap();
        let nic = SimNic::new();
        let mut ring = ring(&mut arena, &nic, 0);
        let mut next_tag = 0u64;
        let mut doors = 0u64;

        for batch in batches {
            let first = next_tag;
            for _ in 0..batch {
                prop_assert!(nic.inject_raw_cqe(CQ, tagged(next_tag)));
                next_tag += 1;
            }
            let mut seen = Vec::new();
            let drained = ring.drain(&nic, |e| seen.push(e[0] & 0xffff_ffff)).unwrap();
            doors += batch as u64;

            prop_assert_eq!(drained as usize, batch);
            prop_assert_eq!(seen, (first..next_tag).collect::<Vec<_>>());
            prop_assert_eq!(nic.cq_pending(CQ), 0);
            prop_assert_eq!(nic.doors(CQ), doors);
            prop_assert_eq!(ring.state(), RingState::Idle);
        }
        prop_assert_eq!(nic.door_overruns(), 0);
    }
}

#[test]
fn test_empty_drain_is_noop() {
    let mut arena = DmaArena::with_capacity(64 * 1024).unwrap();
    let nic = SimNic::new();
    let mut ring = ring(&mut arena, &nic, 0);
    let mut calls = 0;
    assert_eq!(ring.drain(&nic, |_| calls += 1), Ok(0));
    assert_eq!(calls, 0);
    assert_eq!(nic.doors(CQ), 0);
    assert_eq!(ring.state(), RingState::Idle);
}

#[test]
fn test_poll_arms_ring() {
    let mut arena = DmaArena::with_capacity(64 * 1024).unwrap();
    let nic = SimNic::new();
    let mut ring = ring(&mut arena, &nic, 0);
    nic.inject_raw_cqe(CQ, tagged(1));

    let pos = ring.poll_status(&nic).unwrap();
    assert_eq!(pos.pending(), 1);
    assert_eq!(ring.state(), RingState::Armed);
    assert_eq!(ring.entry(pos.head)[0], tagged(1)[0]);

    ring.advance(&nic, 1);
    assert_eq!(ring.poll_status(&nic).unwrap().pending(), 0);
    assert_eq!(ring.state(), RingState::Idle);
}

#[test]
fn test_status_error_bits() {
    let mut arena = DmaArena::with_capacity(64 * 1024).unwrap();
    let nic = SimNic::new();
    let mut ring = ring(&mut arena, &nic, 0);

    nic.set_cq_error(CQ, CqStatusFlags::CQ_ERR);
    assert_eq!(ring.poll_status(&nic), Err(NixError::DeviceError));
    nic.set_cq_error(CQ, CqStatusFlags::OP_ERR);
    assert_eq!(ring.drain(&nic, |_| {}), Err(NixError::DeviceError));
}

#[test]
fn test_ring_full_sets_error() {
    let mut arena = DmaArena::with_capacity(64 * 1024).unwrap();
    let nic = SimNic::new();
    let mut ring = ring(&mut arena, &nic, 0);
    for tag in 0..15 {
        assert!(nic.inject_raw_cqe(CQ, tagged(tag)));
    }
    assert!(!nic.inject_raw_cqe(CQ, tagged(15)));
    assert_eq!(ring.poll_status(&nic), Err(NixError::DeviceError));
}
