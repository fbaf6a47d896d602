//! NPA/NIX local-function register offsets.
//!
//! Offsets are relative to the RVU PF BAR. Each block occupies a 1 MiB
//! window selected by its block id.

/// Base offset of an RVU block window.
#[inline]
pub const fn block_base(block: u64) -> u64 {
    block << 20
}

/// NPA block id.
pub const BLOCK_NPA: u64 = 3;
/// NIX0 block id.
pub const BLOCK_NIX0: u64 = 4;

pub const NPA_BASE: u64 = block_base(BLOCK_NPA);
pub const NIX_BASE: u64 = block_base(BLOCK_NIX0);

/// Aura allocate operation (atomic fetch-and-add, operand = aura id).
#[inline]
pub const fn npa_lf_aura_op_allocx(a: u64) -> u64 {
    0x10 + 8 * a
}

/// LMT batch-free submission target.
pub const NPA_LF_AURA_BATCH_FREE0: u64 = 0x400;

/// Send operation target.
#[inline]
pub const fn nixx_lf_op_sendx(a: u64) -> u64 {
    0x800 + 8 * a
}

/// Completion queue doorbell.
pub const NIXX_LF_CQ_OP_DOOR: u64 = 0xb30;

/// Completion queue status (atomic fetch-and-add, operand = cq << 32).
pub const NIXX_LF_CQ_OP_STATUS: u64 = 0xb40;

/// Size of one LMT line.
pub const LMT_LINE_SIZE: usize = 0x80;

/// Bit field inside a 64-bit register or descriptor word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub shift: u32,
    pub width: u32,
}

impl Field {
    /// Field covering bits [hi:lo].
    pub const fn bits(hi: u32, lo: u32) -> Self {
        Self {
            shift: lo,
            width: hi - lo + 1,
        }
    }

    /// Single-bit field.
    pub const fn bit(pos: u32) -> Self {
        Self { shift: pos, width: 1 }
    }

    #[inline]
    pub const fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Extract the field from `word`.
    #[inline]
    pub const fn get(&self, word: u64) -> u64 {
        (word >> self.shift) & self.mask()
    }

    /// Return `word` with the field replaced by `value` (truncated to width).
    #[inline]
    pub const fn set(&self, word: u64, value: u64) -> u64 {
        (word & !(self.mask() << self.shift)) | ((value & self.mask()) << self.shift)
    }

    /// Check that `value` fits without truncation.
    #[inline]
    pub const fn fits(&self, value: u64) -> bool {
        value & !self.mask() == 0
    }
}
