//! Engine configuration.

use dma_pool::CACHE_LINE;

use crate::error::{NixError, Result};

/// Largest frame the RX small pool and TX path accept.
pub const MAX_MTU: usize = 1518;

/// Largest frame the hardware can receive (RX large pool).
pub const NIX_MAX_HW_MTU: usize = 9212;

/// RX small pool depth.
pub const RQ_QLEN: u32 = 1024;
/// TX pool depth.
pub const SQ_QLEN: u32 = 1024;
/// Send-queue buffer pool depth.
pub const SQB_QLEN: u32 = 16;
/// RX large pool depth.
pub const RQ_LPB_QLEN: u32 = 64;

/// Entries per completion queue.
pub const CQ_ENTRIES: u32 = 1024;

/// LMT line used for send descriptors.
pub const LMT_TX_LINE: usize = 0x10;

/// Settle interval after disabling RX/TX.
pub const SETTLE_MS: u32 = 1;

/// NIX engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NixConfig {
    /// Largest TX payload and RX small-pool frame.
    pub max_mtu: usize,
    /// Largest frame for the RX large pool.
    pub hw_max_mtu: usize,
    /// Buffer stride granule.
    pub cache_line: usize,
    /// RX small pool depth (power of two).
    pub rx_qlen: u32,
    /// TX pool depth (power of two).
    pub tx_qlen: u32,
    /// SQB pool depth (power of two).
    pub sqb_qlen: u32,
    /// RX large pool depth (power of two).
    pub rx_large_qlen: u32,
    /// Completion queue entries (16 * 4^n).
    pub cq_entries: u32,
    /// Delay after RX/TX disable, in ms.
    pub settle_ms: u32,
    /// LMT line for send descriptors.
    pub lmt_tx_line: usize,
}

impl Default for NixConfig {
    fn default() -> Self {
        Self {
            max_mtu: MAX_MTU,
            hw_max_mtu: NIX_MAX_HW_MTU,
            cache_line: CACHE_LINE,
            rx_qlen: RQ_QLEN,
            tx_qlen: SQ_QLEN,
            sqb_qlen: SQB_QLEN,
            rx_large_qlen: RQ_LPB_QLEN,
            cq_entries: CQ_ENTRIES,
            settle_ms: SETTLE_MS,
            lmt_tx_line: LMT_TX_LINE,
        }
    }
}

impl NixConfig {
    /// Create config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override per-class pool depths.
    pub fn with_queue_lengths(mut self, rx: u32, tx: u32, sqb: u32, rx_large: u32) -> Self {
        self.rx_qlen = rx;
        self.tx_qlen = tx;
        self.sqb_qlen = sqb;
        self.rx_large_qlen = rx_large;
        self
    }

    /// Override completion queue size.
    pub fn with_cq_entries(mut self, entries: u32) -> Self {
        self.cq_entries = entries;
        self
    }

    /// Override MTU limits.
    pub fn with_mtu(mut self, max_mtu: usize, hw_max_mtu: usize) -> Self {
        self.max_mtu = max_mtu;
        self.hw_max_mtu = hw_max_mtu;
        self
    }

    /// Override the settle delay.
    pub fn with_settle_ms(mut self, ms: u32) -> Self {
        self.settle_ms = ms;
        self
    }

    /// Small-pool buffer size: one frame plus a cache line of headroom.
    pub fn rx_buffer_size(&self) -> usize {
        self.max_mtu + self.cache_line
    }

    /// Large-pool buffer size.
    pub fn rx_large_buffer_size(&self) -> usize {
        self.hw_max_mtu + self.cache_line
    }

    /// Hardware size code for the completion queues.
    ///
    /// Entries = 16 << (2 * code).
    pub fn cq_size_code(&self) -> Option<u8> {
        if !self.cq_entries.is_power_of_two() || self.cq_entries < 16 {
            return None;
        }
        let bits = self.cq_entries.trailing_zeros() - 4;
        if bits % 2 != 0 {
            return None;
        }
        Some((bits / 2) as u8)
    }

    /// Check the configuration for values the hardware cannot express.
    pub fn validate(&self) -> Result<()> {
        let qlens = [self.rx_qlen, self.tx_qlen, self.sqb_qlen, self.rx_large_qlen];
        if qlens.iter().any(|q| !q.is_power_of_two()) {
            return Err(NixError::InvalidParameter);
        }
        if self.cq_size_code().is_none() {
            return Err(NixError::InvalidParameter);
        }
        if !self.cache_line.is_power_of_two() || self.cache_line > dma_pool::PAGE_SIZE {
            return Err(NixError::InvalidParameter);
        }
        if self.max_mtu == 0
            || self.max_mtu > self.hw_max_mtu
            || self.hw_max_mtu > u16::MAX as usize
        {
            return Err(NixError::InvalidParameter);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = NixConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rx_buffer_size(), 1518 + 128);
        assert_eq!(config.cq_size_code(), Some(3));
    }

    #[test]
    fn test_cq_size_code() {
        assert_eq!(NixConfig::new().with_cq_entries(16).cq_size_code(), Some(0));
        assert_eq!(NixConfig::new().with_cq_entries(64).cq_size_code(), Some(1));
        assert_eq!(NixConfig::new().with_cq_entries(32).cq_size_code(), None);
        assert_eq!(NixConfig::new().with_cq_entries(100).cq_size_code(), None);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_q = NixConfig::new().with_queue_lengths(1000, 1024, 16, 64);
        assert_eq!(bad_q.validate(), Err(NixError::InvalidParameter));

        let bad_mtu = NixConfig::new().with_mtu(9000, 1518);
        assert_eq!(bad_mtu.validate(), Err(NixError::InvalidParameter));
    }
}
