//! Link-layer collaborator.
//!
//! The MAC/PHY (RPM/CGX) is owned by the secure firmware; the engine only
//! asks it to enable the LMAC, report status, gate RX/TX and program the
//! DMAC filter.

use core::fmt;

use crate::error::Result;
use crate::hw::regs::Field;

/// MAC address type.
pub type MacAddress = [u8; 6];

/// Operations the engine needs from the link owner.
pub trait LinkLayer {
    /// Bring the LMAC up; returns the raw status word.
    fn link_enable(&mut self) -> Result<u64>;

    /// Query the raw status word without changing state.
    fn link_status(&mut self) -> Result<u64>;

    /// Gate packet flow in both directions.
    fn set_rx_tx_enable(&mut self, enable: bool) -> Result<()>;

    /// Program the unicast DMAC filter.
    fn set_mac_filter(&mut self, mac: &MacAddress) -> Result<()>;
}

const LMAC_TYPE_NAMES: [&str; 11] = [
    "SGMII", "XAUI", "RXAUI", "10G_R", "40G_R", "RGMII", "QSGMII", "25G_R", "50G_R", "100G_R",
    "USXGMII",
];

const SPEED_NAMES: [&str; 13] = [
    "0", "10M", "100M", "1G", "2.5G", "5G", "10G", "20G", "25G", "40G", "50G", "80G", "100G",
];

/// Decoded link status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub up: bool,
    /// Index into the speed table.
    pub speed: u8,
    pub errcode: u16,
    pub lmac_type: u8,
}

impl LinkStatus {
    const LINK: Field = Field::bit(0);
    const SPEED: Field = Field::bits(5, 2);
    const ERRCODE: Field = Field::bits(14, 6);
    const ERRCODE_MASK: u64 = 0x2ff;
    const LMAC_TYPE: Field = Field::bits(26, 19);

    pub const fn decode(raw: u64) -> Self {
        Self {
            up: Self::LINK.get(raw) != 0,
            speed: Self::SPEED.get(raw) as u8,
            errcode: (Self::ERRCODE.get(raw) & Self::ERRCODE_MASK) as u16,
            lmac_type: Self::LMAC_TYPE.get(raw) as u8,
        }
    }

    pub const fn encode(&self) -> u64 {
        let w = Self::LINK.set(0, self.up as u64);
        let w = Self::SPEED.set(w, self.speed as u64);
        let w = Self::ERRCODE.set(w, self.errcode as u64);
        Self::LMAC_TYPE.set(w, self.lmac_type as u64)
    }

    pub fn speed_str(&self) -> &'static str {
        SPEED_NAMES.get(self.speed as usize).copied().unwrap_or("?")
    }

    pub fn type_str(&self) -> &'static str {
        LMAC_TYPE_NAMES
            .get(self.lmac_type as usize)
            .copied()
            .unwrap_or("?")
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.up {
            write!(f, "{} [{}]", self.type_str(), self.speed_str())
        } else {
            write!(f, "{} [Down, err {:#x}]", self.type_str(), self.errcode)
        }
    }
}

/// `xx:xx:xx:xx:xx:xx` formatting for log lines.
pub struct MacDisplay<'a>(pub &'a MacAddress);

impl fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_decode_status_word() {
        // link up, speed 6 (10G), errcode 0, type 3 (10G_R)
        let raw = 1 | 6 << 2 | 3 << 19;
        let status = LinkStatus::decode(raw);
        assert!(status.up);
        assert_eq!(status.speed_str(), "10G");
        assert_eq!(status.type_str(), "10G_R");
        assert_eq!(status.encode(), raw);
        assert_eq!(status.to_string(), "10G_R [10G]");
    }

    #[test]
    fn test_errcode_mask() {
        let raw = 0x1ffu64 << 6;
        assert_eq!(LinkStatus::decode(raw).errcode, 0xff);
        assert!(!LinkStatus::decode(raw).up);
    }

    #[test]
    fn test_unknown_codes() {
        let status = LinkStatus::decode(15 << 2 | 40 << 19);
        assert_eq!(status.speed_str(), "?");
        assert_eq!(status.type_str(), "?");
    }

    #[test]
    fn test_mac_display() {
        let mac = [0x02, 0x00, 0x5e, 0x10, 0x00, 0x01];
        assert_eq!(MacDisplay(&mac).to_string(), "02:00:5e:10:00:01");
    }
}
