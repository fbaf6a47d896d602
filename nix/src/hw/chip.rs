//! Chip variant detection and per-variant register layouts.
//!
//! The boot-status register `RST_BOOT` moved fields around between SoC
//! generations. Code reads it through one accessor, [`RstBoot`], whose
//! field positions come from the [`ChipVariant`] detected once at start-up.

use core::fmt;

use super::regs::Field;

/// Platform-level registers outside the NIX/NPA BAR.
pub trait PlatformRegisters {
    /// Main ID register (`MIDR_EL1`).
    fn midr(&self) -> u64;
    /// Raw `RST_BOOT` value.
    fn rst_boot(&self) -> u64;
}

/// SoC family, decoded from the MIDR part number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVariant {
    Cn98xx,
    Cn96xx,
    Cnf95xx,
    Generic,
}

impl ChipVariant {
    const PART_NUM: Field = Field::bits(15, 4);

    pub const fn from_midr(midr: u64) -> Self {
        match Self::PART_NUM.get(midr) {
            0xB1 => Self::Cn98xx,
            0xB2 => Self::Cn96xx,
            0xB3 => Self::Cnf95xx,
            _ => Self::Generic,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cn98xx => "CN98XX",
            Self::Cn96xx => "CN96XX",
            Self::Cnf95xx => "CNF95XX",
            Self::Generic => "generic",
        }
    }

    /// Field positions of `RST_BOOT` on this variant.
    pub const fn rst_boot_layout(&self) -> &'static RstBootLayout {
        match self {
            Self::Cn98xx => &CN98XX_LAYOUT,
            Self::Cn96xx => &CN96XX_LAYOUT,
            Self::Cnf95xx => &CNF95XX_LAYOUT,
            Self::Generic => &GENERIC_LAYOUT,
        }
    }
}

impl fmt::Display for ChipVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RST_BOOT LAYOUTS
// ═══════════════════════════════════════════════════════════════════════════

/// Where each `RST_BOOT` field lives; `None` when the variant lacks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstBootLayout {
    pub rboot_pin: Option<Field>,
    pub rboot: Option<Field>,
    pub rxp_mul: Option<Field>,
    pub bphy_mul: Option<Field>,
    pub dsp_mul: Option<Field>,
    pub cpt1_mul: Option<Field>,
    pub cpt_mul: Option<Field>,
    pub pnr_mul: Option<Field>,
    pub c_mul: Option<Field>,
    pub gpio_ejtag: Option<Field>,
    pub mcp_jtagdis: Option<Field>,
    pub dis_scan: Option<Field>,
    pub dis_huk: Option<Field>,
    pub vrm_err: Option<Field>,
    pub jt_tstmode: Option<Field>,
    pub ckill_ppdis: Option<Field>,
    pub trusted_mode: Option<Field>,
    pub scp_jtagdis: Option<Field>,
    pub jtagdis: Option<Field>,
    pub chipkill: Option<Field>,
}

const GENERIC_LAYOUT: RstBootLayout = RstBootLayout {
    rboot_pin: Some(Field::bit(0)),
    rboot: Some(Field::bit(1)),
    rxp_mul: None,
    bphy_mul: None,
    dsp_mul: None,
    cpt1_mul: None,
    cpt_mul: None,
    pnr_mul: Some(Field::bits(38, 33)),
    c_mul: Some(Field::bits(46, 40)),
    gpio_ejtag: Some(Field::bit(53)),
    mcp_jtagdis: Some(Field::bit(54)),
    dis_scan: Some(Field::bit(55)),
    dis_huk: Some(Field::bit(56)),
    vrm_err: Some(Field::bit(57)),
    jt_tstmode: Some(Field::bit(58)),
    ckill_ppdis: Some(Field::bit(59)),
    trusted_mode: Some(Field::bit(60)),
    scp_jtagdis: None,
    jtagdis: None,
    chipkill: Some(Field::bit(63)),
};

const CN96XX_LAYOUT: RstBootLayout = RstBootLayout {
    cpt_mul: Some(Field::bits(30, 24)),
    scp_jtagdis: Some(Field::bit(61)),
    jtagdis: Some(Field::bit(62)),
    ..GENERIC_LAYOUT
};

const CN98XX_LAYOUT: RstBootLayout = RstBootLayout {
    rxp_mul: Some(Field::bits(14, 8)),
    cpt1_mul: Some(Field::bits(22, 16)),
    ..CN96XX_LAYOUT
};

const CNF95XX_LAYOUT: RstBootLayout = RstBootLayout {
    bphy_mul: Some(Field::bits(14, 8)),
    dsp_mul: Some(Field::bits(22, 16)),
    ..CN96XX_LAYOUT
};

/// `RST_BOOT` value decoded with a variant layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstBoot {
    raw: u64,
    layout: &'static RstBootLayout,
}

impl RstBoot {
    pub fn new(raw: u64, variant: ChipVariant) -> Self {
        Self {
            raw,
            layout: variant.rst_boot_layout(),
        }
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    fn field(&self, field: Option<Field>) -> Option<u64> {
        field.map(|f| f.get(self.raw))
    }

    fn flag(&self, field: Option<Field>) -> bool {
        self.field(field).map_or(false, |v| v != 0)
    }

    pub fn rboot_pin(&self) -> bool {
        self.flag(self.layout.rboot_pin)
    }

    pub fn rboot(&self) -> bool {
        self.flag(self.layout.rboot)
    }

    /// Coprocessor-clock multiplier.
    pub fn pnr_mul(&self) -> Option<u64> {
        self.field(self.layout.pnr_mul)
    }

    /// Core-clock multiplier.
    pub fn c_mul(&self) -> Option<u64> {
        self.field(self.layout.c_mul)
    }

    pub fn cpt_mul(&self) -> Option<u64> {
        self.field(self.layout.cpt_mul)
    }

    pub fn cpt1_mul(&self) -> Option<u64> {
        self.field(self.layout.cpt1_mul)
    }

    pub fn rxp_mul(&self) -> Option<u64> {
        self.field(self.layout.rxp_mul)
    }

    pub fn bphy_mul(&self) -> Option<u64> {
        self.field(self.layout.bphy_mul)
    }

    pub fn dsp_mul(&self) -> Option<u64> {
        self.field(self.layout.dsp_mul)
    }

    pub fn gpio_ejtag(&self) -> bool {
        self.flag(self.layout.gpio_ejtag)
    }

    pub fn mcp_jtagdis(&self) -> bool {
        self.flag(self.layout.mcp_jtagdis)
    }

    pub fn dis_scan(&self) -> bool {
        self.flag(self.layout.dis_scan)
    }

    pub fn dis_huk(&self) -> bool {
        self.flag(self.layout.dis_huk)
    }

    pub fn vrm_err(&self) -> bool {
        self.flag(self.layout.vrm_err)
    }

    pub fn jt_tstmode(&self) -> bool {
        self.flag(self.layout.jt_tstmode)
    }

    pub fn ckill_ppdis(&self) -> bool {
        self.flag(self.layout.ckill_ppdis)
    }

    /// Trusted boot: firmware was authenticated by the boot ROM.
    pub fn trusted_mode(&self) -> bool {
        self.flag(self.layout.trusted_mode)
    }

    pub fn scp_jtagdis(&self) -> bool {
        self.flag(self.layout.scp_jtagdis)
    }

    pub fn jtagdis(&self) -> bool {
        self.flag(self.layout.jtagdis)
    }

    pub fn chipkill(&self) -> bool {
        self.flag(self.layout.chipkill)
    }
}

/// Chip identity and boot status, probed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    pub variant: ChipVariant,
    pub rst_boot: RstBoot,
}

impl ChipInfo {
    pub fn probe<P: PlatformRegisters>(platform: &P) -> Self {
        let variant = ChipVariant::from_midr(platform.midr());
        let rst_boot = RstBoot::new(platform.rst_boot(), variant);
        log::info!(
            "chip: {} trusted={} c_mul={:?}",
            variant,
            rst_boot.trusted_mode(),
            rst_boot.c_mul()
        );
        Self { variant, rst_boot }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn midr(part: u64) -> u64 {
        0x43 << 24 | part << 4
    }

    #[test]
    fn test_variant_from_midr() {
        assert_eq!(ChipVariant::from_midr(midr(0xB1)), ChipVariant::Cn98xx);
        assert_eq!(ChipVariant::from_midr(midr(0xB2)), ChipVariant::Cn96xx);
        assert_eq!(ChipVariant::from_midr(midr(0xB3)), ChipVariant::Cnf95xx);
        assert_eq!(ChipVariant::from_midr(midr(0xB4)), ChipVariant::Generic);
    }

    #[test]
    fn test_same_bits_decode_per_variant() {
        let raw = 0x55u64 << 8 | 0x2a << 24 | 1 << 61;

        let cn98 = RstBoot::new(raw, ChipVariant::Cn98xx);
        assert_eq!(cn98.rxp_mul(), Some(0x55));
        assert_eq!(cn98.bphy_mul(), None);
        assert_eq!(cn98.cpt_mul(), Some(0x2a));
        assert!(cn98.scp_jtagdis());

        let cnf95 = RstBoot::new(raw, ChipVariant::Cnf95xx);
        assert_eq!(cnf95.bphy_mul(), Some(0x55));
        assert_eq!(cnf95.rxp_mul(), None);

        let generic = RstBoot::new(raw, ChipVariant::Generic);
        assert_eq!(generic.cpt_mul(), None);
        assert!(!generic.scp_jtagdis());
    }

    #[test]
    fn test_common_fields() {
        let raw = 1 | 0x20u64 << 33 | 0x30 << 40 | 1 << 60 | 1 << 63;
        let boot = RstBoot::new(raw, ChipVariant::Cn96xx);
        assert!(boot.rboot_pin());
        assert!(!boot.rboot());
        assert_eq!(boot.pnr_mul(), Some(0x20));
        assert_eq!(boot.c_mul(), Some(0x30));
        assert!(boot.trusted_mode());
        assert!(boot.chipkill());
    }
}
