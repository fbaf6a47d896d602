//! Hardware wire structures.
//!
//! Every structure the NPA/NIX blocks read or write is packed and unpacked
//! explicitly on `u64` words; nothing relies on compiler bitfield layout.
//!
//! # Send descriptor (4 words, one LMT line)
//! ```text
//! W0  NIX_SEND_HDR_S   total[17:0] df[19] aura[39:20] sizem1[42:40] pnc[43] sq[63:44]
//! W1  NIX_SEND_HDR_S   0
//! W2  NIX_SEND_SG_S    seg1[15:0] seg2[31:16] seg3[47:32] segs[49:48] ld_type[59:58] subdc[63:60]
//! W3  segment address
//! ```
//!
//! # Completion entry (W16, 128 bytes)
//! ```text
//! W0      NIX_CQE_HDR_S    tag[31:0] q[51:32] cqe_type[63:60]
//! W1..W7  NIX_RX_PARSE_S   w0: chan[11:0] desc_sizem1[16:12] errlev[23:20] errcode[31:24] pkind[63:58]
//!                          w1: pkt_lenm1[15:0]
//! W8      NIX_RX_SG_S      (SG layout above)
//! W9..W11 segment addresses
//! ```
//! Send completions carry `NIX_SEND_COMP_S` in W1: status[7:0] sqe_id[23:8].

use bitflags::bitflags;

use super::regs::Field;

/// Words per completion entry.
pub const CQE_WORDS: usize = 16;
/// Bytes per completion entry.
pub const CQE_SIZE: usize = CQE_WORDS * 8;
/// Words per hardware context image.
pub const CTX_WORDS: usize = 16;
/// Bytes per hardware context image.
pub const CTX_SIZE: usize = CTX_WORDS * 8;
/// Words in a send descriptor.
pub const SEND_DESC_WORDS: usize = 4;

/// SG subdescriptor code.
pub const NIX_SUBDC_SG: u8 = 4;
/// Load type: LDT (cache-allocating) for segment reads.
pub const NIX_SENDLDTYPE_LDT: u8 = 1;

// ═══════════════════════════════════════════════════════════════════════════
// NPA FREE DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════

/// One pointer returned to a pool through the batch-free path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeDescriptor {
    pub pool_id: u32,
    pub addr: u64,
}

impl FreeDescriptor {
    pub const fn pack(&self) -> [u64; 2] {
        [self.pool_id as u64 | 1 << 32, self.addr]
    }

    /// Returns the descriptor and the pointer count it announces.
    pub const fn unpack(words: &[u64; 2]) -> (Self, u32) {
        (
            Self {
                pool_id: words[0] as u32,
                addr: words[1],
            },
            (words[0] >> 32) as u32,
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SEND DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════

/// `NIX_SEND_HDR_S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendHeader {
    /// Total packet length.
    pub total: u32,
    /// Don't free: hardware must not return the buffer to `aura`.
    pub df: bool,
    /// Aura the buffer is freed to after transmission.
    pub aura: u32,
    /// Descriptor size in 16-byte units, minus one (header excluded).
    pub sizem1: u8,
    /// Post a completion entry.
    pub pnc: bool,
    /// Send queue.
    pub sq: u32,
}

impl SendHeader {
    const TOTAL: Field = Field::bits(17, 0);
    const DF: Field = Field::bit(19);
    const AURA: Field = Field::bits(39, 20);
    const SIZEM1: Field = Field::bits(42, 40);
    const PNC: Field = Field::bit(43);
    const SQ: Field = Field::bits(63, 44);

    pub const fn pack(&self) -> [u64; 2] {
        let mut w0 = Self::TOTAL.set(0, self.total as u64);
        w0 = Self::DF.set(w0, self.df as u64);
        w0 = Self::AURA.set(w0, self.aura as u64);
        w0 = Self::SIZEM1.set(w0, self.sizem1 as u64);
        w0 = Self::PNC.set(w0, self.pnc as u64);
        w0 = Self::SQ.set(w0, self.sq as u64);
        [w0, 0]
    }

    pub const fn unpack(words: &[u64; 2]) -> Self {
        let w0 = words[0];
        Self {
            total: Self::TOTAL.get(w0) as u32,
            df: Self::DF.get(w0) != 0,
            aura: Self::AURA.get(w0) as u32,
            sizem1: Self::SIZEM1.get(w0) as u8,
            pnc: Self::PNC.get(w0) != 0,
            sq: Self::SQ.get(w0) as u32,
        }
    }
}

/// `NIX_SEND_SG_S` / `NIX_RX_SG_S` header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SgDescriptor {
    pub seg_sizes: [u16; 3],
    pub segs: u8,
    pub ld_type: u8,
    pub subdc: u8,
}

impl SgDescriptor {
    const SEG1: Field = Field::bits(15, 0);
    const SEG2: Field = Field::bits(31, 16);
    const SEG3: Field = Field::bits(47, 32);
    const SEGS: Field = Field::bits(49, 48);
    const LD_TYPE: Field = Field::bits(59, 58);
    const SUBDC: Field = Field::bits(63, 60);

    /// Single-segment SG header.
    pub const fn single(len: u16) -> Self {
        Self {
            seg_sizes: [len, 0, 0],
            segs: 1,
            ld_type: NIX_SENDLDTYPE_LDT,
            subdc: NIX_SUBDC_SG,
        }
    }

    pub const fn pack(&self) -> u64 {
        let mut w = Self::SEG1.set(0, self.seg_sizes[0] as u64);
        w = Self::SEG2.set(w, self.seg_sizes[1] as u64);
        w = Self::SEG3.set(w, self.seg_sizes[2] as u64);
        w = Self::SEGS.set(w, self.segs as u64);
        w = Self::LD_TYPE.set(w, self.ld_type as u64);
        Self::SUBDC.set(w, self.subdc as u64)
    }

    pub const fn unpack(w: u64) -> Self {
        Self {
            seg_sizes: [
                Self::SEG1.get(w) as u16,
                Self::SEG2.get(w) as u16,
                Self::SEG3.get(w) as u16,
            ],
            segs: Self::SEGS.get(w) as u8,
            ld_type: Self::LD_TYPE.get(w) as u8,
            subdc: Self::SUBDC.get(w) as u8,
        }
    }
}

/// Complete single-segment send descriptor as written to the LMT line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendDescriptor {
    pub hdr: SendHeader,
    pub sg: SgDescriptor,
    pub addr: u64,
}

impl SendDescriptor {
    pub const fn to_words(&self) -> [u64; SEND_DESC_WORDS] {
        let hdr = self.hdr.pack();
        [hdr[0], hdr[1], self.sg.pack(), self.addr]
    }

    pub fn from_words(words: &[u64]) -> Option<Self> {
        if words.len() < SEND_DESC_WORDS {
            return None;
        }
        Some(Self {
            hdr: SendHeader::unpack(&[words[0], words[1]]),
            sg: SgDescriptor::unpack(words[2]),
            addr: words[3],
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPLETION ENTRIES
// ═══════════════════════════════════════════════════════════════════════════

/// `NIX_XQE_TYPE_E`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqeType {
    Rx,
    Send,
    Other(u8),
}

impl CqeType {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Rx,
            8 => Self::Send,
            other => Self::Other(other),
        }
    }

    pub const fn raw(&self) -> u8 {
        match self {
            Self::Rx => 1,
            Self::Send => 8,
            Self::Other(raw) => *raw,
        }
    }
}

/// `NIX_CQE_HDR_S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CqeHeader {
    pub tag: u32,
    pub q: u32,
    pub cqe_type: CqeType,
}

impl CqeHeader {
    const TAG: Field = Field::bits(31, 0);
    const Q: Field = Field::bits(51, 32);
    const TYPE: Field = Field::bits(63, 60);

    pub const fn pack(&self) -> u64 {
        let w = Self::TAG.set(0, self.tag as u64);
        let w = Self::Q.set(w, self.q as u64);
        Self::TYPE.set(w, self.cqe_type.raw() as u64)
    }

    pub const fn unpack(w: u64) -> Self {
        Self {
            tag: Self::TAG.get(w) as u32,
            q: Self::Q.get(w) as u32,
            cqe_type: CqeType::from_raw(Self::TYPE.get(w) as u8),
        }
    }
}

/// `NIX_RX_PARSE_S` (fields the driver consumes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxParse {
    pub chan: u16,
    pub desc_sizem1: u8,
    pub errlev: u8,
    pub errcode: u8,
    pub pkind: u8,
    pub pkt_lenm1: u16,
}

impl RxParse {
    pub const WORDS: usize = 7;

    const CHAN: Field = Field::bits(11, 0);
    const DESC_SIZEM1: Field = Field::bits(16, 12);
    const ERRLEV: Field = Field::bits(23, 20);
    const ERRCODE: Field = Field::bits(31, 24);
    const PKIND: Field = Field::bits(63, 58);
    const PKT_LENM1: Field = Field::bits(15, 0);

    pub const fn pack(&self) -> [u64; Self::WORDS] {
        let mut w0 = Self::CHAN.set(0, self.chan as u64);
        w0 = Self::DESC_SIZEM1.set(w0, self.desc_sizem1 as u64);
        w0 = Self::ERRLEV.set(w0, self.errlev as u64);
        w0 = Self::ERRCODE.set(w0, self.errcode as u64);
        w0 = Self::PKIND.set(w0, self.pkind as u64);
        let w1 = Self::PKT_LENM1.set(0, self.pkt_lenm1 as u64);
        [w0, w1, 0, 0, 0, 0, 0]
    }

    pub const fn unpack(words: &[u64; Self::WORDS]) -> Self {
        Self {
            chan: Self::CHAN.get(words[0]) as u16,
            desc_sizem1: Self::DESC_SIZEM1.get(words[0]) as u8,
            errlev: Self::ERRLEV.get(words[0]) as u8,
            errcode: Self::ERRCODE.get(words[0]) as u8,
            pkind: Self::PKIND.get(words[0]) as u8,
            pkt_lenm1: Self::PKT_LENM1.get(words[1]) as u16,
        }
    }

    /// Packet length in bytes.
    pub const fn packet_len(&self) -> usize {
        self.pkt_lenm1 as usize + 1
    }
}

/// Decoded receive completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxCqe {
    pub hdr: CqeHeader,
    pub parse: RxParse,
    pub sg: SgDescriptor,
    pub seg_addrs: [u64; 3],
}

impl RxCqe {
    const PARSE_WORD: usize = 1;
    const SG_WORD: usize = 8;
    const SEG_WORD: usize = 9;

    pub fn from_words(words: &[u64; CQE_WORDS]) -> Self {
        let mut parse = [0u64; RxParse::WORDS];
        parse.copy_from_slice(&words[Self::PARSE_WORD..Self::PARSE_WORD + RxParse::WORDS]);
        Self {
            hdr: CqeHeader::unpack(words[0]),
            parse: RxParse::unpack(&parse),
            sg: SgDescriptor::unpack(words[Self::SG_WORD]),
            seg_addrs: [
                words[Self::SEG_WORD],
                words[Self::SEG_WORD + 1],
                words[Self::SEG_WORD + 2],
            ],
        }
    }

    pub fn to_words(&self) -> [u64; CQE_WORDS] {
        let mut words = [0u64; CQE_WORDS];
        words[0] = self.hdr.pack();
        words[Self::PARSE_WORD..Self::PARSE_WORD + RxParse::WORDS]
            .copy_from_slice(&self.parse.pack());
        words[Self::SG_WORD] = self.sg.pack();
        words[Self::SEG_WORD..Self::SEG_WORD + 3].copy_from_slice(&self.seg_addrs);
        words
    }

    /// Declared packet length.
    pub const fn packet_len(&self) -> usize {
        self.parse.packet_len()
    }

    /// First segment address and size.
    pub const fn first_segment(&self) -> (u64, usize) {
        (self.seg_addrs[0], self.sg.seg_sizes[0] as usize)
    }
}

/// `NIX_SEND_COMP_S`, carried in W1 of a send completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendCompletion {
    pub status: u8,
    pub sqe_id: u16,
}

impl SendCompletion {
    const STATUS: Field = Field::bits(7, 0);
    const SQE_ID: Field = Field::bits(23, 8);

    pub const fn pack(&self) -> u64 {
        let w = Self::STATUS.set(0, self.status as u64);
        Self::SQE_ID.set(w, self.sqe_id as u64)
    }

    pub const fn unpack(w: u64) -> Self {
        Self {
            status: Self::STATUS.get(w) as u8,
            sqe_id: Self::SQE_ID.get(w) as u16,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPLETION QUEUE OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════

bitflags! {
    /// Error bits of the CQ status response.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CqStatusFlags: u64 {
        const CQ_ERR = 1 << 46;
        const OP_ERR = 1 << 63;
    }
}

/// Response of `NIXX_LF_CQ_OP_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CqStatus {
    /// Raw (unmasked) head index.
    pub head: u32,
    /// Raw (unmasked) tail index.
    pub tail: u32,
    pub flags: CqStatusFlags,
}

impl CqStatus {
    const HEAD: Field = Field::bits(39, 20);
    const TAIL: Field = Field::bits(19, 0);

    pub fn decode(w: u64) -> Self {
        Self {
            head: Self::HEAD.get(w) as u32,
            tail: Self::TAIL.get(w) as u32,
            flags: CqStatusFlags::from_bits_truncate(w),
        }
    }

    pub fn encode(&self) -> u64 {
        let w = Self::HEAD.set(0, self.head as u64);
        Self::TAIL.set(w, self.tail as u64) | self.flags.bits()
    }

    pub fn is_error(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// Operand for the CQ status fetch-and-add.
#[inline]
pub const fn cq_status_operand(cq: u32) -> u64 {
    (cq as u64) << 32
}

/// Doorbell word consuming `count` entries of `cq`.
#[inline]
pub const fn cq_door_word(cq: u32, count: u16) -> u64 {
    (cq as u64) << 32 | count as u64
}

/// Split a doorbell word into (cq, count).
#[inline]
pub const fn cq_door_decode(w: u64) -> (u32, u16) {
    ((w >> 32) as u32, w as u16)
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTEXT IMAGES
// ═══════════════════════════════════════════════════════════════════════════
//
// Context images are written by the admin function. Only the fields the
// engine programs are modelled; everything else is zero.
//
// NPA_AURA_S   W0 pool_addr          W1 ena[0] shift[57:52]
//              W2 count[35:0]        W3 limit[35:0]
// NPA_POOL_S   W0 stack_base         W1 ena[0] nat_align[1] buf_size[51:40]
//              W2 stack_max_pages[31:0] stack_pages[63:32]
//              W4 shift[13:8]        W6 ptr_start   W7 ptr_end
// NIX_CQ_CTX_S W0 base               W1 ena[0] qsize[7:4]
// NIX_RQ_CTX_S W0 cq[19:0] ena[20] spb_ena[21]
//              W1 lpb_aura[19:0] spb_aura[39:20]
//              W2 spb_max_len[15:0] lpb_max_len[31:16]
// NIX_SQ_CTX_S W0 cq[19:0] ena[20]   W1 sqb_aura[19:0]   W2 max_sqe_words[7:0]

const ENA: Field = Field::bit(0);

/// `NPA_AURA_S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuraContext {
    pub pool_addr: u64,
    pub ena: bool,
    pub shift: u8,
    pub count: u64,
    pub limit: u64,
}

impl AuraContext {
    const SHIFT: Field = Field::bits(57, 52);
    const COUNT: Field = Field::bits(35, 0);

    pub fn to_words(&self) -> [u64; CTX_WORDS] {
        let mut w = [0u64; CTX_WORDS];
        w[0] = self.pool_addr;
        w[1] = Self::SHIFT.set(ENA.set(0, self.ena as u64), self.shift as u64);
        w[2] = Self::COUNT.set(0, self.count);
        w[3] = Self::COUNT.set(0, self.limit);
        w
    }

    pub fn from_words(w: &[u64; CTX_WORDS]) -> Self {
        Self {
            pool_addr: w[0],
            ena: ENA.get(w[1]) != 0,
            shift: Self::SHIFT.get(w[1]) as u8,
            count: Self::COUNT.get(w[2]),
            limit: Self::COUNT.get(w[3]),
        }
    }
}

/// `NPA_POOL_S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolContext {
    pub stack_base: u64,
    pub ena: bool,
    pub nat_align: bool,
    /// Buffer size in cache lines.
    pub buf_size: u16,
    pub stack_max_pages: u32,
    pub stack_pages: u32,
    pub shift: u8,
    pub ptr_start: u64,
    pub ptr_end: u64,
}

impl PoolContext {
    const NAT_ALIGN: Field = Field::bit(1);
    const BUF_SIZE: Field = Field::bits(51, 40);
    const MAX_PAGES: Field = Field::bits(31, 0);
    const PAGES: Field = Field::bits(63, 32);
    const SHIFT: Field = Field::bits(13, 8);

    pub fn to_words(&self) -> [u64; CTX_WORDS] {
        let mut w = [0u64; CTX_WORDS];
        w[0] = self.stack_base;
        let mut w1 = ENA.set(0, self.ena as u64);
        w1 = Self::NAT_ALIGN.set(w1, self.nat_align as u64);
        w[1] = Self::BUF_SIZE.set(w1, self.buf_size as u64);
        w[2] = Self::PAGES.set(
            Self::MAX_PAGES.set(0, self.stack_max_pages as u64),
            self.stack_pages as u64,
        );
        w[4] = Self::SHIFT.set(0, self.shift as u64);
        w[6] = self.ptr_start;
        w[7] = self.ptr_end;
        w
    }

    pub fn from_words(w: &[u64; CTX_WORDS]) -> Self {
        Self {
            stack_base: w[0],
            ena: ENA.get(w[1]) != 0,
            nat_align: Self::NAT_ALIGN.get(w[1]) != 0,
            buf_size: Self::BUF_SIZE.get(w[1]) as u16,
            stack_max_pages: Self::MAX_PAGES.get(w[2]) as u32,
            stack_pages: Self::PAGES.get(w[2]) as u32,
            shift: Self::SHIFT.get(w[4]) as u8,
            ptr_start: w[6],
            ptr_end: w[7],
        }
    }
}

/// `NIX_CQ_CTX_S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CqContext {
    pub base: u64,
    pub ena: bool,
    /// Entries = 16 << (2 * qsize).
    pub qsize: u8,
}

impl CqContext {
    const QSIZE: Field = Field::bits(7, 4);

    pub fn to_words(&self) -> [u64; CTX_WORDS] {
        let mut w = [0u64; CTX_WORDS];
        w[0] = self.base;
        w[1] = Self::QSIZE.set(ENA.set(0, self.ena as u64), self.qsize as u64);
        w
    }

    pub fn from_words(w: &[u64; CTX_WORDS]) -> Self {
        Self {
            base: w[0],
            ena: ENA.get(w[1]) != 0,
            qsize: Self::QSIZE.get(w[1]) as u8,
        }
    }

    /// Ring entries encoded by `qsize`.
    pub const fn entries(&self) -> u32 {
        16 << (2 * self.qsize as u32)
    }
}

/// `NIX_RQ_CTX_S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RqContext {
    pub cq: u32,
    pub ena: bool,
    pub spb_ena: bool,
    pub lpb_aura: u32,
    pub spb_aura: u32,
    /// Largest frame placed in a small-pool buffer.
    pub spb_max_len: u16,
    /// Largest frame accepted at all.
    pub lpb_max_len: u16,
}

const QUEUE_CQ: Field = Field::bits(19, 0);
const QUEUE_ENA: Field = Field::bit(20);

impl RqContext {
    const SPB_ENA: Field = Field::bit(21);
    const LPB_AURA: Field = Field::bits(19, 0);
    const SPB_AURA: Field = Field::bits(39, 20);
    const SPB_MAX: Field = Field::bits(15, 0);
    const LPB_MAX: Field = Field::bits(31, 16);

    pub fn to_words(&self) -> [u64; CTX_WORDS] {
        let mut w = [0u64; CTX_WORDS];
        let w0 = QUEUE_ENA.set(QUEUE_CQ.set(0, self.cq as u64), self.ena as u64);
        w[0] = Self::SPB_ENA.set(w0, self.spb_ena as u64);
        w[1] = Self::SPB_AURA.set(
            Self::LPB_AURA.set(0, self.lpb_aura as u64),
            self.spb_aura as u64,
        );
        w[2] = Self::LPB_MAX.set(
            Self::SPB_MAX.set(0, self.spb_max_len as u64),
            self.lpb_max_len as u64,
        );
        w
    }

    pub fn from_words(w: &[u64; CTX_WORDS]) -> Self {
        Self {
            cq: QUEUE_CQ.get(w[0]) as u32,
            ena: QUEUE_ENA.get(w[0]) != 0,
            spb_ena: Self::SPB_ENA.get(w[0]) != 0,
            lpb_aura: Self::LPB_AURA.get(w[1]) as u32,
            spb_aura: Self::SPB_AURA.get(w[1]) as u32,
            spb_max_len: Self::SPB_MAX.get(w[2]) as u16,
            lpb_max_len: Self::LPB_MAX.get(w[2]) as u16,
        }
    }
}

/// `NIX_SQ_CTX_S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqContext {
    pub cq: u32,
    pub ena: bool,
    pub sqb_aura: u32,
    pub max_sqe_words: u8,
}

impl SqContext {
    const SQB_AURA: Field = Field::bits(19, 0);
    const MAX_SQE: Field = Field::bits(7, 0);

    pub fn to_words(&self) -> [u64; CTX_WORDS] {
        let mut w = [0u64; CTX_WORDS];
        w[0] = QUEUE_ENA.set(QUEUE_CQ.set(0, self.cq as u64), self.ena as u64);
        w[1] = Self::SQB_AURA.set(0, self.sqb_aura as u64);
        w[2] = Self::MAX_SQE.set(0, self.max_sqe_words as u64);
        w
    }

    pub fn from_words(w: &[u64; CTX_WORDS]) -> Self {
        Self {
            cq: QUEUE_CQ.get(w[0]) as u32,
            ena: QUEUE_ENA.get(w[0]) != 0,
            sqb_aura: Self::SQB_AURA.get(w[1]) as u32,
            max_sqe_words: Self::MAX_SQE.get(w[2]) as u8,
        }
    }
}
