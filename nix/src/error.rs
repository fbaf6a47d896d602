//! NIX error types

use core::fmt;

use dma_pool::DmaError;

pub type Result<T> = core::result::Result<T, NixError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NixError {
    /// No packet ready; poll again later.
    WouldBlock,
    /// TX aura empty; retry after completions drain.
    NoBuffers,
    /// Payload exceeds the single-segment limit.
    PayloadTooLarge,
    /// Completion entry has an unexpected type.
    ProtocolMismatch,
    /// Declared packet length does not fit the first segment.
    SegmentOverflow,
    /// Malformed caller input or configuration.
    InvalidParameter,
    /// DMA arena exhausted during setup.
    OutOfMemory,
    /// Buffer is already back in its aura.
    DoubleFree,
    /// Address is not a buffer of the selected pool.
    UnknownBuffer,
    /// Buffer is in the wrong ownership state for the operation.
    OwnershipViolation,
    /// Physical link reports down.
    LinkDown,
    /// Hardware reported an error condition.
    DeviceError,
    /// Admin function rejected a context operation.
    AdminFailed,
}

impl NixError {
    /// Expected steady-state condition rather than a failure.
    pub const fn is_backpressure(&self) -> bool {
        matches!(self, Self::WouldBlock | Self::NoBuffers)
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::WouldBlock => "no packet available",
            Self::NoBuffers => "TX buffers unavailable",
            Self::PayloadTooLarge => "payload too large",
            Self::ProtocolMismatch => "unexpected completion type",
            Self::SegmentOverflow => "packet length exceeds first segment",
            Self::InvalidParameter => "invalid parameter",
            Self::OutOfMemory => "out of DMA memory",
            Self::DoubleFree => "buffer already free",
            Self::UnknownBuffer => "address is not a pool buffer",
            Self::OwnershipViolation => "buffer ownership violation",
            Self::LinkDown => "link down",
            Self::DeviceError => "device error",
            Self::AdminFailed => "admin function error",
        }
    }
}

impl fmt::Display for NixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl From<DmaError> for NixError {
    fn from(err: DmaError) -> Self {
        match err {
            DmaError::ZeroSize | DmaError::InvalidAlignment => Self::InvalidParameter,
            DmaError::UnknownAllocation | DmaError::InvalidRegion => Self::DeviceError,
            DmaError::OutOfMemory | DmaError::TooManyAllocations => Self::OutOfMemory,
        }
    }
}
