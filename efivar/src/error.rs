//! Variable store error types

use core::fmt;

pub type Result<T> = core::result::Result<T, VarError>;

/// High bit of an EFI status marks an error.
const EFI_ERROR_BIT: u64 = 1 << 63;

/// Reasons the authentication gate rejects an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Envelope, signature or certificate encoding is invalid.
    Malformed,
    /// Timestamp is not later than the stored one.
    Stale,
    /// No signer verified against the trust store.
    VerificationFailed,
    /// The trust store for this variable is absent.
    NoTrustStore,
    /// Variable is not one the gate knows how to authenticate.
    UnsupportedVariable,
}

impl AuthError {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed authentication data",
            Self::Stale => "timestamp not newer than stored",
            Self::VerificationFailed => "signature verification failed",
            Self::NoTrustStore => "no trust store",
            Self::UnsupportedVariable => "variable cannot be authenticated",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarError {
    InvalidParameter,
    NotFound,
    /// Read-only or locked variable.
    WriteProtected,
    /// Variable buffer is full.
    OutOfResources,
    /// Persistent storage failed.
    DeviceError,
    /// Caller buffer too small; carries the required size.
    BufferTooSmall(usize),
    /// Service not available in the current phase.
    Unsupported,
    SecurityViolation(AuthError),
}

impl VarError {
    /// EFI status code for this error.
    pub const fn status(&self) -> u64 {
        EFI_ERROR_BIT
            | match self {
                Self::InvalidParameter => 2,
                Self::Unsupported => 3,
                Self::BufferTooSmall(_) => 5,
                Self::DeviceError => 7,
                Self::WriteProtected => 8,
                Self::OutOfResources => 9,
                Self::NotFound => 14,
                Self::SecurityViolation(_) => 26,
            }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "invalid parameter",
            Self::NotFound => "variable not found",
            Self::WriteProtected => "variable is write protected",
            Self::OutOfResources => "variable storage full",
            Self::DeviceError => "storage device error",
            Self::BufferTooSmall(_) => "buffer too small",
            Self::Unsupported => "unsupported",
            Self::SecurityViolation(_) => "security violation",
        }
    }
}

impl fmt::Display for VarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall(required) => write!(f, "buffer too small ({} bytes required)", required),
            Self::SecurityViolation(cause) => write!(f, "security violation: {}", cause),
            other => f.write_str(other.description()),
        }
    }
}

impl From<AuthError> for VarError {
    fn from(err: AuthError) -> Self {
        Self::SecurityViolation(err)
    }
}

/// Why a persisted image was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// Shorter than the header.
    Truncated,
    BadMagic,
    /// Length field outside the buffer or below the header size.
    BadLength,
    BadCrc,
    /// An entry overruns the image or has no name.
    BadEntry,
}

impl ImageError {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Truncated => "image truncated",
            Self::BadMagic => "bad image magic",
            Self::BadLength => "bad image length",
            Self::BadCrc => "image CRC mismatch",
            Self::BadEntry => "corrupt variable entry",
        }
    }
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
