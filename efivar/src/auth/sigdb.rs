//! `EFI_SIGNATURE_LIST` trust stores (PK, KEK contents)
//!
//! ```text
//! EFI_SIGNATURE_LIST
//! ┌────────────────────────────┐
//! │ SignatureType     GUID     │
//! │ SignatureListSize u32      │
//! │ SignatureHeaderSize u32    │
//! │ SignatureSize     u32      │
//! ├────────────────────────────┤
//! │ header (HeaderSize bytes)  │
//! ├────────────────────────────┤
//! │ owner GUID │ data          │ × n, each SignatureSize bytes
//! └────────────────────────────┘
//! ```

use alloc::vec::Vec;

use super::x509::Certificate;
use crate::error::AuthError;
use crate::guid::{self, EFI_CERT_SHA256, EFI_CERT_X509, GUID_SIZE};

/// Fixed part of `EFI_SIGNATURE_LIST`.
pub const SIGNATURE_LIST_HEADER_SIZE: usize = 28;

const SHA256_DIGEST_SIZE: usize = 32;

/// Certificates and hashes gathered from a signature database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureStore<'a> {
    pub certificates: Vec<Certificate<'a>>,
    pub sha256: Vec<&'a [u8]>,
}

impl<'a> SignatureStore<'a> {
    /// Parse concatenated signature lists.
    ///
    /// Lists of unknown type are skipped; X.509 entries that do not parse are
    /// skipped with a warning. Broken list framing rejects the whole store.
    pub fn parse(mut data: &'a [u8]) -> Result<Self, AuthError> {
        let mut store = Self::default();

        while !data.is_empty() {
            if data.len() < SIGNATURE_LIST_HEADER_SIZE {
                return Err(AuthError::Malformed);
            }
            let sig_type = guid::read(data).ok_or(AuthError::Malformed)?;
            let list_size = read_u32(data, 16) as usize;
            let header_size = read_u32(data, 20) as usize;
            let sig_size = read_u32(data, 24) as usize;

            let body_start = SIGNATURE_LIST_HEADER_SIZE
                .checked_add(header_size)
                .ok_or(AuthError::Malformed)?;
            if list_size > data.len() || body_start > list_size || sig_size <= GUID_SIZE {
                return Err(AuthError::Malformed);
            }
            let body = &data[body_start..list_size];
            if body.len() % sig_size != 0 {
                return Err(AuthError::Malformed);
            }

            for entry in body.chunks_exact(sig_size) {
                let sig = &entry[GUID_SIZE..];
                if sig_type == EFI_CERT_X509 {
                    match Certificate::parse(sig) {
                        Ok(cert) => store.certificates.push(cert),
                        Err(_) => log::warn!("auth: skipping unparsable certificate in trust store"),
                    }
                } else if sig_type == EFI_CERT_SHA256 && sig.len() == SHA256_DIGEST_SIZE {
                    store.sha256.push(sig);
                }
            }

            data = &data[list_size..];
        }

        Ok(store)
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.sha256.is_empty()
    }

    /// A certificate with identical DER is enrolled.
    pub fn contains(&self, cert: &Certificate<'_>) -> bool {
        self.certificates.iter().any(|c| c.raw == cert.raw)
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}
