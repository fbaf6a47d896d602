//! `EFI_VARIABLE_AUTHENTICATION_2` envelopes
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0x00    16    EFI_TIME timestamp
//! 0x10    4     WIN_CERTIFICATE.dwLength (covers 0x10..0x10+dwLength)
//! 0x14    2     WIN_CERTIFICATE.wRevision
//! 0x16    2     WIN_CERTIFICATE.wCertificateType
//! 0x18    16    CertType (EFI_CERT_TYPE_PKCS7_GUID)
//! 0x28    ...   CertData: PKCS#7 SignedData
//! 0x10+dwLength Payload (new variable value)
//! ```

use alloc::borrow::Cow;
use alloc::vec::Vec;

use super::der::oid;
use super::time::{EfiTime, EFI_TIME_SIZE};
use crate::error::AuthError;
use crate::guid::{self, EFI_CERT_TYPE_PKCS7};

/// `WIN_CERTIFICATE_UEFI_GUID` header: WIN_CERTIFICATE plus CertType.
pub const WIN_CERT_UEFI_GUID_SIZE: usize = 24;

/// Smallest valid envelope.
pub const AUTH2_HEADER_SIZE: usize = EFI_TIME_SIZE + WIN_CERT_UEFI_GUID_SIZE;

/// ContentInfo header placed in front of a bare SignedData:
/// SEQUENCE { OID signedData, [0] { ... } } with 16-bit lengths patched in.
pub const PKCS7_WRAP_HEADER: [u8; 19] = [
    0x30, 0x82, 0x05, 0xc7, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02,
    0xa0, 0x82, 0x05, 0xb8,
];

/// Parsed envelope, borrowing from the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthEnvelope<'a> {
    pub timestamp: EfiTime,
    /// Timestamp as encoded (digest input).
    pub time_bytes: &'a [u8],
    /// PKCS#7 data after the CertType GUID.
    pub cert_data: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> AuthEnvelope<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, AuthError> {
        if buf.len() < AUTH2_HEADER_SIZE {
            return Err(AuthError::Malformed);
        }
        let dw_length = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]) as usize;
        if dw_length < WIN_CERT_UEFI_GUID_SIZE {
            return Err(AuthError::Malformed);
        }
        let cert_end = EFI_TIME_SIZE
            .checked_add(dw_length)
            .filter(|&end| end <= buf.len())
            .ok_or(AuthError::Malformed)?;

        if guid::read(&buf[0x18..]) != Some(EFI_CERT_TYPE_PKCS7) {
            return Err(AuthError::Malformed);
        }

        let mut time = [0u8; EFI_TIME_SIZE];
        time.copy_from_slice(&buf[..EFI_TIME_SIZE]);
        let timestamp = EfiTime::from_bytes(&time);
        if !timestamp.is_canonical() {
            return Err(AuthError::Malformed);
        }

        Ok(Self {
            timestamp,
            time_bytes: &buf[..EFI_TIME_SIZE],
            cert_data: &buf[AUTH2_HEADER_SIZE..cert_end],
            payload: &buf[cert_end..],
        })
    }
}

/// ContentInfo DER for `cert_data`.
///
/// Data that already starts with the signedData ContentInfo header is used
/// as-is; a bare SignedData gets [`PKCS7_WRAP_HEADER`] prepended.
pub fn signed_data_der(cert_data: &[u8]) -> Result<Cow<'_, [u8]>, AuthError> {
    if cert_data.len() > PKCS7_WRAP_HEADER.len()
        && cert_data[4..15] == PKCS7_WRAP_HEADER[4..15]
    {
        return Ok(Cow::Borrowed(cert_data));
    }

    let total = PKCS7_WRAP_HEADER.len() + cert_data.len();
    if total <= 0x7f || total - 4 > u16::MAX as usize {
        return Err(AuthError::Malformed);
    }
    log::debug!("auth: wrapping bare SignedData ({} bytes)", cert_data.len());

    let mut der = Vec::with_capacity(total);
    der.extend_from_slice(&PKCS7_WRAP_HEADER);
    der.extend_from_slice(cert_data);
    der[2..4].copy_from_slice(&((total - 4) as u16).to_be_bytes());
    der[0x11..0x13].copy_from_slice(&((total - 0x13) as u16).to_be_bytes());
    Ok(Cow::Owned(der))
}

/// The wrap header embeds the signedData OID at bytes 4..15.
const _: () = {
    let mut i = 0;
    while i < 9 {
        assert!(PKCS7_WRAP_HEADER[6 + i] == oid::SIGNED_DATA[i]);
        i += 1;
    }
};
