//! EFI GUIDs
//!
//! [`Guid`] is `uguid::Guid`, whose byte form is already the EFI layout:
//! the first three fields little-endian, the last eight bytes as-is.

pub use uguid::{guid, Guid};

/// Encoded size of a GUID.
pub const GUID_SIZE: usize = 16;

/// Decode a GUID from the front of `buf`.
pub fn read(buf: &[u8]) -> Option<Guid> {
    let bytes: [u8; GUID_SIZE] = buf.get(..GUID_SIZE)?.try_into().ok()?;
    Some(Guid::from_bytes(bytes))
}

/// `EFI_GLOBAL_VARIABLE`: PK, KEK, SecureBoot, PlatformLang, MTC...
pub const EFI_GLOBAL_VARIABLE: Guid = guid!("8be4df61-93ca-11d2-aa0d-00e098032b8c");

/// `EFI_IMAGE_SECURITY_DATABASE_GUID`: db, dbx.
pub const EFI_IMAGE_SECURITY_DATABASE: Guid = guid!("d719b2cb-3d3a-4596-a3bc-dad00e67656f");

/// `EFI_CERT_TYPE_PKCS7_GUID`: certificate type of an authentication envelope.
pub const EFI_CERT_TYPE_PKCS7: Guid = guid!("4aafd29d-68df-49ee-8aa9-347d375665a7");

/// `EFI_CERT_X509_GUID`: signature list of DER certificates.
pub const EFI_CERT_X509: Guid = guid!("a5c059a1-94e4-4aa7-87b5-ab155c2bf072");

/// `EFI_CERT_SHA256_GUID`: signature list of SHA-256 hashes.
pub const EFI_CERT_SHA256: Guid = guid!("c1c41626-504c-4092-aca9-41f936934328");

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_byte_order() {
        let bytes = EFI_GLOBAL_VARIABLE.to_bytes();
        assert_eq!(&bytes[..4], &[0x61, 0xdf, 0xe4, 0x8b]);
        assert_eq!(&bytes[4..8], &[0xca, 0x93, 0xd2, 0x11]);
        assert_eq!(&bytes[8..], &[0xaa, 0x0d, 0x00, 0xe0, 0x98, 0x03, 0x2b, 0x8c]);
        assert_eq!(Guid::from_bytes(bytes), EFI_GLOBAL_VARIABLE);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            EFI_IMAGE_SECURITY_DATABASE.to_string(),
            "d719b2cb-3d3a-4596-a3bc-dad00e67656f"
        );
    }

    #[test]
    fn test_read_short_buffer() {
        assert_eq!(read(&[0u8; 15]), None);
        assert_eq!(read(&EFI_CERT_X509.to_bytes()), Some(EFI_CERT_X509));
    }
}
