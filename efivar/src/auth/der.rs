//! Minimal DER reader
//!
//! Just enough ASN.1 for PKCS#7 SignedData and X.509 certificates:
//! low tag numbers, definite lengths up to four length bytes. Values are
//! borrowed from the input.

use crate::error::AuthError;

type Result<T> = core::result::Result<T, AuthError>;

/// Universal and context tags used by the parsers.
pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
    /// `[0]` constructed (explicit, or implicit SET/SEQUENCE)
    pub const CONTEXT_0: u8 = 0xa0;
    /// `[1]` constructed
    pub const CONTEXT_1: u8 = 0xa1;
    /// `[2]` constructed
    pub const CONTEXT_2: u8 = 0xa2;
    /// `[3]` constructed
    pub const CONTEXT_3: u8 = 0xa3;
    /// `[0]` primitive (SubjectKeyIdentifier signer id)
    pub const CONTEXT_0_PRIMITIVE: u8 = 0x80;
}

/// Object identifier contents (without tag and length).
pub mod oid {
    /// 1.2.840.113549.1.7.1
    pub const DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];
    /// 1.2.840.113549.1.7.2
    pub const SIGNED_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
    /// 1.2.840.113549.1.9.3
    pub const CONTENT_TYPE: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x03];
    /// 1.2.840.113549.1.9.4
    pub const MESSAGE_DIGEST: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x04];
    /// 2.16.840.1.101.3.4.2.1
    pub const SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
    /// 1.2.840.113549.1.1.1
    pub const RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
    /// 1.2.840.113549.1.1.11
    pub const SHA256_WITH_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];
    /// 1.3.101.112
    pub const ED25519: &[u8] = &[0x2b, 0x65, 0x70];
}

/// One decoded element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    /// Value bytes.
    pub contents: &'a [u8],
    /// Tag, length and value as encoded.
    pub raw: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Reader over the contents of a constructed element.
    pub fn reader(&self) -> DerReader<'a> {
        DerReader::new(self.contents)
    }
}

/// Sequential reader over concatenated DER elements.
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read the next element.
    pub fn read(&mut self) -> Result<Tlv<'a>> {
        let start = self.pos;
        let tag = *self.data.get(start).ok_or(AuthError::Malformed)?;
        if tag & 0x1f == 0x1f {
            // High tag numbers never appear in the structures we parse.
            return Err(AuthError::Malformed);
        }

        let first = *self.data.get(start + 1).ok_or(AuthError::Malformed)?;
        let (len, header) = if first < 0x80 {
            (first as usize, 2)
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 4 {
                return Err(AuthError::Malformed);
            }
            let bytes = self
                .data
                .get(start + 2..start + 2 + count)
                .ok_or(AuthError::Malformed)?;
            let len = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
            (len, 2 + count)
        };

        let value_start = start + header;
        let end = value_start.checked_add(len).ok_or(AuthError::Malformed)?;
        if end > self.data.len() {
            return Err(AuthError::Malformed);
        }
        self.pos = end;
        Ok(Tlv {
            tag,
            contents: &self.data[value_start..end],
            raw: &self.data[start..end],
        })
    }

    /// Read the next element and require `tag`.
    pub fn expect(&mut self, tag: u8) -> Result<Tlv<'a>> {
        let tlv = self.read()?;
        if tlv.tag != tag {
            return Err(AuthError::Malformed);
        }
        Ok(tlv)
    }

    /// Read the next element if it carries `tag`.
    pub fn optional(&mut self, tag: u8) -> Result<Option<Tlv<'a>>> {
        if self.peek_tag() == Some(tag) {
            self.expect(tag).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Skip whatever remains.
    pub fn skip_rest(&mut self) {
        self.pos = self.data.len();
    }
}

/// Parse `AlgorithmIdentifier`, returning the OID contents.
///
/// Parameters (absent or NULL for every algorithm we accept) are ignored.
pub fn algorithm_oid<'a>(reader: &mut DerReader<'a>) -> Result<&'a [u8]> {
    let seq = reader.expect(tag::SEQUENCE)?;
    let mut inner = seq.reader();
    Ok(inner.expect(tag::OID)?.contents)
}

/// INTEGER contents with redundant leading zero bytes stripped.
pub fn integer_bytes(contents: &[u8]) -> &[u8] {
    let mut bytes = contents;
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes = &bytes[1..];
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_and_long_lengths() {
        let mut data = alloc::vec![0x04, 0x02, 0xaa, 0xbb, 0x30, 0x81, 0x80];
        data.extend_from_slice(&[0u8; 0x80]);
        let mut reader = DerReader::new(&data);

        let first = reader.read().unwrap();
        assert_eq!(first.tag, tag::OCTET_STRING);
        assert_eq!(first.contents, &[0xaa, 0xbb]);
        assert_eq!(first.raw.len(), 4);

        let second = reader.expect(tag::SEQUENCE).unwrap();
        assert_eq!(second.contents.len(), 0x80);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_rejects_bad_encodings() {
        // Overrun
        assert_eq!(DerReader::new(&[0x30, 0x05, 0x00]).read(), Err(AuthError::Malformed));
        // Indefinite length
        assert_eq!(DerReader::new(&[0x30, 0x80, 0x00, 0x00]).read(), Err(AuthError::Malformed));
        // High tag number
        assert_eq!(DerReader::new(&[0x1f, 0x01, 0x00]).read(), Err(AuthError::Malformed));
        // Truncated length
        assert_eq!(DerReader::new(&[0x30, 0x82, 0x01]).read(), Err(AuthError::Malformed));
    }

    #[test]
    fn test_optional_and_expect() {
        let data = [0xa0, 0x00, 0x02, 0x01, 0x05];
        let mut reader = DerReader::new(&data);
        assert_eq!(reader.optional(tag::CONTEXT_1), Ok(None));
        assert!(reader.optional(tag::CONTEXT_0).unwrap().is_some());
        assert_eq!(reader.expect(tag::SET), Err(AuthError::Malformed));
    }

    #[test]
    fn test_integer_bytes() {
        assert_eq!(integer_bytes(&[0x00, 0x80, 0x01]), &[0x80, 0x01]);
        assert_eq!(integer_bytes(&[0x00]), &[0x00]);
    }
}
