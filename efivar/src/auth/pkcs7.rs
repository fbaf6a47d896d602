//! PKCS#7 / CMS SignedData (detached content)

use alloc::vec::Vec;

use super::der::{algorithm_oid, oid, tag, DerReader, Tlv};
use super::x509::{Certificate, SignatureAlgorithm};
use crate::error::AuthError;

type Result<T> = core::result::Result<T, AuthError>;

/// Signed attributes of one signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedAttributes<'a> {
    /// `[0] IMPLICIT` element as encoded.
    raw: &'a [u8],
    pub message_digest: Option<&'a [u8]>,
}

impl SignedAttributes<'_> {
    /// Bytes the signature covers: the attributes re-tagged as a SET.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut bytes = self.raw.to_vec();
        bytes[0] = tag::SET;
        bytes
    }
}

/// One `SignerInfo` identified by issuer and serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerInfo<'a> {
    pub issuer: &'a [u8],
    pub serial: &'a [u8],
    pub digest_algorithm: &'a [u8],
    pub signed_attributes: Option<SignedAttributes<'a>>,
    pub signature_algorithm: Option<SignatureAlgorithm>,
    pub signature: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedData<'a> {
    pub certificates: Vec<Certificate<'a>>,
    pub signers: Vec<SignerInfo<'a>>,
}

impl<'a> SignedData<'a> {
    /// Parse a ContentInfo of type signedData.
    pub fn parse(der: &'a [u8]) -> Result<Self> {
        let content_info = DerReader::new(der).expect(tag::SEQUENCE)?;
        let mut r = content_info.reader();
        if r.expect(tag::OID)?.contents != oid::SIGNED_DATA {
            return Err(AuthError::Malformed);
        }
        let explicit = r.expect(tag::CONTEXT_0)?;
        let signed_data = explicit.reader().expect(tag::SEQUENCE)?;
        Self::parse_signed_data(signed_data)
    }

    fn parse_signed_data(seq: Tlv<'a>) -> Result<Self> {
        let mut r = seq.reader();
        r.expect(tag::INTEGER)?; // version
        r.expect(tag::SET)?; // digestAlgorithms
        r.expect(tag::SEQUENCE)?; // encapContentInfo, detached

        let mut certificates = Vec::new();
        if let Some(certs) = r.optional(tag::CONTEXT_0)? {
            let mut cr = certs.reader();
            while !cr.is_empty() {
                let cert = cr.read()?;
                certificates.push(Certificate::parse(cert.raw)?);
            }
        }
        r.optional(tag::CONTEXT_1)?; // crls

        let infos = r.expect(tag::SET)?;
        let mut ir = infos.reader();
        let mut signers = Vec::new();
        while !ir.is_empty() {
            signers.push(parse_signer(ir.expect(tag::SEQUENCE)?)?);
        }
        if signers.is_empty() {
            return Err(AuthError::Malformed);
        }

        log::debug!(
            "auth: signedData with {} certificates, {} signers",
            certificates.len(),
            signers.len()
        );
        Ok(Self {
            certificates,
            signers,
        })
    }
}

fn parse_signer(seq: Tlv<'_>) -> Result<SignerInfo<'_>> {
    let mut r = seq.reader();
    r.expect(tag::INTEGER)?; // version

    // Only issuerAndSerialNumber identifies signers in variable updates.
    let sid = r.expect(tag::SEQUENCE)?;
    let mut sr = sid.reader();
    let issuer = sr.expect(tag::SEQUENCE)?.raw;
    let serial = sr.expect(tag::INTEGER)?.contents;

    let digest_algorithm = algorithm_oid(&mut r)?;
    let signed_attributes = match r.optional(tag::CONTEXT_0)? {
        Some(attrs) => Some(parse_signed_attributes(attrs)?),
        None => None,
    };
    let signature_algorithm = SignatureAlgorithm::from_oid(algorithm_oid(&mut r)?);
    let signature = r.expect(tag::OCTET_STRING)?.contents;

    Ok(SignerInfo {
        issuer,
        serial,
        digest_algorithm,
        signed_attributes,
        signature_algorithm,
        signature,
    })
}

fn parse_signed_attributes(attrs: Tlv<'_>) -> Result<SignedAttributes<'_>> {
    let mut message_digest = None;
    let mut r = attrs.reader();
    while !r.is_empty() {
        let attr = r.expect(tag::SEQUENCE)?;
        let mut ar = attr.reader();
        let attr_type = ar.expect(tag::OID)?.contents;
        let values = ar.expect(tag::SET)?;
        if attr_type == oid::MESSAGE_DIGEST {
            if message_digest.is_some() {
                return Err(AuthError::Malformed);
            }
            message_digest = Some(values.reader().expect(tag::OCTET_STRING)?.contents);
        }
    }
    Ok(SignedAttributes {
        raw: attrs.raw,
        message_digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_other_content_types() {
        // SEQUENCE { OID data }
        let mut der = alloc::vec![0x30, 0x0b, 0x06, 0x09];
        der.extend_from_slice(oid::DATA);
        assert_eq!(SignedData::parse(&der), Err(AuthError::Malformed));
    }

    #[test]
    fn test_signed_bytes_retag() {
        let raw = [0xa0, 0x03, 0x30, 0x01, 0x00];
        let attrs = SignedAttributes {
            raw: &raw,
            message_digest: None,
        };
        assert_eq!(attrs.signed_bytes(), [0x31, 0x03, 0x30, 0x01, 0x00]);
    }
}
