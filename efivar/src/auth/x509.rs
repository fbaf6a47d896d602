//! X.509 certificates (the subset needed for chain checks)

use super::der::{algorithm_oid, integer_bytes, oid, tag, DerReader};
use super::verify::verify_signature;
use crate::error::AuthError;

/// Subject public key types we can verify with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    Ed25519,
}

impl KeyAlgorithm {
    pub fn from_oid(id: &[u8]) -> Option<Self> {
        match id {
            oid::RSA_ENCRYPTION => Some(Self::Rsa),
            oid::ED25519 => Some(Self::Ed25519),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RsaPkcs1Sha256,
    Ed25519,
}

impl SignatureAlgorithm {
    /// Signer infos commonly name plain rsaEncryption; with a SHA-256 digest
    /// it means the same as sha256WithRSAEncryption.
    pub fn from_oid(id: &[u8]) -> Option<Self> {
        match id {
            oid::SHA256_WITH_RSA | oid::RSA_ENCRYPTION => Some(Self::RsaPkcs1Sha256),
            oid::ED25519 => Some(Self::Ed25519),
            _ => None,
        }
    }
}

/// SubjectPublicKeyInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey<'a> {
    /// `None` for key types we cannot use.
    pub algorithm: Option<KeyAlgorithm>,
    /// RSAPublicKey DER for RSA, the 32-byte point for Ed25519.
    pub key: &'a [u8],
}

/// Parsed certificate borrowing from its DER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Certificate<'a> {
    pub raw: &'a [u8],
    /// TBSCertificate as encoded (the signed bytes).
    pub tbs: &'a [u8],
    pub serial: &'a [u8],
    /// Issuer Name DER.
    pub issuer: &'a [u8],
    /// Subject Name DER.
    pub subject: &'a [u8],
    pub public_key: PublicKey<'a>,
    pub signature_algorithm: Option<SignatureAlgorithm>,
    pub signature: &'a [u8],
}

impl<'a> Certificate<'a> {
    /// Parse one DER certificate. Trailing bytes after it are ignored.
    pub fn parse(der: &'a [u8]) -> Result<Self, AuthError> {
        let cert = DerReader::new(der).expect(tag::SEQUENCE)?;
        let mut outer = cert.reader();
        let tbs = outer.expect(tag::SEQUENCE)?;
        let signature_algorithm = SignatureAlgorithm::from_oid(algorithm_oid(&mut outer)?);
        let signature = bit_string(outer.expect(tag::BIT_STRING)?.contents)?;

        let mut fields = tbs.reader();
        fields.optional(tag::CONTEXT_0)?; // version
        let serial = fields.expect(tag::INTEGER)?.contents;
        algorithm_oid(&mut fields)?;
        let issuer = fields.expect(tag::SEQUENCE)?.raw;
        fields.expect(tag::SEQUENCE)?; // validity
        let subject = fields.expect(tag::SEQUENCE)?.raw;

        let spki = fields.expect(tag::SEQUENCE)?;
        let mut spki = spki.reader();
        let algorithm = KeyAlgorithm::from_oid(algorithm_oid(&mut spki)?);
        let key = bit_string(spki.expect(tag::BIT_STRING)?.contents)?;
        // Unique ids and extensions are not needed.
        fields.skip_rest();

        Ok(Self {
            raw: cert.raw,
            tbs: tbs.raw,
            serial,
            issuer,
            subject,
            public_key: PublicKey { algorithm, key },
            signature_algorithm,
            signature,
        })
    }

    /// Same issuer and serial number.
    pub fn matches_issuer_serial(&self, issuer: &[u8], serial: &[u8]) -> bool {
        self.issuer == issuer && integer_bytes(self.serial) == integer_bytes(serial)
    }

    /// `issuer` named this certificate's issuer and its key verifies our signature.
    pub fn is_issued_by(&self, issuer: &Certificate<'_>) -> bool {
        if self.issuer != issuer.subject {
            return false;
        }
        match self.signature_algorithm {
            Some(alg) => verify_signature(&issuer.public_key, alg, self.tbs, self.signature),
            None => false,
        }
    }

    pub fn is_self_issued(&self) -> bool {
        self.issuer == self.subject
    }
}

/// BIT STRING contents without the unused-bits byte; partial bytes are rejected.
fn bit_string(contents: &[u8]) -> Result<&[u8], AuthError> {
    match contents.split_first() {
        Some((0, bits)) => Ok(bits),
        _ => Err(AuthError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_oids() {
        assert_eq!(KeyAlgorithm::from_oid(oid::ED25519), Some(KeyAlgorithm::Ed25519));
        assert_eq!(KeyAlgorithm::from_oid(oid::SHA256), None);
        assert_eq!(
            SignatureAlgorithm::from_oid(oid::RSA_ENCRYPTION),
            Some(SignatureAlgorithm::RsaPkcs1Sha256)
        );
    }

    #[test]
    fn test_bit_string() {
        assert_eq!(bit_string(&[0, 1, 2]), Ok(&[1u8, 2][..]));
        assert_eq!(bit_string(&[3, 1]), Err(AuthError::Malformed));
        assert_eq!(bit_string(&[]), Err(AuthError::Malformed));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(Certificate::parse(&[0x30, 0x00]), Err(AuthError::Malformed));
        assert_eq!(Certificate::parse(&[0x02, 0x01, 0x00]), Err(AuthError::Malformed));
    }
}
