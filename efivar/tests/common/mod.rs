//! Certificate, PKCS#7 and envelope builders for signed-update tests

#![allow(dead_code)]

use octeon_efivar::auth::der::{oid, tag};
use octeon_efivar::auth::time::EfiTime;
use octeon_efivar::guid::{EFI_CERT_SHA256, EFI_CERT_TYPE_PKCS7, EFI_CERT_X509};
use octeon_efivar::{
    Guid, MemoryStorage, PersistentStorage, StoreConfig, VarAttributes, VarError, VarName,
    VariableStore,
};
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair, RsaKeyPair};
use sha2::{Digest, Sha256};

pub type MemStore = VariableStore<MemoryStorage>;

const RSA_PKCS8: &[u8] = include_bytes!("../data/rsa2048.pk8");

/// 2.5.4.3
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];

pub fn store() -> MemStore {
    VariableStore::init(StoreConfig::new(), MemoryStorage::new()).expect("init")
}

/// Noon on 2024-06-`day`.
pub fn at(day: u8) -> EfiTime {
    EfiTime::new(2024, 6, day, 12, 0, 0)
}

// ============================================================================
// DER
// ============================================================================

pub fn der(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = contents.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend_from_slice(&[0x81, len as u8]);
    } else if len <= 0xffff {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0x83);
        out.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
    }
    out.extend_from_slice(contents);
    out
}

pub fn seq(parts: &[&[u8]]) -> Vec<u8> {
    der(tag::SEQUENCE, &parts.concat())
}

pub fn set(parts: &[&[u8]]) -> Vec<u8> {
    der(tag::SET, &parts.concat())
}

fn integer(value: u8) -> Vec<u8> {
    if value & 0x80 != 0 {
        der(tag::INTEGER, &[0, value])
    } else {
        der(tag::INTEGER, &[value])
    }
}

fn null() -> Vec<u8> {
    der(tag::NULL, &[])
}

/// Name with a single commonName.
pub fn name(cn: &str) -> Vec<u8> {
    let atv = seq(&[&der(tag::OID, OID_COMMON_NAME), &der(0x0c, cn.as_bytes())]);
    seq(&[&set(&[&atv])])
}

// ============================================================================
// KEYS AND CERTIFICATES
// ============================================================================

pub enum Signer {
    Ed25519(Ed25519KeyPair),
    Rsa(RsaKeyPair),
}

impl Signer {
    pub fn ed25519(seed: u8) -> Self {
        Self::Ed25519(Ed25519KeyPair::from_seed_unchecked(&[seed; 32]).expect("seed"))
    }

    pub fn rsa() -> Self {
        Self::Rsa(RsaKeyPair::from_pkcs8(RSA_PKCS8).expect("pkcs8"))
    }

    fn spki(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(pair) => {
                let alg = seq(&[&der(tag::OID, oid::ED25519)]);
                seq(&[&alg, &bit_string(pair.public_key().as_ref())])
            }
            Self::Rsa(pair) => {
                let alg = seq(&[&der(tag::OID, oid::RSA_ENCRYPTION), &null()]);
                seq(&[&alg, &bit_string(pair.public_key().as_ref())])
            }
        }
    }

    /// AlgorithmIdentifier for certificate signatures.
    fn cert_algorithm(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(_) => seq(&[&der(tag::OID, oid::ED25519)]),
            Self::Rsa(_) => seq(&[&der(tag::OID, oid::SHA256_WITH_RSA), &null()]),
        }
    }

    /// AlgorithmIdentifier for SignerInfo signatures.
    fn signer_algorithm(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(_) => seq(&[&der(tag::OID, oid::ED25519)]),
            Self::Rsa(_) => seq(&[&der(tag::OID, oid::RSA_ENCRYPTION), &null()]),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Ed25519(pair) => pair.sign(message).as_ref().to_vec(),
            Self::Rsa(pair) => {
                let mut sig = vec![0u8; pair.public().modulus_len()];
                pair.sign(&signature::RSA_PKCS1_SHA256, &SystemRandom::new(), message, &mut sig)
                    .expect("rsa sign");
                sig
            }
        }
    }
}

fn bit_string(bits: &[u8]) -> Vec<u8> {
    let mut contents = vec![0u8];
    contents.extend_from_slice(bits);
    der(tag::BIT_STRING, &contents)
}

/// A key with its certificate.
pub struct Identity {
    pub key: Signer,
    pub cert: Vec<u8>,
    pub subject: Vec<u8>,
    pub issuer: Vec<u8>,
    pub serial: u8,
}

impl Identity {
    pub fn self_signed(cn: &str, serial: u8, key: Signer) -> Self {
        let subject = name(cn);
        let cert = certificate(&subject, &subject, serial, &key, &key);
        Self {
            key,
            cert,
            issuer: subject.clone(),
            subject,
            serial,
        }
    }

    pub fn issued_by(cn: &str, serial: u8, key: Signer, issuer: &Identity) -> Self {
        let subject = name(cn);
        let cert = certificate(&subject, &issuer.subject, serial, &key, &issuer.key);
        Self {
            key,
            cert,
            subject,
            issuer: issuer.subject.clone(),
            serial,
        }
    }
}

fn certificate(subject: &[u8], issuer: &[u8], serial: u8, key: &Signer, issuer_key: &Signer) -> Vec<u8> {
    let version = der(tag::CONTEXT_0, &integer(2));
    let validity = seq(&[
        &der(0x17, b"240101000000Z"),
        &der(0x17, b"340101000000Z"),
    ]);
    let tbs = seq(&[
        &version,
        &integer(serial),
        &issuer_key.cert_algorithm(),
        issuer,
        &validity,
        subject,
        &key.spki(),
    ]);
    let sig = issuer_key.sign(&tbs);
    seq(&[&tbs, &issuer_key.cert_algorithm(), &bit_string(&sig)])
}

// ============================================================================
// PKCS#7
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct SignStyle {
    /// Sign authenticated attributes carrying the message digest.
    pub signed_attrs: bool,
    /// Emit a full ContentInfo instead of a bare SignedData.
    pub content_info: bool,
}

/// SignedData (or ContentInfo) over `message` by `signer`.
pub fn signed_data(message: &[u8], signer: &Identity, embedded: &[&[u8]], style: SignStyle) -> Vec<u8> {
    let sha256 = seq(&[&der(tag::OID, oid::SHA256)]);

    let (attrs, signature) = if style.signed_attrs {
        let digest = Sha256::digest(message);
        let content_type = seq(&[&der(tag::OID, oid::CONTENT_TYPE), &set(&[&der(tag::OID, oid::DATA)])]);
        let message_digest = seq(&[
            &der(tag::OID, oid::MESSAGE_DIGEST),
            &set(&[&der(tag::OCTET_STRING, &digest)]),
        ]);
        let contents = [content_type, message_digest].concat();
        let signature = signer.key.sign(&der(tag::SET, &contents));
        (der(tag::CONTEXT_0, &contents), signature)
    } else {
        (Vec::new(), signer.key.sign(message))
    };

    let sid = seq(&[&signer.issuer, &integer(signer.serial)]);
    let signer_info = seq(&[
        &integer(1),
        &sid,
        &sha256,
        &attrs,
        &signer.key.signer_algorithm(),
        &der(tag::OCTET_STRING, &signature),
    ]);

    let certs = if embedded.is_empty() {
        Vec::new()
    } else {
        der(tag::CONTEXT_0, &embedded.concat())
    };
    let signed = seq(&[
        &integer(1),
        &set(&[&sha256]),
        &seq(&[&der(tag::OID, oid::DATA)]),
        &certs,
        &set(&[&signer_info]),
    ]);

    if style.content_info {
        seq(&[&der(tag::OID, oid::SIGNED_DATA), &der(tag::CONTEXT_0, &signed)])
    } else {
        signed
    }
}

// ============================================================================
// SIGNATURE LISTS AND ENVELOPES
// ============================================================================

/// One `EFI_SIGNATURE_LIST` per certificate.
pub fn x509_list(certs: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for cert in certs {
        let sig_size = 16 + cert.len();
        out.extend_from_slice(&EFI_CERT_X509.to_bytes());
        out.extend_from_slice(&((28 + sig_size) as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(sig_size as u32).to_le_bytes());
        out.extend_from_slice(&[0x5a; 16]);
        out.extend_from_slice(cert);
    }
    out
}

pub fn sha256_list(hashes: &[[u8; 32]]) -> Vec<u8> {
    let mut out = EFI_CERT_SHA256.to_bytes().to_vec();
    out.extend_from_slice(&((28 + hashes.len() * 48) as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&48u32.to_le_bytes());
    for hash in hashes {
        out.extend_from_slice(&[0x5a; 16]);
        out.extend_from_slice(hash);
    }
    out
}

/// `EFI_VARIABLE_AUTHENTICATION_2` followed by `payload`.
pub fn envelope(time: EfiTime, cert_data: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut buf = time.to_bytes().to_vec();
    buf.extend_from_slice(&((24 + cert_data.len()) as u32).to_le_bytes());
    buf.extend_from_slice(&0x0200u16.to_le_bytes());
    buf.extend_from_slice(&0x0ef1u16.to_le_bytes());
    buf.extend_from_slice(&EFI_CERT_TYPE_PKCS7.to_bytes());
    buf.extend_from_slice(cert_data);
    buf.extend_from_slice(payload);
    buf
}

/// Envelope with placeholder signature data, accepted in setup mode.
pub fn unsigned_update(time: EfiTime, payload: &[u8]) -> Vec<u8> {
    envelope(time, &[0x30, 0x00], payload)
}

/// Bytes an update signature covers.
pub fn digest_input(name: &str, vendor: &Guid, attributes: VarAttributes, time: EfiTime, payload: &[u8]) -> Vec<u8> {
    let mut out = VarName::from(name).to_le_bytes();
    out.extend_from_slice(&vendor.to_bytes());
    out.extend_from_slice(&(attributes - VarAttributes::APPEND_WRITE).bits().to_le_bytes());
    out.extend_from_slice(&time.to_bytes());
    out.extend_from_slice(payload);
    out
}

pub struct Update<'a> {
    pub name: &'a str,
    pub vendor: Guid,
    pub attributes: VarAttributes,
    pub time: EfiTime,
    pub payload: &'a [u8],
}

impl Update<'_> {
    /// Envelope signed by `signer`, embedding `embedded` certificates.
    pub fn signed(&self, signer: &Identity, embedded: &[&[u8]], style: SignStyle) -> Vec<u8> {
        let message = digest_input(self.name, &self.vendor, self.attributes, self.time, self.payload);
        let pkcs7 = signed_data(&message, signer, embedded, style);
        envelope(self.time, &pkcs7, self.payload)
    }

    pub fn apply(&self, store: &mut MemStore, envelope: &[u8]) -> Result<(), VarError> {
        store.set_variable(
            &VarName::from(self.name),
            &self.vendor,
            self.attributes.bits(),
            envelope,
        )
    }
}

// ============================================================================
// STORAGE
// ============================================================================

/// Memory storage whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_writes: bool,
}

impl PersistentStorage for FlakyStorage {
    fn load(&mut self) -> Result<Option<Vec<u8>>, VarError> {
        self.inner.load()
    }

    fn store(&mut self, image: &[u8]) -> Result<(), VarError> {
        if self.fail_writes {
            return Err(VarError::DeviceError);
        }
        self.inner.store(image)
    }
}
