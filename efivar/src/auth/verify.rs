//! Signature and chain verification

use alloc::vec::Vec;

use ring::signature::{self, UnparsedPublicKey};
use sha2::{Digest, Sha256};

use super::der::oid;
use super::pkcs7::{SignedData, SignerInfo};
use super::sigdb::SignatureStore;
use super::x509::{Certificate, KeyAlgorithm, PublicKey, SignatureAlgorithm};

/// Intermediate certificates walked between a signer and a trust anchor.
pub const MAX_CHAIN_DEPTH: usize = 4;

/// Verify one raw signature. Key and algorithm must agree.
pub fn verify_signature(
    key: &PublicKey<'_>,
    algorithm: SignatureAlgorithm,
    message: &[u8],
    sig: &[u8],
) -> bool {
    let params: &'static dyn signature::VerificationAlgorithm = match (key.algorithm, algorithm) {
        (Some(KeyAlgorithm::Rsa), SignatureAlgorithm::RsaPkcs1Sha256) => {
            &signature::RSA_PKCS1_2048_8192_SHA256
        }
        (Some(KeyAlgorithm::Ed25519), SignatureAlgorithm::Ed25519) => &signature::ED25519,
        _ => return false,
    };
    UnparsedPublicKey::new(params, key.key)
        .verify(message, sig)
        .is_ok()
}

/// Check that some signer of `signed` signed the concatenation of `regions`
/// with a certificate that chains to `store`.
pub fn verify_signed_data(
    regions: &[&[u8]],
    signed: &SignedData<'_>,
    store: &SignatureStore<'_>,
) -> bool {
    let message: Vec<u8> = regions.concat();
    let digest = Sha256::digest(&message);

    signed
        .signers
        .iter()
        .any(|signer| verify_signer(signer, &message, &digest, signed, store))
}

fn verify_signer(
    signer: &SignerInfo<'_>,
    message: &[u8],
    digest: &[u8],
    signed: &SignedData<'_>,
    store: &SignatureStore<'_>,
) -> bool {
    if signer.digest_algorithm != oid::SHA256 {
        log::debug!("auth: signer uses unsupported digest");
        return false;
    }
    let Some(algorithm) = signer.signature_algorithm else {
        log::debug!("auth: signer uses unsupported signature algorithm");
        return false;
    };

    let signed_attrs;
    let covered: &[u8] = match &signer.signed_attributes {
        Some(attrs) => {
            if attrs.message_digest != Some(digest) {
                log::debug!("auth: messageDigest does not match payload");
                return false;
            }
            signed_attrs = attrs.signed_bytes();
            &signed_attrs
        }
        None => message,
    };

    signed
        .certificates
        .iter()
        .chain(store.certificates.iter())
        .filter(|cert| cert.matches_issuer_serial(signer.issuer, signer.serial))
        .any(|cert| {
            verify_signature(&cert.public_key, algorithm, covered, signer.signature)
                && chains_to_store(cert, &signed.certificates, store, MAX_CHAIN_DEPTH)
        })
}

/// `cert` is enrolled, issued by an enrolled certificate, or reaches one
/// through at most `depth` embedded intermediates.
fn chains_to_store(
    cert: &Certificate<'_>,
    embedded: &[Certificate<'_>],
    store: &SignatureStore<'_>,
    depth: usize,
) -> bool {
    if store.contains(cert) || store.certificates.iter().any(|anchor| cert.is_issued_by(anchor)) {
        return true;
    }
    if depth == 0 || cert.is_self_issued() {
        return false;
    }
    embedded
        .iter()
        .filter(|issuer| issuer.raw != cert.raw)
        .any(|issuer| {
            cert.is_issued_by(issuer) && chains_to_store(issuer, embedded, store, depth - 1)
        })
}
