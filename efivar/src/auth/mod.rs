//! Authenticated-update gate for secure-boot variables.
//!
//! Writes to PK, KEK, db and dbx carry an `EFI_VARIABLE_AUTHENTICATION_2`
//! envelope. Outside setup mode the envelope must hold a PKCS#7 signature
//! over
//!
//! ```text
//! name (UTF-16LE, no NUL) ‖ vendor GUID ‖ attributes (u32 LE) ‖ EFI_TIME ‖ payload
//! ```
//!
//! made by a certificate that chains to the trust store for the variable:
//!
//! | Variable | Primary store | Fallback |
//! |----------|---------------|----------|
//! | PK, KEK  | PK            | -        |
//! | db, dbx  | KEK           | PK       |

pub mod der;
pub mod envelope;
pub mod pkcs7;
pub mod sigdb;
pub mod time;
pub mod verify;
pub mod x509;

use crate::attributes::VarAttributes;
use crate::error::AuthError;
use crate::guid::Guid;
use crate::name::VarName;
use crate::secure::AuthVarClass;

use envelope::{signed_data_der, AuthEnvelope};
use pkcs7::SignedData;
use sigdb::SignatureStore;

/// Current contents of the trust-store variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustAnchors<'a> {
    pub pk: Option<&'a [u8]>,
    pub kek: Option<&'a [u8]>,
}

/// Result of a successful gate pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authenticated<'v> {
    /// New variable value with the envelope stripped.
    pub payload: &'v [u8],
    /// Envelope timestamp in Unix seconds.
    pub time: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthGate<'a> {
    anchors: TrustAnchors<'a>,
    enforcing: bool,
}

impl<'a> AuthGate<'a> {
    /// `enforcing` is false in setup mode: envelopes are parsed but not verified.
    pub const fn new(anchors: TrustAnchors<'a>, enforcing: bool) -> Self {
        Self { anchors, enforcing }
    }

    pub const fn enforcing(&self) -> bool {
        self.enforcing
    }

    /// Check an authenticated write.
    ///
    /// # Arguments
    ///
    /// * `attributes` - attributes of the write; APPEND_WRITE is excluded from the digest
    /// * `envelope` - caller data: envelope followed by the new value
    /// * `stored_time` - timestamp of the existing variable, 0 if none
    ///
    /// # Returns
    ///
    /// The payload and the envelope time on success.
    pub fn authenticate<'v>(
        &self,
        name: &VarName,
        vendor: &Guid,
        attributes: VarAttributes,
        envelope: &'v [u8],
        stored_time: u64,
    ) -> Result<Authenticated<'v>, AuthError> {
        let env = AuthEnvelope::parse(envelope)?;
        let time = env.timestamp.unix_seconds();
        let authenticated = Authenticated {
            payload: env.payload,
            time,
        };

        if !self.enforcing {
            return Ok(authenticated);
        }
        if time <= stored_time {
            log::warn!("auth: {} update not newer than stored ({} <= {})", name, time, stored_time);
            return Err(AuthError::Stale);
        }

        let (primary, fallback) = match AuthVarClass::classify(name, vendor) {
            AuthVarClass::Pk | AuthVarClass::Kek => (self.anchors.pk, None),
            AuthVarClass::Db | AuthVarClass::Dbx => (self.anchors.kek, self.anchors.pk),
            AuthVarClass::None => return Err(AuthError::UnsupportedVariable),
        };

        let der = signed_data_der(env.cert_data)?;
        let signed = SignedData::parse(&der)?;

        let name_bytes = name.to_le_bytes();
        let vendor_bytes = vendor.to_bytes();
        let attr_bytes = (attributes - VarAttributes::APPEND_WRITE).bits().to_le_bytes();
        let regions: [&[u8]; 5] = [
            &name_bytes,
            &vendor_bytes,
            &attr_bytes,
            env.time_bytes,
            env.payload,
        ];

        let mut any_store = false;
        for data in [primary, fallback].into_iter().flatten() {
            // An unreadable store is treated as missing.
            let store = match SignatureStore::parse(data) {
                Ok(store) => store,
                Err(_) => {
                    log::warn!("auth: trust store for {} is corrupt", name);
                    continue;
                }
            };
            any_store = true;
            if verify::verify_signed_data(&regions, &signed, &store) {
                log::info!("auth: {} update verified", name);
                return Ok(authenticated);
            }
        }

        if !any_store {
            log::warn!("auth: no trust store for {}", name);
            return Err(AuthError::NoTrustStore);
        }
        log::warn!("auth: {} update signature rejected", name);
        Err(AuthError::VerificationFailed)
    }
}
