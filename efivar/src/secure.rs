//! Secure-boot variable classes and mode

use crate::guid::{Guid, EFI_GLOBAL_VARIABLE, EFI_IMAGE_SECURITY_DATABASE};
use crate::name::VarName;

/// Platform key
pub const PK: &str = "PK";
/// Key exchange key database
pub const KEK: &str = "KEK";
/// Allowed signature database
pub const DB: &str = "db";
/// Forbidden signature database
pub const DBX: &str = "dbx";

pub const SECURE_BOOT: &str = "SecureBoot";
pub const SETUP_MODE: &str = "SetupMode";
pub const AUDIT_MODE: &str = "AuditMode";
pub const DEPLOYED_MODE: &str = "DeployedMode";

/// Variables written only through the authentication gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVarClass {
    None,
    Pk,
    Kek,
    Db,
    Dbx,
}

impl AuthVarClass {
    pub fn classify(name: &VarName, vendor: &Guid) -> Self {
        if *vendor == EFI_GLOBAL_VARIABLE {
            if name.eq_str(PK) {
                return Self::Pk;
            }
            if name.eq_str(KEK) {
                return Self::Kek;
            }
        } else if *vendor == EFI_IMAGE_SECURITY_DATABASE {
            if name.eq_str(DB) {
                return Self::Db;
            }
            if name.eq_str(DBX) {
                return Self::Dbx;
            }
        }
        Self::None
    }

    pub const fn is_protected(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Secure-boot mode derived from the presence of PK.
///
/// ```text
///        PK written
///  Setup ─────────▶ User
///    ▲               │
///    └───────────────┘
///        PK deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureBootMode {
    /// No platform key: authenticated writes are not verified.
    Setup,
    /// Platform key enrolled: signatures enforced.
    User,
}

impl SecureBootMode {
    pub const fn enforcing(&self) -> bool {
        matches!(self, Self::User)
    }

    /// Values of SecureBoot, SetupMode, AuditMode, DeployedMode.
    pub const fn state_bytes(&self) -> [(&'static str, u8); 4] {
        let user = self.enforcing() as u8;
        [
            (SECURE_BOOT, user),
            (SETUP_MODE, 1 - user),
            (AUDIT_MODE, 0),
            (DEPLOYED_MODE, 0),
        ]
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::User => "user",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let pk = VarName::from("PK");
        assert_eq!(AuthVarClass::classify(&pk, &EFI_GLOBAL_VARIABLE), AuthVarClass::Pk);
        assert_eq!(
            AuthVarClass::classify(&pk, &EFI_IMAGE_SECURITY_DATABASE),
            AuthVarClass::None
        );
        assert_eq!(
            AuthVarClass::classify(&VarName::from("dbx"), &EFI_IMAGE_SECURITY_DATABASE),
            AuthVarClass::Dbx
        );
        assert!(!AuthVarClass::classify(&VarName::from("db"), &EFI_GLOBAL_VARIABLE).is_protected());
    }

    #[test]
    fn test_state_bytes() {
        assert_eq!(SecureBootMode::User.state_bytes()[0], ("SecureBoot", 1));
        assert_eq!(SecureBootMode::User.state_bytes()[1], ("SetupMode", 0));
        assert_eq!(SecureBootMode::Setup.state_bytes()[1], ("SetupMode", 1));
        assert!(!SecureBootMode::Setup.enforcing());
    }
}
