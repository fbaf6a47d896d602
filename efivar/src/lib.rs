//! Pre-OS EFI variable store.
//!
//! Keeps (name, vendor) → value variables in memory, persists the
//! non-volatile ones as a CRC-protected image and gates writes to the
//! secure-boot databases (PK, KEK, db, dbx) behind time-based authenticated
//! updates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ SharedVariableStore (spin::Mutex)            │
//! ├──────────────────────────────────────────────┤
//! │ VariableStore  get / set / enumerate / query │
//! │   secure-boot mode, MTC, platform defaults   │
//! ├──────────────────────┬───────────────────────┤
//! │ auth::AuthGate       │ image (encode/decode) │
//! │  envelope, pkcs7,    ├───────────────────────┤
//! │  x509, sigdb, verify │ PersistentStorage     │
//! │                      │  Memory | Smc<M>      │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut store = VariableStore::init(StoreConfig::default(), storage)?;
//! store.init_platform_defaults("en-US")?;
//! store.set_variable(&VarName::from("BootOrder"), &EFI_GLOBAL_VARIABLE, attrs, &order)?;
//! let (attrs, len) = store.get_variable(&name, &vendor, &mut buf)?;
//! store.exit_boot_services();
//! ```

#![no_std]

extern crate alloc;

pub mod attributes;
pub mod auth;
pub mod config;
pub mod entry;
pub mod error;
pub mod guid;
pub mod image;
pub mod name;
pub mod secure;
pub mod shared;
pub mod storage;
pub mod store;

pub use attributes::{VarAttributes, EFI_VARIABLE_MASK};
pub use auth::{AuthGate, Authenticated, TrustAnchors};
pub use config::StoreConfig;
pub use entry::VarEntry;
pub use error::{AuthError, ImageError, Result, VarError};
pub use guid::{Guid, EFI_GLOBAL_VARIABLE, EFI_IMAGE_SECURITY_DATABASE};
pub use name::VarName;
pub use secure::{AuthVarClass, SecureBootMode};
pub use shared::SharedVariableStore;
pub use storage::{MemoryStorage, PersistentStorage, SecureMonitor, SmcStorage};
pub use store::{AccessCheck, StorageInfo, VariableStore};
