//! In-memory variable table with persistence and the authenticated-write rules.
//!
//! # Write path
//!
//! ```text
//! set_variable ──▶ set ──▶ validate ──▶ AuthGate (TIME_BASED_AUTH only)
//!                            │
//!                            ▼
//!                  apply (delete / append / replace)
//!                            │
//!              PK? ──▶ re-evaluate secure-boot state
//!                            │
//!               NV or delete ──▶ encode image ──▶ PersistentStorage::store
//! ```
//!
//! Entries live in a single table in insertion order; a replaced or
//! appended entry moves to the end. The table's stored size (header plus
//! every entry, volatile or not) never exceeds the configured buffer.

use alloc::vec::Vec;

use crate::attributes::{VarAttributes, EFI_VARIABLE_MASK};
use crate::auth::{AuthGate, TrustAnchors};
use crate::config::StoreConfig;
use crate::entry::{stored_size, VarEntry};
use crate::error::{Result, VarError};
use crate::guid::{Guid, EFI_CERT_SHA256, EFI_CERT_X509, EFI_GLOBAL_VARIABLE, GUID_SIZE};
use crate::image::{self, ENTRY_HEADER_SIZE, IMAGE_HEADER_SIZE};
use crate::name::VarName;
use crate::secure::{self, AuthVarClass, SecureBootMode};
use crate::storage::PersistentStorage;

/// Monotonic boot counter, bumped on every `init`.
pub const MONOTONIC_COUNTER: &str = "MTC";

pub const PLATFORM_LANG_CODES: &str = "PlatformLangCodes";
pub const PLATFORM_LANG: &str = "PlatformLang";
pub const SIGNATURE_SUPPORT: &str = "SignatureSupport";
pub const OS_INDICATIONS_SUPPORTED: &str = "OsIndicationsSupported";

/// Whether READ_ONLY is honoured for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCheck {
    /// Callers outside firmware: READ_ONLY entries cannot change.
    Enforced,
    /// Firmware-internal writers that own read-only variables.
    Firmware,
}

/// Answer to `QueryVariableInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub max_storage: usize,
    pub remaining_storage: usize,
    pub max_variable_size: usize,
}

pub struct VariableStore<S: PersistentStorage> {
    config: StoreConfig,
    storage: S,
    entries: Vec<VarEntry>,
    mode: SecureBootMode,
    runtime: bool,
}

impl<S: PersistentStorage> VariableStore<S> {
    /// Build the store: preseed image, persisted image, boot counter, then
    /// the secure-boot state.
    ///
    /// A missing or corrupt persisted image is logged and ignored.
    pub fn init(config: StoreConfig, storage: S) -> Result<Self> {
        if config.buffer_size < IMAGE_HEADER_SIZE + ENTRY_HEADER_SIZE {
            log::error!("efivar: buffer of {} bytes cannot hold a variable", config.buffer_size);
            return Err(VarError::InvalidParameter);
        }

        let mut store = Self {
            config,
            storage,
            entries: Vec::new(),
            mode: SecureBootMode::Setup,
            runtime: false,
        };

        if let Some(preseed) = config.preseed {
            match image::decode(preseed) {
                Ok(entries) => store.restore(entries, false),
                Err(e) => log::error!("efivar: preseed image rejected: {}", e),
            }
        }

        match store.storage.load() {
            Ok(Some(buf)) => match image::decode(&buf) {
                Ok(entries) => store.restore(entries, true),
                Err(e) => log::warn!("efivar: persisted image rejected: {}", e),
            },
            Ok(None) => log::info!("efivar: no persisted variables"),
            Err(e) => log::warn!("efivar: persisted image unreadable: {}", e),
        }

        store.bump_monotonic_counter();
        store.update_secure_state();

        log::info!(
            "efivar: {} variables, {}/{} bytes, {} mode",
            store.entries.len(),
            store.used(),
            store.config.buffer_size,
            store.mode.name()
        );
        Ok(store)
    }

    // ========================================================================
    // READ
    // ========================================================================

    /// Look up an entry regardless of phase.
    pub fn get(&self, name: &VarName, vendor: &Guid) -> Option<&VarEntry> {
        self.entries.iter().find(|e| e.matches(name, vendor))
    }

    /// `GetVariable`: copy the value into `buf`.
    ///
    /// # Returns
    /// - `Ok((attributes, size))`: Value copied
    /// - `Err(BufferTooSmall(size))`: `buf` shorter than the value
    /// - `Err(NotFound)`: No such variable visible in this phase
    pub fn get_variable(
        &self,
        name: &VarName,
        vendor: &Guid,
        buf: &mut [u8],
    ) -> Result<(VarAttributes, usize)> {
        if name.is_empty() {
            return Err(VarError::InvalidParameter);
        }
        let entry = self
            .visible()
            .find(|e| e.matches(name, vendor))
            .ok_or(VarError::NotFound)?;

        let size = entry.data.len();
        if buf.len() < size {
            return Err(VarError::BufferTooSmall(size));
        }
        buf[..size].copy_from_slice(&entry.data);
        Ok((entry.attributes, size))
    }

    /// `GetNextVariableName`: the entry after `previous` in table order, or
    /// the first entry for `None`.
    pub fn get_next_variable_name(
        &self,
        previous: Option<(&VarName, &Guid)>,
    ) -> Result<(VarName, Guid)> {
        let mut visible = self.visible();
        if let Some((name, vendor)) = previous {
            if !visible.any(|e| e.matches(name, vendor)) {
                return Err(VarError::InvalidParameter);
            }
        }
        visible
            .next()
            .map(|e| (e.name.clone(), e.vendor))
            .ok_or(VarError::NotFound)
    }

    /// `QueryVariableInfo`. Only available before exit-boot-services.
    pub fn query_info(&self, attributes: u32) -> Result<StorageInfo> {
        if self.runtime {
            return Err(VarError::Unsupported);
        }
        if attributes & !EFI_VARIABLE_MASK != 0 {
            return Err(VarError::InvalidParameter);
        }
        let buffer = self.config.buffer_size;
        Ok(StorageInfo {
            max_storage: buffer - IMAGE_HEADER_SIZE,
            remaining_storage: buffer.saturating_sub(self.used() + ENTRY_HEADER_SIZE),
            max_variable_size: buffer - IMAGE_HEADER_SIZE - ENTRY_HEADER_SIZE,
        })
    }

    fn visible(&self) -> impl Iterator<Item = &VarEntry> {
        let runtime = self.runtime;
        self.entries.iter().filter(move |e| !runtime || e.is_runtime())
    }

    // ========================================================================
    // WRITE
    // ========================================================================

    /// `SetVariable` as seen by callers: only the caller-settable attribute
    /// bits are accepted and READ_ONLY is enforced.
    pub fn set_variable(
        &mut self,
        name: &VarName,
        vendor: &Guid,
        attributes: u32,
        value: &[u8],
    ) -> Result<()> {
        if attributes & !EFI_VARIABLE_MASK != 0 {
            return Err(VarError::InvalidParameter);
        }
        self.set(
            name,
            vendor,
            VarAttributes::from_bits_retain(attributes),
            value,
            AccessCheck::Enforced,
        )
    }

    /// Create, replace, append to or delete a variable.
    ///
    /// A write with an empty value or no attributes deletes. For
    /// TIME_BASED_AUTHENTICATED writes `value` is the authentication envelope
    /// and an empty payload inside it deletes.
    ///
    /// If persisting fails the in-memory change stays and `DeviceError` is
    /// returned.
    pub fn set(
        &mut self,
        name: &VarName,
        vendor: &Guid,
        attributes: VarAttributes,
        value: &[u8],
        access: AccessCheck,
    ) -> Result<()> {
        if name.is_empty() || !attributes.access_consistent() {
            return Err(VarError::InvalidParameter);
        }

        let append = attributes.contains(VarAttributes::APPEND_WRITE);
        let attributes = attributes - VarAttributes::APPEND_WRITE;
        let mut delete = !append && (value.is_empty() || attributes.is_empty());
        let class = AuthVarClass::classify(name, vendor);

        let index = self.entries.iter().position(|e| e.matches(name, vendor));
        let mut time = 0;
        match index {
            Some(i) => {
                let existing = &self.entries[i];
                if access == AccessCheck::Enforced
                    && existing.attributes.contains(VarAttributes::READ_ONLY)
                {
                    return Err(VarError::WriteProtected);
                }
                if self.config.preseed_locks_auth && class.is_protected() {
                    return Err(VarError::WriteProtected);
                }
                if !delete {
                    let same = match access {
                        AccessCheck::Enforced => existing.attributes == attributes,
                        AccessCheck::Firmware => {
                            existing.attributes.same_ignoring_read_only(attributes)
                        }
                    };
                    if !same {
                        return Err(VarError::InvalidParameter);
                    }
                }
                time = existing.time;
            }
            None if delete || append => return Err(VarError::NotFound),
            None => {}
        }

        if class.is_protected()
            && !attributes.contains(VarAttributes::TIME_BASED_AUTHENTICATED_WRITE_ACCESS)
        {
            return Err(VarError::InvalidParameter);
        }

        let mut payload = value;
        let auth_bits = VarAttributes::AUTHENTICATED_WRITE_ACCESS
            | VarAttributes::TIME_BASED_AUTHENTICATED_WRITE_ACCESS;
        if attributes.intersects(auth_bits) {
            if !self.config.secure_boot_supported
                || attributes.contains(VarAttributes::AUTHENTICATED_WRITE_ACCESS)
            {
                return Err(VarError::InvalidParameter);
            }
            let gate = AuthGate::new(self.trust_anchors(), self.mode.enforcing());
            let auth = gate
                .authenticate(name, vendor, attributes, value, time)
                .map_err(|e| {
                    log::warn!("efivar: authenticated write to {} rejected: {}", name, e);
                    VarError::SecurityViolation(e)
                })?;
            payload = auth.payload;
            time = if append { time.max(auth.time) } else { auth.time };
            if payload.is_empty() {
                if append {
                    return Ok(());
                }
                if index.is_none() {
                    return Err(VarError::NotFound);
                }
                delete = true;
            }
        }

        if delete {
            if let Some(i) = index {
                self.entries.remove(i);
            }
            log::debug!("efivar: deleted {}", name);
        } else {
            let data = match index {
                Some(i) if append => {
                    let mut data = self.entries[i].data.clone();
                    data.extend_from_slice(payload);
                    data
                }
                _ => payload.to_vec(),
            };

            let old_size = index.map_or(0, |i| self.entries[i].stored_size());
            let needed = self.used() - old_size + stored_size(name, data.len());
            if needed > self.config.buffer_size {
                log::warn!(
                    "efivar: no room for {} ({} of {} bytes)",
                    name,
                    needed,
                    self.config.buffer_size
                );
                return Err(VarError::OutOfResources);
            }

            if let Some(i) = index {
                self.entries.remove(i);
            }
            log::debug!("efivar: set {} ({} bytes, {:#x})", name, data.len(), attributes.bits());
            self.entries.push(VarEntry {
                name: name.clone(),
                vendor: *vendor,
                attributes,
                time,
                data,
            });
        }

        if class == AuthVarClass::Pk {
            self.update_secure_state();
        }

        if attributes.contains(VarAttributes::NON_VOLATILE) || delete {
            self.persist()?;
        }
        Ok(())
    }

    /// Enter the runtime phase: only RUNTIME_ACCESS variables stay visible.
    pub fn exit_boot_services(&mut self) {
        self.runtime = true;
        log::info!("efivar: runtime phase");
    }

    /// Publish the platform variables firmware owns.
    ///
    /// # Arguments
    ///
    /// * `lang_codes` - `;`-separated RFC 4646 codes; the first becomes
    ///   `PlatformLang` when none is stored
    pub fn init_platform_defaults(&mut self, lang_codes: &str) -> Result<()> {
        let global = EFI_GLOBAL_VARIABLE;

        let mut codes = Vec::from(lang_codes.as_bytes());
        codes.push(0);
        self.set(
            &VarName::from(PLATFORM_LANG_CODES),
            &global,
            VarAttributes::BS_RT_RO,
            &codes,
            AccessCheck::Firmware,
        )?;

        let lang_name = VarName::from(PLATFORM_LANG);
        if self.get(&lang_name, &global).is_none() {
            let first = lang_codes.split(';').next().unwrap_or_default();
            let mut lang = Vec::from(first.as_bytes());
            lang.push(0);
            self.set(&lang_name, &global, VarAttributes::NV_BS_RT, &lang, AccessCheck::Firmware)?;
        }

        if self.config.secure_boot_supported {
            let mut support = Vec::with_capacity(2 * GUID_SIZE);
            support.extend_from_slice(&EFI_CERT_SHA256.to_bytes());
            support.extend_from_slice(&EFI_CERT_X509.to_bytes());
            self.set(
                &VarName::from(SIGNATURE_SUPPORT),
                &global,
                VarAttributes::BS_RT_RO,
                &support,
                AccessCheck::Firmware,
            )?;
        }

        self.set(
            &VarName::from(OS_INDICATIONS_SUPPORTED),
            &global,
            VarAttributes::BS_RT_RO,
            &0u64.to_le_bytes(),
            AccessCheck::Firmware,
        )
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn secure_boot_mode(&self) -> SecureBootMode {
        self.mode
    }

    pub fn is_runtime(&self) -> bool {
        self.runtime
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Entries in table order, including boot-service-only ones.
    pub fn entries(&self) -> &[VarEntry] {
        &self.entries
    }

    /// Bytes of the variable buffer in use.
    pub fn used(&self) -> usize {
        IMAGE_HEADER_SIZE + self.entries.iter().map(VarEntry::stored_size).sum::<usize>()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn trust_anchors(&self) -> TrustAnchors<'_> {
        let data = move |name: &str| {
            self.get(&VarName::from(name), &EFI_GLOBAL_VARIABLE)
                .map(|e| e.data.as_slice())
        };
        TrustAnchors {
            pk: data(secure::PK),
            kek: data(secure::KEK),
        }
    }

    /// Derive the mode from PK and publish the state variables.
    fn update_secure_state(&mut self) {
        if !self.config.secure_boot_supported {
            return;
        }

        let mode = if self.get(&VarName::from(secure::PK), &EFI_GLOBAL_VARIABLE).is_some() {
            SecureBootMode::User
        } else {
            SecureBootMode::Setup
        };
        if mode != self.mode {
            log::info!("efivar: secure boot {} -> {}", self.mode.name(), mode.name());
        }
        self.mode = mode;

        for (name, value) in mode.state_bytes() {
            if let Err(e) = self.set(
                &VarName::from(name),
                &EFI_GLOBAL_VARIABLE,
                VarAttributes::BS_RT_RO,
                &[value],
                AccessCheck::Firmware,
            ) {
                log::error!("efivar: cannot publish {}: {}", name, e);
            }
        }
    }

    fn bump_monotonic_counter(&mut self) {
        let name = VarName::from(MONOTONIC_COUNTER);
        let count = self
            .get(&name, &EFI_GLOBAL_VARIABLE)
            .and_then(|e| <[u8; 4]>::try_from(e.data.as_slice()).ok())
            .map_or(0, u32::from_le_bytes)
            .wrapping_add(1);

        if let Err(e) = self.set(
            &name,
            &EFI_GLOBAL_VARIABLE,
            VarAttributes::NV_BS_RT,
            &count.to_le_bytes(),
            AccessCheck::Firmware,
        ) {
            log::error!("efivar: cannot update {}: {}", MONOTONIC_COUNTER, e);
        }
    }

    /// Add restored entries that are not already present.
    fn restore(&mut self, entries: Vec<VarEntry>, persisted: bool) {
        let source = if persisted { "persisted" } else { "preseed" };
        let mut restored = 0;

        for entry in entries {
            if entry.data.is_empty() || self.get(&entry.name, &entry.vendor).is_some() {
                continue;
            }
            if persisted
                && self.config.preseed_locks_auth
                && AuthVarClass::classify(&entry.name, &entry.vendor).is_protected()
            {
                log::warn!("efivar: ignoring {} {} (locked by preseed)", source, entry.name);
                continue;
            }
            if self.used() + entry.stored_size() > self.config.buffer_size {
                log::warn!("efivar: {} image exceeds variable buffer, truncated", source);
                break;
            }
            self.entries.push(entry);
            restored += 1;
        }

        log::debug!("efivar: restored {} {} variables", restored, source);
    }

    fn persist(&mut self) -> Result<()> {
        let image = image::encode(&self.entries);
        self.storage.store(&image).map_err(|e| {
            log::error!("efivar: flushing {} bytes failed: {}", image.len(), e);
            VarError::DeviceError
        })
    }
}
