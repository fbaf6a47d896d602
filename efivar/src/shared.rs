//! Lock-protected store for callers that may run concurrently.

use spin::{Mutex, MutexGuard};

use crate::attributes::VarAttributes;
use crate::error::Result;
use crate::guid::Guid;
use crate::name::VarName;
use crate::storage::PersistentStorage;
use crate::store::{StorageInfo, VariableStore};

/// [`VariableStore`] behind a spin lock.
///
/// Each call holds the lock across lookup, validation, mutation and flush, so
/// two writers never interleave.
pub struct SharedVariableStore<S: PersistentStorage> {
    inner: Mutex<VariableStore<S>>,
}

impl<S: PersistentStorage> SharedVariableStore<S> {
    pub const fn new(store: VariableStore<S>) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    /// Hold the lock for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, VariableStore<S>> {
        self.inner.lock()
    }

    pub fn get_variable(
        &self,
        name: &VarName,
        vendor: &Guid,
        buf: &mut [u8],
    ) -> Result<(VarAttributes, usize)> {
        self.inner.lock().get_variable(name, vendor, buf)
    }

    pub fn get_next_variable_name(
        &self,
        previous: Option<(&VarName, &Guid)>,
    ) -> Result<(VarName, Guid)> {
        self.inner.lock().get_next_variable_name(previous)
    }

    pub fn set_variable(
        &self,
        name: &VarName,
        vendor: &Guid,
        attributes: u32,
        value: &[u8],
    ) -> Result<()> {
        self.inner.lock().set_variable(name, vendor, attributes, value)
    }

    pub fn query_info(&self, attributes: u32) -> Result<StorageInfo> {
        self.inner.lock().query_info(attributes)
    }

    pub fn exit_boot_services(&self) {
        self.inner.lock().exit_boot_services()
    }

    pub fn into_inner(self) -> VariableStore<S> {
        self.inner.into_inner()
    }
}
