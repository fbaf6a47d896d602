//! Variable entries

use alloc::vec::Vec;

use crate::attributes::VarAttributes;
use crate::guid::Guid;
use crate::image::ENTRY_HEADER_SIZE;
use crate::name::VarName;

/// One variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarEntry {
    pub name: VarName,
    pub vendor: Guid,
    pub attributes: VarAttributes,
    /// Seconds since the Unix epoch; only meaningful for authenticated variables.
    pub time: u64,
    pub data: Vec<u8>,
}

impl VarEntry {
    pub fn matches(&self, name: &VarName, vendor: &Guid) -> bool {
        self.vendor == *vendor && self.name == *name
    }

    pub fn is_non_volatile(&self) -> bool {
        self.attributes.contains(VarAttributes::NON_VOLATILE)
    }

    /// Visible after exit-boot-services.
    pub fn is_runtime(&self) -> bool {
        self.attributes.contains(VarAttributes::RUNTIME_ACCESS)
    }

    /// Bytes this entry occupies in the variable buffer (8-byte aligned).
    pub fn stored_size(&self) -> usize {
        stored_size(&self.name, self.data.len())
    }
}

/// Stored size of an entry with `name` and `data_len` bytes of data.
pub fn stored_size(name: &VarName, data_len: usize) -> usize {
    align8(ENTRY_HEADER_SIZE + name.encoded_size() + data_len)
}

pub const fn align8(n: usize) -> usize {
    (n + 7) & !7
}
