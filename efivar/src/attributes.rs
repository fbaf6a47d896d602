//! Variable attribute bits

use bitflags::bitflags;

bitflags! {
    /// `EFI_VARIABLE_*` attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VarAttributes: u32 {
        const NON_VOLATILE = 0x0000_0001;
        const BOOTSERVICE_ACCESS = 0x0000_0002;
        const RUNTIME_ACCESS = 0x0000_0004;
        const HARDWARE_ERROR_RECORD = 0x0000_0008;
        /// Deprecated count-based authentication; always rejected.
        const AUTHENTICATED_WRITE_ACCESS = 0x0000_0010;
        const TIME_BASED_AUTHENTICATED_WRITE_ACCESS = 0x0000_0020;
        const APPEND_WRITE = 0x0000_0040;
        /// Firmware-internal; never accepted from callers.
        const READ_ONLY = 0x8000_0000;
    }
}

/// Attribute bits a caller may pass to `SetVariable`.
pub const EFI_VARIABLE_MASK: u32 = 0x0000_007f;

impl VarAttributes {
    /// Non-volatile, boot-service and runtime access.
    pub const NV_BS_RT: Self = Self::NON_VOLATILE
        .union(Self::BOOTSERVICE_ACCESS)
        .union(Self::RUNTIME_ACCESS);

    /// Boot-service and runtime access, read-only.
    pub const BS_RT_RO: Self = Self::BOOTSERVICE_ACCESS
        .union(Self::RUNTIME_ACCESS)
        .union(Self::READ_ONLY);

    /// Time-based authenticated, non-volatile, boot-service and runtime.
    pub const AUTHENTICATED_NV_BS_RT: Self =
        Self::NV_BS_RT.union(Self::TIME_BASED_AUTHENTICATED_WRITE_ACCESS);

    /// Runtime access requires boot-service access.
    pub const fn access_consistent(&self) -> bool {
        !self.contains(Self::RUNTIME_ACCESS) || self.contains(Self::BOOTSERVICE_ACCESS)
    }

    /// Equality with READ_ONLY ignored.
    pub fn same_ignoring_read_only(&self, other: Self) -> bool {
        self.difference(Self::READ_ONLY) == other.difference(Self::READ_ONLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_covers_caller_bits() {
        let caller = VarAttributes::all() - VarAttributes::READ_ONLY;
        assert_eq!(caller.bits(), EFI_VARIABLE_MASK);
        assert_ne!(VarAttributes::READ_ONLY.bits() & !EFI_VARIABLE_MASK, 0);
    }

    #[test]
    fn test_access_consistency() {
        assert!(VarAttributes::NV_BS_RT.access_consistent());
        assert!(VarAttributes::empty().access_consistent());
        assert!(!VarAttributes::RUNTIME_ACCESS.access_consistent());
    }

    #[test]
    fn test_read_only_ignored() {
        assert!(VarAttributes::BS_RT_RO.same_ignoring_read_only(
            VarAttributes::BOOTSERVICE_ACCESS | VarAttributes::RUNTIME_ACCESS
        ));
        assert!(!VarAttributes::NV_BS_RT.same_ignoring_read_only(VarAttributes::BS_RT_RO));
    }
}
