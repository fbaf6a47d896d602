//! Variable store configuration

/// Variable buffer size: header plus every entry, volatile or not.
pub const EFI_VAR_BUF_SIZE: usize = 0x4000;

/// Default language list for `PlatformLangCodes`.
pub const DEFAULT_LANG_CODES: &str = "en-US";

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Capacity of the variable buffer in bytes.
    pub buffer_size: usize,
    /// Authenticated variables and the secure-boot state variables.
    pub secure_boot_supported: bool,
    /// Image linked into the firmware, loaded before persisted storage.
    pub preseed: Option<&'static [u8]>,
    /// Secure-boot databases come only from the preseed and cannot be
    /// changed at runtime.
    pub preseed_locks_auth: bool,
}

impl StoreConfig {
    pub const fn new() -> Self {
        Self {
            buffer_size: EFI_VAR_BUF_SIZE,
            secure_boot_supported: true,
            preseed: None,
            preseed_locks_auth: false,
        }
    }

    pub const fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub const fn with_secure_boot(mut self, supported: bool) -> Self {
        self.secure_boot_supported = supported;
        self
    }

    /// Preseed image; `locks_auth` freezes the secure-boot databases.
    pub const fn with_preseed(mut self, image: &'static [u8], locks_auth: bool) -> Self {
        self.preseed = Some(image);
        self.preseed_locks_auth = locks_auth;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.buffer_size, 0x4000);
        assert!(config.secure_boot_supported);
        assert!(config.preseed.is_none());
        assert!(!config.preseed_locks_auth);
    }

    #[test]
    fn test_builder() {
        static SEED: [u8; 4] = [0; 4];
        let config = StoreConfig::new()
            .with_buffer_size(0x1000)
            .with_secure_boot(false)
            .with_preseed(&SEED, true);
        assert_eq!(config.buffer_size, 0x1000);
        assert!(!config.secure_boot_supported);
        assert_eq!(config.preseed.map(<[u8]>::len), Some(4));
        assert!(config.preseed_locks_auth);
    }
}
