//! Persistent storage backends for the variable image

use alloc::vec::Vec;

use crate::error::{Result, VarError};
use crate::image::{self, IMAGE_HEADER_SIZE};

/// Where the non-volatile image lives between boots.
pub trait PersistentStorage {
    /// Read the stored image.
    ///
    /// # Returns
    /// - `Ok(Some(image))`: Image bytes (not yet validated)
    /// - `Ok(None)`: Nothing stored
    /// - `Err(DeviceError)`: Storage unreadable
    fn load(&mut self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored image.
    fn store(&mut self, image: &[u8]) -> Result<()>;
}

// ============================================================================
// MEMORY
// ============================================================================

/// Image kept in RAM. Used when no flash backend exists, and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    image: Option<Vec<u8>>,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `image` already stored.
    pub fn with_image(image: Vec<u8>) -> Self {
        Self {
            image: Some(image),
            writes: 0,
        }
    }

    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    /// Number of successful `store` calls.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl PersistentStorage for MemoryStorage {
    fn load(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.image.clone())
    }

    fn store(&mut self, image: &[u8]) -> Result<()> {
        self.image = Some(image.to_vec());
        self.writes += 1;
        Ok(())
    }
}

// ============================================================================
// SECURE MONITOR
// ============================================================================

/// Secure-monitor calls that back the variable image with flash.
///
/// The monitor pre-loads the image into a shared window at boot and writes
/// the window back to flash on request.
pub trait SecureMonitor {
    /// Bus address and size of the shared window.
    fn shared_memory(&mut self) -> Result<(u64, usize)>;

    /// Commit `size` bytes at `addr` to flash.
    fn write_efi_var(&mut self, addr: u64, size: usize) -> Result<()>;
}

/// Storage through the secure monitor's shared window.
pub struct SmcStorage<M: SecureMonitor> {
    monitor: M,
    addr: u64,
    window: *mut u8,
    size: usize,
}

// SAFETY: the window is exclusively owned per `SmcStorage::new`'s contract.
unsafe impl<M: SecureMonitor + Send> Send for SmcStorage<M> {}

impl<M: SecureMonitor> SmcStorage<M> {
    /// Query the shared window and wrap it.
    ///
    /// # Safety
    /// The window reported by the monitor must be identity mapped, valid for
    /// reads and writes of its full size, and not accessed by anything else
    /// while this storage exists.
    pub unsafe fn new(mut monitor: M) -> Result<Self> {
        let (addr, size) = monitor.shared_memory()?;
        if addr == 0 || size < IMAGE_HEADER_SIZE {
            log::error!("efivar: bad shared window {:#x}+{:#x}", addr, size);
            return Err(VarError::DeviceError);
        }
        log::debug!("efivar: shared window {:#x}+{:#x}", addr, size);
        Ok(Self {
            monitor,
            addr,
            window: addr as *mut u8,
            size,
        })
    }

    pub fn window_size(&self) -> usize {
        self.size
    }

    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    fn window(&self) -> &[u8] {
        // SAFETY: guaranteed by `new`'s contract.
        unsafe { core::slice::from_raw_parts(self.window, self.size) }
    }

    fn window_mut(&mut self) -> &mut [u8] {
        // SAFETY: guaranteed by `new`'s contract; &mut self is exclusive.
        unsafe { core::slice::from_raw_parts_mut(self.window, self.size) }
    }
}

impl<M: SecureMonitor> PersistentStorage for SmcStorage<M> {
    fn load(&mut self) -> Result<Option<Vec<u8>>> {
        // An unformatted window (no magic) simply holds no image.
        match image::check_header(self.window()) {
            Ok(length) => Ok(Some(self.window()[..length].to_vec())),
            Err(err) => {
                log::debug!("efivar: shared window holds no image: {}", err);
                Ok(None)
            }
        }
    }

    fn store(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.size {
            log::error!("efivar: image {} bytes exceeds window {}", image.len(), self.size);
            return Err(VarError::DeviceError);
        }
        self.window_mut()[..image.len()].copy_from_slice(image);
        self.monitor.write_efi_var(self.addr, image.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec;

    struct FakeMonitor {
        window: &'static mut [u8],
        commits: Vec<(u64, usize)>,
    }

    impl SecureMonitor for FakeMonitor {
        fn shared_memory(&mut self) -> Result<(u64, usize)> {
            Ok((self.window.as_mut_ptr() as u64, self.window.len()))
        }

        fn write_efi_var(&mut self, addr: u64, size: usize) -> Result<()> {
            self.commits.push((addr, size));
            Ok(())
        }
    }

    fn monitor(size: usize) -> FakeMonitor {
        FakeMonitor {
            window: Box::leak(vec![0u8; size].into_boxed_slice()),
            commits: Vec::new(),
        }
    }

    #[test]
    fn test_memory_storage() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.load(), Ok(None));
        storage.store(&[1, 2, 3]).unwrap();
        assert_eq!(storage.load(), Ok(Some(vec![1, 2, 3])));
        assert_eq!(storage.writes(), 1);
    }

    #[test]
    fn test_smc_blank_window_is_empty() {
        let mut storage = unsafe { SmcStorage::new(monitor(0x1000)) }.unwrap();
        assert_eq!(storage.load(), Ok(None));
    }

    #[test]
    fn test_smc_store_then_load() {
        let mut storage = unsafe { SmcStorage::new(monitor(0x1000)) }.unwrap();
        let image = image::encode(&[] as &[crate::entry::VarEntry]);
        storage.store(&image).unwrap();
        assert_eq!(storage.load(), Ok(Some(image.clone())));
        assert_eq!(storage.monitor().commits.len(), 1);
        assert_eq!(storage.monitor().commits[0].1, image.len());
    }

    #[test]
    fn test_smc_rejects_oversized_image() {
        let mut storage = unsafe { SmcStorage::new(monitor(32)) }.unwrap();
        assert_eq!(storage.store(&[0u8; 33]), Err(VarError::DeviceError));
        assert!(storage.monitor().commits.is_empty());
    }

    #[test]
    fn test_smc_rejects_tiny_window() {
        assert_eq!(
            unsafe { SmcStorage::new(monitor(8)) }.err(),
            Some(VarError::DeviceError)
        );
    }
}
