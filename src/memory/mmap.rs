//! Host backing for guest images.

use super::page_align_up;
use crate::error::{Error, Result};

/// Page-aligned, zero-filled host memory holding one guest image.
///
/// The allocation is rounded up to whole guest frames so the tail of the last
/// page reads as zero inside the guest.
pub struct GuestMemory {
    /// Pointer to the allocated memory
    ptr: *mut u8,
    /// Size of the allocation in bytes
    size: usize,
}

// Safety: the mapping is owned exclusively and only reached through &self/&mut self.
unsafe impl Send for GuestMemory {}

impl GuestMemory {
    /// Allocate a new zeroed region of at least `size` bytes.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::MemoryAllocationFailed(
                "cannot back an empty image".to_string(),
            ));
        }

        let aligned_size = page_align_up(size as u64) as usize;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                aligned_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(Error::MemoryAllocationFailed(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size: aligned_size,
        })
    }

    /// Allocate backing for `image` and copy it in.
    pub fn from_image(image: &[u8]) -> Result<Self> {
        let mut memory = Self::new(image.len())?;
        memory.write(0, image)?;
        Ok(memory)
    }

    /// Host address of the first byte, as handed to the hypervisor.
    pub fn host_addr(&self) -> u64 {
        self.ptr as u64
    }

    /// Backing size, a whole number of pages.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The whole backing, tail padding included.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    /// Read bytes at `offset`.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        if offset + buf.len() > self.size {
            return Err(Error::InvalidGuestAddress((offset + buf.len()) as u64));
        }
        buf.copy_from_slice(&self.as_slice()[offset..offset + buf.len()]);
        Ok(())
    }

    /// Write bytes at `offset`.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        if offset + data.len() > self.size {
            return Err(Error::InvalidGuestAddress((offset + data.len()) as u64));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
        }

        Ok(())
    }
}

impl Drop for GuestMemory {
    fn drop(&mut self) {
        unsafe {
            if !self.ptr.is_null() {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::is_page_aligned;

    #[test]
    fn test_guest_memory_allocation() {
        let mem = GuestMemory::new(100).unwrap();
        assert_eq!(mem.size(), 4096);
        assert!(is_page_aligned(mem.host_addr()));
        assert!(mem.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_guest_memory_zero_size() {
        assert!(matches!(
            GuestMemory::new(0),
            Err(Error::MemoryAllocationFailed(_))
        ));
    }

    #[test]
    fn test_image_is_copied_and_padded() {
        let image: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let mem = GuestMemory::from_image(&image).unwrap();
        assert_eq!(mem.size(), 8192);

        let mut head = [0u8; 4];
        mem.read(0, &mut head).unwrap();
        assert_eq!(head, [0, 1, 2, 3]);

        let mut tail = [0xffu8; 16];
        mem.read(5000, &mut tail).unwrap();
        assert_eq!(tail, [0u8; 16]);
    }

    #[test]
    fn test_out_of_bounds_access() {
        let mut mem = GuestMemory::new(4096).unwrap();
        assert!(mem.write(4095, &[1, 2]).is_err());
        let mut buf = [0u8; 8];
        assert!(mem.read(4092, &mut buf).is_err());
    }
}
