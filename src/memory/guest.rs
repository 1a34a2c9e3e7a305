//! Guest memory region abstraction and the page-by-page region planner.

use super::{is_page_aligned, layout::PAGE_SIZE};
use crate::error::{Error, Result};

/// One registered 4 KiB window of guest physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestMemoryRegion {
    /// KVM memory slot.
    pub slot: u32,
    /// Guest physical address
    pub guest_addr: u64,
    /// Host virtual address backing the region
    pub host_addr: u64,
    /// Size in bytes
    pub size: u64,
}

impl GuestMemoryRegion {
    /// Check if a guest address falls within this region.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.guest_addr && addr < self.guest_addr + self.size
    }

    /// Get the offset of an address within this region.
    pub fn offset(&self, addr: u64) -> Option<u64> {
        if self.contains(addr) {
            Some(addr - self.guest_addr)
        } else {
            None
        }
    }

    /// First guest address past the region.
    pub fn end(&self) -> u64 {
        self.guest_addr + self.size
    }
}

/// A page of one image that is deliberately not registered.
///
/// The page still consumes a slot number and a guest frame, so the frames that
/// follow keep the addresses they would have had without the hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolePage {
    pub image: usize,
    pub page: usize,
}

/// Lay out page-aligned host buffers as consecutive guest frames.
///
/// `backings` holds `(host address, length)` for each image in load order.
/// Every image occupies `ceil(length / 4096)` frames starting where the
/// previous image ended.
pub fn plan_regions(
    backings: &[(u64, u64)],
    guest_base: u64,
    hole: Option<HolePage>,
) -> Result<Vec<GuestMemoryRegion>> {
    if !is_page_aligned(guest_base) {
        return Err(Error::InvalidLayout(format!(
            "guest base 0x{:x} is not page aligned",
            guest_base
        )));
    }

    let mut regions = Vec::new();
    let mut slot = 0u32;
    let mut guest_addr = guest_base;

    for (image, &(host_base, len)) in backings.iter().enumerate() {
        if !is_page_aligned(host_base) {
            return Err(Error::InvalidLayout(format!(
                "host buffer 0x{:x} of image {} is not page aligned",
                host_base, image
            )));
        }

        let pages = len.div_ceil(PAGE_SIZE);
        for page in 0..pages {
            let skipped = hole == Some(HolePage { image, page: page as usize });
            if !skipped {
                regions.push(GuestMemoryRegion {
                    slot,
                    guest_addr,
                    host_addr: host_base + page * PAGE_SIZE,
                    size: PAGE_SIZE,
                });
            }
            slot += 1;
            guest_addr = guest_addr
                .checked_add(PAGE_SIZE)
                .ok_or(Error::InvalidGuestAddress(guest_addr))?;
        }
    }

    Ok(regions)
}
