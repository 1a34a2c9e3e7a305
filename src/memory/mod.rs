//! Guest physical memory layout.
//!
//! The guest sees a flat run of 4 KiB frames starting at [`layout::GUEST_BASE`],
//! filled image by image, page by page. Each frame is its own KVM memory slot.

mod guest;
mod mmap;

pub use guest::{plan_regions, GuestMemoryRegion, HolePage};
pub use mmap::GuestMemory;

/// Fixed guest layout and entry state.
pub mod layout {
    /// Size of one guest frame and of every registered region.
    pub const PAGE_SIZE: u64 = 0x1000;

    /// First guest physical address used for images (frame 0 is left to the real-mode IVT).
    pub const GUEST_BASE: u64 = 0x1000;

    /// Initial instruction pointer: first page of the boot-stage image.
    pub const ENTRY_RIP: u64 = 0x1000;

    /// Initial flags: only the reserved bit 1, interrupts disabled.
    pub const ENTRY_RFLAGS: u64 = 0x2;

    /// The one port the guest may write console bytes to.
    pub const CONSOLE_PORT: u16 = 0x3f8;

    /// Index of the unprivileged program among the loaded images.
    pub const USER_IMAGE_INDEX: usize = 2;

    /// Page of the unprivileged image that is left unregistered.
    pub const USER_HOLE_PAGE: usize = 1;

    /// The only KVM API version the controller accepts.
    pub const KVM_API_VERSION: i32 = 12;
}

/// Round `value` up to the next multiple of [`layout::PAGE_SIZE`].
pub const fn page_align_up(value: u64) -> u64 {
    (value + layout::PAGE_SIZE - 1) & !(layout::PAGE_SIZE - 1)
}

/// Whether `value` sits on a frame boundary.
pub const fn is_page_aligned(value: u64) -> bool {
    value & (layout::PAGE_SIZE - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_align_up() {
        assert_eq!(page_align_up(0), 0);
        assert_eq!(page_align_up(1), 0x1000);
        assert_eq!(page_align_up(0x1000), 0x1000);
        assert_eq!(page_align_up(0x1001), 0x2000);
    }

    #[test]
    fn test_entry_point_is_first_image_frame() {
        assert_eq!(layout::ENTRY_RIP, layout::GUEST_BASE);
        assert!(is_page_aligned(layout::GUEST_BASE));
    }
}
