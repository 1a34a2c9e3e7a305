//! Guest images.
//!
//! The controller loads three flat binaries in a fixed order: the boot stage,
//! the supervisor and the unprivileged program. Their contents are opaque.

mod embedded {
    include!(concat!(env!("OUT_DIR"), "/images.rs"));
}

/// One opaque guest binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestImage {
    /// Name used in progress and error messages.
    pub name: &'static str,
    pub bytes: &'static [u8],
}

impl GuestImage {
    pub const fn new(name: &'static str, bytes: &'static [u8]) -> Self {
        Self { name, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The boot stage, supervisor and user images built into this binary.
pub fn embedded_images() -> [GuestImage; 3] {
    [
        GuestImage::new("bios", embedded::BIOS_IMAGE),
        GuestImage::new("kernel", embedded::KERNEL_IMAGE),
        GuestImage::new("user", embedded::USER_IMAGE),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_image_order() {
        let names: Vec<_> = embedded_images().iter().map(|i| i.name).collect();
        assert_eq!(names, ["bios", "kernel", "user"]);
    }
}
