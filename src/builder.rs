//! VM builder for configuring and creating a [`RingVm`].

use crate::backend::Hypervisor;
use crate::error::{Error, Result};
use crate::loader::{embedded_images, GuestImage};
use crate::memory::layout::{
    CONSOLE_PORT, ENTRY_RFLAGS, ENTRY_RIP, GUEST_BASE, PAGE_SIZE, USER_HOLE_PAGE, USER_IMAGE_INDEX,
};
use crate::memory::{is_page_aligned, HolePage};
use crate::vm::RingVm;

/// Validated configuration a [`RingVm`] is created from.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Images in load order.
    pub images: Vec<GuestImage>,
    pub guest_base: u64,
    /// Page left unregistered, if any.
    pub hole: Option<HolePage>,
    pub console_port: u16,
    pub entry_rip: u64,
    pub entry_rflags: u64,
}

/// Builder for creating a [`RingVm`].
///
/// # Example
///
/// ```rust,no_run
/// use ringvm::{device::Serial, VmBuilder};
///
/// let mut vm = VmBuilder::new().embedded_images().build()?;
/// let regs = vm.run(&mut Serial::new().on_port(vm.console_port()))?;
/// # Ok::<(), ringvm::Error>(())
/// ```
#[derive(Default)]
pub struct VmBuilder {
    images: Vec<GuestImage>,
    guest_base: Option<u64>,
    hole: Option<HolePage>,
    no_hole: bool,
    console_port: Option<u16>,
    entry_rip: Option<u64>,
    entry_rflags: Option<u64>,
}

impl VmBuilder {
    /// Create a new VM builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an image to the load order.
    pub fn image(mut self, image: GuestImage) -> Self {
        self.images.push(image);
        self
    }

    /// Load the boot stage, supervisor and user images built into the binary.
    pub fn embedded_images(mut self) -> Self {
        self.images.extend(embedded_images());
        self
    }

    /// Set the guest physical address of the first image.
    ///
    /// Default: 0x1000
    pub fn guest_base(mut self, addr: u64) -> Self {
        self.guest_base = Some(addr);
        self
    }

    /// Leave `page` of image `image` unregistered.
    ///
    /// Default: the second page of the third image.
    pub fn hole(mut self, image: usize, page: usize) -> Self {
        self.hole = Some(HolePage { image, page });
        self.no_hole = false;
        self
    }

    /// Register every page of every image.
    pub fn no_hole(mut self) -> Self {
        self.hole = None;
        self.no_hole = true;
        self
    }

    /// Set the console port.
    ///
    /// Default: 0x3f8
    pub fn console_port(mut self, port: u16) -> Self {
        self.console_port = Some(port);
        self
    }

    /// Set the initial instruction pointer and flags.
    ///
    /// Default: rip 0x1000, rflags 0x2
    pub fn entry(mut self, rip: u64, rflags: u64) -> Self {
        self.entry_rip = Some(rip);
        self.entry_rflags = Some(rflags);
        self
    }

    /// Validate the configuration without touching any hypervisor.
    pub fn config(self) -> Result<VmConfig> {
        if self.images.is_empty() {
            return Err(Error::InvalidLayout("no guest images".to_string()));
        }
        if let Some(image) = self.images.iter().find(|i| i.is_empty()) {
            return Err(Error::MissingImage(image.name));
        }

        let guest_base = self.guest_base.unwrap_or(GUEST_BASE);
        if !is_page_aligned(guest_base) {
            return Err(Error::InvalidLayout(format!(
                "guest base 0x{:x} is not page aligned",
                guest_base
            )));
        }

        let hole = if self.no_hole {
            None
        } else {
            let hole = self.hole.unwrap_or(HolePage {
                image: USER_IMAGE_INDEX,
                page: USER_HOLE_PAGE,
            });
            let image = self.images.get(hole.image).ok_or_else(|| {
                Error::InvalidLayout(format!("hole refers to missing image {}", hole.image))
            })?;
            let pages = (image.len() as u64).div_ceil(PAGE_SIZE);
            if hole.page as u64 >= pages {
                return Err(Error::InvalidLayout(format!(
                    "hole page {} is past the end of image `{}` ({} pages)",
                    hole.page, image.name, pages
                )));
            }
            Some(hole)
        };

        Ok(VmConfig {
            images: self.images,
            guest_base,
            hole,
            console_port: self.console_port.unwrap_or(CONSOLE_PORT),
            entry_rip: self.entry_rip.unwrap_or(ENTRY_RIP),
            entry_rflags: self.entry_rflags.unwrap_or(ENTRY_RFLAGS),
        })
    }

    /// Build the VM on the given hypervisor.
    pub fn build_with<H: Hypervisor>(self, hypervisor: H) -> Result<RingVm<H>> {
        let config = self.config()?;
        RingVm::new(hypervisor, config)
    }

    /// Build the VM on the platform hypervisor.
    ///
    /// The configuration is validated before `/dev/kvm` is opened.
    #[cfg(target_os = "linux")]
    pub fn build(self) -> Result<RingVm<crate::backend::kvm::KvmHypervisor>> {
        let config = self.config()?;
        RingVm::new(crate::backend::create()?, config)
    }
}
