//! Linux KVM backend.
//!
//! Drives `/dev/kvm` through the rust-vmm `kvm-ioctls` crate.
//!
//! ## Requirements
//!
//! - Linux kernel with KVM support
//! - Access to /dev/kvm
//! - CPU with VT-x (Intel) or AMD-V (AMD)

mod vcpu;

use kvm_bindings::{kvm_run, kvm_userspace_memory_region};
use kvm_ioctls::{Kvm, VmFd};
use log::debug;

use crate::backend::Hypervisor;
use crate::error::{Error, Result};
use crate::memory::layout::KVM_API_VERSION;
use crate::memory::GuestMemoryRegion;

pub use vcpu::KvmVcpu;

/// Check if KVM is available on this system.
pub fn is_available() -> bool {
    std::path::Path::new("/dev/kvm").exists()
}

/// An open KVM machine context with at most one vCPU.
pub struct KvmHypervisor {
    kvm: Kvm,
    vm: VmFd,
    vcpu_created: bool,
}

impl KvmHypervisor {
    /// Open `/dev/kvm`, require the stable API and create an empty VM.
    pub fn new() -> Result<Self> {
        let kvm = Kvm::new().map_err(|e| Error::from_kvm("/dev/kvm", e))?;

        let version = kvm.get_api_version();
        if version != KVM_API_VERSION {
            return Err(Error::ApiVersion {
                found: version,
                expected: KVM_API_VERSION,
            });
        }

        let vm = kvm
            .create_vm()
            .map_err(|e| Error::from_kvm("KVM_CREATE_VM", e))?;

        Ok(Self {
            kvm,
            vm,
            vcpu_created: false,
        })
    }
}

impl Hypervisor for KvmHypervisor {
    type Vcpu = KvmVcpu;

    fn map_region(&mut self, region: &GuestMemoryRegion) -> Result<()> {
        if self.vcpu_created {
            return Err(Error::InvalidState {
                expected: "no vcpu".to_string(),
                actual: "vcpu created".to_string(),
            });
        }

        let mem_region = kvm_userspace_memory_region {
            slot: region.slot,
            guest_phys_addr: region.guest_addr,
            memory_size: region.size,
            userspace_addr: region.host_addr,
            flags: 0,
        };

        // Safety: the caller keeps the host backing alive and unmoved for as
        // long as this VM exists.
        unsafe { self.vm.set_user_memory_region(mem_region) }
            .map_err(|e| Error::from_kvm("KVM_SET_USER_MEMORY_REGION", e))
    }

    fn create_vcpu(&mut self) -> Result<KvmVcpu> {
        if self.vcpu_created {
            return Err(Error::InvalidState {
                expected: "no vcpu".to_string(),
                actual: "vcpu created".to_string(),
            });
        }

        let fd = self
            .vm
            .create_vcpu(0)
            .map_err(|e| Error::from_kvm("KVM_CREATE_VCPU", e))?;

        let size = self
            .kvm
            .get_vcpu_mmap_size()
            .map_err(|e| Error::from_kvm("KVM_GET_VCPU_MMAP_SIZE", e))?;
        let required = std::mem::size_of::<kvm_run>();
        if size < required {
            return Err(Error::RunStateTooSmall { size, required });
        }
        debug!("vcpu run state: {} bytes", size);

        self.vcpu_created = true;
        Ok(KvmVcpu::new(fd))
    }

    fn name(&self) -> &'static str {
        "kvm"
    }
}
