//! Hypervisor backend abstraction.
//!
//! This module defines the traits the controller drives a hypervisor through,
//! the backend-neutral exit record, and the logic to select the platform backend.

use crate::error::Result;
use crate::memory::GuestMemoryRegion;

#[cfg(target_os = "linux")]
pub mod kvm;

/// Direction of a port I/O access, seen from the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    In,
    Out,
}

impl IoDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoDirection::In => "in",
            IoDirection::Out => "out",
        }
    }
}

/// One VM exit, copied out of the shared run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmExit {
    /// Access to an unbacked guest physical address.
    Mmio {
        addr: u64,
        data: Vec<u8>,
        is_write: bool,
    },
    /// Port I/O. `data` holds `size * count` bytes.
    Io {
        port: u16,
        direction: IoDirection,
        size: u8,
        count: u32,
        data: Vec<u8>,
    },
    /// Guest executed HLT.
    Hlt,
    /// The hardware refused to enter the guest.
    FailEntry { reason: u64, cpu: u32 },
    /// The hypervisor could not emulate or deliver something (e.g. a triple fault).
    InternalError { suberror: u32 },
    /// Any exit reason the controller does not classify.
    Other(u32),
}

/// General registers reported on halt and on faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub rip: u64,
    pub rax: u64,
    pub rflags: u64,
}

/// A single virtual CPU.
pub trait VirtualCpu {
    /// Resume the guest and block until the next exit.
    fn run(&mut self) -> Result<VmExit>;

    /// Read the general registers.
    fn registers(&mut self) -> Result<Registers>;

    /// Put the vCPU in its entry state: CS base and selector zero, then `rip`/`rflags`.
    fn set_entry_state(&mut self, rip: u64, rflags: u64) -> Result<()>;
}

/// A machine context that guest memory is registered with.
pub trait Hypervisor {
    type Vcpu: VirtualCpu;

    /// Register one guest-physical to host mapping. Must precede [`Hypervisor::create_vcpu`].
    fn map_region(&mut self, region: &GuestMemoryRegion) -> Result<()>;

    /// Create the machine's only vCPU.
    fn create_vcpu(&mut self) -> Result<Self::Vcpu>;

    /// Get the backend name (e.g. "kvm").
    fn name(&self) -> &'static str;
}

/// Check if the hypervisor is available on this platform.
pub fn is_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        kvm::is_available()
    }

    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Get the name of the backend for this platform.
pub fn name() -> Option<&'static str> {
    #[cfg(target_os = "linux")]
    {
        Some("kvm")
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Open the platform hypervisor.
#[cfg(target_os = "linux")]
pub fn create() -> Result<kvm::KvmHypervisor> {
    kvm::KvmHypervisor::new()
}
