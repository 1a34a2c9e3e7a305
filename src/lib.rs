//! # ringvm
//!
//! Boots a 32-bit x86 guest supervisor under KVM and services its console.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ringvm::{device::Serial, Result, VmBuilder};
//!
//! fn main() -> Result<()> {
//!     let mut vm = VmBuilder::new().embedded_images().build()?;
//!     let mut console = Serial::new().on_port(vm.console_port());
//!     vm.run(&mut console)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Guest memory
//!
//! The boot stage, supervisor and user images are laid out page by page from
//! guest physical 0x1000, one KVM slot per page. The second page of the user
//! image is left unregistered.
//!
//! ## Platform Support
//!
//! - **Linux**: KVM

mod builder;
mod error;
mod vm;
pub mod runner;

pub mod backend;
pub mod device;
pub mod loader;
pub mod memory;

// Re-exports
pub use backend::{Hypervisor, IoDirection, Registers, VirtualCpu, VmExit};
pub use builder::{VmBuilder, VmConfig};
pub use error::{Error, Result};
pub use vm::{RingVm, VmState};

/// Check if the current platform supports hardware virtualization.
///
/// Returns `true` if the hypervisor is available and can be used.
pub fn is_supported() -> bool {
    backend::is_available()
}

/// Get the name of the hypervisor backend for the current platform.
///
/// Returns `None` if no backend is available.
pub fn backend_name() -> Option<&'static str> {
    backend::name()
}
