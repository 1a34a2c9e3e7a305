//! RingVm core implementation.

use log::info;

use crate::backend::{Hypervisor, Registers, VirtualCpu};
use crate::builder::VmConfig;
use crate::device::Serial;
use crate::error::{Error, Result};
use crate::memory::{plan_regions, GuestMemory, GuestMemoryRegion};
use crate::runner;

/// The state of a RingVm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    /// Memory is registered and the vCPU sits at its entry point.
    Created,
    /// The dispatch loop is running.
    Running,
    /// The guest executed HLT.
    Halted,
    /// A fatal exit or backend error ended the run.
    Failed,
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmState::Created => write!(f, "created"),
            VmState::Running => write!(f, "running"),
            VmState::Halted => write!(f, "halted"),
            VmState::Failed => write!(f, "failed"),
        }
    }
}

/// A single-vCPU virtual machine running the loaded images.
///
/// Use [`VmBuilder`](crate::VmBuilder) to create one.
pub struct RingVm<H: Hypervisor> {
    // Field order is drop order: the vCPU and VM go before their backing memory.
    vcpu: H::Vcpu,
    hypervisor: H,
    regions: Vec<GuestMemoryRegion>,
    memory: Vec<GuestMemory>,
    state: VmState,
    console_port: u16,
}

impl<H: Hypervisor> RingVm<H> {
    /// Copy the images into host memory, register every planned region, then
    /// create the vCPU and put it at the entry point.
    pub(crate) fn new(mut hypervisor: H, config: VmConfig) -> Result<Self> {
        let memory = config
            .images
            .iter()
            .map(|image| GuestMemory::from_image(image.bytes))
            .collect::<Result<Vec<_>>>()?;

        let backings: Vec<(u64, u64)> = config
            .images
            .iter()
            .zip(&memory)
            .map(|(image, mem)| (mem.host_addr(), image.len() as u64))
            .collect();
        let regions = plan_regions(&backings, config.guest_base, config.hole)?;

        for region in &regions {
            info!(
                "Set map ONE page:Guest PA[0x{:x}]->Host VA[0x{:x}]",
                region.guest_addr, region.host_addr
            );
            hypervisor.map_region(region)?;
        }

        let mut vcpu = hypervisor.create_vcpu()?;
        vcpu.set_entry_state(config.entry_rip, config.entry_rflags)?;

        Ok(Self {
            vcpu,
            hypervisor,
            regions,
            memory,
            state: VmState::Created,
            console_port: config.console_port,
        })
    }

    /// Get the current state of the VM.
    pub fn state(&self) -> VmState {
        self.state
    }

    /// The regions registered with the hypervisor, in slot order.
    pub fn regions(&self) -> &[GuestMemoryRegion] {
        &self.regions
    }

    /// Host copies of the loaded images.
    pub fn memory(&self) -> &[GuestMemory] {
        &self.memory
    }

    pub fn backend_name(&self) -> &'static str {
        self.hypervisor.name()
    }

    pub fn console_port(&self) -> u16 {
        self.console_port
    }

    /// Run the guest until it halts.
    ///
    /// `console` must listen on [`RingVm::console_port`]. Any fatal exit
    /// leaves the VM in [`VmState::Failed`].
    pub fn run(&mut self, console: &mut Serial) -> Result<Registers> {
        if self.state != VmState::Created {
            return Err(Error::InvalidState {
                expected: VmState::Created.to_string(),
                actual: self.state.to_string(),
            });
        }

        self.state = VmState::Running;
        match runner::run_until_halt(&mut self.vcpu, console) {
            Ok(regs) => {
                self.state = VmState::Halted;
                Ok(regs)
            }
            Err(e) => {
                self.state = VmState::Failed;
                Err(e)
            }
        }
    }
}
