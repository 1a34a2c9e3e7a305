//! VM-exit dispatch loop.
//!
//! Each iteration resumes the vCPU, blocks for the next exit and classifies it.
//! MMIO is reported and ignored, console writes are forwarded, HLT ends the
//! run successfully and everything else ends it with an error. No exit is
//! ever retried.

use log::{debug, info};

use crate::backend::{Registers, VirtualCpu, VmExit};
use crate::device::Serial;
use crate::error::{Error, Result};

/// Action to take after handling a VM exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// Continue running the vCPU.
    Continue,
    /// The guest halted; stop with the given registers.
    Stop(Registers),
}

/// Log `rip`/`rax` the way every exit report ends.
fn report_registers<C: VirtualCpu>(vcpu: &mut C) -> Result<Registers> {
    let regs = vcpu.registers()?;
    info!("now rip[0x{:x}]", regs.rip);
    info!("now eax[0x{:x}]", regs.rax);
    Ok(regs)
}

/// Little-endian value of up to eight data bytes, for reporting.
fn data_value(data: &[u8]) -> u64 {
    data.iter()
        .take(8)
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Classify one exit.
pub fn handle_exit<C: VirtualCpu>(
    vcpu: &mut C,
    exit: VmExit,
    console: &mut Serial,
) -> Result<ExitAction> {
    match exit {
        VmExit::Mmio {
            addr,
            data,
            is_write,
        } => {
            info!("KVM_EXIT_MMIO: phys_addr[0x{:x}]", addr);
            info!("KVM_EXIT_MMIO: data[{:x}]", data_value(&data));
            info!("KVM_EXIT_MMIO: len[{:x}]", data.len());
            info!("KVM_EXIT_MMIO: is_write[{:x}]", is_write as u8);
            report_registers(vcpu)?;
            Ok(ExitAction::Continue)
        }
        VmExit::Io {
            port,
            direction,
            size,
            count,
            data,
        } => {
            console.handle_io(port, direction, size, count, &data)?;
            Ok(ExitAction::Continue)
        }
        VmExit::Hlt => {
            info!("KVM_EXIT_HLT");
            let regs = report_registers(vcpu)?;
            Ok(ExitAction::Stop(regs))
        }
        // Fatal exits are reported once, by whoever receives the error.
        VmExit::FailEntry { reason, cpu } => Err(Error::FailEntry { reason, cpu }),
        VmExit::InternalError { suberror } => {
            report_registers(vcpu)?;
            Err(Error::InternalError { suberror })
        }
        VmExit::Other(reason) => Err(Error::UnhandledExit { reason }),
    }
}

/// Run the vCPU until the guest halts or an exit is fatal.
///
/// Returns the registers observed at the halt.
pub fn run_until_halt<C: VirtualCpu>(vcpu: &mut C, console: &mut Serial) -> Result<Registers> {
    let mut exits: u64 = 0;
    loop {
        let exit = vcpu.run()?;
        exits += 1;
        debug!("exit #{}: {:?}", exits, exit);

        if let ExitAction::Stop(regs) = handle_exit(vcpu, exit, console)? {
            return Ok(regs);
        }
    }
}
