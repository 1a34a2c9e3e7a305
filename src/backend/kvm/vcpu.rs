//! KVM vCPU management.

use kvm_bindings::kvm_regs;
use kvm_ioctls::{VcpuExit, VcpuFd};

use crate::backend::{IoDirection, Registers, VirtualCpu, VmExit};
use crate::error::{Error, Result};

/// Exits whose detail has to be read from `kvm_run` after the exit borrow ends.
enum Pending {
    Io {
        port: u16,
        direction: IoDirection,
        data: Vec<u8>,
    },
    InternalError,
    Other,
}

/// The machine's single KVM vCPU.
pub struct KvmVcpu {
    fd: VcpuFd,
}

impl KvmVcpu {
    pub(crate) fn new(fd: VcpuFd) -> Self {
        Self { fd }
    }

    fn finish(&mut self, pending: Pending) -> VmExit {
        let run = self.fd.get_kvm_run();
        match pending {
            Pending::Io {
                port,
                direction,
                data,
            } => {
                // Safety: exit_reason was KVM_EXIT_IO, so `io` is the live member.
                let io = unsafe { run.__bindgen_anon_1.io };
                VmExit::Io {
                    port,
                    direction,
                    size: io.size,
                    count: io.count,
                    data,
                }
            }
            Pending::InternalError => {
                // Safety: exit_reason was KVM_EXIT_INTERNAL_ERROR.
                let suberror = unsafe { run.__bindgen_anon_1.internal.suberror };
                VmExit::InternalError { suberror }
            }
            Pending::Other => VmExit::Other(run.exit_reason),
        }
    }
}

impl VirtualCpu for KvmVcpu {
    fn run(&mut self) -> Result<VmExit> {
        let pending = match self.fd.run().map_err(|e| Error::from_kvm("KVM_RUN", e))? {
            VcpuExit::MmioRead(addr, data) => {
                return Ok(VmExit::Mmio {
                    addr,
                    data: data.to_vec(),
                    is_write: false,
                })
            }
            VcpuExit::MmioWrite(addr, data) => {
                return Ok(VmExit::Mmio {
                    addr,
                    data: data.to_vec(),
                    is_write: true,
                })
            }
            VcpuExit::Hlt => return Ok(VmExit::Hlt),
            VcpuExit::FailEntry(reason, cpu) => return Ok(VmExit::FailEntry { reason, cpu }),
            VcpuExit::IoOut(port, data) => Pending::Io {
                port,
                direction: IoDirection::Out,
                data: data.to_vec(),
            },
            VcpuExit::IoIn(port, data) => Pending::Io {
                port,
                direction: IoDirection::In,
                data: data.to_vec(),
            },
            VcpuExit::InternalError => Pending::InternalError,
            _ => Pending::Other,
        };

        Ok(self.finish(pending))
    }

    fn registers(&mut self) -> Result<Registers> {
        let regs = self
            .fd
            .get_regs()
            .map_err(|e| Error::from_kvm("KVM_GET_REGS", e))?;
        Ok(Registers {
            rip: regs.rip,
            rax: regs.rax,
            rflags: regs.rflags,
        })
    }

    fn set_entry_state(&mut self, rip: u64, rflags: u64) -> Result<()> {
        let mut sregs = self
            .fd
            .get_sregs()
            .map_err(|e| Error::from_kvm("KVM_GET_SREGS", e))?;
        sregs.cs.base = 0;
        sregs.cs.selector = 0;
        self.fd
            .set_sregs(&sregs)
            .map_err(|e| Error::from_kvm("KVM_SET_SREGS", e))?;

        let regs = kvm_regs {
            rip,
            rflags,
            ..Default::default()
        };
        self.fd
            .set_regs(&regs)
            .map_err(|e| Error::from_kvm("KVM_SET_REGS", e))
    }
}
