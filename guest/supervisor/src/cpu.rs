//! Privileged operations.
//!
//! Everything that touches control registers, descriptor-table registers,
//! segment registers or I/O ports goes through [`Cpu`], so the table and trap
//! logic above it stays plain Rust.

use crate::gdt::DescriptorTablePointer;

pub trait Cpu {
    /// `lidt` then `lgdt`.
    fn load_descriptor_tables(
        &mut self,
        gdt: &DescriptorTablePointer,
        idt: &DescriptorTablePointer,
    );

    /// Reload CS/DS/ES/SS with supervisor selectors, park FS/GS on the user
    /// data segment and clear the LDT.
    fn reload_segment_registers(&mut self);

    /// `ltr`.
    fn load_task_register(&mut self, selector: u16);

    /// Write CR3.
    fn load_page_directory(&mut self, directory_phys: u32);

    /// `invlpg` for one linear address.
    fn invalidate_translation(&mut self, va: u32);

    /// Send one byte to the host console port.
    fn console_out(&mut self, byte: u8);
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use x86::X86Cpu;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod x86 {
    use core::arch::asm;

    use super::Cpu;
    use crate::gdt::DescriptorTablePointer;
    use crate::mmu::selector;
    use crate::trap::TrapFrame;

    /// Port the host forwards to its console.
    const CONSOLE_PORT: u16 = 0x3f8;

    /// The processor this code runs on.
    pub struct X86Cpu;

    impl X86Cpu {
        /// Stop for good. The host sees a halt exit.
        pub fn halt(&mut self) -> ! {
            loop {
                unsafe { asm!("hlt", options(nomem, nostack)) };
            }
        }

        /// Restore `frame` and return into it with `iretd`.
        ///
        /// # Safety
        ///
        /// `frame` must describe a valid context; its memory becomes the
        /// stack the restore sequence pops from.
        pub unsafe fn resume(&mut self, frame: *const TrapFrame) -> ! {
            asm!(
                "mov esp, {0}",
                "popad",
                ".byte {pop_es}",
                ".byte {pop_ds}",
                // trap number and error code
                "add esp, 8",
                "iretd",
                in(reg) frame,
                pop_es = const crate::trap::encoding::POP_ES,
                pop_ds = const crate::trap::encoding::POP_DS,
                options(noreturn),
            )
        }
    }

    impl Cpu for X86Cpu {
        fn load_descriptor_tables(
            &mut self,
            gdt: &DescriptorTablePointer,
            idt: &DescriptorTablePointer,
        ) {
            unsafe {
                asm!(
                    "lidt [{0}]",
                    in(reg) idt as *const DescriptorTablePointer,
                    options(readonly, nostack, preserves_flags),
                );
                asm!(
                    "lgdt [{0}]",
                    in(reg) gdt as *const DescriptorTablePointer,
                    options(readonly, nostack, preserves_flags),
                );
            }
        }

        fn reload_segment_registers(&mut self) {
            unsafe {
                asm!(
                    "mov gs, {user:x}",
                    "mov fs, {user:x}",
                    "mov es, {kdata:x}",
                    "mov ds, {kdata:x}",
                    "mov ss, {kdata:x}",
                    "push {kcode}",
                    "lea {tmp}, [3f]",
                    "push {tmp}",
                    "retf",
                    "3:",
                    "xor {tmp}, {tmp}",
                    "lldt {tmp:x}",
                    user = in(reg) (selector::USER_DATA | selector::RPL_USER) as u32,
                    kdata = in(reg) selector::KERNEL_DATA as u32,
                    kcode = const selector::KERNEL_CODE as u32,
                    tmp = out(reg) _,
                );
            }
        }

        fn load_task_register(&mut self, selector: u16) {
            unsafe {
                asm!("ltr {0:x}", in(reg) selector, options(nomem, nostack, preserves_flags));
            }
        }

        fn load_page_directory(&mut self, directory_phys: u32) {
            unsafe {
                asm!("mov cr3, {0}", in(reg) directory_phys, options(nostack, preserves_flags));
            }
        }

        fn invalidate_translation(&mut self, va: u32) {
            unsafe { asm!("invlpg [{0}]", in(reg) va, options(nostack, preserves_flags)) };
        }

        fn console_out(&mut self, byte: u8) {
            unsafe {
                asm!(
                    "out dx, al",
                    in("dx") CONSOLE_PORT,
                    in("al") byte,
                    options(nomem, nostack, preserves_flags),
                )
            };
        }
    }
}
