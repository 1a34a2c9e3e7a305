//! Bare-metal entry for the supervisor image.
//!
//! The boot stage jumps to physical 0x2000 in 32-bit protected mode with
//! paging off. `_start` installs the boot page directory, turns paging on,
//! moves to the high alias and calls [`boot::kern_main`].

#![cfg_attr(target_os = "none", no_std, no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod boot {
    use core::fmt::Write;
    use core::panic::PanicInfo;
    use core::ptr::{addr_of, addr_of_mut};

    use ringvm_supervisor::cpu::X86Cpu;
    use ringvm_supervisor::idt::EntryStubs;
    use ringvm_supervisor::kernel::{self, BootInfo, SupervisorTables};
    use ringvm_supervisor::mmu::{selector, vector, CR0_PE, CR0_PG, CR0_WP, KERNBASE};
    use ringvm_supervisor::paging::{kernel_virt_to_phys, BOOT_ALIAS_FLAGS, BOOT_IDENTITY_FLAGS};
    use ringvm_supervisor::trap::{self, Outcome, TrapFrame};
    use ringvm_supervisor::Console;

    const STACK_SIZE: usize = 8192;

    #[repr(C, align(16))]
    struct Stack([u8; STACK_SIZE]);

    static mut STACK: Stack = Stack([0; STACK_SIZE]);

    #[link_section = ".data.tables"]
    static mut TABLES: SupervisorTables = SupervisorTables::new();

    extern "C" {
        static __kernel_end: u8;
        static ringvm_trap_stubs: [u32; vector::HARDWARE_COUNT + 2];
    }

    core::arch::global_asm! {
        ".section .text.entry, \"ax\"",
        ".globl _start",
        "_start:",
        // physical address of the table block
        "mov edx, offset {tables}",
        "sub edx, {kernbase}",
        "lea eax, [edx + {low_table}]",
        "or eax, {identity_flags}",
        "mov [edx + {directory}], eax",
        "lea eax, [edx + {low_table}]",
        "or eax, {alias_flags}",
        "mov [edx + {directory} + {alias_slot} * 4], eax",
        "lea eax, [edx + {directory}]",
        "mov cr3, eax",
        "mov eax, cr0",
        "or eax, {cr0_bits}",
        "mov cr0, eax",
        "mov eax, offset .Lhigh",
        "jmp eax",
        ".Lhigh:",
        "lea esp, [{stack} + {stack_size}]",
        "call {kern_main}",
        ".Lparked:",
        "hlt",
        "jmp .Lparked",

        ".macro trap_stub vector, error_code",
        ".balign 16",
        "ringvm_trap_\\vector:",
        ".if \\error_code == 0",
        "push 0",
        ".endif",
        "push \\vector",
        "jmp ringvm_alltraps",
        ".endm",

        ".section .text.traps, \"ax\"",
        ".irp v, 0,1,2,3,4,5,6,7,9,15,16,18,19,48,49",
        "trap_stub \\v, 0",
        ".endr",
        ".irp v, 8,10,11,12,13,14,17",
        "trap_stub \\v, 1",
        ".endr",

        "ringvm_alltraps:",
        ".byte {push_ds}",
        ".byte {push_es}",
        "pushad",
        "mov ax, {kernel_data}",
        "mov ds, ax",
        "mov es, ax",
        "cld",
        "push esp",
        "call {trap}",

        ".section .rodata.traps, \"a\"",
        ".balign 4",
        ".globl ringvm_trap_stubs",
        "ringvm_trap_stubs:",
        ".irp v, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,48,49",
        ".long ringvm_trap_\\v",
        ".endr",
        ".text",

        tables = sym TABLES,
        kernbase = const KERNBASE,
        directory = const SupervisorTables::DIRECTORY_OFFSET,
        low_table = const SupervisorTables::LOW_TABLE_OFFSET,
        identity_flags = const BOOT_IDENTITY_FLAGS.bits(),
        alias_flags = const BOOT_ALIAS_FLAGS.bits(),
        alias_slot = const (KERNBASE >> 22),
        cr0_bits = const CR0_PE | CR0_PG | CR0_WP,
        stack = sym STACK,
        stack_size = const STACK_SIZE,
        kern_main = sym kern_main,
        kernel_data = const selector::KERNEL_DATA,
        push_ds = const trap::encoding::PUSH_DS,
        push_es = const trap::encoding::PUSH_ES,
        trap = sym trap_entry,
    }

    extern "C" fn kern_main() -> ! {
        let mut cpu = X86Cpu;
        let (tables, boot) = unsafe {
            let stack_top = addr_of!(STACK) as u32 + STACK_SIZE as u32;
            let boot = BootInfo {
                stubs: EntryStubs::from_table(&*addr_of!(ringvm_trap_stubs)),
                tables_phys: kernel_virt_to_phys(addr_of!(TABLES) as u32),
                stack_top,
                supervisor_end_phys: kernel_virt_to_phys(addr_of!(__kernel_end) as u32),
            };
            (&mut *addr_of_mut!(TABLES), boot)
        };

        let launch = kernel::init(tables, &mut cpu, &boot);
        unsafe { cpu.resume(&launch) }
    }

    extern "C" fn trap_entry(frame: *mut TrapFrame) -> ! {
        let mut cpu = X86Cpu;
        let outcome = trap::dispatch(unsafe { &*frame }, &mut cpu);
        match outcome {
            Outcome::Resume => unsafe { cpu.resume(frame) },
            Outcome::Halt => cpu.halt(),
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        let mut cpu = X86Cpu;
        let _ = writeln!(Console::new(&mut cpu), "{}", info);
        cpu.halt()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
