//! Trap frames and the trap dispatcher.

use core::mem::{offset_of, size_of};

use crate::console::Console;
use crate::cpu::Cpu;
use crate::mmu::{selector, vector, FL_IF};

/// General registers in `pushad` order, lowest address first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct PushRegs {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Ignored by `popad`.
    pub oesp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

/// Saved context as laid out on the supervisor stack by the entry stubs and
/// the CPU.
///
/// The last two fields are only meaningful when the trap came from ring 3.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    pub regs: PushRegs,
    pub es: u16,
    _pad0: u16,
    pub ds: u16,
    _pad1: u16,
    pub trapno: u32,
    pub err: u32,
    pub eip: u32,
    pub cs: u16,
    _pad2: u16,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u16,
    _pad3: u16,
}

/// Opcodes the entry and exit paths emit to save and restore `ds`/`es`.
///
/// These are the 32-bit forms. The Intel-syntax `push ds` mnemonic
/// assembles to `66 1e`, which moves two bytes and skews the frame.
pub mod encoding {
    pub const PUSH_DS: u8 = 0x1e;
    pub const PUSH_ES: u8 = 0x06;
    pub const POP_ES: u8 = 0x07;
    pub const POP_DS: u8 = 0x1f;
}

/// Bytes moved by one segment push or pop: four unless the operand-size
/// prefix is present.
pub const fn segment_slot_width(instruction: &[u8]) -> usize {
    if instruction[0] == 0x66 {
        2
    } else {
        4
    }
}

// Layout produced by: CPU (ss, esp, eflags, cs, eip), stub (err, trapno),
// alltraps (ds, es, pushad).
const _: () = {
    assert!(size_of::<TrapFrame>() == 68);
    assert!(offset_of!(TrapFrame, es) == size_of::<PushRegs>());
    assert!(
        offset_of!(TrapFrame, ds)
            == offset_of!(TrapFrame, es) + segment_slot_width(&[encoding::PUSH_ES])
    );
    assert!(
        offset_of!(TrapFrame, trapno)
            == offset_of!(TrapFrame, ds) + segment_slot_width(&[encoding::PUSH_DS])
    );
    assert!(offset_of!(TrapFrame, err) == 44);
    assert!(offset_of!(TrapFrame, eip) == 48);
    assert!(offset_of!(TrapFrame, esp) == 60);
};

impl TrapFrame {
    /// Frame that enters ring 3 at `eip` on the stack ending at `esp`, with
    /// interrupts enabled.
    pub fn user_entry(eip: u32, esp: u32) -> Self {
        let data = selector::USER_DATA | selector::RPL_USER;
        Self {
            es: data,
            ds: data,
            eip,
            cs: selector::USER_CODE | selector::RPL_USER,
            eflags: FL_IF,
            esp,
            ss: data,
            ..Self::default()
        }
    }

    /// Whether the interrupted code ran in ring 3.
    pub fn from_user(&self) -> bool {
        self.cs & selector::RPL_MASK == selector::RPL_USER
    }
}

/// Human-readable name of an architectural vector.
pub fn trap_name(trapno: u32) -> &'static str {
    const NAMES: [&str; vector::HARDWARE_COUNT] = [
        "Divide error",
        "Debug",
        "Non-Maskable Interrupt",
        "Breakpoint",
        "Overflow",
        "BOUND Range Exceeded",
        "Invalid Opcode",
        "Device Not Available",
        "Double Fault",
        "Coprocessor Segment Overrun",
        "Invalid TSS",
        "Segment Not Present",
        "Stack Fault",
        "General Protection",
        "Page Fault",
        "(unknown trap)",
        "x87 FPU Floating-Point Error",
        "Alignment Check",
        "Machine-Check",
        "SIMD Floating-Point Exception",
    ];

    NAMES.get(trapno as usize).copied().unwrap_or("(unknown trap)")
}

/// What to do with the frame once the dispatcher is done with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Restore the frame unchanged.
    Resume,
    /// Stop the vCPU.
    Halt,
}

/// Handle one trap.
///
/// The two software calls are served; every other vector is reported and
/// ends the run.
pub fn dispatch<C: Cpu>(frame: &TrapFrame, cpu: &mut C) -> Outcome {
    match frame.trapno {
        vector::SYSCALL_PUTC => {
            cpu.console_out(frame.regs.eax as u8);
            Outcome::Resume
        }
        vector::SYSCALL_HALT => Outcome::Halt,
        trapno => {
            let mut console = Console::new(cpu);
            if frame.from_user() {
                console.puts("trap from user mode occurs!");
            } else {
                console.puts("trap occurs!");
            }
            console.puts(trap_name(trapno));
            Outcome::Halt
        }
    }
}
