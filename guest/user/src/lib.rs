//! The unprivileged demonstration program.
//!
//! It only talks to the supervisor through two software interrupts: one that
//! prints the low byte of `eax` and one that halts the machine.

#![cfg_attr(not(test), no_std)]

/// `int` vector that prints one character.
pub const PUTC_VECTOR: u8 = 48;
/// `int` vector that halts.
pub const HALT_VECTOR: u8 = 49;

/// Calls into the supervisor.
pub trait Syscalls {
    fn putc(&mut self, byte: u8);
}

pub fn puts<S: Syscalls>(sys: &mut S, line: &str) {
    line.bytes().for_each(|b| sys.putc(b));
    sys.putc(b'\n');
}

/// The program body. `page2` lives on the image's second page, the one the
/// host leaves unbacked.
pub fn run<S: Syscalls>(sys: &mut S, page2: fn()) {
    puts(sys, "Here is user mode!!");
    puts(sys, "Let's call the function of PAGE2");
    page2();
    puts(sys, "user EXIT!");
}
