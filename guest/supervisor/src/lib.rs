//! Ring-0 supervisor for a ringvm guest.
//!
//! The table builders, the paging code and the trap dispatcher are plain
//! Rust over the [`cpu::Cpu`] trait so they can be tested on the host. The
//! bare-metal binary in `main.rs` supplies the entry stub, the trap stubs and
//! the real CPU.

#![cfg_attr(not(test), no_std)]

pub mod console;
pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod kernel;
pub mod mmu;
pub mod paging;
pub mod trap;

pub use console::Console;
pub use cpu::Cpu;
pub use kernel::{BootInfo, SupervisorTables};
pub use trap::{Outcome, TrapFrame};
