//! Interrupt descriptor table.

use core::mem::size_of;

use crate::gdt::{system_type, DescriptorTablePointer};
use crate::mmu::{selector, vector};

/// One 8-byte interrupt or trap gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct GateDescriptor(u64);

impl GateDescriptor {
    pub const MISSING: Self = Self(0);

    const P: u64 = 1 << 47;

    const fn encode(kind: u8, selector: u16, offset: u32, dpl: u8) -> Self {
        let offset = offset as u64;
        Self(
            (offset & 0xFFFF)
                | (selector as u64) << 16
                | ((kind & 0xF) as u64) << 40
                | ((dpl & 3) as u64) << 45
                | Self::P
                | (offset >> 16) << 48,
        )
    }

    /// Gate that clears IF on entry.
    pub const fn interrupt(selector: u16, offset: u32, dpl: u8) -> Self {
        Self::encode(system_type::INTERRUPT_GATE32, selector, offset, dpl)
    }

    /// Gate that leaves IF as it was.
    pub const fn trap(selector: u16, offset: u32, dpl: u8) -> Self {
        Self::encode(system_type::TRAP_GATE32, selector, offset, dpl)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn offset(&self) -> u32 {
        (self.0 & 0xFFFF) as u32 | ((self.0 >> 48) as u32) << 16
    }

    pub const fn selector(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn kind(&self) -> u8 {
        ((self.0 >> 40) & 0xF) as u8
    }

    pub const fn dpl(&self) -> u8 {
        ((self.0 >> 45) & 3) as u8
    }

    pub const fn present(&self) -> bool {
        self.0 & Self::P != 0
    }
}

/// Entry points of the per-vector stubs, in vector order.
#[derive(Clone, Copy, Debug)]
pub struct EntryStubs {
    pub hardware: [u32; vector::HARDWARE_COUNT],
    pub putc: u32,
    pub halt: u32,
}

impl EntryStubs {
    /// Read the stub table emitted next to the stubs: the hardware vectors
    /// followed by the two software calls.
    pub fn from_table(table: &[u32; vector::HARDWARE_COUNT + 2]) -> Self {
        let mut hardware = [0; vector::HARDWARE_COUNT];
        hardware.copy_from_slice(&table[..vector::HARDWARE_COUNT]);
        Self {
            hardware,
            putc: table[vector::HARDWARE_COUNT],
            halt: table[vector::HARDWARE_COUNT + 1],
        }
    }

    fn all(&self) -> impl Iterator<Item = u32> + '_ {
        self.hardware
            .iter()
            .copied()
            .chain([self.putc, self.halt])
    }
}

/// Privilege needed to raise `vector` with `int`.
///
/// Breakpoint stays reachable from ring 3 for debugging; every other
/// hardware vector is supervisor-only.
pub const fn gate_dpl(vector: u32) -> u8 {
    match vector {
        vector::BREAKPOINT | vector::SYSCALL_PUTC | vector::SYSCALL_HALT => 3,
        _ => 0,
    }
}

/// The supervisor's IDT.
#[derive(Clone, Debug)]
#[repr(C, align(8))]
pub struct Idt {
    entries: [GateDescriptor; vector::COUNT],
}

impl Idt {
    pub const fn new() -> Self {
        Self {
            entries: [GateDescriptor::MISSING; vector::COUNT],
        }
    }

    pub fn set_gate(&mut self, vector: u32, gate: GateDescriptor) {
        self.entries[vector as usize] = gate;
    }

    pub fn gate(&self, vector: u32) -> GateDescriptor {
        self.entries[vector as usize]
    }

    /// Bind every hardware vector and both software calls to their stubs.
    ///
    /// All gates are interrupt gates in the supervisor code segment, so
    /// interrupts stay masked until the interrupted context is restored.
    pub fn install(&mut self, stubs: &EntryStubs) {
        for (i, a) in stubs.all().enumerate() {
            assert!(a != 0, "missing entry stub");
            assert!(
                stubs.all().skip(i + 1).all(|b| b != a),
                "entry stubs must be distinct"
            );
        }

        for (v, &stub) in stubs.hardware.iter().enumerate() {
            let v = v as u32;
            self.set_gate(v, GateDescriptor::interrupt(selector::KERNEL_CODE, stub, gate_dpl(v)));
        }
        self.set_gate(
            vector::SYSCALL_PUTC,
            GateDescriptor::interrupt(
                selector::KERNEL_CODE,
                stubs.putc,
                gate_dpl(vector::SYSCALL_PUTC),
            ),
        );
        self.set_gate(
            vector::SYSCALL_HALT,
            GateDescriptor::interrupt(
                selector::KERNEL_CODE,
                stubs.halt,
                gate_dpl(vector::SYSCALL_HALT),
            ),
        );
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: self as *const Self as usize as u32,
        }
    }
}

impl Default for Idt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stubs() -> EntryStubs {
        let mut table = [0u32; vector::HARDWARE_COUNT + 2];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = 0xF000_3000 + 0x10 * i as u32;
        }
        EntryStubs::from_table(&table)
    }

    #[test]
    fn gate_encoding() {
        let gate = GateDescriptor::interrupt(selector::KERNEL_CODE, 0xF012_3456, 3);
        assert_eq!(gate.raw(), 0xF012_EE00_0008_3456);
        assert_eq!(gate.offset(), 0xF012_3456);
        assert_eq!(gate.selector(), selector::KERNEL_CODE);

        let gate = GateDescriptor::trap(selector::KERNEL_CODE, 0, 0);
        assert_eq!(gate.kind(), system_type::TRAP_GATE32);
    }

    #[test]
    fn hardware_gates_are_distinct_and_supervisor_bound() {
        let mut idt = Idt::new();
        idt.install(&stubs());

        let mut offsets = Vec::new();
        for v in 0..vector::HARDWARE_COUNT as u32 {
            let gate = idt.gate(v);
            assert!(gate.present());
            assert_eq!(gate.selector(), selector::KERNEL_CODE);
            assert_eq!(gate.kind(), system_type::INTERRUPT_GATE32);
            offsets.push(gate.offset());
        }
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), vector::HARDWARE_COUNT);
    }

    #[test]
    fn only_breakpoint_is_user_callable_among_hardware_vectors() {
        let mut idt = Idt::new();
        idt.install(&stubs());

        let user: Vec<u32> = (0..vector::HARDWARE_COUNT as u32)
            .filter(|&v| idt.gate(v).dpl() == 3)
            .collect();
        assert_eq!(user, [vector::BREAKPOINT]);
        assert_eq!(idt.gate(vector::SYSCALL_PUTC).dpl(), 3);
        assert_eq!(idt.gate(vector::SYSCALL_HALT).dpl(), 3);
    }

    #[test]
    fn unused_vectors_stay_absent() {
        let mut idt = Idt::new();
        idt.install(&stubs());
        for v in vector::HARDWARE_COUNT as u32..vector::SYSCALL_PUTC {
            assert!(!idt.gate(v).present());
        }
        let limit = idt.pointer().limit;
        assert_eq!(limit, 399);
    }

    #[test]
    #[should_panic(expected = "distinct")]
    fn duplicate_stub_rejected() {
        let mut stubs = stubs();
        stubs.halt = stubs.putc;
        Idt::new().install(&stubs);
    }
}
