//! Global descriptor table and task state.
//!
//! GDT layout:
//! - 0x00: null
//! - 0x08: supervisor code (DPL 0)
//! - 0x10: supervisor data (DPL 0)
//! - 0x18: user code (DPL 3)
//! - 0x20: user data (DPL 3)
//! - 0x28: 32-bit available TSS, filled in by [`Gdt::install_task_state`]

use core::mem::size_of;

use crate::mmu::{selector, GDT_ENTRIES};

/// Segment type bits for code/data descriptors (S = 1).
pub mod segment_type {
    pub const EXECUTABLE: u8 = 0x8;
    pub const WRITABLE: u8 = 0x2;
    pub const READABLE: u8 = 0x2;
}

/// System descriptor types (S = 0).
pub mod system_type {
    pub const TSS32_AVAILABLE: u8 = 0x9;
    pub const INTERRUPT_GATE32: u8 = 0xE;
    pub const TRAP_GATE32: u8 = 0xF;
}

/// One 8-byte segment descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct SegmentDescriptor(u64);

impl SegmentDescriptor {
    pub const NULL: Self = Self(0);

    const S: u64 = 1 << 44;
    const P: u64 = 1 << 47;
    const DB: u64 = 1 << 54;
    const G: u64 = 1 << 55;

    const fn encode(kind: u8, base: u32, limit: u32, dpl: u8) -> u64 {
        let base = base as u64;
        let limit = limit as u64;
        (limit & 0xFFFF)
            | (base & 0xFF_FFFF) << 16
            | ((kind & 0xF) as u64) << 40
            | ((dpl & 3) as u64) << 45
            | ((limit >> 16) & 0xF) << 48
            | (base >> 24) << 56
    }

    /// Code or data segment over `[base, base + limit]`, 4 KiB granular.
    pub const fn flat(kind: u8, base: u32, limit: u32, dpl: u8) -> Self {
        Self(Self::encode(kind, base, limit >> 12, dpl) | Self::S | Self::P | Self::DB | Self::G)
    }

    /// Byte-granular 32-bit TSS descriptor.
    pub const fn task_state(base: u32, limit: u32) -> Self {
        Self(Self::encode(system_type::TSS32_AVAILABLE, base, limit, 0) | Self::P | Self::DB)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn base(&self) -> u32 {
        ((self.0 >> 16) & 0xFF_FFFF) as u32 | ((self.0 >> 56) as u32) << 24
    }

    /// The 20-bit limit field, in units of the granularity.
    pub const fn limit(&self) -> u32 {
        (self.0 & 0xFFFF) as u32 | (((self.0 >> 48) & 0xF) as u32) << 16
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

    pub const fn is_system(&self) -> bool {
        self.0 & Self::S == 0
    }

    pub const fn page_granular(&self) -> bool {
        self.0 & Self::G != 0
    }
}

/// Operand of `lgdt`/`lidt`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, packed)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

/// 32-bit task-state segment.
///
/// Only `esp0`/`ss0` are consulted: the CPU loads them on every trap that
/// raises privilege to ring 0.
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct TaskState {
    pub link: u32,
    pub esp0: u32,
    pub ss0: u16,
    _pad0: u16,
    pub esp1: u32,
    pub ss1: u16,
    _pad1: u16,
    pub esp2: u32,
    pub ss2: u16,
    _pad2: u16,
    pub cr3: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub es: u16,
    _pad3: u16,
    pub cs: u16,
    _pad4: u16,
    pub ss: u16,
    _pad5: u16,
    pub ds: u16,
    _pad6: u16,
    pub fs: u16,
    _pad7: u16,
    pub gs: u16,
    _pad8: u16,
    pub ldt: u16,
    _pad9: u16,
    pub trap: u16,
    pub iomb: u16,
}

const _: () = assert!(size_of::<TaskState>() == 104);

impl TaskState {
    pub const fn new() -> Self {
        Self {
            link: 0,
            esp0: 0,
            ss0: 0,
            _pad0: 0,
            esp1: 0,
            ss1: 0,
            _pad1: 0,
            esp2: 0,
            ss2: 0,
            _pad2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            _pad3: 0,
            cs: 0,
            _pad4: 0,
            ss: 0,
            _pad5: 0,
            ds: 0,
            _pad6: 0,
            fs: 0,
            _pad7: 0,
            gs: 0,
            _pad8: 0,
            ldt: 0,
            _pad9: 0,
            trap: 0,
            iomb: 0,
        }
    }

    /// Point ring-0 entry at `stack_top`. The I/O bitmap is placed past the
    /// segment limit, so no port is granted to ring 3.
    pub fn set_supervisor_stack(&mut self, stack_top: u32) {
        self.esp0 = stack_top;
        self.ss0 = selector::KERNEL_DATA;
        self.iomb = size_of::<TaskState>() as u16;
    }
}

/// The supervisor's GDT.
#[derive(Clone, Debug)]
#[repr(C, align(8))]
pub struct Gdt {
    entries: [SegmentDescriptor; GDT_ENTRIES],
}

impl Gdt {
    /// The five fixed descriptors; the task-state slot starts null.
    pub const fn new() -> Self {
        use segment_type::{EXECUTABLE, READABLE, WRITABLE};

        let mut entries = [SegmentDescriptor::NULL; GDT_ENTRIES];
        entries[(selector::KERNEL_CODE >> 3) as usize] =
            SegmentDescriptor::flat(EXECUTABLE | READABLE, 0, 0xFFFF_FFFF, 0);
        entries[(selector::KERNEL_DATA >> 3) as usize] =
            SegmentDescriptor::flat(WRITABLE, 0, 0xFFFF_FFFF, 0);
        entries[(selector::USER_CODE >> 3) as usize] =
            SegmentDescriptor::flat(EXECUTABLE | READABLE, 0, 0xFFFF_FFFF, 3);
        entries[(selector::USER_DATA >> 3) as usize] =
            SegmentDescriptor::flat(WRITABLE, 0, 0xFFFF_FFFF, 3);
        Self { entries }
    }

    /// Descriptor for `selector` (RPL bits ignored).
    pub fn get(&self, selector: u16) -> SegmentDescriptor {
        self.entries[(selector >> 3) as usize]
    }

    pub fn entries(&self) -> &[SegmentDescriptor] {
        &self.entries
    }

    /// Bind the task state at linear address `tss_base` into the TSS slot.
    pub fn install_task_state(&mut self, tss_base: u32) {
        self.entries[(selector::TSS >> 3) as usize] =
            SegmentDescriptor::task_state(tss_base, size_of::<TaskState>() as u32 - 1);
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (size_of::<Self>() - 1) as u16,
            base: self as *const Self as usize as u32,
        }
    }
}

impl Default for Gdt {
    fn default() -> Self {
        Self::new()
    }
}
