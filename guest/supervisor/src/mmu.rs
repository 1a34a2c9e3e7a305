//! x86 protected-mode constants and the supervisor's fixed memory layout.

/// Bytes per page.
pub const PAGE_SIZE: u32 = 4096;
pub const PAGE_SHIFT: u32 = 12;
/// Linear address bit where the page-directory index starts.
pub const DIRECTORY_SHIFT: u32 = 22;

/// Entries in a page directory.
pub const DIRECTORY_ENTRIES: usize = 1024;
/// Entries in a page table.
pub const TABLE_ENTRIES: usize = 1024;

/// Linear base of the high alias of low physical memory. The supervisor is
/// linked here.
pub const KERNBASE: u32 = 0xF000_0000;

/// Frames of low physical memory covered by the boot identity table.
pub const LOW_IDENTITY_FRAMES: usize = 16;

/// First linear address of the unprivileged window.
pub const USER_WINDOW_BASE: u32 = 0x0001_0000;
/// Pages in the unprivileged window.
pub const USER_WINDOW_PAGES: usize = 5;

/// Segment selectors.
pub mod selector {
    pub const KERNEL_CODE: u16 = 0x08;
    pub const KERNEL_DATA: u16 = 0x10;
    pub const USER_CODE: u16 = 0x18;
    pub const USER_DATA: u16 = 0x20;
    pub const TSS: u16 = 0x28;

    /// Requested privilege level bits of a selector.
    pub const RPL_MASK: u16 = 3;
    pub const RPL_USER: u16 = 3;
}

/// Descriptors in the GDT: null, four flat segments, one task state.
pub const GDT_ENTRIES: usize = (selector::TSS as usize >> 3) + 1;

/// Trap vectors.
pub mod vector {
    pub const DIVIDE: u32 = 0;
    pub const DEBUG: u32 = 1;
    pub const NMI: u32 = 2;
    pub const BREAKPOINT: u32 = 3;
    pub const OVERFLOW: u32 = 4;
    pub const BOUND: u32 = 5;
    pub const INVALID_OPCODE: u32 = 6;
    pub const DEVICE: u32 = 7;
    pub const DOUBLE_FAULT: u32 = 8;
    pub const COPROCESSOR_OVERRUN: u32 = 9;
    pub const INVALID_TSS: u32 = 10;
    pub const SEGMENT_NOT_PRESENT: u32 = 11;
    pub const STACK: u32 = 12;
    pub const GENERAL_PROTECTION: u32 = 13;
    pub const PAGE_FAULT: u32 = 14;
    pub const RESERVED: u32 = 15;
    pub const FPU_ERROR: u32 = 16;
    pub const ALIGNMENT: u32 = 17;
    pub const MACHINE_CHECK: u32 = 18;
    pub const SIMD_ERROR: u32 = 19;

    /// Architectural vectors with an installed gate.
    pub const HARDWARE_COUNT: usize = 20;

    /// Software call: print the low byte of `eax`.
    pub const SYSCALL_PUTC: u32 = 48;
    /// Software call: halt the machine.
    pub const SYSCALL_HALT: u32 = 49;

    /// Size of the IDT.
    pub const COUNT: usize = 50;

    /// Whether the CPU pushes an error code for `vector`.
    pub const fn has_error_code(vector: u32) -> bool {
        matches!(vector, 8 | 10..=14 | 17)
    }
}

/// EFLAGS interrupt-enable bit.
pub const FL_IF: u32 = 0x200;

/// CR0 bits set on entry.
pub const CR0_PE: u32 = 0x0000_0001;
pub const CR0_WP: u32 = 0x0001_0000;
pub const CR0_PG: u32 = 0x8000_0000;

/// Page-directory index of a linear address.
pub const fn directory_index(va: u32) -> usize {
    (va >> DIRECTORY_SHIFT) as usize & (DIRECTORY_ENTRIES - 1)
}

/// Page-table index of a linear address.
pub const fn table_index(va: u32) -> usize {
    (va >> PAGE_SHIFT) as usize & (TABLE_ENTRIES - 1)
}

pub const fn page_round_up(value: u32) -> u32 {
    (value + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

pub const fn is_page_aligned(value: u32) -> bool {
    value & (PAGE_SIZE - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices() {
        assert_eq!(directory_index(KERNBASE), 960);
        assert_eq!(directory_index(USER_WINDOW_BASE), 0);
        assert_eq!(table_index(USER_WINDOW_BASE), 0x10);
        assert_eq!(table_index(0x0040_3000), 3);
    }

    #[test]
    fn error_code_vectors() {
        let with: Vec<u32> = (0..vector::HARDWARE_COUNT as u32)
            .filter(|&v| vector::has_error_code(v))
            .collect();
        assert_eq!(with, [8, 10, 11, 12, 13, 14, 17]);
    }

    #[test]
    fn gdt_holds_task_slot() {
        assert_eq!(GDT_ENTRIES, 6);
        assert_eq!(page_round_up(0x2001), 0x3000);
        assert!(is_page_aligned(0x3000));
    }

    #[test]
    fn boot_identity_covers_image_limit() {
        assert_eq!(LOW_IDENTITY_FRAMES as u32 * PAGE_SIZE, 0x10000);
    }
}
