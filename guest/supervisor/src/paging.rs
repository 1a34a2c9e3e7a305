//! Two-level 32-bit paging.

use bitflags::bitflags;

use crate::cpu::Cpu;
use crate::mmu::{
    directory_index, is_page_aligned, page_round_up, table_index, DIRECTORY_ENTRIES, KERNBASE,
    LOW_IDENTITY_FRAMES, PAGE_SIZE, TABLE_ENTRIES, USER_WINDOW_BASE, USER_WINDOW_PAGES,
};

bitflags! {
    /// Low bits shared by directory and table entries.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
    }
}

/// Flags of the low identity slot installed on entry.
pub const BOOT_IDENTITY_FLAGS: PteFlags = PteFlags::PRESENT;
/// Flags of the high alias slot installed on entry.
pub const BOOT_ALIAS_FLAGS: PteFlags = PteFlags::PRESENT.union(PteFlags::WRITABLE);

/// A directory or table entry: frame address plus flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const EMPTY: Self = Self(0);

    pub const fn new(frame: u32, flags: PteFlags) -> Self {
        assert!(is_page_aligned(frame), "frame must be page aligned");
        Self(frame | flags.bits())
    }

    pub const fn frame(&self) -> u32 {
        self.0 & !(PAGE_SIZE - 1)
    }

    pub const fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    pub const fn is_present(&self) -> bool {
        self.0 & PteFlags::PRESENT.bits() != 0
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }
}

/// Second-level table: 1024 entries of 4 KiB frames.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [Entry; TABLE_ENTRIES],
}

impl PageTable {
    pub const fn empty() -> Self {
        Self {
            entries: [Entry::EMPTY; TABLE_ENTRIES],
        }
    }

    /// Identity mapping of the first [`LOW_IDENTITY_FRAMES`] physical frames.
    pub const fn low_identity() -> Self {
        let mut table = Self::empty();
        let mut i = 0;
        while i < LOW_IDENTITY_FRAMES {
            table.entries[i] = Entry::new(
                i as u32 * PAGE_SIZE,
                PteFlags::PRESENT.union(PteFlags::WRITABLE),
            );
            i += 1;
        }
        table
    }

    pub fn get(&self, index: usize) -> Entry {
        self.entries[index]
    }

    pub fn set(&mut self, index: usize, entry: Entry) {
        self.entries[index] = entry;
    }
}

/// First-level table: 1024 entries of 4 MiB regions.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [Entry; DIRECTORY_ENTRIES],
}

impl PageDirectory {
    pub const fn empty() -> Self {
        Self {
            entries: [Entry::EMPTY; DIRECTORY_ENTRIES],
        }
    }

    pub fn get(&self, index: usize) -> Entry {
        self.entries[index]
    }

    pub fn set(&mut self, index: usize, entry: Entry) {
        self.entries[index] = entry;
    }

    /// Point the low identity slot and the high alias slot at the same table.
    ///
    /// The entry stub writes these two slots with the same values before
    /// paging is on; this is the typed form of that step.
    pub fn install_boot_mappings(&mut self, low_table_phys: u32) {
        self.set(0, Entry::new(low_table_phys, BOOT_IDENTITY_FLAGS));
        self.set(
            directory_index(KERNBASE),
            Entry::new(low_table_phys, BOOT_ALIAS_FLAGS),
        );
    }
}

/// Physical address of a supervisor object linked in the high alias.
pub fn kernel_virt_to_phys(va: u32) -> u32 {
    assert!(va >= KERNBASE, "0x{:x} is not a supervisor address", va);
    va - KERNBASE
}

/// The unprivileged window: consecutive pages backed by consecutive frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserWindow {
    pub base: u32,
    pub pages: usize,
    pub first_frame: u32,
}

impl UserWindow {
    /// The fixed window, backed by the frames right past the supervisor image.
    pub fn after_supervisor(supervisor_end_phys: u32) -> Self {
        Self {
            base: USER_WINDOW_BASE,
            pages: USER_WINDOW_PAGES,
            first_frame: page_round_up(supervisor_end_phys),
        }
    }

    /// First linear address past the window.
    pub fn top(&self) -> u32 {
        self.base + self.pages as u32 * PAGE_SIZE
    }
}

/// The active page directory plus the table that backs the user window.
pub struct AddressSpace<'a> {
    directory: &'a mut PageDirectory,
    directory_phys: u32,
    user_table: &'a mut PageTable,
    user_table_phys: u32,
    /// Frames below this belong to the supervisor.
    supervisor_end_phys: u32,
}

impl<'a> AddressSpace<'a> {
    pub fn new(
        directory: &'a mut PageDirectory,
        directory_phys: u32,
        user_table: &'a mut PageTable,
        user_table_phys: u32,
        supervisor_end_phys: u32,
    ) -> Self {
        Self {
            directory,
            directory_phys,
            user_table,
            user_table_phys,
            supervisor_end_phys,
        }
    }

    /// Map one user page and drop its stale translation.
    pub fn map_user_page<C: Cpu>(&mut self, cpu: &mut C, va: u32, frame: u32) {
        assert!(
            frame >= page_round_up(self.supervisor_end_phys),
            "user frame 0x{:x} lies inside supervisor memory",
            frame
        );
        self.user_table.set(
            table_index(va),
            Entry::new(frame, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER),
        );
        cpu.invalidate_translation(va);
    }

    /// Fill the user table for `window`, hook it into the directory, then
    /// reload CR3 so no cached directory entry survives.
    pub fn map_user_window<C: Cpu>(&mut self, cpu: &mut C, window: &UserWindow) {
        assert!(is_page_aligned(window.base));
        assert!(
            table_index(window.base) + window.pages <= TABLE_ENTRIES,
            "user window crosses a page-table boundary"
        );

        let mut va = window.base;
        let mut frame = window.first_frame;
        for _ in 0..window.pages {
            self.map_user_page(cpu, va, frame);
            va += PAGE_SIZE;
            frame += PAGE_SIZE;
        }

        self.directory.set(
            directory_index(window.base),
            Entry::new(
                self.user_table_phys,
                PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER,
            ),
        );
        cpu.load_page_directory(self.directory_phys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::mock::{MockCpu, Op};

    #[test]
    fn low_identity_covers_sixteen_frames() {
        let table = PageTable::low_identity();
        for i in 0..LOW_IDENTITY_FRAMES {
            let entry = table.get(i);
            assert_eq!(entry.frame(), i as u32 * PAGE_SIZE);
            assert_eq!(entry.flags(), PteFlags::PRESENT | PteFlags::WRITABLE);
        }
        assert!(!table.get(LOW_IDENTITY_FRAMES).is_present());
    }

    #[test]
    fn boot_mappings_alias_the_same_table() {
        let mut dir = PageDirectory::empty();
        dir.install_boot_mappings(0x4000);
        assert_eq!(dir.get(0).raw(), 0x4001);
        assert_eq!(dir.get(960).raw(), 0x4003);
        assert_eq!(dir.get(1).raw(), 0);
    }

    #[test]
    fn window_after_supervisor_rounds_up() {
        let window = UserWindow::after_supervisor(0x5800);
        assert_eq!(window.first_frame, 0x6000);
        assert_eq!(window.base, 0x10000);
        assert_eq!(window.top(), 0x15000);
    }

    #[test]
    fn user_window_mapping() {
        let mut dir = PageDirectory::empty();
        dir.install_boot_mappings(0x4000);
        let mut table = PageTable::empty();
        let mut cpu = MockCpu::default();

        let window = UserWindow::after_supervisor(0x6000);
        AddressSpace::new(&mut dir, 0x3000, &mut table, 0x5000, 0x6000)
            .map_user_window(&mut cpu, &window);

        for i in 0..USER_WINDOW_PAGES {
            let entry = table.get(0x10 + i);
            assert_eq!(entry.frame(), 0x6000 + i as u32 * PAGE_SIZE);
            assert_eq!(
                entry.flags(),
                PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER
            );
        }
        assert!(!table.get(0x10 + USER_WINDOW_PAGES).is_present());
        assert!(!table.get(0x0f).is_present());

        // the window's directory slot replaces the low identity slot
        assert_eq!(dir.get(0).raw(), 0x5007);
        assert_eq!(dir.get(960).raw(), 0x4003);

        let expected = vec![
            Op::Invalidate(0x10000),
            Op::Invalidate(0x11000),
            Op::Invalidate(0x12000),
            Op::Invalidate(0x13000),
            Op::Invalidate(0x14000),
            Op::LoadPageDirectory(0x3000),
        ];
        assert_eq!(cpu.ops, expected);
    }

    #[test]
    #[should_panic(expected = "inside supervisor memory")]
    fn user_frame_in_supervisor_memory() {
        let mut dir = PageDirectory::empty();
        let mut table = PageTable::empty();
        let mut cpu = MockCpu::default();
        AddressSpace::new(&mut dir, 0x3000, &mut table, 0x5000, 0x6000)
            .map_user_page(&mut cpu, 0x10000, 0x2000);
    }

    #[test]
    #[should_panic(expected = "page-table boundary")]
    fn window_must_fit_one_table() {
        let mut dir = PageDirectory::empty();
        let mut table = PageTable::empty();
        let mut cpu = MockCpu::default();
        let window = UserWindow {
            base: 0x003F_E000,
            pages: 5,
            first_frame: 0x10000,
        };
        AddressSpace::new(&mut dir, 0x3000, &mut table, 0x5000, 0x6000)
            .map_user_window(&mut cpu, &window);
    }

    #[test]
    fn supervisor_phys() {
        assert_eq!(kernel_virt_to_phys(0xF000_3000), 0x3000);
    }
}
