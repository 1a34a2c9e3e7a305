//! Supervisor bring-up: protection structures, the user window and the
//! launch frame.

use core::mem::offset_of;

use crate::console::Console;
use crate::cpu::Cpu;
use crate::gdt::{Gdt, TaskState};
use crate::idt::{EntryStubs, Idt};
use crate::mmu::selector;
use crate::paging::{AddressSpace, PageDirectory, PageTable, UserWindow};
use crate::trap::TrapFrame;

/// Every table the supervisor owns, in one page-aligned block.
///
/// The entry stub reaches `directory` and `low_table` by physical address
/// before paging is enabled, so the field offsets are part of its contract.
#[repr(C, align(4096))]
pub struct SupervisorTables {
    pub directory: PageDirectory,
    pub low_table: PageTable,
    pub user_table: PageTable,
    pub gdt: Gdt,
    pub idt: Idt,
    pub tss: TaskState,
}

impl SupervisorTables {
    pub const DIRECTORY_OFFSET: usize = offset_of!(Self, directory);
    pub const LOW_TABLE_OFFSET: usize = offset_of!(Self, low_table);
    pub const USER_TABLE_OFFSET: usize = offset_of!(Self, user_table);

    pub const fn new() -> Self {
        Self {
            directory: PageDirectory::empty(),
            low_table: PageTable::low_identity(),
            user_table: PageTable::empty(),
            gdt: Gdt::new(),
            idt: Idt::new(),
            tss: TaskState::new(),
        }
    }
}

impl Default for SupervisorTables {
    fn default() -> Self {
        Self::new()
    }
}

/// What the entry stub hands to [`init`].
#[derive(Clone, Copy, Debug)]
pub struct BootInfo {
    pub stubs: EntryStubs,
    /// Physical address of the [`SupervisorTables`] block.
    pub tables_phys: u32,
    /// Top of the supervisor stack; ring-raising traps land here.
    pub stack_top: u32,
    /// Physical end of the supervisor image.
    pub supervisor_end_phys: u32,
}

/// Bring the supervisor up and return the frame that enters user mode.
///
/// The task register is loaded only after both descriptor tables are live
/// and the ring-0 stack is set, so the first ring-raising trap finds a valid
/// stack.
pub fn init<C: Cpu>(tables: &mut SupervisorTables, cpu: &mut C, boot: &BootInfo) -> TrapFrame {
    cpu.load_descriptor_tables(&tables.gdt.pointer(), &tables.idt.pointer());
    cpu.reload_segment_registers();

    tables.idt.install(&boot.stubs);

    let tss_base = &tables.tss as *const TaskState as usize as u32;
    tables.tss.set_supervisor_stack(boot.stack_top);
    tables.gdt.install_task_state(tss_base);
    cpu.load_task_register(selector::TSS);

    let window = UserWindow::after_supervisor(boot.supervisor_end_phys);
    AddressSpace::new(
        &mut tables.directory,
        boot.tables_phys + SupervisorTables::DIRECTORY_OFFSET as u32,
        &mut tables.user_table,
        boot.tables_phys + SupervisorTables::USER_TABLE_OFFSET as u32,
        boot.supervisor_end_phys,
    )
    .map_user_window(cpu, &window);

    Console::new(cpu).puts("Let's run user!!!!");
    TrapFrame::user_entry(window.base, window.top())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::mock::{MockCpu, Op};
    use crate::mmu::{vector, FL_IF};
    use crate::paging::PteFlags;

    fn boot_info() -> BootInfo {
        let mut table = [0u32; vector::HARDWARE_COUNT + 2];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = 0xF000_2100 + 0x10 * i as u32;
        }
        BootInfo {
            stubs: EntryStubs::from_table(&table),
            tables_phys: 0x4000,
            stack_top: 0xF000_C000,
            supervisor_end_phys: 0xC000,
        }
    }

    fn booted() -> (Box<SupervisorTables>, MockCpu, TrapFrame) {
        let mut tables = Box::new(SupervisorTables::new());
        tables.directory.install_boot_mappings(0x4000 + SupervisorTables::LOW_TABLE_OFFSET as u32);
        let mut cpu = MockCpu::default();
        let frame = init(&mut tables, &mut cpu, &boot_info());
        (tables, cpu, frame)
    }

    #[test]
    fn table_block_layout() {
        assert_eq!(SupervisorTables::DIRECTORY_OFFSET, 0);
        assert_eq!(SupervisorTables::LOW_TABLE_OFFSET, 0x1000);
        assert_eq!(SupervisorTables::USER_TABLE_OFFSET, 0x2000);
    }

    #[test]
    fn privileged_steps_in_order() {
        let (_, cpu, _) = booted();
        let mut expected = vec![
            Op::LoadTables {
                gdt_limit: 47,
                idt_limit: 399,
            },
            Op::ReloadSegments,
            Op::LoadTaskRegister(selector::TSS),
        ];
        for page in 0..5 {
            expected.push(Op::Invalidate(0x10000 + page * 0x1000));
        }
        expected.push(Op::LoadPageDirectory(0x4000));
        assert_eq!(cpu.ops, expected);
    }

    #[test]
    fn task_state_is_bound() {
        let (tables, _, _) = booted();
        assert_eq!(tables.tss.esp0, 0xF000_C000);
        assert_eq!(tables.tss.ss0, selector::KERNEL_DATA);
        assert!(tables.gdt.get(selector::TSS).present());
        assert!(tables.idt.gate(vector::SYSCALL_PUTC).present());
    }

    #[test]
    fn window_backed_past_supervisor() {
        let (tables, _, _) = booted();
        assert_eq!(tables.user_table.get(0x10).frame(), 0xC000);
        assert_eq!(tables.user_table.get(0x14).frame(), 0x10000);
        assert_eq!(tables.directory.get(0).frame(), 0x6000);
        assert!(tables.directory.get(0).flags().contains(PteFlags::USER));
    }

    #[test]
    fn announces_and_launches_user() {
        let (_, cpu, frame) = booted();
        assert_eq!(cpu.console_text(), "Let's run user!!!!\n");
        assert_eq!(frame.eip, 0x10000);
        assert_eq!(frame.esp, 0x15000);
        assert_eq!(frame.eflags, FL_IF);
        assert!(frame.from_user());
    }
}
