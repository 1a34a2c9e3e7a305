//! Ring-3 entry for the user image, linked at the window base.

#![cfg_attr(target_os = "none", no_std, no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod entry {
    use core::arch::asm;
    use core::panic::PanicInfo;

    use ringvm_user::{Syscalls, HALT_VECTOR, PUTC_VECTOR};

    struct Supervisor;

    impl Supervisor {
        fn halt(&mut self) -> ! {
            unsafe { asm!("int {v}", v = const HALT_VECTOR, options(noreturn)) }
        }
    }

    impl Syscalls for Supervisor {
        fn putc(&mut self, byte: u8) {
            unsafe { asm!("int {v}", v = const PUTC_VECTOR, in("eax") byte as u32) };
        }
    }

    #[link_section = ".page2"]
    #[inline(never)]
    fn page2_fun() {}

    #[no_mangle]
    #[link_section = ".text.entry"]
    extern "C" fn _start() -> ! {
        let mut sys = Supervisor;
        ringvm_user::run(&mut sys, core::hint::black_box(page2_fun as fn()));
        sys.halt()
    }

    #[panic_handler]
    fn panic(_info: &PanicInfo) -> ! {
        Supervisor.halt()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
