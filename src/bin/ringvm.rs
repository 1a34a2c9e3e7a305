//! ringvm
//!
//! Boots the embedded images and runs the guest until it halts. Exits 0 on a
//! guest halt and 1 on any fatal exit or setup failure.

use std::io::Write;
use std::process;

use log::{debug, LevelFilter};

fn main() {
    init_logging();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Progress lines go to stdout next to the guest console, message only.
fn init_logging() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[cfg(target_os = "linux")]
fn run() -> ringvm::Result<()> {
    use ringvm::device::Serial;
    use ringvm::VmBuilder;

    if !ringvm::is_supported() {
        debug!("/dev/kvm not found");
    }

    let mut vm = VmBuilder::new().embedded_images().build()?;
    let mut console = Serial::new().on_port(vm.console_port());
    let regs = vm.run(&mut console)?;
    debug!("guest halted at rip 0x{:x}", regs.rip);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run() -> ringvm::Result<()> {
    debug!("no backend for this platform");
    Err(ringvm::Error::HypervisorNotAvailable)
}
