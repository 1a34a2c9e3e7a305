//! Boots the real guest images on KVM.

#![cfg(target_os = "linux")]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use ringvm::device::Serial;
use ringvm::{Error, VmBuilder, VmState};

struct TestWriter {
    data: Arc<Mutex<Vec<u8>>>,
}

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
#[ignore = "needs /dev/kvm and the guest images in memdata/"]
fn test_user_program_reaches_page2_call() {
    let mut vm = VmBuilder::new().embedded_images().build().unwrap();
    let data = Arc::new(Mutex::new(Vec::new()));
    let mut console =
        Serial::with_output(Box::new(TestWriter { data: data.clone() })).on_port(vm.console_port());

    let result = vm.run(&mut console);
    let output = String::from_utf8_lossy(&data.lock().unwrap()).into_owned();

    // Each line only appears if the previous trap returned to the exact
    // interrupted context.
    assert!(
        output.starts_with(
            "Let's run user!!!!\nHere is user mode!!\nLet's call the function of PAGE2\n"
        ),
        "console was {:?}",
        output
    );

    // Page 2 is unbacked on the host side; either the guest halts or KVM
    // gives up on the access.
    match result {
        Ok(_) => assert_eq!(vm.state(), VmState::Halted),
        Err(Error::InternalError { .. }) => assert_eq!(vm.state(), VmState::Failed),
        Err(e) => panic!("unexpected failure: {}", e),
    }
}
