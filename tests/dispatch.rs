//! Dispatch loop scenarios driven through a scripted vCPU.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use log::{Level, LevelFilter, Log, Metadata, Record};

use ringvm::device::Serial;
use ringvm::runner::{handle_exit, run_until_halt, ExitAction};
use ringvm::{Error, IoDirection, Registers, Result, VirtualCpu, VmExit};

struct ScriptedVcpu {
    exits: VecDeque<VmExit>,
    runs: usize,
    regs: Registers,
}

impl ScriptedVcpu {
    fn new(exits: Vec<VmExit>) -> Self {
        Self {
            exits: exits.into(),
            runs: 0,
            regs: Registers {
                rip: 0x10_2f,
                rax: 0x21,
                rflags: 0x2,
            },
        }
    }
}

impl VirtualCpu for ScriptedVcpu {
    fn run(&mut self) -> Result<VmExit> {
        self.runs += 1;
        Ok(self
            .exits
            .pop_front()
            .expect("guest ran past the end of its script"))
    }

    fn registers(&mut self) -> Result<Registers> {
        Ok(self.regs)
    }

    fn set_entry_state(&mut self, rip: u64, rflags: u64) -> Result<()> {
        self.regs.rip = rip;
        self.regs.rflags = rflags;
        Ok(())
    }
}

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

fn console() -> (Serial, Arc<Mutex<Vec<u8>>>) {
    let data = Arc::new(Mutex::new(Vec::new()));
    let serial = Serial::with_output(Box::new(TestWriter { data: data.clone() }));
    (serial, data)
}

fn putc(byte: u8) -> VmExit {
    VmExit::Io {
        port: 0x3f8,
        direction: IoDirection::Out,
        size: 1,
        count: 1,
        data: vec![byte],
    }
}

/// Counts error-level records so tests can check who reports a fatal exit.
struct ErrorCounter;

static ERRORS: AtomicUsize = AtomicUsize::new(0);

impl Log for ErrorCounter {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if record.level() == Level::Error {
            ERRORS.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn flush(&self) {}
}

fn count_errors() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        log::set_logger(&ErrorCounter).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

fn puts(s: &str) -> Vec<VmExit> {
    s.bytes().map(putc).collect()
}

#[test]
fn test_console_bytes_then_halt() {
    let mut script = puts("Let's run user!!!!\n");
    script.extend(puts("Here is user mode!!\n"));
    script.extend(puts("Let's call the function of PAGE2\n"));
    script.push(VmExit::Hlt);

    let mut vcpu = ScriptedVcpu::new(script);
    let (mut serial, output) = console();

    let regs = run_until_halt(&mut vcpu, &mut serial).unwrap();
    assert_eq!(regs.rip, 0x10_2f);
    assert_eq!(
        String::from_utf8(output.lock().unwrap().clone()).unwrap(),
        "Let's run user!!!!\nHere is user mode!!\nLet's call the function of PAGE2\n"
    );
}

#[test]
fn test_single_console_byte_continues() {
    let mut vcpu = ScriptedVcpu::new(vec![]);
    let (mut serial, output) = console();

    let action = handle_exit(&mut vcpu, putc(b'A'), &mut serial).unwrap();
    assert_eq!(action, ExitAction::Continue);
    assert_eq!(&*output.lock().unwrap(), b"A");
}

#[test]
fn test_other_port_is_fatal() {
    let script = vec![
        putc(b'x'),
        VmExit::Io {
            port: 0x80,
            direction: IoDirection::Out,
            size: 1,
            count: 1,
            data: vec![0],
        },
        VmExit::Hlt,
    ];
    let mut vcpu = ScriptedVcpu::new(script);
    let (mut serial, output) = console();

    let err = run_until_halt(&mut vcpu, &mut serial).unwrap_err();
    assert!(matches!(err, Error::UnhandledIo { port: 0x80, .. }));
    assert!(err.to_string().contains("unhandled"));
    assert_eq!(vcpu.runs, 2);
    assert_eq!(&*output.lock().unwrap(), b"x");
}

#[test]
fn test_console_read_is_fatal() {
    let script = vec![VmExit::Io {
        port: 0x3f8,
        direction: IoDirection::In,
        size: 1,
        count: 1,
        data: vec![0],
    }];
    let mut vcpu = ScriptedVcpu::new(script);
    let (mut serial, _) = console();

    let err = run_until_halt(&mut vcpu, &mut serial).unwrap_err();
    assert!(matches!(
        err,
        Error::UnhandledIo {
            direction: "in",
            ..
        }
    ));
}

#[test]
fn test_fail_entry_is_reported_once() {
    let script = vec![
        VmExit::FailEntry {
            reason: 0x7,
            cpu: 0,
        },
        VmExit::Hlt,
    ];
    let mut vcpu = ScriptedVcpu::new(script);
    let (mut serial, _) = console();

    let err = run_until_halt(&mut vcpu, &mut serial).unwrap_err();
    assert!(matches!(err, Error::FailEntry { reason: 0x7, .. }));
    assert_eq!(vcpu.runs, 1);
    assert_eq!(vcpu.exits.len(), 1);
}

#[test]
fn test_internal_error_surfaces_suberror() {
    let mut vcpu = ScriptedVcpu::new(vec![VmExit::InternalError { suberror: 1 }]);
    let (mut serial, _) = console();

    let err = run_until_halt(&mut vcpu, &mut serial).unwrap_err();
    assert!(matches!(err, Error::InternalError { suberror: 1 }));
}

#[test]
fn test_unclassified_exit_is_fatal() {
    let mut vcpu = ScriptedVcpu::new(vec![VmExit::Other(8)]);
    let (mut serial, _) = console();

    let err = run_until_halt(&mut vcpu, &mut serial).unwrap_err();
    assert!(matches!(err, Error::UnhandledExit { reason: 8 }));
    assert_eq!(vcpu.runs, 1);
}

#[test]
fn test_mmio_is_logged_and_skipped() {
    let script = vec![
        VmExit::Mmio {
            addr: 0x5000,
            data: vec![0xc3, 0, 0, 0],
            is_write: false,
        },
        putc(b'!'),
        VmExit::Hlt,
    ];
    let mut vcpu = ScriptedVcpu::new(script);
    let (mut serial, output) = console();

    run_until_halt(&mut vcpu, &mut serial).unwrap();
    assert_eq!(vcpu.runs, 3);
    assert_eq!(&*output.lock().unwrap(), b"!");
}

#[test]
fn test_fatal_exits_leave_reporting_to_caller() {
    count_errors();
    let fatal = [
        VmExit::FailEntry {
            reason: 0x80000021,
            cpu: 0,
        },
        VmExit::InternalError { suberror: 1 },
        VmExit::Other(8),
        VmExit::Io {
            port: 0x3f8,
            direction: IoDirection::In,
            size: 1,
            count: 1,
            data: vec![0],
        },
    ];

    for exit in fatal {
        let mut vcpu = ScriptedVcpu::new(vec![exit, VmExit::Hlt]);
        let (mut serial, _) = console();

        let err = run_until_halt(&mut vcpu, &mut serial).unwrap_err();
        assert_eq!(vcpu.runs, 1);
        assert!(!err.to_string().is_empty());
    }
    assert_eq!(ERRORS.load(Ordering::SeqCst), 0);
}

#[test]
fn test_fail_entry_message_names_reason_and_cpu() {
    let err = Error::FailEntry {
        reason: 0x80000021,
        cpu: 2,
    };
    assert_eq!(
        err.to_string(),
        "KVM_EXIT_FAIL_ENTRY: hardware_entry_failure_reason = 0x80000021 (cpu 2)"
    );
}
