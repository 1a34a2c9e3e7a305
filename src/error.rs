//! Error types for ringvm.

use thiserror::Error;

/// Result type alias using ringvm's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running the guest.
///
/// Every variant is fatal: the controller never retries a failed backend
/// call or an unclassified exit.
#[derive(Error, Debug)]
pub enum Error {
    // Platform/hypervisor errors
    #[error("hypervisor not available on this platform")]
    HypervisorNotAvailable,

    #[error("KVM_GET_API_VERSION {found}, expected {expected}")]
    ApiVersion { found: i32, expected: i32 },

    #[error("KVM_GET_VCPU_MMAP_SIZE unexpectedly small: {size} < {required}")]
    RunStateTooSmall { size: usize, required: usize },

    #[cfg(target_os = "linux")]
    #[error("{op}: {source}")]
    Kvm {
        op: &'static str,
        #[source]
        source: kvm_ioctls::Error,
    },

    // Configuration errors
    #[error("guest image `{0}` is empty or missing")]
    MissingImage(&'static str),

    #[error("invalid guest layout: {0}")]
    InvalidLayout(String),

    // Runtime errors
    #[error("VM not in expected state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error(
        "unhandled KVM_EXIT_IO: port 0x{port:x} direction {direction} size {size} count {count}"
    )]
    UnhandledIo {
        port: u16,
        direction: &'static str,
        size: u8,
        count: u32,
    },

    #[error("KVM_EXIT_FAIL_ENTRY: hardware_entry_failure_reason = 0x{reason:x} (cpu {cpu})")]
    FailEntry { reason: u64, cpu: u32 },

    #[error("KVM_EXIT_INTERNAL_ERROR: suberror = 0x{suberror:x}")]
    InternalError { suberror: u32 },

    #[error("exit_reason = 0x{reason:x}")]
    UnhandledExit { reason: u32 },

    // Memory errors
    #[error("memory allocation failed: {0}")]
    MemoryAllocationFailed(String),

    #[error("invalid guest address: 0x{0:x}")]
    InvalidGuestAddress(u64),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a failed KVM ioctl together with the operation that issued it.
    #[cfg(target_os = "linux")]
    pub fn from_kvm(op: &'static str, source: kvm_ioctls::Error) -> Self {
        Error::Kvm { op, source }
    }
}
