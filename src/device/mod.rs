//! Devices visible to the guest.

pub mod serial;

pub use serial::Serial;
