//! Unified error type for bt2cdc.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.
//!
//! The protocol core (pulse decode, packet scan, command queue) has no
//! error returns at all: malformed input is logged and recovered from by
//! resynchronization. This type exists for the firmware wiring - serial
//! I/O and the settings store.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// UART transaction with the Bluetooth module failed.
    Uart,

    /// Flash read/write/erase failed in the settings store.
    Storage,
}
