//! Core logic for the bt2cdc head-unit bridge.
//!
//! Everything here is hardware-free: pulse decoding, the display-bus
//! frame machinery, the BT1036 AT driver and the coordinator all take
//! explicit timestamps and byte buffers, so the whole crate tests on
//! the host with plain `cargo test`.
//!
//! The embedded firmware entry point lives in main.rs behind the
//! `embedded` feature and wires these modules to the nRF52840
//! peripherals.

#![cfg_attr(not(test), no_std)]

pub mod bt;
pub mod cdc;
pub mod config;
pub mod coordinator;
pub mod error;

pub use error::Error;
