//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place.

// VW CDC DataOut pulse decoder (vwcdpic timing, 32x prescaler origin)

/// Minimum valid LOW pulse (µs). Anything shorter is line noise.
pub const PULSE_NOISE_THRESHOLD_US: u32 = 256;

/// LOW pulses at or above this length decode as a logical '1' (µs).
pub const PULSE_ONE_THRESHOLD_US: u32 = 1248;

/// LOW pulses at or above this length mark the start of a packet (µs).
pub const PULSE_START_THRESHOLD_US: u32 = 3200;

/// Pulses below this are treated as possible inverted-signal glitches
/// and dropped before the noise filter (µs).
pub const PULSE_GLITCH_FLOOR_US: u32 = 100;

/// Bits per button packet (4 bytes).
pub const PULSE_PACKET_BITS: u8 = 32;

/// Decoded-byte capture ring size (6 packets of 4 bytes).
pub const CAPTURE_BUFFER_SIZE: usize = 24;

/// Raw pulse diagnostic ring size (overwrite-oldest).
pub const RAW_PULSE_LOG_SIZE: usize = 64;

/// Raw pulse durations are clamped to this before logging (µs).
pub const RAW_PULSE_CLAMP_US: u32 = 60_000;

// CDC head-unit bus

/// Display frame cadence (ms). The head unit drops the accessory from
/// its source menu if frames stop arriving at this rate.
pub const CDC_FRAME_PERIOD_MS: u64 = 50;

/// Synchronous serial clock toward the head unit (Hz).
pub const CDC_BUS_CLOCK_HZ: u32 = 62_500;

/// Gap between frame bytes on the bus (µs).
pub const CDC_INTER_BYTE_GAP_US: u64 = 874;

/// External (Bluetooth-supplied) play time is authoritative for this
/// long after the last update; afterwards the local 1 Hz clock resumes.
pub const CDC_BT_TIME_FRESH_MS: u64 = 3000;

/// Momentary SCAN/MIX indicator flash duration (ms).
pub const INDICATOR_PULSE_MS: u64 = 500;

// Bluetooth module (AT command link)

/// BT module UART baud rate.
pub const BT_UART_BAUD: u32 = 115_200;

/// Pending command queue depth. Pushes onto a full queue are dropped.
pub const BT_COMMAND_CAPACITY: usize = 10;

/// An in-flight command with no terminal response for this long is
/// treated as failed and dequeued (ms).
pub const BT_COMMAND_TIMEOUT_MS: u64 = 2000;

/// Background A2DP/DEVSTAT status poll interval (ms).
pub const BT_STATUS_POLL_MS: u64 = 3000;

/// Track progress is logged at most once per this interval (ms); the
/// module reports it every second.
pub const BT_TRACK_LOG_MS: u64 = 5000;

/// Received lines longer than this are discarded (runaway input).
pub const BT_LINE_MAX: usize = 250;

/// Module speaker volume scale maximum (A2DP and HFP).
pub const BT_VOLUME_MAX: u8 = 15;

// Coordinator

/// Identical consecutive button presses within this window are dropped (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 300;

/// Second press of the designated button within this window counts as a
/// double press (ms).
pub const DOUBLE_PRESS_WINDOW_MS: u64 = 500;

/// How long the "just connected" track number is shown before normal
/// playback starts (ms).
pub const JUST_CONNECTED_HOLD_MS: u64 = 5000;

/// Synthetic track numbers shown on the head-unit display.
pub const TRACK_WAITING_FOR_BT: u8 = 80;
pub const TRACK_JUST_CONNECTED: u8 = 10;
pub const TRACK_NET_CONFIG_OFF: u8 = 90;
pub const TRACK_NET_CONFIG_ON: u8 = 91;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in `main.rs`.  Adjust for your custom PCB.
//
//   CDC bus SCK          → P0.18  (to head unit)
//   CDC bus MOSI         → P0.23  (to head unit)
//   DataOut pulse input  → P0.04  (from head unit, button commands)
//   BT module UART RX    → P0.16  (MCU RX ← module TX)
//   BT module UART TX    → P0.17  (MCU TX → module RX)

// Settings storage

/// Flash page index where the settings store starts (4 KB per page).
pub const SETTINGS_FLASH_PAGE_START: u32 = 252;

/// Number of flash pages reserved for the settings store.
pub const SETTINGS_FLASH_PAGE_COUNT: u32 = 4;
