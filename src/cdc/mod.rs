//! VW CD-changer (CDC) accessory subsystem.
//!
//! This module emulates a legacy CD changer on the head unit's accessory
//! bus (vwcdpic protocol):
//!
//! 1. **Pulse framer** - decodes button packets from the pulse-width
//!    encoded DataOut line, under interrupt-context constraints.
//! 2. **Packet scanner** - validates framed bytes and resolves them into
//!    semantic buttons via a fixed code table.
//! 3. **Link state machine** - replays the multi-phase announce sequence
//!    the head unit requires and then streams playback status frames
//!    every 50 ms.
//!
//! Decoded buttons are handed to the coordinator through a bounded,
//! lossy channel defined in the firmware layer.

pub mod frame;
pub mod link;
pub mod pulse;
pub mod scanner;

/// Buttons / commands decoded from the head unit.
///
/// `Disc6DoublePress` is never produced by the scanner; the coordinator
/// synthesizes it from two rapid `Disc6` presses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CdcButton {
    NextTrack,
    PrevTrack,
    NextDisc,
    PrevDisc,
    PlayPause,
    ScanToggle,
    RandomToggle,
    Stop,
    Disc1,
    Disc2,
    Disc3,
    Disc4,
    Disc5,
    Disc6,
    Disc6DoublePress,
    Unknown,
}

/// Playback state shown to the head unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// Status snapshot driving the outbound display frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlaybackStatus {
    /// Displayed disc number (1..=6).
    pub disc: u8,
    /// Displayed track number (1..=99).
    pub track: u8,
    /// Play / pause / stop.
    pub state: PlayState,
    /// Shuffle (MIX) indicator.
    pub random_on: bool,
    /// Scan indicator.
    pub scan_on: bool,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            disc: 1,
            track: 1,
            state: PlayState::Playing,
            random_on: false,
            scan_on: false,
        }
    }
}
