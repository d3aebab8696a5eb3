//! CDC display frame encoding (vwcdpic wire format).
//!
//! Every frame is 8 bytes, clocked MSB-first at 62.5 kHz. Steady-state
//! playback layout:
//!
//! ```text
//! Byte 0: command byte          0x34 (play) / 0x74 (idle)
//! Byte 1: 0xBF - disc
//! Byte 2: 0xFF - BCD(track)
//! Byte 3: 0xFF - BCD(minutes)
//! Byte 4: 0xFF - BCD(seconds)
//! Byte 5: mode byte             0x00 none, 0x04 MIX, 0xD0 SCAN, 0xD4 both
//! Byte 6: scan byte             0xCF constant
//! Byte 7: trailer               0x3C (play) / 0x7C (idle)
//! ```
//!
//! Track and time fields are BCD: decimal 99 encodes as 0x99, not 0x63.

/// Play-family command byte (init, lead-in and steady state).
pub const CMD_PLAY: u8 = 0x34;

/// Idle command byte (boot phase only).
pub const CMD_IDLE: u8 = 0x74;

/// Trailer byte for play-family frames.
pub const TRAILER_PLAY: u8 = 0x3C;

/// Trailer byte for idle frames.
pub const TRAILER_IDLE: u8 = 0x7C;

/// Byte 6 of steady-state frames (constant, never toggled).
pub const SCAN_BYTE: u8 = 0xCF;

/// Byte 5 of announce frames.
pub const ANNOUNCE_MODE: u8 = 0xB7;

/// Byte 6 of init-phase normal frames (mute marker).
pub const INIT_MUTE: u8 = 0xEF;

/// Byte 6 of lead-in-phase normal frames (mute marker).
pub const LEAD_IN_MUTE: u8 = 0xAE;

/// "AUDIO CD loaded" announce counter: cycles 0x2E down to 0x29, then
/// wraps (CD1..CD6).
pub const DISC_LOAD_FIRST: u8 = 0x2E;
pub const DISC_LOAD_LAST: u8 = 0x29;

/// Decimal (0..=99) to BCD. Values above 99 clamp.
pub fn to_bcd(val: u8) -> u8 {
    let v = val.min(99);
    ((v / 10) << 4) | (v % 10)
}

/// BCD back to decimal.
pub fn from_bcd(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

/// Byte 5 value for the given indicator flags.
pub fn mode_byte(random_on: bool, scan_on: bool) -> u8 {
    match (scan_on, random_on) {
        (true, true) => 0xD4,
        (true, false) => 0xD0,
        (false, true) => 0x04,
        (false, false) => 0x00,
    }
}

/// Boot-phase idle frame: `74 (BF-disc) (FF-track) FF FF FF 8F 7C`.
pub fn idle(disc: u8, track: u8) -> [u8; 8] {
    [
        CMD_IDLE,
        0xBF - disc,
        0xFF - track,
        0xFF,
        0xFF,
        0xFF,
        0x8F,
        TRAILER_IDLE,
    ]
}

/// Init-phase disc announce: cycles the disc-load indicator while the
/// head unit takes inventory of the "magazine".
pub fn init_announce(disc_load: u8) -> [u8; 8] {
    [
        CMD_PLAY,
        disc_load,
        0xFF - 0x99, // 99 tracks
        0xFF - 0x99, // 99 minutes
        0xFF - 0x59, // 59 seconds
        ANNOUNCE_MODE,
        0xFF,
        TRAILER_PLAY,
    ]
}

/// Init-phase placeholder playback frame (time fields blanked).
pub fn init_normal(disc: u8, track: u8) -> [u8; 8] {
    [
        CMD_PLAY,
        0xBF - disc,
        0xFF - track,
        0xFF,
        0xFF,
        0xFF,
        INIT_MUTE,
        TRAILER_PLAY,
    ]
}

/// Lead-in disc announce: low nibble of the disc, flagged with 0x20.
pub fn lead_in_announce(disc: u8) -> [u8; 8] {
    [
        CMD_PLAY,
        (disc & 0x0F) | 0x20,
        0xFF - 0x99,
        0xFF - 0x99,
        0xFF - 0x59,
        ANNOUNCE_MODE,
        0xFF,
        TRAILER_PLAY,
    ]
}

/// Lead-in placeholder playback frame.
pub fn lead_in_normal(disc: u8, track: u8) -> [u8; 8] {
    [
        CMD_PLAY,
        0xBF - disc,
        0xFF - track,
        0xFF,
        0xFF,
        0xFF,
        LEAD_IN_MUTE,
        TRAILER_PLAY,
    ]
}

/// Steady-state playback frame. Track and time are BCD-encoded then
/// inverted per the wire format.
pub fn play(disc: u8, track: u8, minutes: u8, seconds: u8, mode: u8) -> [u8; 8] {
    [
        CMD_PLAY,
        0xBF - disc,
        0xFF - to_bcd(track),
        0xFF - to_bcd(minutes),
        0xFF - to_bcd(seconds),
        mode,
        SCAN_BYTE,
        TRAILER_PLAY,
    ]
}
