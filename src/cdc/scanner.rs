//! Button packet scanner - polled consumer of the capture ring.
//!
//! Packets are 4 bytes: `[0x53] [0x2C] [cmd] [~cmd]`, with `cmd` a
//! multiple of 4. Validation involves checksum arithmetic and a table
//! lookup, which is why it runs in task context rather than inside the
//! edge interrupt: the framer's interrupt work stays constant-time.
//!
//! On any validation failure the read cursor advances by exactly one
//! byte and scanning resumes - the cursor never stalls.

use crate::cdc::pulse::ByteCaptureBuffer;
use crate::cdc::CdcButton;

/// First sync byte of every button packet.
pub const SYNC1: u8 = 0x53;

/// Second sync byte of every button packet.
pub const SYNC2: u8 = 0x2C;

/// Command code → button, as observed on an RNS-MFD head unit.
///
/// 0x14 (key repeat) and 0x38 (CD confirm) are deliberately absent:
/// they are service codes the bridge ignores.
const BUTTON_CODES: &[(u8, CdcButton)] = &[
    (0xF8, CdcButton::NextTrack),
    (0x78, CdcButton::PrevTrack),
    (0x0C, CdcButton::Disc1),
    (0x8C, CdcButton::Disc2),
    (0x4C, CdcButton::Disc3),
    (0xCC, CdcButton::Disc4),
    (0x2C, CdcButton::Disc5),
    (0xAC, CdcButton::Disc6),
    (0xA0, CdcButton::ScanToggle),
    (0xE0, CdcButton::RandomToggle),
];

/// Resolve a validated command code to a button.
pub fn button_for_code(code: u8) -> CdcButton {
    BUTTON_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, b)| *b)
        .unwrap_or(CdcButton::Unknown)
}

/// Scans the capture ring for valid packets.
///
/// Holds the persistent read cursor; the capture ring itself lives in
/// the framer so the interrupt side never touches scanner state.
pub struct ButtonPacketScanner {
    cursor: usize,
}

impl ButtonPacketScanner {
    pub const fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Scan everything decoded since the last call.
    ///
    /// Calls `emit` once per valid, mapped button. Unknown codes are
    /// validated (cursor advances past them) but not forwarded.
    pub fn scan(&mut self, buf: &ByteCaptureBuffer, mut emit: impl FnMut(CdcButton)) {
        while self.cursor != buf.write_pos() {
            if buf.at(self.cursor) != SYNC1 {
                self.advance(1);
                continue;
            }

            if buf.available_from(self.cursor) < 4 {
                return; // Wait for the rest of the packet.
            }

            let sync2 = buf.at(self.cursor + 1);
            let code = buf.at(self.cursor + 2);
            let check = buf.at(self.cursor + 3);

            if sync2 != SYNC2 {
                self.advance(1);
                continue;
            }

            if code.wrapping_add(check) != 0xFF {
                #[cfg(feature = "defmt")]
                defmt::debug!("CDC: bad checksum {=u8:#04x} + {=u8:#04x}", code, check);
                self.advance(1);
                continue;
            }

            if code & 0x03 != 0 {
                #[cfg(feature = "defmt")]
                defmt::debug!("CDC: cmd code not multiple of 4: {=u8:#04x}", code);
                self.advance(1);
                continue;
            }

            let button = button_for_code(code);
            #[cfg(feature = "defmt")]
            defmt::debug!("CDC: cmd {=u8:#04x} -> {}", code, button);

            if button != CdcButton::Unknown {
                emit(button);
            }

            self.advance(4);
        }
    }

    fn advance(&mut self, by: usize) {
        self.cursor = (self.cursor + by) % crate::config::CAPTURE_BUFFER_SIZE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc::pulse::{PulseFramer, PulseThresholds};

    /// Push raw bytes through the framer's capture ring.
    fn framer_with(bytes: &[u8]) -> PulseFramer {
        let mut f = PulseFramer::new(PulseThresholds::default());
        let mut t = 0u64;
        let mut pulse = |f: &mut PulseFramer, low: u64| {
            f.on_edge(false, t);
            t += low;
            f.on_edge(true, t);
            t += 700;
        };
        for chunk in bytes.chunks(4) {
            pulse(&mut f, 4500);
            for &b in chunk {
                for bit in (0..8).rev() {
                    pulse(&mut f, if (b >> bit) & 1 == 1 { 1770 } else { 650 });
                }
            }
        }
        f
    }

    fn scan_all(bytes: &[u8]) -> heapless::Vec<CdcButton, 8> {
        let f = framer_with(bytes);
        let mut s = ButtonPacketScanner::new();
        let mut out = heapless::Vec::new();
        s.scan(f.capture(), |b| out.push(b).unwrap());
        out
    }

    #[test]
    fn valid_packet_resolves_button() {
        let out = scan_all(&[0x53, 0x2C, 0xF8, 0x07]);
        assert_eq!(out.as_slice(), &[CdcButton::NextTrack]);
    }

    #[test]
    fn all_mapped_codes_resolve() {
        assert_eq!(button_for_code(0x78), CdcButton::PrevTrack);
        assert_eq!(button_for_code(0x0C), CdcButton::Disc1);
        assert_eq!(button_for_code(0x8C), CdcButton::Disc2);
        assert_eq!(button_for_code(0x4C), CdcButton::Disc3);
        assert_eq!(button_for_code(0xCC), CdcButton::Disc4);
        assert_eq!(button_for_code(0x2C), CdcButton::Disc5);
        assert_eq!(button_for_code(0xAC), CdcButton::Disc6);
        assert_eq!(button_for_code(0xA0), CdcButton::ScanToggle);
        assert_eq!(button_for_code(0xE0), CdcButton::RandomToggle);
    }

    #[test]
    fn service_codes_are_unmapped() {
        assert_eq!(button_for_code(0x14), CdcButton::Unknown);
        assert_eq!(button_for_code(0x38), CdcButton::Unknown);
    }

    #[test]
    fn unknown_code_is_consumed_but_not_forwarded() {
        // 0x14 validates (0x14 + 0xEB = 0xFF, multiple of 4) but has no
        // button mapping.
        let out = scan_all(&[0x53, 0x2C, 0x14, 0xEB]);
        assert!(out.is_empty());
    }

    #[test]
    fn bad_checksum_advances_exactly_one_byte() {
        // Broken packet followed by a valid one; the valid packet must
        // still be found after single-byte resync.
        let out = scan_all(&[0x53, 0x2C, 0xF8, 0x00, 0x53, 0x2C, 0x78, 0x87]);
        assert_eq!(out.as_slice(), &[CdcButton::PrevTrack]);
    }

    #[test]
    fn wrong_second_sync_resyncs() {
        let out = scan_all(&[0x53, 0x00, 0xF8, 0x07, 0x53, 0x2C, 0xAC, 0x53]);
        assert_eq!(out.as_slice(), &[CdcButton::Disc6]);
    }

    #[test]
    fn code_not_multiple_of_four_is_rejected() {
        // 0x55 + 0xAA = 0xFF but 0x55 & 0x03 != 0.
        let out = scan_all(&[0x53, 0x2C, 0x55, 0xAA]);
        assert!(out.is_empty());
    }

    #[test]
    fn partial_packet_waits_for_more_bytes() {
        let f = framer_with(&[0x53, 0x2C]);
        let mut s = ButtonPacketScanner::new();
        let mut hits = 0;
        s.scan(f.capture(), |_| hits += 1);
        assert_eq!(hits, 0);

        // Scanning again with the remainder present completes the packet.
        let f = framer_with(&[0x53, 0x2C, 0x0C, 0xF3]);
        s = ButtonPacketScanner::new();
        s.scan(f.capture(), |_| hits += 1);
        assert_eq!(hits, 1);
    }

    #[test]
    fn garbage_stream_always_advances() {
        // No 0x53 anywhere: the cursor must catch up to the writer.
        let f = framer_with(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        let mut s = ButtonPacketScanner::new();
        s.scan(f.capture(), |_| panic!("no packet expected"));
        assert_eq!(f.capture().available_from(s.cursor), 0);
    }

    #[test]
    fn back_to_back_packets_both_resolve() {
        let out = scan_all(&[0x53, 0x2C, 0xF8, 0x07, 0x53, 0x2C, 0x78, 0x87]);
        assert_eq!(out.as_slice(), &[CdcButton::NextTrack, CdcButton::PrevTrack]);
    }
}
