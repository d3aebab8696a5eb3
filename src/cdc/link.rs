//! Head-unit link state machine.
//!
//! The head unit only lists the accessory in its source menu after
//! observing an exact boot sequence: 20 idle frames, 24 alternating
//! announce/normal init frames, 10 alternating lead-in frames, then
//! continuous playback frames. Phase lengths are exact; skipping or
//! shortening a phase leaves the accessory invisible or misidentified.
//!
//! One frame is produced per `next_frame` call; the firmware's transmit
//! task calls it on a 50 ms ticker, which fixes the cadence.

use crate::cdc::frame;
use crate::cdc::{PlayState, PlaybackStatus};
use crate::config::{CDC_BT_TIME_FRESH_MS, INDICATOR_PULSE_MS};

/// Boot/steady phases. Transitions are linear; the machine only re-enters
/// the sequence via `restart`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum LinkPhase {
    /// 20 idle frames while the head unit warms up.
    IdleThenPlay { remaining: u8 },
    /// 24 frames alternating disc announce / placeholder playback.
    InitPlay { remaining: u8, disc_load: u8 },
    /// 10 alternating frames with the lead-in mute marker.
    PlayLeadIn { remaining: u8 },
    /// Steady state, indefinite.
    Play,
}

/// Periodic transmitter state for the head-unit display protocol.
pub struct CdcLink {
    phase: LinkPhase,
    status: PlaybackStatus,

    play_minutes: u8,
    play_seconds: u8,
    last_second_ms: u64,
    /// Set while externally supplied (Bluetooth) time is authoritative.
    last_bt_time_ms: Option<u64>,

    /// Pending auto-revert deadlines for the momentary indicators.
    scan_revert_ms: Option<u64>,
    random_revert_ms: Option<u64>,
}

impl CdcLink {
    pub const fn new() -> Self {
        Self {
            phase: LinkPhase::IdleThenPlay { remaining: 20 },
            status: PlaybackStatus {
                disc: 1,
                track: 1,
                state: PlayState::Playing,
                random_on: false,
                scan_on: false,
            },
            play_minutes: 0,
            play_seconds: 0,
            last_second_ms: 0,
            last_bt_time_ms: None,
            scan_revert_ms: None,
            random_revert_ms: None,
        }
    }

    /// Re-enter the full boot sequence (after a bus restart).
    pub fn restart(&mut self) {
        self.phase = LinkPhase::IdleThenPlay { remaining: 20 };
        #[cfg(feature = "defmt")]
        defmt::info!("CDC link: restart, IdleThenPlay (20 frames)");
    }

    /// Set displayed disc and track. Resets elapsed time to 00:00, as a
    /// track change restarts the counter.
    pub fn set_disc_track(&mut self, disc: u8, track: u8) {
        self.status.disc = disc;
        self.status.track = track;
        self.play_minutes = 0;
        self.play_seconds = 0;
    }

    pub fn set_play_state(&mut self, state: PlayState) {
        self.status.state = state;
    }

    pub fn set_random(&mut self, on: bool) {
        self.status.random_on = on;
    }

    pub fn set_scan(&mut self, on: bool) {
        self.status.scan_on = on;
    }

    /// Flash the MIX indicator; reverts automatically after 500 ms.
    pub fn pulse_random(&mut self, now_ms: u64) {
        self.status.random_on = true;
        self.random_revert_ms = Some(now_ms + INDICATOR_PULSE_MS);
    }

    /// Flash the SCAN indicator; reverts automatically after 500 ms.
    pub fn pulse_scan(&mut self, now_ms: u64) {
        self.status.scan_on = true;
        self.scan_revert_ms = Some(now_ms + INDICATOR_PULSE_MS);
    }

    /// Externally supplied play time (from Bluetooth track progress).
    ///
    /// Suppresses the autonomous 1 Hz clock for the next 3 s; live
    /// progress is authoritative while it keeps arriving.
    pub fn set_play_time(&mut self, minutes: u8, seconds: u8, now_ms: u64) {
        self.play_minutes = minutes.min(99);
        self.play_seconds = seconds.min(59);
        self.last_bt_time_ms = Some(now_ms);
    }

    /// Current display status snapshot (safe to expose to collaborators).
    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    /// Displayed elapsed time as (minutes, seconds).
    pub fn play_time(&self) -> (u8, u8) {
        (self.play_minutes, self.play_seconds)
    }

    /// Build the next outbound frame and advance the machine.
    ///
    /// Must be called once per 50 ms bus slot.
    pub fn next_frame(&mut self, now_ms: u64) -> [u8; 8] {
        self.service_indicators(now_ms);
        self.service_clock(now_ms);

        let disc = self.status.disc.clamp(1, 6);
        let track = self.status.track.clamp(1, 99);

        match self.phase {
            LinkPhase::IdleThenPlay { remaining } => {
                self.phase = if remaining > 1 {
                    LinkPhase::IdleThenPlay {
                        remaining: remaining - 1,
                    }
                } else {
                    #[cfg(feature = "defmt")]
                    defmt::info!("CDC link: InitPlay (24 frames)");
                    LinkPhase::InitPlay {
                        remaining: 24,
                        disc_load: frame::DISC_LOAD_FIRST,
                    }
                };
                frame::idle(disc, track)
            }

            LinkPhase::InitPlay {
                remaining,
                disc_load,
            } => {
                // Even countdown values are announce slots.
                let announce = remaining % 2 == 0;
                let out = if announce {
                    frame::init_announce(disc_load)
                } else {
                    frame::init_normal(disc, track)
                };

                let next_load = if announce {
                    if disc_load == frame::DISC_LOAD_LAST {
                        frame::DISC_LOAD_FIRST
                    } else {
                        disc_load - 1
                    }
                } else {
                    disc_load
                };

                self.phase = if remaining > 1 {
                    LinkPhase::InitPlay {
                        remaining: remaining - 1,
                        disc_load: next_load,
                    }
                } else {
                    #[cfg(feature = "defmt")]
                    defmt::info!("CDC link: PlayLeadIn (10 frames)");
                    LinkPhase::PlayLeadIn { remaining: 10 }
                };
                out
            }

            LinkPhase::PlayLeadIn { remaining } => {
                let announce = remaining % 2 == 0;
                let out = if announce {
                    frame::lead_in_announce(disc)
                } else {
                    frame::lead_in_normal(disc, track)
                };

                self.phase = if remaining > 1 {
                    LinkPhase::PlayLeadIn {
                        remaining: remaining - 1,
                    }
                } else {
                    #[cfg(feature = "defmt")]
                    defmt::info!("CDC link: Play (steady state)");
                    // Anchor the elapsed-time clock to the moment playback
                    // frames begin.
                    self.last_second_ms = now_ms;
                    LinkPhase::Play
                };
                out
            }

            LinkPhase::Play => frame::play(
                disc,
                track,
                self.play_minutes,
                self.play_seconds,
                frame::mode_byte(self.status.random_on, self.status.scan_on),
            ),
        }
    }

    /// Auto-revert expired indicator pulses.
    fn service_indicators(&mut self, now_ms: u64) {
        if let Some(deadline) = self.scan_revert_ms {
            if now_ms >= deadline {
                self.scan_revert_ms = None;
                self.status.scan_on = false;
            }
        }
        if let Some(deadline) = self.random_revert_ms {
            if now_ms >= deadline {
                self.random_revert_ms = None;
                self.status.random_on = false;
            }
        }
    }

    /// Autonomous 1 Hz elapsed-time clock, suppressed while Bluetooth
    /// progress updates are fresh.
    fn service_clock(&mut self, now_ms: u64) {
        let bt_time_active = self
            .last_bt_time_ms
            .is_some_and(|t| now_ms.saturating_sub(t) < CDC_BT_TIME_FRESH_MS);

        let playing = self.phase == LinkPhase::Play && self.status.state == PlayState::Playing;

        if playing && !bt_time_active && now_ms.saturating_sub(self.last_second_ms) >= 1000 {
            self.last_second_ms = now_ms;
            self.play_seconds += 1;
            if self.play_seconds >= 60 {
                self.play_seconds = 0;
                self.play_minutes += 1;
                if self.play_minutes >= 100 {
                    self.play_minutes = 0;
                }
            }
        }
    }
}

impl Default for CdcLink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdc::frame::{CMD_IDLE, CMD_PLAY, INIT_MUTE, LEAD_IN_MUTE, SCAN_BYTE};

    /// Pull `n` frames at a 50 ms cadence starting from `t0`.
    fn pull(link: &mut CdcLink, t0: u64, n: usize) -> (u64, heapless::Vec<[u8; 8], 128>) {
        let mut t = t0;
        let mut out = heapless::Vec::new();
        for _ in 0..n {
            out.push(link.next_frame(t)).unwrap();
            t += 50;
        }
        (t, out)
    }

    #[test]
    fn boot_sequence_phase_lengths_are_exact() {
        let mut link = CdcLink::new();
        let (_, frames) = pull(&mut link, 0, 60);

        // Frames 0..20: idle.
        for f in &frames[..20] {
            assert_eq!(f[0], CMD_IDLE);
        }
        // Frames 20..44: init play (announce frames have 0xFF at byte 6,
        // normal frames the init mute marker).
        for (i, f) in frames[20..44].iter().enumerate() {
            assert_eq!(f[0], CMD_PLAY);
            let announce = i % 2 == 0; // remaining starts at 24 (even)
            if announce {
                assert_eq!(f[6], 0xFF);
            } else {
                assert_eq!(f[6], INIT_MUTE);
            }
        }
        // Frames 44..54: lead-in.
        for (i, f) in frames[44..54].iter().enumerate() {
            let announce = i % 2 == 0;
            if announce {
                assert_eq!(f[1], 0x21); // (disc 1 & 0x0F) | 0x20
            } else {
                assert_eq!(f[6], LEAD_IN_MUTE);
            }
        }
        // Frames 54..: steady state play, indefinitely.
        for f in &frames[54..] {
            assert_eq!(f[0], CMD_PLAY);
            assert_eq!(f[6], SCAN_BYTE);
        }
    }

    #[test]
    fn disc_load_indicator_cycles_downward_and_wraps() {
        let mut link = CdcLink::new();
        let (_, frames) = pull(&mut link, 0, 44);
        let loads: heapless::Vec<u8, 12> = frames[20..44]
            .iter()
            .step_by(2)
            .map(|f| f[1])
            .collect();
        assert_eq!(
            loads.as_slice(),
            &[0x2E, 0x2D, 0x2C, 0x2B, 0x2A, 0x29, 0x2E, 0x2D, 0x2C, 0x2B, 0x2A, 0x29]
        );
    }

    fn play_state_link() -> (CdcLink, u64) {
        let mut link = CdcLink::new();
        let (t, _) = pull(&mut link, 0, 54);
        (link, t)
    }

    #[test]
    fn play_frame_encodes_status_bcd_inverted() {
        let (mut link, t) = play_state_link();
        link.set_disc_track(3, 42);
        link.set_play_time(12, 34, t);

        let f = link.next_frame(t);
        assert_eq!(f[1], 0xBF - 3);
        assert_eq!(f[2], 0xFF - 0x42);
        assert_eq!(f[3], 0xFF - 0x12);
        assert_eq!(f[4], 0xFF - 0x34);
    }

    #[test]
    fn autonomous_clock_ticks_once_per_second_while_playing() {
        let (mut link, t) = play_state_link();
        assert_eq!(link.play_time(), (0, 0));

        // 2.5 s of 50 ms frames.
        let (_, _) = pull(&mut link, t, 50);
        assert_eq!(link.play_time(), (0, 2));
    }

    #[test]
    fn clock_does_not_tick_while_paused() {
        let (mut link, t) = play_state_link();
        link.set_play_state(PlayState::Paused);
        let (_, _) = pull(&mut link, t, 50);
        assert_eq!(link.play_time(), (0, 0));
    }

    #[test]
    fn bt_time_suppresses_autonomous_clock_while_fresh() {
        let (mut link, t) = play_state_link();
        link.set_play_time(1, 30, t);

        // Within 3 s of the update the clock must not advance.
        let (t, _) = pull(&mut link, t, 40); // 2 s
        assert_eq!(link.play_time(), (1, 30));

        // Once stale, local timekeeping resumes.
        let (_, _) = pull(&mut link, t, 60); // 3 s more
        assert!(link.play_time() > (1, 30));
    }

    #[test]
    fn seconds_wrap_into_minutes() {
        let (mut link, t) = play_state_link();
        link.set_play_time(0, 59, t);
        // Wait out the BT freshness window plus one second tick.
        let (_, _) = pull(&mut link, t, 90);
        let (m, s) = link.play_time();
        assert_eq!(m, 1);
        assert!(s < 59);
    }

    #[test]
    fn indicator_pulse_reverts_after_500ms() {
        let (mut link, t) = play_state_link();
        link.pulse_scan(t);

        let f = link.next_frame(t);
        assert_eq!(f[5], 0xD0);

        // 400 ms later: still flashing.
        let f = link.next_frame(t + 400);
        assert_eq!(f[5], 0xD0);

        // 500 ms later: reverted to neutral.
        let f = link.next_frame(t + 500);
        assert_eq!(f[5], 0x00);
        assert!(!link.status().scan_on);
    }

    #[test]
    fn both_indicators_combine_in_mode_byte() {
        let (mut link, t) = play_state_link();
        link.pulse_scan(t);
        link.pulse_random(t);
        let f = link.next_frame(t);
        assert_eq!(f[5], 0xD4);
    }

    #[test]
    fn restart_replays_the_full_sequence() {
        let (mut link, t) = play_state_link();
        link.restart();
        let f = link.next_frame(t);
        assert_eq!(f[0], CMD_IDLE);
    }

    #[test]
    fn out_of_range_disc_and_track_are_clamped_on_the_wire() {
        let (mut link, t) = play_state_link();
        link.set_disc_track(0, 200);
        let f = link.next_frame(t);
        assert_eq!(f[1], 0xBF - 1);
        assert_eq!(f[2], 0xFF - 0x99);
    }
}
