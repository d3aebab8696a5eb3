//! Glue between head-unit buttons, the display link and the Bluetooth
//! driver.
//!
//! Owns the button debounce/double-press filter, the track-number
//! display state machine and the connect/disconnect reactions. All
//! methods take explicit `now_ms` so the logic runs the same on host
//! and on target.

use crate::bt::{BtDriver, ConnectionState};
use crate::cdc::link::CdcLink;
use crate::cdc::{CdcButton, PlayState};
use crate::config::{
    BT_VOLUME_MAX, BUTTON_DEBOUNCE_MS, DOUBLE_PRESS_WINDOW_MS, JUST_CONNECTED_HOLD_MS,
    TRACK_JUST_CONNECTED, TRACK_WAITING_FOR_BT,
};

/// What the head unit's track display currently shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayMode {
    /// Track 80: no phone connected.
    WaitingForBt,
    /// Track 10: new device paired, held for 5 s.
    JustConnected,
    /// Track counter driven by button presses, time by the phone.
    NormalPlayback,
}

/// Actions the coordinator cannot perform itself and hands up to the
/// firmware layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemRequest {
    /// Persist the toggled network-config flag and restart.
    ToggleNetworkConfig,
}

pub struct Coordinator {
    disc: u8,
    track: u8,
    is_playing: bool,
    hfp_muted: bool,

    last_button: CdcButton,
    last_button_ms: u64,
    /// Armed while a first Disc6 press waits for a possible second.
    disc6_armed_ms: Option<u64>,

    display_mode: DisplayMode,
    connected_shown_ms: u64,
    last_bt_state: ConnectionState,
    auto_play_sent: bool,
    /// Set when the user explicitly asked for a new device (Disc4/Disc6);
    /// a connection is then announced with the 5 s track-10 hold.
    pairing_mode: bool,
}

impl Coordinator {
    /// Create the coordinator and put the display into the waiting
    /// state (track 80, play indicator on).
    pub fn new(link: &mut CdcLink) -> Self {
        link.set_disc_track(1, TRACK_WAITING_FOR_BT);
        link.set_play_state(PlayState::Playing);
        link.set_random(false);
        link.set_scan(false);
        Self {
            disc: 1,
            track: TRACK_WAITING_FOR_BT,
            is_playing: false,
            hfp_muted: false,
            last_button: CdcButton::Unknown,
            last_button_ms: 0,
            disc6_armed_ms: None,
            display_mode: DisplayMode::WaitingForBt,
            connected_shown_ms: 0,
            last_bt_state: ConnectionState::Disconnected,
            auto_play_sent: false,
            pairing_mode: false,
        }
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn track(&self) -> u8 {
        self.track
    }

    /// Handle a decoded head-unit button press.
    pub fn on_button(
        &mut self,
        btn: CdcButton,
        now_ms: u64,
        link: &mut CdcLink,
        bt: &mut BtDriver,
    ) -> Option<SystemRequest> {
        // Repeats of the same button inside the debounce window are
        // bus chatter, not presses.
        if btn == self.last_button
            && now_ms.saturating_sub(self.last_button_ms) < BUTTON_DEBOUNCE_MS
        {
            return None;
        }
        self.last_button = btn;
        self.last_button_ms = now_ms;

        // Disc6 is deferred: a second press within the window makes a
        // double press, otherwise `tick` fires the single-press action.
        let btn = if btn == CdcButton::Disc6 {
            match self.disc6_armed_ms {
                Some(armed) if now_ms.saturating_sub(armed) < DOUBLE_PRESS_WINDOW_MS => {
                    self.disc6_armed_ms = None;
                    self.last_button = CdcButton::Disc6DoublePress;
                    CdcButton::Disc6DoublePress
                }
                _ => {
                    self.disc6_armed_ms = Some(now_ms);
                    return None;
                }
            }
        } else {
            btn
        };

        #[cfg(feature = "defmt")]
        defmt::info!("button: {}", btn);

        match btn {
            CdcButton::NextTrack => {
                if self.display_mode != DisplayMode::NormalPlayback {
                    self.display_mode = DisplayMode::NormalPlayback;
                    self.track = 1;
                }
                self.track = if self.track < 99 { self.track + 1 } else { 1 };
                link.set_disc_track(self.disc, self.track);
                bt.next_track();
            }

            CdcButton::PrevTrack => {
                if self.display_mode != DisplayMode::NormalPlayback {
                    self.display_mode = DisplayMode::NormalPlayback;
                    self.track = 2;
                }
                self.track = if self.track > 1 { self.track - 1 } else { 99 };
                link.set_disc_track(self.disc, self.track);
                bt.prev_track();
            }

            CdcButton::PlayPause | CdcButton::Disc1 => {
                self.is_playing = !self.is_playing;
                if self.is_playing {
                    bt.play();
                    link.set_play_state(PlayState::Playing);
                } else {
                    bt.pause();
                    link.set_play_state(PlayState::Paused);
                }
            }

            CdcButton::Stop | CdcButton::Disc2 => {
                self.is_playing = false;
                bt.stop();
                link.set_play_state(PlayState::Stopped);
            }

            CdcButton::Disc3 => {
                self.hfp_muted = !self.hfp_muted;
                bt.set_mic_mute(self.hfp_muted);
            }

            CdcButton::Disc4 => {
                bt.enter_pairing_mode();
                self.enter_waiting(link);
                self.pairing_mode = true;
            }

            CdcButton::Disc5 => {
                bt.disconnect();
                bt.hfp_disconnect();
                self.enter_waiting(link);
            }

            CdcButton::Disc6DoublePress => {
                return Some(SystemRequest::ToggleNetworkConfig);
            }

            // Call controls on the otherwise unused toggles, with a
            // brief indicator flash as feedback.
            CdcButton::ScanToggle => {
                bt.hangup_call();
                link.pulse_scan(now_ms);
            }

            CdcButton::RandomToggle => {
                bt.answer_call();
                link.pulse_random(now_ms);
            }

            // A single CD changer has no disc switching to offer.
            CdcButton::NextDisc | CdcButton::PrevDisc => {}

            CdcButton::Disc6 | CdcButton::Unknown => {}
        }
        None
    }

    /// Periodic housekeeping: the deferred Disc6 single press, the
    /// connect/disconnect reactions and the track-10 hold timeout.
    pub fn tick(&mut self, now_ms: u64, link: &mut CdcLink, bt: &mut BtDriver) {
        if let Some(armed) = self.disc6_armed_ms {
            if now_ms.saturating_sub(armed) >= DOUBLE_PRESS_WINDOW_MS {
                self.disc6_armed_ms = None;
                bt.clear_paired_devices();
                self.enter_waiting(link);
                self.pairing_mode = true;
            }
        }

        let bt_state = bt.state();

        // Disconnected -> connected edge.
        if self.last_bt_state == ConnectionState::Disconnected && bt_state.is_connected() {
            bt.set_speaker_volume(BT_VOLUME_MAX);

            if self.pairing_mode {
                self.display_mode = DisplayMode::JustConnected;
                self.connected_shown_ms = now_ms;
                self.track = TRACK_JUST_CONNECTED;
                link.set_disc_track(self.disc, self.track);
                self.auto_play_sent = false;
                #[cfg(feature = "defmt")]
                defmt::info!("new device connected, holding track {}", self.track);
            } else {
                self.enter_playback(link);
                if !self.auto_play_sent {
                    self.auto_play_sent = true;
                    bt.play();
                    #[cfg(feature = "defmt")]
                    defmt::info!("reconnected, auto-play sent");
                }
            }
        }

        // Any state -> disconnected edge.
        if bt_state == ConnectionState::Disconnected
            && self.last_bt_state != ConnectionState::Disconnected
        {
            self.enter_waiting(link);
            self.auto_play_sent = false;
            #[cfg(feature = "defmt")]
            defmt::info!("disconnected, showing track {}", self.track);
        }

        self.last_bt_state = bt_state;

        // End of the 5 s track-10 hold.
        if self.display_mode == DisplayMode::JustConnected
            && now_ms.saturating_sub(self.connected_shown_ms) > JUST_CONNECTED_HOLD_MS
        {
            self.pairing_mode = false;
            self.enter_playback(link);
            if !self.auto_play_sent {
                self.auto_play_sent = true;
                bt.play();
            }
        }
    }

    fn enter_waiting(&mut self, link: &mut CdcLink) {
        self.display_mode = DisplayMode::WaitingForBt;
        self.track = TRACK_WAITING_FOR_BT;
        link.set_disc_track(self.disc, self.track);
    }

    fn enter_playback(&mut self, link: &mut CdcLink) {
        self.display_mode = DisplayMode::NormalPlayback;
        self.track = 1;
        self.is_playing = true;
        link.set_disc_track(self.disc, self.track);
        link.set_play_state(PlayState::Playing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bt::NullObserver;

    fn fixture() -> (Coordinator, CdcLink, BtDriver) {
        let mut link = CdcLink::new();
        let coord = Coordinator::new(&mut link);
        let mut bt = BtDriver::new(0);
        // Drain the boot handshake so command assertions start clean.
        let mut obs = NullObserver;
        for _ in 0..3 {
            assert!(bt.service(0).is_some());
            bt.handle_line("OK", 0, &mut obs);
        }
        // Keep the background status poll out of the command assertions.
        bt.set_poll_paused(true);
        (coord, link, bt)
    }

    /// Dispatch and acknowledge every queued command, collecting them.
    fn drain(bt: &mut BtDriver, now_ms: u64) -> heapless::Vec<heapless::String<32>, 16> {
        let mut out = heapless::Vec::new();
        let mut obs = NullObserver;
        while let Some(cmd) = bt.service(now_ms) {
            let cmd: heapless::String<32> = cmd.try_into().unwrap();
            out.push(cmd).unwrap();
            bt.handle_line("OK", now_ms, &mut obs);
        }
        out
    }

    fn connect(bt: &mut BtDriver, now_ms: u64) {
        let mut obs = NullObserver;
        bt.handle_line("+A2DPSTAT=3", now_ms, &mut obs);
    }

    #[test]
    fn repeated_button_within_debounce_window_is_ignored() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::NextTrack, 1000, &mut link, &mut bt);
        coord.on_button(CdcButton::NextTrack, 1100, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 1100).len(), 1);

        // Past the window it counts again.
        coord.on_button(CdcButton::NextTrack, 1400, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 1400).len(), 1);
    }

    #[test]
    fn first_skip_leaves_waiting_mode_at_a_sane_track() {
        let (mut coord, mut link, mut bt) = fixture();
        assert_eq!(coord.track(), 80);

        coord.on_button(CdcButton::NextTrack, 1000, &mut link, &mut bt);
        assert_eq!(coord.display_mode(), DisplayMode::NormalPlayback);
        assert_eq!(coord.track(), 2);

        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::PrevTrack, 1000, &mut link, &mut bt);
        assert_eq!(coord.track(), 1);
    }

    #[test]
    fn track_counter_wraps_at_both_ends() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::PrevTrack, 1000, &mut link, &mut bt);
        assert_eq!(coord.track(), 1);
        coord.on_button(CdcButton::PrevTrack, 2000, &mut link, &mut bt);
        assert_eq!(coord.track(), 99);
        coord.on_button(CdcButton::NextTrack, 3000, &mut link, &mut bt);
        assert_eq!(coord.track(), 1);
    }

    #[test]
    fn play_pause_toggles_and_drives_both_sides() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::Disc1, 1000, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 1000).as_slice(), &["AT+PLAY"]);
        assert_eq!(link.status().state, PlayState::Playing);

        coord.on_button(CdcButton::Disc1, 2000, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 2000).as_slice(), &["AT+PAUSE"]);
        assert_eq!(link.status().state, PlayState::Paused);
    }

    #[test]
    fn pairing_button_queues_handshake_and_shows_track_80() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::Disc4, 1000, &mut link, &mut bt);
        assert_eq!(
            drain(&mut bt, 1000).as_slice(),
            &["AT+A2DPDISC", "AT+HFPDISC", "AT+SCAN=1"]
        );
        assert_eq!(coord.display_mode(), DisplayMode::WaitingForBt);
        assert_eq!(coord.track(), 80);
    }

    #[test]
    fn disc6_single_press_fires_after_the_window() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::Disc6, 1000, &mut link, &mut bt);
        // Nothing yet: the press is armed awaiting a possible second.
        assert!(drain(&mut bt, 1000).is_empty());

        coord.tick(1400, &mut link, &mut bt);
        assert!(drain(&mut bt, 1400).is_empty());

        coord.tick(1500, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 1500).as_slice(), &["AT+DELPD"]);
        assert_eq!(coord.track(), 80);
    }

    #[test]
    fn disc6_double_press_requests_network_toggle() {
        let (mut coord, mut link, mut bt) = fixture();
        assert_eq!(
            coord.on_button(CdcButton::Disc6, 1000, &mut link, &mut bt),
            None
        );
        let req = coord.on_button(CdcButton::Disc6, 1350, &mut link, &mut bt);
        assert_eq!(req, Some(SystemRequest::ToggleNetworkConfig));

        // The armed single press must not fire afterwards.
        coord.tick(2000, &mut link, &mut bt);
        assert!(drain(&mut bt, 2000).is_empty());
    }

    #[test]
    fn pairing_connect_holds_track_10_then_plays() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::Disc4, 1000, &mut link, &mut bt);
        drain(&mut bt, 1000);

        connect(&mut bt, 2000);
        coord.tick(2000, &mut link, &mut bt);
        assert_eq!(coord.display_mode(), DisplayMode::JustConnected);
        assert_eq!(coord.track(), 10);
        // Connect reaction sets the volume but does not auto-play yet.
        assert_eq!(drain(&mut bt, 2000).as_slice(), &["AT+SPKVOL=15,15"]);

        // Still holding at 4.9 s.
        coord.tick(6900, &mut link, &mut bt);
        assert_eq!(coord.track(), 10);

        coord.tick(7100, &mut link, &mut bt);
        assert_eq!(coord.display_mode(), DisplayMode::NormalPlayback);
        assert_eq!(coord.track(), 1);
        assert_eq!(drain(&mut bt, 7100).as_slice(), &["AT+PLAY"]);

        // The hold must not re-fire.
        coord.tick(8000, &mut link, &mut bt);
        assert!(drain(&mut bt, 8000).is_empty());
    }

    #[test]
    fn reconnect_plays_immediately_without_hold() {
        let (mut coord, mut link, mut bt) = fixture();
        connect(&mut bt, 2000);
        coord.tick(2000, &mut link, &mut bt);

        assert_eq!(coord.display_mode(), DisplayMode::NormalPlayback);
        assert_eq!(coord.track(), 1);
        assert_eq!(
            drain(&mut bt, 2000).as_slice(),
            &["AT+SPKVOL=15,15", "AT+PLAY"]
        );
        assert_eq!(link.status().state, PlayState::Playing);
    }

    #[test]
    fn disconnect_returns_to_waiting_display() {
        let (mut coord, mut link, mut bt) = fixture();
        let mut obs = NullObserver;
        connect(&mut bt, 2000);
        coord.tick(2000, &mut link, &mut bt);
        drain(&mut bt, 2000);

        bt.handle_line("+A2DPSTAT=0", 9000, &mut obs);
        coord.tick(9000, &mut link, &mut bt);
        assert_eq!(coord.display_mode(), DisplayMode::WaitingForBt);
        assert_eq!(coord.track(), 80);

        // A later reconnect auto-plays again.
        connect(&mut bt, 10_000);
        coord.tick(10_000, &mut link, &mut bt);
        assert_eq!(
            drain(&mut bt, 10_000).as_slice(),
            &["AT+SPKVOL=15,15", "AT+PLAY"]
        );
    }

    #[test]
    fn call_buttons_map_to_hfp_and_flash_indicators() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::RandomToggle, 1000, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 1000).as_slice(), &["AT+HFPANSW"]);
        assert!(link.status().random_on);

        coord.on_button(CdcButton::ScanToggle, 2000, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 2000).as_slice(), &["AT+HFPCHUP"]);
        assert!(link.status().scan_on);
    }

    #[test]
    fn disc_switching_buttons_do_nothing() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::NextDisc, 1000, &mut link, &mut bt);
        coord.on_button(CdcButton::PrevDisc, 2000, &mut link, &mut bt);
        assert!(drain(&mut bt, 2000).is_empty());
        assert_eq!(coord.track(), 80);
    }

    #[test]
    fn mic_mute_toggles_on_and_off() {
        let (mut coord, mut link, mut bt) = fixture();
        coord.on_button(CdcButton::Disc3, 1000, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 1000).as_slice(), &["AT+MICMUTE=1"]);
        coord.on_button(CdcButton::Disc3, 2000, &mut link, &mut bt);
        assert_eq!(drain(&mut bt, 2000).as_slice(), &["AT+MICMUTE=0"]);
    }
}
