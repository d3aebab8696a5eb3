//! Line parser and command surface for the BT1036 module.
//!
//! The driver is purely in-memory: the firmware's UART tasks feed
//! assembled lines into [`BtDriver::handle_line`] and write out whatever
//! [`BtDriver::service`] hands back. Event callbacks go through a
//! [`ConnectionObserver`] passed per call, so the driver never holds
//! references into the rest of the system.

use crate::bt::queue::CommandQueue;
use crate::bt::{
    a2dp_stat_state, play_stat_state, ConnectionObserver, ConnectionState, DeviceStatusFlags,
    TrackMetadata,
};
use crate::config::{BT_STATUS_POLL_MS, BT_TRACK_LOG_MS, BT_VOLUME_MAX};

/// Play-time update extracted from a `+TRACKSTAT` line.
///
/// Returned to the caller instead of applied internally, so the display
/// link can be updated under its own lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimeUpdate {
    pub minutes: u8,
    pub seconds: u8,
}

/// One-shot module provisioning: names, audio levels, profile masks,
/// AVRCP auto-reporting (ID3 + 1 s progress). Queued like any other
/// commands; the module needs a reboot afterwards to apply them.
pub const FACTORY_SETUP: &[&str] = &[
    "AT+NAME=VW_BT1036,0",
    "AT+LENAME=VW_BT1036,0",
    "AT+MICGAIN=8",
    "AT+SPKVOL=12,12",
    "AT+TXPOWER=10",
    "AT+PROFILE=168",
    "AT+AUTOCONN=168",
    "AT+SSP=2",
    "AT+COD=240404",
    "AT+SEP=0",
    "AT+HFPSR=16000",
    "AT+HFPCFG=3",
    "AT+AVRCPCFG=3",
];

pub struct BtDriver {
    queue: CommandQueue,
    state: ConnectionState,
    dev_status: DeviceStatusFlags,
    track: TrackMetadata,
    poll_paused: bool,
    last_poll_ms: u64,
    last_track_log_ms: u64,
}

impl BtDriver {
    /// Create the driver and queue the boot handshake.
    pub fn new(now_ms: u64) -> Self {
        let mut queue = CommandQueue::new();
        queue.push("AT");
        queue.push("AT+VER");
        queue.push("AT+ADDR");
        Self {
            queue,
            state: ConnectionState::Disconnected,
            dev_status: DeviceStatusFlags::default(),
            track: TrackMetadata::default(),
            poll_paused: false,
            last_poll_ms: now_ms,
            last_track_log_ms: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn device_status(&self) -> DeviceStatusFlags {
        self.dev_status
    }

    pub fn track(&self) -> &TrackMetadata {
        &self.track
    }

    /// Suspend the 3 s background status poll (used while a command
    /// burst must not be interleaved with poll traffic).
    pub fn set_poll_paused(&mut self, paused: bool) {
        self.poll_paused = paused;
    }

    /// Handle one assembled response line from the module.
    ///
    /// Returns a play-time update when the line carried track progress;
    /// the caller forwards it to the display link.
    pub fn handle_line(
        &mut self,
        line: &str,
        now_ms: u64,
        observer: &mut dyn ConnectionObserver,
    ) -> Option<TimeUpdate> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("BT << {}", line);

        if line == "OK" {
            self.queue.resolve_ok();
            return None;
        }
        if line.starts_with("ERR") {
            self.queue.resolve_err();
            return None;
        }

        if let Some(code) = numeric_field(line, "+A2DPSTAT=") {
            if let Some(state) = a2dp_stat_state(code as u8) {
                self.set_state(state, observer);
            }
            return None;
        }

        if let Some(code) = numeric_field(line, "+PLAYSTAT=") {
            if let Some(state) = play_stat_state(code as u8) {
                self.set_state(state, observer);
            }
            return None;
        }

        if let Some(bits) = numeric_field(line, "+DEVSTAT=") {
            self.dev_status = DeviceStatusFlags::from_bits(bits as u8);
            return None;
        }

        // +TRACKSTAT=state,elapsed,total (seconds)
        if let Some(params) = line.strip_prefix("+TRACKSTAT=") {
            let mut fields = params.splitn(3, ',');
            let _play_state = fields.next();
            let elapsed = fields.next().and_then(|f| f.trim().parse::<u32>().ok());
            let total = fields.next().and_then(|f| f.trim().parse::<u32>().ok());
            if let (Some(elapsed), Some(total)) = (elapsed, total) {
                self.track.elapsed_sec = elapsed;
                self.track.total_sec = total;
                self.track.valid = true;
                if self.track_log_due(now_ms) {
                    #[cfg(feature = "defmt")]
                    defmt::debug!(
                        "BT track: {=u32}:{=u32:02} / {=u32}:{=u32:02}",
                        elapsed / 60,
                        elapsed % 60,
                        total / 60,
                        total % 60
                    );
                }
                // 0:00 reports arrive while a track is still loading,
                // let the display keep its own clock until real progress.
                if elapsed > 0 {
                    return Some(TimeUpdate {
                        minutes: (elapsed / 60).min(99) as u8,
                        seconds: (elapsed % 60) as u8,
                    });
                }
            }
            return None;
        }

        // +TRACKINFO=title,artist,album (album may be absent)
        if let Some(params) = line.strip_prefix("+TRACKINFO=") {
            let mut fields = params.splitn(3, ',');
            let title = fields.next().map(str::trim);
            let artist = fields.next().map(str::trim);
            let album = fields.next().map(str::trim);
            if let (Some(title), Some(artist)) = (title, artist) {
                if !title.is_empty() {
                    self.track.title = truncated(title);
                    self.track.artist = truncated(artist);
                    self.track.album = truncated(album.unwrap_or(""));
                    self.track.valid = true;
                    #[cfg(feature = "defmt")]
                    defmt::info!(
                        "BT now playing: {} - {}",
                        self.track.title.as_str(),
                        self.track.artist.as_str()
                    );
                }
            }
            return None;
        }

        // Informational responses, logged and otherwise ignored.
        #[cfg(feature = "defmt")]
        if let Some(rest) = line
            .strip_prefix("+NAME=")
            .or_else(|| line.strip_prefix("+LENAME="))
            .or_else(|| line.strip_prefix("+A2DPINFO="))
            .or_else(|| line.strip_prefix("+AVRCPSTAT="))
            .or_else(|| line.strip_prefix("+BROWDATA="))
        {
            defmt::debug!("BT info: {}", rest);
        }

        None
    }

    /// True at most once per `BT_TRACK_LOG_MS` window. The module
    /// reports progress every second; the log does not need to.
    fn track_log_due(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_track_log_ms) >= BT_TRACK_LOG_MS {
            self.last_track_log_ms = now_ms;
            true
        } else {
            false
        }
    }

    /// Advance command flow: run the 3 s background status poll, time
    /// out a stuck command, and hand out the next command to transmit.
    pub fn service(&mut self, now_ms: u64) -> Option<&str> {
        if !self.poll_paused
            && self.queue.in_flight().is_none()
            && now_ms.saturating_sub(self.last_poll_ms) >= BT_STATUS_POLL_MS
        {
            self.last_poll_ms = now_ms;
            self.queue.push("AT+A2DPSTAT");
            self.queue.push("AT+DEVSTAT");
        }
        self.queue.service(now_ms)
    }

    fn set_state(&mut self, new: ConnectionState, observer: &mut dyn ConnectionObserver) {
        if new == self.state {
            return;
        }
        let old = self.state;
        self.state = new;
        #[cfg(feature = "defmt")]
        defmt::info!("BT state: {} -> {}", old, new);
        observer.on_state_change(old, new);
    }

    // ---- AVRCP / playback ----

    pub fn play(&mut self) {
        self.queue.push("AT+PLAY");
    }

    pub fn pause(&mut self) {
        self.queue.push("AT+PAUSE");
    }

    pub fn play_pause(&mut self) {
        self.queue.push("AT+PLAYPAUSE");
    }

    pub fn stop(&mut self) {
        self.queue.push("AT+STOP");
    }

    pub fn next_track(&mut self) {
        self.queue.push("AT+FORWARD");
    }

    pub fn prev_track(&mut self) {
        self.queue.push("AT+BACKWARD");
    }

    // ---- connection management ----

    /// Drop the current device and open the module for pairing.
    pub fn enter_pairing_mode(&mut self) {
        self.queue.push("AT+A2DPDISC");
        self.queue.push("AT+HFPDISC");
        self.queue.push("AT+SCAN=1");
        #[cfg(feature = "defmt")]
        defmt::info!("BT entering pairing mode");
    }

    /// Reconnect the last paired device.
    pub fn connect_last(&mut self) {
        self.queue.push("AT+A2DPCONN");
    }

    pub fn disconnect(&mut self) {
        self.queue.push("AT+A2DPDISC");
    }

    pub fn hfp_disconnect(&mut self) {
        self.queue.push("AT+HFPDISC");
    }

    /// Forget every paired device.
    pub fn clear_paired_devices(&mut self) {
        self.queue.push("AT+DELPD");
    }

    // ---- HFP ----

    pub fn answer_call(&mut self) {
        self.queue.push("AT+HFPANSW");
    }

    pub fn hangup_call(&mut self) {
        self.queue.push("AT+HFPCHUP");
    }

    pub fn set_mic_mute(&mut self, mute: bool) {
        self.queue
            .push(if mute { "AT+MICMUTE=1" } else { "AT+MICMUTE=0" });
    }

    /// HFP microphone gain, 0..=15.
    pub fn set_mic_gain(&mut self, gain: u8) {
        let gain = gain.min(BT_VOLUME_MAX);
        let mut cmd: heapless::String<16> = heapless::String::new();
        use core::fmt::Write;
        let _ = write!(cmd, "AT+MICGAIN={gain}");
        self.queue.push(&cmd);
    }

    // ---- audio / diagnostics / system ----

    /// A2DP and HFP speaker volume, 0..=15.
    pub fn set_speaker_volume(&mut self, volume: u8) {
        let volume = volume.min(BT_VOLUME_MAX);
        let mut cmd: heapless::String<20> = heapless::String::new();
        use core::fmt::Write;
        let _ = write!(cmd, "AT+SPKVOL={volume},{volume}");
        self.queue.push(&cmd);
    }

    pub fn request_a2dp_stat(&mut self) {
        self.queue.push("AT+A2DPSTAT");
    }

    pub fn request_avrcp_stat(&mut self) {
        self.queue.push("AT+AVRCPSTAT");
    }

    pub fn request_dev_stat(&mut self) {
        self.queue.push("AT+DEVSTAT");
    }

    pub fn soft_reboot(&mut self) {
        self.queue.push("AT+REBOOT");
    }

    /// Queue the one-shot provisioning set. Call with the queue drained;
    /// the drop-new bound applies as for any burst.
    pub fn run_factory_setup(&mut self) {
        for cmd in FACTORY_SETUP {
            self.queue.push(cmd);
        }
        #[cfg(feature = "defmt")]
        defmt::info!("BT factory setup queued");
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &CommandQueue {
        &self.queue
    }
}

fn numeric_field(line: &str, prefix: &str) -> Option<u32> {
    line.strip_prefix(prefix)?.trim().parse().ok()
}

fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
