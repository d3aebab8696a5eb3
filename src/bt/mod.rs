//! BT1036 Bluetooth audio module driver.
//!
//! The module speaks a line-oriented AT dialect over UART at 115200
//! baud. Commands are serialized through a bounded queue with exactly
//! one in flight; unsolicited `+EVENT:value` lines carry connection,
//! playback and track state.

pub mod driver;
pub mod queue;

pub use driver::{BtDriver, TimeUpdate};
pub use queue::CommandQueue;

/// Combined A2DP/AVRCP connection state as reported by the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    ConnectedIdle,
    Playing,
    Paused,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected | Self::Connecting)
    }
}

/// `+A2DPSTAT` numeric codes. Unknown codes keep the previous state.
pub(crate) fn a2dp_stat_state(code: u8) -> Option<ConnectionState> {
    match code {
        0 | 1 => Some(ConnectionState::Disconnected),
        2 => Some(ConnectionState::Connecting),
        3 => Some(ConnectionState::ConnectedIdle),
        4 => Some(ConnectionState::Paused),
        5 => Some(ConnectionState::Playing),
        _ => None,
    }
}

/// `+PLAYSTAT` numeric codes. Only meaningful while connected.
pub(crate) fn play_stat_state(code: u8) -> Option<ConnectionState> {
    match code {
        0 => Some(ConnectionState::ConnectedIdle),
        1 => Some(ConnectionState::Playing),
        2 => Some(ConnectionState::Paused),
        // Fast-forward / rewind both display as playing.
        3 | 4 => Some(ConnectionState::Playing),
        _ => None,
    }
}

/// Decoded `+DEVSTAT` bit flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceStatusFlags {
    pub power_on: bool,
    pub br_discoverable: bool,
    pub ble_advertising: bool,
    pub br_scanning: bool,
    pub ble_scanning: bool,
}

impl DeviceStatusFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            power_on: bits & 0b00001 != 0,
            br_discoverable: bits & 0b00010 != 0,
            ble_advertising: bits & 0b00100 != 0,
            br_scanning: bits & 0b01000 != 0,
            ble_scanning: bits & 0b10000 != 0,
        }
    }
}

/// Track metadata assembled from `+TRACKSTAT` / `+TRACKINFO` lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub elapsed_sec: u32,
    pub total_sec: u32,
    pub title: heapless::String<64>,
    pub artist: heapless::String<64>,
    pub album: heapless::String<64>,
    /// False until the first metadata line arrives for the current track.
    pub valid: bool,
}

/// Callbacks for connection-state edges, invoked from line handling.
///
/// Passed per call rather than stored so the driver holds no references
/// into the rest of the system.
pub trait ConnectionObserver {
    fn on_state_change(&mut self, old: ConnectionState, new: ConnectionState);
}

/// Observer that ignores every event (boot and tests).
pub struct NullObserver;

impl ConnectionObserver for NullObserver {
    fn on_state_change(&mut self, _old: ConnectionState, _new: ConnectionState) {}
}
