//! Bounded AT command queue with single-command flow control.
//!
//! The BT1036 corrupts its parser when commands overlap, so exactly one
//! command is outstanding at a time. A command is retired by a terminal
//! response (`OK`, `ERROR`, `ERR`) or by a 2 s timeout; either way the
//! next queued command goes out immediately.

use crate::config::{BT_COMMAND_CAPACITY, BT_COMMAND_TIMEOUT_MS};

/// Maximum length of a single AT command line (without CR/LF).
pub const COMMAND_MAX: usize = 32;

type Command = heapless::String<COMMAND_MAX>;

pub struct CommandQueue {
    pending: heapless::Deque<Command, BT_COMMAND_CAPACITY>,
    in_flight: Option<Command>,
    sent_at_ms: u64,
    dropped: u32,
}

impl CommandQueue {
    pub const fn new() -> Self {
        Self {
            pending: heapless::Deque::new(),
            in_flight: None,
            sent_at_ms: 0,
            dropped: 0,
        }
    }

    /// Enqueue a command. When the queue is full the NEW command is
    /// dropped; queued commands are never displaced.
    pub fn push(&mut self, cmd: &str) {
        let Ok(cmd) = Command::try_from(cmd) else {
            self.dropped = self.dropped.wrapping_add(1);
            return;
        };
        if self.pending.push_back(cmd).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!("BT queue full, command dropped ({} total)", self.dropped);
        }
    }

    /// Advance the queue: time out a stuck command, then hand out the
    /// next command to transmit (if the line is free).
    ///
    /// The returned command must be written to the UART by the caller;
    /// it is considered in flight from this call on.
    pub fn service(&mut self, now_ms: u64) -> Option<&str> {
        if self.in_flight.is_some()
            && now_ms.saturating_sub(self.sent_at_ms) >= BT_COMMAND_TIMEOUT_MS
        {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "BT command timed out: {}",
                self.in_flight.as_deref().unwrap_or("")
            );
            self.in_flight = None;
        }

        // Only a freshly dequeued command is handed out; a command
        // already in flight was returned on an earlier call.
        if self.in_flight.is_none() {
            if let Some(cmd) = self.pending.pop_front() {
                self.in_flight = Some(cmd);
                self.sent_at_ms = now_ms;
                return self.in_flight.as_deref();
            }
        }
        None
    }

    /// Terminal success response received.
    pub fn resolve_ok(&mut self) {
        self.in_flight = None;
    }

    /// Terminal error response received. The command is not retried.
    pub fn resolve_err(&mut self) {
        #[cfg(feature = "defmt")]
        if let Some(cmd) = self.in_flight.as_deref() {
            defmt::warn!("BT command rejected: {}", cmd);
        }
        self.in_flight = None;
    }

    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_none()
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
