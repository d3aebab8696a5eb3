//! Pulse-width decoder for the head unit's DataOut line.
//!
//! The head unit signals button presses as 32-bit packets encoded in the
//! length of LOW pulses:
//!
//! ```text
//! Start pulse:  LOW >= 3200 µs (carries no data, resets the framer)
//! Bit '1':      LOW >= 1248 µs
//! Bit '0':      LOW >=  256 µs (below 1248 µs)
//! Noise:        LOW <   256 µs (discarded)
//! ```
//!
//! `PulseFramer::on_edge` runs in interrupt context on target: constant
//! time, no allocation, no blocking. Decoded bytes go into a fixed
//! 24-byte capture ring consumed by the packet scanner in task context;
//! every measured pulse additionally lands in a diagnostic ring so field
//! debugging can see raw timings even when nothing decodes.

use crate::config::{
    CAPTURE_BUFFER_SIZE, PULSE_GLITCH_FLOOR_US, PULSE_NOISE_THRESHOLD_US, PULSE_ONE_THRESHOLD_US,
    PULSE_PACKET_BITS, PULSE_START_THRESHOLD_US, RAW_PULSE_CLAMP_US, RAW_PULSE_LOG_SIZE,
};

/// Pulse classification thresholds (µs).
///
/// Tunable at runtime for boards with different level-shifter timing;
/// `Default` matches the vwcdpic reference values in `config`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseThresholds {
    /// Minimum valid pulse; shorter is discarded as noise.
    pub noise_us: u32,
    /// Pulses at or above this decode as a logical '1'.
    pub one_us: u32,
    /// Pulses at or above this begin a new packet.
    pub start_us: u32,
}

impl Default for PulseThresholds {
    fn default() -> Self {
        Self {
            noise_us: PULSE_NOISE_THRESHOLD_US,
            one_us: PULSE_ONE_THRESHOLD_US,
            start_us: PULSE_START_THRESHOLD_US,
        }
    }
}

/// Overwrite-oldest ring of raw pulse durations for field diagnostics.
///
/// Written from interrupt context, drained from task context. Losing
/// entries under overload is fine - this is a debugging aid, decode
/// correctness never depends on it.
pub struct RawPulseLog {
    // One slot is a gap marker, so head == tail always means empty and
    // the ring still holds RAW_PULSE_LOG_SIZE entries.
    buf: [u16; RAW_PULSE_LOG_SIZE + 1],
    head: usize,
    tail: usize,
}

impl RawPulseLog {
    pub const fn new() -> Self {
        Self {
            buf: [0; RAW_PULSE_LOG_SIZE + 1],
            head: 0,
            tail: 0,
        }
    }

    /// Record a pulse duration, clamped to the log ceiling.
    pub fn push(&mut self, duration_us: u32) {
        let clamped = duration_us.min(RAW_PULSE_CLAMP_US) as u16;
        self.buf[self.head] = clamped;
        self.head = (self.head + 1) % self.buf.len();
        if self.head == self.tail {
            // Overwrite oldest.
            self.tail = (self.tail + 1) % self.buf.len();
        }
    }

    /// Pop the oldest recorded duration, if any.
    pub fn pop(&mut self) -> Option<u16> {
        if self.head == self.tail {
            return None;
        }
        let d = self.buf[self.tail];
        self.tail = (self.tail + 1) % self.buf.len();
        Some(d)
    }

    /// Drain all recorded durations into `sink`, oldest first.
    pub fn drain(&mut self, mut sink: impl FnMut(u16)) {
        while let Some(d) = self.pop() {
            sink(d);
        }
    }
}

/// Fixed-capacity ring of decoded bytes.
///
/// Single producer (the framer, interrupt context), single consumer (the
/// scanner's read cursor). The consumer never passes the producer;
/// backpressure is implicit in the buffer size.
pub struct ByteCaptureBuffer {
    data: [u8; CAPTURE_BUFFER_SIZE],
    write: usize,
}

impl ByteCaptureBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0; CAPTURE_BUFFER_SIZE],
            write: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        self.data[self.write] = byte;
        self.write = (self.write + 1) % CAPTURE_BUFFER_SIZE;
    }

    /// Current producer position.
    pub fn write_pos(&self) -> usize {
        self.write
    }

    /// Byte at an absolute ring index.
    pub fn at(&self, index: usize) -> u8 {
        self.data[index % CAPTURE_BUFFER_SIZE]
    }

    /// Number of unread bytes between `from` and the producer position.
    pub fn available_from(&self, from: usize) -> usize {
        if self.write >= from {
            self.write - from
        } else {
            CAPTURE_BUFFER_SIZE - from + self.write
        }
    }
}

/// Interrupt-context pulse framer.
///
/// Converts edge timestamps into framed bytes. There is no error path:
/// malformed timing simply never completes a byte, and the next start
/// pulse resets the bit counters.
pub struct PulseFramer {
    thresholds: PulseThresholds,
    capture: ByteCaptureBuffer,
    raw: RawPulseLog,

    // Bit assembly state.
    packet_in_progress: bool,
    bits_left_in_byte: u8,
    bits_left_in_packet: u8,
    current_byte: u8,

    // LOW pulse measurement.
    last_falling_us: u64,
    measuring_low: bool,

    // Edge counters for periodic diagnostics.
    falling_edges: u32,
    rising_edges: u32,
}

impl PulseFramer {
    pub const fn new(thresholds: PulseThresholds) -> Self {
        Self {
            thresholds,
            capture: ByteCaptureBuffer::new(),
            raw: RawPulseLog::new(),
            packet_in_progress: false,
            bits_left_in_byte: 8,
            bits_left_in_packet: 0,
            current_byte: 0,
            last_falling_us: 0,
            measuring_low: false,
            falling_edges: 0,
            rising_edges: 0,
        }
    }

    /// Feed one edge transition. `rising` is the line level after the
    /// edge; `now_us` is a monotonic microsecond timestamp.
    pub fn on_edge(&mut self, rising: bool, now_us: u64) {
        if !rising {
            // Falling edge: start measuring the LOW pulse.
            self.falling_edges = self.falling_edges.wrapping_add(1);
            self.last_falling_us = now_us;
            self.measuring_low = true;
            return;
        }

        // Rising edge: the LOW pulse just ended.
        self.rising_edges = self.rising_edges.wrapping_add(1);
        if !self.measuring_low {
            return; // Spurious edge, no matching falling edge seen.
        }
        self.measuring_low = false;

        let low_us = now_us.saturating_sub(self.last_falling_us) as u32;

        // Log every measured pulse, noise included, for field debugging.
        self.raw.push(low_us);

        // Extremely short pulses suggest an inverted or floating line.
        if low_us < PULSE_GLITCH_FLOOR_US {
            return;
        }

        if low_us < self.thresholds.noise_us {
            return; // Noise.
        }

        if low_us >= self.thresholds.start_us {
            // Start pulse: reset packet framing. The pulse itself
            // carries no data.
            self.packet_in_progress = true;
            self.bits_left_in_packet = PULSE_PACKET_BITS;
            self.bits_left_in_byte = 8;
            self.current_byte = 0;
            return;
        }

        if !self.packet_in_progress || self.bits_left_in_packet == 0 {
            return; // Data pulse outside a packet.
        }

        // Shift the bit in MSB-first.
        let bit = low_us >= self.thresholds.one_us;
        self.current_byte <<= 1;
        if bit {
            self.current_byte |= 0x01;
        }

        self.bits_left_in_byte -= 1;
        self.bits_left_in_packet -= 1;

        if self.bits_left_in_byte == 0 {
            self.capture.push(self.current_byte);
            self.bits_left_in_byte = 8;
            self.current_byte = 0;
        }

        if self.bits_left_in_packet == 0 {
            self.packet_in_progress = false;
        }
    }

    /// Shared view of the decoded-byte ring for the scanner.
    pub fn capture(&self) -> &ByteCaptureBuffer {
        &self.capture
    }

    /// Raw pulse diagnostic ring.
    pub fn raw_log(&mut self) -> &mut RawPulseLog {
        &mut self.raw
    }

    /// (falling, rising) edge counts since start.
    pub fn edge_counts(&self) -> (u32, u32) {
        (self.falling_edges, self.rising_edges)
    }
}
