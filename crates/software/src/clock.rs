//! Tempo tracking at 24 pulses per quarter note, and the gate phases derived from it.
//!
//! The engine never reads the time itself; every operation takes the current [`Instant`] so the same code runs
//! against a hardware time driver or a test's fabricated timeline.

use crate::configuration::{ClockDivision, MAX_BPM, MIN_BPM};
use embassy_time::{Duration, Instant};

/// MIDI clock resolution.
pub const TICKS_PER_BEAT: u8 = 24;

/// Longest a division pulse stays high, in ticks.
pub const MAX_PULSE_TICKS: u8 = 4;

const MICROS_PER_MINUTE: u64 = 60_000_000;

/// Time between internally generated ticks at `bpm`.
pub fn tick_interval(bpm: u8) -> Duration {
    let bpm = u64::from(bpm.max(MIN_BPM));
    Duration::from_micros(MICROS_PER_MINUTE / (bpm * u64::from(TICKS_PER_BEAT)))
}

/// Clock phase and tempo measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockEngine {
    /// Position within the beat of the most recent tick. `None` after an external Start, until the first clock.
    tick: Option<u8>,
    /// When the last tick was generated or received.
    last_tick: Option<Instant>,
    /// Start of the external tempo measurement window.
    window_start: Option<Instant>,
    /// External clocks counted since `window_start`.
    window_ticks: u8,
}

impl Default for ClockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockEngine {
    /// Construct a `ClockEngine` sitting on the downbeat.
    pub const fn new() -> Self {
        Self {
            tick: Some(0),
            last_tick: None,
            window_start: None,
            window_ticks: 0,
        }
    }

    /// Position within the beat, 0..24. `None` while waiting for the first clock after a Start.
    pub fn tick(&self) -> Option<u8> {
        self.tick
    }

    fn advance(&mut self) {
        self.tick = Some(match self.tick {
            Some(tick) => (tick + 1) % TICKS_PER_BEAT,
            None => 0,
        });
    }

    /// Generate a tick if at least one tick interval at `bpm` has passed since the last one. The first call only
    /// records the time. Returns whether a tick was generated.
    pub fn advance_internal(&mut self, now: Instant, bpm: u8) -> bool {
        let Some(last_tick) = self.last_tick else {
            self.last_tick = Some(now);
            return false;
        };
        if now.saturating_duration_since(last_tick) < tick_interval(bpm) {
            return false;
        }
        self.last_tick = Some(now);
        self.advance();
        true
    }

    /// Register an incoming MIDI clock. Returns the measured tempo, clamped to the legal BPM range, each time 24
    /// clocks have been counted since the measurement window opened.
    ///
    /// The window opens on the first clock after construction or [`reset_timing`][Self::reset_timing], or on the
    /// Start that [`restart`][Self::restart] registered, and reopens at every measurement. A clock arriving more
    /// than one tick interval at [`MIN_BPM`] after the previous one reopens it too, since the source stalled.
    pub fn external_clock(&mut self, now: Instant) -> Option<u8> {
        self.advance();
        let stalled = self
            .last_tick
            .is_some_and(|last| now.saturating_duration_since(last) > tick_interval(MIN_BPM));
        self.last_tick = Some(now);
        let window_start = match self.window_start {
            Some(start) if !stalled => start,
            _ => {
                self.window_start = Some(now);
                self.window_ticks = 0;
                return None;
            }
        };
        self.window_ticks += 1;
        if self.window_ticks < TICKS_PER_BEAT {
            return None;
        }
        self.window_start = Some(now);
        self.window_ticks = 0;

        let elapsed = now.saturating_duration_since(window_start).as_micros();
        if elapsed == 0 {
            return None;
        }
        let bpm = (MICROS_PER_MINUTE / elapsed).clamp(MIN_BPM.into(), MAX_BPM.into());
        Some(bpm as u8)
    }

    /// Register a MIDI Start: phase becomes undefined until the next clock, which lands on the downbeat, and the
    /// measurement window reopens now.
    pub fn restart(&mut self, now: Instant) {
        self.tick = None;
        self.last_tick = Some(now);
        self.window_start = Some(now);
        self.window_ticks = 0;
    }

    /// Forget every timestamp while keeping the phase. The next internal tick or external clock starts timing
    /// afresh.
    pub fn reset_timing(&mut self) {
        self.last_tick = None;
        self.window_start = None;
        self.window_ticks = 0;
    }

    /// Whether a gate following `division` is high at the current tick.
    ///
    /// Pulses last half a division period, capped at [`MAX_PULSE_TICKS`].
    pub fn is_high(&self, division: ClockDivision) -> bool {
        let Some(tick) = self.tick else {
            return false;
        };
        let period = division.ticks();
        let pulse = (period / 2).min(MAX_PULSE_TICKS);
        tick % period < pulse
    }
}
