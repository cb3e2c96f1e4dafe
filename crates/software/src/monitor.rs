//! Values published by the signal processor for the user interface.
//!
//! Everything here is best-effort: caches are relaxed atomics a reader may observe slightly stale, and MIDI-learn
//! events overwrite each other until the interface takes the latest one.

use crate::{
    configuration::{OutputSlot, SLOT_COUNT},
    midi_state::CHANNEL_COUNT,
};
use core::sync::atomic::{AtomicI16, AtomicU8, Ordering};
use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use wmidi::{Channel, U7};

const NO_CC: u8 = u8::MAX;

/// What a learnable controller was.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LearnSource {
    /// A control change with the given number.
    Control(U7),
    /// The pitch bend wheel.
    PitchBend,
}

/// A controller movement that an output in learn mode may adopt as its type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LearnEvent {
    /// Channel the message arrived on.
    pub channel: Channel,
    /// Which controller moved.
    pub source: LearnSource,
}

#[cfg(feature = "defmt")]
impl defmt::Format for LearnEvent {
    fn format(&self, fmt: defmt::Formatter) {
        match self.source {
            LearnSource::Control(number) => defmt::write!(
                fmt,
                "LearnEvent {{ channel: {=u8}, cc: {=u8} }}",
                self.channel.number(),
                u8::from(number)
            ),
            LearnSource::PitchBend => defmt::write!(
                fmt,
                "LearnEvent {{ channel: {=u8}, pitch bend }}",
                self.channel.number()
            ),
        }
    }
}

/// Observable state shared between the signal processor (sole writer) and the interface (reader).
pub struct Monitor<M: RawMutex> {
    last_out: [AtomicU8; SLOT_COUNT],
    last_cc: [AtomicU8; CHANNEL_COUNT],
    pitch_bend: [AtomicI16; CHANNEL_COUNT],
    learn: Signal<M, LearnEvent>,
}

impl<M: RawMutex> Default for Monitor<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> Monitor<M> {
    /// Construct a `Monitor` with every value zeroed. Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            last_out: [const { AtomicU8::new(0) }; SLOT_COUNT],
            last_cc: [const { AtomicU8::new(NO_CC) }; CHANNEL_COUNT],
            pitch_bend: [const { AtomicI16::new(0) }; CHANNEL_COUNT],
            learn: Signal::new(),
        }
    }

    /// Last logical value written to `slot`: a note number, a velocity or 7-bit value, or 255/0 for a gate that is
    /// high/low without a velocity.
    pub fn last_out(&self, slot: OutputSlot) -> u8 {
        self.last_out[slot.index()].load(Ordering::Relaxed)
    }

    /// Number of the last control change received on `channel`, if any.
    pub fn last_cc(&self, channel: Channel) -> Option<U7> {
        match self.last_cc[channel.index() as usize].load(Ordering::Relaxed) {
            NO_CC => None,
            number => Some(U7::from_u8_lossy(number)),
        }
    }

    /// Signed pitch bend last received on `channel`.
    pub fn pitch_bend(&self, channel: Channel) -> i16 {
        self.pitch_bend[channel.index() as usize].load(Ordering::Relaxed)
    }

    /// Take the latest learnable controller movement, if one arrived since the last call.
    pub fn take_learn(&self) -> Option<LearnEvent> {
        self.learn.try_take()
    }

    /// Forget any pending learn event, typically when entering learn mode.
    pub fn clear_learn(&self) {
        self.learn.reset();
    }

    pub(crate) fn record_out(&self, slot: OutputSlot, value: u8) {
        self.last_out[slot.index()].store(value, Ordering::Relaxed);
    }

    pub(crate) fn record_cc(&self, channel: Channel, number: U7) {
        self.last_cc[channel.index() as usize].store(number.into(), Ordering::Relaxed);
    }

    pub(crate) fn record_pitch_bend(&self, channel: Channel, bend: i16) {
        self.pitch_bend[channel.index() as usize].store(bend, Ordering::Relaxed);
    }

    pub(crate) fn offer_learn(&self, event: LearnEvent) {
        self.learn.signal(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    #[test]
    fn starts_empty() {
        let monitor = Monitor::<CriticalSectionRawMutex>::new();
        assert_eq!(0, monitor.last_out(OutputSlot::A));
        assert_eq!(None, monitor.last_cc(Channel::Ch1));
        assert_eq!(0, monitor.pitch_bend(Channel::Ch1));
        assert_eq!(None, monitor.take_learn());
    }

    #[test]
    fn records_last_cc_per_channel() {
        let monitor = Monitor::<CriticalSectionRawMutex>::new();
        monitor.record_cc(Channel::Ch2, U7::from_u8_lossy(74));
        assert_eq!(Some(U7::from_u8_lossy(74)), monitor.last_cc(Channel::Ch2));
        assert_eq!(None, monitor.last_cc(Channel::Ch1));
    }

    #[test]
    fn learn_keeps_only_the_latest_event() {
        let monitor = Monitor::<CriticalSectionRawMutex>::new();
        let first = LearnEvent {
            channel: Channel::Ch1,
            source: LearnSource::Control(U7::from_u8_lossy(1)),
        };
        let second = LearnEvent {
            channel: Channel::Ch1,
            source: LearnSource::PitchBend,
        };
        monitor.offer_learn(first);
        monitor.offer_learn(second);

        assert_eq!(Some(second), monitor.take_learn(), "Expected left but got right");
        assert_eq!(None, monitor.take_learn(), "Learn events should be consumed");
    }

    #[test]
    fn clear_learn_drops_pending_event() {
        let monitor = Monitor::<CriticalSectionRawMutex>::new();
        monitor.offer_learn(LearnEvent {
            channel: Channel::Ch1,
            source: LearnSource::PitchBend,
        });
        monitor.clear_learn();
        assert_eq!(None, monitor.take_learn());
    }
}
