//! Transport-agnostic MIDI events and the queue that funnels every transport into the signal processor.
//!
//! Transports (UART, USB, Bluetooth) run in their own contexts and only ever `try_send` into an [`EventQueue`].
//! The processor is the queue's only consumer, so voice stacks and outputs are mutated from a single context no
//! matter how many transports are active.

use crate::{output::OutputDriver, processor::SignalProcessor};
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel as Queue, TrySendError},
};
use embassy_time::{Duration, Ticker};
use wmidi::{Channel, MidiMessage, Note, U7, U14};

/// Capacity used by [`DefaultEventQueue`].
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// Period of the control loop: the audio engine's 1024 Hz control rate.
pub const CONTROL_PERIOD: Duration = Duration::from_hz(1024);

/// Bounded multi-producer, single-consumer queue of [`MidiEvent`]s.
pub type EventQueue<M, const N: usize> = Queue<M, MidiEvent, N>;

/// [`EventQueue`] of [`EVENT_QUEUE_DEPTH`] events.
pub type DefaultEventQueue<M> = EventQueue<M, EVENT_QUEUE_DEPTH>;

/// The MIDI messages the engine reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiEvent {
    /// A key was struck.
    NoteOn {
        /// Channel the message arrived on.
        channel: Channel,
        /// Key.
        note: Note,
        /// Strike velocity; zero is treated as a release.
        velocity: U7,
    },
    /// A key was released.
    NoteOff {
        /// Channel the message arrived on.
        channel: Channel,
        /// Key.
        note: Note,
        /// Release velocity.
        velocity: U7,
    },
    /// A controller moved.
    ControlChange {
        /// Channel the message arrived on.
        channel: Channel,
        /// Controller number.
        control: U7,
        /// New value.
        value: U7,
    },
    /// Channel pressure changed.
    Aftertouch {
        /// Channel the message arrived on.
        channel: Channel,
        /// New pressure.
        value: U7,
    },
    /// The pitch bend wheel moved.
    PitchBend {
        /// Channel the message arrived on.
        channel: Channel,
        /// Raw 14-bit position; 0x2000 is centered.
        value: U14,
    },
    /// One MIDI clock pulse (24 per quarter note).
    Clock,
    /// Transport started.
    Start,
    /// Transport stopped.
    Stop,
}

#[cfg(feature = "defmt")]
impl defmt::Format for MidiEvent {
    fn format(&self, fmt: defmt::Formatter) {
        match *self {
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => defmt::write!(
                fmt,
                "NoteOn {{ channel: {=u8}, note: {}, velocity: {=u8} }}",
                channel.number(),
                note.to_str(),
                u8::from(velocity)
            ),
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => defmt::write!(
                fmt,
                "NoteOff {{ channel: {=u8}, note: {}, velocity: {=u8} }}",
                channel.number(),
                note.to_str(),
                u8::from(velocity)
            ),
            Self::ControlChange {
                channel,
                control,
                value,
            } => defmt::write!(
                fmt,
                "ControlChange {{ channel: {=u8}, control: {=u8}, value: {=u8} }}",
                channel.number(),
                u8::from(control),
                u8::from(value)
            ),
            Self::Aftertouch { channel, value } => defmt::write!(
                fmt,
                "Aftertouch {{ channel: {=u8}, value: {=u8} }}",
                channel.number(),
                u8::from(value)
            ),
            Self::PitchBend { channel, value } => defmt::write!(
                fmt,
                "PitchBend {{ channel: {=u8}, value: {=u16} }}",
                channel.number(),
                u16::from(value)
            ),
            Self::Clock => defmt::write!(fmt, "Clock"),
            Self::Start => defmt::write!(fmt, "Start"),
            Self::Stop => defmt::write!(fmt, "Stop"),
        }
    }
}

impl MidiEvent {
    /// Extract the event a parsed MIDI message carries. Messages the engine has no use for yield `None`.
    pub fn from_message(message: &MidiMessage<'_>) -> Option<Self> {
        match *message {
            MidiMessage::NoteOn(channel, note, velocity) => Some(Self::NoteOn {
                channel,
                note,
                velocity,
            }),
            MidiMessage::NoteOff(channel, note, velocity) => Some(Self::NoteOff {
                channel,
                note,
                velocity,
            }),
            MidiMessage::ControlChange(channel, control, value) => Some(Self::ControlChange {
                channel,
                control: U7::from_u8_lossy(u8::from(control)),
                value,
            }),
            MidiMessage::ChannelPressure(channel, value) => {
                Some(Self::Aftertouch { channel, value })
            }
            MidiMessage::PitchBendChange(channel, value) => {
                Some(Self::PitchBend { channel, value })
            }
            MidiMessage::TimingClock => Some(Self::Clock),
            MidiMessage::Start => Some(Self::Start),
            MidiMessage::Stop => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Queue `event` without waiting. Returns `false`, dropping the event, if the queue is full.
pub fn offer<M: RawMutex, const N: usize>(queue: &EventQueue<M, N>, event: MidiEvent) -> bool {
    match queue.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!("MIDI event queue full; dropping {:?}", event);
            false
        }
    }
}

/// Drive `processor` from `queue` forever, once every `period`: drain pending events, then run the control tick.
pub async fn control_loop<S, M, D, const N: usize>(
    processor: &mut SignalProcessor<'_, S, D>,
    queue: &EventQueue<M, N>,
    period: Duration,
) -> !
where
    S: RawMutex,
    M: RawMutex,
    D: OutputDriver,
{
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        processor.service(queue);
    }
}
