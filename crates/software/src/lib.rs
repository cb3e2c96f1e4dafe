//! This crate contains architecture-agnostic logic for the uRack MIDI-to-CV module, which translates
//! [MIDI](https://midi.org/midi-1-0) messages into [CV/gate](https://en.wikipedia.org/wiki/CV/gate) levels, clock
//! pulses, and audio-rate oscillator targets.
//!
//! Transports parse bytes into [`dispatch::MidiEvent`]s and queue them; a single [`processor::SignalProcessor`]
//! drains the queue at control rate, routes each event through the [`store::SettingsStore`], and writes levels
//! through an [`output::OutputDriver`].

#![deny(missing_docs)]
#![no_std]

#[cfg(test)]
extern crate std;

mod fmt;

pub mod clock;
pub mod configuration;
pub mod dispatch;
/// Data structures for tracking MIDI messages the device has received.
pub mod midi_state;
pub mod monitor;
pub mod output;
pub mod persistence;
pub mod processor;
pub mod store;
