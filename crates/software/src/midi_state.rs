use bitflags::bitflags;
use wmidi::{Channel, U14};

mod voice_stack;
pub use voice_stack::*;

/// Number of MIDI channels tracked.
pub const CHANNEL_COUNT: usize = 16;

/// Raw pitch bend value of a centered wheel.
pub const PITCH_BEND_CENTER: u16 = 0x2000;

bitflags! {
    /// Operations that may be performed while handling a single event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Operation: u8 {
        /// A note was added to or removed from a voice stack.
        const NOTE_CHANGE = 0x01;
        /// At least one output was written.
        const OUTPUT_CHANGE = 0x02;
        /// The tempo setting changed as a result of external clock measurement.
        const TEMPO_CHANGE = 0x04;
    }
}

/// A straightforward representation of the MIDI messages the engine has received, per channel.
///
/// Held notes live in one [`VoiceStack`] per channel. Pitch bend is kept as a signed offset from center so it can
/// be folded into pitch computations directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MidiState {
    voices: [VoiceStack; CHANNEL_COUNT],
    pitch_bend: [i16; CHANNEL_COUNT],
}

impl Default for MidiState {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiState {
    /// Construct a `MidiState` with no held notes and every pitch bend centered.
    pub const fn new() -> Self {
        Self {
            voices: [VoiceStack::new(); CHANNEL_COUNT],
            pitch_bend: [0; CHANNEL_COUNT],
        }
    }

    /// Held notes of `channel`.
    pub fn voices(&self, channel: Channel) -> &VoiceStack {
        &self.voices[channel.index() as usize]
    }

    /// Mutable access to the held notes of `channel`.
    pub fn voices_mut(&mut self, channel: Channel) -> &mut VoiceStack {
        &mut self.voices[channel.index() as usize]
    }

    /// Signed pitch bend of `channel`, in -8192..=8191.
    pub fn pitch_bend(&self, channel: Channel) -> i16 {
        self.pitch_bend[channel.index() as usize]
    }

    /// Record the raw 14-bit pitch bend of `channel`. Returns the signed offset that was stored.
    pub fn set_pitch_bend(&mut self, channel: Channel, value: U14) -> i16 {
        let bend = u16::from(value) as i16 - PITCH_BEND_CENTER as i16;
        self.pitch_bend[channel.index() as usize] = bend;
        bend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmidi::Note;

    #[test]
    fn channels_are_independent() {
        let mut state = MidiState::new();
        assert!(state.voices_mut(Channel::Ch1).push(Note::C4));
        assert!(state.voices_mut(Channel::Ch2).push(Note::C4));
        assert!(state.voices_mut(Channel::Ch1).pop(Note::C4));

        assert!(state.voices(Channel::Ch1).is_empty());
        assert_eq!(Some(Note::C4), state.voices(Channel::Ch2).current());
    }

    #[test]
    fn pitch_bend_is_signed() {
        let mut state = MidiState::new();
        assert_eq!(0, state.pitch_bend(Channel::Ch3));

        assert_eq!(
            -8192,
            state.set_pitch_bend(Channel::Ch3, U14::try_from(0u16).unwrap())
        );
        assert_eq!(
            8191,
            state.set_pitch_bend(Channel::Ch3, U14::try_from(0x3fffu16).unwrap())
        );
        assert_eq!(8191, state.pitch_bend(Channel::Ch3));
        assert_eq!(0, state.pitch_bend(Channel::Ch4));
    }
}
