//! Conversions from logical MIDI values to the levels written to each kind of output, and the trait through which
//! those levels reach hardware.
//!
//! Calibrated outputs are PWM channels filtered and amplified so that [`ZERO_OFFSET`] sits at 0V and the full
//! range spans [`VOLTS_PEAK_TO_PEAK`]. Pitch is 1V/oct with middle C (note 60) at 0V.

use crate::{
    configuration::{HardwareKind, OutputSlot},
    midi_state::PITCH_BEND_CENTER,
};
use measurements::Voltage;
use wmidi::{Note, U7};

/// Bits of output resolution.
pub const RESOLUTION_BITS: u8 = 10;
/// Number of distinct calibrated levels.
pub const FULL_SCALE: u16 = 1 << RESOLUTION_BITS;
/// Highest calibrated level.
pub const MAX_LEVEL: u16 = FULL_SCALE - 1;
/// Calibrated level that produces 0V.
pub const ZERO_OFFSET: u16 = 498;
/// Output swing, in volts, across the full scale.
pub const VOLTS_PEAK_TO_PEAK: f64 = 10.99;
/// Note that sits at [`ZERO_OFFSET`].
pub const MIDDLE_NOTE: u8 = 60;
/// Semitones covered by a full pitch bend in either direction.
pub const PITCH_BEND_RANGE_SEMITONES: f32 = 2.0;
/// Midpoint of the audio oscillators' range; audio-rate outputs are expressed relative to it.
pub const AUDIO_BIAS: i16 = 1 << (RESOLUTION_BITS - 1);

/// A level ready to be written to an output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Absolute level of a calibrated voltage output, in 0..=[`MAX_LEVEL`].
    Calibrated(u16),
    /// Level of an audio-rate output, relative to [`AUDIO_BIAS`].
    Centered(i16),
    /// State of a digital pin.
    Digital(bool),
}

/// The logical value an output should represent, independent of the hardware behind it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// On/off.
    Gate(bool),
    /// A note, bent by a signed 14-bit pitch bend offset.
    Pitch {
        /// Note to sound.
        note: Note,
        /// Signed offset from a centered wheel, in -8192..=8191.
        bend: i16,
    },
    /// A 7-bit value such as velocity, pressure, or a control change.
    SevenBit(U7),
}

impl Signal {
    /// Level representing this signal on an output of `kind`. `None` means nothing should be written: either the
    /// value falls outside the calibrated range, or the output has no way to express it (pitch on a digital pin).
    pub fn level(self, kind: HardwareKind, calibration: &Calibration) -> Option<Level> {
        match (kind, self) {
            (HardwareKind::DigitalGate, Self::Gate(active)) => Some(Level::Digital(active)),
            (HardwareKind::DigitalGate, Self::SevenBit(value)) => {
                Some(Level::Digital(u8::from(value) > 0))
            }
            (HardwareKind::DigitalGate, Self::Pitch { .. }) => None,
            (analog, signal) => {
                let level = match signal {
                    Self::Gate(active) => calibration.gate_level(active),
                    Self::Pitch { note, bend } => calibration.pitch_level(note, bend)?,
                    Self::SevenBit(value) => calibration.seven_bit_level(value),
                };
                Some(match analog {
                    HardwareKind::SynthesizedAudio => {
                        Level::Centered(level as i16 - calibration.audio_bias)
                    }
                    _ => Level::Calibrated(level),
                })
            }
        }
    }
}

/// A MIDI event forwarded to a synthesized-audio slot, for the oscillator code that renders it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceEvent {
    /// A note started.
    NoteOn {
        /// Note that was played.
        note: Note,
        /// Strike velocity.
        velocity: U7,
    },
    /// A held note was released.
    NoteOff {
        /// Note that was released.
        note: Note,
        /// Release velocity.
        velocity: U7,
    },
    /// A Control Change.
    ControlChange {
        /// Controller number.
        control: U7,
        /// New controller value.
        value: U7,
    },
    /// Channel Pressure.
    Aftertouch(U7),
    /// Pitch wheel moved, as a signed offset from center in -8192..=8191.
    PitchBend(i16),
}

/// Something an audio renderer running next to the processor may want to react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioEvent {
    /// A control-rate tick is about to be processed.
    Control,
    /// A clock tick, generated internally or received from an external source.
    Clock,
    /// The transport started.
    Start,
    /// The transport stopped.
    Stop,
    /// An event routed to a [`HardwareKind::SynthesizedAudio`] slot.
    Voice {
        /// Slot the event was routed to.
        slot: OutputSlot,
        /// The event itself.
        event: VoiceEvent,
    },
}

/// Hardware-facing sink for output levels.
pub trait OutputDriver {
    /// Write `level` to `slot`, whose hardware is `kind`.
    fn write(&mut self, slot: OutputSlot, kind: HardwareKind, level: Level);

    /// Observe `event`. Drivers without an audio renderer can ignore these.
    fn notify(&mut self, event: AudioEvent) {
        let _ = event;
    }
}

impl<T: OutputDriver + ?Sized> OutputDriver for &mut T {
    fn write(&mut self, slot: OutputSlot, kind: HardwareKind, level: Level) {
        (**self).write(slot, kind, level)
    }

    fn notify(&mut self, event: AudioEvent) {
        (**self).notify(event)
    }
}

/// Electrical characteristics of the calibrated outputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    /// Level that produces 0V.
    pub zero_offset: u16,
    /// Highest level the output accepts.
    pub max_level: u16,
    /// Voltage swing across [`FULL_SCALE`] levels.
    pub span: Voltage,
    /// Voltage of one octave.
    pub voltage_per_octave: Voltage,
    /// Midpoint of the audio oscillators' range.
    pub audio_bias: i16,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            zero_offset: ZERO_OFFSET,
            max_level: MAX_LEVEL,
            span: Voltage::from_volts(VOLTS_PEAK_TO_PEAK),
            voltage_per_octave: Voltage::from_volts(1.0),
            audio_bias: AUDIO_BIAS,
        }
    }
}

impl Calibration {
    /// Levels per semitone.
    pub fn note_scale(&self) -> f32 {
        let octaves = self.span.as_volts() / self.voltage_per_octave.as_volts();
        (f64::from(FULL_SCALE) / (12.0 * octaves)) as f32
    }

    /// Level for `note` bent by `bend` (a signed offset from center). `None` if the result falls outside
    /// 0..=max_level.
    pub fn pitch_level(&self, note: Note, bend: i16) -> Option<u16> {
        let bend =
            f32::from(bend) / f32::from(PITCH_BEND_CENTER) * PITCH_BEND_RANGE_SEMITONES;
        let semitones = f32::from(note as u8) + bend - f32::from(MIDDLE_NOTE);
        // truncation toward zero, matching the integer conversion the calibration was measured with
        let level = (semitones * self.note_scale() + f32::from(self.zero_offset)) as i32;
        u16::try_from(level).ok().filter(|&level| level <= self.max_level)
    }

    /// Level for a 7-bit value, mapped linearly from 0..=127 onto zero_offset..=max_level.
    pub fn seven_bit_level(&self, value: U7) -> u16 {
        let span = u32::from(self.max_level - self.zero_offset);
        (u32::from(u8::from(value)) * span / 127) as u16 + self.zero_offset
    }

    /// Level for a gate.
    pub fn gate_level(&self, active: bool) -> u16 {
        if active {
            self.max_level
        } else {
            self.zero_offset
        }
    }

    /// Voltage a calibrated level produces.
    pub fn voltage(&self, level: u16) -> Voltage {
        let steps = f64::from(level) - f64::from(self.zero_offset);
        Voltage::from_volts(steps * self.span.as_volts() / f64::from(FULL_SCALE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibration() -> Calibration {
        Calibration::default()
    }

    mod pitch {
        use super::*;

        #[test]
        fn middle_c_is_zero_offset() {
            assert_eq!(Some(ZERO_OFFSET), calibration().pitch_level(Note::C4, 0));
        }

        #[test]
        fn octave_is_one_volt() {
            let level = calibration().pitch_level(Note::C5, 0).unwrap();
            assert_eq!(591, level, "Expected left but got right");
            assert_relative_eq!(
                1.0,
                calibration().voltage(level).as_volts(),
                epsilon = 0.01
            );
        }

        #[test]
        fn full_bend_is_two_semitones() {
            let bent = calibration().pitch_level(Note::C4, 8192).unwrap();
            let unbent = calibration().pitch_level(Note::D4, 0).unwrap();
            assert_eq!(unbent, bent, "Expected left but got right");
        }

        #[test]
        fn above_max_is_rejected() {
            assert!(calibration().pitch_level(Note::G9, 0).is_some());
            assert_eq!(None, calibration().pitch_level(Note::G9, 8191));
        }

        #[test]
        fn below_zero_is_rejected() {
            let calibration = Calibration {
                zero_offset: 10,
                ..calibration()
            };
            assert_eq!(None, calibration.pitch_level(Note::CMinus1, 0));
        }
    }

    #[test]
    fn seven_bit_spans_zero_offset_to_max() {
        let calibration = calibration();
        assert_eq!(ZERO_OFFSET, calibration.seven_bit_level(U7::MIN));
        assert_eq!(MAX_LEVEL, calibration.seven_bit_level(U7::MAX));
        assert_eq!(911, calibration.seven_bit_level(U7::from_u8_lossy(100)));
    }

    #[test]
    fn gate_levels() {
        let calibration = calibration();
        assert_eq!(MAX_LEVEL, calibration.gate_level(true));
        assert_eq!(ZERO_OFFSET, calibration.gate_level(false));
    }

    mod level {
        use super::*;

        #[test]
        fn calibrated_outputs_use_absolute_levels() {
            assert_eq!(
                Some(Level::Calibrated(ZERO_OFFSET)),
                Signal::Pitch { note: Note::C4, bend: 0 }
                    .level(HardwareKind::CalibratedVoltage, &calibration())
            );
        }

        #[test]
        fn audio_outputs_are_zero_centered() {
            assert_eq!(
                Some(Level::Centered(ZERO_OFFSET as i16 - AUDIO_BIAS)),
                Signal::Pitch { note: Note::C4, bend: 0 }
                    .level(HardwareKind::SynthesizedAudio, &calibration())
            );
            assert_eq!(
                Some(Level::Centered(MAX_LEVEL as i16 - AUDIO_BIAS)),
                Signal::Gate(true).level(HardwareKind::SynthesizedAudio, &calibration())
            );
        }

        #[test]
        fn digital_outputs_are_on_or_off() {
            let calibration = calibration();
            assert_eq!(
                Some(Level::Digital(true)),
                Signal::Gate(true).level(HardwareKind::DigitalGate, &calibration)
            );
            assert_eq!(
                Some(Level::Digital(false)),
                Signal::SevenBit(U7::MIN).level(HardwareKind::DigitalGate, &calibration)
            );
            assert_eq!(
                None,
                Signal::Pitch { note: Note::C4, bend: 0 }
                    .level(HardwareKind::DigitalGate, &calibration)
            );
        }

        #[test]
        fn out_of_range_pitch_writes_nothing() {
            assert_eq!(
                None,
                Signal::Pitch { note: Note::G9, bend: 8191 }
                    .level(HardwareKind::CalibratedVoltage, &calibration())
            );
        }
    }
}
