use super::HardwareKind;
use core::fmt;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use wmidi::U7;

const CC_ORDINAL: u8 = 5;
const DIVISION_ORDINAL: u8 = CC_ORDINAL + 128;
const RUN_ORDINAL: u8 = DIVISION_ORDINAL + 6;
const STOP_ORDINAL: u8 = RUN_ORDINAL + 1;

/// Highest ordinal a [`MidiOutType`] may take.
pub const LAST_OUT_TYPE_ORDINAL: u8 = STOP_ORDINAL;

/// Note value a clock-division output pulses at, in terms of the 24 PPQN MIDI clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDivision {
    /// One pulse per beat.
    Quarter,
    /// Two pulses per beat.
    Eighth,
    /// Four pulses per beat.
    Sixteenth,
    /// Eight pulses per beat.
    ThirtySecond,
    /// Three pulses per beat.
    EighthTriplet,
    /// Six pulses per beat.
    SixteenthTriplet,
}

impl ClockDivision {
    /// Length of one division period in clock ticks.
    pub fn ticks(self) -> u8 {
        match self {
            Self::Quarter => 24,
            Self::Eighth => 12,
            Self::Sixteenth => 6,
            Self::ThirtySecond => 3,
            Self::EighthTriplet => 8,
            Self::SixteenthTriplet => 4,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Quarter => "1/4",
            Self::Eighth => "1/8",
            Self::Sixteenth => "1/16",
            Self::ThirtySecond => "1/32",
            Self::EighthTriplet => "1/8T",
            Self::SixteenthTriplet => "1/16T",
        }
    }
}

/// The signal an output produces, and therefore which MIDI messages drive it.
///
/// Variants have a stable ordinal: `Gate` through `PitchBend` are 0-4, `Cc(n)` is `5 + n`, the six clock
/// divisions follow at 133-138, then `Run` (139) and `Stop` (140). Ordinals are what gets persisted, and stepping
/// through them is how an encoder edits an output's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiOutType {
    /// High while any note is held on the routed channel.
    Gate,
    /// 1V/oct pitch of the sounding note, bent by the channel's pitch bend.
    Pitch,
    /// Velocity of the most recent note-on; returns to zero when the channel goes silent.
    Velocity,
    /// Channel pressure.
    AfterTouch,
    /// Upper seven bits of the channel's pitch bend.
    PitchBend,
    /// Value of the given control change number.
    Cc(U7),
    /// Gate pulses derived from the clock at the given division.
    ClockDivision(ClockDivision),
    /// High while the transport runs.
    Run,
    /// High while the transport is stopped.
    Stop,
}

#[cfg(feature = "defmt")]
impl defmt::Format for MidiOutType {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Gate => defmt::write!(fmt, "Gate"),
            Self::Pitch => defmt::write!(fmt, "Pitch"),
            Self::Velocity => defmt::write!(fmt, "Velocity"),
            Self::AfterTouch => defmt::write!(fmt, "AfterTouch"),
            Self::PitchBend => defmt::write!(fmt, "PitchBend"),
            Self::Cc(n) => defmt::write!(fmt, "Cc({=u8})", u8::from(*n)),
            Self::ClockDivision(division) => defmt::write!(fmt, "ClockDivision({})", division),
            Self::Run => defmt::write!(fmt, "Run"),
            Self::Stop => defmt::write!(fmt, "Stop"),
        }
    }
}

impl fmt::Display for MidiOutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gate => f.write_str("gate"),
            Self::Pitch => f.write_str("pitch"),
            Self::Velocity => f.write_str("velocity"),
            Self::AfterTouch => f.write_str("aftertouch"),
            Self::PitchBend => f.write_str("pitchbend"),
            Self::Cc(n) => write!(f, "cc{}", u8::from(*n)),
            Self::ClockDivision(division) => f.write_str(division.label()),
            Self::Run => f.write_str("run"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

impl MidiOutType {
    /// Stable ordinal of this type.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Gate => 0,
            Self::Pitch => 1,
            Self::Velocity => 2,
            Self::AfterTouch => 3,
            Self::PitchBend => 4,
            Self::Cc(n) => CC_ORDINAL + u8::from(n),
            Self::ClockDivision(division) => {
                // ClockDivision has six fieldless variants, so the conversion always succeeds
                DIVISION_ORDINAL + division.to_u8().unwrap_or_default()
            }
            Self::Run => RUN_ORDINAL,
            Self::Stop => STOP_ORDINAL,
        }
    }

    /// Inverse of [`ordinal`][Self::ordinal]. Returns `None` past [`LAST_OUT_TYPE_ORDINAL`].
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Gate),
            1 => Some(Self::Pitch),
            2 => Some(Self::Velocity),
            3 => Some(Self::AfterTouch),
            4 => Some(Self::PitchBend),
            n if n < DIVISION_ORDINAL => Some(Self::Cc(U7::from_u8_lossy(n - CC_ORDINAL))),
            n if n < RUN_ORDINAL => {
                ClockDivision::from_u8(n - DIVISION_ORDINAL).map(Self::ClockDivision)
            }
            RUN_ORDINAL => Some(Self::Run),
            STOP_ORDINAL => Some(Self::Stop),
            _ => None,
        }
    }

    /// Whether this type is driven by the clock engine's tick counter.
    pub fn is_clock_type(self) -> bool {
        matches!(self, Self::ClockDivision(_))
    }

    /// Length of the division period in ticks, for clock types.
    pub fn division_ticks(self) -> Option<u8> {
        match self {
            Self::ClockDivision(division) => Some(division.ticks()),
            _ => None,
        }
    }

    /// Return this type if `kind` accepts it; otherwise the legal type with the nearest ordinal, preferring the
    /// lower one on ties.
    pub fn clamp_for(self, kind: HardwareKind) -> Self {
        if kind.accepts(self) {
            return self;
        }
        let origin = i16::from(self.ordinal());
        (1..=i16::from(LAST_OUT_TYPE_ORDINAL))
            .flat_map(|distance| [origin - distance, origin + distance])
            .filter_map(legal_at(kind))
            .next()
            .unwrap_or(Self::Gate)
    }

    /// Move `delta` legal positions away from this type, skipping types `kind` rejects. Saturates at either end.
    pub fn step(self, delta: i16, kind: HardwareKind) -> Self {
        let mut current = self.clamp_for(kind);
        let direction = delta.signum();
        for _ in 0..delta.unsigned_abs() {
            let origin = i16::from(current.ordinal());
            let next = (1..=i16::from(LAST_OUT_TYPE_ORDINAL))
                .map(|distance| origin + direction * distance)
                .filter_map(legal_at(kind))
                .next();
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }
}

fn legal_at(kind: HardwareKind) -> impl Fn(i16) -> Option<MidiOutType> {
    move |ordinal| {
        u8::try_from(ordinal)
            .ok()
            .and_then(MidiOutType::from_ordinal)
            .filter(|out_type| kind.accepts(*out_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_ordinal_inverts_ordinal() {
        for ordinal in 0..=LAST_OUT_TYPE_ORDINAL {
            let out_type = MidiOutType::from_ordinal(ordinal).unwrap();
            assert_eq!(ordinal, out_type.ordinal(), "Expected left but got right");
        }
        assert_eq!(None, MidiOutType::from_ordinal(LAST_OUT_TYPE_ORDINAL + 1));
    }

    #[test]
    fn ordinal_layout() {
        assert_eq!(5, MidiOutType::Cc(U7::MIN).ordinal());
        assert_eq!(132, MidiOutType::Cc(U7::MAX).ordinal());
        assert_eq!(
            133,
            MidiOutType::ClockDivision(ClockDivision::Quarter).ordinal()
        );
        assert_eq!(139, MidiOutType::Run.ordinal());
        assert_eq!(140, MidiOutType::Stop.ordinal());
    }

    #[test]
    fn division_ticks() {
        let expected: [u8; 6] = [24, 12, 6, 3, 8, 4];
        let actual = [
            ClockDivision::Quarter,
            ClockDivision::Eighth,
            ClockDivision::Sixteenth,
            ClockDivision::ThirtySecond,
            ClockDivision::EighthTriplet,
            ClockDivision::SixteenthTriplet,
        ]
        .map(|division| MidiOutType::ClockDivision(division).division_ticks().unwrap());
        assert_eq!(expected, actual, "Expected left but got right");
        assert_eq!(None, MidiOutType::Gate.division_ticks());
    }

    #[test]
    fn only_divisions_are_clock_types() {
        assert!(MidiOutType::ClockDivision(ClockDivision::Eighth).is_clock_type());
        assert!(!MidiOutType::Run.is_clock_type());
        assert!(!MidiOutType::Gate.is_clock_type());
    }

    #[test]
    fn display() {
        use std::string::ToString;

        assert_eq!("cc74", MidiOutType::Cc(U7::from_u8_lossy(74)).to_string());
        assert_eq!(
            "1/16T",
            MidiOutType::ClockDivision(ClockDivision::SixteenthTriplet).to_string()
        );
        assert_eq!("pitchbend", MidiOutType::PitchBend.to_string());
    }

    mod legality {
        use super::*;

        #[test]
        fn clamp_keeps_legal_types() {
            assert_eq!(
                MidiOutType::Pitch,
                MidiOutType::Pitch.clamp_for(HardwareKind::CalibratedVoltage)
            );
            assert_eq!(
                MidiOutType::Run,
                MidiOutType::Run.clamp_for(HardwareKind::DigitalGate)
            );
        }

        #[test]
        fn clamp_moves_to_nearest_legal_type() {
            assert_eq!(
                MidiOutType::Gate,
                MidiOutType::Velocity.clamp_for(HardwareKind::DigitalGate),
                "Expected left but got right"
            );
            assert_eq!(
                MidiOutType::ClockDivision(ClockDivision::Quarter),
                MidiOutType::Cc(U7::from_u8_lossy(120)).clamp_for(HardwareKind::DigitalGate),
                "Expected left but got right"
            );
        }

        #[test]
        fn step_skips_illegal_types_on_digital_slots() {
            let mut out_type = MidiOutType::Gate;
            for _ in 0..20 {
                out_type = out_type.step(1, HardwareKind::DigitalGate);
                assert!(HardwareKind::DigitalGate.accepts(out_type));
            }
            assert_eq!(
                MidiOutType::Stop,
                out_type,
                "Should saturate at the last type; expected left but got right"
            );
        }

        #[test]
        fn step_from_gate_lands_on_first_division() {
            assert_eq!(
                MidiOutType::ClockDivision(ClockDivision::Quarter),
                MidiOutType::Gate.step(1, HardwareKind::DigitalGate),
                "Expected left but got right"
            );
        }

        #[test]
        fn step_walks_cc_numbers_on_voltage_slots() {
            assert_eq!(
                MidiOutType::Cc(U7::from_u8_lossy(3)),
                MidiOutType::PitchBend.step(4, HardwareKind::CalibratedVoltage),
                "Expected left but got right"
            );
            assert_eq!(
                MidiOutType::Gate,
                MidiOutType::Pitch.step(-10, HardwareKind::SynthesizedAudio),
                "Should saturate at the first type; expected left but got right"
            );
        }
    }
}
