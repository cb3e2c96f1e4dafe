use super::{CycleConfig, MidiOutType};
use num_derive::{FromPrimitive, ToPrimitive};

/// Number of physical outputs.
pub const SLOT_COUNT: usize = 5;

/// The electrical circuit behind an output, fixed by the hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HardwareKind {
    /// Driven by the audio-rate oscillator bank; levels are expressed around a zero-centered bias.
    SynthesizedAudio,
    /// A filtered PWM channel calibrated to 1V/oct.
    CalibratedVoltage,
    /// A plain digital pin; only on/off signals make sense here.
    DigitalGate,
}

impl HardwareKind {
    /// Whether an output of this kind can produce `out_type`.
    ///
    /// Digital outputs only take gate-like types: `Gate`, clock divisions, `Run` and `Stop`.
    pub fn accepts(self, out_type: MidiOutType) -> bool {
        match self {
            Self::SynthesizedAudio | Self::CalibratedVoltage => true,
            Self::DigitalGate => matches!(
                out_type,
                MidiOutType::Gate
                    | MidiOutType::ClockDivision(_)
                    | MidiOutType::Run
                    | MidiOutType::Stop
            ),
        }
    }
}

/// A logical output jack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputSlot {
    /// First audio-rate output.
    A,
    /// Second audio-rate output.
    B,
    /// Calibrated control voltage output.
    C,
    /// Digital clock jack.
    Clock,
    /// Digital reset jack.
    Reset,
}

impl CycleConfig for OutputSlot {}

impl OutputSlot {
    /// Every slot, in panel order.
    pub const ALL: [OutputSlot; SLOT_COUNT] = [Self::A, Self::B, Self::C, Self::Clock, Self::Reset];

    /// Position of this slot in per-slot arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The circuit behind this slot.
    pub fn kind(self) -> HardwareKind {
        match self {
            Self::A | Self::B => HardwareKind::SynthesizedAudio,
            Self::C => HardwareKind::CalibratedVoltage,
            Self::Clock | Self::Reset => HardwareKind::DigitalGate,
        }
    }

    /// Panel label.
    pub fn label(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::Clock => "CLK",
            Self::Reset => "RST",
        }
    }
}
