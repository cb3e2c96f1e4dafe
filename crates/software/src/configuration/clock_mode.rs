use super::CycleConfig;
use core::fmt;
use num_derive::{FromPrimitive, ToPrimitive};

/// Where the master clock comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockMode {
    /// Ticks are generated from the configured BPM.
    #[default]
    Internal,
    /// Ticks follow incoming MIDI clock messages, and the BPM setting tracks the measured tempo.
    External,
}

impl CycleConfig for ClockMode {}

impl fmt::Display for ClockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("int"),
            Self::External => f.write_str("ext"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_toggles() {
        let mode = ClockMode::Internal.cycle();
        assert_eq!(ClockMode::External, mode, "Expected left but got right");
        assert_eq!(
            ClockMode::Internal,
            mode.cycle(),
            "Should wrap around to first variant; expected left but got right"
        );
    }
}
