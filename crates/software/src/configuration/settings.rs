use super::{
    ClockDivision, ClockMode, GLOBAL_CHANNELS, MidiChannel, MidiOutType, OUTPUT_CHANNELS,
    OutputSlot, SLOT_COUNT, matches,
};
use crate::monitor::{LearnEvent, LearnSource};
use wmidi::Channel;

/// Slowest tempo the clock runs at.
pub const MIN_BPM: u8 = 1;
/// Fastest tempo the clock runs at.
pub const MAX_BPM: u8 = 255;
/// Tempo used until the user (or an external clock) sets one.
pub const DEFAULT_BPM: u8 = 120;

/// Routing for a single output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputConfig {
    /// What the output produces.
    pub out_type: MidiOutType,
    /// Channel override; [`MidiChannel::Unchanged`] follows the global channel.
    pub out_channel: MidiChannel,
}

impl OutputConfig {
    const fn new(out_type: MidiOutType) -> Self {
        Self {
            out_type,
            out_channel: MidiChannel::Unchanged,
        }
    }
}

/// Every persisted setting of the engine.
///
/// Fields are only reachable through accessors so that the invariants hold for every value in existence: the BPM
/// stays within [`MIN_BPM`]..=[`MAX_BPM`], the global channel is never [`MidiChannel::Unchanged`], and no output is
/// assigned a type its [`HardwareKind`][super::HardwareKind] cannot produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineSettings {
    midi_channel: MidiChannel,
    bpm: u8,
    clock_mode: ClockMode,
    bluetooth_enabled: bool,
    outputs: [OutputConfig; SLOT_COUNT],
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl EngineSettings {
    /// Factory settings.
    pub const DEFAULT: Self = Self {
        midi_channel: MidiChannel::All,
        bpm: DEFAULT_BPM,
        clock_mode: ClockMode::Internal,
        bluetooth_enabled: false,
        outputs: [
            OutputConfig::new(MidiOutType::Pitch),
            OutputConfig::new(MidiOutType::Gate),
            OutputConfig::new(MidiOutType::Velocity),
            OutputConfig::new(MidiOutType::ClockDivision(ClockDivision::Sixteenth)),
            OutputConfig::new(MidiOutType::Run),
        ],
    };

    /// Channel outputs listen to unless they override it.
    pub fn midi_channel(&self) -> MidiChannel {
        self.midi_channel
    }

    /// Set the global channel. [`MidiChannel::Unchanged`] is not a valid global channel and is clamped away.
    pub fn set_midi_channel(&mut self, channel: MidiChannel) {
        self.midi_channel = channel.clamp_to(GLOBAL_CHANNELS);
    }

    /// Move the global channel by `delta` steps.
    pub fn step_midi_channel(&mut self, delta: i16) {
        self.midi_channel = self.midi_channel.step(delta, GLOBAL_CHANNELS);
    }

    /// Current tempo.
    pub fn bpm(&self) -> u8 {
        self.bpm
    }

    /// Set the tempo, clamped to [`MIN_BPM`]..=[`MAX_BPM`].
    pub fn set_bpm(&mut self, bpm: u16) {
        self.bpm = bpm.clamp(MIN_BPM.into(), MAX_BPM.into()) as u8;
    }

    /// Move the tempo by `delta` BPM, clamped.
    pub fn step_bpm(&mut self, delta: i16) {
        let bpm = (i16::from(self.bpm) + delta).clamp(MIN_BPM.into(), MAX_BPM.into());
        self.bpm = bpm as u8;
    }

    /// Clock source.
    pub fn clock_mode(&self) -> ClockMode {
        self.clock_mode
    }

    /// Set the clock source.
    pub fn set_clock_mode(&mut self, mode: ClockMode) {
        self.clock_mode = mode;
    }

    /// Whether the Bluetooth MIDI transport should be running.
    pub fn bluetooth_enabled(&self) -> bool {
        self.bluetooth_enabled
    }

    /// Enable or disable the Bluetooth MIDI transport.
    pub fn set_bluetooth_enabled(&mut self, enabled: bool) {
        self.bluetooth_enabled = enabled;
    }

    /// Routing of `slot`.
    pub fn output(&self, slot: OutputSlot) -> OutputConfig {
        self.outputs[slot.index()]
    }

    /// What `slot` produces.
    pub fn out_type(&self, slot: OutputSlot) -> MidiOutType {
        self.outputs[slot.index()].out_type
    }

    /// Assign a type to `slot`, clamped to the nearest type the slot's hardware can produce.
    pub fn set_out_type(&mut self, slot: OutputSlot, out_type: MidiOutType) {
        self.outputs[slot.index()].out_type = out_type.clamp_for(slot.kind());
    }

    /// Move the type of `slot` by `delta` legal steps.
    pub fn step_out_type(&mut self, slot: OutputSlot, delta: i16) {
        let output = &mut self.outputs[slot.index()];
        output.out_type = output.out_type.step(delta, slot.kind());
    }

    /// Channel override of `slot`.
    pub fn out_channel(&self, slot: OutputSlot) -> MidiChannel {
        self.outputs[slot.index()].out_channel
    }

    /// Set the channel override of `slot`.
    pub fn set_out_channel(&mut self, slot: OutputSlot, channel: MidiChannel) {
        self.outputs[slot.index()].out_channel = channel.clamp_to(OUTPUT_CHANNELS);
    }

    /// Move the channel override of `slot` by `delta` steps.
    pub fn step_out_channel(&mut self, slot: OutputSlot, delta: i16) {
        let output = &mut self.outputs[slot.index()];
        output.out_channel = output.out_channel.step(delta, OUTPUT_CHANNELS);
    }

    /// Whether a message on `incoming` should reach `slot`.
    pub fn routes(&self, slot: OutputSlot, incoming: Channel) -> bool {
        matches(self.out_channel(slot), self.midi_channel, incoming)
    }

    /// Assign the controller described by `event` to `slot`.
    ///
    /// Learning only happens when the event arrived on a channel `slot` listens to, and only if the slot's hardware
    /// can produce the learned type. Returns whether the slot's type was changed.
    pub fn learn(&mut self, slot: OutputSlot, event: LearnEvent) -> bool {
        if !self.routes(slot, event.channel) {
            return false;
        }
        let out_type = match event.source {
            LearnSource::Control(number) => MidiOutType::Cc(number),
            LearnSource::PitchBend => MidiOutType::PitchBend,
        };
        if !slot.kind().accepts(out_type) || self.out_type(slot) == out_type {
            return false;
        }
        self.outputs[slot.index()].out_type = out_type;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmidi::U7;

    #[test]
    fn defaults() {
        let settings = EngineSettings::default();
        assert_eq!(MidiChannel::All, settings.midi_channel());
        assert_eq!(120, settings.bpm());
        assert_eq!(ClockMode::Internal, settings.clock_mode());
        assert!(!settings.bluetooth_enabled());
        assert_eq!(MidiOutType::Pitch, settings.out_type(OutputSlot::A));
        assert_eq!(MidiOutType::Gate, settings.out_type(OutputSlot::B));
        assert_eq!(MidiOutType::Velocity, settings.out_type(OutputSlot::C));
        assert_eq!(
            MidiOutType::ClockDivision(ClockDivision::Sixteenth),
            settings.out_type(OutputSlot::Clock)
        );
        assert_eq!(MidiOutType::Run, settings.out_type(OutputSlot::Reset));
        for slot in OutputSlot::ALL {
            assert_eq!(MidiChannel::Unchanged, settings.out_channel(slot));
        }
    }

    mod bpm {
        use super::*;

        #[test]
        fn set_clamps_above_max() {
            let mut settings = EngineSettings::default();
            settings.set_bpm(1000);
            assert_eq!(MAX_BPM, settings.bpm(), "Expected left but got right");
        }

        #[test]
        fn set_clamps_below_min() {
            let mut settings = EngineSettings::default();
            settings.set_bpm(0);
            assert_eq!(MIN_BPM, settings.bpm(), "Expected left but got right");
        }

        #[test]
        fn step_saturates() {
            let mut settings = EngineSettings::default();
            settings.step_bpm(200);
            assert_eq!(MAX_BPM, settings.bpm(), "Expected left but got right");
            settings.step_bpm(-300);
            assert_eq!(MIN_BPM, settings.bpm(), "Expected left but got right");
        }
    }

    #[test]
    fn global_channel_never_unchanged() {
        let mut settings = EngineSettings::default();
        settings.set_midi_channel(MidiChannel::Unchanged);
        assert_ne!(MidiChannel::Unchanged, settings.midi_channel());

        settings.set_midi_channel(MidiChannel::Only(Channel::Ch1));
        settings.step_midi_channel(-1);
        assert_eq!(
            MidiChannel::Only(Channel::Ch1),
            settings.midi_channel(),
            "Expected left but got right"
        );
    }

    #[test]
    fn set_out_type_clamps_for_slot_kind() {
        let mut settings = EngineSettings::default();
        settings.set_out_type(OutputSlot::Reset, MidiOutType::Pitch);
        assert_eq!(
            MidiOutType::Gate,
            settings.out_type(OutputSlot::Reset),
            "Expected left but got right"
        );
    }

    #[test]
    fn step_out_type_stays_legal() {
        let mut settings = EngineSettings::default();
        for _ in 0..10 {
            settings.step_out_type(OutputSlot::Clock, -1);
            assert!(
                OutputSlot::Clock
                    .kind()
                    .accepts(settings.out_type(OutputSlot::Clock))
            );
        }
        assert_eq!(MidiOutType::Gate, settings.out_type(OutputSlot::Clock));
    }

    #[test]
    fn routes_follows_override() {
        let mut settings = EngineSettings::default();
        settings.set_midi_channel(MidiChannel::Only(Channel::Ch2));
        settings.set_out_channel(OutputSlot::C, MidiChannel::Only(Channel::Ch7));

        assert!(settings.routes(OutputSlot::A, Channel::Ch2));
        assert!(!settings.routes(OutputSlot::A, Channel::Ch7));
        assert!(settings.routes(OutputSlot::C, Channel::Ch7));
        assert!(!settings.routes(OutputSlot::C, Channel::Ch2));
    }

    mod learn {
        use super::*;

        fn control(channel: Channel, number: u8) -> LearnEvent {
            LearnEvent {
                channel,
                source: LearnSource::Control(U7::from_u8_lossy(number)),
            }
        }

        #[test]
        fn assigns_control_change() {
            let mut settings = EngineSettings::default();
            assert!(settings.learn(OutputSlot::C, control(Channel::Ch4, 74)));
            assert_eq!(
                MidiOutType::Cc(U7::from_u8_lossy(74)),
                settings.out_type(OutputSlot::C),
                "Expected left but got right"
            );
        }

        #[test]
        fn assigns_pitch_bend() {
            let mut settings = EngineSettings::default();
            let event = LearnEvent {
                channel: Channel::Ch1,
                source: LearnSource::PitchBend,
            };
            assert!(settings.learn(OutputSlot::B, event));
            assert_eq!(MidiOutType::PitchBend, settings.out_type(OutputSlot::B));
        }

        #[test]
        fn ignores_other_channels() {
            let mut settings = EngineSettings::default();
            settings.set_out_channel(OutputSlot::C, MidiChannel::Only(Channel::Ch1));
            assert!(!settings.learn(OutputSlot::C, control(Channel::Ch2, 74)));
            assert_eq!(MidiOutType::Velocity, settings.out_type(OutputSlot::C));
        }

        #[test]
        fn ignores_digital_slots() {
            let mut settings = EngineSettings::default();
            assert!(!settings.learn(OutputSlot::Clock, control(Channel::Ch1, 1)));
            assert_eq!(
                MidiOutType::ClockDivision(ClockDivision::Sixteenth),
                settings.out_type(OutputSlot::Clock)
            );
        }
    }
}
