//! The orchestrator: turns MIDI events into output levels.
//!
//! [`SignalProcessor`] owns the per-channel [`MidiState`], the [`ClockEngine`] and the output driver. It reads
//! routing from a shared [`SettingsStore`] on every event and publishes what it wrote to a shared [`Monitor`].
//! How each output type responds to each kind of event is decided in one place, `respond`.

use crate::{
    clock::ClockEngine,
    configuration::{ClockMode, EngineSettings, HardwareKind, MidiOutType, OutputSlot},
    dispatch::{EventQueue, MidiEvent},
    midi_state::{MidiState, Operation},
    monitor::{LearnEvent, LearnSource, Monitor},
    output::{AudioEvent, Calibration, OutputDriver, Signal, VoiceEvent},
    store::SettingsStore,
};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use wmidi::{Channel, MidiMessage, Note, U7, U14};

/// Value recorded for a gate that is high without a velocity to report.
pub const GATE_HIGH: u8 = u8::MAX;
/// Value recorded for a low gate.
pub const GATE_LOW: u8 = 0;

/// An event, reduced to what output types care about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stimulus {
    /// `sounding` is the note the channel plays now that `note` joined the held notes.
    NoteOn {
        note: Note,
        sounding: Note,
        velocity: U7,
        bend: i16,
    },
    /// `remaining` is the note that should sound now that one was released, if the channel isn't silent.
    NoteOff {
        remaining: Option<Note>,
        bend: i16,
    },
    Control {
        number: U7,
        value: U7,
    },
    Pressure(U7),
    Bend {
        current: Option<Note>,
        bend: i16,
        raw: U14,
    },
    /// `reset_clock` is set when the clock follows an external source, whose phase restarts with the transport.
    Start {
        reset_clock: bool,
    },
    Stop,
}

/// What an output of `out_type` should emit in response to `stimulus`, along with the value to record for it.
fn respond(out_type: MidiOutType, stimulus: Stimulus) -> Option<(Signal, u8)> {
    use MidiOutType as T;
    use Stimulus as S;

    match (out_type, stimulus) {
        (T::Gate, S::NoteOn { velocity, .. }) => Some((Signal::Gate(true), velocity.into())),
        (T::Gate, S::NoteOff { remaining: None, .. }) => Some((Signal::Gate(false), GATE_LOW)),
        (T::Pitch, S::NoteOn { sounding: note, bend, .. })
        | (T::Pitch, S::NoteOff { remaining: Some(note), bend })
        | (T::Pitch, S::Bend { current: Some(note), bend, .. }) => {
            Some((Signal::Pitch { note, bend }, note as u8))
        }
        (T::Velocity, S::NoteOn { velocity, .. }) => {
            Some((Signal::SevenBit(velocity), velocity.into()))
        }
        (T::Velocity, S::NoteOff { remaining: None, .. }) => {
            Some((Signal::SevenBit(U7::MIN), GATE_LOW))
        }
        (T::Cc(assigned), S::Control { number, value }) if assigned == number => {
            Some((Signal::SevenBit(value), value.into()))
        }
        (T::AfterTouch, S::Pressure(value)) => Some((Signal::SevenBit(value), value.into())),
        (T::PitchBend, S::Bend { raw, .. }) => {
            let value = U7::from_u8_lossy((u16::from(raw) >> 7) as u8);
            Some((Signal::SevenBit(value), value.into()))
        }
        (T::Run, S::Start { .. }) | (T::Stop, S::Stop) => Some((Signal::Gate(true), GATE_HIGH)),
        (T::Run, S::Stop) | (T::Stop, S::Start { .. }) => Some((Signal::Gate(false), GATE_LOW)),
        (T::ClockDivision(_), S::Start { reset_clock: true }) => {
            Some((Signal::Gate(false), GATE_LOW))
        }
        _ => None,
    }
}

/// Converts MIDI events into output levels.
///
/// Protocol anomalies such as a repeated NoteOn or a NoteOff for a note that isn't held are ignored, never
/// errors. Outputs whose channel routing doesn't match an event are left untouched.
pub struct SignalProcessor<'a, M: RawMutex, D: OutputDriver> {
    settings: &'a SettingsStore<M>,
    monitor: &'a Monitor<M>,
    driver: D,
    calibration: Calibration,
    state: MidiState,
    clock: ClockEngine,
    /// Clock mode seen by the last clock-related call, so that a switch can be detected.
    clock_mode: Option<ClockMode>,
    operation: Operation,
}

impl<'a, M: RawMutex, D: OutputDriver> SignalProcessor<'a, M, D> {
    /// Construct a `SignalProcessor` writing to `driver`.
    pub fn new(
        settings: &'a SettingsStore<M>,
        monitor: &'a Monitor<M>,
        driver: D,
        calibration: Calibration,
    ) -> Self {
        Self {
            settings,
            monitor,
            driver,
            calibration,
            state: MidiState::new(),
            clock: ClockEngine::new(),
            clock_mode: None,
            operation: Operation::empty(),
        }
    }

    /// The output driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the output driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Held notes and pitch bend per channel.
    pub fn state(&self) -> &MidiState {
        &self.state
    }

    /// Clock phase and tempo measurement.
    pub fn clock_engine(&self) -> &ClockEngine {
        &self.clock
    }

    /// Put the outputs in their power-on state: the transport is stopped, so `Stop` outputs go high and `Run`
    /// outputs low.
    pub fn begin(&mut self) -> Operation {
        self.tracked(|processor| processor.respond_all(Stimulus::Stop))
    }

    /// Handle a NoteOn. A velocity of zero is a NoteOff.
    pub fn note_on(&mut self, channel: Channel, note: Note, velocity: U7) {
        if u8::from(velocity) == 0 {
            return self.note_off(channel, note, velocity);
        }
        info!(
            "Received NoteOn: channel {}, note {}, velocity: {}",
            channel.number(),
            note.to_str(),
            u8::from(velocity)
        );
        if !self.state.voices_mut(channel).push(note) {
            debug!("Ignoring NoteOn for held note {}", note.to_str());
            return;
        }
        self.operation |= Operation::NOTE_CHANGE;
        let sounding = self.state.voices(channel).current().unwrap_or(note);
        let bend = self.state.pitch_bend(channel);
        self.respond_on(
            channel,
            Stimulus::NoteOn {
                note,
                sounding,
                velocity,
                bend,
            },
            VoiceEvent::NoteOn { note, velocity },
        );
    }

    /// Handle a NoteOff.
    pub fn note_off(&mut self, channel: Channel, note: Note, velocity: U7) {
        info!(
            "Received NoteOff: channel {}, note {}, velocity: {}",
            channel.number(),
            note.to_str(),
            u8::from(velocity)
        );
        if !self.state.voices_mut(channel).pop(note) {
            debug!("Ignoring NoteOff for unheld note {}", note.to_str());
            return;
        }
        self.operation |= Operation::NOTE_CHANGE;
        let remaining = self.state.voices(channel).current();
        let bend = self.state.pitch_bend(channel);
        self.respond_on(
            channel,
            Stimulus::NoteOff { remaining, bend },
            VoiceEvent::NoteOff { note, velocity },
        );
    }

    /// Handle a Control Change.
    pub fn control_change(&mut self, channel: Channel, control: U7, value: U7) {
        info!(
            "Received Control Change: channel {}, control {}, value: {}",
            channel.number(),
            u8::from(control),
            u8::from(value)
        );
        self.monitor.record_cc(channel, control);
        self.monitor.offer_learn(LearnEvent {
            channel,
            source: LearnSource::Control(control),
        });
        self.respond_on(
            channel,
            Stimulus::Control {
                number: control,
                value,
            },
            VoiceEvent::ControlChange { control, value },
        );
    }

    /// Handle Channel Pressure.
    pub fn aftertouch(&mut self, channel: Channel, value: U7) {
        trace!(
            "Received Channel Pressure: channel {}, value: {}",
            channel.number(),
            u8::from(value)
        );
        self.respond_on(
            channel,
            Stimulus::Pressure(value),
            VoiceEvent::Aftertouch(value),
        );
    }

    /// Handle a Pitch Bend Change.
    pub fn pitch_bend(&mut self, channel: Channel, value: U14) {
        let bend = self.state.set_pitch_bend(channel, value);
        trace!(
            "Received Pitch Bend: channel {}, bend: {}",
            channel.number(),
            bend
        );
        self.monitor.record_pitch_bend(channel, bend);
        self.monitor.offer_learn(LearnEvent {
            channel,
            source: LearnSource::PitchBend,
        });
        let current = self.state.voices(channel).current();
        self.respond_on(
            channel,
            Stimulus::Bend {
                current,
                bend,
                raw: value,
            },
            VoiceEvent::PitchBend(bend),
        );
    }

    /// Handle a MIDI clock pulse received at `now`. Ignored unless the clock follows an external source.
    pub fn clock(&mut self, now: Instant) {
        if self.follow_clock_mode() != ClockMode::External {
            trace!("Ignoring MIDI clock; clock mode is internal");
            return;
        }
        if let Some(bpm) = self.clock.external_clock(now) {
            if bpm != self.settings.bpm() {
                info!("External clock measured at {} BPM", bpm);
                self.operation |= Operation::TEMPO_CHANGE;
            }
            self.settings.set_bpm(bpm.into());
        }
        self.driver.notify(AudioEvent::Clock);
        let settings = self.settings.snapshot();
        self.sync_clock_outputs(&settings);
    }

    /// Handle a MIDI Start received at `now`.
    ///
    /// With an external clock, the clock phase restarts and clock-division outputs are held low until the next
    /// clock pulse.
    pub fn start(&mut self, now: Instant) {
        info!("Received Start");
        let reset_clock = self.follow_clock_mode() == ClockMode::External;
        if reset_clock {
            self.clock.restart(now);
        }
        self.driver.notify(AudioEvent::Start);
        self.respond_all(Stimulus::Start { reset_clock });
    }

    /// Handle a MIDI Stop.
    pub fn stop(&mut self) {
        info!("Received Stop");
        self.driver.notify(AudioEvent::Stop);
        self.respond_all(Stimulus::Stop);
    }

    /// Periodic control-rate work: advance the internal clock and bring clock-division outputs in line with the
    /// clock phase. Outputs are only written when their level changes.
    pub fn tick(&mut self, now: Instant) {
        self.driver.notify(AudioEvent::Control);
        let mode = self.follow_clock_mode();
        let settings = self.settings.snapshot();
        if mode == ClockMode::Internal && self.clock.advance_internal(now, settings.bpm()) {
            self.driver.notify(AudioEvent::Clock);
        }
        self.sync_clock_outputs(&settings);
    }

    /// Handle `event`, received at `now`. Returns what the event changed.
    pub fn handle(&mut self, event: MidiEvent, now: Instant) -> Operation {
        self.tracked(|processor| match event {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => processor.note_on(channel, note, velocity),
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => processor.note_off(channel, note, velocity),
            MidiEvent::ControlChange {
                channel,
                control,
                value,
            } => processor.control_change(channel, control, value),
            MidiEvent::Aftertouch { channel, value } => processor.aftertouch(channel, value),
            MidiEvent::PitchBend { channel, value } => processor.pitch_bend(channel, value),
            MidiEvent::Clock => processor.clock(now),
            MidiEvent::Start => processor.start(now),
            MidiEvent::Stop => processor.stop(),
        })
    }

    /// Handle a parsed MIDI message, received at `now`. Messages the engine has no use for change nothing.
    pub fn handle_message(&mut self, message: &MidiMessage<'_>, now: Instant) -> Operation {
        match MidiEvent::from_message(message) {
            Some(event) => self.handle(event, now),
            None => {
                debug!("Ignoring unsupported MIDI message");
                Operation::empty()
            }
        }
    }

    /// Handle every event waiting in `queue`, in arrival order.
    pub fn drain<Q: RawMutex, const N: usize>(
        &mut self,
        queue: &EventQueue<Q, N>,
        now: Instant,
    ) -> Operation {
        let mut operation = Operation::empty();
        while let Ok(event) = queue.try_receive() {
            operation |= self.handle(event, now);
        }
        operation
    }

    /// One pass of the control loop at the current time: [`drain`][Self::drain] then [`tick`][Self::tick].
    pub fn service<Q: RawMutex, const N: usize>(&mut self, queue: &EventQueue<Q, N>) -> Operation {
        let now = Instant::now();
        let operation = self.drain(queue, now);
        operation | self.tracked(|processor| processor.tick(now))
    }

    fn tracked(&mut self, f: impl FnOnce(&mut Self)) -> Operation {
        self.operation = Operation::empty();
        f(self);
        self.operation
    }

    /// Current clock mode. When it differs from the one last seen, timing restarts so that ticks and tempo
    /// measured under the old source don't leak into the new one.
    fn follow_clock_mode(&mut self) -> ClockMode {
        let mode = self.settings.clock_mode();
        if self.clock_mode.is_some_and(|seen| seen != mode) {
            info!("Clock mode changed; restarting clock timing");
            self.clock.reset_timing();
        }
        self.clock_mode = Some(mode);
        mode
    }

    fn respond_on(&mut self, channel: Channel, stimulus: Stimulus, voice: VoiceEvent) {
        let settings = self.settings.snapshot();
        for slot in OutputSlot::ALL {
            if !settings.routes(slot, channel) {
                continue;
            }
            self.respond_at(slot, settings.out_type(slot), stimulus);
            if slot.kind() == HardwareKind::SynthesizedAudio {
                self.driver.notify(AudioEvent::Voice { slot, event: voice });
            }
        }
    }

    fn respond_all(&mut self, stimulus: Stimulus) {
        let settings = self.settings.snapshot();
        for slot in OutputSlot::ALL {
            self.respond_at(slot, settings.out_type(slot), stimulus);
        }
    }

    fn respond_at(&mut self, slot: OutputSlot, out_type: MidiOutType, stimulus: Stimulus) {
        if let Some((signal, value)) = respond(out_type, stimulus) {
            self.emit(slot, signal, value);
        }
    }

    fn sync_clock_outputs(&mut self, settings: &EngineSettings) {
        for slot in OutputSlot::ALL {
            let MidiOutType::ClockDivision(division) = settings.out_type(slot) else {
                continue;
            };
            let high = self.clock.is_high(division);
            let value = if high { GATE_HIGH } else { GATE_LOW };
            if self.monitor.last_out(slot) != value {
                self.emit(slot, Signal::Gate(high), value);
            }
        }
    }

    fn emit(&mut self, slot: OutputSlot, signal: Signal, value: u8) {
        let kind = slot.kind();
        match signal.level(kind, &self.calibration) {
            Some(level) => {
                self.driver.write(slot, kind, level);
                self.monitor.record_out(slot, value);
                self.operation |= Operation::OUTPUT_CHANGE;
            }
            None => debug!("Output {:?} cannot represent value {}", slot, value),
        }
    }
}
