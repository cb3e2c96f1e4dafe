//! The single source of truth for routing, shared between the signal processor and the user interface.
//!
//! Every accessor locks for exactly one read or write of [`EngineSettings`] and never performs I/O while holding
//! the lock; persistence works on a snapshot taken under the lock and released before touching storage.

use crate::{
    configuration::{ClockMode, EngineSettings, MidiChannel, MidiOutType, OutputConfig, OutputSlot},
    monitor::LearnEvent,
    persistence::{self, Backend, ENCODED_LEN, PersistError, SETTINGS_KEY},
};
use core::cell::RefCell;
use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};
use wmidi::Channel;

/// How [`SettingsStore::recall`] obtained the settings now in effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recalled {
    /// A valid record was loaded.
    Stored,
    /// Storage was empty, unreadable or invalid; defaults were restored and saved.
    Defaults,
}

/// Mutex-guarded [`EngineSettings`].
pub struct SettingsStore<M: RawMutex> {
    settings: Mutex<M, RefCell<EngineSettings>>,
}

impl<M: RawMutex> Default for SettingsStore<M> {
    fn default() -> Self {
        Self::new(EngineSettings::DEFAULT)
    }
}

impl<M: RawMutex> SettingsStore<M> {
    /// Construct a store holding `settings`. Usable in a `static`.
    pub const fn new(settings: EngineSettings) -> Self {
        Self {
            settings: Mutex::new(RefCell::new(settings)),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&EngineSettings) -> T) -> T {
        self.settings.lock(|settings| f(&settings.borrow()))
    }

    fn update<T>(&self, f: impl FnOnce(&mut EngineSettings) -> T) -> T {
        self.settings.lock(|settings| f(&mut settings.borrow_mut()))
    }

    /// Copy of every setting, taken under a single lock.
    pub fn snapshot(&self) -> EngineSettings {
        self.read(|settings| *settings)
    }

    /// Replace every setting at once.
    pub fn replace(&self, settings: EngineSettings) {
        self.update(|current| *current = settings);
    }

    /// See [`EngineSettings::midi_channel`].
    pub fn midi_channel(&self) -> MidiChannel {
        self.read(EngineSettings::midi_channel)
    }

    /// See [`EngineSettings::set_midi_channel`].
    pub fn set_midi_channel(&self, channel: MidiChannel) {
        self.update(|settings| settings.set_midi_channel(channel));
    }

    /// See [`EngineSettings::step_midi_channel`].
    pub fn step_midi_channel(&self, delta: i16) {
        self.update(|settings| settings.step_midi_channel(delta));
    }

    /// See [`EngineSettings::bpm`].
    pub fn bpm(&self) -> u8 {
        self.read(EngineSettings::bpm)
    }

    /// See [`EngineSettings::set_bpm`].
    pub fn set_bpm(&self, bpm: u16) {
        self.update(|settings| settings.set_bpm(bpm));
    }

    /// See [`EngineSettings::step_bpm`].
    pub fn step_bpm(&self, delta: i16) {
        self.update(|settings| settings.step_bpm(delta));
    }

    /// See [`EngineSettings::clock_mode`].
    pub fn clock_mode(&self) -> ClockMode {
        self.read(EngineSettings::clock_mode)
    }

    /// See [`EngineSettings::set_clock_mode`].
    pub fn set_clock_mode(&self, mode: ClockMode) {
        self.update(|settings| settings.set_clock_mode(mode));
    }

    /// See [`EngineSettings::bluetooth_enabled`].
    pub fn bluetooth_enabled(&self) -> bool {
        self.read(EngineSettings::bluetooth_enabled)
    }

    /// See [`EngineSettings::set_bluetooth_enabled`].
    pub fn set_bluetooth_enabled(&self, enabled: bool) {
        self.update(|settings| settings.set_bluetooth_enabled(enabled));
    }

    /// See [`EngineSettings::output`].
    pub fn output(&self, slot: OutputSlot) -> OutputConfig {
        self.read(|settings| settings.output(slot))
    }

    /// See [`EngineSettings::out_type`].
    pub fn out_type(&self, slot: OutputSlot) -> MidiOutType {
        self.read(|settings| settings.out_type(slot))
    }

    /// See [`EngineSettings::set_out_type`].
    pub fn set_out_type(&self, slot: OutputSlot, out_type: MidiOutType) {
        self.update(|settings| settings.set_out_type(slot, out_type));
    }

    /// See [`EngineSettings::step_out_type`].
    pub fn step_out_type(&self, slot: OutputSlot, delta: i16) {
        self.update(|settings| settings.step_out_type(slot, delta));
    }

    /// See [`EngineSettings::out_channel`].
    pub fn out_channel(&self, slot: OutputSlot) -> MidiChannel {
        self.read(|settings| settings.out_channel(slot))
    }

    /// See [`EngineSettings::set_out_channel`].
    pub fn set_out_channel(&self, slot: OutputSlot, channel: MidiChannel) {
        self.update(|settings| settings.set_out_channel(slot, channel));
    }

    /// See [`EngineSettings::step_out_channel`].
    pub fn step_out_channel(&self, slot: OutputSlot, delta: i16) {
        self.update(|settings| settings.step_out_channel(slot, delta));
    }

    /// See [`EngineSettings::routes`].
    pub fn routes(&self, slot: OutputSlot, incoming: Channel) -> bool {
        self.read(|settings| settings.routes(slot, incoming))
    }

    /// See [`EngineSettings::learn`].
    pub fn learn(&self, slot: OutputSlot, event: LearnEvent) -> bool {
        self.update(|settings| settings.learn(slot, event))
    }

    /// Write the current settings to `backend` and commit them.
    pub fn store(&self, mut backend: impl Backend) -> Result<(), PersistError> {
        let record = persistence::encode(&self.snapshot());
        backend.write(SETTINGS_KEY, &record)?;
        backend.commit()
    }

    /// Load settings from `backend`.
    ///
    /// Missing, unreadable, or invalid records are not an error: defaults are restored and immediately saved so the
    /// next boot finds a valid record. The only error returned is a failure to save those defaults, in which case
    /// the defaults are in effect nonetheless.
    pub fn recall(&self, mut backend: impl Backend) -> Result<Recalled, PersistError> {
        let mut record = [0; ENCODED_LEN];
        let loaded = backend
            .read(SETTINGS_KEY, &mut record)
            .and_then(|len| persistence::decode(&record[..len]));
        match loaded {
            Ok(settings) => {
                self.replace(settings);
                info!("Recalled stored settings");
                Ok(Recalled::Stored)
            }
            Err(e) => {
                match e {
                    PersistError::NotFound => info!("No stored settings; saving defaults"),
                    _ => warn!("Discarding stored settings ({:?}); saving defaults", e),
                }
                self.replace(EngineSettings::DEFAULT);
                self.store(backend)?;
                Ok(Recalled::Defaults)
            }
        }
    }
}
