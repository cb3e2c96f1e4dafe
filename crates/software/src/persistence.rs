//! Encoding of [`EngineSettings`] for non-volatile storage, and the trait through which storage is reached.
//!
//! The encoding is a fixed-size record framed by a magic number on both ends, so that erased flash, a record from
//! another firmware, and a record truncated by a power cut during a write all fail to decode.

use crate::configuration::{
    ClockMode, EngineSettings, MidiChannel, MidiOutType, OutputSlot, SLOT_COUNT,
};
use num_traits::{FromPrimitive, ToPrimitive};
use thiserror::Error;

/// Key the settings record is stored under.
pub const SETTINGS_KEY: &str = "midi_settings";

/// Bumped whenever the record layout changes; records of any other version are discarded.
pub const FORMAT_VERSION: u8 = 1;

const MAGIC: [u8; 4] = *b"uRCV";
const HEADER_LEN: usize = MAGIC.len() + 1;
const BODY_LEN: usize = 5 + 2 * SLOT_COUNT;

/// Size of an encoded settings record.
pub const ENCODED_LEN: usize = HEADER_LEN + BODY_LEN + MAGIC.len();

/// Errors raised while loading or saving settings.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistError {
    /// Nothing is stored under the requested key.
    #[error("no record stored under the requested key")]
    NotFound,
    /// The storage medium reported a failure.
    #[error("storage backend failure")]
    Backend,
    /// A caller-provided buffer cannot hold the record.
    #[error("buffer too small: need {needed} bytes")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
    },
    /// The stored record is shorter than a full record.
    #[error("record truncated: {len} of {expected} bytes", expected = ENCODED_LEN)]
    Truncated {
        /// Bytes actually read.
        len: usize,
    },
    /// Leading or trailing magic number is wrong.
    #[error("record magic mismatch")]
    BadMagic,
    /// The record was written by a different layout version.
    #[error("record version {found} does not match {expected}", expected = FORMAT_VERSION)]
    VersionMismatch {
        /// Version found in the record.
        found: u8,
    },
    /// A field holds a value no setting can take.
    #[error("invalid value {value} at offset {offset}")]
    InvalidField {
        /// Byte offset of the field in the record.
        offset: usize,
        /// Offending value.
        value: u8,
    },
}

/// Key/value non-volatile storage.
///
/// Implementations must not block indefinitely; a medium that is busy or broken reports
/// [`PersistError::Backend`].
pub trait Backend {
    /// Copy the value stored under `key` into `buf`, returning its length. Fails with [`PersistError::NotFound`]
    /// when nothing is stored.
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<usize, PersistError>;
    /// Stage `bytes` under `key`, replacing any previous value.
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), PersistError>;
    /// Make staged writes durable.
    fn commit(&mut self) -> Result<(), PersistError>;
}

impl<T: Backend + ?Sized> Backend for &mut T {
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<usize, PersistError> {
        (**self).read(key, buf)
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), PersistError> {
        (**self).write(key, bytes)
    }

    fn commit(&mut self) -> Result<(), PersistError> {
        (**self).commit()
    }
}

/// Serialize `settings` into a fixed-size record.
pub fn encode(settings: &EngineSettings) -> [u8; ENCODED_LEN] {
    let mut record = [0; ENCODED_LEN];
    record[..MAGIC.len()].copy_from_slice(&MAGIC);
    record[MAGIC.len()] = FORMAT_VERSION;

    let body = &mut record[HEADER_LEN..HEADER_LEN + BODY_LEN];
    body[0] = settings.bpm();
    body[1] = settings.midi_channel().ordinal();
    body[2] = settings.clock_mode().to_u8().unwrap_or_default();
    body[3] = settings.bluetooth_enabled().into();
    body[4] = SLOT_COUNT as u8;
    for (slot, pair) in OutputSlot::ALL.iter().zip(body[5..].chunks_exact_mut(2)) {
        let output = settings.output(*slot);
        pair[0] = output.out_type.ordinal();
        pair[1] = output.out_channel.ordinal();
    }

    record[HEADER_LEN + BODY_LEN..].copy_from_slice(&MAGIC);
    record
}

/// Deserialize a record produced by [`encode`].
///
/// Values are passed through the regular setters, so a record that assigns a slot a type its hardware cannot
/// produce decodes with that type clamped rather than failing.
pub fn decode(record: &[u8]) -> Result<EngineSettings, PersistError> {
    if record.len() < ENCODED_LEN {
        return Err(PersistError::Truncated { len: record.len() });
    }
    if record[..MAGIC.len()] != MAGIC || record[HEADER_LEN + BODY_LEN..ENCODED_LEN] != MAGIC {
        return Err(PersistError::BadMagic);
    }
    let version = record[MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(PersistError::VersionMismatch { found: version });
    }

    let field = |offset: usize| record[HEADER_LEN + offset];
    let invalid = |offset: usize| PersistError::InvalidField {
        offset: HEADER_LEN + offset,
        value: field(offset),
    };

    let mut settings = EngineSettings::DEFAULT;
    settings.set_bpm(field(0).into());
    settings.set_midi_channel(MidiChannel::from_ordinal(field(1)).ok_or_else(|| invalid(1))?);
    settings.set_clock_mode(ClockMode::from_u8(field(2)).ok_or_else(|| invalid(2))?);
    settings.set_bluetooth_enabled(match field(3) {
        0 => false,
        1 => true,
        _ => return Err(invalid(3)),
    });
    if usize::from(field(4)) != SLOT_COUNT {
        return Err(invalid(4));
    }
    for (i, slot) in OutputSlot::ALL.into_iter().enumerate() {
        let offset = 5 + 2 * i;
        let out_type = MidiOutType::from_ordinal(field(offset)).ok_or_else(|| invalid(offset))?;
        let out_channel =
            MidiChannel::from_ordinal(field(offset + 1)).ok_or_else(|| invalid(offset + 1))?;
        settings.set_out_type(slot, out_type);
        settings.set_out_channel(slot, out_channel);
    }
    Ok(settings)
}
