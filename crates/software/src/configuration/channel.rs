use core::{fmt, ops::RangeInclusive};
use wmidi::Channel;

/// Ordinals the global MIDI channel may take: channels 1-16 and [`MidiChannel::All`].
pub const GLOBAL_CHANNELS: RangeInclusive<u8> = 1..=17;

/// Ordinals a per-output channel override may take: [`MidiChannel::Unchanged`], channels 1-16, and
/// [`MidiChannel::All`].
pub const OUTPUT_CHANNELS: RangeInclusive<u8> = 0..=17;

const UNCHANGED_ORDINAL: u8 = 0;
const ALL_ORDINAL: u8 = 17;

/// The MIDI channel(s) a setting listens to.
///
/// Concrete channels are represented by [`wmidi::Channel`]; the two sentinels are modeled as variants rather than
/// magic numbers. Each value also has a stable ordinal (`Unchanged` = 0, channels 1-16, `All` = 17) used for
/// persistence and for stepping through values with an encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiChannel {
    /// Only meaningful as a per-output override; defers to the global channel.
    Unchanged,
    /// A single MIDI channel.
    Only(Channel),
    /// Matches messages on any channel.
    All,
}

#[cfg(feature = "defmt")]
impl defmt::Format for MidiChannel {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Unchanged => defmt::write!(fmt, "Unchanged"),
            Self::Only(channel) => defmt::write!(fmt, "Only({=u8})", channel.number()),
            Self::All => defmt::write!(fmt, "All"),
        }
    }
}

impl fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => f.write_str("--"),
            Self::Only(channel) => write!(f, "{}", channel.number()),
            Self::All => f.write_str("all"),
        }
    }
}

impl MidiChannel {
    /// Stable ordinal of this value.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Unchanged => UNCHANGED_ORDINAL,
            Self::Only(channel) => channel.number(),
            Self::All => ALL_ORDINAL,
        }
    }

    /// Inverse of [`ordinal`][Self::ordinal]. Returns `None` for ordinals above 17.
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            UNCHANGED_ORDINAL => Some(Self::Unchanged),
            ALL_ORDINAL => Some(Self::All),
            n => Channel::from_index(n - 1).ok().map(Self::Only),
        }
    }

    /// Whether a message arriving on `incoming` is accepted. `Unchanged` accepts nothing on its own; see [`matches`].
    pub fn accepts(self, incoming: Channel) -> bool {
        match self {
            Self::Unchanged => false,
            Self::Only(channel) => channel == incoming,
            Self::All => true,
        }
    }

    /// Move this value into `range`, saturating at its ends.
    pub fn clamp_to(self, range: RangeInclusive<u8>) -> Self {
        let ordinal = self.ordinal().clamp(*range.start(), *range.end());
        Self::from_ordinal(ordinal).unwrap_or(Self::All)
    }

    /// Move `delta` ordinals away from this value without leaving `range`.
    pub fn step(self, delta: i16, range: RangeInclusive<u8>) -> Self {
        let ordinal = (i16::from(self.ordinal()) + delta)
            .clamp(i16::from(*range.start()), i16::from(*range.end()));
        Self::from_ordinal(ordinal as u8).unwrap_or(Self::All)
    }
}

/// Channel routing predicate for a single output.
///
/// When the output's override is [`MidiChannel::Unchanged`], the incoming channel is compared to the global channel;
/// otherwise it's compared to the override. Either way, [`MidiChannel::All`] matches any channel.
pub fn matches(output: MidiChannel, global: MidiChannel, incoming: Channel) -> bool {
    match output {
        MidiChannel::Unchanged => global.accepts(incoming),
        routed => routed.accepts(incoming),
    }
}
