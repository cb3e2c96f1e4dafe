//! Provides a struct [`VoiceStack`] for tracking the held notes of a single MIDI channel. Here "held" means the note
//! received a NoteOn and no matching NoteOff yet, whether or not it is the note being voiced.

use core::iter;
use wmidi::Note;

/// Number of distinct MIDI notes.
pub const NOTE_COUNT: usize = 128;

const _: () = assert!(
    NOTE_COUNT <= u8::MAX as usize,
    "held note count must fit in a u8"
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Link {
    prev: Option<Note>,
    next: Option<Note>,
    held: bool,
}

impl Link {
    const RELEASED: Self = Self {
        prev: None,
        next: None,
        held: false,
    };
}

/// Insertion-ordered set of held notes.
///
/// Notes are linked through an arena indexed by note number, so pushing and popping are O(1) no matter how many
/// notes are held or in which order they are released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceStack {
    links: [Link; NOTE_COUNT],
    head: Option<Note>,
    tail: Option<Note>,
    count: u8,
}

#[cfg(feature = "defmt")]
impl defmt::Format for VoiceStack {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "VoiceStack {{ notes: [");
        for (i, note) in self.iter().enumerate() {
            if i == 0 {
                defmt::write!(fmt, " ");
            } else {
                defmt::write!(fmt, ", ");
            }
            defmt::write!(fmt, "{} ({})", note.to_str(), note as u8);
        }
        defmt::write!(fmt, " ] }}");
    }
}

impl Default for VoiceStack {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceStack {
    /// Construct an empty `VoiceStack`.
    pub const fn new() -> Self {
        Self {
            links: [Link::RELEASED; NOTE_COUNT],
            head: None,
            tail: None,
            count: 0,
        }
    }

    /// Mark `note` as held, appending it after the other held notes. Returns `false`, changing nothing, if it already
    /// was held.
    pub fn push(&mut self, note: Note) -> bool {
        let link = &mut self.links[note as usize];
        if link.held {
            return false;
        }
        *link = Link {
            prev: self.tail,
            next: None,
            held: true,
        };
        match self.tail {
            Some(tail) => self.links[tail as usize].next = Some(note),
            None => self.head = Some(note),
        }
        self.tail = Some(note);
        self.count += 1;
        true
    }

    /// Release `note`. Returns `false`, changing nothing, if it wasn't held.
    pub fn pop(&mut self, note: Note) -> bool {
        let Link { prev, next, held } = self.links[note as usize];
        if !held {
            return false;
        }
        match prev {
            Some(prev) => self.links[prev as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.links[next as usize].prev = prev,
            None => self.tail = prev,
        }
        self.links[note as usize] = Link::RELEASED;
        self.count -= 1;
        true
    }

    /// The highest held note.
    pub fn current(&self) -> Option<Note> {
        self.iter().max()
    }

    /// Determine if any notes are held.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of held notes.
    pub fn count(&self) -> usize {
        self.count.into()
    }

    /// Returns an [`Iterator`] over the held notes in the order they were pushed.
    pub fn iter(&self) -> impl Iterator<Item = Note> + '_ {
        iter::successors(self.head, |&note| self.links[note as usize].next)
    }
}

impl FromIterator<Note> for VoiceStack {
    fn from_iter<I: IntoIterator<Item = Note>>(notes: I) -> Self {
        let mut stack = Self::new();
        notes.into_iter().for_each(|note| {
            stack.push(note);
        });
        stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;
    use wmidi::U7;

    fn chord() -> VoiceStack {
        [Note::E4, Note::C4, Note::G4].into_iter().collect()
    }

    #[test]
    fn new() {
        let stack = VoiceStack::new();
        assert!(stack.is_empty());
        assert_eq!(0, stack.count());
        assert_eq!(None, stack.current());
    }

    #[test]
    fn push_appends() {
        let mut stack = chord();
        assert!(stack.push(Note::D4));

        let expected = [Note::E4, Note::C4, Note::G4, Note::D4];
        let actual: Vec<Note> = stack.iter().collect();
        assert_eq!(&expected[..], &actual[..], "Expected left but got right");
        assert_eq!(4, stack.count());
    }

    #[test]
    fn duplicate_push_is_rejected() {
        let expected = chord();
        let mut actual = chord();
        assert!(!actual.push(Note::C4));
        assert_eq!(expected, actual, "Expected left but got right");
    }

    #[test]
    fn pop_removes_from_the_middle() {
        let mut stack = chord();
        assert!(stack.pop(Note::C4));

        let expected = [Note::E4, Note::G4];
        let actual: Vec<Note> = stack.iter().collect();
        assert_eq!(&expected[..], &actual[..], "Expected left but got right");
        assert_eq!(2, stack.count());
    }

    #[test]
    fn pop_head_and_tail() {
        let mut stack = chord();
        assert!(stack.pop(Note::E4));
        assert!(stack.pop(Note::G4));

        let actual: Vec<Note> = stack.iter().collect();
        assert_eq!(&[Note::C4][..], &actual[..], "Expected left but got right");

        assert!(stack.push(Note::A4));
        let actual: Vec<Note> = stack.iter().collect();
        assert_eq!(
            &[Note::C4, Note::A4][..],
            &actual[..],
            "Expected left but got right"
        );
    }

    #[test]
    fn pop_unheld_is_rejected() {
        let expected = chord();
        let mut actual = chord();
        assert!(!actual.pop(Note::B4));
        assert_eq!(expected, actual, "Expected left but got right");
    }

    #[test]
    fn push_then_pop_restores_state() {
        let expected = chord();
        let mut actual = chord();
        assert!(actual.push(Note::D4));
        assert!(actual.pop(Note::D4));
        assert_eq!(expected, actual, "Expected left but got right");
    }

    #[test]
    fn pop_everything_empties() {
        let mut stack = chord();
        for note in [Note::G4, Note::E4, Note::C4] {
            assert!(stack.pop(note));
        }
        assert!(stack.is_empty());
        assert_eq!(VoiceStack::new(), stack, "Expected left but got right");
    }

    #[test]
    fn current_is_highest() {
        let mut stack = VoiceStack::new();
        stack.push(Note::C4);
        stack.push(Note::E4);
        assert_eq!(Some(Note::E4), stack.current());

        stack.pop(Note::E4);
        assert_eq!(Some(Note::C4), stack.current());
    }

    #[test]
    fn holds_every_note() {
        let stack: VoiceStack = (0..=127)
            .map(|number| Note::from(U7::from_u8_lossy(number)))
            .collect();
        assert_eq!(NOTE_COUNT, stack.count());
        assert_eq!(Some(Note::from(U7::MAX)), stack.current());
        assert_eq!(Some(Note::from(U7::MIN)), stack.iter().next());
    }
}
