//! User-configurable routing and clock settings, and traits to make them easier to work with in code.
//!
//! [`EngineSettings`] is the persisted root; everything else in this module describes one of its fields.

mod channel;
pub use channel::*;

mod clock_mode;
pub use clock_mode::*;

mod out_type;
pub use out_type::*;

mod output_slot;
pub use output_slot::*;

mod settings;
pub use settings::*;

use num_traits::{FromPrimitive, ToPrimitive};

/// A trait which allows infinite cycling of an enum's variants.
///
/// Useful for pushbutton user interfaces, allowing presses to advance from the current to the next variant,
/// cycling back to the beginning when all variants have been exhausted.
pub trait CycleConfig {
    /// Return the next variant, cycling back to the beginning as needed.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized,
    {
        let index = self
            .to_u8()
            .expect("enum variants should be castable to u8");
        match <Self as FromPrimitive>::from_u8(index + 1) {
            Some(new_selection) => new_selection,
            None => FromPrimitive::from_u8(0).expect("enum should not be empty"),
        }
    }
}
