#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! Environment families that ship with the host.
//!
//! * [`Echo`] rewards each instance with the action it was given.
//! * [`GuessNumber`] hides a bit string and rewards correct guesses.
//! * [`Ramp`] produces deterministic observations in every dtype, an info
//!   space and a render space, for checking buffer layout end to end.

pub mod echo;
pub mod guess_number;
pub mod ramp;

pub use echo::Echo;
pub use guess_number::GuessNumber;
pub use ramp::Ramp;
