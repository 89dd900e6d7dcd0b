#![warn(missing_docs)]

//! Micro-tuning format parsing and frequency finding library.
//!
//! This library provides parsing of SCL (scale), KBM (keyboard mapping) and ASCL (Ableton's
//! extended scale) files, constructing tunings from scales and keyboard mappings and finding
//! frequencies of notes.
//!
//! ```
//! # use microtuning::*;
//! let s = Scale::parse_scl_data(
//!     "Just major triad
//!     3
//!     5/4
//!     3/2
//!     2/1",
//! )
//! .unwrap();
//! let k = KeyboardMapping::tune_note_to(60, 200.0);
//! let t = Tuning::from_scale_and_keyboard_mapping(s, k, AllowTuningOnUnmapped(false)).unwrap();
//!
//! assert!((t.frequency_for_midi_note(61).unwrap() - 250.0).abs() < 1e-9);
//! assert!((t.frequency_for_midi_note(63).unwrap() - 400.0).abs() < 1e-9);
//! ```
//!
//! Errors are reported as [`TuningError`]. The crate logs through the [`log`] facade and leaves
//! installing a logger to the application.

mod ableton;
mod error;
mod keyboard_mapping;
mod scale;
mod tone;
mod tuning;

pub use ableton::{AbletonScale, NotationMapping, NoteRange};
pub use error::{ErrorKind, FormatErrorKind, TuningError};
pub use keyboard_mapping::KeyboardMapping;
pub use scale::Scale;
pub use tone::{Tone, ToneValue};
pub use tuning::{AllowTuningOnUnmapped, Tuning};

/// Frequency of a MIDI note 0. Equal to `440 * 2^(-69/12)`.
pub const MIDI_0_FREQ: f64 = 8.17579891564371;
