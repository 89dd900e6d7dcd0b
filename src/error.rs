//! Errors reported by the parsers and by tuning construction.

use std::{fmt, io};

use thiserror::Error;

/// Broad class of a [`TuningError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed SCL, KBM or ASCL text. Always carries a line number and the raw line.
    Format,
    /// A MIDI note, scale degree or frequency outside of what can be represented.
    Range,
    /// A scale and mapping that cannot be combined, or invalid generator arguments.
    Configuration,
    /// Reading the input failed.
    Io,
}

/// What exactly was wrong with a line of text.
#[derive(Clone, Debug, PartialEq)]
pub enum FormatErrorKind {
    /// Line contains `.` but is not a cents value.
    Cents,
    /// Numerator of a ratio is not an integer.
    Numerator,
    /// Denominator of a ratio is not an integer.
    Denominator,
    /// Value contains more than one `/`.
    Fraction,
    /// Ratio with a zero or negative term.
    NonPositiveRatio,
    /// Note count of an SCL file is not a non-negative integer.
    NoteCount,
    /// SCL file ends before its note count.
    MissingNoteCount,
    /// SCL file declares more tones than it lists.
    MissingTones {
        /// Declared number of tones.
        expected: usize,
        /// Number of tones actually present.
        found: usize,
    },
    /// A KBM line that must hold a value is blank.
    EmptyLine,
    /// A KBM line contains a character which is not allowed there.
    BadCharacter(char),
    /// A KBM value is not an integer.
    Integer,
    /// The KBM reference frequency is not a number.
    Frequency,
    /// KBM file ends inside its header.
    MissingHeader(&'static str),
    /// KBM file declares more keys than it lists.
    MissingKeys {
        /// Declared size of the mapping.
        expected: usize,
        /// Number of keys actually present.
        found: usize,
    },
    /// Unknown or malformed `@ABL` directive.
    Directive,
    /// More note names than the scale has degrees.
    TooManyNoteNames {
        /// Number of names given.
        names: usize,
        /// Largest number of names allowed.
        limit: usize,
    },
    /// Not a note name such as `C#` or `Bb`.
    NoteName,
}

impl fmt::Display for FormatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cents => write!(f, "value contains . but is not numeric"),
            Self::Numerator => write!(f, "numerator is not numeric"),
            Self::Denominator => write!(f, "denominator is not numeric"),
            Self::Fraction => write!(f, "value is not a valid fraction"),
            Self::NonPositiveRatio => write!(f, "ratio terms must be positive"),
            Self::NoteCount => write!(f, "invalid note count"),
            Self::MissingNoteCount => write!(f, "SCL data ends before the note count"),
            Self::MissingTones { expected, found } => {
                write!(f, "expected {expected} tones, found {found}")
            }
            Self::EmptyLine => write!(f, "blank line where a value was expected"),
            Self::BadCharacter(c) => write!(f, "bad character {c:?}"),
            Self::Integer => write!(f, "value is not an integer"),
            Self::Frequency => write!(f, "value is not a frequency"),
            Self::MissingHeader(field) => write!(f, "KBM data ends before the {field}"),
            Self::MissingKeys { expected, found } => {
                write!(f, "expected {expected} keys, found {found}")
            }
            Self::Directive => write!(f, "malformed @ABL directive"),
            Self::TooManyNoteNames { names, limit } => {
                write!(f, "{names} note names given but at most {limit} are allowed")
            }
            Self::NoteName => write!(f, "not a note name"),
        }
    }
}

/// Errors
#[derive(Debug, Error)]
pub enum TuningError {
    /// Error parsing an SCL/KBM/ASCL file or string.
    #[error("line {line}: {kind} ({text:?})")]
    Format {
        /// 1-based line number, or 0 when the text did not come from a file.
        line: usize,
        /// The offending text.
        text: String,
        /// What was wrong with it.
        kind: FormatErrorKind,
    },

    /// MIDI note outside of the precomputed range.
    #[error("MIDI note {0} is outside of the tuning range")]
    NoteOutOfRange(i32),

    /// Keyboard mapping refers to a scale degree the scale does not have.
    #[error("scale degree {degree} is outside of 0..={count}")]
    DegreeOutOfRange {
        /// The requested degree.
        degree: i64,
        /// Number of tones in the scale.
        count: usize,
    },

    /// Scale position, or the MIDI note it lands on, does not fit in an `i32`.
    #[error("scale position {0} is outside the representable range")]
    ScalePositionOutOfRange(i64),

    /// Frequencies must be positive.
    #[error("invalid frequency {0} Hz")]
    InvalidFrequency(f64),

    /// The last tone of the scale is a unison, so the scale never repeats.
    #[error("scale period is a unison")]
    DegeneratePeriod,

    /// Tuning attempted to tune an unmapped key.
    #[error("attempted to tune unmapped key {0}")]
    TuningUnmappedKey(i32),

    /// The formal octave of the mapping is beyond the end of the scale.
    #[error("keyboard mapping octave of {octave_degrees} degrees is longer than the scale of {count} tones")]
    MappingLongerThanScale {
        /// Formal octave degree of the mapping.
        octave_degrees: i32,
        /// Number of tones in the scale.
        count: usize,
    },

    /// Cannot divide zero span.
    #[error("cannot divide zero span")]
    ZeroSpan,

    /// Cannot divide non-positive cents amount.
    #[error("cannot divide non-positive cents amount")]
    NonPositiveCents,

    /// Cannot divide into zero steps.
    #[error("cannot divide into zero steps")]
    ZeroSteps,

    /// Error reading the file.
    #[error("error reading the file: {0}")]
    Io(#[from] io::Error),
}

impl TuningError {
    pub(crate) fn format(line: usize, text: &str, kind: FormatErrorKind) -> Self {
        TuningError::Format {
            line,
            text: text.to_string(),
            kind,
        }
    }

    /// Returns the broad class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TuningError::Format { .. } => ErrorKind::Format,
            TuningError::NoteOutOfRange(_)
            | TuningError::DegreeOutOfRange { .. }
            | TuningError::ScalePositionOutOfRange(_)
            | TuningError::InvalidFrequency(_) => ErrorKind::Range,
            TuningError::DegeneratePeriod
            | TuningError::TuningUnmappedKey(_)
            | TuningError::MappingLongerThanScale { .. }
            | TuningError::ZeroSpan
            | TuningError::NonPositiveCents
            | TuningError::ZeroSteps => ErrorKind::Configuration,
            TuningError::Io(_) => ErrorKind::Io,
        }
    }
}
