use std::{fs, io::Read, path::Path};

use log::{debug, trace};

use crate::{
    error::{FormatErrorKind, TuningError},
    MIDI_0_FREQ,
};

/// A parsed KBM file: which scale degree each key plays, and which key is pinned to which
/// frequency.
///
/// Most mappings only move the anchor, [`KeyboardMapping::tuning_constant_note`] tuned to
/// [`KeyboardMapping::tuning_frequency`], and leave [`KeyboardMapping::keys`] empty so keys walk
/// the scale one degree at a time. A non-empty key list repeats every `count()` keys.
///
/// Just as with [`Scale`](crate::Scale) the [`KeyboardMapping::raw_text`] member contains the text
/// of the KBM file used.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct KeyboardMapping {
    /// Lowest key the mapping is meant for. Informational.
    pub first_midi: i32,

    /// Highest key the mapping is meant for. Informational.
    pub last_midi: i32,

    /// MIDI note where the first entry of the mapping is placed.
    pub middle_note: i32,

    /// The anchor key, pinned to `tuning_frequency`.
    pub tuning_constant_note: i32,

    /// Frequency of the anchor key in Hz.
    pub tuning_frequency: f64,

    /// Scale degree of the formal octave, the interval by which the mapping repeats. 0 means the
    /// period of the scale.
    pub octave_degrees: i32,

    /// Mapped keys. Each key holds the scale degree it plays, or `None` if it plays nothing.
    /// The length of this vector is the size of the mapping.
    pub keys: Vec<Option<u32>>,

    /// KBM text the mapping was parsed from or generated as.
    pub raw_text: String,

    /// Path of the file the mapping was read from, if any.
    pub name: String,
}

impl Default for KeyboardMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardMapping {
    /// Constructs a default `KeyboardMapping`: no remapping, MIDI note 60 is the first degree of
    /// the scale and is tuned to its standard frequency.
    pub fn new() -> Self {
        let mut k = KeyboardMapping {
            first_midi: 0,
            last_midi: 127,
            middle_note: 60,
            tuning_constant_note: 60,
            tuning_frequency: MIDI_0_FREQ * 32.0,
            octave_degrees: 0,
            keys: Vec::new(),
            raw_text: String::new(),
            name: String::new(),
        };

        k.raw_text = format!("! Default KBM file\n{}", k.to_kbm_data());
        k
    }

    /// Number of keys before the mapping repeats, 0 for the identity mapping.
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    /// Pitch of the tuned note. Equal to `tuning_frequency / MIDI_0_FREQ`.
    pub fn tuning_pitch(&self) -> f64 {
        self.tuning_frequency / MIDI_0_FREQ
    }

    /// Reads and parses the KBM file at `fname`. The mapping is named after the path.
    pub fn read_kbm_file<P>(fname: P) -> Result<Self, TuningError>
    where
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(&fname)?;

        let mut res = KeyboardMapping::parse_kbm_data(&content)?;
        res.name = fname.as_ref().display().to_string();
        Ok(res)
    }

    /// Returns a KeyboardMapping or an error from KBM data provided by `reader`.
    pub fn read_kbm_stream<R: Read>(mut reader: R) -> Result<Self, TuningError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        KeyboardMapping::parse_kbm_data(&content)
    }

    /// Parses KBM text.
    ///
    /// Keys are either a scale degree or one of `x`, `X` and `-` for keys which are not mapped.
    pub fn parse_kbm_data(kbm_contents: &str) -> Result<Self, TuningError> {
        enum ParsePosition {
            MapSize,
            FirstMidi,
            LastMidi,
            Middle,
            Reference,
            Freq,
            Degree,
            Keys,
            Trailing,
        }

        impl ParsePosition {
            fn next(&self) -> ParsePosition {
                match self {
                    ParsePosition::MapSize => Self::FirstMidi,
                    ParsePosition::FirstMidi => Self::LastMidi,
                    ParsePosition::LastMidi => Self::Middle,
                    ParsePosition::Middle => Self::Reference,
                    ParsePosition::Reference => Self::Freq,
                    ParsePosition::Freq => Self::Degree,
                    ParsePosition::Degree => Self::Keys,
                    ParsePosition::Keys | ParsePosition::Trailing => Self::Trailing,
                }
            }

            fn field(&self) -> &'static str {
                match self {
                    ParsePosition::MapSize => "map size",
                    ParsePosition::FirstMidi => "first MIDI note",
                    ParsePosition::LastMidi => "last MIDI note",
                    ParsePosition::Middle => "middle note",
                    ParsePosition::Reference => "reference note",
                    ParsePosition::Freq => "reference frequency",
                    ParsePosition::Degree => "octave degree",
                    ParsePosition::Keys | ParsePosition::Trailing => "keys",
                }
            }
        }

        let mut state = ParsePosition::MapSize;

        let mut res = KeyboardMapping::new();
        let mut map_size = 0;
        let mut last_lineno = 0;

        // Blank lines at the very end are not part of the mapping.
        let lines: Vec<&str> = kbm_contents.split('\n').map(|x| x.trim()).collect();
        let content_end = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |p| p + 1);

        for (lineno, line) in (1..).zip(lines[..content_end].iter().copied()) {
            last_lineno = lineno;

            if line.starts_with('!') {
                continue;
            }

            if let ParsePosition::Trailing = state {
                trace!("ignoring trailing KBM line {lineno}: {line:?}");
                continue;
            }

            let is_unmapped_key =
                matches!(state, ParsePosition::Keys) && matches!(line, "x" | "X" | "-");

            if !is_unmapped_key {
                if line.is_empty() {
                    return Err(TuningError::format(lineno, line, FormatErrorKind::EmptyLine));
                }

                if let Some(bad_char) = line
                    .chars()
                    .find(|&c| !(c == ' ' || c.is_ascii_digit() || c == '.' || c == '\r'))
                {
                    return Err(TuningError::format(
                        lineno,
                        line,
                        FormatErrorKind::BadCharacter(bad_char),
                    ));
                }
            }

            let integer_error = |_| TuningError::format(lineno, line, FormatErrorKind::Integer);

            match state {
                ParsePosition::MapSize => map_size = line.parse().map_err(integer_error)?,
                ParsePosition::FirstMidi => {
                    res.first_midi = line.parse().map_err(integer_error)?
                }
                ParsePosition::LastMidi => res.last_midi = line.parse().map_err(integer_error)?,
                ParsePosition::Middle => {
                    res.middle_note = line.parse().map_err(integer_error)?
                }
                ParsePosition::Reference => {
                    res.tuning_constant_note = line.parse().map_err(integer_error)?
                }
                ParsePosition::Freq => {
                    res.tuning_frequency = line.parse().map_err(|_| {
                        TuningError::format(lineno, line, FormatErrorKind::Frequency)
                    })?
                }
                ParsePosition::Degree => {
                    res.octave_degrees = line.parse().map_err(integer_error)?
                }
                ParsePosition::Keys => {
                    let key = if is_unmapped_key {
                        None
                    } else {
                        Some(line.parse().map_err(integer_error)?)
                    };
                    res.keys.push(key);
                }
                ParsePosition::Trailing => {}
            }

            if !matches!(state, ParsePosition::Keys) || res.keys.len() == map_size {
                state = state.next();
            }
            if matches!(state, ParsePosition::Keys) && map_size == 0 {
                state = ParsePosition::Trailing;
            }
        }

        match state {
            ParsePosition::Keys => {
                return Err(TuningError::format(
                    last_lineno + 1,
                    "",
                    FormatErrorKind::MissingKeys {
                        expected: map_size,
                        found: res.keys.len(),
                    },
                ))
            }
            ParsePosition::Trailing => (),
            ref header => {
                return Err(TuningError::format(
                    last_lineno + 1,
                    "",
                    FormatErrorKind::MissingHeader(header.field()),
                ))
            }
        }

        debug!(
            "parsed KBM mapping of {} keys, note {} tuned to {} Hz",
            res.count(),
            res.tuning_constant_note,
            res.tuning_frequency
        );

        res.raw_text = kbm_contents.to_string();
        Ok(res)
    }

    /// Writes the mapping as KBM text. Parsing the result gives back the same mapping.
    pub fn to_kbm_data(&self) -> String {
        let mut data = String::new();
        data += &format!("! Size of map\n{}\n", self.count());
        data += &format!(
            "! First and last MIDI notes to map\n{}\n{}\n",
            self.first_midi, self.last_midi
        );
        data += &format!(
            "! Middle note where the first entry of the mapping is mapped to\n{}\n",
            self.middle_note
        );
        data += &format!(
            "! Reference note for which frequency is given\n{}\n",
            self.tuning_constant_note
        );
        data += &format!(
            "! Frequency to tune the above note to\n{}\n",
            self.tuning_frequency
        );
        data += &format!(
            "! Scale degree to consider as formal octave\n{}\n",
            self.octave_degrees
        );
        data += "! Mapping\n";
        data += &self
            .keys
            .iter()
            .map(|key| match key {
                Some(degree) => format!("{degree}\n"),
                None => String::from("x\n"),
            })
            .collect::<String>();
        data
    }

    /// Creates a KeyboardMapping which keeps the MIDI note 69 (A4) set to a constant given
    /// frequency.
    pub fn tune_a69_to(freq: f64) -> Self {
        KeyboardMapping::tune_note_to(69, freq)
    }

    /// Identity mapping with `midi_note` tuned to `freq`.
    pub fn tune_note_to(midi_note: i32, freq: f64) -> Self {
        KeyboardMapping::start_scale_on_and_tune_note_to(60, midi_note, freq)
    }

    /// Identity mapping which starts the scale on `scale_start` and tunes `midi_note` to
    /// `freq`.
    ///
    /// ```
    /// # use microtuning::*;
    /// let k = KeyboardMapping::start_scale_on_and_tune_note_to(62, 69, 432.0);
    /// let t = Tuning::from_keyboard_mapping(k).unwrap();
    /// assert_eq!(t.scale_position_for_midi_note(62).unwrap(), Some(0));
    /// assert!((t.frequency_for_midi_note(69).unwrap() - 432.0).abs() < 1e-9);
    /// ```
    pub fn start_scale_on_and_tune_note_to(scale_start: i32, midi_note: i32, freq: f64) -> Self {
        let mut k = KeyboardMapping {
            middle_note: scale_start,
            tuning_constant_note: midi_note,
            tuning_frequency: freq,
            ..KeyboardMapping::new()
        };

        k.raw_text = format!(
            "! Automatically generated mapping, tuning note {midi_note} to {freq} Hz\n{}",
            k.to_kbm_data()
        );
        k
    }
}
