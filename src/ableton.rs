use std::{fs, io::Read, path::Path};

use log::debug;

use crate::{
    error::{FormatErrorKind, TuningError},
    keyboard_mapping::KeyboardMapping,
    scale::Scale,
    MIDI_0_FREQ,
};

/// Names of the notes of a scale, starting with the root.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Default, Clone, Debug, PartialEq)]
pub struct NotationMapping {
    /// One name per scale degree. Names must not contain `"`.
    pub names: Vec<String>,
}

impl NotationMapping {
    /// Number of names.
    pub fn count(&self) -> usize {
        self.names.len()
    }
}

/// Range of notes an ASCL file is meant to be played in.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum NoteRange {
    /// Lowest and optionally highest note as `(octave, index)` pairs.
    ByIndex {
        /// Lowest note.
        low: (i32, i32),
        /// Highest note.
        high: Option<(i32, i32)>,
    },

    /// Lowest and optionally highest frequency in Hz.
    ByFrequency {
        /// Lowest frequency.
        low: f64,
        /// Highest frequency.
        high: Option<f64>,
    },
}

/// The AbletonScale struct represents an ASCL file, Ableton's extension of the SCL format.
///
/// An ASCL file is an SCL file whose comment lines carry extra information:
///
/// ```text
/// ! @ABL NOTE_NAMES C "C#" D
/// ! @ABL REFERENCE_PITCH 3 9 440
/// ! @ABL NOTE_RANGE_BY_INDEX 1 0 8 2
/// ! @ABL NOTE_RANGE_BY_FREQUENCY 20 8000
/// ! @ABL SOURCE free text
/// ! @ABL LINK https://example.com
/// ! @KBM <line of a KBM file>
/// ```
///
/// Notes are addressed by scale position `octave * count + index`. The reference pitch pins one
/// position to a frequency. Octave 3, index 0 is placed on MIDI note 60.
///
/// If the file has no `@KBM` lines, the [`AbletonScale::keyboard_mapping`] is derived from the
/// reference pitch and the note range.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct AbletonScale {
    /// The scale.
    pub scale: Scale,

    /// Keyboard mapping, either given inline or derived from the reference pitch.
    pub keyboard_mapping: KeyboardMapping,

    /// Note names.
    pub notation_mapping: NotationMapping,

    /// Octave of the reference pitch.
    pub reference_pitch_octave: i32,

    /// Scale index of the reference pitch.
    pub reference_pitch_index: i32,

    /// Frequency of the reference pitch in Hz.
    pub reference_pitch_freq: f64,

    /// Range of notes the scale is meant for.
    pub note_range: Option<NoteRange>,

    /// Where the scale comes from.
    pub source: String,

    /// Link to more information about the scale.
    pub link: String,

    /// Whether the keyboard mapping was given inline with `@KBM` lines.
    pub inline_mapping: bool,

    /// Raw text of the ASCL file.
    pub raw_text: String,
}

impl Default for AbletonScale {
    fn default() -> Self {
        Self::new()
    }
}

fn tagged<'a>(comment: &'a str, tag: &str) -> Option<&'a str> {
    let rest = comment.strip_prefix(tag)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest.trim()),
        Some(_) => None,
    }
}

/// Splits a list of note names. Names containing spaces are double quoted. A name can never
/// contain a double quote, and a closing quote must end the name.
fn split_names(args: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    let mut rest = args.trim_start();

    while !rest.is_empty() {
        let end = if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"')?;
            names.push(quoted[..end].to_string());
            end + 2
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            if rest[..end].contains('"') {
                return None;
            }
            names.push(rest[..end].to_string());
            end
        };
        rest = &rest[end..];
        if rest.starts_with(|c: char| !c.is_whitespace()) {
            return None;
        }
        rest = rest.trim_start();
    }

    Some(names)
}

fn parse_args<T: std::str::FromStr>(args: &str) -> Option<Vec<T>> {
    args.split_whitespace().map(|a| a.parse().ok()).collect()
}

impl AbletonScale {
    /// Constructs an AbletonScale with an empty scale, the default keyboard mapping and the
    /// reference pitch at octave 3, index 0 tuned to the standard frequency of MIDI note 60.
    pub fn new() -> Self {
        AbletonScale {
            scale: Scale::new(),
            keyboard_mapping: KeyboardMapping::new(),
            notation_mapping: NotationMapping::default(),
            reference_pitch_octave: 3,
            reference_pitch_index: 0,
            reference_pitch_freq: MIDI_0_FREQ * 32.0,
            note_range: None,
            source: String::new(),
            link: String::new(),
            inline_mapping: false,
            raw_text: String::new(),
        }
    }

    /// Returns an AbletonScale or an error from the ASCL file in `fname`.
    pub fn read_ascl_file<P>(fname: P) -> Result<Self, TuningError>
    where
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(&fname)?;

        let mut res = AbletonScale::parse_ascl_data(&content)?;
        res.scale.name = fname.as_ref().display().to_string();
        Ok(res)
    }

    /// Returns an AbletonScale or an error from ASCL data provided by `reader`.
    pub fn read_ascl_stream<R: Read>(mut reader: R) -> Result<Self, TuningError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        AbletonScale::parse_ascl_data(&content)
    }

    /// Returns an AbletonScale or an error from ASCL data in memory.
    ///
    /// ```
    /// # use microtuning::*;
    /// let data = "! @ABL NOTE_NAMES Sa Re Ga
    ///     ! @ABL REFERENCE_PITCH 4 0 240
    ///     Three notes
    ///     3
    ///     5/4
    ///     3/2
    ///     2/1";
    /// let a = AbletonScale::parse_ascl_data(data).unwrap();
    /// assert_eq!(a.notation_mapping.names, ["Sa", "Re", "Ga"]);
    /// assert_eq!(a.midi_note_for_scale_position(13).unwrap(), 64);
    /// assert!((a.frequency_for_scale_position(13).unwrap() - 300.0).abs() < 1e-9);
    /// ```
    pub fn parse_ascl_data(ascl_contents: &str) -> Result<Self, TuningError> {
        let mut res = AbletonScale {
            scale: Scale::parse_scl_data(ascl_contents)?,
            raw_text: ascl_contents.to_string(),
            ..AbletonScale::new()
        };

        let mut kbm_lines = Vec::new();
        let mut last_lineno = 0;

        for (lineno, line) in (1..).zip(ascl_contents.split('\n').map(|x| x.trim())) {
            last_lineno = lineno;

            let Some(comment) = line.strip_prefix('!').map(str::trim) else {
                continue;
            };

            if let Some(kbm_line) = tagged(comment, "@KBM") {
                kbm_lines.push((lineno, kbm_line));
                continue;
            }

            let Some(directive) = tagged(comment, "@ABL") else {
                continue;
            };

            let directive_error = || TuningError::format(lineno, line, FormatErrorKind::Directive);
            let (name, args) = directive
                .split_once(char::is_whitespace)
                .unwrap_or((directive, ""));
            let args = args.trim();

            match name {
                "NOTE_NAMES" => {
                    let names = split_names(args).ok_or_else(directive_error)?;
                    let limit = res.scale.count() + 1;
                    if names.len() > limit {
                        return Err(TuningError::format(
                            lineno,
                            line,
                            FormatErrorKind::TooManyNoteNames {
                                names: names.len(),
                                limit,
                            },
                        ));
                    }
                    res.notation_mapping = NotationMapping { names };
                }
                "REFERENCE_PITCH" => {
                    let parts: Vec<&str> = args.split_whitespace().collect();
                    let [octave, index, freq] = parts[..] else {
                        return Err(directive_error());
                    };
                    res.reference_pitch_octave = octave.parse().map_err(|_| directive_error())?;
                    res.reference_pitch_index = index.parse().map_err(|_| directive_error())?;
                    res.reference_pitch_freq = match freq.parse::<f64>() {
                        Ok(freq) if freq.is_finite() && freq > 0.0 => freq,
                        _ => return Err(directive_error()),
                    };
                    res.reference_scale_position()
                        .and_then(|position| res.midi_note_for_scale_position(position))
                        .map_err(|_| directive_error())?;
                }
                "NOTE_RANGE_BY_INDEX" => {
                    res.note_range = match parse_args::<i32>(args).as_deref() {
                        Some(&[octave, index]) => Some(NoteRange::ByIndex {
                            low: (octave, index),
                            high: None,
                        }),
                        Some(&[low_octave, low_index, high_octave, high_index]) => {
                            Some(NoteRange::ByIndex {
                                low: (low_octave, low_index),
                                high: Some((high_octave, high_index)),
                            })
                        }
                        _ => return Err(directive_error()),
                    };
                    if let Some(NoteRange::ByIndex { low, high }) = res.note_range {
                        for (octave, index) in std::iter::once(low).chain(high) {
                            res.scale_position(octave, index)
                                .and_then(|position| res.midi_note_for_scale_position(position))
                                .map_err(|_| directive_error())?;
                        }
                    }
                }
                "NOTE_RANGE_BY_FREQUENCY" => {
                    res.note_range = match parse_args::<f64>(args).as_deref() {
                        Some(&[low]) if low > 0.0 => {
                            Some(NoteRange::ByFrequency { low, high: None })
                        }
                        Some(&[low, high]) if low > 0.0 && high > 0.0 => {
                            Some(NoteRange::ByFrequency {
                                low,
                                high: Some(high),
                            })
                        }
                        _ => return Err(directive_error()),
                    };
                }
                "SOURCE" => res.source = args.to_string(),
                "LINK" => res.link = args.to_string(),
                _ => return Err(directive_error()),
            }
        }

        if kbm_lines.is_empty() {
            res.keyboard_mapping = res.derived_keyboard_mapping()?;
        } else {
            let kbm_data = kbm_lines
                .iter()
                .map(|(_, l)| *l)
                .collect::<Vec<_>>()
                .join("\n");

            // Report KBM errors at their line in the ASCL file.
            res.keyboard_mapping =
                KeyboardMapping::parse_kbm_data(&kbm_data).map_err(|e| match e {
                    TuningError::Format { line, text, kind } => TuningError::Format {
                        line: kbm_lines
                            .get(line.wrapping_sub(1))
                            .map_or(last_lineno, |(l, _)| *l),
                        text,
                        kind,
                    },
                    e => e,
                })?;
            res.inline_mapping = true;
        }

        debug!(
            "parsed ASCL scale {:?}: {} names, reference {}/{} at {} Hz, inline mapping: {}",
            res.scale.description,
            res.notation_mapping.count(),
            res.reference_pitch_octave,
            res.reference_pitch_index,
            res.reference_pitch_freq,
            res.inline_mapping
        );

        Ok(res)
    }

    /// Writes the scale as ASCL text. Parsing the result gives back the same scale, mapping,
    /// names and metadata.
    pub fn to_ascl_data(&self) -> String {
        let mut data = self.scale.to_scl_data();
        data += "!\n";

        if self.notation_mapping.count() > 0 {
            let names = self
                .notation_mapping
                .names
                .iter()
                .map(|n| format!("\"{n}\""))
                .collect::<Vec<_>>()
                .join(" ");
            data += &format!("! @ABL NOTE_NAMES {names}\n");
        }

        data += &format!(
            "! @ABL REFERENCE_PITCH {} {} {}\n",
            self.reference_pitch_octave, self.reference_pitch_index, self.reference_pitch_freq
        );

        match &self.note_range {
            Some(NoteRange::ByIndex { low, high }) => {
                data += &format!("! @ABL NOTE_RANGE_BY_INDEX {} {}", low.0, low.1);
                if let Some((octave, index)) = high {
                    data += &format!(" {octave} {index}");
                }
                data += "\n";
            }
            Some(NoteRange::ByFrequency { low, high }) => {
                data += &format!("! @ABL NOTE_RANGE_BY_FREQUENCY {low}");
                if let Some(high) = high {
                    data += &format!(" {high}");
                }
                data += "\n";
            }
            None => (),
        }

        if !self.source.is_empty() {
            data += &format!("! @ABL SOURCE {}\n", self.source);
        }
        if !self.link.is_empty() {
            data += &format!("! @ABL LINK {}\n", self.link);
        }

        if self.inline_mapping {
            data += &self
                .keyboard_mapping
                .to_kbm_data()
                .lines()
                .map(|l| format!("! @KBM {l}\n"))
                .collect::<String>();
        }

        data
    }

    fn scale_position(&self, octave: i32, index: i32) -> Result<i32, TuningError> {
        let position = i64::from(octave) * self.scale.count() as i64 + i64::from(index);
        i32::try_from(position).map_err(|_| TuningError::ScalePositionOutOfRange(position))
    }

    /// Scale position of the reference pitch.
    ///
    /// Fails with [`TuningError::ScalePositionOutOfRange`] if it does not fit in an `i32`.
    pub fn reference_scale_position(&self) -> Result<i32, TuningError> {
        self.scale_position(self.reference_pitch_octave, self.reference_pitch_index)
    }

    /// Returns the MIDI note a scale position is played on, with octave 3, index 0 on MIDI
    /// note 60.
    ///
    /// Fails with [`TuningError::ScalePositionOutOfRange`] if the note does not fit in an `i32`.
    pub fn midi_note_for_scale_position(&self, scale_position: i32) -> Result<i32, TuningError> {
        let note = 60 + i64::from(scale_position) - 3 * self.scale.count() as i64;
        i32::try_from(note).map_err(|_| TuningError::ScalePositionOutOfRange(note))
    }

    /// Frequency ratio of a scale position to octave 0, index 0.
    fn position_ratio(&self, scale_position: i32) -> Result<f64, TuningError> {
        self.scale.period_cents()?;

        let count = self.scale.count() as i32;
        let index = scale_position.rem_euclid(count);
        let octave = scale_position.div_euclid(count);

        let degree_ratio = match index {
            0 => 1.0,
            index => self.scale.tones[index as usize - 1].pitch_ratio(),
        };
        let period_ratio = self.scale.tones[count as usize - 1].pitch_ratio();

        Ok(degree_ratio * period_ratio.powi(octave))
    }

    /// Returns the cents of a scale position relative to the reference pitch.
    ///
    /// Fails with [`TuningError::DegeneratePeriod`] if the scale is empty or its period is a
    /// unison.
    pub fn cents_for_scale_position(&self, scale_position: i32) -> Result<f64, TuningError> {
        let period = self.scale.period_cents()?;
        let count = self.scale.count() as i32;
        let cents = |position: i32| -> Result<f64, TuningError> {
            let octave = position.div_euclid(count);
            Ok(self.scale.degree_cents(position.rem_euclid(count))? + f64::from(octave) * period)
        };

        Ok(cents(scale_position)? - cents(self.reference_scale_position()?)?)
    }

    /// Returns the frequency in Hz of a scale position.
    pub fn frequency_for_scale_position(&self, scale_position: i32) -> Result<f64, TuningError> {
        let reference = self.position_ratio(self.reference_scale_position()?)?;
        Ok(self.reference_pitch_freq * self.position_ratio(scale_position)? / reference)
    }

    /// Returns the scale position whose frequency is nearest to `freq`, measured in log
    /// frequency. Of two equally near positions the lower one is returned.
    ///
    /// Fails with [`TuningError::ScalePositionOutOfRange`] if the positions near `freq` do not
    /// fit in an `i32`, as happens with very small periods.
    pub fn scale_position_for_frequency(&self, freq: f64) -> Result<i32, TuningError> {
        if !freq.is_finite() || freq <= 0.0 {
            return Err(TuningError::InvalidFrequency(freq));
        }

        let count = self.scale.count() as i32;
        let target = freq.log2();
        let period = self.position_ratio(count)?.log2();
        let root = (self.frequency_for_scale_position(0)?).log2();
        // saturates on overflow, caught by the bounds check below
        let octave = ((target - root) / period).floor() as i64;

        let low = octave.saturating_sub(1).saturating_mul(i64::from(count));
        let high = octave.saturating_add(2).saturating_mul(i64::from(count));
        if low < i64::from(i32::MIN) {
            return Err(TuningError::ScalePositionOutOfRange(low));
        }
        if high - 1 > i64::from(i32::MAX) {
            return Err(TuningError::ScalePositionOutOfRange(high - 1));
        }

        let mut best: Option<(i32, f64)> = None;
        for position in low..high {
            let position = position as i32;
            let distance = (self.frequency_for_scale_position(position)?.log2() - target).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((position, distance));
            }
        }

        Ok(best.map_or(low as i32, |(position, _)| position))
    }

    /// Identity mapping with the reference pitch tuned and the note range as MIDI range.
    fn derived_keyboard_mapping(&self) -> Result<KeyboardMapping, TuningError> {
        let mut k = KeyboardMapping::start_scale_on_and_tune_note_to(
            60,
            self.midi_note_for_scale_position(self.reference_scale_position()?)?,
            self.reference_pitch_freq,
        );

        match self.note_range {
            Some(NoteRange::ByIndex { low, high }) => {
                let midi = |(octave, index): (i32, i32)| {
                    self.midi_note_for_scale_position(self.scale_position(octave, index)?)
                };
                k.first_midi = midi(low)?;
                if let Some(high) = high {
                    k.last_midi = midi(high)?;
                }
            }
            Some(NoteRange::ByFrequency { low, high }) => {
                let midi = |freq| -> Result<i32, TuningError> {
                    self.midi_note_for_scale_position(self.scale_position_for_frequency(freq)?)
                };
                k.first_midi = midi(low)?;
                if let Some(high) = high {
                    k.last_midi = midi(high)?;
                }
            }
            None => (),
        }

        Ok(k)
    }
}
