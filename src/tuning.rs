use log::{debug, warn};

use crate::{
    ableton::{AbletonScale, NotationMapping},
    error::{FormatErrorKind, TuningError},
    keyboard_mapping::KeyboardMapping,
    scale::Scale,
    tone::Tone,
    MIDI_0_FREQ,
};

/// Whether a [`Tuning`] may be centred on a key the keyboard mapping leaves unmapped.
///
/// If allowed, the pitch of the tuning centre is interpolated from the nearest mapped keys on
/// either side of it.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowTuningOnUnmapped(pub bool);

/// Frequencies of every key for one scale and keyboard mapping.
///
/// All tables are computed when the tuning is built, queries are lookups. Keys from
/// [`Tuning::MIN_MIDI_NOTE`] to [`Tuning::MAX_MIDI_NOTE`] are covered, far beyond the MIDI range,
/// so transposed or modulated notes still have a frequency.
///
/// A Tuning never changes once built. Retuning means building a new one.
///
/// ```
/// # use microtuning::*;
/// let s = Scale::even_temperament_12_note_scale();
/// let k = KeyboardMapping::tune_a69_to(432.0);
///
/// let t1 = Tuning::from_scale(s.clone()).unwrap();
/// let t2 = Tuning::from_keyboard_mapping(k.clone()).unwrap();
/// let t3 = Tuning::from_scale_and_keyboard_mapping(s, k, AllowTuningOnUnmapped(false)).unwrap();
///
/// assert!((t3.frequency_for_midi_note(69).unwrap() - 432.0).abs() < 1e-9);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct Tuning {
    scale: Scale,
    keyboard_mapping: KeyboardMapping,
    notation_mapping: NotationMapping,
    ptable: Vec<f64>,
    lptable: Vec<f64>,
    scale_position_table: Vec<Option<u32>>,
    allow_tuning_center_on_unmapped: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the keys of a mapping land in a scale. Pitches are in octaves above the middle note.
struct KeyLayout<'a> {
    tones: &'a [Tone],
    keys: &'a [Option<u32>],
    middle_note: i64,
    period: f64,
    /// Set when the formal octave of the mapping differs from its size. Every repeat of the
    /// mapping then moves up by this many octaves instead of walking on through the scale.
    formal_period: Option<f64>,
}

impl KeyLayout<'_> {
    /// Pitch of a degree counted linearly through the repeating scale.
    fn linear_pitch(&self, degree: i64) -> f64 {
        let count = self.tones.len() as i64;
        let step = degree - 1;

        self.tones[step.rem_euclid(count) as usize].float_value() - 1.0
            + step.div_euclid(count) as f64 * self.period
    }

    fn position(&self, degree: i64) -> u32 {
        degree.rem_euclid(self.tones.len() as i64) as u32
    }

    /// Pitch and scale position of `note`, or `None` if the key is unmapped.
    fn pitch(&self, note: i64) -> Option<(f64, u32)> {
        let distance = note - self.middle_note;

        if self.keys.is_empty() {
            return Some((self.linear_pitch(distance), self.position(distance)));
        }

        let size = self.keys.len() as i64;
        let degree = i64::from(self.keys[distance.rem_euclid(size) as usize]?);
        let rotation = distance.div_euclid(size);

        match self.formal_period {
            Some(formal_period) => Some((
                self.linear_pitch(degree) + rotation as f64 * formal_period,
                self.position(degree),
            )),
            None => {
                let degree = rotation * size + degree;
                Some((self.linear_pitch(degree), self.position(degree)))
            }
        }
    }

    /// Pitch of an unmapped `note`, interpolated between the nearest mapped keys below and above
    /// it within one repeat of the mapping.
    fn interpolated_pitch(&self, note: i64) -> Option<f64> {
        let size = self.keys.len() as i64;
        let nearest = |direction: i64| {
            (1..size).find_map(|d| self.pitch(note + direction * d).map(|(p, _)| (d, p)))
        };

        let (d_low, low) = nearest(-1)?;
        let (d_high, high) = nearest(1)?;
        Some(low + (high - low) * d_low as f64 / (d_low + d_high) as f64)
    }
}

impl Tuning {
    /// Size of the precomputed tables.
    pub const N: usize = 512;

    /// Offset between a MIDI note and its index in the tables.
    pub const MIDI_NOTE_OFFSET: i32 = 256;

    /// Lowest MIDI note a Tuning knows about.
    pub const MIN_MIDI_NOTE: i32 = -Self::MIDI_NOTE_OFFSET;

    /// Highest MIDI note a Tuning knows about.
    pub const MAX_MIDI_NOTE: i32 = Self::N as i32 - Self::MIDI_NOTE_OFFSET - 1;

    /// Constructs a `Tuning` with 12-EDO scale and standard mapping.
    pub fn new() -> Self {
        Tuning::from_scale_and_keyboard_mapping(
            Scale::even_temperament_12_note_scale(),
            KeyboardMapping::new(),
            AllowTuningOnUnmapped(false),
        )
        .expect("standard tuning is always valid")
    }

    /// Tuning of `scale` with middle C on the root at its standard frequency.
    pub fn from_scale(scale: Scale) -> Result<Self, TuningError> {
        Tuning::from_scale_and_keyboard_mapping(
            scale,
            KeyboardMapping::new(),
            AllowTuningOnUnmapped(false),
        )
    }

    /// Tuning of 12-EDO through `keyboard_mapping`.
    pub fn from_keyboard_mapping(keyboard_mapping: KeyboardMapping) -> Result<Self, TuningError> {
        Tuning::from_scale_and_keyboard_mapping(
            Scale::even_temperament_12_note_scale(),
            keyboard_mapping,
            AllowTuningOnUnmapped(false),
        )
    }

    /// Constructs a `Tuning` from the scale, mapping and note names of an ASCL file.
    pub fn from_ableton_scale(ableton_scale: AbletonScale) -> Result<Self, TuningError> {
        let mut tun = Tuning::from_scale_and_keyboard_mapping(
            ableton_scale.scale,
            ableton_scale.keyboard_mapping,
            AllowTuningOnUnmapped(false),
        )?;
        tun.notation_mapping = ableton_scale.notation_mapping;
        Ok(tun)
    }

    /// Tuning of `scale` through `keyboard_mapping`.
    ///
    /// An empty scale is replaced by the standard 12 tone scale. Mappings which use degrees past
    /// the end of the scale repeat the scale as many times as needed.
    ///
    /// Fails with [`TuningError::DegeneratePeriod`] if the period of the scale is a unison, with
    /// [`TuningError::MappingLongerThanScale`] if the formal octave of the mapping is beyond the
    /// scale and with [`TuningError::TuningUnmappedKey`] if the tuned note is unmapped and
    /// `allow_tuning_center_on_unmapped` does not allow it.
    pub fn from_scale_and_keyboard_mapping(
        scale: Scale,
        keyboard_mapping: KeyboardMapping,
        allow_tuning_center_on_unmapped: AllowTuningOnUnmapped,
    ) -> Result<Self, TuningError> {
        let scale = scale.or_standard();
        let count = scale.count();
        let period = scale.period_cents()? / 1200.0;

        let frequency = keyboard_mapping.tuning_frequency;
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(TuningError::InvalidFrequency(frequency));
        }

        let rotations = keyboard_mapping
            .keys
            .iter()
            .flatten()
            .map(|&key| (key as usize).div_ceil(count))
            .max()
            .unwrap_or(1)
            .max(1);

        let mut octave_degrees = i64::from(keyboard_mapping.octave_degrees);
        if rotations > 1 {
            octave_degrees *= rotations as i64;
            if octave_degrees == 0 {
                octave_degrees = (count * rotations) as i64;
            }
        }

        if octave_degrees > (count * rotations) as i64 {
            return Err(TuningError::MappingLongerThanScale {
                octave_degrees: keyboard_mapping.octave_degrees,
                count,
            });
        }

        let map_size = keyboard_mapping.count() as i64;
        let layout = KeyLayout {
            tones: &scale.tones,
            keys: &keyboard_mapping.keys,
            middle_note: keyboard_mapping.middle_note.into(),
            period,
            formal_period: (map_size > 0 && octave_degrees > 0 && octave_degrees != map_size)
                .then_some(period * rotations as f64),
        };

        let tuning_note = keyboard_mapping.tuning_constant_note;
        let anchor_pitch = match layout.pitch(tuning_note.into()) {
            Some((pitch, _)) => pitch,
            None if allow_tuning_center_on_unmapped.0 => {
                warn!("tuning centre {tuning_note} is unmapped, interpolating its pitch");
                layout
                    .interpolated_pitch(tuning_note.into())
                    .ok_or(TuningError::TuningUnmappedKey(tuning_note))?
            }
            None => return Err(TuningError::TuningUnmappedKey(tuning_note)),
        };

        let log_tuning_pitch = keyboard_mapping.tuning_pitch().log2();

        let mut ptable = Vec::with_capacity(Self::N);
        let mut lptable = Vec::with_capacity(Self::N);
        let mut scale_position_table = Vec::with_capacity(Self::N);

        for note in Self::MIN_MIDI_NOTE..=Self::MAX_MIDI_NOTE {
            let (log_pitch, position) = match layout.pitch(note.into()) {
                Some((pitch, position)) => {
                    (pitch - anchor_pitch + log_tuning_pitch, Some(position))
                }
                None if note == tuning_note => (log_tuning_pitch, None),
                // Historical value for unmapped keys: an octave below the tuned note.
                None => (log_tuning_pitch - 1.0, None),
            };

            lptable.push(log_pitch);
            ptable.push(2f64.powf(log_pitch));
            scale_position_table.push(position);
        }

        debug!(
            "built tuning of {:?} ({} tones) with {} keys, note {} at {} Hz",
            scale.description,
            count,
            keyboard_mapping.count(),
            tuning_note,
            frequency
        );

        Ok(Tuning {
            scale,
            keyboard_mapping,
            notation_mapping: NotationMapping::default(),
            ptable,
            lptable,
            scale_position_table,
            allow_tuning_center_on_unmapped: allow_tuning_center_on_unmapped.0,
        })
    }

    /// Returns a new `Tuning` in which every unmapped note is interpolated in log frequency
    /// between the nearest mapped notes around it.
    ///
    /// Unmapped notes at the edge of the table with no mapped note on one side keep their value.
    /// Scale positions are unchanged, so the notes are still reported as unmapped.
    pub fn with_skipped_notes_interpolated(&self) -> Self {
        let mut res = self.clone();
        let mapped = |i: &usize| self.scale_position_table[*i].is_some();

        for i in 0..Self::N {
            if mapped(&i) {
                continue;
            }

            let prv = (0..i).rev().find(mapped);
            let nxt = (i + 1..Self::N).find(mapped);
            let (Some(prv), Some(nxt)) = (prv, nxt) else {
                continue;
            };

            let frac = (i - prv) as f64 / (nxt - prv) as f64;
            res.lptable[i] = (1.0 - frac) * self.lptable[prv] + frac * self.lptable[nxt];
            res.ptable[i] = 2f64.powf(res.lptable[i]);
        }

        res
    }

    fn table_index(midi_note: i32) -> Result<usize, TuningError> {
        if (Self::MIN_MIDI_NOTE..=Self::MAX_MIDI_NOTE).contains(&midi_note) {
            Ok((midi_note + Self::MIDI_NOTE_OFFSET) as usize)
        } else {
            Err(TuningError::NoteOutOfRange(midi_note))
        }
    }

    /// Scale the tables are built from. An empty scale given at construction is reported here
    /// as the standard 12 tone scale.
    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    /// Keyboard mapping the tables are built from.
    pub fn keyboard_mapping(&self) -> &KeyboardMapping {
        &self.keyboard_mapping
    }

    /// Note names of the tuning. Empty unless built from an ASCL file.
    pub fn notation_mapping(&self) -> &NotationMapping {
        &self.notation_mapping
    }

    /// Whether the tuning was allowed to be centred on an unmapped key.
    pub fn allows_tuning_center_on_unmapped(&self) -> bool {
        self.allow_tuning_center_on_unmapped
    }

    /// Returns the frequency in Hz for a given MIDI note.
    /// ```
    /// # use microtuning::*;
    /// let t = Tuning::new();
    /// assert!((t.frequency_for_midi_note(69).unwrap() - 440.0).abs() < 1e-4); // A
    /// assert!((t.frequency_for_midi_note(60).unwrap() - 261.6256).abs() < 1e-4); // middle C
    /// assert!(t.frequency_for_midi_note(256).is_err());
    /// ```
    pub fn frequency_for_midi_note(&self, midi_note: i32) -> Result<f64, TuningError> {
        Ok(self.ptable[Self::table_index(midi_note)?] * MIDI_0_FREQ)
    }

    /// Returns the frequency divided by [`MIDI_0_FREQ`](crate::MIDI_0_FREQ).
    /// ```
    /// # use microtuning::*;
    /// let t = Tuning::new();
    /// assert_eq!(t.frequency_for_midi_note_scaled_by_midi0(0).unwrap(), 1.0);
    /// assert_eq!(t.frequency_for_midi_note_scaled_by_midi0(60).unwrap(), 32.0);
    /// ```
    pub fn frequency_for_midi_note_scaled_by_midi0(
        &self,
        midi_note: i32,
    ) -> Result<f64, TuningError> {
        Ok(self.ptable[Self::table_index(midi_note)?])
    }

    /// Returns `log2` of [`Tuning::frequency_for_midi_note_scaled_by_midi0`].
    /// ```
    /// # use microtuning::*;
    /// let t = Tuning::new();
    /// assert_eq!(t.log_scaled_frequency_for_midi_note(0).unwrap(), 0.0);
    /// assert_eq!(t.log_scaled_frequency_for_midi_note(60).unwrap(), 5.0);
    /// ```
    /// One unit is one octave.
    pub fn log_scaled_frequency_for_midi_note(&self, midi_note: i32) -> Result<f64, TuningError> {
        Ok(self.lptable[Self::table_index(midi_note)?])
    }

    /// Returns how far the note is from standard 12 tone equal temperament at A440, in cents.
    ///
    /// ```
    /// # use microtuning::*;
    /// let t = Tuning::from_keyboard_mapping(KeyboardMapping::tune_a69_to(432.0)).unwrap();
    /// let cents = t.retuning_from_equal_in_cents_for_midi_note(69).unwrap();
    /// assert!((cents - 1200.0 * (432.0f64 / 440.0).log2()).abs() < 1e-6);
    /// ```
    pub fn retuning_from_equal_in_cents_for_midi_note(
        &self,
        midi_note: i32,
    ) -> Result<f64, TuningError> {
        let standard = f64::from(midi_note) / 12.0;
        Ok(1200.0 * (self.log_scaled_frequency_for_midi_note(midi_note)? - standard))
    }

    /// Same as [`Tuning::retuning_from_equal_in_cents_for_midi_note`], in semitones.
    pub fn retuning_from_equal_in_semitones_for_midi_note(
        &self,
        midi_note: i32,
    ) -> Result<f64, TuningError> {
        Ok(self.retuning_from_equal_in_cents_for_midi_note(midi_note)? / 100.0)
    }

    /// Returns the scale degree a note plays, from 0 (the root) to `count - 1`. Degree `d > 0` is
    /// `scale().tones[d - 1]`, as the root is not stored.
    ///
    /// Unmapped notes have no position.
    pub fn scale_position_for_midi_note(
        &self,
        midi_note: i32,
    ) -> Result<Option<u32>, TuningError> {
        Ok(self.scale_position_table[Self::table_index(midi_note)?])
    }

    /// Returns whether the keyboard mapping gives `midi_note` a scale degree.
    pub fn is_midi_note_mapped(&self, midi_note: i32) -> Result<bool, TuningError> {
        Ok(self.scale_position_for_midi_note(midi_note)?.is_some())
    }

    /// Returns the MIDI note of a note name in a given octave, with C4 being MIDI note 60.
    ///
    /// The name is a letter from A to G followed by any number of sharps (`#`, `♯`) and flats
    /// (`b`, `♭`). This depends only on the layout of the keyboard, not on the tuning.
    ///
    /// ```
    /// # use microtuning::*;
    /// assert_eq!(Tuning::midi_note_for_note_name("C", 4).unwrap(), 60);
    /// assert_eq!(Tuning::midi_note_for_note_name("a", 4).unwrap(), 69);
    /// assert_eq!(Tuning::midi_note_for_note_name("Bb", 3).unwrap(), 58);
    /// assert_eq!(Tuning::midi_note_for_note_name("C#", -1).unwrap(), 1);
    /// assert!(Tuning::midi_note_for_note_name("H", 4).is_err());
    /// ```
    pub fn midi_note_for_note_name(name: &str, octave: i32) -> Result<i32, TuningError> {
        let name_error = || TuningError::format(0, name, FormatErrorKind::NoteName);

        let mut chars = name.trim().chars();
        let pitch_class = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(name_error()),
        };

        let alteration = chars.try_fold(0i64, |acc, c| match c {
            '#' | '♯' => Ok(acc + 1),
            'b' | '♭' => Ok(acc - 1),
            _ => Err(name_error()),
        })?;

        let note = (i64::from(octave) + 1) * 12 + pitch_class + alteration;
        let note = note.clamp(i32::MIN.into(), i32::MAX.into()) as i32;
        Self::table_index(note)?;
        Ok(note)
    }
}
