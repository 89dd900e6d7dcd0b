use std::{fs, io::Read, path::Path};

use log::{debug, trace};

use crate::{
    error::{FormatErrorKind, TuningError},
    tone::Tone,
};

/// A parsed SCL file: a description and the [tones][`Scale::tones`] above the root, the last of
/// which is the period the scale repeats at.
///
/// Scales are normally handed straight to a [`Tuning`](crate::Tuning). The
/// [`Scale::raw_text`] and [`Scale::description`] are kept for showing the scale to users.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Default, Clone, Debug, PartialEq)]
pub struct Scale {
    /// The name of the scale. Set to the file name when read from a file. Informational only.
    pub name: String,

    /// First non-comment line of the SCL file.
    pub description: String,

    /// SCL text the scale was parsed from.
    pub raw_text: String,

    /// The tones. The root `1/1` is implicit and not stored, the last tone is the period.
    pub tones: Vec<Tone>,

    /// The comment lines of the SCL file, without the leading `!`.
    pub comments: Vec<String>,
}

impl Scale {
    /// Constructs an empty scale.
    ///
    /// An empty scale has no tones. A [`Tuning`](crate::Tuning) built from it behaves like
    /// standard 12 tone equal temperament.
    pub fn new() -> Self {
        Scale {
            name: String::from("empty scale"),
            ..Default::default()
        }
    }

    /// Number of tones in the scale.
    pub fn count(&self) -> usize {
        self.tones.len()
    }

    /// Returns the cents value of scale degree `degree`, where degree 0 is the root and degree
    /// `count()` is the period.
    ///
    /// Returns a [`TuningError::DegreeOutOfRange`] for any other degree.
    pub fn degree_cents(&self, degree: i32) -> Result<f64, TuningError> {
        match degree {
            0 => Ok(0.0),
            d if d > 0 && d as usize <= self.count() => Ok(self.tones[d as usize - 1].cents()),
            d => Err(TuningError::DegreeOutOfRange {
                degree: d.into(),
                count: self.count(),
            }),
        }
    }

    /// Returns the cents value of the period, which is the last tone of the scale.
    ///
    /// Returns a [`TuningError::DegeneratePeriod`] if the scale is empty or its period is a
    /// unison.
    pub fn period_cents(&self) -> Result<f64, TuningError> {
        match self.tones.last().map(Tone::cents) {
            Some(cents) if cents != 0.0 => Ok(cents),
            _ => Err(TuningError::DegeneratePeriod),
        }
    }

    /// Reads and parses the SCL file at `fname`. The scale is named after the path.
    pub fn read_scl_file<P>(fname: P) -> Result<Self, TuningError>
    where
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(&fname)?;

        let mut res = Scale::parse_scl_data(&content)?;
        res.name = fname.as_ref().display().to_string();
        Ok(res)
    }

    /// Returns a Scale or an error from SCL data provided by `reader`.
    pub fn read_scl_stream<R: Read>(mut reader: R) -> Result<Self, TuningError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        Scale::parse_scl_data(&content)
    }

    /// Parses SCL text.
    ///
    /// The first non-comment line is the description, the second one the number of tones,
    /// followed by the tones. Anything after the value on a tone line is ignored, as is
    /// everything after the last tone.
    pub fn parse_scl_data(scl_contents: &str) -> Result<Self, TuningError> {
        enum State {
            ReadHeader,
            ReadCount,
            ReadNote(usize),
            Trailing,
        }
        let mut state = State::ReadHeader;

        let mut res = Scale::new();
        let mut comments_before_description = 0;
        let mut last_lineno = 0;

        for (lineno, line) in (1..).zip(scl_contents.split('\n').map(|x| x.trim())) {
            last_lineno = lineno;

            if let Some(comment) = line.strip_prefix('!') {
                res.comments.push(comment.trim().to_string());
                if matches!(state, State::ReadHeader) {
                    comments_before_description += 1;
                }
                continue;
            }

            if matches!(state, State::ReadNote(_)) && line.is_empty() {
                continue;
            }

            match state {
                State::ReadHeader => {
                    res.description = line.to_string();
                    state = State::ReadCount;
                }
                State::ReadCount => {
                    let count = line.parse().map_err(|_| {
                        TuningError::format(lineno, line, FormatErrorKind::NoteCount)
                    })?;

                    state = match count {
                        0 => State::Trailing,
                        count => State::ReadNote(count),
                    };
                }
                State::ReadNote(count) => {
                    let value = line.split_whitespace().next().unwrap_or(line);
                    res.tones.push(Tone::from_string(value, Some(lineno))?);

                    if res.tones.len() == count {
                        state = State::Trailing;
                    }
                }
                State::Trailing => trace!("ignoring trailing SCL line {lineno}: {line:?}"),
            }
        }

        match state {
            State::ReadHeader | State::ReadCount => {
                return Err(TuningError::format(
                    last_lineno,
                    "",
                    FormatErrorKind::MissingNoteCount,
                ));
            }
            State::ReadNote(count) => {
                return Err(TuningError::format(
                    last_lineno + 1,
                    "",
                    FormatErrorKind::MissingTones {
                        expected: count,
                        found: res.tones.len(),
                    },
                ));
            }
            State::Trailing => (),
        }

        if res.description.is_empty() {
            if let Some(comment) = res.comments[..comments_before_description]
                .iter()
                .find(|c| !c.is_empty())
            {
                res.description = comment.clone();
            }
        }

        debug!(
            "parsed SCL scale {:?} with {} tones",
            res.description,
            res.count()
        );

        res.raw_text = scl_contents.to_string();
        Ok(res)
    }

    /// Writes the scale as SCL text. Parsing the result gives back the same description and
    /// tones.
    pub fn to_scl_data(&self) -> String {
        let mut data = String::new();
        data += &format!("{}\n", self.description);
        data += &format!("{}\n", self.count());
        data += "!\n";
        data += &self
            .tones
            .iter()
            .map(|t| format!("{t}\n"))
            .collect::<String>();
        data
    }

    /// The 12 tone equal temperament scale with a `2/1` period.
    pub fn even_temperament_12_note_scale() -> Self {
        let data = "! 12 Tone Equal Temperament.scl
            !
            12 Tone Equal Temperament | ED2-12 - Equal division of harmonic 2 into 12 parts
             12
            !
             100.00000
             200.00000
             300.00000
             400.00000
             500.00000
             600.00000
             700.00000
             800.00000
             900.00000
             1000.00000
             1100.00000
             2/1";

        Scale::parse_scl_data(data).expect("standard scale text is valid")
    }

    /// Equal division of the ratio `span/1` into `m` steps, such as ED2-17 or ED3-24. The last
    /// tone is written as the exact ratio.
    ///
    /// Fails with [`TuningError::ZeroSpan`] or [`TuningError::ZeroSteps`].
    ///
    /// ```
    /// # use microtuning::Scale;
    /// let ed2_17 = Scale::even_division_of_span_by_m(2, 17).unwrap();
    /// assert_eq!(ed2_17.count(), 17);
    /// assert_eq!(ed2_17.tones[16].string_rep, "2/1");
    /// assert!(Scale::even_division_of_span_by_m(3, 0).is_err());
    /// ```
    pub fn even_division_of_span_by_m(span: u32, m: u32) -> Result<Self, TuningError> {
        if span == 0 {
            return Err(TuningError::ZeroSpan);
        }

        if m == 0 {
            return Err(TuningError::ZeroSteps);
        }

        let mut data = String::new();
        data += &format!("! Automatically generated ED{span}-{m} scale\n");
        data += &format!("Automatically generated ED{span}-{m} scale\n");
        data += &format!("{m}\n");
        data += "!\n";

        let top_cents = 1200.0 * (span as f64).log2();
        let d_cents = top_cents / m as f64;
        data += &(1..m)
            .map(|i| format!("{:.32}\n", d_cents * i as f64))
            .collect::<String>();
        data += &format!("{span}/1\n");

        Scale::parse_scl_data(&data)
    }

    /// Equal division of an interval given in `cents` into `m` steps. A non-empty `last_label`
    /// is written as the last tone instead of the cents value, e.g. `3/1` for Bohlen-Pierce.
    ///
    /// ```
    /// # use microtuning::Scale;
    /// let bohlen_pierce = Scale::even_division_of_cents_by_m(1901.955, 13, "3/1").unwrap();
    /// assert_eq!(bohlen_pierce.count(), 13);
    /// assert_eq!(bohlen_pierce.tones[12].string_rep, "3/1");
    /// ```
    pub fn even_division_of_cents_by_m(
        cents: f64,
        m: u32,
        last_label: &str,
    ) -> Result<Self, TuningError> {
        if cents.is_nan() || cents <= 0.0 {
            return Err(TuningError::NonPositiveCents);
        }

        if m == 0 {
            return Err(TuningError::ZeroSteps);
        }

        let mut data = String::new();
        data += &format!("! Automatically generated Even Division of {cents} ct into {m} scale\n");
        data += &format!("Automatically generated Even Division of {cents} ct into {m} scale\n");
        data += &format!("{m}\n");
        data += "!\n";

        let d_cents = cents / m as f64;
        data += &(1..m)
            .map(|i| format!("{:.32}\n", d_cents * i as f64))
            .collect::<String>();

        data += &match last_label {
            "" => format!("{:.32}\n", cents),
            label => format!("{label}\n"),
        };

        Scale::parse_scl_data(&data)
    }

    /// Returns the scale itself, or the standard 12 tone scale if this one is empty.
    pub(crate) fn or_standard(self) -> Scale {
        if self.tones.is_empty() {
            Scale::even_temperament_12_note_scale()
        } else {
            self
        }
    }
}
