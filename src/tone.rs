//! A single degree of an SCL scale.

use std::fmt::Display;

use crate::error::{FormatErrorKind, TuningError};

/// Interval of a scale degree above the root, in cents or as an exact ratio.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ToneValue {
    /// Cents above the root. Written with a `.` in SCL files.
    /// ```
    /// # use microtuning::*;
    /// let octave = ToneValue::Cents(1200.0);
    /// let tempered_fifth = ToneValue::Cents(700.0);
    /// ```
    Cents(f64),

    /// Frequency ratio `numerator / denominator` to the root.
    /// ```
    /// # use microtuning::*;
    /// let octave = ToneValue::Ratio(2, 1);
    /// let just_fifth = ToneValue::Ratio(3, 2);
    /// ```
    Ratio(i64, i64),
}

impl ToneValue {
    fn cents(&self) -> f64 {
        match self {
            Self::Cents(value) => *value,
            Self::Ratio(n, d) => 1200.0 * (*n as f64 / *d as f64).log2(),
        }
    }

    fn float_value(&self) -> f64 {
        self.cents() / 1200.0 + 1.0
    }

    fn pitch_ratio(&self) -> f64 {
        match self {
            Self::Cents(value) => 2f64.powf(value / 1200.0),
            Self::Ratio(n, d) => *n as f64 / *d as f64,
        }
    }
}

impl Default for ToneValue {
    fn default() -> Self {
        ToneValue::Ratio(1, 1)
    }
}

impl Eq for ToneValue {}

impl PartialOrd for ToneValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ToneValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cents().total_cmp(&other.cents())
    }
}

impl Display for ToneValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToneValue::Cents(value) => write!(f, "{value}c"),
            ToneValue::Ratio(n, d) => write!(f, "{n}/{d}"),
        }
    }
}

/// One line of the tone list of an SCL file, together with where it came from.
///
/// Tones are usually only looked at through a [`Scale`](crate::Scale).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tone {
    /// Value of the tone.
    pub value: ToneValue,

    /// Text the tone was parsed from, `1/1` for the default tone.
    pub string_rep: String,

    /// 1-based line of the SCL text the tone was read from.
    pub lineno: Option<usize>,
}

impl Tone {
    /// The unison `1/1`.
    pub fn new() -> Self {
        Tone::default()
    }

    /// Interval above the root in cents.
    pub fn cents(&self) -> f64 {
        self.value.cents()
    }

    /// Interval above the root in octaves, plus one. Equal to `cents() / 1200 + 1`.
    ///
    /// The tuning tables are computed from it.
    pub fn float_value(&self) -> f64 {
        self.value.float_value()
    }

    /// Returns the frequency ratio of the tone to the root, `2^(cents / 1200)`. Exact for
    /// ratios.
    pub fn pitch_ratio(&self) -> f64 {
        self.value.pitch_ratio()
    }

    /// Parses a tone from the value part of an SCL line.
    ///
    /// Text containing a `.` is a cents value. Anything else is a ratio `n/d`, where a bare
    /// integer `n` means `n/1`.
    ///
    /// Returns a [`TuningError::Format`] if `line` is not a valid tone representation or is a
    /// ratio with a term that is not positive.
    ///
    /// ```
    /// # use microtuning::*;
    /// let fifth = Tone::from_string("3/2", None).unwrap();
    /// assert_eq!(fifth.value, ToneValue::Ratio(3, 2));
    /// assert_eq!(fifth.pitch_ratio(), 1.5);
    ///
    /// let tempered = Tone::from_string("700.0", None).unwrap();
    /// assert_eq!(tempered.cents(), 700.0);
    /// assert!((tempered.pitch_ratio() - 1.4983).abs() < 1e-4);
    /// ```
    pub fn from_string(line: &str, lineno: Option<usize>) -> Result<Self, TuningError> {
        let line_number = lineno.unwrap_or_default();
        let error = |kind| TuningError::format(line_number, line, kind);

        let text = line.trim();
        let value = if text.contains('.') {
            ToneValue::Cents(text.parse().map_err(|_| error(FormatErrorKind::Cents))?)
        } else {
            let parts: Vec<&str> = text.split('/').map(str::trim).collect();
            let (n, d) = match parts[..] {
                [n] => (n, "1"),
                [n, d] => (n, d),
                _ => return Err(error(FormatErrorKind::Fraction)),
            };

            let n: i64 = n.parse().map_err(|_| error(FormatErrorKind::Numerator))?;
            let d: i64 = d.parse().map_err(|_| error(FormatErrorKind::Denominator))?;
            if n <= 0 || d <= 0 {
                return Err(error(FormatErrorKind::NonPositiveRatio));
            }

            ToneValue::Ratio(n, d)
        };

        Ok(Tone {
            value,
            string_rep: line.to_string(),
            lineno,
        })
    }
}

impl Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.string_rep)
    }
}

impl Default for Tone {
    fn default() -> Self {
        Tone {
            value: ToneValue::default(),
            string_rep: String::from("1/1"),
            lineno: None,
        }
    }
}
