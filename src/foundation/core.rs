use std::{fmt, str::FromStr};

use crate::foundation::error::{AnimatorError, AnimatorResult};

/// A single location picked on the map, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    /// Degrees east, any value; wrapped when projected.
    pub longitude: f64,
    /// Degrees north; clamped to the Mercator limit when projected.
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// Inclusive calendar-year range, `start <= end`.
///
/// Fields are private so every value, including deserialized ones, goes through
/// [`YearRange::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawYearRange", into = "RawYearRange")]
pub struct YearRange {
    start: i32,
    end: i32,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RawYearRange {
    start: i32,
    end: i32,
}

impl TryFrom<RawYearRange> for YearRange {
    type Error = AnimatorError;

    fn try_from(raw: RawYearRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl From<YearRange> for RawYearRange {
    fn from(r: YearRange) -> Self {
        Self {
            start: r.start,
            end: r.end,
        }
    }
}

impl YearRange {
    /// The preset three-year windows offered to users.
    pub const WINDOWS: [YearRange; 8] = [
        YearRange::preset(2001, 2003),
        YearRange::preset(2004, 2006),
        YearRange::preset(2007, 2009),
        YearRange::preset(2010, 2012),
        YearRange::preset(2013, 2015),
        YearRange::preset(2016, 2018),
        YearRange::preset(2019, 2021),
        YearRange::preset(2022, 2024),
    ];

    const fn preset(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn new(start: i32, end: i32) -> AnimatorResult<Self> {
        if start > end {
            return Err(AnimatorError::validation(format!(
                "year range start {start} must be <= end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// First year of the range.
    pub fn start(self) -> i32 {
        self.start
    }

    /// Last year of the range, inclusive.
    pub fn end(self) -> i32 {
        self.end
    }

    pub fn is_preset(self) -> bool {
        Self::WINDOWS.contains(&self)
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for YearRange {
    type Err = AnimatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| AnimatorError::validation(format!("expected 'YYYY-YYYY', got '{s}'")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<i32>()
                .map_err(|_| AnimatorError::validation(format!("invalid year '{v}' in '{s}'")))
        };
        Self::new(parse(a)?, parse(b)?)
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds).
    pub den: u32,
}

impl Fps {
    pub fn new(num: u32, den: u32) -> AnimatorResult<Self> {
        if den == 0 {
            return Err(AnimatorError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(AnimatorError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 24, den: 1 }
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}
