//! Module versions and version ranges.
//!
//! A [`Version`] is `major.minor.micro[.qualifier]`. Ordering compares the
//! three numbers, then the qualifier ordinally. A [`VersionRange`] is a
//! floor/ceiling interval with inclusive or exclusive endpoints:
//! `[a,b]`, `[a,b)`, `(a,b]`, `(a,b)`, or a bare `a` meaning `[a,∞)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced while parsing a version or a version range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version text")]
    Empty,

    #[error("invalid version '{text}': segment '{segment}' is not numeric")]
    NonNumeric { text: String, segment: String },

    #[error("invalid version range '{text}': {reason}")]
    MalformedRange { text: String, reason: &'static str },

    #[error("invalid version range '{text}': floor is above ceiling")]
    FloorAboveCeiling { text: String },
}

impl VersionError {
    /// Stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty | Self::NonNumeric { .. } => "VERSION_INVALID",
            Self::MalformedRange { .. } | Self::FloorAboveCeiling { .. } => "VERSION_RANGE_INVALID",
        }
    }
}

/// A module or capability version.
///
/// Field order matters: the derived ordering is lexicographic over
/// `(major, minor, micro, qualifier)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

impl Version {
    /// The lowest version, `0.0.0`.
    pub const ZERO: Self = Self {
        major: 0,
        minor: 0,
        micro: 0,
        qualifier: String::new(),
    };

    /// Create a version without a qualifier.
    #[must_use]
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Attach a qualifier.
    #[must_use]
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    /// Parse `major[.minor[.micro[.qualifier]]]`.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        // The qualifier may itself contain dots, so split at most four ways.
        let mut parts = trimmed.splitn(4, '.');
        let mut numbers = [0u64; 3];
        for slot in &mut numbers {
            match parts.next() {
                Some(segment) => {
                    *slot = parse_segment(trimmed, segment)?;
                }
                None => break,
            }
        }

        let qualifier = match parts.next() {
            Some("") => {
                return Err(VersionError::NonNumeric {
                    text: trimmed.to_string(),
                    segment: String::new(),
                })
            }
            Some(q) => q.to_string(),
            None => String::new(),
        };

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            micro: numbers[2],
            qualifier,
        })
    }
}

fn parse_segment(text: &str, segment: &str) -> Result<u64, VersionError> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::NonNumeric {
            text: text.to_string(),
            segment: segment.to_string(),
        });
    }
    segment.parse().map_err(|_| VersionError::NonNumeric {
        text: text.to_string(),
        segment: segment.to_string(),
    })
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

/// One end of a [`VersionRange`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

/// A version interval. `ceiling == None` means unbounded above.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    floor: Bound,
    ceiling: Option<Bound>,
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl VersionRange {
    /// `[0.0.0,∞)`, matching every version.
    #[must_use]
    pub fn any() -> Self {
        Self::at_least(Version::ZERO)
    }

    /// `[floor,∞)`.
    #[must_use]
    pub fn at_least(floor: Version) -> Self {
        Self {
            floor: Bound {
                version: floor,
                inclusive: true,
            },
            ceiling: None,
        }
    }

    /// `[v,v]`, matching exactly one version.
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self {
            floor: Bound {
                version: version.clone(),
                inclusive: true,
            },
            ceiling: Some(Bound {
                version,
                inclusive: true,
            }),
        }
    }

    #[must_use]
    pub fn floor(&self) -> &Bound {
        &self.floor
    }

    #[must_use]
    pub fn ceiling(&self) -> Option<&Bound> {
        self.ceiling.as_ref()
    }

    /// Parse an interval or a bare floor version.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }

        let first = text.as_bytes()[0];
        if first != b'[' && first != b'(' {
            return Ok(Self::at_least(Version::parse(text)?));
        }

        let malformed = |reason| VersionError::MalformedRange {
            text: text.to_string(),
            reason,
        };

        let last = *text.as_bytes().last().unwrap_or(&b' ');
        if last != b']' && last != b')' {
            return Err(malformed("missing closing bracket"));
        }

        let inner = &text[1..text.len() - 1];
        let (low, high) = inner
            .split_once(',')
            .ok_or_else(|| malformed("expected 'floor,ceiling'"))?;
        if high.contains(',') {
            return Err(malformed("too many endpoints"));
        }

        let floor = Bound {
            version: Version::parse(low)?,
            inclusive: first == b'[',
        };
        let ceiling = Bound {
            version: Version::parse(high)?,
            inclusive: last == b']',
        };

        if floor.version > ceiling.version {
            return Err(VersionError::FloorAboveCeiling {
                text: text.to_string(),
            });
        }

        Ok(Self {
            floor,
            ceiling: Some(ceiling),
        })
    }

    /// Whether `version` lies inside the interval.
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        let above_floor = if self.floor.inclusive {
            *version >= self.floor.version
        } else {
            *version > self.floor.version
        };
        if !above_floor {
            return false;
        }

        match &self.ceiling {
            None => true,
            Some(c) if c.inclusive => *version <= c.version,
            Some(c) => *version < c.version,
        }
    }

    /// Whether this is the unbounded `[0.0.0,∞)` range.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.ceiling.is_none() && self.floor.inclusive && self.floor.version == Version::ZERO
    }

    fn render(floor: &Bound, ceiling: Option<&Bound>) -> String {
        match ceiling {
            None if floor.inclusive => floor.version.to_string(),
            None => format!("({},∞)", floor.version),
            Some(c) => format!(
                "{}{},{}{}",
                if floor.inclusive { '[' } else { '(' },
                floor.version,
                c.version,
                if c.inclusive { ']' } else { ')' }
            ),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::render(&self.floor, self.ceiling.as_ref()))
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_short_forms() {
        assert_eq!(v("1"), Version::new(1, 0, 0));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("1.2.3.beta.1").qualifier, "beta.1");
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let err = Version::parse("1.x.0").unwrap_err();
        assert!(matches!(err, VersionError::NonNumeric { .. }));
        assert_eq!(err.code(), "VERSION_INVALID");
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1..2").is_err());
    }

    #[test]
    fn test_ordering_numbers_then_qualifier() {
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0.0") > v("1.99.99"));
        // Qualifiers compare ordinally; an empty qualifier sorts first.
        assert!(v("1.0.0") < v("1.0.0.a"));
        assert!(v("1.0.0.B") < v("1.0.0.a"));
    }

    #[test]
    fn test_display_roundtrips_qualifier() {
        assert_eq!(v("1.2").to_string(), "1.2.0");
        assert_eq!(v("1.2.3.rc1").to_string(), "1.2.3.rc1");
    }

    #[test]
    fn test_range_interval_kinds() {
        let closed = VersionRange::parse("[1.0,2.0]").unwrap();
        assert!(closed.contains(&v("1.0")));
        assert!(closed.contains(&v("2.0")));

        let half_open = VersionRange::parse("[1.0,2.0)").unwrap();
        assert!(half_open.contains(&v("1.0")));
        assert!(half_open.contains(&v("1.99.99")));
        assert!(!half_open.contains(&v("2.0")));

        let left_open = VersionRange::parse("(1.0,2.0]").unwrap();
        assert!(!left_open.contains(&v("1.0")));
        assert!(left_open.contains(&v("1.0.0.q")));
        assert!(left_open.contains(&v("2.0")));

        let open = VersionRange::parse("(1.0,2.0)").unwrap();
        assert!(!open.contains(&v("1.0")));
        assert!(!open.contains(&v("2.0")));
        assert!(open.contains(&v("1.5")));
    }

    #[test]
    fn test_range_bare_floor_is_unbounded() {
        let range = VersionRange::parse("1.5").unwrap();
        assert!(!range.contains(&v("1.4.9")));
        assert!(range.contains(&v("1.5")));
        assert!(range.contains(&v("999.0")));
    }

    #[test]
    fn test_range_errors() {
        assert!(matches!(
            VersionRange::parse("[2.0,1.0]"),
            Err(VersionError::FloorAboveCeiling { .. })
        ));
        assert!(matches!(
            VersionRange::parse("[1.0;2.0]"),
            Err(VersionError::MalformedRange { .. })
        ));
        assert!(matches!(
            VersionRange::parse("[1.0,2.0"),
            Err(VersionError::MalformedRange { .. })
        ));
        assert!(matches!(
            VersionRange::parse("[1.a,2.0]"),
            Err(VersionError::NonNumeric { .. })
        ));
    }

    #[test]
    fn test_default_range_matches_everything() {
        let any = VersionRange::default();
        assert!(any.is_any());
        assert!(any.contains(&Version::ZERO));
        assert!(any.contains(&v("42.1.0.x")));
    }

    #[test]
    fn test_serde_uses_text_form() {
        let range: VersionRange = serde_json::from_str("\"[1.0,2.0)\"").unwrap();
        assert_eq!(range.to_string(), "[1.0.0,2.0.0)");
        let json = serde_json::to_string(&v("3.1")).unwrap();
        assert_eq!(json, "\"3.1.0\"");
        assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
    }
}
