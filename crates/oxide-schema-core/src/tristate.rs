//! Three-valued boolean used by tri-state columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A boolean that may also be unknown.
///
/// Stored as `1`, `0` or `NULL`. The textual forms `true`/`1`,
/// `false`/`0` and `none`/`2` are recognized when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriState {
    /// Known true.
    True,
    /// Known false.
    False,
    /// Unknown.
    #[default]
    None,
}

impl TriState {
    /// Returns the contained boolean, if known.
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            Self::None => None,
        }
    }

    /// Returns `true` for `TriState::None`.
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<bool> for TriState {
    fn from(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(b: Option<bool>) -> Self {
        b.map_or(Self::None, Self::from)
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Error returned when text is not a tri-state literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not a tri-state value")]
pub struct ParseTriStateError(pub String);

impl FromStr for TriState {
    type Err = ParseTriStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Self::True),
            "false" | "0" => Ok(Self::False),
            "none" | "2" | "" | "null" => Ok(Self::None),
            other => other
                .parse::<i64>()
                .map(|n| Self::from(n != 0))
                .map_err(|_| ParseTriStateError(s.to_string())),
        }
    }
}

impl Serialize for TriState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_bool().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TriState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literals() {
        assert_eq!("true".parse::<TriState>(), Ok(TriState::True));
        assert_eq!("FALSE".parse::<TriState>(), Ok(TriState::False));
        assert_eq!("none".parse::<TriState>(), Ok(TriState::None));
        assert_eq!("2".parse::<TriState>(), Ok(TriState::None));
        assert_eq!("1".parse::<TriState>(), Ok(TriState::True));
        assert_eq!("0".parse::<TriState>(), Ok(TriState::False));
        assert_eq!("7".parse::<TriState>(), Ok(TriState::True));
        assert!("maybe".parse::<TriState>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for t in [TriState::True, TriState::False, TriState::None] {
            assert_eq!(t.to_string().parse::<TriState>(), Ok(t));
        }
    }

    #[test]
    fn serde_uses_optional_bool() {
        assert_eq!(serde_json::to_string(&TriState::None).unwrap(), "null");
        assert_eq!(serde_json::to_string(&TriState::True).unwrap(), "true");
        let t: TriState = serde_json::from_str("false").unwrap();
        assert_eq!(t, TriState::False);
    }
}
