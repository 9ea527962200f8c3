//! Response status keys.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::types::deserialize_from_str;

/// Key of a response: an exact code, a class of codes such as `4XX`, or `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Code(u16),
    /// The hundreds digit, e.g. `4` for `4XX`.
    Range(u8),
    Default,
}

impl Status {
    /// Returns true if this key applies to the response code `code`.
    pub fn matches(self, code: u16) -> bool {
        match self {
            Status::Code(c) => c == code,
            Status::Range(r) => u16::from(r) == code / 100,
            Status::Default => true,
        }
    }

    /// Lookup rank: exact codes first, then ranges, then `default`.
    pub(crate) fn rank(self) -> u8 {
        match self {
            Status::Code(_) => 0,
            Status::Range(_) => 1,
            Status::Default => 2,
        }
    }

    /// Selects the best key of `keys` for `code`.
    pub fn select<'a, I>(keys: I, code: u16) -> Option<Status>
    where
        I: IntoIterator<Item = &'a Status>,
    {
        keys.into_iter()
            .copied()
            .filter(|status| status.matches(code))
            .min_by_key(|status| status.rank())
    }
}

impl FromStr for Status {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("default") {
            return Ok(Status::Default);
        }
        let invalid = || ConfigError::InvalidValue {
            attribute: "status".to_string(),
            value: s.to_string(),
            expected: "a status code, a range such as 4XX, or default".to_string(),
        };
        let bytes = s.as_bytes();
        if bytes.len() == 3 && bytes[1..].iter().all(|b| b.eq_ignore_ascii_case(&b'x')) {
            return match bytes[0] {
                d @ b'1'..=b'5' => Ok(Status::Range(d - b'0')),
                _ => Err(invalid()),
            };
        }
        match s.parse::<u16>() {
            Ok(code) if (100..=599).contains(&code) => Ok(Status::Code(code)),
            _ => Err(invalid()),
        }
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        Status::Code(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Code(code) => write!(f, "{}", code),
            Status::Range(r) => write!(f, "{}XX", r),
            Status::Default => f.write_str("default"),
        }
    }
}

deserialize_from_str!(Status, "a status code, a range such as 4XX, or default");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        assert_eq!("200".parse::<Status>().unwrap(), Status::Code(200));
        assert_eq!("4xx".parse::<Status>().unwrap(), Status::Range(4));
        assert_eq!("4XX".parse::<Status>().unwrap().to_string(), "4XX");
        assert_eq!("default".parse::<Status>().unwrap(), Status::Default);
        assert!("600".parse::<Status>().is_err());
        assert!("9xx".parse::<Status>().is_err());
        assert!("ok".parse::<Status>().is_err());
    }

    #[test]
    fn select_prefers_exact_then_range_then_default() {
        let keys = [Status::Default, Status::Range(4), Status::Code(404)];
        assert_eq!(Status::select(&keys, 404), Some(Status::Code(404)));
        assert_eq!(Status::select(&keys, 400), Some(Status::Range(4)));
        assert_eq!(Status::select(&keys, 500), Some(Status::Default));
        assert_eq!(Status::select(&keys[1..], 500), None);
    }
}
