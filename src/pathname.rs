//! Normalized relative paths used to key operations and per-path defaults.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::types::deserialize_from_str;

/// A path made of segments, e.g. `/users/{id}`.
///
/// Leading, trailing and doubled slashes are insignificant: `users//{id}/`
/// and `/users/{id}` are the same pathname. The root has no segments and
/// displays as `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pathname {
    segments: Vec<String>,
}

impl Pathname {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the pathnames from the root down to `self`, inclusive.
    ///
    /// `/a/b` yields `/`, `/a`, `/a/b`.
    pub fn ancestors(&self) -> Vec<Pathname> {
        (0..=self.segments.len())
            .map(|n| Pathname {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// Returns true if `prefix` is `self` or one of its ancestors.
    pub fn starts_with(&self, prefix: &Pathname) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Names of the `{template}` segments, in order.
    pub fn template_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| s.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
            .collect()
    }
}

impl Add for &Pathname {
    type Output = Pathname;

    fn add(self, other: &Pathname) -> Pathname {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Pathname { segments }
    }
}

impl Add for Pathname {
    type Output = Pathname;

    fn add(mut self, other: Pathname) -> Pathname {
        self.segments.extend(other.segments);
        self
    }
}

impl From<&str> for Pathname {
    fn from(path: &str) -> Self {
        Pathname::new(path)
    }
}

impl FromStr for Pathname {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Pathname::new(s))
    }
}

impl fmt::Display for Pathname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

deserialize_from_str!(Pathname, "a path");
