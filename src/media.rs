//! Media types, media ranges and content negotiation.
//!
//! A [`MediaType`] is a concrete `type/subtype` pair. A [`MediaRange`] may
//! additionally contain wildcards (`text/*`, `*/*`) and is what clients send
//! in an `Accept` header. Both compare case-insensitively.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::types::deserialize_from_str;

const WILDCARD: &str = "*";

/// A concrete media type such as `application/json`.
#[derive(Debug, Clone, Eq)]
pub struct MediaType {
    type_: String,
    subtype: String,
}

impl MediaType {
    pub const APPLICATION_JSON: &'static str = "application/json";

    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
        }
    }

    pub fn json() -> Self {
        Self::new("application", "json")
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// True for `application/json`, `text/json` and any `+json` structured syntax.
    pub fn is_json(&self) -> bool {
        self.subtype == "json" || self.subtype.ends_with("+json")
    }

    /// True for `application/json-seq` (RFC 7464).
    pub fn is_json_seq(&self) -> bool {
        self.type_ == "application" && self.subtype == "json-seq"
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.type_.eq_ignore_ascii_case(&other.type_)
            && self.subtype.eq_ignore_ascii_case(&other.subtype)
    }
}

impl Hash for MediaType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_.to_ascii_lowercase().hash(state);
        self.subtype.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}

impl FromStr for MediaType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_, subtype) = split_media(s)?;
        if type_ == WILDCARD || subtype == WILDCARD {
            return Err(invalid_media(s));
        }
        Ok(Self::new(type_, subtype))
    }
}

/// A media range such as `text/*`. Wildcards are allowed in either slot.
#[derive(Debug, Clone, Eq)]
pub struct MediaRange {
    type_: String,
    subtype: String,
}

impl MediaRange {
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
        }
    }

    /// The range `*/*`.
    pub fn any() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Specificity rank: 1 = exact, 2 = subtype wildcard,
    /// 3 = type wildcard, 4 = both wildcard. Lower is more specific.
    pub fn priority(&self) -> u8 {
        match (self.type_ == WILDCARD, self.subtype == WILDCARD) {
            (false, false) => 1,
            (false, true) => 2,
            (true, false) => 3,
            (true, true) => 4,
        }
    }

    /// Returns true if every media type matched by `other` is matched by `self`.
    pub fn covers(&self, other: &MediaRange) -> bool {
        slot_covers(&self.type_, &other.type_) && slot_covers(&self.subtype, &other.subtype)
    }

    /// Returns true if `media_type` falls into this range.
    pub fn matches(&self, media_type: &MediaType) -> bool {
        slot_matches(&self.type_, &media_type.type_)
            && slot_matches(&self.subtype, &media_type.subtype)
    }

    /// Removes every range already covered by another range of `ranges`
    /// and returns the rest ordered by priority, then lexicographically.
    ///
    /// The result doesn't depend on the order of `ranges`.
    pub fn reduce<'a, I>(ranges: I) -> Vec<MediaRange>
    where
        I: IntoIterator<Item = &'a MediaRange>,
    {
        let mut result: Vec<MediaRange> = Vec::new();
        for range in ranges {
            if result.iter().any(|kept| kept.covers(range)) {
                continue;
            }
            result.retain(|kept| !range.covers(kept));
            result.push(range.clone());
        }
        result.sort();
        result
    }

    /// Parses an `Accept` header into ranges in the client's order of
    /// preference: descending `q`, ties keep header order. Ranges with
    /// `q=0` and unparsable entries are dropped.
    pub fn parse_accept(header: &str) -> Vec<MediaRange> {
        let mut weighted: Vec<(u16, MediaRange)> = header
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.split(';');
                let range = parts.next()?.trim().parse::<MediaRange>().ok()?;
                let q = parts
                    .filter_map(|p| {
                        let (k, v) = p.split_once('=')?;
                        (k.trim().eq_ignore_ascii_case("q")).then(|| v.trim().to_string())
                    })
                    .next()
                    .and_then(|v| v.parse::<f32>().ok())
                    .unwrap_or(1.0);
                let q = (q.clamp(0.0, 1.0) * 1000.0).round() as u16;
                (q > 0).then_some((q, range))
            })
            .collect();
        weighted.sort_by(|a, b| b.0.cmp(&a.0));
        weighted.into_iter().map(|(_, range)| range).collect()
    }
}

fn slot_covers(own: &str, other: &str) -> bool {
    own == WILDCARD || own.eq_ignore_ascii_case(other)
}

fn slot_matches(own: &str, other: &str) -> bool {
    own == WILDCARD || other == WILDCARD || own.eq_ignore_ascii_case(other)
}

impl From<MediaType> for MediaRange {
    fn from(media_type: MediaType) -> Self {
        MediaRange {
            type_: media_type.type_,
            subtype: media_type.subtype,
        }
    }
}

impl PartialEq for MediaRange {
    fn eq(&self, other: &Self) -> bool {
        self.type_.eq_ignore_ascii_case(&other.type_)
            && self.subtype.eq_ignore_ascii_case(&other.subtype)
    }
}

impl Hash for MediaRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_.to_ascii_lowercase().hash(state);
        self.subtype.to_ascii_lowercase().hash(state);
    }
}

impl Ord for MediaRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl PartialOrd for MediaRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MediaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}

impl FromStr for MediaRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_, subtype) = split_media(s)?;
        Ok(Self::new(type_, subtype))
    }
}

fn split_media(s: &str) -> Result<(&str, &str), ConfigError> {
    let essence = s.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((t, st)) if !t.is_empty() && !st.is_empty() && !st.contains('/') => Ok((t, st)),
        _ => Err(invalid_media(s)),
    }
}

fn invalid_media(s: &str) -> ConfigError {
    ConfigError::InvalidValue {
        attribute: "media type".to_string(),
        value: s.to_string(),
        expected: "type/subtype".to_string(),
    }
}

deserialize_from_str!(MediaType, "a media type");
deserialize_from_str!(MediaRange, "a media range");

/// Selects the entry to respond with.
///
/// Only the first of `accepted` is considered; callers pass ranges in the
/// client's order of preference. Among the keys covered by that range the
/// one with the lowest priority wins, ties go to the entry registered first.
/// An empty `accepted` list selects the first entry.
///
/// Returns `None` if no representation is acceptable.
pub fn negotiate<'a, K, V, I>(entries: I, accepted: &[MediaRange]) -> Option<(&'a K, &'a V)>
where
    K: AsMediaRange + 'a,
    V: 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    let mut entries = entries.into_iter();
    let Some(first) = accepted.first() else {
        return entries.next();
    };

    let selected = entries
        .filter(|(key, _)| first.covers_or_matches(&key.as_media_range()))
        .min_by_key(|(key, _)| key.as_media_range().priority());

    match &selected {
        Some((key, _)) => tracing::debug!(
            accept = %first,
            selected = %key.as_media_range(),
            "negotiated content"
        ),
        None => tracing::debug!(accept = %first, "no acceptable representation"),
    }
    selected
}

/// Keys usable in [`negotiate`].
pub trait AsMediaRange {
    fn as_media_range(&self) -> MediaRange;
}

impl AsMediaRange for MediaType {
    fn as_media_range(&self) -> MediaRange {
        MediaRange::from(self.clone())
    }
}

impl AsMediaRange for MediaRange {
    fn as_media_range(&self) -> MediaRange {
        self.clone()
    }
}

impl MediaRange {
    /// Used by negotiation: an Accept range selects a key if it covers the
    /// key, or if the key is itself a range that matches the Accept range.
    fn covers_or_matches(&self, key: &MediaRange) -> bool {
        self.covers(key) || key.covers(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(list: &[&str]) -> Vec<MediaRange> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn strings(list: &[MediaRange]) -> Vec<String> {
        list.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn equality_is_case_insensitive() {
        let a: MediaType = "Application/JSON".parse().unwrap();
        assert_eq!(a, MediaType::json());
        let r: MediaRange = "TEXT/*".parse().unwrap();
        assert_eq!(r, MediaRange::new("text", "*"));
    }

    #[test]
    fn parameters_are_ignored() {
        let a: MediaType = "text/plain; charset=utf-8".parse().unwrap();
        assert_eq!(a.to_string(), "text/plain");
    }

    #[test]
    fn media_type_rejects_wildcards_and_garbage() {
        assert!("text/*".parse::<MediaType>().is_err());
        assert!("json".parse::<MediaType>().is_err());
        assert!("a/b/c".parse::<MediaRange>().is_err());
    }

    #[test]
    fn priorities() {
        assert_eq!(ranges(&["text/plain"])[0].priority(), 1);
        assert_eq!(ranges(&["text/*"])[0].priority(), 2);
        assert_eq!(ranges(&["*/json"])[0].priority(), 3);
        assert_eq!(ranges(&["*/*"])[0].priority(), 4);
    }

    #[test]
    fn covers_and_matches() {
        let text = MediaRange::new("text", "*");
        assert!(text.covers(&MediaRange::new("text", "plain")));
        assert!(!text.covers(&MediaRange::new("application", "json")));
        assert!(!MediaRange::new("text", "plain").covers(&text));
        assert!(text.matches(&"TEXT/Plain".parse().unwrap()));
        assert!(MediaRange::any().matches(&MediaType::json()));
    }

    #[test]
    fn reduce_removes_covered_ranges() {
        let reduced = MediaRange::reduce(&ranges(&["text/json", "text/plain", "text/*"]));
        assert_eq!(strings(&reduced), vec!["text/*"]);

        let reduced = MediaRange::reduce(&ranges(&["*/*", "text/*", "text/json"]));
        assert_eq!(strings(&reduced), vec!["*/*"]);
    }

    #[test]
    fn reduce_is_permutation_invariant() {
        let input = ["text/plain", "application/json", "text/*", "application/xml", "text/html"];
        let sorted = vec!["application/json", "application/xml", "text/*"];

        for rotation in 0..input.len() {
            let mut permuted = input.to_vec();
            permuted.rotate_left(rotation);
            let reduced = MediaRange::reduce(&ranges(&permuted));
            assert_eq!(strings(&reduced), sorted);
            permuted.reverse();
            let reduced = MediaRange::reduce(&ranges(&permuted));
            assert_eq!(strings(&reduced), sorted);
        }
    }

    #[test]
    fn reduce_drops_duplicates() {
        let reduced = MediaRange::reduce(&ranges(&["text/plain", "TEXT/plain"]));
        assert_eq!(strings(&reduced), vec!["text/plain"]);
    }

    #[test]
    fn parse_accept_orders_by_quality() {
        let accepted = MediaRange::parse_accept("text/*;q=0.5, application/json, */*;q=0, text/html");
        assert_eq!(strings(&accepted), vec!["application/json", "text/html", "text/*"]);
    }

    #[test]
    fn negotiate_picks_most_specific_for_first_range() {
        let contents: Vec<(MediaType, &str)> = vec![
            ("application/json".parse().unwrap(), "json"),
            ("text/plain".parse().unwrap(), "plain"),
        ];
        let pick = |accept: &str| {
            negotiate(contents.iter().map(|(k, v)| (k, v)), &ranges(&[accept])).map(|(_, v)| *v)
        };
        assert_eq!(pick("text/plain"), Some("plain"));
        assert_eq!(pick("application/*"), Some("json"));
        assert_eq!(pick("*/*"), Some("json"));
        assert_eq!(pick("image/png"), None);
    }

    #[test]
    fn negotiate_prefers_exact_keys_over_wildcard_keys() {
        let contents: Vec<(MediaRange, u8)> = vec![
            ("text/*".parse().unwrap(), 1),
            ("text/plain".parse().unwrap(), 2),
        ];
        let selected = negotiate(
            contents.iter().map(|(k, v)| (k, v)),
            &ranges(&["text/plain"]),
        );
        assert_eq!(selected.map(|(_, v)| *v), Some(2));
    }

    #[test]
    fn negotiate_without_accept_takes_first() {
        let contents: Vec<(MediaType, u8)> = vec![(MediaType::json(), 1)];
        let selected = negotiate(contents.iter().map(|(k, v)| (k, v)), &[]);
        assert_eq!(selected.map(|(_, v)| *v), Some(1));
    }
}
