//! Core scalar types shared by the schema model, the generators and the runtime pipelines.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Returns true if `value` is `null` or an empty string, array or object.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Direction data flows through a schema.
///
/// Requests only populate properties that are not read-only, responses only
/// emit properties that are not write-only. Type-level defaults are
/// registered per direction as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// Create direction from a request flag (true = Request, false = Response).
    pub fn from_request_flag(is_request: bool) -> Self {
        if is_request {
            Direction::Request
        } else {
            Direction::Response
        }
    }
}

/// How strictly a value must be present.
///
/// The levels are totally ordered; a higher level never grants more freedom.
///
/// | Level | may be absent | may be `null` | required |
/// |-------|---------------|---------------|----------|
/// | `AllowOmitted` | yes | yes | no |
/// | `AllowNil` | no | yes | yes |
/// | `AllowEmpty` | no | no | yes |
/// | `Present` | no | no | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Existence {
    #[default]
    AllowOmitted,
    AllowNil,
    AllowEmpty,
    Present,
}

impl Existence {
    /// Maps the boolean shorthand: `true` is `Present`, `false` is `AllowOmitted`.
    pub fn from_bool(present: bool) -> Self {
        if present {
            Existence::Present
        } else {
            Existence::AllowOmitted
        }
    }

    /// Parse an existence level from its name.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" | "true" => Some(Existence::Present),
            "allow_empty" => Some(Existence::AllowEmpty),
            "allow_nil" | "allow_null" => Some(Existence::AllowNil),
            "allow_omitted" | "false" => Some(Existence::AllowOmitted),
            _ => None,
        }
    }

    pub fn is_omittable(self) -> bool {
        self <= Existence::AllowOmitted
    }

    pub fn is_nullable(self) -> bool {
        self <= Existence::AllowNil
    }

    /// Whether the value belongs into `required` of JSON Schema / OpenAPI.
    pub fn is_required(self) -> bool {
        self > Existence::AllowOmitted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Existence::AllowOmitted => "allow_omitted",
            Existence::AllowNil => "allow_nil",
            Existence::AllowEmpty => "allow_empty",
            Existence::Present => "present",
        }
    }
}

impl<'de> Deserialize<'de> for Existence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ExistenceVisitor;

        impl Visitor<'_> for ExistenceVisitor {
            type Value = Existence;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a boolean or one of present, allow_empty, allow_nil, allow_omitted")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Existence, E> {
                Ok(Existence::from_bool(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Existence, E> {
                Existence::parse(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(ExistenceVisitor)
    }
}

/// Target OpenAPI version of a generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Version {
    V2_0,
    V3_0,
    #[default]
    V3_1,
    V3_2,
}

impl Version {
    /// Value of the `swagger` / `openapi` field.
    pub fn document_version(self) -> &'static str {
        match self {
            Version::V2_0 => "2.0",
            Version::V3_0 => "3.0.3",
            Version::V3_1 => "3.1.1",
            Version::V3_2 => "3.2.0",
        }
    }

    pub fn is_swagger(self) -> bool {
        self == Version::V2_0
    }
}

impl FromStr for Version {
    type Err = ConfigError;

    /// Accepts `2`, `2.0`, `3.0`, `3.0.x`, `3.1`, `3.1.x`, `3.2`, `3.2.x`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts.next().unwrap_or_default();
        let minor = parts.next().unwrap_or("0");
        match (major, minor) {
            ("2", "0") => Ok(Version::V2_0),
            ("3", "0") => Ok(Version::V3_0),
            ("3", "1") => Ok(Version::V3_1),
            ("3", "2") => Ok(Version::V3_2),
            _ => Err(ConfigError::InvalidValue {
                attribute: "version".to_string(),
                value: s.to_string(),
                expected: "2.0, 3.0, 3.1 or 3.2".to_string(),
            }),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document_version())
    }
}

/// The JSON type of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
}

impl SchemaType {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(SchemaType::Object),
            "array" => Some(SchemaType::Array),
            "string" => Some(SchemaType::String),
            "number" => Some(SchemaType::Number),
            "integer" => Some(SchemaType::Integer),
            "boolean" => Some(SchemaType::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses an ISO 8601 duration with fixed-length units only
/// (`P2W`, `P1DT2H30M`, `PT1.5S`, optionally signed).
pub(crate) fn parse_iso_duration(s: &str) -> Option<chrono::Duration> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let rest = rest.strip_prefix('P')?;
    let (date, time) = match rest.split_once('T') {
        Some((date, time)) if !time.is_empty() => (date, time),
        Some(_) => return None,
        None => (rest, ""),
    };
    if date.is_empty() && time.is_empty() {
        return None;
    }
    let seconds = duration_part(date, &[('W', 604_800.0), ('D', 86_400.0)])?
        + duration_part(time, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)])?;
    let millis = (seconds * 1_000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    let duration = chrono::Duration::milliseconds(millis as i64);
    Some(if negative { -duration } else { duration })
}

/// Sums `<number><unit>` pairs; units must appear in the order given.
fn duration_part(part: &str, units: &[(char, f64)]) -> Option<f64> {
    let mut total = 0.0;
    let mut number = String::new();
    let mut next_unit = 0;
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let offset = units[next_unit..].iter().position(|(unit, _)| *unit == c)?;
        let value: f64 = number.parse().ok()?;
        total += value * units[next_unit + offset].1;
        next_unit += offset + 1;
        number.clear();
    }
    number.is_empty().then_some(total)
}

/// Formats a duration as ISO 8601, e.g. `P1DT2H`, `PT1.5S` or `PT0S`.
pub(crate) fn format_iso_duration(duration: chrono::Duration) -> String {
    let negative = duration < chrono::Duration::zero();
    let millis = duration.num_milliseconds().unsigned_abs();
    let days = millis / 86_400_000;
    let hours = millis / 3_600_000 % 24;
    let minutes = millis / 60_000 % 60;
    let seconds = millis / 1_000 % 60;
    let fraction = millis % 1_000;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours == 0 && minutes == 0 && seconds == 0 && fraction == 0 {
        if days == 0 {
            out.push_str("T0S");
        }
        return out;
    }
    out.push('T');
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if seconds > 0 || fraction > 0 {
        if fraction > 0 {
            let fraction = format!("{:03}", fraction);
            out.push_str(&format!("{}.{}S", seconds, fraction.trim_end_matches('0')));
        } else {
            out.push_str(&format!("{}S", seconds));
        }
    }
    out
}

/// Implements `Deserialize` for a type by parsing a string through `FromStr`.
macro_rules! deserialize_from_str {
    ($ty:ty, $expecting:literal) => {
        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse::<$ty>().map_err(|_| {
                    serde::de::Error::invalid_value(serde::de::Unexpected::Str(&s), &$expecting)
                })
            }
        }
    };
}

pub(crate) use deserialize_from_str;

deserialize_from_str!(Version, "an OpenAPI version");

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LEVELS: [Existence; 4] = [
        Existence::AllowOmitted,
        Existence::AllowNil,
        Existence::AllowEmpty,
        Existence::Present,
    ];

    #[test]
    fn existence_is_totally_ordered() {
        for window in LEVELS.windows(2) {
            assert!(window[0] < window[1]);
        }
        assert_eq!(Existence::default(), Existence::AllowOmitted);
    }

    #[test]
    fn existence_freedoms_are_monotone() {
        for window in LEVELS.windows(2) {
            let (lower, higher) = (window[0], window[1]);
            assert!(!higher.is_nullable() || lower.is_nullable());
            assert!(!higher.is_omittable() || lower.is_omittable());
            assert!(higher.is_required() || !lower.is_required());
        }
    }

    #[test]
    fn existence_predicates() {
        assert!(Existence::AllowOmitted.is_omittable());
        assert!(!Existence::AllowNil.is_omittable());
        assert!(Existence::AllowNil.is_nullable());
        assert!(!Existence::AllowEmpty.is_nullable());
        assert!(!Existence::AllowOmitted.is_required());
        assert!(Existence::AllowNil.is_required());
    }

    #[test]
    fn existence_deserializes_from_bool_and_string() {
        let e: Existence = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(e, Existence::Present);
        let e: Existence = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(e, Existence::AllowOmitted);
        let e: Existence = serde_json::from_value(json!("allow_empty")).unwrap();
        assert_eq!(e, Existence::AllowEmpty);
        assert!(serde_json::from_value::<Existence>(json!("maybe")).is_err());
    }

    #[test]
    fn version_parse() {
        assert_eq!("2.0".parse::<Version>().unwrap(), Version::V2_0);
        assert_eq!("3.0.3".parse::<Version>().unwrap(), Version::V3_0);
        assert_eq!("3.1".parse::<Version>().unwrap(), Version::V3_1);
        assert_eq!("3.2.0".parse::<Version>().unwrap(), Version::V3_2);
        assert!("4.0".parse::<Version>().is_err());
        assert!(Version::V3_0 < Version::V3_2);
    }

    #[test]
    fn json_type_names() {
        assert_eq!(json_type_name(&json!(1)), "integer");
        assert_eq!(json_type_name(&json!(1.5)), "number");
        assert_eq!(json_type_name(&json!(null)), "null");
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!(null)));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
    }

    #[test]
    fn iso_durations() {
        let duration = parse_iso_duration("P1DT2H30M").unwrap();
        assert_eq!(duration.num_minutes(), 24 * 60 + 150);
        assert_eq!(format_iso_duration(duration), "P1DT2H30M");
        assert_eq!(parse_iso_duration("P2W").unwrap().num_days(), 14);
        assert_eq!(format_iso_duration(parse_iso_duration("PT1.5S").unwrap()), "PT1.5S");
        assert_eq!(format_iso_duration(parse_iso_duration("-PT90S").unwrap()), "-PT1M30S");
        assert_eq!(format_iso_duration(chrono::Duration::zero()), "PT0S");
        assert!(parse_iso_duration("P").is_none());
        assert!(parse_iso_duration("PT").is_none());
        assert!(parse_iso_duration("P1M").is_none());
        assert!(parse_iso_duration("PT1H2").is_none());
        assert!(parse_iso_duration("1 day").is_none());
    }
}
