//! Response-side serialization.
//!
//! [`jsonify`] shapes an application value by its response schema: defaults
//! fill in nil values, properties are read through their sources, numbers
//! and strings are cast, dates and durations are formatted. A value that
//! doesn't fit its own schema is a server bug and fails with the path to
//! the offending member.

use std::io::Write;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::definitions::Definitions;
use crate::error::{PathSegment, SerializeError, SerializeErrorKind, WriteError};
use crate::reference::{ResolvedSchema, SchemaOrRef};
use crate::schema::SchemaKind;
use crate::types::{
    format_iso_duration, is_empty_value, json_type_name, parse_iso_duration, Direction,
};

/// Which omittable properties to leave out of serialized objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Omit {
    /// Emit every property, `null` if there's no value.
    #[default]
    None,
    /// Leave out omittable properties without a value.
    Nil,
    /// Leave out omittable properties without a value or with an empty one.
    Empty,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonifyOptions {
    pub omit: Omit,
}

/// Serializes `value` by `schema`.
///
/// # Errors
///
/// Returns `SerializeError` naming the path of the first member that
/// doesn't fit its schema, or a reference that can't be resolved.
pub fn jsonify(
    definitions: Definitions<'_>,
    value: &Value,
    schema: &SchemaOrRef,
    options: &JsonifyOptions,
) -> Result<Value, SerializeError> {
    let schema = schema.resolved(definitions)?;
    Serializer {
        definitions,
        options: *options,
    }
    .serialize(value, schema)
}

/// Writes `value` as a JSON text sequence (RFC 7464).
///
/// An array value of an array schema is written one record per element,
/// anything else as a single record.
///
/// # Errors
///
/// Returns `WriteError` if an element can't be serialized or `writer` fails.
/// Records written before the failure stay written.
pub fn write_json_seq<W: Write>(
    writer: &mut W,
    definitions: Definitions<'_>,
    value: &Value,
    schema: &SchemaOrRef,
    options: &JsonifyOptions,
) -> Result<(), WriteError> {
    let resolved = schema.resolved(definitions).map_err(SerializeError::from)?;
    let serializer = Serializer {
        definitions,
        options: *options,
    };

    if let (SchemaKind::Array(array), Value::Array(items)) = (resolved.kind(), value) {
        let item_schema = array.items.resolved(definitions).map_err(SerializeError::from)?;
        for (i, item) in items.iter().enumerate() {
            let record = serializer
                .serialize(item, item_schema)
                .map_err(|e| e.within(PathSegment::Index(i)))?;
            write_record(writer, &record)?;
        }
        return Ok(());
    }

    let record = serializer.serialize(value, resolved)?;
    write_record(writer, &record)
}

fn write_record<W: Write>(writer: &mut W, record: &Value) -> Result<(), WriteError> {
    writer.write_all(b"\x1e")?;
    serde_json::to_writer(&mut *writer, record).map_err(std::io::Error::from)?;
    writer.write_all(b"\n")?;
    Ok(())
}

struct Serializer<'a> {
    definitions: Definitions<'a>,
    options: JsonifyOptions,
}

impl<'a> Serializer<'a> {
    fn serialize(&self, value: &Value, schema: ResolvedSchema<'a>) -> Result<Value, SerializeError> {
        let default;
        let value = match value {
            Value::Null => match schema.default_value(self.definitions, Direction::Response) {
                Some(value) => {
                    default = value;
                    &default
                }
                None => value,
            },
            value => value,
        };
        if value.is_null() {
            return if schema.is_nullable() {
                Ok(Value::Null)
            } else {
                Err(SerializeError::nil())
            };
        }

        match schema.kind() {
            SchemaKind::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                other => Err(SerializeError::invalid_type(json_type_name(other))),
            },
            SchemaKind::Integer(_) => {
                let value = self.convert(value, schema);
                cast_integer(&value)
            }
            SchemaKind::Number(_) => {
                let value = self.convert(value, schema);
                cast_number(&value)
            }
            SchemaKind::String(_) => {
                let value = format_string(value, schema.schema().format())?;
                let value = self.convert(&value, schema);
                match value {
                    Value::String(_) => Ok(value),
                    Value::Number(n) => Ok(Value::String(n.to_string())),
                    Value::Bool(b) => Ok(Value::String(b.to_string())),
                    other => Err(SerializeError::invalid_type(json_type_name(&other))),
                }
            }
            SchemaKind::Array(array) => {
                let Value::Array(items) = value else {
                    return Err(SerializeError::invalid_type(json_type_name(value)));
                };
                let item_schema = array.items.resolved(self.definitions)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.serialize(item, item_schema)
                            .map_err(|e| e.within(PathSegment::Index(i)))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            SchemaKind::Object(_) => self.object(value, schema),
        }
    }

    fn convert(&self, value: &Value, schema: ResolvedSchema<'a>) -> Value {
        match schema.schema().conversion() {
            Some(conversion) => conversion.apply(value),
            None => value.clone(),
        }
    }

    fn object(&self, value: &Value, schema: ResolvedSchema<'a>) -> Result<Value, SerializeError> {
        if !value.is_object() {
            return Err(SerializeError::invalid_type(json_type_name(value)));
        }
        let defs = self.definitions;
        let schema = schema.resolve_schema(value, defs, Direction::Response)?;
        let declared = schema.resolve_properties(defs, None)?;

        let mut map = Map::new();
        for (&name, property) in &declared {
            if !property.is_visible(Direction::Response) {
                continue;
            }
            let child = property.schema.resolved(defs)?;
            let raw = property
                .read(name, value)
                .filter(|v| !v.is_null())
                .or_else(|| child.default_value(defs, Direction::Response));
            let omit = child.is_omittable()
                && match (self.options.omit, &raw) {
                    (Omit::None, _) => false,
                    (Omit::Nil | Omit::Empty, None) => true,
                    (Omit::Empty, Some(raw)) => is_empty_value(raw),
                    (Omit::Nil, Some(_)) => false,
                };
            if omit {
                continue;
            }
            let serialized = self
                .serialize(raw.as_ref().unwrap_or(&Value::Null), child)
                .map_err(|e| e.within(PathSegment::Key(name.to_string())))?;
            map.insert(name.to_string(), serialized);
        }

        let Some(additional) = schema
            .schema()
            .as_object()
            .and_then(|object| object.additional_properties.as_ref())
        else {
            return Ok(Value::Object(map));
        };
        let members = match &additional.source {
            Some(reader) => match reader.read(value) {
                Some(Value::Object(members)) => members,
                Some(other) => return Err(SerializeError::invalid_type(json_type_name(&other))),
                None => Map::new(),
            },
            None => value
                .as_object()
                .into_iter()
                .flatten()
                .filter(|(key, _)| !declared.contains_key(key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        };
        let additional_schema = additional.schema.resolved(defs)?;
        for (key, member) in members {
            if map.contains_key(&key) || declared.contains_key(key.as_str()) {
                continue;
            }
            let serialized = self
                .serialize(&member, additional_schema)
                .map_err(|e| e.within(PathSegment::Key(key.clone())))?;
            map.insert(key, serialized);
        }
        Ok(Value::Object(map))
    }
}

fn cast_integer(value: &Value) -> Result<Value, SerializeError> {
    let integer = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    integer
        .map(Value::from)
        .ok_or_else(|| SerializeError::invalid_type(json_type_name(value)))
}

fn cast_number(value: &Value) -> Result<Value, SerializeError> {
    let number = match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(Number::from_f64),
        _ => None,
    };
    number
        .map(Value::Number)
        .ok_or_else(|| SerializeError::invalid_type(json_type_name(value)))
}

fn invalid_format(format: &str) -> SerializeError {
    SerializeError::new(SerializeErrorKind::InvalidValue {
        message: format!("is not a valid {}", format),
    })
}

/// Formats dates, times and durations. Other values pass through.
fn format_string(value: &Value, format: Option<&str>) -> Result<Value, SerializeError> {
    let formatted = match (format, value) {
        (Some("date"), Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|t| t.date_naive()))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .ok_or_else(|| invalid_format("date"))?,
        (Some("date-time"), Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|time| time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|time| time.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true))
            })
            .ok_or_else(|| invalid_format("date-time"))?,
        (Some("date-time"), Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|time| time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .ok_or_else(|| invalid_format("date-time"))?,
        (Some("duration"), Value::String(s)) => parse_iso_duration(s)
            .map(format_iso_duration)
            .ok_or_else(|| invalid_format("duration"))?,
        (Some("duration"), Value::Number(n)) => n
            .as_f64()
            .filter(|secs| secs.is_finite() && secs.abs() < 1e15)
            .map(|secs| chrono::Duration::milliseconds((secs * 1_000.0).round() as i64))
            .map(format_iso_duration)
            .ok_or_else(|| invalid_format("duration"))?,
        _ => return Ok(value.clone()),
    };
    Ok(Value::String(formatted))
}
