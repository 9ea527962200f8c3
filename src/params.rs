//! Request-side coercion and validation.
//!
//! Raw request input is coerced into a tree of [`JsonValue`]s, each holding
//! the schema it was coerced against. Coercion never fails on bad data:
//! values that don't fit their schema are kept as they came and reported
//! by [`JsonValue::validate`] or [`Parameters::validate`].
//!
//! ```ignore
//! let input = RequestInput::default().with_query(json!({ "page": "2" }));
//! let params = Parameters::new(defs, operation, &input, ParameterOptions::default())?;
//! let mut errors = Errors::new();
//! if params.validate(&mut errors) {
//!     let page = params.get("page");
//! }
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::components::{Operation, ParameterIn};
use crate::definitions::Definitions;
use crate::error::{Errors, ResolveError};
use crate::media::MediaType;
use crate::reference::ResolvedSchema;
use crate::schema::SchemaKind;
use crate::types::{format_iso_duration, is_empty_value, parse_iso_duration, Direction, Existence};

/// Options for building [`Parameters`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterOptions {
    /// Reject input keys that don't map to any parameter or body property.
    pub strong: bool,
}

/// Raw request input, already split by location.
#[derive(Debug, Clone, Default)]
pub struct RequestInput {
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    /// Looked up case-insensitively.
    pub headers: Map<String, Value>,
    pub cookies: Map<String, Value>,
    pub body: Option<Value>,
    pub media_type: Option<MediaType>,
}

impl RequestInput {
    pub fn with_path(mut self, path: Value) -> Self {
        self.path = into_map(path);
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = into_map(query);
        self
    }

    pub fn with_headers(mut self, headers: Value) -> Self {
        self.headers = into_map(headers);
        self
    }

    pub fn with_cookies(mut self, cookies: Value) -> Self {
        self.cookies = into_map(cookies);
        self
    }

    pub fn with_body(mut self, body: Value, media_type: Option<MediaType>) -> Self {
        self.body = Some(body);
        self.media_type = media_type;
        self
    }

    fn header(&self, name: &str) -> Option<&Value> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// A coerced request value.
#[derive(Debug, Clone)]
pub struct JsonValue<'a> {
    schema: ResolvedSchema<'a>,
    data: JsonData<'a>,
}

/// The typed content of a [`JsonValue`].
#[derive(Debug, Clone)]
pub enum JsonData<'a> {
    /// Not in the input and no default.
    Absent,
    Null,
    Boolean(bool),
    Integer(i64),
    Number(Number),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Duration(chrono::Duration),
    /// Input that couldn't be coerced to the schema's type or format.
    Invalid(Value),
    Array(Vec<JsonValue<'a>>),
    Object(JsonObject<'a>),
}

/// A coerced request object.
#[derive(Debug, Clone)]
pub struct JsonObject<'a> {
    schema: ResolvedSchema<'a>,
    properties: IndexMap<&'a str, JsonValue<'a>>,
    additional: IndexMap<String, JsonValue<'a>>,
    /// Input keys matching neither a property nor `additional_properties`.
    unknown: Vec<String>,
}

impl<'a> JsonValue<'a> {
    /// Coerces `input` against `schema`. `None` means the value is absent.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` if a reference below `schema` can't be
    /// resolved. A discriminator value that selects no schema is kept as
    /// invalid input instead.
    pub fn coerce(
        definitions: Definitions<'a>,
        schema: ResolvedSchema<'a>,
        input: Option<&Value>,
    ) -> Result<Self, ResolveError> {
        let value = match input {
            Some(value) => value.clone(),
            None => match schema.default_value(definitions, Direction::Request) {
                Some(default) => default,
                None => return Ok(Self::new(schema, JsonData::Absent)),
            },
        };
        if value.is_null() {
            return Ok(Self::new(schema, JsonData::Null));
        }

        let data = match schema.kind() {
            SchemaKind::Boolean => coerce_boolean(value),
            SchemaKind::Integer(_) => coerce_integer(value),
            SchemaKind::Number(_) => coerce_number(value),
            SchemaKind::String(_) => coerce_string(value, schema.schema().format()),
            SchemaKind::Array(array) => match value {
                Value::Array(items) => {
                    let item_schema = array.items.resolved(definitions)?;
                    let items = items
                        .iter()
                        .map(|item| Self::coerce(definitions, item_schema, Some(item)))
                        .collect::<Result<Vec<_>, _>>()?;
                    JsonData::Array(items)
                }
                other => JsonData::Invalid(other),
            },
            SchemaKind::Object(_) => match value {
                Value::Object(_) => {
                    let object = JsonObject::coerce(definitions, schema, &value)?;
                    return Ok(Self::new(object.schema, JsonData::Object(object)));
                }
                other => JsonData::Invalid(other),
            },
        };
        Ok(Self::new(schema, data))
    }

    fn new(schema: ResolvedSchema<'a>, data: JsonData<'a>) -> Self {
        Self { schema, data }
    }

    pub fn schema(&self) -> ResolvedSchema<'a> {
        self.schema
    }

    pub fn data(&self) -> &JsonData<'a> {
        &self.data
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.data, JsonData::Absent)
    }

    pub fn as_object(&self) -> Option<&JsonObject<'a>> {
        match &self.data {
            JsonData::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The value as JSON. Dates, times and durations are formatted back to
    /// text, invalid input is returned as it came. Absent values are `null`.
    pub fn to_value(&self) -> Value {
        match &self.data {
            JsonData::Absent | JsonData::Null => Value::Null,
            JsonData::Boolean(b) => Value::Bool(*b),
            JsonData::Integer(i) => Value::from(*i),
            JsonData::Number(n) => Value::Number(n.clone()),
            JsonData::String(s) => Value::String(s.clone()),
            JsonData::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            JsonData::DateTime(time) => {
                Value::String(time.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
            }
            JsonData::Duration(duration) => Value::String(format_iso_duration(*duration)),
            JsonData::Invalid(value) => value.clone(),
            JsonData::Array(items) => Value::Array(items.iter().map(JsonValue::to_value).collect()),
            JsonData::Object(object) => object.to_value(),
        }
    }

    /// Validates this value and everything below it, adding one error per
    /// failure. Returns true if nothing was added.
    pub fn validate(&self, errors: &mut Errors) -> bool {
        let before = errors.len();
        self.check("", false, errors);
        errors.len() == before
    }

    fn check(&self, path: &str, strong: bool, errors: &mut Errors) {
        if self.check_presence(path, errors) {
            self.check_contents(path, strong, errors);
        }
    }

    /// Checks existence and type. Returns true if the contents should be checked.
    fn check_presence(&self, path: &str, errors: &mut Errors) -> bool {
        let existence = self.schema.existence();
        match &self.data {
            JsonData::Absent => {
                if existence.is_required() {
                    errors.add(path, "is missing");
                }
                false
            }
            JsonData::Null => {
                if !existence.is_nullable() {
                    errors.add(path, "can't be nil");
                }
                false
            }
            JsonData::Invalid(_) => {
                errors.add(path, "is invalid");
                false
            }
            _ => {
                if existence == Existence::Present && is_empty_value(&self.to_value()) {
                    errors.add(path, "can't be blank");
                    return false;
                }
                true
            }
        }
    }

    fn check_contents(&self, path: &str, strong: bool, errors: &mut Errors) {
        match &self.data {
            JsonData::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.check(&format!("{}[{}]", path, i), strong, errors);
                }
            }
            JsonData::Object(object) => object.check(path, strong, errors),
            _ => {}
        }

        let schema = self.schema.schema();
        let value = self.to_value();
        if let Some(values) = &schema.enum_values {
            if !values.iter().any(|listed| self.listed_as(listed, &value)) {
                errors.add(path, "is not included in the list");
                return;
            }
        }
        for validation in schema.validations() {
            if let Some(message) = validation.check(&value) {
                errors.add(path, message);
            }
        }
    }

    /// Dates, times and durations match an enum entry denoting the same
    /// instant or length, whatever its spelling.
    fn listed_as(&self, listed: &Value, value: &Value) -> bool {
        if listed == value {
            return true;
        }
        match self.data {
            JsonData::Date(_) | JsonData::DateTime(_) | JsonData::Duration(_) => {
                let format = self.schema.schema().format();
                let normalized = JsonValue::new(self.schema, coerce_string(listed.clone(), format));
                !matches!(normalized.data, JsonData::Invalid(_)) && normalized.to_value() == *value
            }
            _ => false,
        }
    }
}

impl<'a> JsonObject<'a> {
    fn coerce(
        definitions: Definitions<'a>,
        schema: ResolvedSchema<'a>,
        value: &Value,
    ) -> Result<Self, ResolveError> {
        // An unmatched discriminator keeps the undispatched schema; the
        // discriminator property is marked invalid.
        let (schema, rejected) = match schema.resolve_schema(value, definitions, Direction::Request) {
            Ok(dispatched) => (dispatched, None),
            Err(
                error @ (ResolveError::UnknownDiscriminatorValue { .. }
                | ResolveError::MissingDiscriminator { .. }),
            ) => {
                tracing::debug!(%error, "discriminator selects no schema");
                let property = schema
                    .schema()
                    .as_object()
                    .and_then(|object| object.discriminator.as_ref())
                    .map(|discriminator| discriminator.property_name.as_str());
                (schema, property)
            }
            Err(error) => return Err(error),
        };
        let declared = schema.resolve_properties(definitions, None)?;
        let input = value.as_object();

        let mut properties = IndexMap::new();
        for (name, property) in &declared {
            if !property.is_visible(Direction::Request) {
                continue;
            }
            let child = property.schema.resolved(definitions)?;
            let raw = input.and_then(|input| input.get(*name));
            properties.insert(*name, JsonValue::coerce(definitions, child, raw)?);
        }
        if let Some(name) = rejected {
            let raw = input.and_then(|input| input.get(name)).cloned().unwrap_or(Value::Null);
            let slot = properties.get(name).map_or(schema, JsonValue::schema);
            properties.insert(name, JsonValue::new(slot, JsonData::Invalid(raw)));
        }

        let additional_schema = schema
            .schema()
            .as_object()
            .and_then(|object| object.additional_properties.as_ref())
            .map(|additional| additional.schema.resolved(definitions))
            .transpose()?;
        let mut additional = IndexMap::new();
        let mut unknown = Vec::new();
        for (key, raw) in input.into_iter().flatten() {
            if declared.contains_key(key.as_str()) || rejected == Some(key.as_str()) {
                continue;
            }
            match additional_schema {
                Some(additional_schema) => {
                    let value = JsonValue::coerce(definitions, additional_schema, Some(raw))?;
                    additional.insert(key.clone(), value);
                }
                None => unknown.push(key.clone()),
            }
        }

        Ok(Self {
            schema,
            properties,
            additional,
            unknown,
        })
    }

    /// The schema the object was coerced against, after discriminator dispatch.
    pub fn schema(&self) -> ResolvedSchema<'a> {
        self.schema
    }

    /// A declared property or additional attribute.
    pub fn get(&self, name: &str) -> Option<&JsonValue<'a>> {
        self.properties
            .get(name)
            .or_else(|| self.additional.get(name))
    }

    pub fn properties(&self) -> impl Iterator<Item = (&'a str, &JsonValue<'a>)> {
        self.properties.iter().map(|(name, value)| (*name, value))
    }

    /// Members coerced against `additional_properties`.
    pub fn additional_attributes(&self) -> &IndexMap<String, JsonValue<'a>> {
        &self.additional
    }

    pub fn unknown_keys(&self) -> &[String] {
        &self.unknown
    }

    /// Present properties and additional attributes as a JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.properties {
            if !value.is_absent() {
                map.insert(name.to_string(), value.to_value());
            }
        }
        for (name, value) in &self.additional {
            map.entry(name.clone()).or_insert_with(|| value.to_value());
        }
        Value::Object(map)
    }

    fn check(&self, path: &str, strong: bool, errors: &mut Errors) {
        for (name, value) in &self.properties {
            value.check(&join(path, name), strong, errors);
        }
        for (name, value) in &self.additional {
            value.check(&join(path, name), strong, errors);
        }
        if strong {
            for key in &self.unknown {
                errors.add(join(path, key), "is not a valid parameter");
            }
        }
        if let Some(validator) = self
            .schema
            .schema()
            .as_object()
            .and_then(|object| object.validator.as_ref())
        {
            validator.validate(self, path, errors);
        }
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn coerce_boolean<'a>(value: Value) -> JsonData<'a> {
    let boolean = match &value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" || s == "1" => Some(true),
        Value::String(s) if s == "false" || s == "0" => Some(false),
        _ => None,
    };
    match boolean {
        Some(b) => JsonData::Boolean(b),
        None => JsonData::Invalid(value),
    }
}

fn coerce_integer<'a>(value: Value) -> JsonData<'a> {
    let integer = match &value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match integer {
        Some(i) => JsonData::Integer(i),
        None => JsonData::Invalid(value),
    }
}

fn coerce_number<'a>(value: Value) -> JsonData<'a> {
    let number = match &value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64),
        _ => None,
    };
    match number {
        Some(n) => JsonData::Number(n),
        None => JsonData::Invalid(value),
    }
}

fn coerce_string<'a>(value: Value, format: Option<&str>) -> JsonData<'a> {
    let s = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => return JsonData::Invalid(other),
    };
    let parsed = match format {
        Some("date") => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .ok()
            .map(JsonData::Date),
        Some("date-time") => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(JsonData::DateTime),
        Some("duration") => parse_iso_duration(&s).map(JsonData::Duration),
        _ => return JsonData::String(s),
    };
    parsed.unwrap_or(JsonData::Invalid(Value::String(s)))
}

/// The coerced parameters and body of one request.
#[derive(Debug)]
pub struct Parameters<'a> {
    parameters: IndexMap<&'a str, JsonValue<'a>>,
    body: Option<JsonValue<'a>>,
    /// Query keys that match no parameter.
    unknown: Vec<String>,
    options: ParameterOptions,
}

impl<'a> Parameters<'a> {
    /// Coerces `input` against the parameters and request body of `operation`,
    /// including parameters shared through paths.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` if a parameter, body or schema reference can't
    /// be resolved.
    pub fn new(
        definitions: Definitions<'a>,
        operation: &'a Operation,
        input: &RequestInput,
        options: ParameterOptions,
    ) -> Result<Self, ResolveError> {
        let mut parameters = IndexMap::new();
        let mut query_names = Vec::new();
        let mut whole_query = false;

        for parameter in definitions.operation_parameters(operation) {
            let parameter = parameter.item(definitions)?;
            let schema = parameter.schema.resolved(definitions)?;
            let raw = match parameter.location {
                ParameterIn::Path => input.path.get(&parameter.name).cloned(),
                ParameterIn::Query => {
                    query_names.push(parameter.name.as_str());
                    input.query.get(&parameter.name).cloned()
                }
                ParameterIn::Querystring => {
                    whole_query = true;
                    Some(Value::Object(input.query.clone()))
                }
                ParameterIn::Header => input.header(&parameter.name).cloned(),
                ParameterIn::Cookie => input.cookies.get(&parameter.name).cloned(),
            };
            let value = JsonValue::coerce(definitions, schema, raw.as_ref())?;
            parameters.insert(parameter.name.as_str(), value);
        }

        let unknown = if whole_query {
            Vec::new()
        } else {
            input
                .query
                .keys()
                .filter(|key| !query_names.contains(&key.as_str()))
                .cloned()
                .collect()
        };

        let body = match &operation.request_body {
            Some(body) => {
                let body = body.item(definitions)?;
                match body
                    .content_for(input.media_type.as_ref())
                    .and_then(|(_, content)| content.schema.as_ref())
                {
                    Some(schema) => {
                        let schema = schema.resolved(definitions)?.at_least(body.existence);
                        Some(JsonValue::coerce(definitions, schema, input.body.as_ref())?)
                    }
                    None => None,
                }
            }
            None => None,
        };

        Ok(Self {
            parameters,
            body,
            unknown,
            options,
        })
    }

    /// A parameter, or a member of an object body.
    pub fn get(&self, name: &str) -> Option<&JsonValue<'a>> {
        self.parameters.get(name).or_else(|| {
            self.body
                .as_ref()
                .and_then(JsonValue::as_object)
                .and_then(|object| object.get(name))
        })
    }

    pub fn body(&self) -> Option<&JsonValue<'a>> {
        self.body.as_ref()
    }

    /// Validates every parameter and the body. Returns true if no error was added.
    ///
    /// Members of an object body are reported by their own name, other
    /// bodies as `body`.
    pub fn validate(&self, errors: &mut Errors) -> bool {
        let before = errors.len();
        let strong = self.options.strong;
        for (name, value) in &self.parameters {
            value.check(name, strong, errors);
        }
        if strong {
            for key in &self.unknown {
                errors.add(key.as_str(), "is not a valid parameter");
            }
        }
        if let Some(body) = &self.body {
            match body.as_object() {
                Some(object) => {
                    if body.check_presence("body", errors) {
                        object.check("", strong, errors);
                    }
                }
                None => body.check("body", strong, errors),
            }
        }
        errors.len() == before
    }

    /// Parameters and body members as one JSON object. A body that isn't
    /// an object is placed under `body`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.parameters {
            if !value.is_absent() {
                map.insert(name.to_string(), value.to_value());
            }
        }
        if let Some(body) = &self.body {
            match body.to_value() {
                Value::Object(members) if body.as_object().is_some() => {
                    for (name, value) in members {
                        map.entry(name).or_insert(value);
                    }
                }
                _ if body.is_absent() => {}
                value => {
                    map.insert("body".to_string(), value);
                }
            }
        }
        Value::Object(map)
    }
}
