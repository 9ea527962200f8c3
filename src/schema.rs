//! Typed schema nodes.
//!
//! A [`Schema`] describes shape only; building one never looks at data. Data
//! is checked against schemas by the request pipeline ([`crate::params`]) and
//! shaped by the response pipeline ([`crate::jsonify`]).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde::de::{Deserializer, Error as _};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::components::ExternalDocs;
use crate::definitions::Definitions;
use crate::error::{ConfigError, Errors, ResolveError};
use crate::params::JsonObject;
use crate::reference::{resolve_reference, Reference, ResolvedSchema, SchemaOrRef};
use crate::types::{Direction, Existence, SchemaType};

/// A schema node.
#[derive(Debug, Clone, Deserialize)]
pub struct Schema {
    #[serde(flatten)]
    pub kind: SchemaKind,
    #[serde(default)]
    pub existence: Existence,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default, rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub external_docs: Option<ExternalDocs>,
    #[serde(default)]
    pub examples: Vec<Value>,
    /// `x-` extensions merged into generated documents last.
    #[serde(default)]
    pub extensions: IndexMap<String, Value>,
}

/// Type-specific part of a schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaKind {
    Object(ObjectSchema),
    Array(ArraySchema),
    String(StringSchema),
    Number(NumericSchema),
    Integer(NumericSchema),
    Boolean,
}

impl SchemaKind {
    pub fn schema_type(&self) -> SchemaType {
        match self {
            SchemaKind::Object(_) => SchemaType::Object,
            SchemaKind::Array(_) => SchemaType::Array,
            SchemaKind::String(_) => SchemaType::String,
            SchemaKind::Number(_) => SchemaType::Number,
            SchemaKind::Integer(_) => SchemaType::Integer,
            SchemaKind::Boolean => SchemaType::Boolean,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StringSchema {
    /// `date`, `date-time` and `duration` are understood by the runtime pipelines.
    pub format: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Pattern>,
    #[serde(skip)]
    pub conversion: Option<Conversion>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NumericSchema {
    pub minimum: Option<Bound>,
    pub maximum: Option<Bound>,
    pub multiple_of: Option<Number>,
    #[serde(skip)]
    pub conversion: Option<Conversion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArraySchema {
    pub items: Box<SchemaOrRef>,
    #[serde(default)]
    pub min_items: Option<usize>,
    #[serde(default)]
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectSchema {
    pub properties: IndexMap<String, Property>,
    /// Schemas whose properties are inherited, in merge order.
    pub all_of: Vec<Reference>,
    pub additional_properties: Option<AdditionalProperties>,
    pub discriminator: Option<Discriminator>,
    /// Extra validation of request objects, run after their properties.
    #[serde(skip)]
    pub validator: Option<ObjectValidator>,
}

/// An inclusive or exclusive numeric bound.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "BoundRepr")]
pub struct Bound {
    pub value: Number,
    pub exclusive: bool,
}

impl Bound {
    pub fn inclusive(value: impl Into<Number>) -> Self {
        Self {
            value: value.into(),
            exclusive: false,
        }
    }

    pub fn exclusive(value: impl Into<Number>) -> Self {
        Self {
            value: value.into(),
            exclusive: true,
        }
    }

    fn as_f64(&self) -> f64 {
        self.value.as_f64().unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundRepr {
    Value(Number),
    Full {
        value: Number,
        #[serde(default)]
        exclusive: bool,
    },
}

impl From<BoundRepr> for Bound {
    fn from(repr: BoundRepr) -> Self {
        match repr {
            BoundRepr::Value(value) => Bound {
                value,
                exclusive: false,
            },
            BoundRepr::Full { value, exclusive } => Bound { value, exclusive },
        }
    }
}

/// A compiled regular expression that keeps its source.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(source).map_err(|e| ConfigError::InvalidValue {
            attribute: "pattern".to_string(),
            value: source.to_string(),
            expected: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(D::Error::custom)
    }
}

/// Applied to response values before they are cast to the schema's type.
#[derive(Clone)]
pub struct Conversion(Arc<dyn Fn(&Value) -> Value + Send + Sync>);

impl Conversion {
    pub fn new(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, value: &Value) -> Value {
        (self.0)(value)
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Conversion(..)")
    }
}

/// Reads a value out of an application object.
#[derive(Clone)]
pub struct Reader(Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>);

impl Reader {
    pub fn new(f: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn read(&self, object: &Value) -> Option<Value> {
        (self.0)(object)
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reader(..)")
    }
}

/// Custom validation of a request object.
#[derive(Clone)]
pub struct ObjectValidator(Arc<dyn Fn(&JsonObject<'_>, &str, &mut Errors) + Send + Sync>);

impl ObjectValidator {
    pub fn new(f: impl Fn(&JsonObject<'_>, &str, &mut Errors) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn validate(&self, object: &JsonObject<'_>, path: &str, errors: &mut Errors) {
        (self.0)(object, path, errors)
    }
}

impl fmt::Debug for ObjectValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObjectValidator(..)")
    }
}

/// Where a property's value is read from when serializing a response.
#[derive(Debug, Clone)]
pub enum Source {
    /// Member names to follow, e.g. `["address", "zip"]` for `"address.zip"`.
    Path(Vec<String>),
    Reader(Reader),
}

impl Source {
    pub fn path(path: &str) -> Self {
        Source::Path(path.split('.').map(String::from).collect())
    }

    pub fn read(&self, object: &Value) -> Option<Value> {
        match self {
            Source::Path(path) => path
                .iter()
                .try_fold(object, |current, key| current.get(key))
                .cloned(),
            Source::Reader(reader) => reader.read(object),
        }
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let path = String::deserialize(deserializer)?;
        if path.is_empty() {
            return Err(D::Error::custom("source can't be blank"));
        }
        Ok(Source::path(&path))
    }
}

/// A property of an object schema.
#[derive(Debug, Clone)]
pub struct Property {
    pub schema: SchemaOrRef,
    /// Never populated from requests.
    pub read_only: bool,
    /// Never emitted in responses.
    pub write_only: bool,
    pub source: Option<Source>,
}

impl Property {
    pub fn new(schema: impl Into<SchemaOrRef>) -> Self {
        Self {
            schema: schema.into(),
            read_only: false,
            write_only: false,
            source: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    /// Whether the property takes part in data flowing in `direction`.
    pub fn is_visible(&self, direction: Direction) -> bool {
        match direction {
            Direction::Request => !self.read_only,
            Direction::Response => !self.write_only,
        }
    }

    /// Reads the property's value out of `object`.
    pub fn read(&self, name: &str, object: &Value) -> Option<Value> {
        match &self.source {
            Some(source) => source.read(object),
            None => object.get(name).cloned(),
        }
    }
}

impl<'de> Deserialize<'de> for Property {
    /// Property flags sit next to the schema keywords:
    /// `{ "type": "string", "read_only": true }`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;
        let flag = |map: &mut Map<String, Value>, key: &str| -> Result<bool, D::Error> {
            match map.remove(key) {
                None => Ok(false),
                Some(Value::Bool(b)) => Ok(b),
                Some(other) => Err(D::Error::custom(format!(
                    "{} must be a boolean, got {}",
                    key, other
                ))),
            }
        };
        let read_only = flag(&mut map, "read_only")?;
        let write_only = flag(&mut map, "write_only")?;
        let source = map
            .remove("source")
            .map(serde_json::from_value::<Source>)
            .transpose()
            .map_err(D::Error::custom)?;
        let schema = serde_json::from_value(Value::Object(map)).map_err(D::Error::custom)?;
        Ok(Property {
            schema,
            read_only,
            write_only,
            source,
        })
    }
}

/// Schema of the members of an object not claimed by a declared property.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "SchemaOrRef")]
pub struct AdditionalProperties {
    pub schema: Box<SchemaOrRef>,
    /// Reads the additional members (as an object) out of an application
    /// object. Without a reader, the members not claimed by a declared
    /// property are used.
    pub source: Option<Reader>,
}

impl From<SchemaOrRef> for AdditionalProperties {
    fn from(schema: SchemaOrRef) -> Self {
        Self {
            schema: Box::new(schema),
            source: None,
        }
    }
}

/// Selects a concrete schema by the value of a property.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Discriminator {
    pub property_name: String,
    /// Property value to schema name. Unmapped values are schema names themselves.
    #[serde(default, alias = "mapping")]
    pub mappings: IndexMap<String, String>,
    /// Schema used when the property is absent.
    #[serde(default)]
    pub default_mapping: Option<String>,
}

impl Discriminator {
    pub fn new(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            ..Self::default()
        }
    }

    pub fn mapping(mut self, value: impl Into<String>, schema: impl Into<String>) -> Self {
        self.mappings.insert(value.into(), schema.into());
        self
    }
}

/// One constraint checked against request values and emitted into documents.
#[derive(Debug, Clone, Copy)]
pub enum Validation<'a> {
    Minimum(&'a Bound),
    Maximum(&'a Bound),
    MultipleOf(&'a Number),
    MinLength(usize),
    MaxLength(usize),
    Pattern(&'a Pattern),
    MinItems(usize),
    MaxItems(usize),
}

impl Validation<'_> {
    /// Returns the error message if `value` violates this constraint.
    ///
    /// Values of a type the constraint doesn't apply to pass.
    pub fn check(&self, value: &Value) -> Option<String> {
        match (self, value) {
            (Validation::Minimum(bound), Value::Number(n)) => {
                let n = n.as_f64().unwrap_or_default();
                if bound.exclusive && n <= bound.as_f64() {
                    Some(format!("must be greater than {}", bound.value))
                } else if n < bound.as_f64() {
                    Some(format!("must be greater than or equal to {}", bound.value))
                } else {
                    None
                }
            }
            (Validation::Maximum(bound), Value::Number(n)) => {
                let n = n.as_f64().unwrap_or_default();
                if bound.exclusive && n >= bound.as_f64() {
                    Some(format!("must be less than {}", bound.value))
                } else if n > bound.as_f64() {
                    Some(format!("must be less than or equal to {}", bound.value))
                } else {
                    None
                }
            }
            (Validation::MultipleOf(divisor), Value::Number(n)) => {
                let multiple = match (n.as_i64(), divisor.as_i64()) {
                    (Some(n), Some(d)) if d != 0 => n % d == 0,
                    _ => {
                        let quotient = n.as_f64().unwrap_or_default()
                            / divisor.as_f64().unwrap_or(1.0);
                        (quotient - quotient.round()).abs() < 1e-9
                    }
                };
                (!multiple).then(|| format!("must be a multiple of {}", divisor))
            }
            (Validation::MinLength(min), Value::String(s)) => (s.chars().count() < *min)
                .then(|| format!("is too short (minimum is {} characters)", min)),
            (Validation::MaxLength(max), Value::String(s)) => (s.chars().count() > *max)
                .then(|| format!("is too long (maximum is {} characters)", max)),
            (Validation::Pattern(pattern), Value::String(s)) => {
                (!pattern.is_match(s)).then(|| "is invalid".to_string())
            }
            (Validation::MinItems(min), Value::Array(items)) => (items.len() < *min)
                .then(|| format!("is too short (minimum is {} items)", min)),
            (Validation::MaxItems(max), Value::Array(items)) => (items.len() > *max)
                .then(|| format!("is too long (maximum is {} items)", max)),
            _ => None,
        }
    }
}

impl Schema {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            existence: Existence::default(),
            default: None,
            enum_values: None,
            title: None,
            description: None,
            deprecated: false,
            external_docs: None,
            examples: Vec::new(),
            extensions: IndexMap::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String(StringSchema::default()))
    }

    pub fn integer() -> Self {
        Self::new(SchemaKind::Integer(NumericSchema::default()))
    }

    pub fn number() -> Self {
        Self::new(SchemaKind::Number(NumericSchema::default()))
    }

    pub fn boolean() -> Self {
        Self::new(SchemaKind::Boolean)
    }

    pub fn object() -> Self {
        Self::new(SchemaKind::Object(ObjectSchema::default()))
    }

    pub fn array(items: impl Into<SchemaOrRef>) -> Self {
        Self::new(SchemaKind::Array(ArraySchema {
            items: Box::new(items.into()),
            min_items: None,
            max_items: None,
        }))
    }

    pub fn with_existence(mut self, existence: Existence) -> Self {
        self.existence = existence;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Sets the format of a string schema. Has no effect on other types.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        if let SchemaKind::String(string) = &mut self.kind {
            string.format = Some(format.into());
        }
        self
    }

    /// Adds a property to an object schema. Has no effect on other types.
    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        if let SchemaKind::Object(object) = &mut self.kind {
            object.properties.insert(name.into(), property);
        }
        self
    }

    /// Adds a schema to inherit properties from. Has no effect on non-objects.
    pub fn all_of(mut self, reference: Reference) -> Self {
        if let SchemaKind::Object(object) = &mut self.kind {
            object.all_of.push(reference);
        }
        self
    }

    pub fn with_discriminator(mut self, discriminator: Discriminator) -> Self {
        if let SchemaKind::Object(object) = &mut self.kind {
            object.discriminator = Some(discriminator);
        }
        self
    }

    pub fn with_additional_properties(mut self, schema: impl Into<SchemaOrRef>) -> Self {
        if let SchemaKind::Object(object) = &mut self.kind {
            object.additional_properties = Some(AdditionalProperties::from(schema.into()));
        }
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        match &mut self.kind {
            SchemaKind::String(s) => s.conversion = Some(conversion),
            SchemaKind::Number(n) | SchemaKind::Integer(n) => n.conversion = Some(conversion),
            _ => {}
        }
        self
    }

    pub fn schema_type(&self) -> SchemaType {
        self.kind.schema_type()
    }

    pub fn format(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::String(s) => s.format.as_deref(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match &self.kind {
            SchemaKind::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn conversion(&self) -> Option<&Conversion> {
        match &self.kind {
            SchemaKind::String(s) => s.conversion.as_ref(),
            SchemaKind::Number(n) | SchemaKind::Integer(n) => n.conversion.as_ref(),
            _ => None,
        }
    }

    /// The schema's own default, else the registry's default for its type.
    pub fn default_value(&self, definitions: Definitions<'_>, direction: Direction) -> Option<Value> {
        self.default
            .clone()
            .or_else(|| definitions.type_default(self.schema_type(), direction).cloned())
    }

    /// The constraints of this schema, in emission order.
    pub fn validations(&self) -> Vec<Validation<'_>> {
        let mut validations = Vec::new();
        match &self.kind {
            SchemaKind::String(s) => {
                validations.extend(s.min_length.map(Validation::MinLength));
                validations.extend(s.max_length.map(Validation::MaxLength));
                validations.extend(s.pattern.as_ref().map(Validation::Pattern));
            }
            SchemaKind::Number(n) | SchemaKind::Integer(n) => {
                validations.extend(n.minimum.as_ref().map(Validation::Minimum));
                validations.extend(n.maximum.as_ref().map(Validation::Maximum));
                validations.extend(n.multiple_of.as_ref().map(Validation::MultipleOf));
            }
            SchemaKind::Array(a) => {
                validations.extend(a.min_items.map(Validation::MinItems));
                validations.extend(a.max_items.map(Validation::MaxItems));
            }
            SchemaKind::Object(_) | SchemaKind::Boolean => {}
        }
        validations
    }

    /// Checks the shape of this schema and everything inline below it.
    pub fn check(&self) -> Result<(), ConfigError> {
        match &self.kind {
            SchemaKind::Array(array) => check_schema_or_ref(&array.items)?,
            SchemaKind::Object(object) => {
                for (name, property) in &object.properties {
                    if name.trim().is_empty() {
                        return Err(ConfigError::BlankName {
                            kind: "property".to_string(),
                        });
                    }
                    if property.read_only && property.write_only {
                        return Err(ConfigError::MutuallyExclusive {
                            first: format!("read_only of {}", name),
                            second: "write_only".to_string(),
                        });
                    }
                    check_schema_or_ref(&property.schema)?;
                }
                for reference in &object.all_of {
                    check_reference(reference)?;
                }
                if let Some(additional) = &object.additional_properties {
                    check_schema_or_ref(&additional.schema)?;
                }
                if let Some(discriminator) = &object.discriminator {
                    if discriminator.property_name.trim().is_empty() {
                        return Err(ConfigError::BlankName {
                            kind: "discriminator property".to_string(),
                        });
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

pub(crate) fn check_reference(reference: &Reference) -> Result<(), ConfigError> {
    if reference.name.trim().is_empty() {
        return Err(ConfigError::BlankName {
            kind: "reference".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_schema_or_ref(schema: &SchemaOrRef) -> Result<(), ConfigError> {
    match schema {
        SchemaOrRef::Item(schema) => schema.check(),
        SchemaOrRef::Ref(reference) => check_reference(reference),
    }
}

impl<'a> ResolvedSchema<'a> {
    /// Properties of an object schema including inherited ones.
    ///
    /// `all_of` schemas are merged depth-first before the schema's own
    /// properties; a later property with the same name replaces the earlier
    /// one. With a direction, properties that don't take part in it are
    /// dropped.
    pub fn resolve_properties(
        &self,
        definitions: Definitions<'a>,
        direction: Option<Direction>,
    ) -> Result<IndexMap<&'a str, &'a Property>, ResolveError> {
        let mut stack: Vec<&'a str> = self.name().into_iter().collect();
        let mut properties = IndexMap::new();
        collect_properties(self.schema(), definitions, &mut stack, &mut properties)?;
        if let Some(direction) = direction {
            properties.retain(|_, property| property.is_visible(direction));
        }
        Ok(properties)
    }

    /// The schema to use for `value`, selected through the discriminator.
    ///
    /// Schemas without a discriminator resolve to themselves.
    pub fn resolve_schema(
        &self,
        value: &Value,
        definitions: Definitions<'a>,
        direction: Direction,
    ) -> Result<ResolvedSchema<'a>, ResolveError> {
        let mut current = *self;
        let mut visited: Vec<&'a str> = Vec::new();
        loop {
            let Some(discriminator) = current
                .schema()
                .as_object()
                .and_then(|o| o.discriminator.as_ref())
            else {
                return Ok(current);
            };
            let next = current.dispatch(discriminator, value, definitions, direction)?;
            let same = std::ptr::eq(next.schema(), current.schema())
                || next.name().map_or(false, |n| visited.contains(&n));
            tracing::debug!(
                property = %discriminator.property_name,
                schema = next.name().unwrap_or_default(),
                "resolved discriminator"
            );
            if same {
                return Ok(next);
            }
            visited.extend(current.name());
            current = next;
        }
    }

    fn dispatch(
        &self,
        discriminator: &'a Discriminator,
        value: &Value,
        definitions: Definitions<'a>,
        direction: Direction,
    ) -> Result<ResolvedSchema<'a>, ResolveError> {
        let key = match value.get(&discriminator.property_name) {
            Some(Value::Null) | None => {
                self.discriminator_default(discriminator, definitions, direction)?
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        let candidates: Vec<String> = match key {
            Some(key) => {
                let mut names: Vec<String> = discriminator
                    .mappings
                    .get(&key)
                    .cloned()
                    .into_iter()
                    .collect();
                if !names.contains(&key) {
                    names.push(key);
                }
                names
            }
            None => match &discriminator.default_mapping {
                Some(name) => vec![name.clone()],
                None => {
                    return Err(ResolveError::MissingDiscriminator {
                        property: discriminator.property_name.clone(),
                    })
                }
            },
        };

        for name in &candidates {
            if let Some((key, found)) = definitions.find_schema_entry(name) {
                let resolved = found.resolved(definitions)?;
                let name = resolved.name().unwrap_or(key);
                return Ok(resolved.named(name).at_least(self.existence()));
            }
        }
        Err(ResolveError::UnknownDiscriminatorValue { names: candidates })
    }

    fn discriminator_default(
        &self,
        discriminator: &Discriminator,
        definitions: Definitions<'a>,
        direction: Direction,
    ) -> Result<Option<String>, ResolveError> {
        let properties = self.resolve_properties(definitions, None)?;
        let Some(property) = properties.get(discriminator.property_name.as_str()) else {
            return Ok(None);
        };
        let schema = property.schema.resolved(definitions)?;
        Ok(schema
            .default_value(definitions, direction)
            .map(|default| match default {
                Value::String(s) => s,
                other => other.to_string(),
            }))
    }
}

fn collect_properties<'a>(
    schema: &'a Schema,
    definitions: Definitions<'a>,
    stack: &mut Vec<&'a str>,
    properties: &mut IndexMap<&'a str, &'a Property>,
) -> Result<(), ResolveError> {
    let Some(object) = schema.as_object() else {
        return Ok(());
    };
    for reference in &object.all_of {
        if stack.contains(&reference.name.as_str()) {
            return Err(ResolveError::CircularAllOf {
                name: reference.name.clone(),
            });
        }
        let parent = resolve_reference(reference, definitions)?;
        let concrete = parent.name().unwrap_or(reference.name.as_str());
        if concrete != reference.name && stack.contains(&concrete) {
            return Err(ResolveError::CircularAllOf {
                name: concrete.to_string(),
            });
        }
        stack.push(reference.name.as_str());
        stack.push(concrete);
        collect_properties(parent.schema(), definitions, stack, properties)?;
        stack.truncate(stack.len() - 2);
    }
    for (name, property) in &object.properties {
        properties.insert(name.as_str(), property);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{DefinitionsId, Registry};
    use serde_json::json;

    fn registry_with(schemas: Vec<(&str, Schema)>) -> (Registry, DefinitionsId) {
        let mut registry = Registry::new();
        let id = registry.create();
        {
            let mut defs = registry.definitions_mut(id).unwrap();
            for (name, schema) in schemas {
                defs.add_schema(name, schema).unwrap();
            }
        }
        (registry, id)
    }

    fn names(properties: &IndexMap<&str, &Property>) -> Vec<String> {
        properties.keys().map(|k| k.to_string()).collect()
    }

    #[test]
    fn deserializes_typed_schemas() {
        let schema: Schema = serde_json::from_value(json!({
            "type": "object",
            "existence": true,
            "properties": {
                "id": { "type": "integer", "minimum": 1, "read_only": true },
                "name": { "type": "string", "max_length": 20, "pattern": "^[a-z]+$" },
                "tags": { "type": "array", "items": { "type": "string" }, "max_items": 3 },
                "owner": { "ref": "User" }
            }
        }))
        .unwrap();

        assert_eq!(schema.existence, Existence::Present);
        let object = schema.as_object().unwrap();
        assert!(object.properties["id"].read_only);
        assert!(object.properties["owner"].schema.as_reference().is_some());
        let name = object.properties["name"].schema.as_item().unwrap();
        assert_eq!(name.validations().len(), 2);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let result: Result<Schema, _> =
            serde_json::from_value(json!({ "type": "string", "pattern": "(" }));
        assert!(result.is_err());
    }

    #[test]
    fn exclusive_bounds_deserialize() {
        let schema: Schema = serde_json::from_value(json!({
            "type": "number",
            "minimum": { "value": 0, "exclusive": true },
            "maximum": 10
        }))
        .unwrap();
        let checks: Vec<Option<String>> = schema
            .validations()
            .iter()
            .map(|v| v.check(&json!(0)))
            .collect();
        assert_eq!(checks[0].as_deref(), Some("must be greater than 0"));
        assert_eq!(checks[1], None);
    }

    #[test]
    fn validation_messages() {
        assert_eq!(
            Validation::MaxLength(2).check(&json!("abc")).as_deref(),
            Some("is too long (maximum is 2 characters)")
        );
        assert_eq!(
            Validation::MultipleOf(&Number::from(3)).check(&json!(7)).as_deref(),
            Some("must be a multiple of 3")
        );
        assert_eq!(Validation::MultipleOf(&Number::from(3)).check(&json!(9)), None);
        assert_eq!(Validation::MinItems(1).check(&json!("ignored")), None);
    }

    #[test]
    fn check_rejects_read_only_and_write_only() {
        let schema = Schema::object().property(
            "secret",
            Property::new(Schema::string()).read_only().write_only(),
        );
        assert!(matches!(
            schema.check(),
            Err(ConfigError::MutuallyExclusive { .. })
        ));
    }

    #[test]
    fn resolve_properties_merges_all_of_depth_first() {
        let (registry, id) = registry_with(vec![
            (
                "Base",
                Schema::object()
                    .property("id", Property::new(Schema::integer()).read_only())
                    .property("name", Property::new(Schema::string())),
            ),
            (
                "Named",
                Schema::object()
                    .all_of(Reference::new("Base"))
                    .property("name", Property::new(Schema::integer()))
                    .property("password", Property::new(Schema::string()).write_only()),
            ),
        ]);
        let defs = registry.definitions(id);
        let named = defs.find_schema("Named").unwrap().resolved(defs).unwrap();

        let all = named.resolve_properties(defs, None).unwrap();
        assert_eq!(names(&all), vec!["id", "name", "password"]);
        // later writer wins
        assert!(matches!(
            all["name"].schema.as_item().unwrap().kind,
            SchemaKind::Integer(_)
        ));

        let request = named.resolve_properties(defs, Some(Direction::Request)).unwrap();
        assert_eq!(names(&request), vec!["name", "password"]);
        let response = named.resolve_properties(defs, Some(Direction::Response)).unwrap();
        assert_eq!(names(&response), vec!["id", "name"]);
    }

    #[test]
    fn circular_all_of_is_an_error() {
        let (registry, id) = registry_with(vec![
            ("A", Schema::object().all_of(Reference::new("B"))),
            ("B", Schema::object().all_of(Reference::new("A"))),
        ]);
        let defs = registry.definitions(id);
        let a = defs.find_schema("A").unwrap().resolved(defs).unwrap();
        assert!(matches!(
            a.resolve_properties(defs, None),
            Err(ResolveError::CircularAllOf { .. })
        ));
    }

    #[test]
    fn diamond_all_of_is_not_circular() {
        let (registry, id) = registry_with(vec![
            ("Root", Schema::object().property("id", Property::new(Schema::integer()))),
            ("Left", Schema::object().all_of(Reference::new("Root"))),
            ("Right", Schema::object().all_of(Reference::new("Root"))),
            (
                "Both",
                Schema::object()
                    .all_of(Reference::new("Left"))
                    .all_of(Reference::new("Right")),
            ),
        ]);
        let defs = registry.definitions(id);
        let both = defs.find_schema("Both").unwrap().resolved(defs).unwrap();
        assert_eq!(names(&both.resolve_properties(defs, None).unwrap()), vec!["id"]);
    }

    fn polymorphic() -> (Registry, DefinitionsId) {
        registry_with(vec![
            (
                "Base",
                Schema::object()
                    .property(
                        "type",
                        Property::new(Schema::string().with_default(json!("foo"))),
                    )
                    .with_discriminator(Discriminator::new("type").mapping("foo", "Foo")),
            ),
            (
                "Foo",
                Schema::object()
                    .all_of(Reference::new("Base"))
                    .property("foo", Property::new(Schema::string())),
            ),
            ("Bar", Schema::object().all_of(Reference::new("Base"))),
        ])
    }

    #[test]
    fn resolve_schema_uses_mapping_then_value_as_name() {
        let (registry, id) = polymorphic();
        let defs = registry.definitions(id);
        let base = defs.find_schema("Base").unwrap().resolved(defs).unwrap();

        let foo = base
            .resolve_schema(&json!({ "type": "foo" }), defs, Direction::Response)
            .unwrap();
        assert_eq!(foo.name(), Some("Foo"));

        let bar = base
            .resolve_schema(&json!({ "type": "Bar" }), defs, Direction::Response)
            .unwrap();
        assert_eq!(bar.name(), Some("Bar"));
    }

    #[test]
    fn resolve_schema_falls_back_to_property_default() {
        let (registry, id) = polymorphic();
        let defs = registry.definitions(id);
        let base = defs.find_schema("Base").unwrap().resolved(defs).unwrap();
        let resolved = base
            .resolve_schema(&json!({ "foo": "bar" }), defs, Direction::Response)
            .unwrap();
        assert_eq!(resolved.name(), Some("Foo"));
    }

    #[test]
    fn resolve_schema_reports_attempted_names() {
        let (registry, id) = polymorphic();
        let defs = registry.definitions(id);
        let base = defs.find_schema("Base").unwrap().resolved(defs).unwrap();
        let err = base
            .resolve_schema(&json!({ "type": "Baz" }), defs, Direction::Response)
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownDiscriminatorValue {
                names: vec!["Baz".to_string()]
            }
        );
    }

    #[test]
    fn resolve_schema_without_value_or_default_fails() {
        let (registry, id) = registry_with(vec![(
            "Base",
            Schema::object()
                .property("kind", Property::new(Schema::string()))
                .with_discriminator(Discriminator::new("kind")),
        )]);
        let defs = registry.definitions(id);
        let base = defs.find_schema("Base").unwrap().resolved(defs).unwrap();
        let err = base
            .resolve_schema(&json!({}), defs, Direction::Request)
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingDiscriminator { .. }));
    }

    #[test]
    fn resolve_schema_uses_default_mapping() {
        let mut discriminator = Discriminator::new("kind");
        discriminator.default_mapping = Some("Other".into());
        let (registry, id) = registry_with(vec![
            ("Base", Schema::object().with_discriminator(discriminator)),
            ("Other", Schema::object().all_of(Reference::new("Base"))),
        ]);
        let defs = registry.definitions(id);
        let base = defs.find_schema("Base").unwrap().resolved(defs).unwrap();
        let resolved = base
            .resolve_schema(&json!({}), defs, Direction::Response)
            .unwrap();
        assert_eq!(resolved.name(), Some("Other"));
    }

    #[test]
    fn default_value_falls_back_to_type_default() {
        let mut registry = Registry::new();
        let id = registry.create();
        registry
            .definitions_mut(id)
            .unwrap()
            .add_default(SchemaType::Array, None, Some(json!([])))
            .unwrap();
        let defs = registry.definitions(id);
        let schema = Schema::array(Schema::string());
        assert_eq!(schema.default_value(defs, Direction::Response), Some(json!([])));
        assert_eq!(schema.default_value(defs, Direction::Request), None);
        let own = Schema::array(Schema::string()).with_default(json!(["x"]));
        assert_eq!(own.default_value(defs, Direction::Response), Some(json!(["x"])));
    }

    #[test]
    fn property_sources() {
        let object = json!({ "address": { "zip": "12345" }, "name": "n" });
        assert_eq!(
            Property::new(Schema::string()).read("name", &object),
            Some(json!("n"))
        );
        let zip = Property::new(Schema::string()).with_source(Source::path("address.zip"));
        assert_eq!(zip.read("zip", &object), Some(json!("12345")));
        let upper = Property::new(Schema::string()).with_source(Source::Reader(Reader::new(
            |o| o.get("name").and_then(Value::as_str).map(|s| json!(s.to_uppercase())),
        )));
        assert_eq!(upper.read("name", &object), Some(json!("N")));
    }
}
