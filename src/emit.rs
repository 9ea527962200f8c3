//! Schema emission shared by the OpenAPI and JSON Schema generators.
//!
//! The dialects differ in where referenced schemas live, how nullability is
//! expressed and how exclusive bounds are written:
//!
//! | Dialect | `$ref` prefix | nullable | exclusive bounds |
//! |---------|---------------|----------|------------------|
//! | OpenAPI 2.0 | `#/definitions/` | not expressed | boolean flag |
//! | OpenAPI 3.0 | `#/components/schemas/` | `nullable: true` | boolean flag |
//! | OpenAPI 3.1+ | `#/components/schemas/` | `type: [T, "null"]` | numeric |
//! | JSON Schema | `#/definitions/` | `type: [T, "null"]` | numeric |

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::definitions::Definitions;
use crate::error::ResolveError;
use crate::reference::{resolve_reference, Component, OrRef, Reference, SchemaOrRef};
use crate::schema::{Bound, Schema, SchemaKind, Validation};
use crate::types::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenApi(Version),
    JsonSchema,
}

impl Dialect {
    fn schema_prefix(self) -> &'static str {
        match self {
            Dialect::OpenApi(Version::V2_0) | Dialect::JsonSchema => "#/definitions/",
            Dialect::OpenApi(_) => "#/components/schemas/",
        }
    }

    fn has_type_arrays(self) -> bool {
        match self {
            Dialect::OpenApi(version) => version >= Version::V3_1,
            Dialect::JsonSchema => true,
        }
    }

    fn is_swagger(self) -> bool {
        self == Dialect::OpenApi(Version::V2_0)
    }

    fn is_openapi(self) -> bool {
        matches!(self, Dialect::OpenApi(_))
    }
}

/// Pointer to the component `name` of `T` in an OpenAPI document of `version`.
pub(crate) fn component_pointer<T: Component>(version: Version, name: &str) -> String {
    use crate::reference::ComponentKind;

    let table = match (version, T::KIND) {
        (Version::V2_0, ComponentKind::Schema) => "definitions",
        (Version::V2_0, ComponentKind::Parameter) => "parameters",
        (Version::V2_0, ComponentKind::Response) => "responses",
        (Version::V2_0, ComponentKind::SecurityScheme) => "securityDefinitions",
        (_, kind) => return format!("#/components/{}/{}", kind.components_key(), name),
    };
    format!("#/{}/{}", table, name)
}

/// Merges `x-` extensions into `map`, prefixing names that lack it.
pub(crate) fn merge_extensions(map: &mut Map<String, Value>, extensions: &IndexMap<String, Value>) {
    for (name, value) in extensions {
        let key = if name.starts_with("x-") {
            name.clone()
        } else {
            format!("x-{}", name)
        };
        map.insert(key, value.clone());
    }
}

/// Inserts `value` under `key` unless it is `None`.
pub(crate) fn insert_some<T: Into<Value>>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value.into());
    }
}

pub(crate) struct Emitter<'a> {
    definitions: Definitions<'a>,
    dialect: Dialect,
    /// Schema the document is about; references to it become `#`.
    root: Option<String>,
    /// Names of every schema referenced so far, in order of first reference.
    referenced: Vec<String>,
}

impl<'a> Emitter<'a> {
    pub fn new(definitions: Definitions<'a>, dialect: Dialect) -> Self {
        Self {
            definitions,
            dialect,
            root: None,
            referenced: Vec::new(),
        }
    }

    pub fn with_root(mut self, name: &str) -> Self {
        self.root = Some(name.to_string());
        self
    }

    pub fn referenced(&self) -> &[String] {
        &self.referenced
    }

    /// Emits a schema or a pointer to it.
    pub fn schema_or_ref(&mut self, schema: &'a SchemaOrRef) -> Result<Value, ResolveError> {
        match schema {
            OrRef::Item(schema) => self.schema(schema, true),
            OrRef::Ref(reference) => self.reference(reference),
        }
    }

    /// Emits a body schema. A body is never marked nullable itself.
    pub fn content_schema(&mut self, schema: &'a SchemaOrRef) -> Result<Value, ResolveError> {
        match schema {
            OrRef::Item(schema) => self.schema(schema, false),
            OrRef::Ref(reference) => self.reference(reference),
        }
    }

    /// Emits the concrete schema at the end of `schema`'s reference chain.
    ///
    /// Used where the dialect can't point to a schema, e.g. OpenAPI 2.0
    /// parameters.
    pub fn inline(&mut self, schema: &'a SchemaOrRef) -> Result<Value, ResolveError> {
        let resolved = schema.resolved(self.definitions)?;
        self.schema(resolved.schema(), true)
    }

    fn reference(&mut self, reference: &'a Reference) -> Result<Value, ResolveError> {
        resolve_reference(reference, self.definitions)?;
        if !self.referenced.contains(&reference.name) {
            self.referenced.push(reference.name.clone());
        }
        let pointer = if self.root.as_deref() == Some(reference.name.as_str()) {
            "#".to_string()
        } else {
            format!("{}{}", self.dialect.schema_prefix(), reference.name)
        };
        let mut map = Map::new();
        map.insert("$ref".to_string(), Value::String(pointer));
        if self.dialect.has_type_arrays() {
            insert_some(&mut map, "description", reference.description.clone());
        }
        Ok(Value::Object(map))
    }

    fn schema(&mut self, schema: &'a Schema, allow_null: bool) -> Result<Value, ResolveError> {
        let mut map = Map::new();
        let nullable = allow_null && schema.existence.is_nullable() && !self.dialect.is_swagger();
        let type_name = schema.schema_type().as_str();

        if nullable && self.dialect.has_type_arrays() {
            map.insert("type".to_string(), json!([type_name, "null"]));
        } else {
            map.insert("type".to_string(), json!(type_name));
            if nullable {
                map.insert("nullable".to_string(), Value::Bool(true));
            }
        }

        insert_some(&mut map, "title", schema.title.clone());
        insert_some(&mut map, "description", schema.description.clone());
        insert_some(&mut map, "default", schema.default.clone());
        if let Some(values) = &schema.enum_values {
            let mut values = values.clone();
            if nullable && self.dialect.has_type_arrays() && !values.contains(&Value::Null) {
                values.push(Value::Null);
            }
            map.insert("enum".to_string(), Value::Array(values));
        }

        match &schema.kind {
            SchemaKind::String(string) => {
                insert_some(&mut map, "format", string.format.clone());
            }
            SchemaKind::Array(array) => {
                let items = self.schema_or_ref(&array.items)?;
                map.insert("items".to_string(), items);
            }
            SchemaKind::Object(_) => self.object(schema, &mut map)?,
            SchemaKind::Number(_) | SchemaKind::Integer(_) | SchemaKind::Boolean => {}
        }

        for validation in schema.validations() {
            self.validation(validation, &mut map);
        }

        if schema.deprecated && !self.dialect.is_swagger() {
            map.insert("deprecated".to_string(), Value::Bool(true));
        }
        if self.dialect.is_openapi() {
            if let Some(docs) = &schema.external_docs {
                map.insert("externalDocs".to_string(), external_docs(docs));
            }
        }
        if !schema.examples.is_empty() {
            if self.dialect.has_type_arrays() {
                map.insert("examples".to_string(), Value::Array(schema.examples.clone()));
            } else {
                map.insert("example".to_string(), schema.examples[0].clone());
            }
        }
        merge_extensions(&mut map, &schema.extensions);
        Ok(Value::Object(map))
    }

    fn object(&mut self, schema: &'a Schema, map: &mut Map<String, Value>) -> Result<(), ResolveError> {
        let Some(object) = schema.as_object() else {
            return Ok(());
        };

        if !object.all_of.is_empty() {
            let parents = object
                .all_of
                .iter()
                .map(|reference| self.reference(reference))
                .collect::<Result<Vec<_>, _>>()?;
            map.insert("allOf".to_string(), Value::Array(parents));
        }

        if !object.properties.is_empty() {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for (name, property) in &object.properties {
                let mut value = self.schema_or_ref(&property.schema)?;
                if let Value::Object(fields) = &mut value {
                    if property.read_only {
                        fields.insert("readOnly".to_string(), Value::Bool(true));
                    }
                    if property.write_only && !self.dialect.is_swagger() {
                        fields.insert("writeOnly".to_string(), Value::Bool(true));
                    }
                }
                if property.schema.resolved(self.definitions)?.is_required() {
                    required.push(Value::String(name.clone()));
                }
                properties.insert(name.clone(), value);
            }
            map.insert("properties".to_string(), Value::Object(properties));
            if !required.is_empty() {
                map.insert("required".to_string(), Value::Array(required));
            }
        }

        if let Some(additional) = &object.additional_properties {
            let value = self.schema_or_ref(&additional.schema)?;
            map.insert("additionalProperties".to_string(), value);
        }

        if let (Some(discriminator), Dialect::OpenApi(version)) = (&object.discriminator, self.dialect) {
            if version.is_swagger() {
                map.insert(
                    "discriminator".to_string(),
                    Value::String(discriminator.property_name.clone()),
                );
            } else {
                let mut value = Map::new();
                value.insert(
                    "propertyName".to_string(),
                    Value::String(discriminator.property_name.clone()),
                );
                if !discriminator.mappings.is_empty() {
                    let mappings = discriminator
                        .mappings
                        .iter()
                        .map(|(key, name)| {
                            (key.clone(), Value::String(format!("{}{}", self.dialect.schema_prefix(), name)))
                        })
                        .collect();
                    value.insert("mapping".to_string(), Value::Object(mappings));
                }
                if version >= Version::V3_2 {
                    if let Some(name) = &discriminator.default_mapping {
                        value.insert(
                            "defaultMapping".to_string(),
                            Value::String(format!("{}{}", self.dialect.schema_prefix(), name)),
                        );
                    }
                }
                map.insert("discriminator".to_string(), Value::Object(value));
            }
        }
        Ok(())
    }

    fn validation(&self, validation: Validation<'_>, map: &mut Map<String, Value>) {
        match validation {
            Validation::Minimum(bound) => self.bound("minimum", "exclusiveMinimum", bound, map),
            Validation::Maximum(bound) => self.bound("maximum", "exclusiveMaximum", bound, map),
            Validation::MultipleOf(n) => {
                map.insert("multipleOf".to_string(), Value::Number(n.clone()));
            }
            Validation::MinLength(n) => {
                map.insert("minLength".to_string(), json!(n));
            }
            Validation::MaxLength(n) => {
                map.insert("maxLength".to_string(), json!(n));
            }
            Validation::Pattern(pattern) => {
                map.insert("pattern".to_string(), json!(pattern.as_str()));
            }
            Validation::MinItems(n) => {
                map.insert("minItems".to_string(), json!(n));
            }
            Validation::MaxItems(n) => {
                map.insert("maxItems".to_string(), json!(n));
            }
        }
    }

    fn bound(&self, key: &str, exclusive_key: &str, bound: &Bound, map: &mut Map<String, Value>) {
        let value = Value::Number(bound.value.clone());
        if !bound.exclusive {
            map.insert(key.to_string(), value);
        } else if self.dialect.has_type_arrays() {
            map.insert(exclusive_key.to_string(), value);
        } else {
            map.insert(key.to_string(), value);
            map.insert(exclusive_key.to_string(), Value::Bool(true));
        }
    }
}

pub(crate) fn external_docs(docs: &crate::components::ExternalDocs) -> Value {
    let mut map = Map::new();
    map.insert("url".to_string(), Value::String(docs.url.clone()));
    insert_some(&mut map, "description", docs.description.clone());
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Registry;
    use crate::schema::{Discriminator, NumericSchema, Property};
    use crate::types::Existence;

    fn emit(dialect: Dialect, schema: &Schema) -> Value {
        let mut registry = Registry::new();
        let id = registry.create();
        registry
            .definitions_mut(id)
            .unwrap()
            .add_schema("Pet", Schema::object())
            .unwrap();
        let defs = registry.definitions(id);
        let schema = SchemaOrRef::Item(schema.clone());
        let value = Emitter::new(defs, dialect).schema_or_ref(&schema).unwrap();
        value
    }

    #[test]
    fn nullability_per_dialect() {
        let schema = Schema::string().with_existence(Existence::AllowNil);
        assert_eq!(
            emit(Dialect::OpenApi(Version::V2_0), &schema),
            json!({ "type": "string" })
        );
        assert_eq!(
            emit(Dialect::OpenApi(Version::V3_0), &schema),
            json!({ "type": "string", "nullable": true })
        );
        assert_eq!(
            emit(Dialect::OpenApi(Version::V3_1), &schema),
            json!({ "type": ["string", "null"] })
        );
        let present = Schema::string().with_existence(Existence::Present);
        assert_eq!(
            emit(Dialect::JsonSchema, &present),
            json!({ "type": "string" })
        );
    }

    #[test]
    fn exclusive_bounds_per_dialect() {
        let schema = Schema::new(SchemaKind::Integer(NumericSchema {
            minimum: Some(Bound::exclusive(0)),
            maximum: Some(Bound::inclusive(9)),
            ..NumericSchema::default()
        }))
        .with_existence(Existence::Present);
        assert_eq!(
            emit(Dialect::OpenApi(Version::V3_0), &schema),
            json!({ "type": "integer", "minimum": 0, "exclusiveMinimum": true, "maximum": 9 })
        );
        assert_eq!(
            emit(Dialect::OpenApi(Version::V3_1), &schema),
            json!({ "type": "integer", "exclusiveMinimum": 0, "maximum": 9 })
        );
    }

    #[test]
    fn objects_with_required_properties_and_references() {
        let schema = Schema::object()
            .with_existence(Existence::Present)
            .property(
                "id",
                Property::new(Schema::integer().with_existence(Existence::Present)).read_only(),
            )
            .property("pet", Property::new(SchemaOrRef::reference("Pet")))
            .with_discriminator(Discriminator::new("kind").mapping("dog", "Pet"));

        assert_eq!(
            emit(Dialect::OpenApi(Version::V3_0), &schema),
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer", "readOnly": true },
                    "pet": { "$ref": "#/components/schemas/Pet" }
                },
                "required": ["id"],
                "discriminator": {
                    "propertyName": "kind",
                    "mapping": { "dog": "#/components/schemas/Pet" }
                }
            })
        );
        assert_eq!(
            emit(Dialect::OpenApi(Version::V2_0), &schema)["discriminator"],
            json!("kind")
        );
    }

    #[test]
    fn broken_references_are_errors() {
        let mut registry = Registry::new();
        let id = registry.create();
        let defs = registry.definitions(id);
        let schema = SchemaOrRef::reference("Missing");
        let err = Emitter::new(defs, Dialect::JsonSchema)
            .schema_or_ref(&schema)
            .unwrap_err();
        assert_eq!(err.to_string(), "schema reference can't be resolved: Missing");
    }

    #[test]
    fn extensions_come_last_and_are_prefixed() {
        let mut schema = Schema::boolean().with_existence(Existence::Present);
        schema.extensions.insert("internal".into(), json!(true));
        schema.extensions.insert("x-owner".into(), json!("team"));
        assert_eq!(
            emit(Dialect::OpenApi(Version::V3_1), &schema),
            json!({ "type": "boolean", "x-internal": true, "x-owner": "team" })
        );
    }

    #[test]
    fn component_pointers() {
        assert_eq!(
            component_pointer::<crate::components::Parameter>(Version::V2_0, "page"),
            "#/parameters/page"
        );
        assert_eq!(
            component_pointer::<crate::components::Example>(Version::V3_1, "one"),
            "#/components/examples/one"
        );
    }
}
