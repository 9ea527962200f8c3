//! Typed API Definitions
//!
//! A registry of API definitions (schemas, parameters, request bodies,
//! responses, operations and the rest of an OpenAPI component set) that
//! generates OpenAPI 2.0 / 3.0 / 3.1 / 3.2 and JSON Schema documents, coerces
//! and validates request input, and serializes responses by their schemas.
//!
//! # Example
//!
//! ```
//! use apidef::{Method, Operation, Registry, Response, Schema, SchemaOrRef, Version};
//! use serde_json::json;
//!
//! let mut registry = Registry::new();
//! let id = registry.create();
//! let mut defs = registry.definitions_mut(id)?;
//! defs.add_schema("Pet", Schema::string())?;
//! defs.add_operation(
//!     "get_pet",
//!     Operation::new(Method::Get, "/pets/{id}")
//!         .response(200u16, Response::json(SchemaOrRef::reference("Pet"))),
//! )?;
//! defs.freeze();
//!
//! let document = registry.definitions(id).openapi_document(Version::V3_1)?;
//! assert_eq!(document["openapi"], json!("3.1.1"));
//! assert_eq!(
//!     document["paths"]["/pets/{id}"]["get"]["responses"]["200"]["content"]["application/json"]["schema"],
//!     json!({ "$ref": "#/components/schemas/Pet" })
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Existence Levels
//!
//! | Level | may be absent | may be `null` | may be empty |
//! |-------|---------------|---------------|--------------|
//! | `AllowOmitted` | yes | yes | yes |
//! | `AllowNil` | no | yes | yes |
//! | `AllowEmpty` | no | no | yes |
//! | `Present` | no | no | no |
//!
//! A reference may tighten the level of the schema it points at, never
//! loosen it.
//!
//! # Definitions Files
//!
//! The `apidef` binary and [`load_definitions`] read definitions from JSON:
//! ```json
//! { "schemas": { "Pet": { "type": "string" } }, "include": ["common.json"] }
//! ```

mod components;
mod definitions;
mod emit;
mod error;
mod json_schema;
mod jsonify;
mod linter;
mod loader;
mod media;
mod openapi;
mod params;
mod pathname;
mod reference;
mod schema;
mod status;
mod types;
mod validator;

pub use components::{
    ApiKeyIn, Callback, Contact, Content, Example, ExternalDocs, Header, Info, License, Link,
    Method, OAuthFlow, OAuthFlows, Operation, Parameter, ParameterIn, Path, RequestBody, Response,
    SecurityRequirement, SecurityScheme, Server, ServerVariable, Tag,
};
pub use definitions::{
    Attribute, Definitions, DefinitionsId, DefinitionsMut, PathAttribute, Registry,
};
pub use error::{
    ConfigError, Errors, LoadError, PathSegment, ReferenceError, ResolveError, SerializeError,
    SerializeErrorKind, ValidateError, ValidationError, WriteError,
};
pub use json_schema::document as json_schema_document;
pub use jsonify::{jsonify, write_json_seq, JsonifyOptions, Omit};
pub use linter::{lint, lint_definitions, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use loader::{
    is_url, load_definitions, load_definitions_str, load_value, load_value_auto, load_value_str,
    DefinitionsFile, TypeDefaults,
};
pub use media::{negotiate, AsMediaRange, MediaRange, MediaType};
pub use openapi::document as openapi_document;
pub use params::{JsonData, JsonObject, JsonValue, ParameterOptions, Parameters, RequestInput};
pub use pathname::Pathname;
pub use reference::{
    Component, ComponentKind, LazySchema, OrRef, Reference, ResolvedSchema, SchemaOrRef,
};
pub use schema::{
    AdditionalProperties, ArraySchema, Bound, Conversion, Discriminator, NumericSchema,
    ObjectSchema, ObjectValidator, Pattern, Property, Reader, Schema, SchemaKind, Source,
    StringSchema, Validation,
};
pub use status::Status;
pub use types::{is_empty_value, json_type_name, Direction, Existence, SchemaType, Version};
pub use validator::{validate, validate_against_schema};

#[cfg(feature = "remote")]
pub use loader::load_value_url;
