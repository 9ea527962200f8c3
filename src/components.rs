//! Reusable API components: parameters, bodies, responses, operations and paths.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::definitions::Definitions;
use crate::error::ConfigError;
use crate::media::{MediaRange, MediaType};
use crate::pathname::Pathname;
use crate::reference::{OrRef, SchemaOrRef};
use crate::schema::check_schema_or_ref;
use crate::status::Status;
use crate::types::{deserialize_from_str, Existence};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExternalDocs {
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub name: Option<String>,
    pub url: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct License {
    pub name: String,
    pub url: Option<String>,
    /// SPDX identifier, emitted from OpenAPI 3.1 onward.
    pub identifier: Option<String>,
}

/// Document-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Info {
    pub title: String,
    pub version: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub terms_of_service: Option<String>,
    pub contact: Option<Contact>,
    pub license: Option<License>,
    pub extensions: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerVariable {
    pub default: String,
    #[serde(default, rename = "enum")]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: IndexMap<String, ServerVariable>,
}

impl Server {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_docs: Option<ExternalDocs>,
    #[serde(default)]
    pub extensions: IndexMap<String, Value>,
}

/// Security scheme names mapped to the scopes required of each.
///
/// All schemes of one requirement must be satisfied; an empty requirement
/// makes security optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecurityRequirement {
    pub schemes: IndexMap<String, Vec<String>>,
}

impl SecurityRequirement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheme(mut self, name: impl Into<String>, scopes: Vec<String>) -> Self {
        self.schemes.insert(name.into(), scopes);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterIn {
    Header,
    Path,
    Query,
    /// The whole query string as one object. Never exploded.
    Querystring,
    Cookie,
}

impl ParameterIn {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterIn::Header => "header",
            ParameterIn::Path => "path",
            ParameterIn::Query => "query",
            ParameterIn::Querystring => "querystring",
            ParameterIn::Cookie => "cookie",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterIn,
    pub schema: SchemaOrRef,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub examples: IndexMap<String, OrRef<Example>>,
    #[serde(default)]
    pub extensions: IndexMap<String, Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, location: ParameterIn, schema: impl Into<SchemaOrRef>) -> Self {
        Self {
            name: name.into(),
            location,
            schema: schema.into(),
            description: None,
            deprecated: false,
            examples: IndexMap::new(),
            extensions: IndexMap::new(),
        }
    }

    pub fn query(name: impl Into<String>, schema: impl Into<SchemaOrRef>) -> Self {
        Self::new(name, ParameterIn::Query, schema)
    }

    pub fn path(name: impl Into<String>, schema: impl Into<SchemaOrRef>) -> Self {
        Self::new(name, ParameterIn::Path, schema)
    }

    pub fn header(name: impl Into<String>, schema: impl Into<SchemaOrRef>) -> Self {
        Self::new(name, ParameterIn::Header, schema)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::BlankName {
                kind: "parameter".to_string(),
            });
        }
        check_schema_or_ref(&self.schema)?;
        check_examples(&self.examples)
    }
}

/// A schema bound to one media type or range.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Content {
    pub schema: Option<SchemaOrRef>,
    pub examples: IndexMap<String, OrRef<Example>>,
    pub extensions: IndexMap<String, Value>,
}

impl Content {
    pub fn new(schema: impl Into<SchemaOrRef>) -> Self {
        Self {
            schema: Some(schema.into()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if let Some(schema) = &self.schema {
            check_schema_or_ref(schema)?;
        }
        check_examples(&self.examples)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestBody {
    #[serde(rename = "content")]
    pub contents: IndexMap<MediaRange, Content>,
    pub description: Option<String>,
    pub existence: Existence,
    pub extensions: IndexMap<String, Value>,
}

impl RequestBody {
    /// A body accepting `application/json`.
    pub fn json(schema: impl Into<SchemaOrRef>) -> Self {
        let mut contents = IndexMap::new();
        contents.insert(MediaRange::from(MediaType::json()), Content::new(schema));
        Self {
            contents,
            ..Self::default()
        }
    }

    pub fn is_required(&self) -> bool {
        self.existence.is_required()
    }

    /// The content for a body of `media_type`, the first if none matches.
    pub fn content_for(&self, media_type: Option<&MediaType>) -> Option<(&MediaRange, &Content)> {
        media_type
            .and_then(|media_type| {
                self.contents
                    .iter()
                    .filter(|(range, _)| range.matches(media_type))
                    .min_by_key(|(range, _)| range.priority())
            })
            .or_else(|| self.contents.first())
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.contents.values().try_for_each(Content::check)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Response {
    #[serde(rename = "content")]
    pub contents: IndexMap<MediaType, Content>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub headers: IndexMap<String, OrRef<Header>>,
    pub links: IndexMap<String, OrRef<Link>>,
    /// Locale of the response body, sent as `Content-Language`.
    pub locale: Option<String>,
    /// Used at runtime but left out of generated documents.
    pub nodoc: bool,
    pub extensions: IndexMap<String, Value>,
}

impl Response {
    pub fn json(schema: impl Into<SchemaOrRef>) -> Self {
        let mut contents = IndexMap::new();
        contents.insert(MediaType::json(), Content::new(schema));
        Self {
            contents,
            ..Self::default()
        }
    }

    pub fn with_content(mut self, media_type: MediaType, content: Content) -> Self {
        self.contents.insert(media_type, content);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Selects the content to respond with for the client's accepted ranges.
    pub fn content_for(&self, accepted: &[MediaRange]) -> Option<(&MediaType, &Content)> {
        crate::media::negotiate(&self.contents, accepted)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.contents.values().try_for_each(Content::check)?;
        for (name, header) in &self.headers {
            if name.trim().is_empty() {
                return Err(ConfigError::BlankName {
                    kind: "header".to_string(),
                });
            }
            if let OrRef::Item(header) = header {
                check_schema_or_ref(&header.schema)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub schema: SchemaOrRef,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub extensions: IndexMap<String, Value>,
}

impl Header {
    pub fn new(schema: impl Into<SchemaOrRef>) -> Self {
        Self {
            schema: schema.into(),
            description: None,
            deprecated: false,
            extensions: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Example {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub value: Option<Value>,
    /// URL of an example too large to embed.
    pub external_value: Option<String>,
    pub extensions: IndexMap<String, Value>,
}

impl Example {
    pub fn value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.value.is_some() && self.external_value.is_some() {
            return Err(ConfigError::MutuallyExclusive {
                first: "value".to_string(),
                second: "external_value".to_string(),
            });
        }
        Ok(())
    }
}

fn check_examples(examples: &IndexMap<String, OrRef<Example>>) -> Result<(), ConfigError> {
    examples
        .values()
        .filter_map(OrRef::as_item)
        .try_for_each(Example::check)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Link {
    pub operation_id: Option<String>,
    pub parameters: IndexMap<String, Value>,
    pub request_body: Option<Value>,
    pub description: Option<String>,
    pub server: Option<Server>,
    pub extensions: IndexMap<String, Value>,
}

/// Operations the API calls back, keyed by runtime expression.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Callback {
    pub expressions: IndexMap<String, Vec<Operation>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyIn {
    Query,
    Header,
    Cookie,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OAuthFlow {
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub refresh_url: Option<String>,
    pub device_authorization_url: Option<String>,
    pub scopes: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OAuthFlows {
    pub implicit: Option<OAuthFlow>,
    pub password: Option<OAuthFlow>,
    pub client_credentials: Option<OAuthFlow>,
    pub authorization_code: Option<OAuthFlow>,
    /// OpenAPI 3.2 only.
    pub device_authorization: Option<OAuthFlow>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum SecurityScheme {
    #[serde(rename = "apiKey")]
    ApiKey {
        name: String,
        #[serde(rename = "in")]
        location: ApiKeyIn,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "http")]
    Http {
        scheme: String,
        #[serde(default)]
        bearer_format: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        flows: OAuthFlows,
        #[serde(default)]
        oauth2_metadata_url: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "openIdConnect")]
    OpenIdConnect {
        open_id_connect_url: String,
        #[serde(default)]
        description: Option<String>,
    },
    /// OpenAPI 3.1 onward.
    #[serde(rename = "mutualTLS")]
    MutualTls {
        #[serde(default)]
        description: Option<String>,
    },
}

impl SecurityScheme {
    pub fn type_name(&self) -> &'static str {
        match self {
            SecurityScheme::ApiKey { .. } => "apiKey",
            SecurityScheme::Http { .. } => "http",
            SecurityScheme::OAuth2 { .. } => "oauth2",
            SecurityScheme::OpenIdConnect { .. } => "openIdConnect",
            SecurityScheme::MutualTls { .. } => "mutualTLS",
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            SecurityScheme::ApiKey { description, .. }
            | SecurityScheme::Http { description, .. }
            | SecurityScheme::OAuth2 { description, .. }
            | SecurityScheme::OpenIdConnect { description, .. }
            | SecurityScheme::MutualTls { description } => description.as_deref(),
        }
    }
}

/// HTTP method of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
    /// OpenAPI 3.2 onward.
    Query,
    /// Any other method, lowercased.
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "get",
            Method::Put => "put",
            Method::Post => "post",
            Method::Delete => "delete",
            Method::Options => "options",
            Method::Head => "head",
            Method::Patch => "patch",
            Method::Trace => "trace",
            Method::Query => "query",
            Method::Other(name) => name,
        }
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Ok(match s.as_str() {
            "" => {
                return Err(ConfigError::BlankName {
                    kind: "method".to_string(),
                })
            }
            "get" => Method::Get,
            "put" => Method::Put,
            "post" => Method::Post,
            "delete" => Method::Delete,
            "options" => Method::Options,
            "head" => Method::Head,
            "patch" => Method::Patch,
            "trace" => Method::Trace,
            "query" => Method::Query,
            _ => Method::Other(s),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

deserialize_from_str!(Method, "an HTTP method");

/// One method on one path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Operation {
    /// Set from the registry key when added.
    pub name: String,
    pub method: Method,
    pub path: Pathname,
    pub parent_path: Pathname,
    pub parameters: Vec<OrRef<Parameter>>,
    pub request_body: Option<OrRef<RequestBody>>,
    pub responses: IndexMap<Status, OrRef<Response>>,
    /// `Some(vec![])` disables security inherited from paths and the registry.
    pub security: Option<Vec<SecurityRequirement>>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub servers: Vec<Server>,
    pub callbacks: IndexMap<String, OrRef<Callback>>,
    pub external_docs: Option<ExternalDocs>,
    pub extensions: IndexMap<String, Value>,
}

impl Operation {
    pub fn new(method: Method, path: impl Into<Pathname>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn parameter(mut self, parameter: impl Into<OrRef<Parameter>>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    pub fn with_request_body(mut self, body: impl Into<OrRef<RequestBody>>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    pub fn response(mut self, status: impl Into<Status>, response: impl Into<OrRef<Response>>) -> Self {
        self.responses.insert(status.into(), response.into());
        self
    }

    /// `parent_path` joined with `path`.
    pub fn full_path(&self) -> Pathname {
        &self.parent_path + &self.path
    }

    /// The response for `code`, including responses shared through paths
    /// and ancestors. Exact codes win over ranges, ranges over `default`.
    pub fn response_for<'a>(
        &'a self,
        definitions: Definitions<'a>,
        code: u16,
    ) -> Option<&'a OrRef<Response>> {
        let responses = definitions.operation_responses(self);
        let status = Status::select(responses.keys(), code)?;
        responses.get(&status).copied()
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        for parameter in &self.parameters {
            if let OrRef::Item(parameter) = parameter {
                parameter.check()?;
            }
        }
        if let Some(OrRef::Item(body)) = &self.request_body {
            body.check()?;
        }
        for response in self.responses.values() {
            if let OrRef::Item(response) = response {
                response.check()?;
            }
        }
        for callback in self.callbacks.values() {
            if let OrRef::Item(callback) = callback {
                callback.check()?;
            }
        }
        Ok(())
    }
}

impl Callback {
    pub fn check(&self) -> Result<(), ConfigError> {
        for (expression, operations) in &self.expressions {
            if expression.trim().is_empty() {
                return Err(ConfigError::BlankName {
                    kind: "callback expression".to_string(),
                });
            }
            operations.iter().try_for_each(Operation::check)?;
        }
        Ok(())
    }
}

/// Defaults shared by every operation below a pathname.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Path {
    pub parameters: Vec<OrRef<Parameter>>,
    pub responses: IndexMap<Status, OrRef<Response>>,
    pub servers: Vec<Server>,
    pub tags: Vec<String>,
    pub security: Vec<SecurityRequirement>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub extensions: IndexMap<String, Value>,
}

impl Path {
    pub fn check(&self) -> Result<(), ConfigError> {
        for parameter in &self.parameters {
            if let OrRef::Item(parameter) = parameter {
                parameter.check()?;
            }
        }
        for response in self.responses.values() {
            if let OrRef::Item(response) = response {
                response.check()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    #[test]
    fn deserializes_an_operation() {
        let operation: Operation = serde_json::from_value(json!({
            "method": "POST",
            "path": "/users",
            "parameters": [
                { "name": "dry_run", "in": "query", "schema": { "type": "boolean" } },
                { "ref": "Locale" }
            ],
            "request_body": { "content": { "application/json": { "schema": { "ref": "User" } } } },
            "responses": {
                "201": { "content": { "application/json": { "schema": { "ref": "User" } } } },
                "4XX": { "ref": "Error" },
                "default": { "description": "unexpected", "nodoc": true }
            },
            "security": [{ "api_key": [] }]
        }))
        .unwrap();

        assert_eq!(operation.method, Method::Post);
        assert_eq!(operation.parameters.len(), 2);
        assert!(operation.parameters[1].as_reference().is_some());
        assert_eq!(
            operation.responses.keys().copied().collect::<Vec<_>>(),
            vec![Status::Code(201), Status::Range(4), Status::Default]
        );
        assert!(operation.responses[&Status::Default].as_item().unwrap().nodoc);
        assert_eq!(operation.security.unwrap()[0].schemes["api_key"], Vec::<String>::new());
    }

    #[test]
    fn non_standard_methods_are_kept() {
        assert_eq!("PURGE".parse::<Method>().unwrap(), Method::Other("purge".into()));
        assert_eq!("Query".parse::<Method>().unwrap(), Method::Query);
        assert!("".parse::<Method>().is_err());
    }

    #[test]
    fn full_path_joins_parent() {
        let mut operation = Operation::new(Method::Get, "{id}");
        operation.parent_path = Pathname::new("/users");
        assert_eq!(operation.full_path().to_string(), "/users/{id}");
    }

    #[test]
    fn example_value_and_external_value_are_exclusive() {
        let example = Example {
            value: Some(json!(1)),
            external_value: Some("https://example.com/1.json".into()),
            ..Example::default()
        };
        assert!(matches!(
            example.check(),
            Err(ConfigError::MutuallyExclusive { .. })
        ));
    }

    #[test]
    fn security_schemes_deserialize_by_type() {
        let scheme: SecurityScheme = serde_json::from_value(json!({
            "type": "apiKey", "name": "X-API-Key", "in": "header"
        }))
        .unwrap();
        assert_eq!(scheme.type_name(), "apiKey");

        let scheme: SecurityScheme = serde_json::from_value(json!({
            "type": "oauth2",
            "flows": { "client_credentials": { "token_url": "https://auth/token", "scopes": { "read": "Read" } } }
        }))
        .unwrap();
        let SecurityScheme::OAuth2 { flows, .. } = scheme else {
            panic!("expected oauth2");
        };
        assert_eq!(flows.client_credentials.unwrap().scopes["read"], "Read");
    }

    #[test]
    fn request_body_content_selection() {
        let mut body = RequestBody::json(Schema::object());
        body.contents.insert("text/*".parse().unwrap(), Content::new(Schema::string()));
        let text: MediaType = "text/plain".parse().unwrap();
        assert_eq!(body.content_for(Some(&text)).unwrap().0.to_string(), "text/*");
        assert_eq!(
            body.content_for(None).unwrap().0.to_string(),
            "application/json"
        );
    }
}
