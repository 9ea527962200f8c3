//! Definitions loading from files, strings, and HTTP URLs.
//!
//! A definitions file is a JSON object whose keys map onto the registry's
//! `add_*` operations:
//!
//! ```json
//! {
//!   "info": { "title": "Pets", "version": "1.0" },
//!   "include": ["common.json"],
//!   "schemas": { "Pet": { "type": "object", "properties": { "name": { "type": "string" } } } },
//!   "operations": {
//!     "list_pets": {
//!       "method": "get",
//!       "path": "/pets",
//!       "responses": { "200": { "content": { "application/json": { "schema": { "ref": "Pet" } } } } }
//!     }
//!   }
//! }
//! ```
//!
//! `include` and `parent` name other definitions files relative to the file
//! that names them. Every loaded node is frozen once loading is complete.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::components::{
    Callback, Example, ExternalDocs, Header, Info, Link, Operation, Parameter,
    Path as PathDefaults, RequestBody, Response, SecurityRequirement, SecurityScheme, Server, Tag,
};
use crate::definitions::{DefinitionsId, DefinitionsMut, Registry};
use crate::error::{ConfigError, LoadError};
use crate::reference::{OrRef, SchemaOrRef};
use crate::types::SchemaType;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Type-level defaults of one schema type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeDefaults {
    pub within_requests: Option<Value>,
    pub within_responses: Option<Value>,
}

/// The contents of one definitions file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefinitionsFile {
    pub include: Vec<String>,
    pub parent: Option<String>,
    pub info: Option<Info>,
    pub external_docs: Option<ExternalDocs>,
    pub servers: Vec<Server>,
    pub tags: Vec<Tag>,
    pub security: Vec<SecurityRequirement>,
    pub schemas: IndexMap<String, SchemaOrRef>,
    pub parameters: IndexMap<String, OrRef<Parameter>>,
    pub request_bodies: IndexMap<String, OrRef<RequestBody>>,
    pub responses: IndexMap<String, OrRef<Response>>,
    pub examples: IndexMap<String, OrRef<Example>>,
    pub headers: IndexMap<String, OrRef<Header>>,
    pub links: IndexMap<String, OrRef<Link>>,
    pub callbacks: IndexMap<String, OrRef<Callback>>,
    pub security_schemes: IndexMap<String, OrRef<SecurityScheme>>,
    pub paths: IndexMap<String, PathDefaults>,
    pub operations: IndexMap<String, Operation>,
    pub defaults: IndexMap<SchemaType, TypeDefaults>,
    pub extensions: IndexMap<String, Value>,
}

impl DefinitionsFile {
    /// Adds everything but `include` and `parent` to `definitions`.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` raised by an `add_*` operation.
    pub fn apply(self, definitions: &mut DefinitionsMut<'_>) -> Result<(), ConfigError> {
        if let Some(info) = self.info {
            definitions.set_info(info)?;
        }
        if let Some(external_docs) = self.external_docs {
            definitions.set_external_docs(external_docs)?;
        }
        for server in self.servers {
            definitions.add_server(server)?;
        }
        for tag in self.tags {
            definitions.add_tag(tag)?;
        }
        for requirement in self.security {
            definitions.add_security_requirement(requirement)?;
        }
        for (name, schema) in self.schemas {
            definitions.add_schema(name, schema)?;
        }
        for (name, parameter) in self.parameters {
            definitions.add_parameter(name, parameter)?;
        }
        for (name, body) in self.request_bodies {
            definitions.add_request_body(name, body)?;
        }
        for (name, response) in self.responses {
            definitions.add_response(name, response)?;
        }
        for (name, example) in self.examples {
            definitions.add_example(name, example)?;
        }
        for (name, header) in self.headers {
            definitions.add_header(name, header)?;
        }
        for (name, link) in self.links {
            definitions.add_link(name, link)?;
        }
        for (name, callback) in self.callbacks {
            definitions.add_callback(name, callback)?;
        }
        for (name, scheme) in self.security_schemes {
            definitions.add_security_scheme(name, scheme)?;
        }
        for (pathname, path) in self.paths {
            definitions.add_path(pathname.as_str(), path)?;
        }
        for (name, operation) in self.operations {
            definitions.add_operation(name, operation)?;
        }
        for (schema_type, defaults) in self.defaults {
            definitions.add_default(schema_type, defaults.within_requests, defaults.within_responses)?;
        }
        for (name, value) in self.extensions {
            definitions.add_extension(name, value)?;
        }
        Ok(())
    }
}

/// Load a JSON value from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_value(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_value_str(&content)
}

/// Load a JSON value from a string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_value_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a JSON value from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the response
/// isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_value_url(url: &str) -> Result<Value, LoadError> {
    let network = |source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    tracing::debug!(url, "fetching definitions");
    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a JSON value from a file path or URL.
///
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_value_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_value_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: PathBuf::from(source),
            })
        }
    } else {
        load_value(Path::new(source))
    }
}

/// Loads the definitions file at `source` (a path or URL) into `registry`.
///
/// Returns the node holding the file's own definitions.
///
/// # Errors
///
/// Returns `LoadError` if any file can't be read or parsed, or if adding
/// its contents to the registry fails.
pub fn load_definitions(registry: &mut Registry, source: &str) -> Result<DefinitionsId, LoadError> {
    let mut loader = Loader::new(registry);
    let id = loader.load(source, Edge::Root)?;
    loader.freeze()?;
    Ok(id)
}

/// Loads definitions from a JSON string. `include` and `parent` are
/// resolved relative to the current directory.
///
/// # Errors
///
/// Returns `LoadError` if the string or an included file can't be parsed,
/// or if adding the contents to the registry fails.
pub fn load_definitions_str(registry: &mut Registry, content: &str) -> Result<DefinitionsId, LoadError> {
    let value = load_value_str(content)?;
    let mut loader = Loader::new(registry);
    let id = loader.registry.create();
    loader.populate(id, "<string>", "./", value)?;
    loader.loaded.insert("<string>".to_string(), id);
    loader.freeze()?;
    Ok(id)
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Root,
    Include,
    Parent,
}

struct Loader<'r> {
    registry: &'r mut Registry,
    loaded: HashMap<String, DefinitionsId>,
    loading: Vec<String>,
}

impl<'r> Loader<'r> {
    fn new(registry: &'r mut Registry) -> Self {
        Self {
            registry,
            loaded: HashMap::new(),
            loading: Vec::new(),
        }
    }

    fn load(&mut self, source: &str, edge: Edge) -> Result<DefinitionsId, LoadError> {
        let key = canonical(source);
        if let Some(&id) = self.loaded.get(&key) {
            if self.loading.contains(&key) {
                let error = match edge {
                    Edge::Parent => ConfigError::CircularParent { id: id.index() },
                    Edge::Root | Edge::Include => ConfigError::CircularInclude { id: id.index() },
                };
                return Err(LoadError::Config {
                    origin: source.to_string(),
                    source: error,
                });
            }
            return Ok(id);
        }

        tracing::debug!(source, ?edge, "loading definitions");
        let value = load_value_auto(source)?;
        let id = self.registry.create();
        self.loaded.insert(key.clone(), id);
        self.loading.push(key);
        self.populate(id, source, source, value)?;
        self.loading.pop();
        Ok(id)
    }

    fn populate(&mut self, id: DefinitionsId, origin: &str, base: &str, value: Value) -> Result<(), LoadError> {
        let mut file: DefinitionsFile =
            serde_json::from_value(value).map_err(|source| LoadError::InvalidJson { source })?;
        let config = |source| LoadError::Config {
            origin: origin.to_string(),
            source,
        };

        let includes = std::mem::take(&mut file.include)
            .iter()
            .map(|include| self.load(&locate(base, include), Edge::Include))
            .collect::<Result<Vec<_>, _>>()?;
        let parent = match file.parent.take() {
            Some(parent) => Some(self.load(&locate(base, &parent), Edge::Parent)?),
            None => None,
        };

        let mut definitions = self.registry.definitions_mut(id).map_err(config)?;
        for include in includes {
            definitions.include(include).map_err(config)?;
        }
        if let Some(parent) = parent {
            definitions.set_parent(parent).map_err(config)?;
        }
        file.apply(&mut definitions).map_err(config)
    }

    fn freeze(&mut self) -> Result<(), LoadError> {
        for &id in self.loaded.values() {
            self.registry
                .definitions_mut(id)
                .map_err(|source| LoadError::Config {
                    origin: format!("definitions #{}", id.index()),
                    source,
                })?
                .freeze();
        }
        Ok(())
    }
}

fn canonical(source: &str) -> String {
    if is_url(source) {
        return source.to_string();
    }
    let path = PathBuf::from(source);
    path.canonicalize().unwrap_or(path).display().to_string()
}

/// Resolves `reference` against the location of the file at `base`.
fn locate(base: &str, reference: &str) -> String {
    if is_url(reference) || Path::new(reference).is_absolute() {
        return reference.to_string();
    }
    if is_url(base) {
        return match base.rfind('/') {
            Some(i) => format!("{}{}", &base[..=i], reference),
            None => reference.to_string(),
        };
    }
    let dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    dir.join(reference).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write(dir: &TempDir, name: &str, value: Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    #[test]
    fn load_value_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"schemas": {{}}}}"#).unwrap();

        let value = load_value(file.path()).unwrap();
        assert_eq!(value, json!({ "schemas": {} }));
    }

    #[test]
    fn load_value_file_not_found() {
        let result = load_value(Path::new("/nonexistent/api.json"));
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[test]
    fn load_value_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_value(file.path());
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn is_url_detects_schemes() {
        assert!(is_url("https://example.com/api.json"));
        assert!(is_url("http://example.com/api.json"));
        assert!(!is_url("/path/to/api.json"));
        assert!(!is_url("api.json"));
    }

    #[test]
    fn locate_relative_to_the_including_file() {
        assert_eq!(locate("/defs/api.json", "common.json"), "/defs/common.json");
        assert_eq!(locate("/defs/api.json", "/other/x.json"), "/other/x.json");
        assert_eq!(
            locate("https://example.com/v1/api.json", "common.json"),
            "https://example.com/v1/common.json"
        );
        assert_eq!(
            locate("/defs/api.json", "https://example.com/x.json"),
            "https://example.com/x.json"
        );
    }

    #[test]
    fn loads_components_and_operations() {
        let mut registry = Registry::new();
        let id = load_definitions_str(
            &mut registry,
            &json!({
                "info": { "title": "Pets", "version": "1.0" },
                "schemas": { "Pet": { "type": "object", "properties": { "name": { "type": "string" } } } },
                "operations": {
                    "list_pets": {
                        "method": "get",
                        "path": "/pets",
                        "responses": { "200": { "description": "ok" } }
                    }
                },
                "defaults": { "string": { "within_responses": "" } }
            })
            .to_string(),
        )
        .unwrap();

        let defs = registry.definitions(id);
        assert!(defs.is_frozen());
        assert_eq!(defs.info().map(|info| info.title.as_str()), Some("Pets"));
        assert!(defs.find_schema("Pet").is_some());
        let operation = defs.find_operation(Some("list_pets")).unwrap();
        assert_eq!(operation.name, "list_pets");
        assert_eq!(
            defs.type_default(SchemaType::String, crate::types::Direction::Response),
            Some(&json!(""))
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut registry = Registry::new();
        let result = load_definitions_str(&mut registry, r#"{ "schema": {} }"#);
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn includes_and_parents_are_linked() {
        let dir = TempDir::new().unwrap();
        write(&dir, "common.json", json!({ "schemas": { "Error": { "type": "string" } } }));
        write(&dir, "base.json", json!({ "servers": [{ "url": "https://api.example.com" }] }));
        let api = write(
            &dir,
            "api.json",
            json!({ "include": ["common.json"], "parent": "base.json" }),
        );

        let mut registry = Registry::new();
        let id = load_definitions(&mut registry, api.to_str().unwrap()).unwrap();
        let defs = registry.definitions(id);
        assert!(defs.find_schema("Error").is_some());
        assert_eq!(defs.servers().len(), 1);
        assert_eq!(registry.len(), 3);
        assert!(registry.definitions(defs.ancestors()[1]).is_frozen());
    }

    #[test]
    fn circular_includes_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.json", json!({ "include": ["b.json"] }));
        write(&dir, "b.json", json!({ "include": ["a.json"] }));

        let mut registry = Registry::new();
        let result = load_definitions(&mut registry, dir.path().join("a.json").to_str().unwrap());
        assert!(matches!(
            result,
            Err(LoadError::Config {
                source: ConfigError::CircularInclude { .. },
                ..
            })
        ));
    }

    #[test]
    fn configuration_errors_name_their_origin() {
        let dir = TempDir::new().unwrap();
        let api = write(&dir, "api.json", json!({ "schemas": { " ": { "type": "string" } } }));

        let mut registry = Registry::new();
        let err = load_definitions(&mut registry, api.to_str().unwrap()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("api.json"));
    }
}
