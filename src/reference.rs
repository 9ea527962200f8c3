//! References into a registry's component tables and their resolution.
//!
//! A reference is resolved either one hop at a time ([`OrRef::resolve`] with
//! `deep = false`) or all the way to a concrete component (`deep = true`).
//! Resolving a schema reference yields a [`ResolvedSchema`]: a view of the
//! concrete schema whose existence is the maximum of every level on the way,
//! so a reference can make a schema stricter but never laxer.

use std::cell::OnceCell;
use std::fmt;

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::components::{
    Callback, Example, Header, Link, Parameter, RequestBody, Response, SecurityScheme,
};
use crate::definitions::Definitions;
use crate::error::{ReferenceError, ResolveError};
use crate::schema::{Schema, SchemaKind};
use crate::types::{Direction, Existence};

/// The component tables a reference can point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Schema,
    Parameter,
    RequestBody,
    Response,
    Example,
    Header,
    Link,
    Callback,
    SecurityScheme,
}

impl ComponentKind {
    /// Name used in messages and in `#/components/...` pointers.
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Schema => "schema",
            ComponentKind::Parameter => "parameter",
            ComponentKind::RequestBody => "requestBody",
            ComponentKind::Response => "response",
            ComponentKind::Example => "example",
            ComponentKind::Header => "header",
            ComponentKind::Link => "link",
            ComponentKind::Callback => "callback",
            ComponentKind::SecurityScheme => "securityScheme",
        }
    }

    /// Key of the table below `components` in OpenAPI 3.x.
    pub fn components_key(self) -> &'static str {
        match self {
            ComponentKind::Schema => "schemas",
            ComponentKind::Parameter => "parameters",
            ComponentKind::RequestBody => "requestBodies",
            ComponentKind::Response => "responses",
            ComponentKind::Example => "examples",
            ComponentKind::Header => "headers",
            ComponentKind::Link => "links",
            ComponentKind::Callback => "callbacks",
            ComponentKind::SecurityScheme => "securitySchemes",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named pointer into a component table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Reference {
    /// Name of the referenced component.
    #[serde(rename = "ref")]
    pub name: String,
    /// Minimum existence of the referenced value. Only meaningful for schemas.
    #[serde(default)]
    pub existence: Existence,
    /// Overrides the referent's description.
    #[serde(default)]
    pub description: Option<String>,
    /// Overrides the referent's summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Excludes the referent from generated documents.
    #[serde(default)]
    pub nodoc: bool,
}

impl Reference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_existence(mut self, existence: Existence) -> Self {
        self.existence = existence;
        self
    }
}

/// A component that may be stored in a registry and referenced by name.
pub trait Component: Sized {
    const KIND: ComponentKind;

    /// Looks `name` up through the registry's ancestors.
    fn find<'a>(definitions: Definitions<'a>, name: &str) -> Option<&'a OrRef<Self>>;
}

macro_rules! component {
    ($ty:ty, $kind:ident, $find:ident) => {
        impl Component for $ty {
            const KIND: ComponentKind = ComponentKind::$kind;

            fn find<'a>(definitions: Definitions<'a>, name: &str) -> Option<&'a OrRef<Self>> {
                definitions.$find(name)
            }
        }
    };
}

component!(Schema, Schema, find_schema);
component!(Parameter, Parameter, find_parameter);
component!(RequestBody, RequestBody, find_request_body);
component!(Response, Response, find_response);
component!(Example, Example, find_example);
component!(Header, Header, find_header);
component!(Link, Link, find_link);
component!(Callback, Callback, find_callback);
component!(SecurityScheme, SecurityScheme, find_security_scheme);

/// Either a concrete component or a reference to one.
#[derive(Debug, Clone)]
pub enum OrRef<T> {
    Item(T),
    Ref(Reference),
}

/// Schema or reference to a schema.
pub type SchemaOrRef = OrRef<Schema>;

impl<T> OrRef<T> {
    pub fn reference(name: impl Into<String>) -> Self {
        OrRef::Ref(Reference::new(name))
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            OrRef::Ref(reference) => Some(reference),
            OrRef::Item(_) => None,
        }
    }

    pub fn as_item(&self) -> Option<&T> {
        match self {
            OrRef::Item(item) => Some(item),
            OrRef::Ref(_) => None,
        }
    }
}

impl<T> From<T> for OrRef<T> {
    fn from(item: T) -> Self {
        OrRef::Item(item)
    }
}

impl<T: Component> OrRef<T> {
    /// Resolves one hop (`deep = false`) or the whole chain (`deep = true`).
    ///
    /// A concrete component resolves to itself. With `deep = true` the result
    /// is always an [`OrRef::Item`].
    pub fn resolve<'a>(
        &'a self,
        definitions: Definitions<'a>,
        deep: bool,
    ) -> Result<&'a OrRef<T>, ResolveError> {
        let OrRef::Ref(reference) = self else {
            return Ok(self);
        };
        let target = find::<T>(definitions, &reference.name)?;
        if !deep {
            return Ok(target);
        }
        let mut visited = vec![reference.name.as_str()];
        let mut current = target;
        while let OrRef::Ref(next) = current {
            if visited.contains(&next.name.as_str()) {
                return Err(ResolveError::CircularReference {
                    kind: T::KIND,
                    name: next.name.clone(),
                });
            }
            visited.push(next.name.as_str());
            current = find::<T>(definitions, &next.name)?;
        }
        Ok(current)
    }

    /// Resolves to the concrete component at the end of the chain.
    pub fn item<'a>(&'a self, definitions: Definitions<'a>) -> Result<&'a T, ResolveError> {
        Ok(self.follow(definitions)?.0)
    }

    /// Returns the concrete component and every reference passed on the way.
    pub(crate) fn follow<'a>(
        &'a self,
        definitions: Definitions<'a>,
    ) -> Result<(&'a T, Vec<&'a Reference>), ResolveError> {
        let mut chain = Vec::new();
        let mut current = self;
        loop {
            match current {
                OrRef::Item(item) => return Ok((item, chain)),
                OrRef::Ref(reference) => {
                    if chain.iter().any(|r: &&Reference| r.name == reference.name) {
                        return Err(ResolveError::CircularReference {
                            kind: T::KIND,
                            name: reference.name.clone(),
                        });
                    }
                    chain.push(reference);
                    current = find::<T>(definitions, &reference.name)?;
                }
            }
        }
    }

    /// True if this entry or any reference on the way to it is `nodoc`.
    pub fn is_nodoc_reference(&self, definitions: Definitions<'_>) -> bool {
        self.follow(definitions)
            .map(|(_, chain)| chain.iter().any(|r| r.nodoc))
            .unwrap_or(false)
    }
}

fn find<'a, T: Component>(
    definitions: Definitions<'a>,
    name: &str,
) -> Result<&'a OrRef<T>, ReferenceError> {
    T::find(definitions, name).ok_or_else(|| ReferenceError {
        kind: T::KIND,
        name: name.to_string(),
    })
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for OrRef<T> {
    /// An object with a `ref` (or `$ref`) member is a reference, anything
    /// else is the component itself.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = Map::<String, Value>::deserialize(deserializer)?;
        if let Some(name) = value.remove("$ref") {
            value.insert("ref".to_string(), name);
        }
        if value.contains_key("ref") {
            serde_json::from_value(Value::Object(value))
                .map(OrRef::Ref)
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value(Value::Object(value))
                .map(OrRef::Item)
                .map_err(D::Error::custom)
        }
    }
}

impl SchemaOrRef {
    /// Resolves to the concrete schema, wrapped with the combined existence.
    pub fn resolved<'a>(
        &'a self,
        definitions: Definitions<'a>,
    ) -> Result<ResolvedSchema<'a>, ResolveError> {
        let (schema, chain) = self.follow(definitions)?;
        let existence = chain
            .iter()
            .map(|r| r.existence)
            .fold(schema.existence, Existence::max);
        Ok(ResolvedSchema {
            schema,
            existence,
            description: chain.iter().find_map(|r| r.description.as_deref()),
            name: chain.last().map(|r| r.name.as_str()),
        })
    }

    /// Defers resolution until a value not present on the reference is read.
    pub fn resolve_lazily<'a>(&'a self, definitions: Definitions<'a>) -> LazySchema<'a> {
        LazySchema {
            source: self,
            definitions,
            resolved: OnceCell::new(),
        }
    }
}

/// Resolves a schema reference held outside of an [`OrRef`], e.g. an `all_of` entry.
pub(crate) fn resolve_reference<'a>(
    reference: &'a Reference,
    definitions: Definitions<'a>,
) -> Result<ResolvedSchema<'a>, ResolveError> {
    let resolved = find::<Schema>(definitions, &reference.name)?.resolved(definitions)?;
    Ok(ResolvedSchema {
        existence: resolved.existence.max(reference.existence),
        description: reference.description.as_deref().or(resolved.description),
        name: resolved.name.or(Some(reference.name.as_str())),
        ..resolved
    })
}

/// A concrete schema seen through the references that led to it.
///
/// Read the wrapped schema through [`ResolvedSchema::schema`]; `existence`
/// and `description` are the values of the view, not of the schema.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSchema<'a> {
    schema: &'a Schema,
    existence: Existence,
    description: Option<&'a str>,
    name: Option<&'a str>,
}

impl<'a> ResolvedSchema<'a> {
    /// A view of an inline schema with no references involved.
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            existence: schema.existence,
            description: None,
            name: None,
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn kind(&self) -> &'a SchemaKind {
        &self.schema.kind
    }

    pub fn existence(&self) -> Existence {
        self.existence
    }

    /// Returns a copy with existence raised to at least `existence`.
    pub fn at_least(mut self, existence: Existence) -> Self {
        self.existence = self.existence.max(existence);
        self
    }

    pub fn is_nullable(&self) -> bool {
        self.existence.is_nullable()
    }

    pub fn is_omittable(&self) -> bool {
        self.existence.is_omittable()
    }

    pub fn is_required(&self) -> bool {
        self.existence.is_required()
    }

    pub fn description(&self) -> Option<&'a str> {
        self.description.or(self.schema.description.as_deref())
    }

    pub(crate) fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Name of the registered schema this view ends at, if reached by reference.
    pub fn name(&self) -> Option<&'a str> {
        self.name
    }

    pub fn default_value(
        &self,
        definitions: Definitions<'_>,
        direction: Direction,
    ) -> Option<Value> {
        self.schema.default_value(definitions, direction)
    }
}

/// A schema or reference resolved on first use.
///
/// Values carried by the reference itself are answered without resolving.
#[derive(Debug)]
pub struct LazySchema<'a> {
    source: &'a SchemaOrRef,
    definitions: Definitions<'a>,
    resolved: OnceCell<Result<ResolvedSchema<'a>, ResolveError>>,
}

impl<'a> LazySchema<'a> {
    pub fn get(&self) -> Result<&ResolvedSchema<'a>, ResolveError> {
        self.resolved
            .get_or_init(|| self.source.resolved(self.definitions))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// True once the referent has been looked up.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    pub fn description(&self) -> Result<Option<&'a str>, ResolveError> {
        if let OrRef::Ref(Reference {
            description: Some(description),
            ..
        }) = self.source
        {
            return Ok(Some(description.as_str()));
        }
        Ok(self.get()?.description())
    }

    pub fn existence(&self) -> Result<Existence, ResolveError> {
        Ok(self.get()?.existence())
    }
}
