//! The definitions registry.
//!
//! A [`Registry`] is an arena of definitions nodes addressed by
//! [`DefinitionsId`]. Nodes form two graphs: inheritance (`parent`, one link)
//! and inclusion (`include`, many links). Name lookups walk the flattened
//! ancestor list `[self, inclusions (deep), parent chain]` and the nearest
//! definition wins.
//!
//! Two caches keep lookups cheap:
//!
//! 1. per node and [`Attribute`], the merged table of names to owning node
//!    (first writer wins) or the concatenated list entries;
//! 2. per node, pathname and [`PathAttribute`], the path entries that
//!    contribute to a "common" lookup.
//!
//! Every mutation goes through [`DefinitionsMut`] and clears the affected
//! entries in the mutated node and in every node that inherits or includes
//! it. Caches are filled lazily through `&self` and may be raced on by
//! readers; the result is the same whoever wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;
use serde_json::Value;

use crate::components::{
    Callback, Example, ExternalDocs, Header, Info, Link, Operation, Parameter, Path,
    RequestBody, Response, SecurityRequirement, SecurityScheme, Server, Tag,
};
use crate::error::{ConfigError, ResolveError};
use crate::pathname::Pathname;
use crate::reference::{OrRef, SchemaOrRef};
use crate::schema::{check_reference, Schema};
use crate::status::Status;
use crate::types::{Direction, SchemaType, Version};

/// Opaque handle of a definitions node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionsId(usize);

impl DefinitionsId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DefinitionsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry-level attributes with a merged-attribute cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Schemas,
    Parameters,
    RequestBodies,
    Responses,
    Examples,
    Headers,
    Links,
    Callbacks,
    SecuritySchemes,
    Operations,
    Paths,
    Defaults,
    Servers,
    Tags,
    Security,
    Extensions,
}

impl Attribute {
    fn is_list(self) -> bool {
        matches!(self, Attribute::Servers | Attribute::Tags | Attribute::Security)
    }
}

/// Path-level attributes looked up through [`Definitions`]' common lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathAttribute {
    Parameters,
    Responses,
    Servers,
    Tags,
    Security,
    Summary,
    Description,
}

impl PathAttribute {
    fn is_set(self, path: &Path) -> bool {
        match self {
            PathAttribute::Parameters => !path.parameters.is_empty(),
            PathAttribute::Responses => !path.responses.is_empty(),
            PathAttribute::Servers => !path.servers.is_empty(),
            PathAttribute::Tags => !path.tags.is_empty(),
            PathAttribute::Security => !path.security.is_empty(),
            PathAttribute::Summary => path.summary.is_some(),
            PathAttribute::Description => path.description.is_some(),
        }
    }
}

#[derive(Debug, Clone)]
enum Merged {
    /// Name to the nearest node defining it.
    Table(IndexMap<String, DefinitionsId>),
    /// Entries of every ancestor, nearest first.
    List(Vec<(DefinitionsId, usize)>),
}

type PathSources = Vec<(DefinitionsId, Pathname)>;

#[derive(Debug, Default)]
struct Node {
    frozen: bool,
    parent: Option<DefinitionsId>,
    includes: Vec<DefinitionsId>,
    /// Nodes that include this one or have it as parent.
    dependents: Vec<DefinitionsId>,

    info: Option<Info>,
    external_docs: Option<ExternalDocs>,
    servers: Vec<Server>,
    tags: Vec<Tag>,
    security: Vec<SecurityRequirement>,
    extensions: IndexMap<String, Value>,

    schemas: IndexMap<String, SchemaOrRef>,
    parameters: IndexMap<String, OrRef<Parameter>>,
    request_bodies: IndexMap<String, OrRef<RequestBody>>,
    responses: IndexMap<String, OrRef<Response>>,
    examples: IndexMap<String, OrRef<Example>>,
    headers: IndexMap<String, OrRef<Header>>,
    links: IndexMap<String, OrRef<Link>>,
    callbacks: IndexMap<String, OrRef<Callback>>,
    security_schemes: IndexMap<String, OrRef<SecurityScheme>>,
    operations: IndexMap<String, Operation>,
    paths: IndexMap<Pathname, Path>,
    /// Type-level defaults keyed by `type:direction`.
    defaults: IndexMap<String, Value>,

    ancestors: RwLock<Option<Vec<DefinitionsId>>>,
    merged: RwLock<HashMap<Attribute, Merged>>,
    common: RwLock<HashMap<(Pathname, PathAttribute), PathSources>>,
}

impl Node {
    fn keys(&self, attribute: Attribute) -> Vec<String> {
        fn names<T>(table: &IndexMap<String, T>) -> Vec<String> {
            table.keys().cloned().collect()
        }
        match attribute {
            Attribute::Schemas => names(&self.schemas),
            Attribute::Parameters => names(&self.parameters),
            Attribute::RequestBodies => names(&self.request_bodies),
            Attribute::Responses => names(&self.responses),
            Attribute::Examples => names(&self.examples),
            Attribute::Headers => names(&self.headers),
            Attribute::Links => names(&self.links),
            Attribute::Callbacks => names(&self.callbacks),
            Attribute::SecuritySchemes => names(&self.security_schemes),
            Attribute::Operations => names(&self.operations),
            Attribute::Defaults => names(&self.defaults),
            Attribute::Extensions => names(&self.extensions),
            Attribute::Paths => self.paths.keys().map(Pathname::to_string).collect(),
            Attribute::Servers | Attribute::Tags | Attribute::Security => Vec::new(),
        }
    }

    fn list_len(&self, attribute: Attribute) -> usize {
        match attribute {
            Attribute::Servers => self.servers.len(),
            Attribute::Tags => self.tags.len(),
            Attribute::Security => self.security.len(),
            _ => 0,
        }
    }
}

fn default_key(schema_type: SchemaType, direction: Direction) -> String {
    let direction = match direction {
        Direction::Request => "request",
        Direction::Response => "response",
    };
    format!("{}:{}", schema_type, direction)
}

/// Arena owning every definitions node.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: Vec<Node>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty definitions node.
    pub fn create(&mut self) -> DefinitionsId {
        self.nodes.push(Node::default());
        DefinitionsId(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Read handle of a node created by this registry.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not created by this registry. Use
    /// [`Registry::definitions_mut`] for a checked lookup.
    pub fn definitions(&self, id: DefinitionsId) -> Definitions<'_> {
        assert!(id.0 < self.nodes.len(), "unknown definitions id {}", id.0);
        Definitions { registry: self, id }
    }

    pub fn definitions_mut(&mut self, id: DefinitionsId) -> Result<DefinitionsMut<'_>, ConfigError> {
        self.check_id(id)?;
        Ok(DefinitionsMut { registry: self, id })
    }

    fn check_id(&self, id: DefinitionsId) -> Result<(), ConfigError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(ConfigError::UnknownDefinitions { id: id.0 })
        }
    }

    fn node(&self, id: DefinitionsId) -> &Node {
        &self.nodes[id.0]
    }

    fn collect_ancestors(&self, id: DefinitionsId, out: &mut Vec<DefinitionsId>) {
        if out.contains(&id) {
            return;
        }
        out.push(id);
        let node = self.node(id);
        for &included in &node.includes {
            self.collect_ancestors(included, out);
        }
        if let Some(parent) = node.parent {
            self.collect_ancestors(parent, out);
        }
    }

    /// `id` and every node that transitively inherits or includes it.
    fn affected(&self, id: DefinitionsId) -> Vec<DefinitionsId> {
        let mut affected = vec![id];
        let mut i = 0;
        while i < affected.len() {
            for &dependent in &self.node(affected[i]).dependents {
                if !affected.contains(&dependent) {
                    affected.push(dependent);
                }
            }
            i += 1;
        }
        affected
    }

    fn invalidate(&mut self, id: DefinitionsId, attribute: Attribute) {
        let affected = self.affected(id);
        for &target in &affected {
            self.nodes[target.0]
                .merged
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&attribute);
        }
        tracing::debug!(
            definitions = id.0,
            ?attribute,
            affected = affected.len(),
            "invalidated merged attribute"
        );
    }

    fn invalidate_path(&mut self, id: DefinitionsId, pathname: &Pathname) {
        self.invalidate(id, Attribute::Paths);
        let affected = self.affected(id);
        for &target in &affected {
            self.nodes[target.0]
                .common
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(cached, _), _| !cached.starts_with(pathname));
        }
        tracing::debug!(definitions = id.0, path = %pathname, "invalidated common lookups");
    }

    fn invalidate_graph(&mut self, id: DefinitionsId) {
        let affected = self.affected(id);
        for &target in &affected {
            let node = &mut self.nodes[target.0];
            *node.ancestors.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
            node.merged.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
            node.common.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
        }
        tracing::debug!(
            definitions = id.0,
            affected = affected.len(),
            "invalidated ancestors"
        );
    }
}

/// Shape checks run when a component is added.
trait Checked {
    fn check_shape(&self) -> Result<(), ConfigError>;
}

macro_rules! checked {
    ($($ty:ty),*) => {
        $(impl Checked for $ty {
            fn check_shape(&self) -> Result<(), ConfigError> {
                self.check()
            }
        })*
    };
}

checked!(Schema, Parameter, RequestBody, Response, Example, Callback, Operation, Path);

impl Checked for Header {
    fn check_shape(&self) -> Result<(), ConfigError> {
        crate::schema::check_schema_or_ref(&self.schema)
    }
}

impl Checked for Link {
    fn check_shape(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

impl Checked for SecurityScheme {
    fn check_shape(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

impl<T: Checked> Checked for OrRef<T> {
    fn check_shape(&self) -> Result<(), ConfigError> {
        match self {
            OrRef::Item(item) => item.check_shape(),
            OrRef::Ref(reference) => check_reference(reference),
        }
    }
}

fn checked_name(name: String, kind: &str) -> Result<String, ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::BlankName {
            kind: kind.to_string(),
        });
    }
    Ok(name)
}

/// Read handle of one definitions node.
#[derive(Clone, Copy)]
pub struct Definitions<'a> {
    registry: &'a Registry,
    id: DefinitionsId,
}

impl fmt::Debug for Definitions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definitions").field("id", &self.id).finish()
    }
}

/// Write handle of one definitions node.
pub struct DefinitionsMut<'a> {
    registry: &'a mut Registry,
    id: DefinitionsId,
}

macro_rules! component_tables {
    ($($kind:literal, $field:ident, $ty:ty, $attribute:ident, $add:ident, $find:ident, $all:ident;)*) => {
        impl DefinitionsMut<'_> {
            $(
                #[doc = concat!("Adds or replaces the ", $kind, " named `name`.")]
                pub fn $add(
                    &mut self,
                    name: impl Into<String>,
                    component: impl Into<$ty>,
                ) -> Result<(), ConfigError> {
                    let name = checked_name(name.into(), $kind)?;
                    let component = component.into();
                    component.check_shape()?;
                    self.node_mut()?.$field.insert(name, component);
                    self.registry.invalidate(self.id, Attribute::$attribute);
                    Ok(())
                }
            )*
        }

        impl<'a> Definitions<'a> {
            $(
                #[doc = concat!("Looks up the ", $kind, " named `name`, nearest definition first.")]
                pub fn $find(self, name: &str) -> Option<&'a $ty> {
                    let owner = self.owner(Attribute::$attribute, name)?;
                    self.registry.node(owner).$field.get(name)
                }

                #[doc = concat!("Every visible ", $kind, " in definition order.")]
                pub fn $all(self) -> Vec<(&'a str, &'a $ty)> {
                    self.table(Attribute::$attribute)
                        .into_iter()
                        .filter_map(|(name, owner)| {
                            self.registry
                                .node(owner)
                                .$field
                                .get_key_value(name.as_str())
                                .map(|(name, component)| (name.as_str(), component))
                        })
                        .collect()
                }
            )*
        }
    };
}

component_tables! {
    "schema", schemas, SchemaOrRef, Schemas, add_schema, find_schema, schemas;
    "parameter", parameters, OrRef<Parameter>, Parameters, add_parameter, find_parameter, parameters;
    "request body", request_bodies, OrRef<RequestBody>, RequestBodies, add_request_body, find_request_body, request_bodies;
    "response", responses, OrRef<Response>, Responses, add_response, find_response, responses;
    "example", examples, OrRef<Example>, Examples, add_example, find_example, examples;
    "header", headers, OrRef<Header>, Headers, add_header, find_header, headers;
    "link", links, OrRef<Link>, Links, add_link, find_link, links;
    "callback", callbacks, OrRef<Callback>, Callbacks, add_callback, find_callback, callbacks;
    "security scheme", security_schemes, OrRef<SecurityScheme>, SecuritySchemes, add_security_scheme, find_security_scheme, security_schemes;
}

impl<'a> DefinitionsMut<'a> {
    pub fn id(&self) -> DefinitionsId {
        self.id
    }

    /// Read handle of the same node.
    pub fn as_definitions(&self) -> Definitions<'_> {
        self.registry.definitions(self.id)
    }

    fn node_mut(&mut self) -> Result<&mut Node, ConfigError> {
        let node = &mut self.registry.nodes[self.id.0];
        if node.frozen {
            return Err(ConfigError::Frozen);
        }
        Ok(node)
    }

    /// Rejects every later mutation of this node.
    pub fn freeze(&mut self) {
        self.registry.nodes[self.id.0].frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.registry.node(self.id).frozen
    }

    /// Makes the components of `other` visible from this node.
    pub fn include(&mut self, other: DefinitionsId) -> Result<(), ConfigError> {
        self.registry.check_id(other)?;
        let mut reachable = Vec::new();
        self.registry.collect_ancestors(other, &mut reachable);
        if reachable.contains(&self.id) {
            return Err(ConfigError::CircularInclude { id: other.0 });
        }
        let node = self.node_mut()?;
        if node.includes.contains(&other) {
            return Ok(());
        }
        node.includes.push(other);
        self.registry.nodes[other.0].dependents.push(self.id);
        self.registry.invalidate_graph(self.id);
        Ok(())
    }

    /// Sets the node this one inherits from.
    pub fn set_parent(&mut self, parent: DefinitionsId) -> Result<(), ConfigError> {
        self.registry.check_id(parent)?;
        let mut reachable = Vec::new();
        self.registry.collect_ancestors(parent, &mut reachable);
        if reachable.contains(&self.id) {
            return Err(ConfigError::CircularParent { id: parent.0 });
        }
        let id = self.id;
        let previous = self.node_mut()?.parent.replace(parent);
        if let Some(previous) = previous {
            self.registry.nodes[previous.0].dependents.retain(|&d| d != id);
        }
        self.registry.nodes[parent.0].dependents.push(id);
        self.registry.invalidate_graph(id);
        Ok(())
    }

    /// Adds or replaces an operation. `name` becomes the operation's name.
    pub fn add_operation(
        &mut self,
        name: impl Into<String>,
        mut operation: Operation,
    ) -> Result<(), ConfigError> {
        let name = checked_name(name.into(), "operation")?;
        operation.check_shape()?;
        operation.name = name.clone();
        self.node_mut()?.operations.insert(name, operation);
        self.registry.invalidate(self.id, Attribute::Operations);
        Ok(())
    }

    /// Adds or replaces the defaults shared below `pathname`.
    pub fn add_path(&mut self, pathname: impl Into<Pathname>, path: Path) -> Result<(), ConfigError> {
        let pathname = pathname.into();
        path.check_shape()?;
        self.node_mut()?.paths.insert(pathname.clone(), path);
        self.registry.invalidate_path(self.id, &pathname);
        Ok(())
    }

    /// Registers the default of every schema of `schema_type` without one.
    pub fn add_default(
        &mut self,
        schema_type: SchemaType,
        within_requests: Option<Value>,
        within_responses: Option<Value>,
    ) -> Result<(), ConfigError> {
        let node = self.node_mut()?;
        for (direction, value) in [
            (Direction::Request, within_requests),
            (Direction::Response, within_responses),
        ] {
            let key = default_key(schema_type, direction);
            match value {
                Some(value) => node.defaults.insert(key, value),
                None => node.defaults.shift_remove(&key),
            };
        }
        self.registry.invalidate(self.id, Attribute::Defaults);
        Ok(())
    }

    pub fn set_info(&mut self, info: Info) -> Result<(), ConfigError> {
        self.node_mut()?.info = Some(info);
        Ok(())
    }

    pub fn set_external_docs(&mut self, external_docs: ExternalDocs) -> Result<(), ConfigError> {
        self.node_mut()?.external_docs = Some(external_docs);
        Ok(())
    }

    pub fn add_server(&mut self, server: Server) -> Result<(), ConfigError> {
        self.node_mut()?.servers.push(server);
        self.registry.invalidate(self.id, Attribute::Servers);
        Ok(())
    }

    pub fn add_tag(&mut self, tag: Tag) -> Result<(), ConfigError> {
        let name = checked_name(tag.name.clone(), "tag")?;
        let node = self.node_mut()?;
        match node.tags.iter_mut().find(|t| t.name == name) {
            Some(existing) => *existing = tag,
            None => node.tags.push(tag),
        }
        self.registry.invalidate(self.id, Attribute::Tags);
        Ok(())
    }

    pub fn add_security_requirement(
        &mut self,
        requirement: SecurityRequirement,
    ) -> Result<(), ConfigError> {
        self.node_mut()?.security.push(requirement);
        self.registry.invalidate(self.id, Attribute::Security);
        Ok(())
    }

    pub fn add_extension(&mut self, name: impl Into<String>, value: Value) -> Result<(), ConfigError> {
        let name = checked_name(name.into(), "extension")?;
        self.node_mut()?.extensions.insert(name, value);
        self.registry.invalidate(self.id, Attribute::Extensions);
        Ok(())
    }
}

impl<'a> Definitions<'a> {
    pub fn id(self) -> DefinitionsId {
        self.id
    }

    pub fn registry(self) -> &'a Registry {
        self.registry
    }

    fn node(self) -> &'a Node {
        self.registry.node(self.id)
    }

    pub fn is_frozen(self) -> bool {
        self.node().frozen
    }

    /// `[self, inclusions (deep), parent chain]` without duplicates.
    pub fn ancestors(self) -> Vec<DefinitionsId> {
        let node = self.node();
        if let Some(ancestors) = node
            .ancestors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return ancestors.clone();
        }
        let mut ancestors = Vec::new();
        self.registry.collect_ancestors(self.id, &mut ancestors);
        tracing::debug!(definitions = self.id.0, count = ancestors.len(), "built ancestors");
        *node.ancestors.write().unwrap_or_else(PoisonError::into_inner) = Some(ancestors.clone());
        ancestors
    }

    fn with_merged<R>(self, attribute: Attribute, f: impl FnOnce(&Merged) -> R) -> R {
        let node = self.node();
        {
            let cache = node.merged.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(merged) = cache.get(&attribute) {
                return f(merged);
            }
        }
        let merged = self.build_merged(attribute);
        tracing::debug!(definitions = self.id.0, ?attribute, "built merged attribute");
        let mut cache = node.merged.write().unwrap_or_else(PoisonError::into_inner);
        f(cache.entry(attribute).or_insert(merged))
    }

    fn build_merged(self, attribute: Attribute) -> Merged {
        let ancestors = self.ancestors();
        if attribute.is_list() {
            let entries = ancestors
                .iter()
                .flat_map(|&id| (0..self.registry.node(id).list_len(attribute)).map(move |i| (id, i)))
                .collect();
            return Merged::List(entries);
        }
        let mut table = IndexMap::new();
        for &id in &ancestors {
            for key in self.registry.node(id).keys(attribute) {
                table.entry(key).or_insert(id);
            }
        }
        Merged::Table(table)
    }

    fn owner(self, attribute: Attribute, name: &str) -> Option<DefinitionsId> {
        self.with_merged(attribute, |merged| match merged {
            Merged::Table(table) => table.get(name).copied(),
            Merged::List(_) => None,
        })
    }

    fn table(self, attribute: Attribute) -> Vec<(String, DefinitionsId)> {
        self.with_merged(attribute, |merged| match merged {
            Merged::Table(table) => table.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            Merged::List(_) => Vec::new(),
        })
    }

    fn list(self, attribute: Attribute) -> Vec<(DefinitionsId, usize)> {
        self.with_merged(attribute, |merged| match merged {
            Merged::List(list) => list.clone(),
            Merged::Table(_) => Vec::new(),
        })
    }

    /// True if the merged-attribute cache holds `attribute`.
    pub fn is_cached(self, attribute: Attribute) -> bool {
        self.node()
            .merged
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&attribute)
    }

    /// True if the common-lookup cache holds `attribute` for `pathname`.
    pub fn is_path_cached(self, pathname: &Pathname, attribute: PathAttribute) -> bool {
        self.node()
            .common
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(pathname.clone(), attribute))
    }

    /// Like [`Definitions::find_schema`], also returning the registered name.
    pub fn find_schema_entry(self, name: &str) -> Option<(&'a str, &'a SchemaOrRef)> {
        let owner = self.owner(Attribute::Schemas, name)?;
        self.registry
            .node(owner)
            .schemas
            .get_key_value(name)
            .map(|(key, schema)| (key.as_str(), schema))
    }

    /// With a name, the operation of that name. Without one, the only
    /// operation if exactly one is defined.
    pub fn find_operation(self, name: Option<&str>) -> Option<&'a Operation> {
        match name {
            Some(name) => {
                let owner = self.owner(Attribute::Operations, name)?;
                self.registry.node(owner).operations.get(name)
            }
            None => {
                let operations = self.operations();
                match operations.as_slice() {
                    [only] => Some(only),
                    _ => None,
                }
            }
        }
    }

    pub fn operations(self) -> Vec<&'a Operation> {
        self.table(Attribute::Operations)
            .into_iter()
            .filter_map(|(name, owner)| self.registry.node(owner).operations.get(&name))
            .collect()
    }

    /// Path entries, nearest definition of each pathname.
    pub fn paths(self) -> Vec<(&'a Pathname, &'a Path)> {
        self.table(Attribute::Paths)
            .into_iter()
            .filter_map(|(name, owner)| self.registry.node(owner).paths.get_key_value(&Pathname::new(&name)))
            .collect()
    }

    pub fn info(self) -> Option<&'a Info> {
        self.ancestors()
            .into_iter()
            .find_map(|id| self.registry.node(id).info.as_ref())
    }

    pub fn external_docs(self) -> Option<&'a ExternalDocs> {
        self.ancestors()
            .into_iter()
            .find_map(|id| self.registry.node(id).external_docs.as_ref())
    }

    pub fn servers(self) -> Vec<&'a Server> {
        self.list(Attribute::Servers)
            .into_iter()
            .map(|(id, i)| &self.registry.node(id).servers[i])
            .collect()
    }

    /// Tags of every ancestor; the nearest definition of a name wins.
    pub fn tags(self) -> Vec<&'a Tag> {
        let mut tags: Vec<&'a Tag> = Vec::new();
        for (id, i) in self.list(Attribute::Tags) {
            let tag = &self.registry.node(id).tags[i];
            if !tags.iter().any(|t| t.name == tag.name) {
                tags.push(tag);
            }
        }
        tags
    }

    /// Security requirements applying to every operation by default.
    pub fn security(self) -> Vec<&'a SecurityRequirement> {
        let mut security: Vec<&'a SecurityRequirement> = Vec::new();
        for (id, i) in self.list(Attribute::Security) {
            let requirement = &self.registry.node(id).security[i];
            if !security.contains(&requirement) {
                security.push(requirement);
            }
        }
        security
    }

    pub fn extensions(self) -> Vec<(&'a str, &'a Value)> {
        self.table(Attribute::Extensions)
            .into_iter()
            .filter_map(|(name, owner)| {
                self.registry
                    .node(owner)
                    .extensions
                    .get_key_value(&name)
                    .map(|(k, v)| (k.as_str(), v))
            })
            .collect()
    }

    /// The default registered for schemas of `schema_type` in `direction`.
    pub fn type_default(self, schema_type: SchemaType, direction: Direction) -> Option<&'a Value> {
        let key = default_key(schema_type, direction);
        let owner = self.owner(Attribute::Defaults, &key)?;
        self.registry.node(owner).defaults.get(&key)
    }

    /// Path entries contributing `attribute` to `pathname`, farthest first:
    /// path ancestors from the root down, each across registry ancestors
    /// from the most distant to this node.
    fn path_sources(self, pathname: &Pathname, attribute: PathAttribute) -> PathSources {
        let node = self.node();
        let key = (pathname.clone(), attribute);
        {
            let cache = node.common.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sources) = cache.get(&key) {
                return sources.clone();
            }
        }
        let ancestors = self.ancestors();
        let mut sources = Vec::new();
        for path in pathname.ancestors() {
            for &id in ancestors.iter().rev() {
                if let Some(entry) = self.registry.node(id).paths.get(&path) {
                    if attribute.is_set(entry) {
                        sources.push((id, path.clone()));
                    }
                }
            }
        }
        tracing::debug!(
            definitions = self.id.0,
            path = %pathname,
            ?attribute,
            sources = sources.len(),
            "built common lookup"
        );
        node.common
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, sources.clone());
        sources
    }

    fn common_paths(self, pathname: &Pathname, attribute: PathAttribute) -> Vec<&'a Path> {
        self.path_sources(pathname, attribute)
            .into_iter()
            .filter_map(|(id, path)| self.registry.node(id).paths.get(&path))
            .collect()
    }

    /// Identity of a parameter: location and name, or the reference name if
    /// the reference can't be resolved.
    fn parameter_key(self, parameter: &OrRef<Parameter>) -> String {
        match parameter.item(self) {
            Ok(parameter) => format!("{}:{}", parameter.location.as_str(), parameter.name),
            Err(_) => match parameter {
                OrRef::Ref(reference) => format!("ref:{}", reference.name),
                OrRef::Item(parameter) => parameter.name.clone(),
            },
        }
    }

    /// Parameters shared by every operation below `pathname`; nearer entries
    /// replace farther ones of the same name and location.
    pub fn common_parameters(self, pathname: &Pathname) -> Vec<&'a OrRef<Parameter>> {
        let mut parameters = IndexMap::new();
        for path in self.common_paths(pathname, PathAttribute::Parameters) {
            for parameter in &path.parameters {
                parameters.insert(self.parameter_key(parameter), parameter);
            }
        }
        parameters.into_values().collect()
    }

    pub fn common_responses(self, pathname: &Pathname) -> IndexMap<Status, &'a OrRef<Response>> {
        let mut responses = IndexMap::new();
        for path in self.common_paths(pathname, PathAttribute::Responses) {
            for (status, response) in &path.responses {
                responses.insert(*status, response);
            }
        }
        responses
    }

    pub fn common_tags(self, pathname: &Pathname) -> Vec<&'a str> {
        let mut tags: Vec<&'a str> = Vec::new();
        for path in self.common_paths(pathname, PathAttribute::Tags) {
            for tag in &path.tags {
                if !tags.contains(&tag.as_str()) {
                    tags.push(tag);
                }
            }
        }
        tags
    }

    pub fn common_security(self, pathname: &Pathname) -> Vec<&'a SecurityRequirement> {
        let mut security: Vec<&'a SecurityRequirement> = Vec::new();
        for path in self.common_paths(pathname, PathAttribute::Security) {
            for requirement in &path.security {
                if !security.contains(&requirement) {
                    security.push(requirement);
                }
            }
        }
        security
    }

    /// Servers of the nearest path entry defining any.
    pub fn common_servers(self, pathname: &Pathname) -> Vec<&'a Server> {
        self.common_paths(pathname, PathAttribute::Servers)
            .last()
            .map(|path| path.servers.iter().collect())
            .unwrap_or_default()
    }

    pub fn common_summary(self, pathname: &Pathname) -> Option<&'a str> {
        self.common_paths(pathname, PathAttribute::Summary)
            .last()
            .and_then(|path| path.summary.as_deref())
    }

    pub fn common_description(self, pathname: &Pathname) -> Option<&'a str> {
        self.common_paths(pathname, PathAttribute::Description)
            .last()
            .and_then(|path| path.description.as_deref())
    }

    /// Common parameters of the operation's path merged with its own;
    /// the operation's parameters win.
    pub fn operation_parameters(self, operation: &'a Operation) -> Vec<&'a OrRef<Parameter>> {
        let mut parameters = IndexMap::new();
        for parameter in self
            .common_parameters(&operation.full_path())
            .into_iter()
            .chain(&operation.parameters)
        {
            parameters.insert(self.parameter_key(parameter), parameter);
        }
        parameters.into_values().collect()
    }

    pub fn operation_responses(
        self,
        operation: &'a Operation,
    ) -> IndexMap<Status, &'a OrRef<Response>> {
        let mut responses = self.common_responses(&operation.full_path());
        for (status, response) in &operation.responses {
            responses.insert(*status, response);
        }
        responses
    }

    /// The operation's own security if set, else the common security of its
    /// path. `None` means the registry-level security applies.
    pub fn operation_security(
        self,
        operation: &'a Operation,
    ) -> Option<Vec<&'a SecurityRequirement>> {
        if let Some(own) = &operation.security {
            return Some(own.iter().collect());
        }
        let common = self.common_security(&operation.full_path());
        (!common.is_empty()).then_some(common)
    }

    /// The requirements to enforce for `operation`, any one of which suffices.
    pub fn effective_security(self, operation: &'a Operation) -> Vec<&'a SecurityRequirement> {
        self.operation_security(operation)
            .unwrap_or_else(|| self.security())
    }

    pub fn operation_tags(self, operation: &'a Operation) -> Vec<&'a str> {
        let mut tags = self.common_tags(&operation.full_path());
        for tag in &operation.tags {
            if !tags.contains(&tag.as_str()) {
                tags.push(tag);
            }
        }
        tags
    }

    pub fn operation_servers(self, operation: &'a Operation) -> Vec<&'a Server> {
        if operation.servers.is_empty() {
            self.common_servers(&operation.full_path())
        } else {
            operation.servers.iter().collect()
        }
    }

    /// Whether the security scheme `name` can be used to authenticate.
    ///
    /// A scheme that isn't defined, or whose reference can't be resolved,
    /// makes any requirement naming it unsatisfiable.
    pub fn security_scheme_satisfiable(self, name: &str) -> bool {
        let Some(scheme) = self.find_security_scheme(name) else {
            tracing::warn!(scheme = name, "security scheme not found, requirement can't be satisfied");
            return false;
        };
        match scheme.item(self) {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(scheme = name, %error, "security scheme can't be resolved");
                false
            }
        }
    }

    /// True if every scheme of `requirement` is satisfiable.
    pub fn requirement_satisfiable(self, requirement: &SecurityRequirement) -> bool {
        requirement
            .schemes
            .keys()
            .all(|name| self.security_scheme_satisfiable(name))
    }

    /// The OpenAPI document of `version`.
    pub fn openapi_document(self, version: Version) -> Result<Value, ResolveError> {
        crate::openapi::document(self, version)
    }

    /// The JSON Schema document of the schema named `name`.
    pub fn json_schema_document(self, name: &str) -> Result<Value, ResolveError> {
        crate::json_schema::document(self, name)
    }
}
