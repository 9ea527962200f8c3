//! OpenAPI document generation (2.0, 3.0, 3.1 and 3.2).
//!
//! Documents are plain [`serde_json::Value`] trees built from a read-only
//! view of the registry. Generating a document never mutates the registry
//! apart from filling its lookup caches.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::components::{
    ApiKeyIn, Callback, Content, Example, Header, Info, Link, Method, OAuthFlow, Operation,
    Parameter, ParameterIn, RequestBody, Response, SecurityRequirement, SecurityScheme, Server,
    Tag,
};
use crate::definitions::Definitions;
use crate::emit::{component_pointer, external_docs, insert_some, merge_extensions, Dialect, Emitter};
use crate::error::ResolveError;
use crate::media::MediaRange;
use crate::reference::{Component, OrRef, ResolvedSchema, SchemaOrRef};
use crate::schema::SchemaKind;
use crate::status::Status;
use crate::types::{Direction, Existence, Version};

/// Builds the OpenAPI document of `version`.
///
/// # Errors
///
/// Returns `ResolveError` if a reference reachable from an operation or a
/// component can't be resolved.
pub fn document(definitions: Definitions<'_>, version: Version) -> Result<Value, ResolveError> {
    Generator {
        definitions,
        version,
        emitter: Emitter::new(definitions, Dialect::OpenApi(version)),
    }
    .document()
}

struct Generator<'a> {
    definitions: Definitions<'a>,
    version: Version,
    emitter: Emitter<'a>,
}

fn pointer<T: Component>(version: Version, name: &str) -> Value {
    json!({ "$ref": component_pointer::<T>(version, name) })
}

impl<'a> Generator<'a> {
    fn swagger(&self) -> bool {
        self.version.is_swagger()
    }

    fn document(mut self) -> Result<Value, ResolveError> {
        let defs = self.definitions;
        let mut doc = Map::new();
        if self.swagger() {
            doc.insert("swagger".to_string(), json!("2.0"));
        } else {
            doc.insert("openapi".to_string(), json!(self.version.document_version()));
        }
        doc.insert("info".to_string(), self.info(defs.info()));

        let servers = defs.servers();
        if self.swagger() {
            if let Some(server) = servers.first() {
                swagger_server(&server.url, &mut doc);
            }
        } else if !servers.is_empty() {
            doc.insert("servers".to_string(), servers_value(&servers));
        }

        if self.swagger() {
            let (consumes, produces) = self.media_summaries()?;
            if !consumes.is_empty() {
                doc.insert("consumes".to_string(), json!(consumes));
            }
            if !produces.is_empty() {
                doc.insert("produces".to_string(), json!(produces));
            }
        }

        let paths = self.paths()?;
        doc.insert("paths".to_string(), Value::Object(paths));

        if self.swagger() {
            self.swagger_components(&mut doc)?;
        } else {
            let components = self.components()?;
            if !components.is_empty() {
                doc.insert("components".to_string(), Value::Object(components));
            }
        }

        let security = defs.security();
        if !security.is_empty() {
            doc.insert("security".to_string(), security_value(&security));
        }
        let tags = defs.tags();
        if !tags.is_empty() {
            doc.insert(
                "tags".to_string(),
                Value::Array(tags.into_iter().map(tag_value).collect()),
            );
        }
        if let Some(docs) = defs.external_docs() {
            doc.insert("externalDocs".to_string(), external_docs(docs));
        }
        let mut extensions = IndexMap::new();
        for (name, value) in defs.extensions() {
            extensions.insert(name.to_string(), value.clone());
        }
        merge_extensions(&mut doc, &extensions);
        Ok(Value::Object(doc))
    }

    fn info(&self, info: Option<&Info>) -> Value {
        let Some(info) = info else {
            return json!({ "title": "", "version": "" });
        };
        let mut map = Map::new();
        map.insert("title".to_string(), json!(info.title));
        if self.version >= Version::V3_1 {
            insert_some(&mut map, "summary", info.summary.clone());
        }
        insert_some(&mut map, "description", info.description.clone());
        insert_some(&mut map, "termsOfService", info.terms_of_service.clone());
        if let Some(contact) = &info.contact {
            let mut value = Map::new();
            insert_some(&mut value, "name", contact.name.clone());
            insert_some(&mut value, "url", contact.url.clone());
            insert_some(&mut value, "email", contact.email.clone());
            map.insert("contact".to_string(), Value::Object(value));
        }
        if let Some(license) = &info.license {
            let mut value = Map::new();
            value.insert("name".to_string(), json!(license.name));
            if self.version >= Version::V3_1 {
                insert_some(&mut value, "identifier", license.identifier.clone());
            }
            insert_some(&mut value, "url", license.url.clone());
            map.insert("license".to_string(), Value::Object(value));
        }
        map.insert("version".to_string(), json!(info.version));
        merge_extensions(&mut map, &info.extensions);
        Value::Object(map)
    }

    /// Where `method` goes in a path item, or `None` if `version` can't express it.
    fn method_slot(&self, method: &Method) -> Option<(bool, String)> {
        match method {
            Method::Trace if self.version < Version::V3_0 => None,
            Method::Query if self.version < Version::V3_2 => None,
            Method::Other(name) if self.version >= Version::V3_2 => {
                Some((true, name.to_ascii_uppercase()))
            }
            Method::Other(_) => None,
            method => Some((false, method.as_str().to_string())),
        }
    }

    fn paths(&mut self) -> Result<Map<String, Value>, ResolveError> {
        let defs = self.definitions;
        let mut paths: IndexMap<String, Map<String, Value>> = IndexMap::new();
        for operation in defs.operations() {
            let Some((additional, method)) = self.method_slot(&operation.method) else {
                tracing::warn!(
                    operation = %operation.name,
                    method = %operation.method,
                    version = %self.version,
                    "method not supported by OpenAPI version, operation dropped"
                );
                continue;
            };
            let value = self.operation(operation)?;
            let full_path = operation.full_path();
            let item = paths
                .entry(full_path.to_string())
                .or_insert_with(|| self.path_item(&full_path));
            if additional {
                let slot = item
                    .entry("additionalOperations")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(slot) = slot {
                    slot.insert(method, value);
                }
            } else {
                item.insert(method, value);
            }
        }
        Ok(paths
            .into_iter()
            .map(|(path, item)| (path, Value::Object(item)))
            .collect())
    }

    fn path_item(&self, pathname: &crate::pathname::Pathname) -> Map<String, Value> {
        let mut item = Map::new();
        if self.swagger() {
            return item;
        }
        let defs = self.definitions;
        insert_some(&mut item, "summary", defs.common_summary(pathname));
        insert_some(&mut item, "description", defs.common_description(pathname));
        let servers = defs.common_servers(pathname);
        if !servers.is_empty() {
            item.insert("servers".to_string(), servers_value(&servers));
        }
        item
    }

    fn operation(&mut self, operation: &'a Operation) -> Result<Value, ResolveError> {
        let defs = self.definitions;
        let mut map = Map::new();

        let tags = defs.operation_tags(operation);
        if !tags.is_empty() {
            map.insert("tags".to_string(), json!(tags));
        }
        insert_some(&mut map, "summary", operation.summary.clone());
        insert_some(&mut map, "description", operation.description.clone());
        if let Some(docs) = &operation.external_docs {
            map.insert("externalDocs".to_string(), external_docs(docs));
        }
        if !operation.name.is_empty() {
            map.insert("operationId".to_string(), json!(operation.name));
        }

        let mut parameters = Vec::new();
        for parameter in defs.operation_parameters(operation) {
            parameters.extend(self.parameter(parameter)?);
        }
        if let Some(body) = &operation.request_body {
            if self.swagger() {
                parameters.push(self.body_parameter(body)?);
            } else {
                let value = self.request_body(body)?;
                map.insert("requestBody".to_string(), value);
            }
        }
        if !parameters.is_empty() {
            map.insert("parameters".to_string(), Value::Array(parameters));
        }

        let mut responses = Map::new();
        for (status, response) in defs.operation_responses(operation) {
            if self.swagger() && matches!(status, Status::Range(_)) {
                tracing::warn!(operation = %operation.name, %status, "status ranges need OpenAPI 3.0, response dropped");
                continue;
            }
            if is_nodoc(response, defs)? {
                continue;
            }
            let value = self.response(response)?;
            responses.insert(status.to_string(), value);
        }
        map.insert("responses".to_string(), Value::Object(responses));

        if !self.swagger() && !operation.callbacks.is_empty() {
            let mut callbacks = Map::new();
            for (name, callback) in &operation.callbacks {
                let value = self.callback(callback)?;
                callbacks.insert(name.clone(), value);
            }
            map.insert("callbacks".to_string(), Value::Object(callbacks));
        }
        if operation.deprecated {
            map.insert("deprecated".to_string(), Value::Bool(true));
        }
        if let Some(security) = defs.operation_security(operation) {
            map.insert("security".to_string(), security_value(&security));
        }
        if !self.swagger() && !operation.servers.is_empty() {
            let servers: Vec<&Server> = operation.servers.iter().collect();
            map.insert("servers".to_string(), servers_value(&servers));
        }
        merge_extensions(&mut map, &operation.extensions);
        Ok(Value::Object(map))
    }

    /// Emits one parameter, or one per leaf property of an object parameter.
    fn parameter(&mut self, parameter: &'a OrRef<Parameter>) -> Result<Vec<Value>, ResolveError> {
        let defs = self.definitions;
        let item = parameter.item(defs)?;
        let schema = item.schema.resolved(defs)?;
        let whole_query_string =
            item.location == ParameterIn::Querystring && self.version >= Version::V3_2;

        if schema.schema().as_object().is_none() || whole_query_string {
            if let OrRef::Ref(reference) = parameter {
                return Ok(vec![pointer::<Parameter>(self.version, &reference.name)]);
            }
            return Ok(vec![self.parameter_object(item)?]);
        }

        let required = item.location == ParameterIn::Path || schema.is_required();
        let mut leaves = Vec::new();
        self.explode(item, item.name.clone(), schema, required, &mut leaves)?;
        Ok(leaves)
    }

    fn explode(
        &mut self,
        parameter: &'a Parameter,
        name: String,
        schema: ResolvedSchema<'a>,
        required: bool,
        leaves: &mut Vec<Value>,
    ) -> Result<(), ResolveError> {
        let defs = self.definitions;
        for (property_name, property) in schema.resolve_properties(defs, Some(Direction::Request))? {
            let child = property.schema.resolved(defs)?;
            let child_name = format!("{}[{}]", name, property_name);
            let child_required = required && child.is_required();
            if child.schema().as_object().is_some() {
                self.explode(parameter, child_name, child, child_required, leaves)?;
            } else {
                let leaf = self.leaf_parameter(
                    parameter,
                    &child_name,
                    &property.schema,
                    child,
                    child_required,
                )?;
                leaves.push(leaf);
            }
        }
        Ok(())
    }

    fn parameter_object(&mut self, parameter: &'a Parameter) -> Result<Value, ResolveError> {
        let defs = self.definitions;
        let schema = parameter.schema.resolved(defs)?;
        let required = parameter.location == ParameterIn::Path || schema.is_required();

        if parameter.location == ParameterIn::Querystring && self.version >= Version::V3_2 {
            let mut map = Map::new();
            map.insert("name".to_string(), json!(parameter.name));
            map.insert("in".to_string(), json!("querystring"));
            insert_some(&mut map, "description", parameter.description.clone());
            if required {
                map.insert("required".to_string(), Value::Bool(true));
            }
            let value = self.emitter.schema_or_ref(&parameter.schema)?;
            map.insert(
                "content".to_string(),
                json!({ "application/x-www-form-urlencoded": { "schema": value } }),
            );
            merge_extensions(&mut map, &parameter.extensions);
            return Ok(Value::Object(map));
        }

        let mut value =
            self.leaf_parameter(parameter, &parameter.name, &parameter.schema, schema, required)?;
        if let Value::Object(map) = &mut value {
            if !self.swagger() && !parameter.examples.is_empty() {
                let examples = self.examples(&parameter.examples)?;
                map.insert("examples".to_string(), examples);
            }
            merge_extensions(map, &parameter.extensions);
        }
        Ok(value)
    }

    fn leaf_parameter(
        &mut self,
        parameter: &'a Parameter,
        name: &str,
        schema: &'a SchemaOrRef,
        resolved: ResolvedSchema<'a>,
        required: bool,
    ) -> Result<Value, ResolveError> {
        let is_array = matches!(resolved.kind(), SchemaKind::Array(_));
        let location = match parameter.location {
            ParameterIn::Querystring => ParameterIn::Query,
            location => location,
        };

        let mut map = Map::new();
        let name = if is_array {
            format!("{}[]", name)
        } else {
            name.to_string()
        };
        map.insert("name".to_string(), json!(name));
        map.insert("in".to_string(), json!(location.as_str()));
        let description = if name == parameter.name {
            parameter.description.as_deref().or(resolved.description())
        } else {
            resolved.description()
        };
        insert_some(&mut map, "description", description);
        if required {
            map.insert("required".to_string(), Value::Bool(true));
        }
        if location == ParameterIn::Query
            && matches!(resolved.existence(), Existence::AllowNil | Existence::AllowEmpty)
        {
            map.insert("allowEmptyValue".to_string(), Value::Bool(true));
        }
        if parameter.deprecated {
            map.insert("deprecated".to_string(), Value::Bool(true));
        }

        if self.swagger() {
            if let Value::Object(fields) = self.emitter.inline(schema)? {
                for (key, value) in fields {
                    map.entry(key).or_insert(value);
                }
            }
            if is_array {
                map.insert("collectionFormat".to_string(), json!("multi"));
            }
        } else {
            let value = self.emitter.schema_or_ref(schema)?;
            map.insert("schema".to_string(), value);
        }
        Ok(Value::Object(map))
    }

    /// OpenAPI 2.0 has no request body object; the body is a parameter.
    fn body_parameter(&mut self, body: &'a OrRef<RequestBody>) -> Result<Value, ResolveError> {
        let body = body.item(self.definitions)?;
        let mut map = Map::new();
        map.insert("name".to_string(), json!("body"));
        map.insert("in".to_string(), json!("body"));
        insert_some(&mut map, "description", body.description.clone());
        if body.is_required() {
            map.insert("required".to_string(), Value::Bool(true));
        }
        if let Some(schema) = body.contents.values().find_map(|c| c.schema.as_ref()) {
            let value = self.emitter.content_schema(schema)?;
            map.insert("schema".to_string(), value);
        }
        merge_extensions(&mut map, &body.extensions);
        Ok(Value::Object(map))
    }

    fn request_body(&mut self, body: &'a OrRef<RequestBody>) -> Result<Value, ResolveError> {
        let body = match body {
            OrRef::Ref(reference) => {
                body.resolve(self.definitions, false)?;
                return Ok(pointer::<RequestBody>(self.version, &reference.name));
            }
            OrRef::Item(body) => body,
        };
        let mut map = Map::new();
        insert_some(&mut map, "description", body.description.clone());
        let mut contents = Map::new();
        for (range, content) in &body.contents {
            let value = self.content(content)?;
            contents.insert(range.to_string(), value);
        }
        map.insert("content".to_string(), Value::Object(contents));
        if body.is_required() {
            map.insert("required".to_string(), Value::Bool(true));
        }
        merge_extensions(&mut map, &body.extensions);
        Ok(Value::Object(map))
    }

    fn content(&mut self, content: &'a Content) -> Result<Value, ResolveError> {
        let mut map = Map::new();
        if let Some(schema) = &content.schema {
            let value = self.emitter.content_schema(schema)?;
            map.insert("schema".to_string(), value);
        }
        if !content.examples.is_empty() {
            let examples = self.examples(&content.examples)?;
            map.insert("examples".to_string(), examples);
        }
        merge_extensions(&mut map, &content.extensions);
        Ok(Value::Object(map))
    }

    fn response(&mut self, response: &'a OrRef<Response>) -> Result<Value, ResolveError> {
        let response = match response {
            OrRef::Ref(reference) => {
                response.resolve(self.definitions, false)?;
                return Ok(pointer::<Response>(self.version, &reference.name));
            }
            OrRef::Item(response) => response,
        };
        let mut map = Map::new();
        map.insert(
            "description".to_string(),
            json!(response.description.clone().unwrap_or_default()),
        );
        if self.version >= Version::V3_2 {
            insert_some(&mut map, "summary", response.summary.clone());
        }

        if self.swagger() {
            if let Some(schema) = response.contents.values().find_map(|c| c.schema.as_ref()) {
                let value = self.emitter.content_schema(schema)?;
                map.insert("schema".to_string(), value);
            }
            let mut examples = Map::new();
            for (media_type, content) in &response.contents {
                let first = content.examples.values().next();
                if let Some(example) = first {
                    let example = example.item(self.definitions)?;
                    if let Some(value) = &example.value {
                        examples.insert(media_type.to_string(), value.clone());
                    }
                }
            }
            if !examples.is_empty() {
                map.insert("examples".to_string(), Value::Object(examples));
            }
        } else if !response.contents.is_empty() {
            let mut contents = Map::new();
            for (media_type, content) in &response.contents {
                let value = self.content(content)?;
                contents.insert(media_type.to_string(), value);
            }
            map.insert("content".to_string(), Value::Object(contents));
        }

        if !response.headers.is_empty() {
            let mut headers = Map::new();
            for (name, header) in &response.headers {
                let value = self.header(header)?;
                headers.insert(name.clone(), value);
            }
            map.insert("headers".to_string(), Value::Object(headers));
        }
        if !self.swagger() && !response.links.is_empty() {
            let mut links = Map::new();
            for (name, link) in &response.links {
                links.insert(name.clone(), self.link(link)?);
            }
            map.insert("links".to_string(), Value::Object(links));
        }
        merge_extensions(&mut map, &response.extensions);
        Ok(Value::Object(map))
    }

    fn header(&mut self, header: &'a OrRef<Header>) -> Result<Value, ResolveError> {
        if let (OrRef::Ref(reference), false) = (header, self.swagger()) {
            header.resolve(self.definitions, false)?;
            return Ok(pointer::<Header>(self.version, &reference.name));
        }
        let header = header.item(self.definitions)?;
        let mut map = Map::new();
        insert_some(&mut map, "description", header.description.clone());
        if self.swagger() {
            if let Value::Object(fields) = self.emitter.inline(&header.schema)? {
                for (key, value) in fields {
                    map.entry(key).or_insert(value);
                }
            }
        } else {
            if header.schema.resolved(self.definitions)?.is_required() {
                map.insert("required".to_string(), Value::Bool(true));
            }
            if header.deprecated {
                map.insert("deprecated".to_string(), Value::Bool(true));
            }
            let value = self.emitter.schema_or_ref(&header.schema)?;
            map.insert("schema".to_string(), value);
        }
        merge_extensions(&mut map, &header.extensions);
        Ok(Value::Object(map))
    }

    fn examples(
        &mut self,
        examples: &'a IndexMap<String, OrRef<Example>>,
    ) -> Result<Value, ResolveError> {
        let mut map = Map::new();
        for (name, example) in examples {
            map.insert(name.clone(), self.example(example)?);
        }
        Ok(Value::Object(map))
    }

    fn example(&mut self, example: &'a OrRef<Example>) -> Result<Value, ResolveError> {
        let example = match example {
            OrRef::Ref(reference) => {
                example.resolve(self.definitions, false)?;
                return Ok(pointer::<Example>(self.version, &reference.name));
            }
            OrRef::Item(example) => example,
        };
        let value_key = if self.version >= Version::V3_2 {
            "dataValue"
        } else {
            "value"
        };
        let mut map = Map::new();
        insert_some(&mut map, "summary", example.summary.clone());
        insert_some(&mut map, "description", example.description.clone());
        insert_some(&mut map, value_key, example.value.clone());
        insert_some(&mut map, "externalValue", example.external_value.clone());
        merge_extensions(&mut map, &example.extensions);
        Ok(Value::Object(map))
    }

    fn link(&mut self, link: &'a OrRef<Link>) -> Result<Value, ResolveError> {
        let link = match link {
            OrRef::Ref(reference) => {
                link.resolve(self.definitions, false)?;
                return Ok(pointer::<Link>(self.version, &reference.name));
            }
            OrRef::Item(link) => link,
        };
        let mut map = Map::new();
        insert_some(&mut map, "operationId", link.operation_id.clone());
        if !link.parameters.is_empty() {
            map.insert("parameters".to_string(), json!(link.parameters));
        }
        insert_some(&mut map, "requestBody", link.request_body.clone());
        insert_some(&mut map, "description", link.description.clone());
        if let Some(server) = &link.server {
            map.insert("server".to_string(), server_value(server));
        }
        merge_extensions(&mut map, &link.extensions);
        Ok(Value::Object(map))
    }

    fn callback(&mut self, callback: &'a OrRef<Callback>) -> Result<Value, ResolveError> {
        let callback = match callback {
            OrRef::Ref(reference) => {
                callback.resolve(self.definitions, false)?;
                return Ok(pointer::<Callback>(self.version, &reference.name));
            }
            OrRef::Item(callback) => callback,
        };
        let mut map = Map::new();
        for (expression, operations) in &callback.expressions {
            let mut item = Map::new();
            for operation in operations {
                if let Some((false, method)) = self.method_slot(&operation.method) {
                    let value = self.operation(operation)?;
                    item.insert(method, value);
                }
            }
            map.insert(expression.clone(), Value::Object(item));
        }
        Ok(Value::Object(map))
    }

    fn security_scheme(&self, name: &str, scheme: &SecurityScheme) -> Option<Value> {
        let mut map = Map::new();
        let supported = match scheme {
            SecurityScheme::ApiKey { name: key, location, .. } => {
                map.insert("type".to_string(), json!("apiKey"));
                map.insert("name".to_string(), json!(key));
                let location = match location {
                    ApiKeyIn::Query => "query",
                    ApiKeyIn::Header => "header",
                    ApiKeyIn::Cookie => "cookie",
                };
                map.insert("in".to_string(), json!(location));
                !(self.swagger() && location == "cookie")
            }
            SecurityScheme::Http { scheme, bearer_format, .. } => {
                if self.swagger() {
                    map.insert("type".to_string(), json!("basic"));
                    scheme.eq_ignore_ascii_case("basic")
                } else {
                    map.insert("type".to_string(), json!("http"));
                    map.insert("scheme".to_string(), json!(scheme));
                    insert_some(&mut map, "bearerFormat", bearer_format.clone());
                    true
                }
            }
            SecurityScheme::OAuth2 { flows, oauth2_metadata_url, .. } => {
                map.insert("type".to_string(), json!("oauth2"));
                if self.swagger() {
                    let flow = [
                        ("implicit", &flows.implicit),
                        ("password", &flows.password),
                        ("application", &flows.client_credentials),
                        ("accessCode", &flows.authorization_code),
                    ]
                    .into_iter()
                    .find_map(|(name, flow)| flow.as_ref().map(|flow| (name, flow)));
                    match flow {
                        Some((flow_name, flow)) => {
                            map.insert("flow".to_string(), json!(flow_name));
                            if let Value::Object(fields) = oauth_flow_value(flow) {
                                map.extend(fields);
                            }
                            true
                        }
                        None => false,
                    }
                } else {
                    let mut value = Map::new();
                    let mut add = |key: &str, flow: &Option<OAuthFlow>| {
                        if let Some(flow) = flow {
                            value.insert(key.to_string(), oauth_flow_value(flow));
                        }
                    };
                    add("implicit", &flows.implicit);
                    add("password", &flows.password);
                    add("clientCredentials", &flows.client_credentials);
                    add("authorizationCode", &flows.authorization_code);
                    if self.version >= Version::V3_2 {
                        add("deviceAuthorization", &flows.device_authorization);
                        insert_some(&mut map, "oauth2MetadataUrl", oauth2_metadata_url.clone());
                    }
                    map.insert("flows".to_string(), Value::Object(value));
                    true
                }
            }
            SecurityScheme::OpenIdConnect { open_id_connect_url, .. } => {
                map.insert("type".to_string(), json!("openIdConnect"));
                map.insert("openIdConnectUrl".to_string(), json!(open_id_connect_url));
                !self.swagger()
            }
            SecurityScheme::MutualTls { .. } => {
                map.insert("type".to_string(), json!("mutualTLS"));
                self.version >= Version::V3_1
            }
        };
        if !supported {
            tracing::warn!(
                scheme = name,
                kind = scheme.type_name(),
                version = %self.version,
                "security scheme not supported by OpenAPI version, dropped"
            );
            return None;
        }
        insert_some(&mut map, "description", scheme.description().map(str::to_string));
        Some(Value::Object(map))
    }

    fn security_schemes(&self) -> Result<Map<String, Value>, ResolveError> {
        let mut map = Map::new();
        for (name, scheme) in self.definitions.security_schemes() {
            let value = match scheme {
                OrRef::Ref(reference) if !self.swagger() => {
                    scheme.resolve(self.definitions, false)?;
                    Some(pointer::<SecurityScheme>(self.version, &reference.name))
                }
                _ => self.security_scheme(name, scheme.item(self.definitions)?),
            };
            if let Some(value) = value {
                map.insert(name.to_string(), value);
            }
        }
        Ok(map)
    }

    fn components(&mut self) -> Result<Map<String, Value>, ResolveError> {
        let defs = self.definitions;
        let mut components = Map::new();

        let mut schemas = Map::new();
        for (name, schema) in defs.schemas() {
            schemas.insert(name.to_string(), self.emitter.schema_or_ref(schema)?);
        }
        let mut responses = Map::new();
        for (name, response) in defs.responses() {
            if !is_nodoc(response, defs)? {
                responses.insert(name.to_string(), self.response(response)?);
            }
        }
        let mut parameters = Map::new();
        for (name, parameter) in defs.parameters() {
            let value = match parameter {
                OrRef::Ref(reference) => {
                    parameter.resolve(defs, false)?;
                    pointer::<Parameter>(self.version, &reference.name)
                }
                OrRef::Item(item) => self.parameter_object(item)?,
            };
            parameters.insert(name.to_string(), value);
        }
        let mut examples = Map::new();
        for (name, example) in defs.examples() {
            examples.insert(name.to_string(), self.example(example)?);
        }
        let mut request_bodies = Map::new();
        for (name, body) in defs.request_bodies() {
            request_bodies.insert(name.to_string(), self.request_body(body)?);
        }
        let mut headers = Map::new();
        for (name, header) in defs.headers() {
            headers.insert(name.to_string(), self.header(header)?);
        }
        let security_schemes = self.security_schemes()?;
        let mut links = Map::new();
        for (name, link) in defs.links() {
            links.insert(name.to_string(), self.link(link)?);
        }
        let mut callbacks = Map::new();
        for (name, callback) in defs.callbacks() {
            callbacks.insert(name.to_string(), self.callback(callback)?);
        }

        for (key, table) in [
            ("schemas", schemas),
            ("responses", responses),
            ("parameters", parameters),
            ("examples", examples),
            ("requestBodies", request_bodies),
            ("headers", headers),
            ("securitySchemes", security_schemes),
            ("links", links),
            ("callbacks", callbacks),
        ] {
            if !table.is_empty() {
                components.insert(key.to_string(), Value::Object(table));
            }
        }
        Ok(components)
    }

    /// OpenAPI 2.0 keeps reusable objects in flat top-level tables.
    fn swagger_components(&mut self, doc: &mut Map<String, Value>) -> Result<(), ResolveError> {
        let defs = self.definitions;
        let mut definitions = Map::new();
        for (name, schema) in defs.schemas() {
            definitions.insert(name.to_string(), self.emitter.schema_or_ref(schema)?);
        }
        let mut parameters = Map::new();
        for (name, parameter) in defs.parameters() {
            let item = parameter.item(defs)?;
            parameters.insert(name.to_string(), self.parameter_object(item)?);
        }
        let mut responses = Map::new();
        for (name, response) in defs.responses() {
            if !is_nodoc(response, defs)? {
                responses.insert(name.to_string(), self.response(response)?);
            }
        }
        let security_definitions = self.security_schemes()?;
        for (key, table) in [
            ("definitions", definitions),
            ("parameters", parameters),
            ("responses", responses),
            ("securityDefinitions", security_definitions),
        ] {
            if !table.is_empty() {
                doc.insert(key.to_string(), Value::Object(table));
            }
        }
        Ok(())
    }

    /// `consumes` and `produces` of an OpenAPI 2.0 document.
    fn media_summaries(&self) -> Result<(Vec<String>, Vec<String>), ResolveError> {
        let defs = self.definitions;
        let mut consumes = Vec::new();
        let mut produces = Vec::new();
        for operation in defs.operations() {
            if let Some(body) = &operation.request_body {
                consumes.extend(body.item(defs)?.contents.keys().cloned());
            }
            for response in defs.operation_responses(operation).values() {
                let response = response.item(defs)?;
                produces.extend(response.contents.keys().cloned().map(MediaRange::from));
            }
        }
        let strings = |ranges: Vec<MediaRange>| {
            MediaRange::reduce(ranges.iter())
                .into_iter()
                .map(|range| range.to_string())
                .collect()
        };
        Ok((strings(consumes), strings(produces)))
    }
}

fn is_nodoc(response: &OrRef<Response>, definitions: Definitions<'_>) -> Result<bool, ResolveError> {
    Ok(response.is_nodoc_reference(definitions) || response.item(definitions)?.nodoc)
}

fn oauth_flow_value(flow: &OAuthFlow) -> Value {
    let mut map = Map::new();
    insert_some(&mut map, "authorizationUrl", flow.authorization_url.clone());
    insert_some(&mut map, "deviceAuthorizationUrl", flow.device_authorization_url.clone());
    insert_some(&mut map, "tokenUrl", flow.token_url.clone());
    insert_some(&mut map, "refreshUrl", flow.refresh_url.clone());
    map.insert("scopes".to_string(), json!(flow.scopes));
    Value::Object(map)
}

fn server_value(server: &Server) -> Value {
    let mut map = Map::new();
    map.insert("url".to_string(), json!(server.url));
    insert_some(&mut map, "description", server.description.clone());
    if !server.variables.is_empty() {
        let mut variables = Map::new();
        for (name, variable) in &server.variables {
            let mut value = Map::new();
            if !variable.enum_values.is_empty() {
                value.insert("enum".to_string(), json!(variable.enum_values));
            }
            value.insert("default".to_string(), json!(variable.default));
            insert_some(&mut value, "description", variable.description.clone());
            variables.insert(name.clone(), Value::Object(value));
        }
        map.insert("variables".to_string(), Value::Object(variables));
    }
    Value::Object(map)
}

fn servers_value(servers: &[&Server]) -> Value {
    Value::Array(servers.iter().map(|server| server_value(server)).collect())
}

/// Splits the first server URL into `schemes`, `host` and `basePath`.
fn swagger_server(url: &str, doc: &mut Map<String, Value>) {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let (host, base_path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    if let Some(scheme) = scheme {
        doc.insert("schemes".to_string(), json!([scheme]));
    }
    if !host.is_empty() {
        doc.insert("host".to_string(), json!(host));
    }
    doc.insert("basePath".to_string(), json!(base_path));
}

fn security_value(security: &[&SecurityRequirement]) -> Value {
    Value::Array(
        security
            .iter()
            .map(|requirement| json!(requirement.schemes))
            .collect(),
    )
}

fn tag_value(tag: &Tag) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(tag.name));
    insert_some(&mut map, "description", tag.description.clone());
    if let Some(docs) = &tag.external_docs {
        map.insert("externalDocs".to_string(), external_docs(docs));
    }
    merge_extensions(&mut map, &tag.extensions);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Path, SecurityRequirement};
    use crate::definitions::{DefinitionsId, Registry};
    use crate::schema::{Property, Schema};

    fn with_registry(
        build: impl FnOnce(&mut crate::definitions::DefinitionsMut<'_>),
    ) -> (Registry, DefinitionsId) {
        let mut registry = Registry::new();
        let id = registry.create();
        build(&mut registry.definitions_mut(id).unwrap());
        (registry, id)
    }

    fn generate((registry, id): &(Registry, DefinitionsId), version: Version) -> Value {
        document(registry.definitions(*id), version).unwrap()
    }

    #[test]
    fn string_body_is_not_nullable() {
        let registry = with_registry(|defs| {
            let operation = Operation::new(Method::Post, "/echo")
                .with_request_body(RequestBody::json(Schema::string()))
                .response(200u16, Response::default());
            defs.add_operation("echo", operation).unwrap();
        });
        let doc = generate(&registry, Version::V3_1);
        assert_eq!(doc["openapi"], json!("3.1.1"));
        assert_eq!(
            doc["paths"]["/echo"]["post"]["requestBody"],
            json!({ "content": { "application/json": { "schema": { "type": "string" } } } })
        );
        assert_eq!(doc["paths"]["/echo"]["post"]["responses"]["200"], json!({ "description": "" }));
    }

    #[test]
    fn methods_are_gated_by_version() {
        let registry = with_registry(|defs| {
            defs.add_operation("trace", Operation::new(Method::Trace, "/a")).unwrap();
            defs.add_operation("query", Operation::new(Method::Query, "/a")).unwrap();
            defs.add_operation("purge", Operation::new(Method::Other("purge".into()), "/a"))
                .unwrap();
        });

        let v2 = generate(&registry, Version::V2_0);
        assert_eq!(v2["swagger"], json!("2.0"));
        assert_eq!(v2["paths"], json!({}));

        let v3 = generate(&registry, Version::V3_1);
        let item = v3["paths"]["/a"].as_object().unwrap();
        assert_eq!(item.keys().collect::<Vec<_>>(), vec!["trace"]);

        let v32 = generate(&registry, Version::V3_2);
        let item = &v32["paths"]["/a"];
        assert!(item.get("query").is_some());
        assert!(item["additionalOperations"].get("PURGE").is_some());
    }

    #[test]
    fn object_query_parameters_are_exploded() {
        let registry = with_registry(|defs| {
            let filter = Schema::object()
                .property("name", Property::new(Schema::string()))
                .property(
                    "tags",
                    Property::new(Schema::array(Schema::string()).with_existence(Existence::AllowEmpty)),
                )
                .property(
                    "range",
                    Property::new(
                        Schema::object().property(
                            "from",
                            Property::new(Schema::integer().with_existence(Existence::Present)),
                        ),
                    ),
                );
            let operation = Operation::new(Method::Get, "/items")
                .parameter(Parameter::query("filter", filter))
                .response(200u16, Response::default());
            defs.add_operation("list", operation).unwrap();
        });

        let doc = generate(&registry, Version::V3_0);
        let names: Vec<_> = doc["paths"]["/items"]["get"]["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["filter[name]", "filter[tags][]", "filter[range][from]"]);

        let doc = generate(&registry, Version::V2_0);
        let tags = &doc["paths"]["/items"]["get"]["parameters"][1];
        assert_eq!(tags["collectionFormat"], json!("multi"));
        assert_eq!(tags["type"], json!("array"));
        assert_eq!(tags["allowEmptyValue"], json!(true));
    }

    #[test]
    fn nodoc_responses_are_left_out() {
        let registry = with_registry(|defs| {
            let hidden = Response {
                nodoc: true,
                ..Response::default()
            };
            defs.add_response("Hidden", hidden).unwrap();
            let operation = Operation::new(Method::Get, "/a")
                .response(200u16, Response::default().with_description("ok"))
                .response(500u16, OrRef::<Response>::reference("Hidden"));
            defs.add_operation("a", operation).unwrap();
        });
        let doc = generate(&registry, Version::V3_0);
        assert_eq!(
            doc["paths"]["/a"]["get"]["responses"],
            json!({ "200": { "description": "ok" } })
        );
        assert!(doc["components"].get("responses").is_none());
    }

    #[test]
    fn example_values_are_renamed_in_3_2() {
        let registry = with_registry(|defs| {
            defs.add_example("One", Example::value(json!(1))).unwrap();
        });
        let doc = generate(&registry, Version::V3_1);
        assert_eq!(doc["components"]["examples"]["One"], json!({ "value": 1 }));
        let doc = generate(&registry, Version::V3_2);
        assert_eq!(doc["components"]["examples"]["One"], json!({ "dataValue": 1 }));
    }

    #[test]
    fn swagger_layout() {
        let registry = with_registry(|defs| {
            defs.add_server(Server::new("https://api.example.com/v1")).unwrap();
            defs.add_schema("Pet", Schema::object()).unwrap();
            defs.add_security_scheme(
                "basic",
                SecurityScheme::Http {
                    scheme: "basic".into(),
                    bearer_format: None,
                    description: None,
                },
            )
            .unwrap();
            defs.add_security_scheme(
                "oidc",
                SecurityScheme::OpenIdConnect {
                    open_id_connect_url: "https://auth".into(),
                    description: None,
                },
            )
            .unwrap();
            let operation = Operation::new(Method::Post, "/pets")
                .with_request_body(RequestBody::json(SchemaOrRef::reference("Pet")))
                .response(201u16, Response::json(SchemaOrRef::reference("Pet")));
            defs.add_operation("create", operation).unwrap();
        });

        let doc = generate(&registry, Version::V2_0);
        assert_eq!(doc["host"], json!("api.example.com"));
        assert_eq!(doc["basePath"], json!("/v1"));
        assert_eq!(doc["schemes"], json!(["https"]));
        assert_eq!(doc["consumes"], json!(["application/json"]));
        assert_eq!(doc["produces"], json!(["application/json"]));
        assert_eq!(
            doc["paths"]["/pets"]["post"]["parameters"][0],
            json!({
                "name": "body",
                "in": "body",
                "schema": { "$ref": "#/definitions/Pet" }
            })
        );
        assert_eq!(
            doc["paths"]["/pets"]["post"]["responses"]["201"]["schema"],
            json!({ "$ref": "#/definitions/Pet" })
        );
        assert!(doc["definitions"].get("Pet").is_some());
        assert_eq!(doc["securityDefinitions"], json!({ "basic": { "type": "basic" } }));
        assert!(doc.get("components").is_none());
    }

    #[test]
    fn security_inherits_from_paths() {
        let registry = with_registry(|defs| {
            let requirement = SecurityRequirement::new().scheme("api_key", vec![]);
            defs.add_security_requirement(SecurityRequirement::new().scheme("basic", vec![]))
                .unwrap();
            defs.add_path(
                "/admin",
                Path {
                    security: vec![requirement],
                    ..Path::default()
                },
            )
            .unwrap();
            defs.add_operation("stats", Operation::new(Method::Get, "/admin/stats")).unwrap();
            defs.add_operation("health", Operation::new(Method::Get, "/health")).unwrap();
        });

        let doc = generate(&registry, Version::V3_0);
        assert_eq!(doc["security"], json!([{ "basic": [] }]));
        assert_eq!(doc["paths"]["/admin/stats"]["get"]["security"], json!([{ "api_key": [] }]));
        assert!(doc["paths"]["/health"]["get"].get("security").is_none());
    }
}
