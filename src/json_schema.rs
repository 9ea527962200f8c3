//! JSON Schema document generation.
//!
//! The document for a schema embeds every schema reachable from it under
//! `definitions`, so it can be used without the registry. References back
//! to the document's own schema become `"#"`.

use serde_json::{Map, Value};

use crate::definitions::Definitions;
use crate::emit::{Dialect, Emitter};
use crate::error::{ReferenceError, ResolveError};
use crate::reference::ComponentKind;

/// Builds the JSON Schema document of the schema `name`.
///
/// # Errors
///
/// Returns `ResolveError` if `name` or any schema reachable from it can't be
/// resolved.
pub fn document(definitions: Definitions<'_>, name: &str) -> Result<Value, ResolveError> {
    let root = definitions.find_schema(name).ok_or_else(|| ReferenceError {
        kind: ComponentKind::Schema,
        name: name.to_string(),
    })?;

    let mut emitter = Emitter::new(definitions, Dialect::JsonSchema).with_root(name);
    let mut document = match emitter.content_schema(root)? {
        Value::Object(map) => map,
        other => return Ok(other),
    };

    let mut bundled = Map::new();
    let mut next = 0;
    while let Some(referenced) = emitter.referenced().get(next).cloned() {
        next += 1;
        if referenced == name {
            continue;
        }
        let Some(schema) = definitions.find_schema(&referenced) else {
            continue;
        };
        let value = emitter.schema_or_ref(schema)?;
        bundled.insert(referenced, value);
    }
    if !bundled.is_empty() {
        document.insert("definitions".to_string(), Value::Object(bundled));
    }
    Ok(Value::Object(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{DefinitionsId, Registry};
    use crate::reference::SchemaOrRef;
    use crate::schema::{Property, Schema};
    use crate::types::Existence;
    use serde_json::json;

    fn registry() -> (Registry, DefinitionsId) {
        let mut registry = Registry::new();
        let id = registry.create();
        let mut defs = registry.definitions_mut(id).unwrap();
        defs.add_schema(
            "Node",
            Schema::object()
                .property("value", Property::new(Schema::string().with_existence(Existence::Present)))
                .property("next", Property::new(SchemaOrRef::reference("Node")))
                .property("owner", Property::new(SchemaOrRef::reference("Owner"))),
        )
        .unwrap();
        defs.add_schema(
            "Owner",
            Schema::object().property("address", Property::new(SchemaOrRef::reference("Address"))),
        )
        .unwrap();
        defs.add_schema("Address", Schema::string()).unwrap();
        defs.add_schema("Unused", Schema::integer()).unwrap();
        (registry, id)
    }

    #[test]
    fn bundles_reachable_schemas() {
        let (registry, id) = registry();
        let defs = registry.definitions(id);
        let doc = document(defs, "Node").unwrap();

        assert_eq!(doc["type"], json!("object"));
        assert_eq!(doc["required"], json!(["value"]));
        assert_eq!(doc["properties"]["next"], json!({ "$ref": "#" }));
        assert_eq!(doc["properties"]["owner"], json!({ "$ref": "#/definitions/Owner" }));

        let bundled = doc["definitions"].as_object().unwrap();
        assert_eq!(bundled.keys().collect::<Vec<_>>(), vec!["Owner", "Address"]);
        assert_eq!(bundled["Address"], json!({ "type": ["string", "null"] }));
    }

    #[test]
    fn schema_without_references_has_no_definitions() {
        let (registry, id) = registry();
        let defs = registry.definitions(id);
        assert_eq!(document(defs, "Unused").unwrap(), json!({ "type": "integer" }));
    }

    #[test]
    fn unknown_schema_is_an_error() {
        let (registry, id) = registry();
        let defs = registry.definitions(id);
        let err = document(defs, "Missing").unwrap_err();
        assert_eq!(err.to_string(), "schema reference can't be resolved: Missing");
    }
}
