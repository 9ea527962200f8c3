//! Payload validation against generated JSON Schema documents.

use serde_json::Value;

use crate::definitions::Definitions;
use crate::error::{ValidateError, ValidationError};
use crate::json_schema;

/// Validate a payload against the schema named `name`.
///
/// Builds the schema's JSON Schema document, then validates the payload
/// against it.
///
/// # Errors
///
/// Returns `ValidateError::Resolve` if the document can't be built, or
/// `ValidateError::Invalid` if the payload doesn't match the schema.
pub fn validate(definitions: Definitions<'_>, name: &str, payload: &Value) -> Result<(), ValidateError> {
    let document = json_schema::document(definitions, name)?;
    validate_against_schema(&document, payload)
}

/// Validate a payload against an already-built JSON Schema document.
///
/// Use this when you've already built the document and want to validate
/// multiple payloads against it.
pub fn validate_against_schema(schema: &Value, payload: &Value) -> Result<(), ValidateError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ValidateError::Schema {
        message: e.to_string(),
    })?;

    let errors: Vec<ValidationError> = validator
        .iter_errors(payload)
        .map(|e| ValidationError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
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
            "Pet",
            Schema::object()
                .property("name", Property::new(Schema::string().with_existence(Existence::Present)))
                .property("owner", Property::new(SchemaOrRef::reference("Owner"))),
        )
        .unwrap();
        defs.add_schema(
            "Owner",
            Schema::object().property("email", Property::new(Schema::string().with_format("email"))),
        )
        .unwrap();
        (registry, id)
    }

    #[test]
    fn validate_valid_payload() {
        let (registry, id) = registry();
        let defs = registry.definitions(id);
        let payload = json!({ "name": "Rex", "owner": { "email": "ann@example.com" } });
        assert!(validate(defs, "Pet", &payload).is_ok());
    }

    #[test]
    fn validate_missing_required_field() {
        let (registry, id) = registry();
        let defs = registry.definitions(id);
        let result = validate(defs, "Pet", &json!({}));
        match result {
            Err(ValidateError::Invalid { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "");
                assert!(errors[0].message.contains("name"));
            }
            other => panic!("expected invalid payload, got {:?}", other),
        }
    }

    #[test]
    fn validate_reports_nested_paths() {
        let (registry, id) = registry();
        let defs = registry.definitions(id);
        let result = validate(defs, "Pet", &json!({ "name": "Rex", "owner": { "email": 1 } }));
        match result {
            Err(ValidateError::Invalid { errors }) => {
                assert_eq!(errors[0].path, "/owner/email");
            }
            other => panic!("expected invalid payload, got {:?}", other),
        }
    }

    #[test]
    fn validate_unknown_schema() {
        let (registry, id) = registry();
        let defs = registry.definitions(id);
        let err = validate(defs, "Cat", &json!({})).unwrap_err();
        assert!(matches!(err, ValidateError::Resolve(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn validate_against_invalid_schema() {
        let err = validate_against_schema(&json!({ "type": 12 }), &json!({})).unwrap_err();
        assert!(matches!(err, ValidateError::Schema { .. }));
    }
}
