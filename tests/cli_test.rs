//! CLI integration tests for the apidef binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("apidef"))
}

// Helper to create a temp definitions file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const PETS: &str = r#"{
    "info": { "title": "Pets", "version": "1.0" },
    "schemas": {
        "Pet": {
            "type": "object",
            "properties": {
                "name": { "type": "string", "existence": true },
                "born": { "type": "string", "format": "date" },
                "tag": { "type": "string" }
            }
        },
        "Pets": { "type": "array", "items": { "ref": "Pet" } }
    },
    "operations": {
        "create_pet": {
            "method": "post",
            "path": "/pets",
            "request_body": { "content": { "application/json": { "schema": { "type": "string" } } } },
            "responses": { "201": { "content": { "application/json": { "schema": { "ref": "Pet" } } } } }
        }
    }
}"#;

mod openapi_command {
    use super::*;

    #[test]
    fn default_version() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);

        cmd()
            .args(["openapi", defs.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""openapi":"3.1.1""#))
            .stdout(predicate::str::contains(r##""$ref":"#/components/schemas/Pet""##));
    }

    #[test]
    fn swagger_body_parameter() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);

        cmd()
            .args(["openapi", defs.to_str().unwrap(), "--openapi-version", "2.0"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""swagger":"2.0""#))
            .stdout(predicate::str::contains(r#""in":"body""#));
    }

    #[test]
    fn request_body_is_not_nullable() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);

        cmd()
            .args(["openapi", defs.to_str().unwrap(), "--openapi-version", "3.0"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#""requestBody":{"content":{"application/json":{"schema":{"type":"string"}}}}"#,
            ));
    }

    #[test]
    fn with_output_file() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);
        let output = dir.path().join("openapi.json");

        cmd()
            .args([
                "openapi",
                defs.to_str().unwrap(),
                "--pretty",
                "--output",
                output.to_str().unwrap(),
            ])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());

        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains('\n'));
        assert!(content.contains(r#""title": "Pets""#));
    }

    #[test]
    fn unsupported_version() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);

        cmd()
            .args(["openapi", defs.to_str().unwrap(), "--openapi-version", "4.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("version"));
    }
}

mod json_schema_command {
    use super::*;

    #[test]
    fn bundles_referenced_schemas() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);

        cmd()
            .args(["json-schema", defs.to_str().unwrap(), "--schema", "Pets"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r##""$ref":"#/definitions/Pet""##))
            .stdout(predicate::str::contains(r#""definitions":{"Pet":"#));
    }

    #[test]
    fn unknown_schema() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);

        cmd()
            .args(["json-schema", defs.to_str().unwrap(), "--schema", "Cat"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("schema reference can't be resolved: Cat"));
    }
}

mod validate_command {
    use super::*;

    #[test]
    fn valid_payload() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);
        let payload = write_temp_file(&dir, "pet.json", r#"{"name": "Rex"}"#);

        cmd()
            .args([
                "validate",
                defs.to_str().unwrap(),
                payload.to_str().unwrap(),
                "--schema",
                "Pet",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid"));
    }

    #[test]
    fn missing_required_field() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);
        let payload = write_temp_file(&dir, "pet.json", r#"{"tag": "dog"}"#);

        cmd()
            .args([
                "validate",
                defs.to_str().unwrap(),
                payload.to_str().unwrap(),
                "--schema",
                "Pet",
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Validation failed"))
            .stderr(predicate::str::contains("name"));
    }

    #[test]
    fn json_output_invalid() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);
        let payload = write_temp_file(&dir, "pet.json", r#"{"name": 42}"#);

        cmd()
            .args([
                "validate",
                defs.to_str().unwrap(),
                payload.to_str().unwrap(),
                "--schema",
                "Pet",
                "--json",
            ])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""valid":false"#))
            .stdout(predicate::str::contains(r#""path":"/name""#));
    }

    #[test]
    fn json_output_file_error() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);

        cmd()
            .args([
                "validate",
                defs.to_str().unwrap(),
                "/nonexistent/pet.json",
                "--schema",
                "Pet",
                "--json",
            ])
            .assert()
            .code(3)
            .stdout(predicate::str::contains(r#""valid":false"#))
            .stdout(predicate::str::contains("loading payload"));
    }
}

mod serialize_command {
    use super::*;

    #[test]
    fn formats_and_omits() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);
        let value = write_temp_file(
            &dir,
            "pet.json",
            r#"{"name": "Rex", "born": "2020-05-01T10:00:00Z", "owner": "Ann"}"#,
        );

        cmd()
            .args([
                "serialize",
                defs.to_str().unwrap(),
                value.to_str().unwrap(),
                "--schema",
                "Pet",
                "--omit",
                "nil",
            ])
            .assert()
            .success()
            .stdout(predicate::str::diff("{\"name\":\"Rex\",\"born\":\"2020-05-01\"}\n"));
    }

    #[test]
    fn json_sequence() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);
        let value = write_temp_file(&dir, "pets.json", r#"[{"name": "Rex"}, {"name": "Tom"}]"#);

        cmd()
            .args([
                "serialize",
                defs.to_str().unwrap(),
                value.to_str().unwrap(),
                "--schema",
                "Pets",
                "--omit",
                "nil",
                "--seq",
            ])
            .assert()
            .success()
            .stdout(predicate::str::diff(
                "\u{1e}{\"name\":\"Rex\"}\n\u{1e}{\"name\":\"Tom\"}\n",
            ));
    }

    #[test]
    fn nil_required_property() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", PETS);
        let value = write_temp_file(&dir, "pets.json", r#"[{"name": "Rex"}, {"tag": "cat"}]"#);

        cmd()
            .args([
                "serialize",
                defs.to_str().unwrap(),
                value.to_str().unwrap(),
                "--schema",
                "Pets",
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("[1].name can't be nil"));
    }
}

mod lint_command {
    use super::*;

    #[test]
    fn clean_definitions() {
        let dir = TempDir::new().unwrap();
        write_temp_file(&dir, "api.json", PETS);

        cmd()
            .args(["lint", dir.path().to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 files checked, all passed"));
    }

    #[test]
    fn broken_reference() {
        let dir = TempDir::new().unwrap();
        write_temp_file(
            &dir,
            "api.json",
            r#"{"schemas": {"Pet": {"type": "object", "properties": {"owner": {"ref": "Owner"}}}}}"#,
        );

        cmd()
            .args(["lint", dir.path().to_str().unwrap(), "--format", "json"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""code": "E002""#))
            .stdout(predicate::str::contains("/schemas/Pet/properties/owner"));
    }

    #[test]
    fn strict_mode_fails_on_warnings() {
        let dir = TempDir::new().unwrap();
        write_temp_file(
            &dir,
            "api.json",
            r#"{"operations": {"ping": {"method": "get", "path": "/ping"}}}"#,
        );

        cmd()
            .args(["lint", dir.path().to_str().unwrap()])
            .assert()
            .success();

        cmd()
            .args(["lint", dir.path().to_str().unwrap(), "--strict"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("W001"));
    }

    #[test]
    fn path_not_found() {
        cmd()
            .args(["lint", "/nonexistent/defs"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("path not found"));
    }
}

mod errors {
    use super::*;

    #[test]
    fn file_not_found() {
        cmd()
            .args(["openapi", "/nonexistent/api.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }

    #[test]
    fn invalid_json() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", "{ not json }");

        cmd()
            .args(["openapi", defs.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid JSON"));
    }

    #[test]
    fn configuration_error() {
        let dir = TempDir::new().unwrap();
        let defs = write_temp_file(&dir, "api.json", r#"{"schemas": {" ": {"type": "string"}}}"#);

        cmd()
            .args(["openapi", defs.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("schema name can't be blank"));
    }

    #[test]
    fn missing_schema_flag() {
        cmd()
            .args(["json-schema", "api.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--schema"));
    }

    #[test]
    fn help_flag() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("openapi"))
            .stdout(predicate::str::contains("json-schema"))
            .stdout(predicate::str::contains("serialize"));
    }
}
