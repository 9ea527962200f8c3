//! Definitions linting - static analysis of definitions files.
//!
//! Checks definitions for:
//! - files that can't be loaded (syntax, shape, configuration errors)
//! - references that can't be resolved
//! - circular `all_of` chains
//! - discriminator mappings naming unknown schemas
//! - operations without responses and unknown security schemes (warnings)

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::components::{Content, Operation, Response};
use crate::definitions::{Definitions, Registry};
use crate::loader::load_definitions;
use crate::reference::{Component, OrRef, SchemaOrRef};
use crate::schema::SchemaKind;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    /// Location of the issue within the definitions (e.g., "/operations/list_pets/responses").
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, path, message)
        }
    }
}

/// Result of linting a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a directory or set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if all files passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint a definitions file or a directory of them.
///
/// If path is a directory, recursively finds all .json files.
/// If `strict` is true, warnings are treated as errors.
pub fn lint(path: &Path, strict: bool) -> LintResult {
    let files = collect_definitions_files(path);
    let results: Vec<FileResult> = files.iter().map(|file| lint_file(file, path)).collect();

    let count = |severity| {
        results
            .iter()
            .flat_map(|r| &r.diagnostics)
            .filter(|d| d.severity == severity)
            .count()
    };
    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: files.len(),
        passed: files.len() - failed,
        failed,
        errors: count(Severity::Error),
        warnings: count(Severity::Warning),
        results,
    }
}

/// Lint a single definitions file, loading its includes and parent.
pub fn lint_file(file: &Path, base_path: &Path) -> FileResult {
    let mut registry = Registry::new();
    let diagnostics = match load_definitions(&mut registry, &file.display().to_string()) {
        Ok(id) => lint_definitions(registry.definitions(id)),
        Err(e) => vec![Diagnostic::error("E001", "/", format!("can't load definitions: {}", e))],
    };

    let status = if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        FileStatus::Error
    } else if diagnostics.is_empty() {
        FileStatus::Ok
    } else {
        FileStatus::Warning
    };

    FileResult {
        file: file.strip_prefix(base_path).unwrap_or(file).to_path_buf(),
        status,
        diagnostics,
    }
}

/// Checks every component and operation visible from `definitions`.
pub fn lint_definitions(definitions: Definitions<'_>) -> Vec<Diagnostic> {
    let mut linter = Linter {
        definitions,
        diagnostics: Vec::new(),
    };

    for (name, schema) in definitions.schemas() {
        let path = format!("/schemas/{}", name);
        linter.schema(schema, &path);
        if let Ok(resolved) = schema.resolved(definitions) {
            if let Err(e) = resolved.named(name).resolve_properties(definitions, None) {
                linter.push(Diagnostic::error("E003", path, e.to_string()));
            }
        }
    }
    for (name, parameter) in definitions.parameters() {
        linter.parameter(parameter, &format!("/parameters/{}", name));
    }
    for (name, body) in definitions.request_bodies() {
        let path = format!("/request_bodies/{}", name);
        if let Some(body) = linter.component(body, &path) {
            for (range, content) in &body.contents {
                linter.content(content, &format!("{}/content/{}", path, range));
            }
        }
    }
    for (name, response) in definitions.responses() {
        linter.response(response, &format!("/responses/{}", name));
    }
    for (name, header) in definitions.headers() {
        let path = format!("/headers/{}", name);
        if let Some(header) = linter.component(header, &path) {
            linter.schema(&header.schema, &format!("{}/schema", path));
        }
    }
    for (name, example) in definitions.examples() {
        linter.component(example, &format!("/examples/{}", name));
    }
    for (name, link) in definitions.links() {
        linter.component(link, &format!("/links/{}", name));
    }
    for (name, callback) in definitions.callbacks() {
        linter.callback(callback, &format!("/callbacks/{}", name));
    }
    for (name, scheme) in definitions.security_schemes() {
        linter.component(scheme, &format!("/security_schemes/{}", name));
    }
    for (pathname, path) in definitions.paths() {
        let location = format!("/paths/{}", pathname);
        for (i, parameter) in path.parameters.iter().enumerate() {
            linter.parameter(parameter, &format!("{}/parameters/{}", location, i));
        }
        for (status, response) in &path.responses {
            linter.response(response, &format!("{}/responses/{}", location, status));
        }
    }
    for operation in definitions.operations() {
        linter.operation(operation, &format!("/operations/{}", operation.name));
    }
    linter.security(
        definitions.security().into_iter().flat_map(|r| r.schemes.keys()),
        "/security",
    );

    linter.diagnostics
}

struct Linter<'a> {
    definitions: Definitions<'a>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Linter<'a> {
    fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// The concrete component, or `None` after reporting a broken reference.
    fn component<T: Component>(&mut self, component: &'a OrRef<T>, path: &str) -> Option<&'a T> {
        match component.item(self.definitions) {
            Ok(item) => Some(item),
            Err(e) => {
                self.push(Diagnostic::error("E002", path, e.to_string()));
                None
            }
        }
    }

    fn schema(&mut self, schema: &'a SchemaOrRef, path: &str) {
        let schema = match schema {
            SchemaOrRef::Ref(_) => {
                if let Err(e) = schema.resolved(self.definitions) {
                    self.push(Diagnostic::error("E002", path, e.to_string()));
                }
                return;
            }
            SchemaOrRef::Item(schema) => schema,
        };

        match &schema.kind {
            SchemaKind::Array(array) => self.schema(&array.items, &format!("{}/items", path)),
            SchemaKind::Object(object) => {
                for (name, property) in &object.properties {
                    self.schema(&property.schema, &format!("{}/properties/{}", path, name));
                }
                for reference in &object.all_of {
                    if self.definitions.find_schema(&reference.name).is_none() {
                        self.push(Diagnostic::error(
                            "E002",
                            format!("{}/all_of", path),
                            format!("schema reference can't be resolved: {}", reference.name),
                        ));
                    }
                }
                if let Some(additional) = &object.additional_properties {
                    self.schema(&additional.schema, &format!("{}/additional_properties", path));
                }
                if let Some(discriminator) = &object.discriminator {
                    let targets = discriminator
                        .mappings
                        .values()
                        .chain(&discriminator.default_mapping);
                    for target in targets {
                        if self.definitions.find_schema(target).is_none() {
                            self.push(Diagnostic::error(
                                "E004",
                                format!("{}/discriminator", path),
                                format!("discriminator maps to unknown schema: {}", target),
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn parameter(&mut self, parameter: &'a OrRef<crate::components::Parameter>, path: &str) {
        if let Some(parameter) = self.component(parameter, path) {
            self.schema(&parameter.schema, &format!("{}/schema", path));
        }
    }

    fn content(&mut self, content: &'a Content, path: &str) {
        if let Some(schema) = &content.schema {
            self.schema(schema, &format!("{}/schema", path));
        }
    }

    fn response(&mut self, response: &'a OrRef<Response>, path: &str) {
        let Some(response) = self.component(response, path) else {
            return;
        };
        for (media_type, content) in &response.contents {
            self.content(content, &format!("{}/content/{}", path, media_type));
        }
        for (name, header) in &response.headers {
            let path = format!("{}/headers/{}", path, name);
            if let Some(header) = self.component(header, &path) {
                self.schema(&header.schema, &format!("{}/schema", path));
            }
        }
        for (name, link) in &response.links {
            self.component(link, &format!("{}/links/{}", path, name));
        }
    }

    fn callback(&mut self, callback: &'a OrRef<crate::components::Callback>, path: &str) {
        let Some(callback) = self.component(callback, path) else {
            return;
        };
        for (expression, operations) in &callback.expressions {
            for operation in operations {
                let path = format!("{}/{}/{}", path, expression, operation.method);
                self.operation(operation, &path);
            }
        }
    }

    fn operation(&mut self, operation: &'a Operation, path: &str) {
        let definitions = self.definitions;
        for (i, parameter) in operation.parameters.iter().enumerate() {
            self.parameter(parameter, &format!("{}/parameters/{}", path, i));
        }
        if let Some(body) = &operation.request_body {
            let body_path = format!("{}/request_body", path);
            if let Some(body) = self.component(body, &body_path) {
                for (range, content) in &body.contents {
                    self.content(content, &format!("{}/content/{}", body_path, range));
                }
            }
        }
        for (status, response) in &operation.responses {
            self.response(response, &format!("{}/responses/{}", path, status));
        }
        for (name, callback) in &operation.callbacks {
            self.callback(callback, &format!("{}/callbacks/{}", path, name));
        }
        if definitions.operation_responses(operation).is_empty() {
            self.push(Diagnostic::warning(
                "W001",
                format!("{}/responses", path),
                "operation has no responses",
            ));
        }
        if let Some(security) = &operation.security {
            self.security(
                security.iter().flat_map(|r| r.schemes.keys()),
                &format!("{}/security", path),
            );
        }
    }

    fn security<'n>(&mut self, names: impl Iterator<Item = &'n String>, path: &str) {
        for name in names {
            if self.definitions.find_security_scheme(name).is_none() {
                self.push(Diagnostic::warning(
                    "W002",
                    path,
                    format!("unknown security scheme: {}", name),
                ));
            }
        }
    }
}

fn collect_definitions_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            return vec![path.to_path_buf()];
        }
        return vec![];
    }

    let mut files = Vec::new();
    collect_files_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}
