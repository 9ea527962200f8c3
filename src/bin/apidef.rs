//! apidef CLI
//!
//! Command-line interface for generating documents from definitions files,
//! validating and serializing payloads, and linting definitions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use apidef::{
    jsonify, lint, load_definitions, load_value, validate, write_json_seq, DefinitionsId,
    FileStatus, JsonifyOptions, Omit, Registry, SchemaOrRef, Severity, ValidateError, Version,
};

#[derive(Parser)]
#[command(name = "apidef")]
#[command(about = "Generate OpenAPI and JSON Schema documents from API definitions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the OpenAPI document of a definitions file
    Openapi {
        /// Definitions source: file path or URL (http:// or https://)
        definitions: String,

        /// OpenAPI version: 2.0, 3.0, 3.1 or 3.2
        #[arg(long = "openapi-version", default_value = "3.1")]
        version: Version,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Generate the JSON Schema document of one schema
    JsonSchema {
        /// Definitions source: file path or URL (http:// or https://)
        definitions: String,

        /// Name of the schema
        #[arg(long)]
        schema: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Validate a payload against a schema
    Validate {
        /// Definitions source: file path or URL (http:// or https://)
        definitions: String,

        /// Payload file to validate
        payload: PathBuf,

        /// Name of the schema
        #[arg(long)]
        schema: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Serialize a value by a schema
    Serialize {
        /// Definitions source: file path or URL (http:// or https://)
        definitions: String,

        /// File holding the value to serialize
        value: PathBuf,

        /// Name of the schema
        #[arg(long)]
        schema: String,

        /// Leave out omittable properties without a value
        #[arg(long, value_enum, default_value_t = OmitArg::None)]
        omit: OmitArg,

        /// Write a JSON text sequence (one record per array element)
        #[arg(long, conflicts_with = "pretty")]
        seq: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Lint definitions files for errors (syntax, broken references, cycles)
    Lint {
        /// File or directory to lint
        path: PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Output file (stdout if not specified)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OmitArg {
    None,
    Nil,
    Empty,
}

impl From<OmitArg> for Omit {
    fn from(omit: OmitArg) -> Self {
        match omit {
            OmitArg::None => Omit::None,
            OmitArg::Nil => Omit::Nil,
            OmitArg::Empty => Omit::Empty,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Openapi {
            definitions,
            version,
            output,
        } => run_openapi(&definitions, version, &output),

        Commands::JsonSchema {
            definitions,
            schema,
            output,
        } => run_json_schema(&definitions, &schema, &output),

        Commands::Validate {
            definitions,
            payload,
            schema,
            json,
        } => run_validate(&definitions, &payload, &schema, json),

        Commands::Serialize {
            definitions,
            value,
            schema,
            omit,
            seq,
            output,
        } => run_serialize(&definitions, &value, &schema, omit.into(), seq, &output),

        Commands::Lint {
            path,
            format,
            strict,
            quiet,
        } => run_lint(&path, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn load(source: &str) -> Result<(Registry, DefinitionsId), u8> {
    let mut registry = Registry::new();
    let id = load_definitions(&mut registry, source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    Ok((registry, id))
}

fn write_output(value: &Value, args: &OutputArgs) -> Result<(), u8> {
    let json_output = if args.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn run_openapi(source: &str, version: Version, output: &OutputArgs) -> Result<(), u8> {
    let (registry, id) = load(source)?;
    let document = registry.definitions(id).openapi_document(version).map_err(|e| {
        eprintln!("Error: {}", e);
        2u8
    })?;
    write_output(&document, output)
}

fn run_json_schema(source: &str, schema: &str, output: &OutputArgs) -> Result<(), u8> {
    let (registry, id) = load(source)?;
    let document = registry
        .definitions(id)
        .json_schema_document(schema)
        .map_err(|e| {
            eprintln!("Error: {}", e);
            2u8
        })?;
    write_output(&document, output)
}

fn run_validate(source: &str, payload_path: &Path, schema: &str, json_output: bool) -> Result<(), u8> {
    let (registry, id) = load(source)?;
    let payload = load_value(payload_path).map_err(|e| {
        report_error(json_output, &format!("loading payload: {}", e));
        e.exit_code() as u8
    })?;

    match validate(registry.definitions(id), schema, &payload) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = serde_json::json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(e) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn run_serialize(
    source: &str,
    value_path: &Path,
    schema: &str,
    omit: Omit,
    seq: bool,
    output: &OutputArgs,
) -> Result<(), u8> {
    let (registry, id) = load(source)?;
    let definitions = registry.definitions(id);
    let value = load_value(value_path).map_err(|e| {
        eprintln!("Error loading value: {}", e);
        e.exit_code() as u8
    })?;
    let schema = SchemaOrRef::reference(schema);
    let options = JsonifyOptions { omit };

    if seq {
        let mut buffer = Vec::new();
        write_json_seq(&mut buffer, definitions, &value, &schema, &options).map_err(|e| {
            eprintln!("Error: {}", e);
            1u8
        })?;
        return match &output.output {
            Some(path) => std::fs::write(path, &buffer).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            }),
            None => std::io::stdout().write_all(&buffer).map_err(|e| {
                eprintln!("Error writing output: {}", e);
                3u8
            }),
        };
    }

    let serialized = jsonify(definitions, &value, &schema, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        1u8
    })?;
    write_output(&serialized, output)
}

fn run_lint(path: &Path, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(2);
    }

    let result = lint(path, strict);

    if format == "json" {
        let json_output = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", json_output);
    } else {
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color, label, diag.code, diag.path, diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
