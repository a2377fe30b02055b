//! Deployment resource schema.
//!
//! A deployment is declared either in a `.rsls.yaml` file (the CLI path) or
//! handed over as a generic field mapping by an embedding declarative
//! framework. Both roads end in the same typed [`DeploymentSpec`]; the
//! mapping road goes through explicit, fallible field extraction — no field
//! is ever assumed present or well-typed.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default declaration file name the CLI looks for.
pub const DECLARATION_FILE_NAME: &str = ".rsls.yaml";

/// Where the pre-built package is expected, relative to `config_dir`.
///
/// The tool's own default (`.serverless`) is avoided because the CLI deletes
/// that directory after a deploy even when `--package` is passed. Packaging
/// runs out-of-band: `serverless package -p .rsls-package`.
pub const DEFAULT_PACKAGE_DIR: &str = ".rsls-package";

/// Errors raised while extracting typed fields from a generic mapping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
	#[error("missing required field `{0}`")]
	Missing(&'static str),

	#[error("field `{field}` has the wrong type, expected {expected}")]
	WrongType {
		field: &'static str,
		expected: &'static str,
	},
}

/// Remote-identity assumption parameters.
///
/// When present, short-lived credentials for the derived role are overlaid
/// onto the tool's environment before any subprocess runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsConfig {
	pub account_id: String,
	pub caller_arn: String,
	pub caller_user: String,
}

/// A declared deployment, immutable for the duration of a reconciliation
/// pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSpec {
	/// Directory holding the service configuration; the tool's working
	/// directory for every invocation.
	pub config_dir: String,

	/// Directory holding the tool binary. Empty means
	/// `<config_dir>/node_modules/.bin`.
	#[serde(default)]
	pub serverless_bin_dir: String,

	/// Package directory, relative to `config_dir` (the tool's `-p` flag does
	/// not accept absolute paths).
	#[serde(default = "default_package_dir")]
	pub package_dir: String,

	/// Deployment stage name.
	pub stage: String,

	/// Extra CLI arguments, appended after the stage and package flags.
	#[serde(default)]
	pub args: Vec<String>,

	/// Extra environment variables for tool subprocesses.
	#[serde(default)]
	pub env: BTreeMap<String, String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub aws_config: Option<AwsConfig>,
}

fn default_package_dir() -> String {
	DEFAULT_PACKAGE_DIR.to_string()
}

impl DeploymentSpec {
	/// Load a declaration from a YAML file.
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read declaration file: {}", path.display()))?;
		let spec: DeploymentSpec = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse declaration file: {}", path.display()))?;
		Ok(spec)
	}

	/// Extract a spec from a generic field mapping.
	///
	/// This is the seam for embedding frameworks that supply resource fields
	/// as untyped JSON. Optional fields fall back to their schema defaults.
	pub fn from_fields(fields: &serde_json::Map<String, Value>) -> Result<Self, FieldError> {
		Ok(DeploymentSpec {
			config_dir: require_str(fields, "config_dir")?.to_string(),
			serverless_bin_dir: optional_str(fields, "serverless_bin_dir")?
				.unwrap_or_default()
				.to_string(),
			package_dir: optional_str(fields, "package_dir")?
				.unwrap_or(DEFAULT_PACKAGE_DIR)
				.to_string(),
			stage: require_str(fields, "stage")?.to_string(),
			args: string_list(fields, "args")?,
			env: string_map(fields, "env")?,
			aws_config: aws_config(fields)?,
		})
	}
}

fn require_str<'a>(
	fields: &'a serde_json::Map<String, Value>,
	name: &'static str,
) -> Result<&'a str, FieldError> {
	match fields.get(name) {
		None | Some(Value::Null) => Err(FieldError::Missing(name)),
		Some(Value::String(s)) => Ok(s),
		Some(_) => Err(FieldError::WrongType {
			field: name,
			expected: "string",
		}),
	}
}

fn optional_str<'a>(
	fields: &'a serde_json::Map<String, Value>,
	name: &'static str,
) -> Result<Option<&'a str>, FieldError> {
	match fields.get(name) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => Ok(Some(s)),
		Some(_) => Err(FieldError::WrongType {
			field: name,
			expected: "string",
		}),
	}
}

fn string_list(
	fields: &serde_json::Map<String, Value>,
	name: &'static str,
) -> Result<Vec<String>, FieldError> {
	let Some(value) = fields.get(name) else {
		return Ok(Vec::new());
	};
	match value {
		Value::Null => Ok(Vec::new()),
		Value::Array(items) => items
			.iter()
			.map(|item| match item {
				Value::String(s) => Ok(s.clone()),
				_ => Err(FieldError::WrongType {
					field: name,
					expected: "list of strings",
				}),
			})
			.collect(),
		_ => Err(FieldError::WrongType {
			field: name,
			expected: "list of strings",
		}),
	}
}

fn string_map(
	fields: &serde_json::Map<String, Value>,
	name: &'static str,
) -> Result<BTreeMap<String, String>, FieldError> {
	let Some(value) = fields.get(name) else {
		return Ok(BTreeMap::new());
	};
	match value {
		Value::Null => Ok(BTreeMap::new()),
		Value::Object(map) => map
			.iter()
			.map(|(k, v)| match v {
				Value::String(s) => Ok((k.clone(), s.clone())),
				_ => Err(FieldError::WrongType {
					field: name,
					expected: "string-to-string mapping",
				}),
			})
			.collect(),
		_ => Err(FieldError::WrongType {
			field: name,
			expected: "string-to-string mapping",
		}),
	}
}

fn aws_config(fields: &serde_json::Map<String, Value>) -> Result<Option<AwsConfig>, FieldError> {
	let Some(value) = fields.get("aws_config") else {
		return Ok(None);
	};
	let block = match value {
		Value::Null => return Ok(None),
		Value::Object(map) => map,
		// Frameworks that model "at most one block" as a list hand over a
		// single-element array.
		Value::Array(items) => match items.as_slice() {
			[] | [Value::Null] => return Ok(None),
			[Value::Object(map)] => map,
			_ => {
				return Err(FieldError::WrongType {
					field: "aws_config",
					expected: "block",
				})
			}
		},
		_ => {
			return Err(FieldError::WrongType {
				field: "aws_config",
				expected: "block",
			})
		}
	};

	Ok(Some(AwsConfig {
		account_id: require_str(block, "account_id")?.to_string(),
		caller_arn: require_str(block, "caller_arn")?.to_string(),
		caller_user: require_str(block, "caller_user")?.to_string(),
	}))
}
