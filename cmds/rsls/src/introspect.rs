//! Resolved-configuration introspection.
//!
//! The tool itself is the only authority on its fully-resolved configuration
//! (variables expanded, includes merged), so we ask it: `print --format
//! json`. Only stdout is parsed — a stray diagnostic line on stderr must not
//! corrupt the payload. Introspection failures always propagate.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::{
	resource::DeploymentSpec,
	runner::{self, RunError},
};

/// Errors from the resolved configuration itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
	/// The resolved configuration has no string `service` key. Without it
	/// there is no resource identity and no archive name.
	#[error("service name was not found in serverless config")]
	MissingServiceName,
}

/// Errors from obtaining or decoding the introspection payload.
#[derive(Debug, Error)]
pub enum IntrospectError {
	#[error(transparent)]
	Run(#[from] RunError),

	#[error("config introspection returned invalid JSON: {source}\nstderr:\n{stderr}")]
	Parse {
		source: serde_json::Error,
		stderr: String,
	},

	#[error("config introspection did not return a JSON object")]
	NotAnObject,
}

/// The tool's fully-resolved service configuration.
///
/// Access to well-known keys goes through fallible typed accessors; the full
/// mapping stays available as hash input.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
	raw: serde_json::Map<String, Value>,
}

impl ResolvedConfig {
	/// Wrap an introspection payload, requiring an object top level.
	pub fn from_value(value: Value) -> Result<Self, IntrospectError> {
		match value {
			Value::Object(raw) => Ok(ResolvedConfig { raw }),
			_ => Err(IntrospectError::NotAnObject),
		}
	}

	/// The mandatory service name, the resource's stable identity.
	pub fn service(&self) -> Result<&str, ConfigError> {
		match self.raw.get("service") {
			Some(Value::String(s)) => Ok(s),
			_ => Err(ConfigError::MissingServiceName),
		}
	}

	/// The `package.artifact` override, when present and non-null.
	///
	/// A declared artifact is the tool's own identity marker for the build
	/// output; the fingerprint engine skips archive hashing in that case.
	pub fn package_artifact(&self) -> Option<&Value> {
		match self.raw.get("package") {
			Some(Value::Object(package)) => match package.get("artifact") {
				None | Some(Value::Null) => None,
				Some(artifact) => Some(artifact),
			},
			_ => None,
		}
	}

	/// The full configuration mapping.
	pub fn raw(&self) -> &serde_json::Map<String, Value> {
		&self.raw
	}
}

/// Ask the tool for its fully-resolved configuration.
pub fn load_resolved_config(
	spec: &DeploymentSpec,
	env: &BTreeMap<String, String>,
) -> Result<ResolvedConfig, IntrospectError> {
	let bin = runner::tool_bin_path(spec);
	let args: Vec<String> = ["print", "--format", "json"]
		.iter()
		.map(ToString::to_string)
		.collect();

	let captured = runner::capture(&bin, &args, std::path::Path::new(&spec.config_dir), env)?;
	if !captured.status.success() {
		return Err(RunError::Failed {
			command: "serverless print".to_string(),
			status: captured.status,
			output: captured.combined(),
		}
		.into());
	}

	let value: Value =
		serde_json::from_slice(&captured.stdout).map_err(|source| IntrospectError::Parse {
			source,
			stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
		})?;

	ResolvedConfig::from_value(value)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;

	#[test]
	fn test_service_accessor() {
		let config = ResolvedConfig::from_value(json!({"service": "orders"})).unwrap();
		assert_eq!(config.service().unwrap(), "orders");
	}

	#[test]
	fn test_missing_service_is_fatal() {
		let config = ResolvedConfig::from_value(json!({"provider": {}})).unwrap();
		assert_eq!(config.service(), Err(ConfigError::MissingServiceName));
	}

	#[test]
	fn test_non_string_service_is_fatal() {
		let config = ResolvedConfig::from_value(json!({"service": 42})).unwrap();
		assert_eq!(config.service(), Err(ConfigError::MissingServiceName));
	}

	#[test]
	fn test_non_object_payload_is_rejected() {
		assert_matches!(
			ResolvedConfig::from_value(json!(["service"])),
			Err(IntrospectError::NotAnObject)
		);
	}

	#[test]
	fn test_package_artifact_detection() {
		let config = ResolvedConfig::from_value(
			json!({"service": "orders", "package": {"artifact": "dist/orders.zip"}}),
		)
		.unwrap();
		assert!(config.package_artifact().is_some());

		let config = ResolvedConfig::from_value(
			json!({"service": "orders", "package": {"artifact": null}}),
		)
		.unwrap();
		assert!(config.package_artifact().is_none());

		let config = ResolvedConfig::from_value(json!({"service": "orders"})).unwrap();
		assert!(config.package_artifact().is_none());
	}

	#[cfg(unix)]
	#[test]
	fn test_introspection_parses_stdout_only() {
		let dir = tempfile::TempDir::new().unwrap();
		let spec = crate::test_utils::spec_with_tool(
			dir.path(),
			"#!/bin/sh\necho 'warning: deprecated plugin' >&2\nprintf '%s' '{\"service\":\"orders\"}'\n",
		);

		let config = load_resolved_config(&spec, &runner::process_env(&spec)).unwrap();
		assert_eq!(config.service().unwrap(), "orders");
	}

	#[cfg(unix)]
	#[test]
	fn test_introspection_failure_propagates() {
		let dir = tempfile::TempDir::new().unwrap();
		let spec = crate::test_utils::spec_with_tool(
			dir.path(),
			"#!/bin/sh\necho 'cannot resolve variables' >&2\nexit 1\n",
		);

		let err = load_resolved_config(&spec, &runner::process_env(&spec)).unwrap_err();
		assert_matches!(err, IntrospectError::Run(RunError::Failed { ref output, .. }) => {
			assert!(output.contains("cannot resolve variables"));
		});
	}

	#[cfg(unix)]
	#[test]
	fn test_malformed_payload_reports_stderr() {
		let dir = tempfile::TempDir::new().unwrap();
		let spec = crate::test_utils::spec_with_tool(
			dir.path(),
			"#!/bin/sh\necho 'some context' >&2\nprintf 'not json'\n",
		);

		let err = load_resolved_config(&spec, &runner::process_env(&spec)).unwrap_err();
		assert_matches!(err, IntrospectError::Parse { ref stderr, .. } => {
			assert!(stderr.contains("some context"));
		});
	}
}
