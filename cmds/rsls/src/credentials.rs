//! Assume-role credential overlay.
//!
//! When a deployment declares remote-identity assumption parameters, the role
//! name is parsed out of the caller ARN, short-lived credentials for the
//! reconstructed role ARN are acquired through the [`AssumeRole`] seam, and
//! the three credential variables are overlaid onto the subprocess
//! environment. Environments are ordered maps, so "strip any equivalent
//! existing values" is a plain merge where the overlay wins — exactly one
//! value per credential key reaches the subprocess.

use std::{
	collections::BTreeMap,
	path::Path,
	sync::OnceLock,
};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::{
	resource::{AwsConfig, DeploymentSpec},
	runner::{self, RunError},
};

pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Errors from credential derivation.
#[derive(Debug, Error)]
pub enum CredentialsError {
	#[error("could not parse role name from caller ARN `{0}`")]
	RoleNameUnparseable(String),

	#[error("aws_config is set but no assume-role provider is available")]
	ProviderUnavailable,

	#[error("failed retrieving assume-role credentials: {0}")]
	Acquire(#[from] RunError),

	#[error("assume-role response was not understood: {0}")]
	Malformed(#[from] serde_json::Error),
}

/// Short-lived credentials for an assumed role.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
	pub access_key_id: String,
	pub secret_access_key: String,
	pub session_token: String,
}

/// Seam for the external credential-provider collaborator.
pub trait AssumeRole {
	/// Acquire short-lived credentials bound to `role_arn`.
	fn assume(&self, role_arn: &str) -> Result<Credentials, CredentialsError>;
}

/// Acquires credentials by shelling out to `aws sts assume-role`.
pub struct StsCli {
	pub session_name: String,
}

impl Default for StsCli {
	fn default() -> Self {
		StsCli {
			session_name: "rsls".to_string(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
	credentials: Credentials,
}

impl AssumeRole for StsCli {
	fn assume(&self, role_arn: &str) -> Result<Credentials, CredentialsError> {
		let args: Vec<String> = [
			"sts",
			"assume-role",
			"--role-arn",
			role_arn,
			"--role-session-name",
			&self.session_name,
			"--output",
			"json",
		]
		.iter()
		.map(ToString::to_string)
		.collect();

		let env: BTreeMap<String, String> = std::env::vars().collect();
		let captured = runner::capture(Path::new("aws"), &args, Path::new("."), &env)?;
		if !captured.status.success() {
			return Err(RunError::Failed {
				command: "aws sts assume-role".to_string(),
				status: captured.status,
				output: captured.combined(),
			}
			.into());
		}

		let response: AssumeRoleResponse = serde_json::from_slice(&captured.stdout)?;
		Ok(response.credentials)
	}
}

fn assumed_role_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r".*assumed-role/([\w+=,.@-]+)/.*").expect("static pattern is valid")
	})
}

/// Extract the role name from an assumed-role caller ARN.
pub fn role_name_from_caller_arn(caller_arn: &str) -> Result<&str, CredentialsError> {
	assumed_role_regex()
		.captures(caller_arn)
		.and_then(|captures| captures.get(1))
		.map(|m| m.as_str())
		.ok_or_else(|| CredentialsError::RoleNameUnparseable(caller_arn.to_string()))
}

/// Reconstruct the role ARN the caller assumed.
pub fn role_arn(account_id: &str, role_name: &str) -> String {
	format!("arn:aws:iam::{account_id}:role/{role_name}")
}

/// Derive the credential overlay for an `aws_config` block.
pub fn overlay(
	aws: &AwsConfig,
	provider: &dyn AssumeRole,
) -> Result<BTreeMap<String, String>, CredentialsError> {
	let role = role_name_from_caller_arn(&aws.caller_arn)?;
	let credentials = provider.assume(&role_arn(&aws.account_id, role))?;

	let mut entries = BTreeMap::new();
	entries.insert(ACCESS_KEY_ID.to_string(), credentials.access_key_id);
	entries.insert(SECRET_ACCESS_KEY.to_string(), credentials.secret_access_key);
	entries.insert(SESSION_TOKEN.to_string(), credentials.session_token);
	Ok(entries)
}

/// Full subprocess environment for a spec: inherited variables, declared
/// extras, and the assume-role overlay when configured.
pub fn tool_environment(
	spec: &DeploymentSpec,
	provider: Option<&dyn AssumeRole>,
) -> Result<BTreeMap<String, String>, CredentialsError> {
	let mut env = runner::process_env(spec);
	if let Some(aws) = &spec.aws_config {
		let provider = provider.ok_or(CredentialsError::ProviderUnavailable)?;
		env.extend(overlay(aws, provider)?);
	}
	Ok(env)
}
