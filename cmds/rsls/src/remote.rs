//! Remote stack existence queries.
//!
//! The reconciler never reads deployed content; the only remote question it
//! asks is "does the stack still exist". A validation-class "does not exist"
//! answer is a designed control-flow branch, not an error — everything else
//! (permissions, throttling, transport) is fatal and surfaced unchanged.

use std::{collections::BTreeMap, path::Path};

use thiserror::Error;

use crate::runner::{self, RunError};

/// Outcome of an existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackExistence {
	Found,
	NotFound,
}

/// Errors from the remote query collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
	#[error(transparent)]
	Run(#[from] RunError),

	#[error("stack query failed:\n{0}")]
	Query(String),
}

/// Seam for the remote existence query collaborator.
pub trait StackQuery {
	/// Probe whether `stack_name` exists on the remote target.
	fn stack_exists(&self, stack_name: &str) -> Result<StackExistence, RemoteError>;
}

/// The remote stack name for a deployed service: `<service>-<stage>`.
pub fn stack_name(service: &str, stage: &str) -> String {
	format!("{service}-{stage}")
}

/// Whether an error payload is the recognized validation-class "does not
/// exist" marker.
pub fn is_not_found(output: &str) -> bool {
	output.contains("ValidationError") && output.contains("does not exist")
}

/// CloudFormation-backed existence query via the AWS CLI.
pub struct CloudFormationCli;

impl StackQuery for CloudFormationCli {
	fn stack_exists(&self, stack_name: &str) -> Result<StackExistence, RemoteError> {
		let args: Vec<String> = [
			"cloudformation",
			"describe-stacks",
			"--stack-name",
			stack_name,
		]
		.iter()
		.map(ToString::to_string)
		.collect();

		let env: BTreeMap<String, String> = std::env::vars().collect();
		let captured = runner::capture(Path::new("aws"), &args, Path::new("."), &env)?;

		if captured.status.success() {
			return Ok(StackExistence::Found);
		}

		let output = captured.combined();
		if is_not_found(&output) {
			Ok(StackExistence::NotFound)
		} else {
			Err(RemoteError::Query(output))
		}
	}
}
