//! Recorded reconciliation state.
//!
//! The core never persists anything itself: each pass reads a
//! [`ReconciliationState`] and proposes a new one. The CLI plays the
//! persistence collaborator with a JSON state file next to the declaration;
//! embedding frameworks bring their own storage and only need to round-trip
//! the identity and the fingerprint.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{fingerprint::Fingerprint, resource::DeploymentSpec};

/// State file name the CLI keeps next to the declaration.
pub const STATE_FILE_NAME: &str = ".rsls-state.json";

/// What must be durably round-tripped between passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationState {
	/// Stable external id: the service name. `None` means the resource is
	/// absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,

	/// Fingerprint recorded by the last successful deploy.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub package_hash: Option<Fingerprint>,

	/// Snapshot of the spec that produced `package_hash`, used to route
	/// updates.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub spec: Option<DeploymentSpec>,
}

impl ReconciliationState {
	/// The cleared state: no identity, no fingerprint.
	pub fn absent() -> Self {
		ReconciliationState::default()
	}
}

/// Load recorded state; a missing file means the resource was never deployed.
pub fn load(path: &Path) -> Result<ReconciliationState> {
	if !path.exists() {
		return Ok(ReconciliationState::absent());
	}

	let content = fs::read_to_string(path)
		.with_context(|| format!("failed to read state file: {}", path.display()))?;
	let state = serde_json::from_str(&content)
		.with_context(|| format!("failed to parse state file: {}", path.display()))?;
	Ok(state)
}

/// Persist state atomically (write-then-rename).
pub fn save(path: &Path, state: &ReconciliationState) -> Result<()> {
	let content =
		serde_json::to_string_pretty(state).context("failed to serialize state")?;

	let tmp = path.with_extension("json.tmp");
	fs::write(&tmp, content)
		.with_context(|| format!("failed to write state file: {}", tmp.display()))?;
	fs::rename(&tmp, path)
		.with_context(|| format!("failed to replace state file: {}", path.display()))?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::spec_in;

	#[test]
	fn test_missing_file_means_absent() {
		let dir = tempfile::TempDir::new().unwrap();
		let state = load(&dir.path().join(STATE_FILE_NAME)).unwrap();
		assert_eq!(state, ReconciliationState::absent());
	}

	#[test]
	fn test_round_trip() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join(STATE_FILE_NAME);

		let state = ReconciliationState {
			id: Some("orders".to_string()),
			package_hash: Some("h1:abc=-def".to_string().into()),
			spec: Some(spec_in("/svc")),
		};

		save(&path, &state).unwrap();
		assert_eq!(load(&path).unwrap(), state);
	}

	#[test]
	fn test_save_replaces_previous_content() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join(STATE_FILE_NAME);

		let first = ReconciliationState {
			id: Some("orders".to_string()),
			..ReconciliationState::absent()
		};
		save(&path, &first).unwrap();
		save(&path, &ReconciliationState::absent()).unwrap();

		assert_eq!(load(&path).unwrap(), ReconciliationState::absent());
	}

	#[test]
	fn test_corrupt_state_is_an_error_not_a_reset() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join(STATE_FILE_NAME);
		fs::write(&path, "{not json").unwrap();

		assert!(load(&path).is_err());
	}
}
