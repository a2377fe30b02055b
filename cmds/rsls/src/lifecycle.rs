//! Reconciliation state machine.
//!
//! Each pass is single-threaded, synchronous and blocking: introspect, then
//! fingerprint, then (only when something moved) deploy or remove. The two
//! subprocess invocations in a pass are strictly sequential, and no pass
//! mutates recorded state on failure — a retry always starts from the last
//! known-good fingerprint.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::instrument;

use crate::{
	credentials::{self, AssumeRole, CredentialsError},
	fingerprint::{self, Fingerprint, FingerprintError},
	introspect::{self, ConfigError, IntrospectError},
	remote::{self, RemoteError, StackExistence, StackQuery},
	resource::DeploymentSpec,
	runner::{self, RunError, ToolCommand},
	state::ReconciliationState,
};

/// Lifecycle position a pass ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	/// No remote target; identity cleared.
	Absent,
	/// Fingerprint computed, not yet compared or acted on.
	Planned,
	/// Fingerprints matched and the remote target is still there.
	Unchanged,
	/// A deploy ran and was confirmed.
	Deployed,
	/// A remove ran; identity cleared.
	Removed,
}

/// Errors a reconciliation pass can abort with.
#[derive(Debug, Error)]
pub enum PassError {
	#[error(transparent)]
	Introspect(#[from] IntrospectError),

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Fingerprint(#[from] FingerprintError),

	#[error(transparent)]
	Credentials(#[from] CredentialsError),

	#[error(transparent)]
	Run(#[from] RunError),

	#[error(transparent)]
	Remote(#[from] RemoteError),

	/// The deploy reported success but the stack is unobservable. This is an
	/// anomaly, not an out-of-band removal; identity is deliberately kept.
	#[error("stack `{0}` does not exist after a successful deploy")]
	DeployedStackMissing(String),
}

/// Result of a plan step.
#[derive(Debug, Clone)]
pub struct Plan {
	pub service: String,
	pub fingerprint: Fingerprint,
	/// Whether the fingerprint differs from the stored one (or none is
	/// stored).
	pub changed: bool,
}

/// Outcome of a full pass: the state the caller should persist and where the
/// lifecycle ended up.
#[derive(Debug, Clone)]
pub struct PassOutcome {
	pub state: ReconciliationState,
	pub lifecycle: LifecycleState,
}

/// Everything a pass needs besides the declared spec. Holds no mutable state;
/// distinct resource instances may run their own reconcilers in parallel.
pub struct Reconciler<'a> {
	pub spec: &'a DeploymentSpec,
	pub remote: &'a dyn StackQuery,
	pub credentials: Option<&'a dyn AssumeRole>,
}

/// Introspection products shared by the plan and deploy paths.
struct Prepared {
	env: BTreeMap<String, String>,
	service: String,
	fingerprint: Fingerprint,
}

impl<'a> Reconciler<'a> {
	fn prepare(&self) -> Result<Prepared, PassError> {
		let env = credentials::tool_environment(self.spec, self.credentials)?;
		let config = introspect::load_resolved_config(self.spec, &env)?;
		let service = config.service()?.to_string();
		let fingerprint =
			fingerprint::fingerprint(&config, &self.spec.config_dir, &self.spec.package_dir)?;

		Ok(Prepared {
			env,
			service,
			fingerprint,
		})
	}

	/// Plan: introspect and fingerprint, compare against the stored hash.
	/// Read-only; spawns nothing beyond the introspection subprocess.
	#[instrument(skip_all, fields(stage = %self.spec.stage))]
	pub fn plan(&self, prior: &ReconciliationState) -> Result<Plan, PassError> {
		let prepared = self.prepare()?;
		let changed = prior.package_hash.as_ref() != Some(&prepared.fingerprint);

		tracing::debug!(
			service = %prepared.service,
			changed,
			"planned reconciliation"
		);

		Ok(Plan {
			service: prepared.service,
			fingerprint: prepared.fingerprint,
			changed,
		})
	}

	/// Create: deploy and record identity and fingerprint.
	#[instrument(skip_all, fields(stage = %self.spec.stage))]
	pub fn create(&self, _prior: &ReconciliationState) -> Result<PassOutcome, PassError> {
		let prepared = self.prepare()?;
		self.deploy(&prepared)
	}

	/// Read: reconfirm remote existence. A "does not exist" answer means the
	/// target was destroyed out-of-band; identity is cleared and the pass
	/// ends in `Absent`.
	#[instrument(skip_all, fields(stage = %self.spec.stage))]
	pub fn read(&self, prior: &ReconciliationState) -> Result<PassOutcome, PassError> {
		let Some(id) = &prior.id else {
			return Ok(PassOutcome {
				state: ReconciliationState::absent(),
				lifecycle: LifecycleState::Absent,
			});
		};

		let stack = remote::stack_name(id, &self.spec.stage);
		match self.remote.stack_exists(&stack)? {
			StackExistence::Found => Ok(PassOutcome {
				state: prior.clone(),
				lifecycle: LifecycleState::Unchanged,
			}),
			StackExistence::NotFound => {
				tracing::warn!(%stack, "stack gone, clearing identity");
				Ok(PassOutcome {
					state: ReconciliationState::absent(),
					lifecycle: LifecycleState::Absent,
				})
			}
		}
	}

	/// Update: redeploy when the spec or the fingerprint moved, otherwise
	/// degrade to a read confirmation. No deploy subprocess is spawned for a
	/// no-op update.
	#[instrument(skip_all, fields(stage = %self.spec.stage))]
	pub fn update(&self, prior: &ReconciliationState) -> Result<PassOutcome, PassError> {
		if spec_fields_differ(prior.spec.as_ref(), self.spec) {
			return self.create(prior);
		}

		let prepared = self.prepare()?;
		if prior.package_hash.as_ref() != Some(&prepared.fingerprint) {
			self.deploy(&prepared)
		} else {
			self.read(prior)
		}
	}

	/// Delete: run `remove` and clear identity unconditionally. A removal
	/// failure whose output carries the "does not exist" marker means the
	/// target is already gone, which is the desired end state.
	#[instrument(skip_all, fields(stage = %self.spec.stage))]
	pub fn delete(&self, _prior: &ReconciliationState) -> Result<PassOutcome, PassError> {
		let env = credentials::tool_environment(self.spec, self.credentials)?;

		match runner::run_tool(self.spec, ToolCommand::Remove, &env) {
			Ok(_) => {}
			Err(RunError::Failed { ref output, .. }) if output.contains("does not exist") => {
				tracing::debug!("target already absent, treating removal as success");
			}
			Err(err) => return Err(err.into()),
		}

		Ok(PassOutcome {
			state: ReconciliationState::absent(),
			lifecycle: LifecycleState::Removed,
		})
	}

	fn deploy(&self, prepared: &Prepared) -> Result<PassOutcome, PassError> {
		tracing::debug!(service = %prepared.service, "deploying");
		runner::run_tool(self.spec, ToolCommand::Deploy, &prepared.env)?;

		// Read confirmation. See `PassError::DeployedStackMissing` for why a
		// missing stack is not cleared here.
		let stack = remote::stack_name(&prepared.service, &self.spec.stage);
		match self.remote.stack_exists(&stack)? {
			StackExistence::Found => {}
			StackExistence::NotFound => return Err(PassError::DeployedStackMissing(stack)),
		}

		Ok(PassOutcome {
			state: ReconciliationState {
				id: Some(prepared.service.clone()),
				package_hash: Some(prepared.fingerprint.clone()),
				spec: Some(self.spec.clone()),
			},
			lifecycle: LifecycleState::Deployed,
		})
	}
}

/// Whether any spec field that routes updates differs from the stored
/// snapshot. `aws_config` is deliberately not in this list; a credential
/// change alone does not require a redeploy.
pub fn spec_fields_differ(stored: Option<&DeploymentSpec>, current: &DeploymentSpec) -> bool {
	let Some(stored) = stored else {
		return true;
	};

	stored.config_dir != current.config_dir
		|| stored.package_dir != current.package_dir
		|| stored.stage != current.stage
		|| stored.args != current.args
		|| stored.env != current.env
		|| stored.serverless_bin_dir != current.serverless_bin_dir
}
