//! Deploy command handler.
//!
//! Runs a full reconciliation pass: plan first, then deploy if anything moved,
//! recording the new identity and fingerprint on success. Prompts for
//! confirmation before deploying unless auto-approved.

use std::{fmt, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use super::util::{load_resource, prompt_confirmation};
use crate::{
	credentials::StsCli,
	lifecycle::{self, LifecycleState, Reconciler},
	remote::CloudFormationCli,
	resource::DECLARATION_FILE_NAME,
	state,
};

/// Auto-approve settings for the deploy command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoApprove {
	/// Always require manual approval.
	#[default]
	Never,

	/// Always auto-approve without prompting.
	Always,

	/// Auto-approve only if there are no changes (no-op).
	IfNoChanges,
}

impl fmt::Display for AutoApprove {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AutoApprove::Never => write!(f, "never"),
			AutoApprove::Always => write!(f, "always"),
			AutoApprove::IfNoChanges => write!(f, "if-no-changes"),
		}
	}
}

#[derive(Args)]
pub struct DeployArgs {
	/// Path to the deployment declaration
	#[arg(default_value = DECLARATION_FILE_NAME)]
	pub declaration: PathBuf,

	/// Path to the recorded state file (defaults to next to the declaration)
	#[arg(long)]
	pub state: Option<PathBuf>,

	/// Skip interactive approval. Allowed values: 'always', 'never', 'if-no-changes'
	#[arg(long, value_enum)]
	pub auto_approve: Option<AutoApprove>,

	/// Log level: trace, debug, info, warn, error
	#[arg(long, default_value = "info")]
	pub log_level: String,
}

/// Run the deploy command.
pub fn run<W: Write>(args: DeployArgs, mut writer: W) -> Result<()> {
	let resource = load_resource(&args.declaration, args.state.as_deref())?;

	let credentials = StsCli::default();
	let reconciler = Reconciler {
		spec: &resource.spec,
		remote: &CloudFormationCli,
		credentials: Some(&credentials),
	};

	let plan = reconciler
		.plan(&resource.state)
		.context("planning deployment")?;
	let pending = resource.state.id.is_none()
		|| plan.changed
		|| lifecycle::spec_fields_differ(resource.state.spec.as_ref(), &resource.spec);

	if !pending {
		// Nothing moved; reconfirm the stack is still there and refresh state.
		let outcome = reconciler
			.update(&resource.state)
			.context("confirming deployment")?;
		state::save(&resource.state_path, &outcome.state)?;

		match outcome.lifecycle {
			LifecycleState::Absent => writeln!(
				writer,
				"{}: stack gone from the remote target, identity cleared; \
				 re-run to deploy",
				plan.service
			)?,
			_ => writeln!(writer, "{}: up to date", plan.service)?,
		}
		return Ok(());
	}

	let should_deploy = match args.auto_approve.unwrap_or_default() {
		AutoApprove::Always => true,
		AutoApprove::IfNoChanges => false,
		AutoApprove::Never => {
			prompt_confirmation(&format!("Deploy `{}-{}`?", plan.service, resource.spec.stage))?
		}
	};
	if !should_deploy {
		writeln!(writer, "Deploy cancelled.")?;
		return Ok(());
	}

	let outcome = if resource.state.id.is_none() {
		reconciler.create(&resource.state)
	} else {
		reconciler.update(&resource.state)
	}
	.context("deploying")?;
	state::save(&resource.state_path, &outcome.state)?;

	writeln!(writer, "{}: deployed", plan.service)?;
	if let Some(fingerprint) = &outcome.state.package_hash {
		writeln!(writer, "  recorded: {fingerprint}")?;
	}
	Ok(())
}
