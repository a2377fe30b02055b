//! Plan command handler.
//!
//! Introspects and fingerprints the declared deployment, compares the result
//! against the recorded fingerprint, and reports whether a deploy is pending.
//! Read-only: nothing is deployed and no state is written.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::util::load_resource;
use crate::{
	credentials::StsCli,
	lifecycle::{Plan, Reconciler},
	remote::CloudFormationCli,
	resource::DECLARATION_FILE_NAME,
};

#[derive(Args)]
pub struct PlanArgs {
	/// Path to the deployment declaration
	#[arg(default_value = DECLARATION_FILE_NAME)]
	pub declaration: PathBuf,

	/// Path to the recorded state file (defaults to next to the declaration)
	#[arg(long)]
	pub state: Option<PathBuf>,

	/// Log level: trace, debug, info, warn, error
	#[arg(long, default_value = "info")]
	pub log_level: String,
}

/// Run the plan command.
pub fn run<W: Write>(args: PlanArgs, mut writer: W) -> Result<()> {
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
	write_plan(&mut writer, &plan, &resource.state.package_hash)?;

	Ok(())
}

fn write_plan<W: Write>(
	writer: &mut W,
	plan: &Plan,
	recorded: &Option<crate::fingerprint::Fingerprint>,
) -> Result<()> {
	if plan.changed {
		writeln!(writer, "{}: deploy pending", plan.service)?;
		match recorded {
			Some(recorded) => writeln!(writer, "  recorded: {recorded}")?,
			None => writeln!(writer, "  recorded: (none)")?,
		}
		writeln!(writer, "  computed: {}", plan.fingerprint)?;
	} else {
		writeln!(writer, "{}: up to date", plan.service)?;
	}
	Ok(())
}
