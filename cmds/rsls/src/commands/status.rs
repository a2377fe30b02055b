//! Status command handler.
//!
//! Reconfirms that the recorded deployment still exists on the remote target.
//! Clears the recorded identity when the stack was destroyed out-of-band.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::util::load_resource;
use crate::{
	credentials::StsCli,
	lifecycle::{LifecycleState, Reconciler},
	remote::CloudFormationCli,
	resource::DECLARATION_FILE_NAME,
	state,
};

#[derive(Args)]
pub struct StatusArgs {
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

/// Run the status command.
pub fn run<W: Write>(args: StatusArgs, mut writer: W) -> Result<()> {
	let resource = load_resource(&args.declaration, args.state.as_deref())?;

	let reconciler = Reconciler {
		spec: &resource.spec,
		remote: &CloudFormationCli,
		credentials: None,
	};

	let outcome = reconciler
		.read(&resource.state)
		.context("querying deployment status")?;
	state::save(&resource.state_path, &outcome.state)?;

	match (outcome.lifecycle, &resource.state.id) {
		(LifecycleState::Unchanged, Some(id)) => {
			writeln!(writer, "{id}: deployed as {id}-{}", resource.spec.stage)?;
			if let Some(fingerprint) = &outcome.state.package_hash {
				writeln!(writer, "  recorded: {fingerprint}")?;
			}
		}
		(LifecycleState::Absent, Some(id)) => {
			writeln!(
				writer,
				"{id}: stack gone from the remote target, identity cleared"
			)?;
		}
		_ => writeln!(writer, "not deployed")?,
	}
	Ok(())
}
