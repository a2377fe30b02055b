//! Remove command handler.
//!
//! Tears down the deployment and clears the recorded identity. Removing an
//! already-absent deployment succeeds.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::util::{load_resource, prompt_confirmation};
use crate::{
	credentials::StsCli,
	lifecycle::Reconciler,
	remote::CloudFormationCli,
	resource::DECLARATION_FILE_NAME,
	state,
};

#[derive(Args)]
pub struct RemoveArgs {
	/// Path to the deployment declaration
	#[arg(default_value = DECLARATION_FILE_NAME)]
	pub declaration: PathBuf,

	/// Path to the recorded state file (defaults to next to the declaration)
	#[arg(long)]
	pub state: Option<PathBuf>,

	/// Skip interactive approval
	#[arg(long)]
	pub auto_approve: bool,

	/// Log level: trace, debug, info, warn, error
	#[arg(long, default_value = "info")]
	pub log_level: String,
}

/// Run the remove command.
pub fn run<W: Write>(args: RemoveArgs, mut writer: W) -> Result<()> {
	let resource = load_resource(&args.declaration, args.state.as_deref())?;

	if !args.auto_approve {
		let target = match &resource.state.id {
			Some(id) => format!("{id}-{}", resource.spec.stage),
			None => format!("stage `{}`", resource.spec.stage),
		};
		if !prompt_confirmation(&format!("Remove {target}?"))? {
			writeln!(writer, "Remove cancelled.")?;
			return Ok(());
		}
	}

	let credentials = StsCli::default();
	let reconciler = Reconciler {
		spec: &resource.spec,
		remote: &CloudFormationCli,
		credentials: Some(&credentials),
	};

	let outcome = reconciler
		.delete(&resource.state)
		.context("removing deployment")?;
	state::save(&resource.state_path, &outcome.state)?;

	writeln!(writer, "removed")?;
	Ok(())
}
