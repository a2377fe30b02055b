//! Package command handler.
//!
//! Runs the tool's packaging step out-of-band, producing the archive the
//! fingerprint engine hashes. Useful for inspecting what would be deployed
//! without deploying it.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::{
	credentials::{self, StsCli},
	resource::{DeploymentSpec, DECLARATION_FILE_NAME},
	runner::{self, ToolCommand},
};

#[derive(Args)]
pub struct PackageArgs {
	/// Path to the deployment declaration
	#[arg(default_value = DECLARATION_FILE_NAME)]
	pub declaration: PathBuf,

	/// Run the tool's `build` step instead of `package`
	#[arg(long)]
	pub build: bool,

	/// Log level: trace, debug, info, warn, error
	#[arg(long, default_value = "info")]
	pub log_level: String,
}

/// Run the package command.
pub fn run<W: Write>(args: PackageArgs, mut writer: W) -> Result<()> {
	let spec = DeploymentSpec::load_from_file(&args.declaration)?;

	let provider = StsCli::default();
	let env = credentials::tool_environment(&spec, Some(&provider))
		.context("preparing tool environment")?;

	let command = if args.build {
		ToolCommand::Build
	} else {
		ToolCommand::Package
	};
	let captured = runner::run_tool(&spec, command, &env)
		.with_context(|| format!("running `serverless {command}`"))?;

	writer.write_all(&captured.stdout)?;
	Ok(())
}
