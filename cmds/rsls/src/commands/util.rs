//! Utilities for command handlers.

use std::{
	io::{self, ErrorKind, Write},
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{
	resource::DeploymentSpec,
	state::{self, ReconciliationState, STATE_FILE_NAME},
};

/// A declaration plus its recorded state, as every command starts out.
pub struct LoadedResource {
	pub spec: DeploymentSpec,
	pub state: ReconciliationState,
	pub state_path: PathBuf,
}

/// Load the declaration file and the state file next to it (or at an explicit
/// override path).
pub fn load_resource(declaration: &Path, state_path: Option<&Path>) -> Result<LoadedResource> {
	let spec = DeploymentSpec::load_from_file(declaration)?;

	let state_path = match state_path {
		Some(path) => path.to_path_buf(),
		None => declaration
			.parent()
			.filter(|parent| !parent.as_os_str().is_empty())
			.unwrap_or_else(|| Path::new("."))
			.join(STATE_FILE_NAME),
	};
	let state = state::load(&state_path)
		.with_context(|| format!("loading recorded state for {}", declaration.display()))?;

	Ok(LoadedResource {
		spec,
		state,
		state_path,
	})
}

/// Prompt the user for a yes/no confirmation on the terminal.
pub fn prompt_confirmation(question: &str) -> Result<bool> {
	if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
		anyhow::bail!(
			"cannot prompt for confirmation in non-interactive mode. \
			 Use --auto-approve to skip confirmation."
		);
	}

	eprint!("\n{question} [y/N]: ");
	io::stderr().flush()?;

	let mut input = String::new();
	io::stdin().read_line(&mut input)?;

	let input = input.trim().to_lowercase();
	Ok(input == "y" || input == "yes")
}

/// A writer wrapper that silently handles broken pipe errors.
///
/// When the underlying writer returns EPIPE, the write is reported as
/// successful so commands exit cleanly when their output is piped to a
/// process that closes early (e.g. `rsls plan | head -1`).
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}
