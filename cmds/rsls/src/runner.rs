//! Serverless CLI subprocess invocation.
//!
//! Every interaction with the deployment tool goes through here: one
//! synchronous subprocess per call, stdout and stderr captured concurrently,
//! non-zero exit mapped to a structured error that carries the full output.
//! Nothing is ever retried; the tool's operations are not known to be safe to
//! replay blindly.

use std::{
	collections::BTreeMap,
	fmt,
	io::{BufReader, Read},
	path::{Path, PathBuf},
	process::{Command, ExitStatus, Stdio},
	thread,
};

use thiserror::Error;
use tracing::debug;

use crate::resource::DeploymentSpec;

/// The four operations the deployment tool is ever invoked with.
///
/// Each variant carries its own argument-construction rule, so the policy
/// "the package flag applies only to deploy/package" is encoded once here
/// instead of being checked at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCommand {
	Deploy,
	Package,
	Build,
	Remove,
}

impl ToolCommand {
	pub fn as_str(self) -> &'static str {
		match self {
			ToolCommand::Deploy => "deploy",
			ToolCommand::Package => "package",
			ToolCommand::Build => "build",
			ToolCommand::Remove => "remove",
		}
	}

	/// Whether this command accepts the `-p <package_dir>` flag.
	fn takes_package_dir(self) -> bool {
		matches!(self, ToolCommand::Deploy | ToolCommand::Package)
	}
}

impl fmt::Display for ToolCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Errors from spawning or running a subprocess.
#[derive(Debug, Error)]
pub enum RunError {
	#[error("failed to spawn `{}`: {source}", .bin.display())]
	Spawn {
		bin: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("subprocess I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// Non-zero exit. `output` is the merged stdout+stderr so the caller sees
	/// everything the tool printed before failing.
	#[error("`{command}` failed ({status}):\n{output}")]
	Failed {
		command: String,
		status: ExitStatus,
		output: String,
	},
}

/// Captured output of a finished subprocess.
#[derive(Debug)]
pub struct Captured {
	pub stdout: Vec<u8>,
	pub stderr: Vec<u8>,
	pub status: ExitStatus,
}

impl Captured {
	/// Merged stdout followed by stderr, lossily decoded.
	pub fn combined(&self) -> String {
		let mut merged = String::from_utf8_lossy(&self.stdout).into_owned();
		merged.push_str(&String::from_utf8_lossy(&self.stderr));
		merged
	}
}

/// Build the argument vector for one tool invocation.
///
/// Stage and package flags precede the caller-supplied arguments so user
/// arguments can override defaults where the tool accepts repeated flags.
pub fn build_args(spec: &DeploymentSpec, command: ToolCommand) -> Vec<String> {
	let mut args = vec![
		command.as_str().to_string(),
		"-s".to_string(),
		spec.stage.clone(),
	];

	if command.takes_package_dir() && !spec.package_dir.is_empty() {
		args.push("-p".to_string());
		args.push(spec.package_dir.clone());
	}

	args.extend(spec.args.iter().cloned());
	args
}

/// Resolve the deployment tool binary path.
///
/// An empty `serverless_bin_dir` resolves relative to the config directory,
/// where a project-local install places the wrapper.
pub fn tool_bin_path(spec: &DeploymentSpec) -> PathBuf {
	let dir = if spec.serverless_bin_dir.is_empty() {
		Path::new(&spec.config_dir)
			.join("node_modules")
			.join(".bin")
	} else {
		PathBuf::from(&spec.serverless_bin_dir)
	};

	let name = if cfg!(windows) {
		"serverless.cmd"
	} else {
		"serverless"
	};
	dir.join(name)
}

/// Snapshot of the host environment plus the spec's declared extras.
///
/// Declared entries win over inherited ones; the credential overlay (when
/// configured) is merged on top of this by the caller.
pub fn process_env(spec: &DeploymentSpec) -> BTreeMap<String, String> {
	let mut env: BTreeMap<String, String> = std::env::vars().collect();
	env.extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));
	env
}

/// Run the deployment tool once, blocking until it exits.
///
/// Succeeds only on exit code 0. "Already absent" interpretation for removals
/// is the lifecycle controller's concern, not ours.
pub fn run_tool(
	spec: &DeploymentSpec,
	command: ToolCommand,
	env: &BTreeMap<String, String>,
) -> Result<Captured, RunError> {
	let bin = tool_bin_path(spec);
	let args = build_args(spec, command);
	let captured = capture(&bin, &args, Path::new(&spec.config_dir), env)?;

	if captured.status.success() {
		Ok(captured)
	} else {
		Err(RunError::Failed {
			command: format!("serverless {command}"),
			status: captured.status,
			output: captured.combined(),
		})
	}
}

/// Spawn a binary and capture stdout/stderr concurrently.
///
/// The two reader threads keep the pipes drained so a chatty subprocess can't
/// deadlock against a full pipe buffer. The exit status is not inspected
/// here; callers decide what a non-zero exit means for them.
pub(crate) fn capture(
	bin: &Path,
	args: &[String],
	cwd: &Path,
	env: &BTreeMap<String, String>,
) -> Result<Captured, RunError> {
	debug!(bin = %bin.display(), ?args, cwd = %cwd.display(), "spawning subprocess");

	let mut child = Command::new(bin)
		.args(args)
		.current_dir(cwd)
		.env_clear()
		.envs(env)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.map_err(|source| RunError::Spawn {
			bin: bin.to_path_buf(),
			source,
		})?;

	let stdout = child.stdout.take();
	let stderr = child.stderr.take();

	let stdout_handle = thread::spawn(move || {
		let mut buf = Vec::new();
		if let Some(stdout) = stdout {
			BufReader::new(stdout).read_to_end(&mut buf).ok();
		}
		buf
	});

	let stderr_handle = thread::spawn(move || {
		let mut buf = Vec::new();
		if let Some(stderr) = stderr {
			BufReader::new(stderr).read_to_end(&mut buf).ok();
		}
		buf
	});

	let status = child.wait()?;
	let stdout = stdout_handle.join().unwrap_or_default();
	let stderr = stderr_handle.join().unwrap_or_default();

	Ok(Captured {
		stdout,
		stderr,
		status,
	})
}
