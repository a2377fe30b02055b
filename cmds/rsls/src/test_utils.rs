//! Common test utilities.
//!
//! The deployment tool and the remote target are both faked here: the tool as
//! a shell script dropped into a temp directory's `node_modules/.bin`, the
//! remote as an in-memory [`StackQuery`] that records how often it was
//! probed.

use std::{
	cell::{Cell, RefCell},
	collections::BTreeMap,
	fs,
	io::Write,
	path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{
	credentials::{AssumeRole, Credentials, CredentialsError},
	fingerprint::Fingerprint,
	remote::{RemoteError, StackExistence, StackQuery},
	resource::{DeploymentSpec, DEFAULT_PACKAGE_DIR},
	state::ReconciliationState,
};

/// A minimal spec rooted at `config_dir`, stage `dev`, schema defaults
/// elsewhere.
pub fn spec_in(config_dir: impl Into<String>) -> DeploymentSpec {
	DeploymentSpec {
		config_dir: config_dir.into(),
		serverless_bin_dir: String::new(),
		package_dir: DEFAULT_PACKAGE_DIR.to_string(),
		stage: "dev".to_string(),
		args: Vec::new(),
		env: BTreeMap::new(),
		aws_config: None,
	}
}

/// Install `script` as the fake tool binary under
/// `<config_dir>/node_modules/.bin/serverless` and return a spec pointing at
/// it.
#[cfg(unix)]
pub fn spec_with_tool(config_dir: &Path, script: &str) -> DeploymentSpec {
	use std::os::unix::fs::PermissionsExt;

	let bin_dir = config_dir.join("node_modules").join(".bin");
	fs::create_dir_all(&bin_dir).unwrap();

	let bin = bin_dir.join("serverless");
	fs::write(&bin, script).unwrap();
	fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

	spec_in(config_dir.to_str().unwrap())
}

/// Handle on the invocation log a [`logged_tool_script`] writes to.
pub struct InvocationLog {
	path: PathBuf,
}

impl InvocationLog {
	/// One line per tool invocation, arguments space-joined.
	pub fn invocations(&self) -> Vec<String> {
		match fs::read_to_string(&self.path) {
			Ok(content) => content.lines().map(str::to_owned).collect(),
			Err(_) => Vec::new(),
		}
	}
}

/// A fake tool script that appends every invocation to a log file and
/// answers `print` with the given configuration payload. All commands exit 0.
pub fn logged_tool_script(config_dir: &Path, config: &Value) -> String {
	format!(
		"#!/bin/sh\n\
		 echo \"$@\" >> \"{log}\"\n\
		 case \"$1\" in\n\
		 \tprint) printf '%s' '{payload}';;\n\
		 esac\n\
		 exit 0\n",
		log = config_dir.join("invocations.log").display(),
		payload = config,
	)
}

/// Install `script` like [`spec_with_tool`] and return the invocation log
/// handle alongside the spec.
#[cfg(unix)]
pub fn spec_with_tool_script(config_dir: &Path, script: &str) -> (DeploymentSpec, InvocationLog) {
	let spec = spec_with_tool(config_dir, script);
	let log = InvocationLog {
		path: config_dir.join("invocations.log"),
	};
	(spec, log)
}

/// Write a zip archive at `path` with the given entries, in the given order.
///
/// Each entry gets a distinct modification time so archives with identical
/// contents still differ byte-wise — what content hashing must see through.
pub fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
	let file = fs::File::create(path).unwrap();
	let mut writer = zip::ZipWriter::new(file);

	for (i, (name, content)) in entries.iter().enumerate() {
		let mtime = zip::DateTime::from_date_and_time(1990 + i as u16, 1, 1, 12, 0, 0).unwrap();
		let options = zip::write::SimpleFileOptions::default().last_modified_time(mtime);
		writer.start_file(*name, options).unwrap();
		writer.write_all(content).unwrap();
	}

	writer.finish().unwrap();
}

/// Place the pre-built archive for `service` where the fingerprint engine
/// expects it: `<config_dir>/<default package dir>/<service>.zip`.
pub fn zip_fixture(config_dir: &Path, service: &str, entries: &[(&str, &[u8])]) {
	let package_dir = config_dir.join(DEFAULT_PACKAGE_DIR);
	fs::create_dir_all(&package_dir).unwrap();
	build_zip(&package_dir.join(format!("{service}.zip")), entries);
}

/// State as recorded after deploying the `orders` fixture.
pub fn deployed_state(spec: &DeploymentSpec, fingerprint: Fingerprint) -> ReconciliationState {
	ReconciliationState {
		id: Some("orders".to_string()),
		package_hash: Some(fingerprint),
		spec: Some(spec.clone()),
	}
}

enum RemoteBehavior {
	Found,
	NotFound,
	Error(String),
}

/// In-memory stack query with a fixed answer and a call counter.
pub struct MockRemote {
	behavior: RemoteBehavior,
	calls: Cell<usize>,
}

impl MockRemote {
	pub fn always_found() -> Self {
		MockRemote {
			behavior: RemoteBehavior::Found,
			calls: Cell::new(0),
		}
	}

	pub fn always_not_found() -> Self {
		MockRemote {
			behavior: RemoteBehavior::NotFound,
			calls: Cell::new(0),
		}
	}

	pub fn always_error(message: &str) -> Self {
		MockRemote {
			behavior: RemoteBehavior::Error(message.to_string()),
			calls: Cell::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.get()
	}
}

impl StackQuery for MockRemote {
	fn stack_exists(&self, _stack_name: &str) -> Result<StackExistence, RemoteError> {
		self.calls.set(self.calls.get() + 1);
		match &self.behavior {
			RemoteBehavior::Found => Ok(StackExistence::Found),
			RemoteBehavior::NotFound => Ok(StackExistence::NotFound),
			RemoteBehavior::Error(message) => Err(RemoteError::Query(message.clone())),
		}
	}
}

/// Assume-role provider returning fixed credentials, recording every role ARN
/// it was asked for.
pub struct StaticCredentials {
	access_key_id: String,
	seen: RefCell<Vec<String>>,
}

impl StaticCredentials {
	pub fn new(access_key_id: &str) -> Self {
		StaticCredentials {
			access_key_id: access_key_id.to_string(),
			seen: RefCell::new(Vec::new()),
		}
	}

	pub fn seen_role_arns(&self) -> Vec<String> {
		self.seen.borrow().clone()
	}
}

impl AssumeRole for StaticCredentials {
	fn assume(&self, role_arn: &str) -> Result<Credentials, CredentialsError> {
		self.seen.borrow_mut().push(role_arn.to_string());
		Ok(Credentials {
			access_key_id: self.access_key_id.clone(),
			secret_access_key: "static-secret".to_string(),
			session_token: "static-token".to_string(),
		})
	}
}
