//! Composite content fingerprints.
//!
//! A fingerprint is `<artifact-hash>-<config-hash>`: a content hash of the
//! pre-built deployment archive joined with a SHA-256 over the canonical JSON
//! form of the resolved configuration. Content hashing (rather than mtimes or
//! raw archive bytes) keeps the fingerprint stable across machines and across
//! re-runs of the tool's non-deterministic packaging step, so "changed" means
//! the configuration or the shipped bytes actually changed.

use std::{
	fmt,
	fs::File,
	path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::introspect::{ConfigError, ResolvedConfig};

/// Errors from fingerprint computation.
#[derive(Debug, Error)]
pub enum FingerprintError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The archive could not be opened or read. Packaging must have run
	/// out-of-band before reconciliation.
	#[error("failed to read deployment archive {}: {source}", .path.display())]
	Archive {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to decode deployment archive {}: {source}", .path.display())]
	Decode {
		path: PathBuf,
		#[source]
		source: zip::result::ZipError,
	},
}

/// An opaque fingerprint string. Equality is the sole "no change" criterion;
/// it is only meaningful relative to the (config_dir, package_dir, stage)
/// triple that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for Fingerprint {
	fn from(s: String) -> Self {
		Fingerprint(s)
	}
}

/// Compute the composite fingerprint for a resolved configuration and its
/// archive location.
pub fn fingerprint(
	config: &ResolvedConfig,
	config_dir: &str,
	package_dir: &str,
) -> Result<Fingerprint, FingerprintError> {
	let service = config.service()?;

	let artifact_component = if config.package_artifact().is_some() {
		// A declared artifact is the tool's own identity marker; it is not
		// re-hashed here.
		String::new()
	} else {
		let zip_path = Path::new(config_dir)
			.join(package_dir)
			.join(format!("{service}.zip"));
		archive_hash(&zip_path)?
	};

	Ok(Fingerprint(format!(
		"{artifact_component}-{}",
		config_hash(config)
	)))
}

/// SHA-256 hex digest over the canonical JSON form of the configuration.
pub fn config_hash(config: &ResolvedConfig) -> String {
	let mut canonical = String::new();
	write_canonical_json(&Value::Object(config.raw().clone()), &mut canonical);

	let mut hasher = Sha256::new();
	hasher.update(canonical.as_bytes());
	format!("{:x}", hasher.finalize())
}

/// Content hash of a zip archive in the `h1:` dirhash scheme.
///
/// Hashes entry names and file contents only: per-file SHA-256, one
/// `"<hex>  <name>\n"` line per file sorted by name, SHA-256 over the lines,
/// base64-encoded. Timestamps, permissions and entry ordering do not
/// participate, so byte-different archives with identical contents hash the
/// same.
pub fn archive_hash(zip_path: &Path) -> Result<String, FingerprintError> {
	let archive_err = |source| FingerprintError::Archive {
		path: zip_path.to_path_buf(),
		source,
	};
	let decode_err = |source| FingerprintError::Decode {
		path: zip_path.to_path_buf(),
		source,
	};

	let file = File::open(zip_path).map_err(archive_err)?;
	let mut archive = zip::ZipArchive::new(file).map_err(decode_err)?;

	let mut names: Vec<String> = archive.file_names().map(str::to_owned).collect();
	names.sort();

	let mut outer = Sha256::new();
	for name in &names {
		let mut entry = archive.by_name(name).map_err(decode_err)?;
		if entry.is_dir() {
			continue;
		}

		let mut inner = Sha256::new();
		std::io::copy(&mut entry, &mut inner).map_err(archive_err)?;
		outer.update(format!("{:x}  {name}\n", inner.finalize()));
	}

	Ok(format!("h1:{}", BASE64.encode(outer.finalize())))
}

/// Canonical JSON: object keys sorted, no insignificant whitespace.
///
/// The introspection payload preserves the tool's key order, which is not
/// guaranteed stable; canonicalization makes the config hash independent of
/// it.
fn write_canonical_json(value: &Value, out: &mut String) {
	match value {
		Value::Null => out.push_str("null"),
		Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
		Value::Number(n) => out.push_str(&n.to_string()),
		Value::String(s) => {
			out.push_str(&serde_json::to_string(s).expect("strings always serialize"));
		}
		Value::Array(items) => {
			out.push('[');
			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				write_canonical_json(item, out);
			}
			out.push(']');
		}
		Value::Object(map) => {
			let mut keys: Vec<&String> = map.keys().collect();
			keys.sort();

			out.push('{');
			for (i, key) in keys.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				out.push_str(&serde_json::to_string(key).expect("strings always serialize"));
				out.push(':');
				write_canonical_json(&map[key.as_str()], out);
			}
			out.push('}');
		}
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;
	use crate::test_utils::build_zip;

	fn config(value: Value) -> ResolvedConfig {
		ResolvedConfig::from_value(value).unwrap()
	}

	#[test]
	fn test_canonical_json_sorts_keys() {
		let mut a = String::new();
		write_canonical_json(&json!({"b": 1, "a": {"d": [1, true, null], "c": "x"}}), &mut a);
		assert_eq!(a, r#"{"a":{"c":"x","d":[1,true,null]},"b":1}"#);
	}

	#[test]
	fn test_config_hash_ignores_key_order() {
		let left: Value = serde_json::from_str(r#"{"service":"orders","provider":{"x":1}}"#).unwrap();
		let right: Value = serde_json::from_str(r#"{"provider":{"x":1},"service":"orders"}"#).unwrap();

		// preserve_order keeps insertion order distinct between the two.
		assert_eq!(config_hash(&config(left)), config_hash(&config(right)));
	}

	#[test]
	fn test_config_hash_sensitivity() {
		let a = config_hash(&config(json!({"service": "orders", "memory": 128})));
		let b = config_hash(&config(json!({"service": "orders", "memory": 256})));
		assert_ne!(a, b);
	}

	#[test]
	fn test_archive_hash_ignores_entry_order_and_metadata() {
		let dir = tempfile::TempDir::new().unwrap();

		let first = dir.path().join("a.zip");
		build_zip(&first, &[("handler.js", b"X"), ("lib/util.js", b"Y")]);

		// Same contents, reversed entry order, different mtimes.
		let second = dir.path().join("b.zip");
		build_zip(&second, &[("lib/util.js", b"Y"), ("handler.js", b"X")]);

		assert_eq!(
			archive_hash(&first).unwrap(),
			archive_hash(&second).unwrap()
		);
	}

	#[test]
	fn test_archive_hash_sensitivity_to_content() {
		let dir = tempfile::TempDir::new().unwrap();

		let first = dir.path().join("a.zip");
		build_zip(&first, &[("handler.js", b"X")]);
		let second = dir.path().join("b.zip");
		build_zip(&second, &[("handler.js", b"Y")]);

		assert_ne!(
			archive_hash(&first).unwrap(),
			archive_hash(&second).unwrap()
		);
	}

	#[test]
	fn test_archive_hash_sensitivity_to_paths() {
		let dir = tempfile::TempDir::new().unwrap();

		let first = dir.path().join("a.zip");
		build_zip(&first, &[("handler.js", b"X")]);
		let second = dir.path().join("b.zip");
		build_zip(&second, &[("renamed.js", b"X")]);

		assert_ne!(
			archive_hash(&first).unwrap(),
			archive_hash(&second).unwrap()
		);
	}

	#[test]
	fn test_archive_hash_uses_dirhash_scheme() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("a.zip");
		build_zip(&path, &[("handler.js", b"X")]);

		let hash = archive_hash(&path).unwrap();
		assert!(hash.starts_with("h1:"), "unexpected scheme: {hash}");
	}

	#[test]
	fn test_fingerprint_shape_and_stability() {
		let dir = tempfile::TempDir::new().unwrap();
		let package_dir = dir.path().join("build");
		std::fs::create_dir(&package_dir).unwrap();
		build_zip(&package_dir.join("orders.zip"), &[("handler.js", b"X")]);

		let cfg = config(json!({"service": "orders"}));
		let config_dir = dir.path().to_str().unwrap();

		let first = fingerprint(&cfg, config_dir, "build").unwrap();
		let second = fingerprint(&cfg, config_dir, "build").unwrap();
		assert_eq!(first, second);

		// `<artifact>-<config>`: dirhash component, separator, sha256 hex.
		let (artifact, config_part) = first.as_str().split_once('-').unwrap();
		assert!(artifact.starts_with("h1:"));
		assert_eq!(config_part.len(), 64);
	}

	#[test]
	fn test_artifact_override_skips_archive_entirely() {
		// No archive exists anywhere under this path; the computation must
		// not try to open one.
		let cfg = config(json!({
			"service": "orders",
			"package": {"artifact": "dist/prebuilt.zip"}
		}));

		let fp = fingerprint(&cfg, "/nonexistent", "build").unwrap();
		assert!(fp.as_str().starts_with('-'), "artifact component not empty: {fp}");
	}

	#[test]
	fn test_missing_archive_is_fatal() {
		let dir = tempfile::TempDir::new().unwrap();
		let cfg = config(json!({"service": "orders"}));

		let err = fingerprint(&cfg, dir.path().to_str().unwrap(), "build").unwrap_err();
		assert_matches!(err, FingerprintError::Archive { .. });
	}

	#[test]
	fn test_missing_service_produces_no_fingerprint() {
		let cfg = config(json!({"provider": {}}));
		let err = fingerprint(&cfg, "/svc", "build").unwrap_err();
		assert_matches!(
			err,
			FingerprintError::Config(ConfigError::MissingServiceName)
		);
	}
}
