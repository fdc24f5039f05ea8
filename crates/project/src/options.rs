//! `initialize` payload ingestion.
//!
//! The client describes modules, per-module requires, conditional-compile
//! options, and cache/decl paths inside `initializationOptions`. Everything
//! is optional; a bare `rootUri` still yields a working single-module
//! project.

use serde::Deserialize;
use serde_json::Value;

/// One module of the workspace.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleSpec {
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub path: String,
	/// Required module name -> its source path.
	#[serde(default)]
	pub requires: std::collections::BTreeMap<String, RequireSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequireSpec {
	#[serde(default)]
	pub path: String,
}

/// Parsed initialize options.
#[derive(Debug, Clone, Default)]
pub struct InitializeOptions {
	pub root_path: String,
	pub modules: Vec<ModuleSpec>,
	pub cache_path: Option<String>,
	pub std_lib_path: Option<String>,
	pub std_decl_path: Option<String>,
	/// Conditional-compile option blob, passed through to the front end.
	pub condition_compile: Value,
}

impl InitializeOptions {
	/// Reads the wire shape. Unknown fields are ignored, missing fields get
	/// defaults; a malformed `multiModuleOption` degrades to the implicit
	/// single module rooted at `rootPath`.
	pub fn from_params(params: &Value) -> InitializeOptions {
		let root_path = params
			.get("rootUri")
			.and_then(Value::as_str)
			.and_then(cjls_protocol_uri)
			.or_else(|| {
				params
					.get("rootPath")
					.and_then(Value::as_str)
					.map(str::to_string)
			})
			.unwrap_or_default();

		let init_opts = params.get("initializationOptions").cloned().unwrap_or(Value::Null);
		let mut modules = Vec::new();
		if let Some(multi) = init_opts.get("multiModuleOption").and_then(Value::as_object) {
			for (name, body) in multi {
				match serde_json::from_value::<ModuleSpec>(body.clone()) {
					Ok(mut spec) => {
						if spec.name.is_empty() {
							spec.name = name.clone();
						}
						if spec.path.is_empty() {
							spec.path = root_path.clone();
						}
						modules.push(spec);
					}
					Err(e) => {
						tracing::warn!(module = %name, error = %e, "bad module option ignored")
					}
				}
			}
		}
		if modules.is_empty() && !root_path.is_empty() {
			let name = std::path::Path::new(&root_path)
				.file_name()
				.map(|n| n.to_string_lossy().to_string())
				.unwrap_or_else(|| "default".to_string());
			modules.push(ModuleSpec {
				name,
				path: root_path.clone(),
				requires: Default::default(),
			});
		}

		InitializeOptions {
			root_path,
			modules,
			cache_path: init_opts
				.get("cachePath")
				.and_then(Value::as_str)
				.map(str::to_string),
			std_lib_path: init_opts
				.get("stdLibPathOption")
				.and_then(Value::as_str)
				.map(str::to_string),
			std_decl_path: init_opts
				.get("stdCjdPathOption")
				.and_then(Value::as_str)
				.map(str::to_string),
			condition_compile: init_opts
				.get("conditionCompileOption")
				.cloned()
				.unwrap_or(Value::Null),
		}
	}
}

/// Local `file://` decode; the protocol crate is not a dependency here, and
/// only the path form matters.
fn cjls_protocol_uri(uri: &str) -> Option<String> {
	let rest = uri.strip_prefix("file://")?;
	let decoded = rest.replace("%3A", ":").replace("%20", " ");
	if decoded.len() > 2 && decoded.as_bytes()[0] == b'/' && decoded.as_bytes()[2] == b':' {
		Some(decoded[1..].to_string())
	} else {
		Some(decoded)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bare_root_uri_yields_one_module() {
		let opts = InitializeOptions::from_params(&serde_json::json!({
			"rootUri": "file:///proj"
		}));
		assert_eq!(opts.root_path, "/proj");
		assert_eq!(opts.modules.len(), 1);
		assert_eq!(opts.modules[0].name, "proj");
	}

	#[test]
	fn multi_module_option_is_parsed() {
		let opts = InitializeOptions::from_params(&serde_json::json!({
			"rootUri": "file:///w",
			"initializationOptions": {
				"multiModuleOption": {
					"m1": {"path": "/w/m1", "requires": {"m2": {"path": "/w/m2"}}},
					"m2": {"path": "/w/m2"}
				},
				"cachePath": "/w/.cache"
			}
		}));
		assert_eq!(opts.modules.len(), 2);
		let m1 = opts.modules.iter().find(|m| m.name == "m1").unwrap();
		assert_eq!(m1.requires.len(), 1);
		assert_eq!(opts.cache_path.as_deref(), Some("/w/.cache"));
	}
}
