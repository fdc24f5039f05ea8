//! Toolchain environment ingestion.

/// Paths the toolchain reads from the process environment.
#[derive(Debug, Default, Clone)]
pub struct Environment {
	pub cangjie_path: String,
	pub cangjie_home: String,
	/// Dynamic loader search path, platform-dependent variable name.
	pub runtime_path: String,
}

#[cfg(target_os = "windows")]
const LOADER_PATH_VAR: &str = "PATH";
#[cfg(target_os = "macos")]
const LOADER_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LOADER_PATH_VAR: &str = "LD_LIBRARY_PATH";

pub fn from_process_env() -> Environment {
	Environment {
		cangjie_path: absolute_or_empty(std::env::var("CANGJIE_PATH").ok()),
		cangjie_home: absolute_or_empty(std::env::var("CANGJIE_HOME").ok()),
		runtime_path: std::env::var(LOADER_PATH_VAR)
			.unwrap_or_default()
			.replace('\\', "/"),
	}
}

fn absolute_or_empty(value: Option<String>) -> String {
	let Some(value) = value else {
		return String::new();
	};
	std::fs::canonicalize(&value)
		.ok()
		.and_then(|p| p.to_str().map(str::to_string))
		.unwrap_or(value)
}
