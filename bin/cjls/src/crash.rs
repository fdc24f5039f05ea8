//! Crash reporter: a panic hook that records a report before the process
//! dies non-zero.

use std::path::PathBuf;

/// Installs the hook. Reports land next to the log file (or the temp dir
/// when no log path was configured).
pub fn install(log_path: Option<PathBuf>) {
	let dir = log_path.unwrap_or_else(std::env::temp_dir);
	let previous = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		let thread = std::thread::current()
			.name()
			.unwrap_or("unnamed")
			.to_string();
		let backtrace = std::backtrace::Backtrace::force_capture();
		let report = format!(
			"cjls crash report\nversion: {}\nthread: {}\npanic: {}\n\nbacktrace:\n{}\n",
			env!("CARGO_PKG_VERSION"),
			thread,
			info,
			backtrace
		);
		let path = dir.join(format!("cjls-crash-{}.txt", std::process::id()));
		if std::fs::write(&path, &report).is_err() {
			eprintln!("{report}");
		} else {
			eprintln!("crash report written to {}", path.display());
		}
		previous(info);
	}));
}
