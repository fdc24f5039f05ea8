//! Launcher: CLI, environment ingestion, index bootstrap, crash reporter,
//! and the stdio serve loop.

mod crash;
mod environment;

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use cjls_index::{IndexDatabase, IndexDbOptions};
use cjls_rpc::{ExitStatus, Transport};
use cjls_server::{Dispatcher, LanguageServer, ServerConfig};
use cjls_worker::ShutdownFlag;

/// Version stamp written to `valid.txt`; an index built by a different
/// toolchain version is discarded.
const TOOLCHAIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code logged for transport failures.
const IO_ERROR_EXIT_CODE: u8 = 74;

/// Grace interval after `exit` before the watchdog kills the process.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "cjls", about = "Cangjie language server", disable_version_flag = true)]
struct Cli {
	/// Validate the environment and exit.
	#[arg(long)]
	test: bool,

	/// Enable file logging ("true" or "false").
	#[arg(long, value_name = "BOOL")]
	enable_log: Option<String>,

	/// Log file directory.
	#[arg(long, value_name = "PATH")]
	log_path: Option<PathBuf>,

	/// Cache directory holding the persistent index.
	#[arg(long, value_name = "PATH")]
	cache_path: Option<PathBuf>,

	/// Recompile dependents eagerly instead of deferring to queries.
	#[arg(long)]
	disable_incremental_optimization: bool,

	/// Enable the crash reporter.
	#[arg(short = 'V')]
	crash_reporter: bool,
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	let log_enabled = cli.enable_log.as_deref() == Some("true");
	init_logging(log_enabled, cli.log_path.as_deref());
	if cli.crash_reporter {
		crash::install(cli.log_path.clone());
	}
	let env = environment::from_process_env();
	tracing::info!(
		cangjie_path = %env.cangjie_path,
		cangjie_home = %env.cangjie_home,
		"LSP starting over stdin/stdout"
	);

	let shutdown = ShutdownFlag::new();
	let index = cli
		.cache_path
		.as_deref()
		.and_then(|cache| open_index(cache, shutdown.clone()));

	if cli.test {
		println!(
			"cjls {TOOLCHAIN_VERSION}: environment ok, index {}",
			if index.is_some() { "open" } else { "disabled" }
		);
		return ExitCode::SUCCESS;
	}

	let mut transport = Transport::new(
		Box::new(BufReader::new(std::io::stdin())),
		Box::new(std::io::stdout()),
	);
	let server = LanguageServer::new(
		transport.outgoing(),
		index,
		shutdown.clone(),
		ServerConfig {
			incremental: !cli.disable_incremental_optimization,
			..ServerConfig::default()
		},
	);
	let dispatcher = Dispatcher::new(server);
	let status = transport.serve(&dispatcher);

	match status {
		ExitStatus::NormalExit => {
			tracing::info!("LSP finished");
			// Worker threads wind down cooperatively; if anything wedges,
			// the watchdog ends the process inside the grace interval.
			spawn_watchdog();
			ExitCode::SUCCESS
		}
		ExitStatus::AbnormalExit => {
			let message =
				"exit mode is abnormal; a shutdown request must precede the exit notification";
			tracing::warn!(message);
			eprintln!("warning: {message}");
			ExitCode::from(1)
		}
		ExitStatus::IoError => {
			tracing::error!(code = IO_ERROR_EXIT_CODE, "transport i/o error");
			if shutdown.requested() {
				// The client closed the stream right after shutdown; treat
				// as a clean exit but keep the watchdog as a backstop.
				spawn_watchdog();
				ExitCode::SUCCESS
			} else {
				ExitCode::from(IO_ERROR_EXIT_CODE)
			}
		}
	}
}

fn init_logging(enabled: bool, log_path: Option<&Path>) {
	use tracing_subscriber::EnvFilter;
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	if !enabled {
		// Events still reach stderr at warn+ so failures are not silent.
		tracing_subscriber::fmt()
			.with_env_filter(EnvFilter::new("warn"))
			.with_writer(std::io::stderr)
			.init();
		return;
	}
	match log_path {
		Some(dir) => {
			let _ = std::fs::create_dir_all(dir);
			match std::fs::File::create(dir.join("cjls.log")) {
				Ok(file) => {
					tracing_subscriber::fmt()
						.with_env_filter(filter)
						.with_writer(std::sync::Mutex::new(file))
						.with_ansi(false)
						.init();
				}
				Err(e) => {
					eprintln!("warning: cannot create log file: {e}");
					tracing_subscriber::fmt()
						.with_env_filter(filter)
						.with_writer(std::io::stderr)
						.init();
				}
			}
		}
		None => {
			tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_writer(std::io::stderr)
				.init();
		}
	}
}

/// `<cache>/.cache/index/` bootstrap: the `valid.txt` version gate plus the
/// database itself.
fn open_index(cache: &Path, shutdown: ShutdownFlag) -> Option<IndexDatabase> {
	let index_dir = cache.join(".cache").join("index");
	if let Err(e) = std::fs::create_dir_all(&index_dir) {
		eprintln!("error: fail to create dir for index: {e}");
		return None;
	}
	let valid_file = index_dir.join("valid.txt");
	let db_file = index_dir.join("index.db");
	let recorded = std::fs::read_to_string(&valid_file).unwrap_or_default();
	if recorded != TOOLCHAIN_VERSION {
		if db_file.exists() {
			if let Err(e) = std::fs::remove_file(&db_file) {
				tracing::warn!(error = %e, "remove old index db failed");
			}
		}
		if let Err(e) = std::fs::write(&valid_file, TOOLCHAIN_VERSION) {
			tracing::warn!(error = %e, "write index version file failed");
		}
	}
	match IndexDatabase::open(&db_file, IndexDbOptions::default(), shutdown) {
		Ok(db) => Some(db),
		Err(e) => {
			tracing::error!(error = %e, "index open failed; continuing without persistence");
			None
		}
	}
}

/// Detached hard-exit timer: if the clean shutdown does not finish inside
/// the grace interval after `exit`, end the process anyway.
fn spawn_watchdog() {
	std::thread::spawn(|| {
		std::thread::sleep(SHUTDOWN_GRACE);
		std::process::exit(0);
	});
}
