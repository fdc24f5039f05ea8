//! The server facade: owns every long-lived component and the scheduling
//! entry points feature handlers go through.

use std::sync::Arc;

use cjls_docs::{DocCache, DocPatch};
use cjls_frontend::{FileAst, Position};
use cjls_index::{CrossSymbol, IndexDatabase};
use cjls_project::{InitializeOptions, PkgSnapshot, PkgState, Project};
use cjls_rpc::Outgoing;
use cjls_worker::{DepPool, FeaturePool, ShutdownFlag, default_pool_size};
use lsp_types::{
	DidChangeTextDocumentParams, DidChangeWatchedFilesParams, DidCloseTextDocumentParams,
	DidOpenTextDocumentParams, DidSaveTextDocumentParams, FileChangeType, InitializeResult,
	ServerInfo,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::convert::uri_path;
use crate::features::diagnostics;
use crate::{Reply, capabilities};

/// Tunables from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub pool_size: usize,
	pub incremental: bool,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			pool_size: default_pool_size(),
			incremental: true,
		}
	}
}

/// What the client negotiated at initialize.
#[derive(Debug, Default, Clone)]
pub struct ClientState {
	pub diagnostic_version_support: bool,
	pub extend_publish_diagnostics: bool,
	pub embedded_host: bool,
}

/// What a scheduled feature action receives.
pub struct InputsAndAst {
	pub file: Arc<FileAst>,
	pub snapshot: Arc<PkgSnapshot>,
	pub version: i64,
	pub use_ast_cache: bool,
	/// The package served a pre-edit snapshot (a dependency changed and the
	/// rebuild has not landed yet).
	pub stale: bool,
}

/// Which feature pool an action runs on.
#[derive(Debug, Clone, Copy)]
pub enum PoolKind {
	General,
	Completion,
	SignatureHelp,
}

pub struct LanguageServer {
	pub outgoing: Outgoing,
	pub docs: Arc<DocCache>,
	pub shutdown: ShutdownFlag,
	project: Mutex<Option<Arc<Project>>>,
	index: Option<IndexDatabase>,
	general_pool: FeaturePool,
	completion_pool: FeaturePool,
	signature_pool: FeaturePool,
	compile_pool: DepPool,
	/// Per-file quick-fixes computed at publish time, served by codeAction.
	pub fix_its: Mutex<FxHashMap<String, Vec<diagnostics::FixIt>>>,
	pub client: Mutex<ClientState>,
	/// Cross-language registrations; the first registration of a name wins.
	pub cross_registry: Mutex<FxHashMap<(String, String), CrossSymbol>>,
	/// Accepted-completion telemetry from `trackCompletion`.
	pub completion_telemetry: Mutex<Vec<(String, bool)>>,
	config: ServerConfig,
}

impl LanguageServer {
	pub fn new(
		outgoing: Outgoing,
		index: Option<IndexDatabase>,
		shutdown: ShutdownFlag,
		config: ServerConfig,
	) -> Arc<LanguageServer> {
		Arc::new(LanguageServer {
			outgoing,
			docs: Arc::new(DocCache::new()),
			project: Mutex::new(None),
			index,
			general_pool: FeaturePool::new("general", config.pool_size, shutdown.clone()),
			completion_pool: FeaturePool::new("completion", config.pool_size, shutdown.clone()),
			signature_pool: FeaturePool::new("signature", config.pool_size, shutdown.clone()),
			compile_pool: DepPool::new(config.pool_size, shutdown.clone()),
			fix_its: Mutex::new(FxHashMap::default()),
			client: Mutex::new(ClientState::default()),
			cross_registry: Mutex::new(FxHashMap::default()),
			completion_telemetry: Mutex::new(Vec::new()),
			shutdown,
			config,
		})
	}

	pub fn project(&self) -> Option<Arc<Project>> {
		self.project.lock().clone()
	}

	pub fn index(&self) -> Option<&IndexDatabase> {
		self.index.as_ref()
	}

	// ---- lifecycle ----

	/// Project bootstrap: builds the package graph and schedules the initial
	/// compile of every package, dependencies first.
	pub fn initialize(self: &Arc<Self>, params: Value, reply: Reply) {
		let options = InitializeOptions::from_params(&params);
		{
			let mut client = self.client.lock();
			client.diagnostic_version_support = params
				.pointer("/capabilities/textDocument/publishDiagnostics/versionSupport")
				.and_then(Value::as_bool)
				.unwrap_or(false);
			client.extend_publish_diagnostics = params
				.pointer("/initializationOptions/extendPublishDiagnostics")
				.and_then(Value::as_bool)
				.unwrap_or(false);
			client.embedded_host = params
				.pointer("/initializationOptions/embeddedHost")
				.and_then(Value::as_bool)
				.unwrap_or(false);
		}
		let project = Project::new(
			options.root_path.clone(),
			self.docs.clone(),
			self.index.clone(),
			self.shutdown.clone(),
		);
		project.set_incremental(self.config.incremental);
		project.ingest(&options.modules);
		project.schedule_initial_compile(&self.compile_pool);
		*self.project.lock() = Some(project);
		tracing::info!(root = %options.root_path, modules = options.modules.len(), "project initialized");

		let result = InitializeResult {
			capabilities: capabilities::server_capabilities(&self.client.lock()),
			server_info: Some(ServerInfo {
				name: "cjls".to_string(),
				version: Some(env!("CARGO_PKG_VERSION").to_string()),
			}),
		};
		reply.ok(result);
	}

	pub fn initialized(self: &Arc<Self>) {
		tracing::info!("client ready");
	}

	/// Waits for the initial compile to settle. Test hook and `--test` mode.
	pub fn wait_for_initial_compile(&self) {
		self.compile_pool.wait_all();
	}

	pub fn on_shutdown(self: &Arc<Self>, reply: Reply) {
		tracing::info!("shutdown requested");
		self.shutdown.request();
		reply.null();
	}

	// ---- document notifications ----

	pub fn did_open(self: &Arc<Self>, params: DidOpenTextDocumentParams) {
		let Some(path) = uri_path(&params.text_document.uri) else {
			tracing::warn!(uri = %params.text_document.uri.as_str(), "non-file uri ignored");
			return;
		};
		self.docs.open(
			&path,
			params.text_document.version as i64,
			params.text_document.text.clone(),
		);
		if let Some(project) = self.project() {
			if project.pkg_of_file(&path).is_none() {
				let root = project.root.clone();
				let module = module_name_of(&root);
				project.register_file(&path, &module, &root, &params.text_document.text);
				project.rebuild_deps();
			}
			project.update_file_status(&path);
		}
		self.schedule_diagnostics(&path);
	}

	pub fn did_change(self: &Arc<Self>, params: DidChangeTextDocumentParams) {
		let Some(path) = uri_path(&params.text_document.uri) else {
			return;
		};
		let patches: Vec<DocPatch> = params
			.content_changes
			.iter()
			.map(|change| DocPatch {
				range: change.range.map(|r| cjls_docs::PatchRange {
					start_line: r.start.line,
					start_character: r.start.character,
					end_line: r.end.line,
					end_character: r.end.character,
				}),
				text: change.text.clone(),
			})
			.collect();
		if !self
			.docs
			.update(&path, params.text_document.version as i64, &patches)
		{
			return;
		}
		if let Some(project) = self.project() {
			project.update_file_status(&path);
		}
		self.schedule_diagnostics(&path);
	}

	pub fn did_close(self: &Arc<Self>, params: DidCloseTextDocumentParams) {
		if let Some(path) = uri_path(&params.text_document.uri) {
			self.docs.close(&path);
		}
	}

	pub fn did_save(self: &Arc<Self>, params: DidSaveTextDocumentParams) {
		if let Some(path) = uri_path(&params.text_document.uri) {
			tracing::debug!(path = %path, "saved");
		}
	}

	pub fn did_change_watched_files(self: &Arc<Self>, params: DidChangeWatchedFilesParams) {
		let Some(project) = self.project() else { return };
		let mut touched_pkgs = Vec::new();
		for event in &params.changes {
			let Some(path) = uri_path(&event.uri) else { continue };
			if !path.ends_with(".cj") {
				continue;
			}
			match event.typ {
				FileChangeType::DELETED => {
					if let Some(pkg) = project.pkg_of_file(&path) {
						touched_pkgs.push(pkg);
					}
					project.remove_file(&path);
					// Clear stale diagnostics for the dropped file.
					self.fix_its.lock().remove(&path);
					diagnostics::publish_empty(self, &path);
				}
				FileChangeType::CREATED | FileChangeType::CHANGED => {
					match std::fs::read_to_string(&path) {
						Ok(contents) => {
							if project.pkg_of_file(&path).is_none() {
								let root = project.root.clone();
								let module = module_name_of(&root);
								project.register_file(&path, &module, &root, &contents);
								project.rebuild_deps();
							}
							project.update_file_status(&path);
							if let Some(pkg) = project.pkg_of_file(&path) {
								touched_pkgs.push(pkg);
							}
						}
						Err(e) => {
							tracing::warn!(path = %path, error = %e, "watched file unreadable")
						}
					}
				}
				_ => {}
			}
		}
		// Recompile touched packages in the background and refresh
		// diagnostics from the new snapshots.
		for pkg in touched_pkgs {
			let this = self.clone();
			let project = project.clone();
			self.compile_pool.add_task(
				cjls_frontend::symbol_id_of(&pkg) ^ 0x5157,
				[],
				move || match project.compile_package(&pkg) {
					Ok(snapshot) => diagnostics::publish_for_snapshot(&this, &snapshot),
					Err(e) => {
						tracing::warn!(pkg = %pkg, error = %e, "watched rebuild failed");
						if let Some(entry) = project.entry(&pkg) {
							for (file, diags) in entry.file_diagnostics() {
								diagnostics::publish_raw(&this, &file, &diags);
							}
						}
					}
				},
			);
		}
	}

	// ---- scheduling ----

	/// Schedules `action` on a pool with the file's current analysis. The
	/// package is rebuilt first when the live document is newer.
	pub fn run_with_ast(
		self: &Arc<Self>,
		task: &str,
		file: &str,
		action: impl FnOnce(Option<InputsAndAst>) + Send + 'static,
	) {
		self.run_on(PoolKind::General, task, file, None, action);
	}

	/// Like [`run_with_ast`](Self::run_with_ast) but prefers the cached
	/// snapshot when the pending edit cannot affect the cursor position.
	pub fn run_with_ast_cache(
		self: &Arc<Self>,
		pool: PoolKind,
		task: &str,
		file: &str,
		position: Position,
		action: impl FnOnce(Option<InputsAndAst>) + Send + 'static,
	) {
		self.run_on(pool, task, file, Some(position), action);
	}

	fn run_on(
		self: &Arc<Self>,
		pool: PoolKind,
		task: &str,
		file: &str,
		cache_position: Option<Position>,
		action: impl FnOnce(Option<InputsAndAst>) + Send + 'static,
	) {
		let this = self.clone();
		let path = file.to_string();
		let pool = match pool {
			PoolKind::General => &self.general_pool,
			PoolKind::Completion => &self.completion_pool,
			PoolKind::SignatureHelp => &self.signature_pool,
		};
		pool.submit(task, file, move || {
			if this.shutdown.requested() {
				action(None);
				return;
			}
			let Some(project) = this.project() else {
				action(None);
				return;
			};
			let Some(pkg) = project.pkg_of_file(&path) else {
				action(None);
				return;
			};
			let entry = project.entry(&pkg);
			if let (Some(position), Some(entry)) = (cache_position, entry.as_ref()) {
				if let Some(snapshot) = entry.snapshot() {
					if cache_covers(&this, &path, position) {
						if let Some(file_ast) = snapshot.file(&path) {
							action(Some(InputsAndAst {
								file: file_ast.clone(),
								snapshot: snapshot.clone(),
								version: this.docs.version_of(&path),
								use_ast_cache: true,
								stale: entry.is_stale(),
							}));
							return;
						}
					}
				}
			}
			let Some(snapshot) = project.ensure_file_current(&path) else {
				action(None);
				return;
			};
			let stale = project
				.entry(&pkg)
				.map(|e| e.is_stale())
				.unwrap_or(false);
			match snapshot.file(&path) {
				Some(file_ast) => action(Some(InputsAndAst {
					file: file_ast.clone(),
					snapshot: snapshot.clone(),
					version: this.docs.version_of(&path),
					use_ast_cache: false,
					stale,
				})),
				None => action(None),
			}
		});
	}

	// ---- diagnostics ----

	pub fn schedule_diagnostics(self: &Arc<Self>, file: &str) {
		let this = self.clone();
		let path = file.to_string();
		self.general_pool.submit("Diagnostics", file, move || {
			let Some(project) = this.project() else { return };
			let Some(pkg) = project.pkg_of_file(&path) else { return };
			let snapshot = project.ensure_file_current(&path);
			// A broken package keeps serving its previous snapshot; the
			// failed attempt's diagnostics still go out.
			if let Some(entry) = project.entry(&pkg) {
				if entry.state() == PkgState::Broken {
					for (file, diags) in entry.file_diagnostics() {
						diagnostics::publish_raw(&this, &file, &diags);
					}
					return;
				}
			}
			if let Some(snapshot) = snapshot {
				diagnostics::publish_for_snapshot(&this, &snapshot);
			}
		});
	}
}

/// Whether the cached snapshot is still valid for a query at `position`:
/// either the document has no pending edit, or the earliest pending edit
/// starts strictly after the position.
fn cache_covers(server: &LanguageServer, path: &str, position: Position) -> bool {
	let doc = server.docs.get(path);
	if !doc.needs_reparse {
		return true;
	}
	match doc.last_edit_begin {
		Some((line, character)) => {
			let edit = Position::new(line + 1, character + 1);
			edit > position
		}
		None => false,
	}
}

fn module_name_of(root: &str) -> String {
	std::path::Path::new(root)
		.file_name()
		.map(|n| n.to_string_lossy().to_string())
		.unwrap_or_else(|| "default".to_string())
}
