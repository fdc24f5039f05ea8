//! Package graph, snapshots, and compile orchestration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use cjls_docs::DocCache;
use cjls_frontend::{
	Diagnostic, ExternalSymbols, FileAst, FileInput, NodeKind, PackageExports, SourceManager,
	analyze, exports_of, lex, parse,
};
use cjls_index::{FileRow, IndexDatabase, collect_package};
use cjls_worker::{DepPool, ShutdownFlag};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Package lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgState {
	Unparsed,
	Parsed,
	SemaReady,
	Changed,
	Broken,
}

/// Immutable, atomically-replaced view of one compiled package.
#[derive(Debug)]
pub struct PkgSnapshot {
	pub package: String,
	pub files: Vec<Arc<FileAst>>,
	by_path: FxHashMap<String, usize>,
	pub exports: PackageExports,
	pub sources: SourceManager,
}

impl PkgSnapshot {
	pub fn file(&self, path: &str) -> Option<&Arc<FileAst>> {
		self.by_path.get(path).map(|&i| &self.files[i])
	}

	pub fn paths(&self) -> impl Iterator<Item = &str> {
		self.by_path.keys().map(String::as_str)
	}
}

/// One package's live bookkeeping.
pub struct PackageEntry {
	pub full_name: String,
	pub module: String,
	files: Mutex<BTreeSet<String>>,
	deps: Mutex<FxHashSet<String>>,
	state: Mutex<PkgState>,
	snapshot: ArcSwapOption<PkgSnapshot>,
	digest: Mutex<String>,
	/// Stale-for-queries: a dependency changed but this package has not been
	/// recompiled yet; the previous snapshot is still served.
	stale: AtomicBool,
	/// Per-file diagnostics of the latest compile attempt. Kept separately
	/// from the snapshot so a broken attempt (which retains the previous
	/// snapshot) still surfaces its parse errors.
	diagnostics: Mutex<Vec<(String, Vec<Diagnostic>)>>,
	compiling: Mutex<()>,
}

impl PackageEntry {
	fn new(full_name: &str, module: &str) -> Arc<PackageEntry> {
		Arc::new(PackageEntry {
			full_name: full_name.to_string(),
			module: module.to_string(),
			files: Mutex::new(BTreeSet::new()),
			deps: Mutex::new(FxHashSet::default()),
			state: Mutex::new(PkgState::Unparsed),
			snapshot: ArcSwapOption::empty(),
			digest: Mutex::new(String::new()),
			stale: AtomicBool::new(false),
			diagnostics: Mutex::new(Vec::new()),
			compiling: Mutex::new(()),
		})
	}

	pub fn state(&self) -> PkgState {
		*self.state.lock()
	}

	pub fn is_stale(&self) -> bool {
		self.stale.load(Ordering::SeqCst)
	}

	pub fn snapshot(&self) -> Option<Arc<PkgSnapshot>> {
		self.snapshot.load_full()
	}

	pub fn digest(&self) -> String {
		self.digest.lock().clone()
	}

	pub fn files(&self) -> Vec<String> {
		self.files.lock().iter().cloned().collect()
	}

	pub fn deps(&self) -> Vec<String> {
		self.deps.lock().iter().cloned().collect()
	}

	/// Diagnostics of the latest compile attempt, per file.
	pub fn file_diagnostics(&self) -> Vec<(String, Vec<Diagnostic>)> {
		self.diagnostics.lock().clone()
	}
}

/// The project: file↔package map, dependency graph, snapshot cache, and the
/// compile pipeline feeding the index.
pub struct Project {
	pub root: String,
	entries: Mutex<FxHashMap<String, Arc<PackageEntry>>>,
	file_pkg: Mutex<FxHashMap<String, String>>,
	/// Dotted import paths per file, from the last scan or compile.
	file_imports: Mutex<FxHashMap<String, Vec<String>>>,
	docs: Arc<DocCache>,
	index: Option<IndexDatabase>,
	shutdown: ShutdownFlag,
	incremental: AtomicBool,
}

impl Project {
	pub fn new(
		root: String,
		docs: Arc<DocCache>,
		index: Option<IndexDatabase>,
		shutdown: ShutdownFlag,
	) -> Arc<Project> {
		Arc::new(Project {
			root,
			entries: Mutex::new(FxHashMap::default()),
			file_pkg: Mutex::new(FxHashMap::default()),
			file_imports: Mutex::new(FxHashMap::default()),
			docs,
			index,
			shutdown,
			incremental: AtomicBool::new(true),
		})
	}

	pub fn set_incremental(&self, enabled: bool) {
		self.incremental.store(enabled, Ordering::SeqCst);
	}

	/// Scans module source roots, registering every `.cj` file with its
	/// package and seeding the dependency graph from import headers.
	pub fn ingest(&self, modules: &[crate::ModuleSpec]) {
		for module in modules {
			let walk = ignore::WalkBuilder::new(&module.path)
				.standard_filters(false)
				.hidden(true)
				.build();
			for entry in walk.flatten() {
				let path = entry.path();
				if path.extension().and_then(|e| e.to_str()) != Some("cj") {
					continue;
				}
				let Some(path_str) = path.to_str() else { continue };
				let path_str = path_str.replace('\\', "/");
				match std::fs::read_to_string(path) {
					Ok(contents) => {
						self.register_file(&path_str, &module.name, &module.path, &contents);
					}
					Err(e) => {
						tracing::warn!(path = %path_str, error = %e, "unreadable source skipped")
					}
				}
			}
		}
		self.rebuild_deps();
	}

	/// Registers one source file under its package (declared `package` spec
	/// first, directory layout as fallback).
	pub fn register_file(&self, path: &str, module: &str, module_root: &str, contents: &str) {
		let pkg = declared_package(contents)
			.unwrap_or_else(|| derive_package(module, module_root, path));
		self.file_pkg.lock().insert(path.to_string(), pkg.clone());
		self.file_imports
			.lock()
			.insert(path.to_string(), scan_imports(contents));
		let entry = self.entry_or_insert(&pkg, module);
		entry.files.lock().insert(path.to_string());
	}

	fn entry_or_insert(&self, pkg: &str, module: &str) -> Arc<PackageEntry> {
		self.entries
			.lock()
			.entry(pkg.to_string())
			.or_insert_with(|| PackageEntry::new(pkg, module))
			.clone()
	}

	/// Recomputes every package's dependency set from recorded imports.
	pub fn rebuild_deps(&self) {
		let entries = self.entries.lock().clone();
		let file_pkg = self.file_pkg.lock().clone();
		let file_imports = self.file_imports.lock().clone();
		for entry in entries.values() {
			entry.deps.lock().clear();
		}
		for (file, imports) in &file_imports {
			let Some(pkg) = file_pkg.get(file) else { continue };
			let Some(entry) = entries.get(pkg) else { continue };
			for import in imports {
				if let Some(dep) = resolve_import_package(&entries, import) {
					if dep != *pkg {
						entry.deps.lock().insert(dep);
					}
				}
			}
		}
	}

	pub fn packages(&self) -> Vec<Arc<PackageEntry>> {
		self.entries.lock().values().cloned().collect()
	}

	pub fn entry(&self, pkg: &str) -> Option<Arc<PackageEntry>> {
		self.entries.lock().get(pkg).cloned()
	}

	pub fn pkg_of_file(&self, path: &str) -> Option<String> {
		self.file_pkg.lock().get(path).cloned()
	}

	/// Schedules the initial compile of every package onto the DAG pool,
	/// dependencies first. Tasks are submitted in topological order so the
	/// pool sees every predecessor edge.
	pub fn schedule_initial_compile(self: &Arc<Self>, pool: &DepPool) {
		let entries = self.entries.lock().clone();
		let mut pending: Vec<String> = entries.keys().cloned().collect();
		pending.sort();
		let mut placed: FxHashSet<String> = FxHashSet::default();
		let mut ordered: Vec<String> = Vec::new();
		while !pending.is_empty() {
			let before = pending.len();
			pending.retain(|pkg| {
				let ready = entries[pkg]
					.deps
					.lock()
					.iter()
					.all(|dep| placed.contains(dep) || !entries.contains_key(dep));
				if ready {
					placed.insert(pkg.clone());
					ordered.push(pkg.clone());
				}
				!ready
			});
			if pending.len() == before {
				tracing::warn!(cycle = ?pending, "package dependency cycle; compiling in name order");
				ordered.append(&mut pending);
			}
		}
		for pkg in ordered {
			let deps: Vec<u64> = entries[&pkg].deps.lock().iter().map(|d| task_id(d)).collect();
			let this = self.clone();
			pool.add_task(task_id(&pkg), deps, move || {
				if let Err(e) = this.compile_package(&pkg) {
					tracing::error!(pkg = %pkg, error = %e, "initial compile failed");
				}
			});
		}
	}

	/// Parses and analyzes one package, swapping in a fresh snapshot and
	/// replacing its index rows. Dependencies are compiled first.
	pub fn compile_package(self: &Arc<Self>, pkg: &str) -> Result<Arc<PkgSnapshot>> {
		let mut visited = FxHashSet::default();
		self.compile_inner(pkg, &mut visited)
	}

	fn compile_inner(
		self: &Arc<Self>,
		pkg: &str,
		visited: &mut FxHashSet<String>,
	) -> Result<Arc<PkgSnapshot>> {
		let entry = self
			.entry(pkg)
			.ok_or_else(|| Error::UnknownPackage(pkg.to_string()))?;
		if !visited.insert(pkg.to_string()) {
			// Dependency cycle: serve whatever exists rather than recurse.
			return entry
				.snapshot()
				.ok_or_else(|| Error::DependencyCycle(pkg.to_string()));
		}

		// Dependencies first, outside our own compile lock.
		for dep in entry.deps() {
			let needs = self
				.entry(&dep)
				.map(|e| e.state() != PkgState::SemaReady || e.is_stale())
				.unwrap_or(false);
			if needs {
				if let Err(e) = self.compile_inner(&dep, visited) {
					tracing::warn!(pkg = %dep, error = %e, "dependency compile failed");
				}
			}
		}

		let _compiling = entry.compiling.lock();
		// Re-check under the lock: another thread may have finished it.
		let any_dirty = entry
			.files()
			.iter()
			.any(|f| self.docs.needs_reparse(f));
		if entry.state() == PkgState::SemaReady && !entry.is_stale() && !any_dirty {
			if let Some(snapshot) = entry.snapshot() {
				return Ok(snapshot);
			}
		}

		if self.shutdown.requested() {
			return Err(Error::ShuttingDown);
		}

		// A package is sema-ready only when every dependency is; there is no
		// .cjo artifact import to satisfy one any other way. A failed
		// dependency breaks this package instead of silently promoting it.
		for dep in entry.deps() {
			let ready = self
				.entry(&dep)
				.map(|e| e.state() == PkgState::SemaReady)
				.unwrap_or(false);
			if !ready {
				*entry.state.lock() = PkgState::Broken;
				return Err(Error::DependencyNotReady {
					pkg: pkg.to_string(),
					dep,
				});
			}
		}

		// Gather sources: live documents win over disk.
		let paths = entry.files();
		if paths.is_empty() {
			*entry.state.lock() = PkgState::Broken;
			return Err(Error::UnknownPackage(pkg.to_string()));
		}
		let mut sources: Vec<(String, String)> = Vec::with_capacity(paths.len());
		for path in &paths {
			let doc = self.docs.get(path);
			let contents = if doc.version != cjls_docs::UNOPENED_VERSION || doc.init_compiled {
				doc.contents
			} else {
				match std::fs::read_to_string(path) {
					Ok(text) => {
						self.docs.add_on_init_compile(path, text.clone());
						text
					}
					Err(e) => {
						tracing::warn!(path = %path, error = %e, "source read failed");
						continue;
					}
				}
			};
			sources.push((path.clone(), contents));
		}
		if sources.is_empty() {
			*entry.state.lock() = PkgState::Broken;
			return Err(Error::Io(pkg.to_string()));
		}
		sources.sort_by(|a, b| a.0.cmp(&b.0));

		*entry.state.lock() = PkgState::Unparsed;
		let mut source_manager = SourceManager::new();
		let mut parsed = Vec::with_capacity(sources.len());
		for (path, contents) in &sources {
			source_manager.add_file(path, contents);
			let (tokens, mut diags) = lex(contents);
			let (ast, parse_diags) = parse(&tokens);
			diags.extend(parse_diags);
			// Keep the import record current for dependency edges.
			self.file_imports
				.lock()
				.insert(path.clone(), imports_of_ast(&ast));
			parsed.push((path.clone(), tokens, ast, diags));
		}
		*entry.state.lock() = PkgState::Parsed;

		// Fatal parse errors bar promotion: keep the previous snapshot for
		// queries, but record this attempt's diagnostics so the editor still
		// sees them.
		let parse_fatal = parsed
			.iter()
			.any(|(_, _, _, diags)| diags.iter().any(Diagnostic::is_fatal));
		if parse_fatal {
			*entry.diagnostics.lock() = parsed
				.iter()
				.map(|(path, _, _, diags)| (path.clone(), diags.clone()))
				.collect();
			*entry.state.lock() = PkgState::Broken;
			return Err(Error::FatalParseErrors(pkg.to_string()));
		}

		// Exported surfaces of every ready dependency.
		let mut externals = ExternalSymbols::default();
		for dep in entry.deps() {
			if let Some(snapshot) = self.entry(&dep).and_then(|e| e.snapshot()) {
				externals
					.packages
					.insert(dep.clone(), snapshot.exports.clone());
			}
		}

		let inputs: Vec<FileInput<'_>> = parsed
			.iter()
			.map(|(path, _, ast, _)| FileInput { path, ast })
			.collect();
		let exports = exports_of(pkg, &inputs);
		let semas = analyze(pkg, &inputs, &externals);
		drop(inputs);

		let mut files = Vec::with_capacity(parsed.len());
		let mut by_path = FxHashMap::default();
		for ((path, tokens, ast, mut diags), sema) in parsed.into_iter().zip(semas) {
			diags.extend(sema.diagnostics);
			by_path.insert(path.clone(), files.len());
			files.push(Arc::new(FileAst {
				path,
				package: pkg.to_string(),
				tokens,
				ast,
				sema: sema.table,
				diagnostics: diags,
			}));
		}

		*entry.diagnostics.lock() = files
			.iter()
			.map(|f| (f.path.clone(), f.diagnostics.clone()))
			.collect();

		let digest = digest_of(&sources);
		let snapshot = Arc::new(PkgSnapshot {
			package: pkg.to_string(),
			files,
			by_path,
			exports,
			sources: source_manager,
		});
		entry.snapshot.store(Some(snapshot.clone()));
		*entry.state.lock() = PkgState::SemaReady;
		entry.stale.store(false, Ordering::SeqCst);
		for (path, _) in &sources {
			let version = self.docs.version_of(path);
			self.docs.mark_reparse(path, version, false);
		}
		self.rebuild_deps();

		let digest_unchanged = {
			let mut guard = entry.digest.lock();
			let unchanged = *guard == digest && !digest.is_empty();
			*guard = digest.clone();
			unchanged
		};
		if !(digest_unchanged && self.incremental.load(Ordering::SeqCst)) {
			self.write_index_rows(&entry, &snapshot, &sources);
		}
		tracing::debug!(pkg = %pkg, files = sources.len(), "package compiled");
		Ok(snapshot)
	}

	/// Replaces the package's index rows in one transaction.
	fn write_index_rows(
		&self,
		entry: &PackageEntry,
		snapshot: &PkgSnapshot,
		sources: &[(String, String)],
	) {
		let Some(index) = &self.index else { return };
		let refs: Vec<&FileAst> = snapshot.files.iter().map(Arc::as_ref).collect();
		let collected = collect_package(&entry.full_name, &entry.module, &refs);
		let result = index.update(|tx| {
			tx.delete_pkg_rows(&entry.full_name)?;
			for (path, contents) in sources {
				tx.insert_file(&FileRow {
					path: path.clone(),
					digest: content_digest(contents),
					package: entry.full_name.clone(),
					module: entry.module.clone(),
				})?;
			}
			tx.insert_symbols(&entry.full_name, &collected.symbols)?;
			tx.insert_references(&entry.full_name, &collected.refs)?;
			tx.insert_relations(&entry.full_name, &collected.relations)?;
			tx.insert_completions(&entry.full_name, &collected.completions)?;
			tx.insert_comments(&entry.full_name, &collected.comments)?;
			tx.insert_extends(&entry.full_name, &collected.extends)?;
			tx.insert_cross_symbols(&entry.full_name, &collected.cross_symbols)?;
			Ok(())
		});
		if let Err(e) = result {
			tracing::error!(pkg = %entry.full_name, error = %e, "index write failed");
		}
	}

	/// Marks the file's package changed and every transitive dependent
	/// stale-for-queries.
	pub fn update_file_status(&self, path: &str) {
		let Some(pkg) = self.pkg_of_file(path) else {
			return;
		};
		if let Some(entry) = self.entry(&pkg) {
			*entry.state.lock() = PkgState::Changed;
		}
		for dependent in self.dependents_of(&pkg) {
			if let Some(entry) = self.entry(&dependent) {
				entry.stale.store(true, Ordering::SeqCst);
			}
		}
	}

	/// Transitive dependents of a package.
	pub fn dependents_of(&self, pkg: &str) -> Vec<String> {
		let entries = self.entries.lock().clone();
		let mut reverse: FxHashMap<String, Vec<String>> = FxHashMap::default();
		for (name, entry) in &entries {
			for dep in entry.deps.lock().iter() {
				reverse.entry(dep.clone()).or_default().push(name.clone());
			}
		}
		let mut seen = FxHashSet::default();
		let mut queue = vec![pkg.to_string()];
		let mut out = Vec::new();
		while let Some(current) = queue.pop() {
			let Some(dependents) = reverse.get(&current) else {
				continue;
			};
			for dependent in dependents {
				if seen.insert(dependent.clone()) {
					out.push(dependent.clone());
					queue.push(dependent.clone());
				}
			}
		}
		out
	}

	/// The snapshot to serve for a file, rebuilding first when the live
	/// document is newer than the snapshot.
	pub fn ensure_file_current(self: &Arc<Self>, path: &str) -> Option<Arc<PkgSnapshot>> {
		let pkg = self.pkg_of_file(path)?;
		let entry = self.entry(&pkg)?;
		let dirty = self.docs.needs_reparse(path)
			|| entry.state() != PkgState::SemaReady
			|| entry.is_stale();
		if dirty {
			match self.compile_package(&pkg) {
				Ok(snapshot) => return Some(snapshot),
				Err(e) => {
					tracing::warn!(pkg = %pkg, error = %e, "rebuild failed; serving previous snapshot");
					return entry.snapshot();
				}
			}
		}
		entry.snapshot()
	}

	pub fn file_ast(self: &Arc<Self>, path: &str) -> Option<Arc<FileAst>> {
		let snapshot = self.ensure_file_current(path)?;
		snapshot.file(path).cloned()
	}

	/// Watched-file delete: drop the file everywhere and mark its package
	/// changed.
	pub fn remove_file(&self, path: &str) {
		let pkg = self.file_pkg.lock().remove(path);
		self.file_imports.lock().remove(path);
		self.docs.delete(path);
		if let Some(index) = &self.index {
			if let Err(e) = index.update(|tx| tx.delete_file(path)) {
				tracing::error!(path = %path, error = %e, "index file delete failed");
			}
		}
		let Some(pkg) = pkg else { return };
		if let Some(entry) = self.entry(&pkg) {
			entry.files.lock().remove(path);
			*entry.state.lock() = PkgState::Changed;
		}
		for dependent in self.dependents_of(&pkg) {
			if let Some(entry) = self.entry(&dependent) {
				entry.stale.store(true, Ordering::SeqCst);
			}
		}
	}

	pub fn index(&self) -> Option<&IndexDatabase> {
		self.index.as_ref()
	}

	pub fn docs(&self) -> &Arc<DocCache> {
		&self.docs
	}
}

/// Stable task id for the compile DAG.
fn task_id(pkg: &str) -> u64 {
	cjls_frontend::symbol_id_of(pkg)
}

/// First `package a.b.c` spec in the file, if any.
fn declared_package(contents: &str) -> Option<String> {
	for line in contents.lines() {
		let line = line.trim();
		if line.is_empty() || line.starts_with("//") {
			continue;
		}
		if let Some(rest) = line.strip_prefix("package ") {
			let name: String = rest
				.chars()
				.take_while(|c| c.is_alphanumeric() || *c == '.' || *c == '_')
				.collect();
			return (!name.is_empty()).then_some(name);
		}
		if !line.starts_with("macro package") {
			break;
		}
	}
	None
}

/// `module.sub.dir` from the file's location under the module root.
fn derive_package(module: &str, module_root: &str, path: &str) -> String {
	let root = format!("{}/", module_root.trim_end_matches('/'));
	let rel = path.strip_prefix(&root).unwrap_or(path);
	let mut parts: Vec<&str> = rel.split('/').collect();
	parts.pop(); // file name
	if parts.first() == Some(&"src") {
		parts.remove(0);
	}
	if parts.is_empty() {
		module.to_string()
	} else {
		format!("{module}.{}", parts.join("."))
	}
}

/// Dotted import paths in a file header (textual scan, pre-parse).
fn scan_imports(contents: &str) -> Vec<String> {
	let mut imports = Vec::new();
	for line in contents.lines() {
		let line = line.trim();
		if let Some(rest) = line.strip_prefix("import ") {
			let path: String = rest
				.chars()
				.take_while(|c| c.is_alphanumeric() || *c == '.' || *c == '_' || *c == '*')
				.collect();
			if !path.is_empty() {
				imports.push(path);
			}
		}
	}
	imports
}

/// Import paths from a parsed file.
fn imports_of_ast(ast: &cjls_frontend::Ast) -> Vec<String> {
	let mut out = Vec::new();
	if let NodeKind::File { imports, .. } = &ast.node(ast.root).kind {
		for &import in imports {
			if let NodeKind::Import { path, .. } = &ast.node(import).kind {
				out.push(path.join("."));
			}
		}
	}
	out
}

/// Maps `import a.b.K` to the longest known package prefix (`a.b`).
fn resolve_import_package(
	entries: &FxHashMap<String, Arc<PackageEntry>>,
	import: &str,
) -> Option<String> {
	let mut segments: Vec<&str> = import.split('.').collect();
	while !segments.is_empty() {
		let candidate = segments.join(".");
		if entries.contains_key(&candidate) {
			return Some(candidate);
		}
		segments.pop();
	}
	None
}

/// Package digest: hash over sorted (path, content) pairs.
fn digest_of(sources: &[(String, String)]) -> String {
	let mut hasher = Sha256::new();
	for (path, contents) in sources {
		hasher.update(path.as_bytes());
		hasher.update([0u8]);
		hasher.update(contents.as_bytes());
		hasher.update([0xFFu8]);
	}
	hex(&hasher.finalize())
}

fn content_digest(contents: &str) -> String {
	hex(&Sha256::digest(contents.as_bytes()))
}

fn hex(bytes: &[u8]) -> String {
	bytes.iter().map(|b| format!("{b:02x}")).collect()
}
