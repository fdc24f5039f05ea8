//! Project and package graph.
//!
//! Owns the file↔package map, the package dependency graph, per-package
//! compiled snapshots, source digests, and the staleness bookkeeping that
//! keeps queries honest between an edit and the next recompile. Snapshots
//! are shared immutably once sema-ready; mutation replaces them atomically.

mod graph;
mod options;

pub use graph::{PackageEntry, PkgSnapshot, PkgState, Project};
pub use options::{InitializeOptions, ModuleSpec, RequireSpec};

/// Project-level errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("unknown package '{0}'")]
	UnknownPackage(String),

	#[error("dependency cycle through '{0}'")]
	DependencyCycle(String),

	#[error("package '{0}' has fatal parse errors")]
	FatalParseErrors(String),

	#[error("dependency '{dep}' of '{pkg}' is not sema-ready")]
	DependencyNotReady { pkg: String, dep: String },

	#[error("no readable sources for '{0}'")]
	Io(String),

	#[error("shutting down")]
	ShuttingDown,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use cjls_docs::{DocCache, DocPatch};
	use cjls_index::{IndexDatabase, IndexDbOptions, RefKind};
	use cjls_worker::{DepPool, ShutdownFlag};
	use pretty_assertions::assert_eq;

	use super::*;

	fn write(dir: &std::path::Path, rel: &str, text: &str) -> String {
		let path = dir.join(rel);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, text).unwrap();
		path.to_str().unwrap().replace('\\', "/")
	}

	fn project_in(dir: &std::path::Path, with_index: bool) -> (Arc<Project>, Arc<DocCache>) {
		let docs = Arc::new(DocCache::new());
		let shutdown = ShutdownFlag::new();
		let index = with_index.then(|| {
			IndexDatabase::open(
				":memory:",
				IndexDbOptions {
					in_memory: true,
					..Default::default()
				},
				shutdown.clone(),
			)
			.unwrap()
		});
		let root = dir.to_str().unwrap().to_string();
		let project = Project::new(root.clone(), docs.clone(), index, shutdown);
		project.ingest(&[ModuleSpec {
			name: "m".into(),
			path: root,
			requires: Default::default(),
		}]);
		(project, docs)
	}

	#[test]
	fn files_map_to_their_declared_packages() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "src/p1/a.cj", "package p1\npublic func g() {}\n");
		let b = write(dir.path(), "src/p2/b.cj", "package p2\nimport p1.g\nfunc f() { g() }\n");
		let (project, _) = project_in(dir.path(), false);
		assert_eq!(project.pkg_of_file(&a).as_deref(), Some("p1"));
		assert_eq!(project.pkg_of_file(&b).as_deref(), Some("p2"));
		let p2 = project.entry("p2").unwrap();
		assert!(p2.deps().contains(&"p1".to_string()));
	}

	#[test]
	fn compile_resolves_cross_package_references() {
		let dir = tempfile::tempdir().unwrap();
		write(dir.path(), "src/p1/a.cj", "package p1\npublic func g() {}\n");
		let b = write(dir.path(), "src/p2/b.cj", "package p2\nimport p1.g\nfunc f() { g() }\n");
		let (project, _) = project_in(dir.path(), false);
		let snapshot = project.compile_package("p2").unwrap();
		let file = snapshot.file(&b).unwrap();
		// No undeclared-identifier diagnostics: `g` resolved through p1.
		assert!(
			!file
				.diagnostics
				.iter()
				.any(|d| d.message.contains("undeclared")),
			"{:?}",
			file.diagnostics
		);
	}

	#[test]
	fn initial_compile_respects_dependency_order() {
		let dir = tempfile::tempdir().unwrap();
		write(dir.path(), "src/p1/a.cj", "package p1\npublic class K {}\n");
		write(dir.path(), "src/p2/b.cj", "package p2\nimport p1.K\nvar k = K()\n");
		let (project, _) = project_in(dir.path(), false);
		let pool = DepPool::new(4, ShutdownFlag::new());
		project.schedule_initial_compile(&pool);
		pool.wait_all();
		assert_eq!(project.entry("p1").unwrap().state(), PkgState::SemaReady);
		assert_eq!(project.entry("p2").unwrap().state(), PkgState::SemaReady);
	}

	#[test]
	fn edit_marks_package_changed_and_dependents_stale() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "src/p1/a.cj", "package p1\npublic func g() {}\n");
		write(dir.path(), "src/p2/b.cj", "package p2\nimport p1.g\nfunc f() { g() }\n");
		let (project, docs) = project_in(dir.path(), false);
		project.compile_package("p2").unwrap();
		assert!(!project.entry("p2").unwrap().is_stale());

		docs.open(&a, 1, "package p1\npublic func g() {}\n".into());
		docs.update(
			&a,
			2,
			&[DocPatch {
				range: None,
				text: "package p1\npublic func gg() {}\n".into(),
			}],
		);
		project.update_file_status(&a);
		assert_eq!(project.entry("p1").unwrap().state(), PkgState::Changed);
		assert!(project.entry("p2").unwrap().is_stale());

		// Recompiling the dependent clears the staleness.
		project.compile_package("p2").unwrap();
		assert!(!project.entry("p2").unwrap().is_stale());
		assert_eq!(project.entry("p1").unwrap().state(), PkgState::SemaReady);
	}

	#[test]
	fn live_documents_override_disk() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "src/p1/a.cj", "package p1\npublic func g() {}\n");
		let (project, docs) = project_in(dir.path(), false);
		docs.open(&a, 1, "package p1\npublic func renamed() {}\n".into());
		let snapshot = project.compile_package("p1").unwrap();
		let file = snapshot.file(&a).unwrap();
		let has_renamed = file
			.sema
			.decls
			.values()
			.any(|d| d.name == "renamed");
		assert!(has_renamed);
	}

	#[test]
	fn compile_writes_index_rows_per_package() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "src/p1/a.cj", "package p1\npublic func g() {}\n");
		let (project, docs) = project_in(dir.path(), true);
		project.compile_package("p1").unwrap();
		let index = project.index().unwrap();
		let g = cjls_frontend::symbol_id_of("p1.g");
		assert!(index.symbol_by_id(g).unwrap().is_some());
		assert!(index.file_exists(&a).unwrap());

		// A recompile after an edit replaces the rows; the removed symbol
		// disappears.
		docs.open(&a, 1, "package p1\npublic func h() {}\n".into());
		project.update_file_status(&a);
		project.compile_package("p1").unwrap();
		assert!(index.symbol_by_id(g).unwrap().is_none());
		let h = cjls_frontend::symbol_id_of("p1.h");
		assert!(index.symbol_by_id(h).unwrap().is_some());
		assert!(index.references_of(g, RefKind::ALL).unwrap().is_empty());
	}

	#[test]
	fn removed_file_drops_package_contents() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "src/p1/a.cj", "package p1\npublic func g() {}\n");
		let b = write(dir.path(), "src/p1/b.cj", "package p1\npublic func other() {}\n");
		let (project, _) = project_in(dir.path(), true);
		project.compile_package("p1").unwrap();
		project.remove_file(&b);
		assert_eq!(project.entry("p1").unwrap().state(), PkgState::Changed);
		let snapshot = project.compile_package("p1").unwrap();
		assert!(snapshot.file(&a).is_some());
		assert!(snapshot.file(&b).is_none());
		assert!(!project.index().unwrap().file_exists(&b).unwrap());
	}

	#[test]
	fn fatal_parse_error_marks_the_package_broken() {
		let dir = tempfile::tempdir().unwrap();
		// Unterminated string literal: a fatal parse diagnostic.
		write(dir.path(), "src/p1/a.cj", "package p1\nvar s = \"broken\n");
		let (project, _) = project_in(dir.path(), false);
		let result = project.compile_package("p1");
		assert!(matches!(result, Err(Error::FatalParseErrors(_))), "{result:?}");
		let entry = project.entry("p1").unwrap();
		assert_eq!(entry.state(), PkgState::Broken);
		// No snapshot was ever promoted, but the attempt's diagnostics are
		// kept for publication.
		assert!(entry.snapshot().is_none());
		assert!(entry.file_diagnostics().iter().any(|(_, diags)| {
			diags
				.iter()
				.any(|d| d.code == cjls_frontend::DiagCode::Parse)
		}));
	}

	#[test]
	fn broken_dependency_keeps_dependents_out_of_sema_ready() {
		let dir = tempfile::tempdir().unwrap();
		write(dir.path(), "src/p1/a.cj", "package p1\nvar s = \"broken\n");
		write(dir.path(), "src/p2/b.cj", "package p2\nimport p1.s\nfunc f() {}\n");
		let (project, _) = project_in(dir.path(), false);
		let result = project.compile_package("p2");
		assert!(
			matches!(result, Err(Error::DependencyNotReady { .. })),
			"{result:?}"
		);
		assert_eq!(project.entry("p1").unwrap().state(), PkgState::Broken);
		assert_eq!(project.entry("p2").unwrap().state(), PkgState::Broken);
	}

	#[test]
	fn broken_recompile_retains_the_previous_snapshot() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "src/p1/a.cj", "package p1\npublic func g() {}\n");
		let (project, docs) = project_in(dir.path(), false);
		project.compile_package("p1").unwrap();
		assert_eq!(project.entry("p1").unwrap().state(), PkgState::SemaReady);

		docs.open(&a, 1, "package p1\nvar s = \"broken\n".into());
		project.update_file_status(&a);
		assert!(project.compile_package("p1").is_err());
		let entry = project.entry("p1").unwrap();
		assert_eq!(entry.state(), PkgState::Broken);
		// Queries still see the pre-edit snapshot.
		let snapshot = entry.snapshot().expect("previous snapshot retained");
		assert!(
			snapshot
				.file(&a)
				.unwrap()
				.sema
				.decls
				.values()
				.any(|d| d.name == "g")
		);
		assert!(project.ensure_file_current(&a).is_some());
	}

	#[test]
	fn digest_is_stable_across_identical_compiles() {
		let dir = tempfile::tempdir().unwrap();
		write(dir.path(), "src/p1/a.cj", "package p1\npublic func g() {}\n");
		let (project, _) = project_in(dir.path(), false);
		project.compile_package("p1").unwrap();
		let first = project.entry("p1").unwrap().digest();
		project.update_file_status(
			&project.entry("p1").unwrap().files()[0],
		);
		project.compile_package("p1").unwrap();
		assert_eq!(project.entry("p1").unwrap().digest(), first);
		assert!(!first.is_empty());
	}
}
