//! File move/rename refactor: rewrite the `package` spec of the moved file
//! to match its new directory.

use std::collections::HashMap;
use std::sync::Arc;

use cjls_frontend::NodeKind;
use cjls_protocol::{FileRefactorParams, FileRefactorResult};
use lsp_types::{TextEdit, WorkspaceEdit};

use crate::convert::{to_lsp_range, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn file_refactor(server: &Arc<LanguageServer>, params: FileRefactorParams, reply: Reply) {
	let (Some(old_path), Some(new_path)) =
		(uri_path(&params.old_uri), uri_path(&params.new_uri))
	else {
		reply.null();
		return;
	};
	let new_uri = params.new_uri.clone();
	server.run_with_ast("FileRefactor", &old_path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let file = &inputs.file;
		// The package name implied by the new location (its directory name
		// chain relative to the old package's root segment).
		let Some(new_pkg) = package_for_moved_file(&file.package, &new_path) else {
			reply.ok(FileRefactorResult {
				edit: WorkspaceEdit::default(),
			});
			return;
		};
		if new_pkg == file.package {
			reply.ok(FileRefactorResult {
				edit: WorkspaceEdit::default(),
			});
			return;
		}
		let mut edits = Vec::new();
		file.ast.walk(file.ast.root, &mut |id| {
			if let NodeKind::PackageSpec { .. } = &file.ast.node(id).kind {
				edits.push(TextEdit {
					range: to_lsp_range(file.ast.node(id).span),
					new_text: format!("package {new_pkg}"),
				});
			}
		});
		let mut changes = HashMap::new();
		// The edit targets the file at its new location.
		changes.insert(new_uri.clone(), edits);
		reply.ok(FileRefactorResult {
			edit: WorkspaceEdit {
				changes: Some(changes),
				..WorkspaceEdit::default()
			},
		});
	});
}

/// `p1` moved into `.../p2/file.cj` becomes `p2`; nested dirs dot-join. The
/// module prefix (everything before the last segment of the old package) is
/// preserved.
fn package_for_moved_file(old_pkg: &str, new_path: &str) -> Option<String> {
	let dir = std::path::Path::new(new_path).parent()?;
	let leaf = dir.file_name()?.to_string_lossy().to_string();
	if leaf == "src" {
		// Root package: module name only.
		return old_pkg.split('.').next().map(str::to_string);
	}
	match old_pkg.rsplit_once('.') {
		Some((prefix, _)) => Some(format!("{prefix}.{leaf}")),
		None => Some(leaf),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn moved_file_takes_its_directory_package() {
		assert_eq!(
			package_for_moved_file("m.p1", "/w/src/p2/a.cj").as_deref(),
			Some("m.p2")
		);
		assert_eq!(
			package_for_moved_file("m.p1", "/w/src/a.cj").as_deref(),
			Some("m")
		);
		assert_eq!(
			package_for_moved_file("p1", "/w/src/p2/a.cj").as_deref(),
			Some("p2")
		);
	}
}
