//! Watched-file change scenarios.

use serde_json::json;

use super::{TestClient, fixture};

#[test]
fn deleting_a_watched_file_drops_it_from_index_and_snapshot() {
	let (dir, paths) = fixture(&[
		("src/p/a.cj", "package p\npublic func keep() {}\n"),
		("src/p/b.cj", "package p\npublic func gone() {}\n"),
	]);
	let client = TestClient::new();
	client.initialize(dir.path());

	let index = client.server().index().unwrap().clone();
	assert!(index.file_exists(&paths[1]).unwrap());
	let gone_id = cjls_frontend::symbol_id_of("p.gone");
	assert!(index.symbol_by_id(gone_id).unwrap().is_some());

	std::fs::remove_file(&paths[1]).unwrap();
	client.notify(
		"workspace/didChangeWatchedFiles",
		json!({
			"changes": [{"uri": format!("file://{}", paths[1]), "type": 3}]
		}),
	);
	client.server().wait_for_initial_compile();

	// Index rows for the file are gone in one transaction.
	assert!(!index.file_exists(&paths[1]).unwrap());
	assert!(index.symbol_by_id(gone_id).unwrap().is_none());

	// documentSymbol on the sibling serves the recompiled snapshot.
	let response = client.request(
		"textDocument/documentSymbol",
		json!({"textDocument": {"uri": format!("file://{}", paths[0])}}),
	);
	let names: Vec<&str> = response["result"]
		.as_array()
		.expect("symbols")
		.iter()
		.filter_map(|s| s["name"].as_str())
		.collect();
	assert_eq!(names, vec!["keep"]);
	let project = client.server().project().unwrap();
	let snapshot = project.entry("p").unwrap().snapshot().unwrap();
	assert!(snapshot.file(&paths[1]).is_none());
}

#[test]
fn created_watched_file_joins_its_package() {
	let (dir, _paths) = fixture(&[("src/p/a.cj", "package p\npublic func keep() {}\n")]);
	let client = TestClient::new();
	client.initialize(dir.path());

	let new_path = dir
		.path()
		.join("src/p/new.cj")
		.to_str()
		.unwrap()
		.replace('\\', "/");
	std::fs::write(&new_path, "package p\npublic func fresh() {}\n").unwrap();
	client.notify(
		"workspace/didChangeWatchedFiles",
		json!({
			"changes": [{"uri": format!("file://{new_path}"), "type": 1}]
		}),
	);
	client.server().wait_for_initial_compile();

	let project = client.server().project().unwrap();
	assert_eq!(project.pkg_of_file(&new_path).as_deref(), Some("p"));
	let index = client.server().index().unwrap();
	let fresh = cjls_frontend::symbol_id_of("p.fresh");
	assert!(index.symbol_by_id(fresh).unwrap().is_some());
}

#[test]
fn deleted_file_diagnostics_are_cleared() {
	let (dir, paths) = fixture(&[
		("src/p/a.cj", "package p\npublic func keep() {}\n"),
		("src/p/b.cj", "package p\nfunc broken() {\n    missing()\n}\n"),
	]);
	let client = TestClient::new();
	client.initialize(dir.path());
	client.open(&paths[1], 1, "package p\nfunc broken() {\n    missing()\n}\n");
	client.wait_notification("textDocument/publishDiagnostics", |params| {
		params["uri"] == format!("file://{}", paths[1])
			&& !params["diagnostics"].as_array().unwrap_or(&vec![]).is_empty()
	});

	std::fs::remove_file(&paths[1]).unwrap();
	client.notify(
		"workspace/didChangeWatchedFiles",
		json!({
			"changes": [{"uri": format!("file://{}", paths[1]), "type": 3}]
		}),
	);
	// The delete clears the file's diagnostics with an empty publish.
	client.wait_notification("textDocument/publishDiagnostics", |params| {
		params["uri"] == format!("file://{}", paths[1])
			&& params["diagnostics"].as_array().is_some_and(Vec::is_empty)
	});
}
