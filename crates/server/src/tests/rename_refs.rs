//! Cross-package rename and reference scenarios.

use serde_json::json;

use super::{TestClient, fixture};

const K_DECL: &str = "package p1\npublic class K {\n}\n";
const K_USE: &str = "package p2\nimport p1.K\nvar k = K()\n";

#[test]
fn prepare_rename_returns_the_identifier_range() {
	let (dir, paths) = fixture(&[("src/p1/k.cj", K_DECL), ("src/p2/use.cj", K_USE)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request(
		"textDocument/prepareRename",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 1, "character": 13}
		}),
	);
	let result = &response["result"];
	assert_eq!(result["placeholder"], "K", "{response}");
	assert_eq!(result["range"]["start"]["line"], 1);
	assert_eq!(result["range"]["start"]["character"], 13);
	assert_eq!(result["range"]["end"]["character"], 14);
}

#[test]
fn prepare_rename_rejects_keywords_and_whitespace() {
	let (dir, paths) = fixture(&[("src/p1/k.cj", K_DECL)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	// On the `class` keyword.
	let response = client.request(
		"textDocument/prepareRename",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 1, "character": 8}
		}),
	);
	assert_eq!(response["result"], serde_json::Value::Null);
}

#[test]
fn rename_edits_declaration_and_cross_package_uses() {
	let (dir, paths) = fixture(&[("src/p1/k.cj", K_DECL), ("src/p2/use.cj", K_USE)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request(
		"textDocument/rename",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 1, "character": 13},
			"newName": "K2"
		}),
	);
	let changes = response["result"]["changes"]
		.as_object()
		.unwrap_or_else(|| panic!("no changes in {response}"));
	let decl_edits = changes[&format!("file://{}", paths[0])]
		.as_array()
		.expect("declaration edits");
	assert_eq!(decl_edits.len(), 1);
	assert_eq!(decl_edits[0]["newText"], "K2");
	assert_eq!(decl_edits[0]["range"]["start"]["line"], 1);
	assert_eq!(decl_edits[0]["range"]["start"]["character"], 13);

	let use_edits = changes[&format!("file://{}", paths[1])]
		.as_array()
		.expect("use-site edits");
	// Import item and constructor call.
	assert_eq!(use_edits.len(), 2, "{use_edits:?}");
	assert!(use_edits.iter().all(|e| e["newText"] == "K2"));
}

#[test]
fn rename_rejects_invalid_identifiers() {
	let (dir, paths) = fixture(&[("src/p1/k.cj", K_DECL)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request(
		"textDocument/rename",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 1, "character": 13},
			"newName": "not valid"
		}),
	);
	assert_eq!(response["error"]["code"], -32602);
}

#[test]
fn references_join_live_ast_with_index_rows() {
	let (dir, paths) = fixture(&[("src/p1/k.cj", K_DECL), ("src/p2/use.cj", K_USE)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request(
		"textDocument/references",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 1, "character": 13},
			"context": {"includeDeclaration": false}
		}),
	);
	let locations = response["result"].as_array().expect("locations");
	// Both p2 sites, none from the declaring file.
	assert_eq!(locations.len(), 2, "{response}");
	assert!(
		locations
			.iter()
			.all(|l| l["uri"] == format!("file://{}", paths[1]))
	);
}
