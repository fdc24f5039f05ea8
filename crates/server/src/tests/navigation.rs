//! Open -> navigate scenarios: definition, references, hover, symbols,
//! highlights.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use super::{TestClient, fixture};

fn doc_pos(path: &str, line: u32, character: u32) -> Value {
	json!({
		"textDocument": {"uri": format!("file://{path}")},
		"position": {"line": line, "character": character}
	})
}

#[test]
fn definition_resolves_across_files_of_a_package() {
	let (dir, paths) = fixture(&[
		("src/a.cj", "package p\nfunc f() {\n    g()\n}\n"),
		("src/g.cj", "package p\nfunc g() {}\n"),
	]);
	let client = TestClient::new();
	client.initialize(dir.path());
	client.open(&paths[0], 1, "package p\nfunc f() {\n    g()\n}\n");

	// Definition at the `g` call site.
	let response = client.request("textDocument/definition", doc_pos(&paths[0], 2, 4));
	let location = &response["result"];
	assert_eq!(
		location["uri"],
		format!("file://{}", paths[1]),
		"{response}"
	);
	// `func g` declares `g` at line 1, columns 5..6.
	assert_eq!(location["range"]["start"]["line"], 1);
	assert_eq!(location["range"]["start"]["character"], 5);
	assert_eq!(location["range"]["end"]["character"], 6);
}

#[test]
fn definition_on_whitespace_is_null() {
	let (dir, paths) = fixture(&[(
		"src/a.cj",
		"package p\nfunc g() {}\n\nfunc f() {\n    g()\n}\n",
	)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request("textDocument/definition", doc_pos(&paths[0], 2, 0));
	assert_eq!(response["result"], Value::Null);
}

#[test]
fn references_cover_declaration_and_uses() {
	let (dir, paths) = fixture(&[(
		"src/a.cj",
		"package p\nfunc g() {}\nfunc f() {\n    g()\n    g()\n}\n",
	)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let mut params = doc_pos(&paths[0], 1, 5);
	params["context"] = json!({"includeDeclaration": true});
	let response = client.request("textDocument/references", params);
	let locations = response["result"].as_array().expect("array of locations");
	assert_eq!(locations.len(), 3, "{response}");

	let mut params = doc_pos(&paths[0], 1, 5);
	params["context"] = json!({"includeDeclaration": false});
	let response = client.request("textDocument/references", params);
	assert_eq!(response["result"].as_array().unwrap().len(), 2);
}

#[test]
fn hover_renders_the_signature() {
	let (dir, paths) = fixture(&[(
		"src/a.cj",
		"package p\n/// Doubles a value.\npublic func twice(x: Int64): Int64 {\n    return x + x\n}\nfunc f() {\n    twice(2)\n}\n",
	)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request("textDocument/hover", doc_pos(&paths[0], 6, 5));
	let value = response["result"]["contents"]["value"]
		.as_str()
		.expect("markdown hover");
	assert!(value.contains("func twice(x: Int64): Int64"), "{value}");
	assert!(value.contains("Doubles a value."), "{value}");
}

#[test]
fn document_symbols_nest_members() {
	let (dir, paths) = fixture(&[(
		"src/a.cj",
		"package p\nclass K {\n    var count: Int64 = 0\n    public func get(): Int64 {\n        return count\n    }\n}\nfunc top() {}\n",
	)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request(
		"textDocument/documentSymbol",
		json!({"textDocument": {"uri": format!("file://{}", paths[0])}}),
	);
	let symbols = response["result"].as_array().expect("symbols");
	let names: Vec<&str> = symbols
		.iter()
		.filter_map(|s| s["name"].as_str())
		.collect();
	assert_eq!(names, vec!["K", "top"]);
	let children = symbols[0]["children"].as_array().expect("members");
	let member_names: Vec<&str> = children
		.iter()
		.filter_map(|s| s["name"].as_str())
		.collect();
	assert_eq!(member_names, vec!["count", "get"]);
}

#[test]
fn document_highlight_marks_reads_and_writes() {
	let (dir, paths) = fixture(&[(
		"src/a.cj",
		"package p\nfunc f() {\n    var x = 1\n    x = 2\n    return x\n}\n",
	)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request("textDocument/documentHighlight", doc_pos(&paths[0], 4, 11));
	let highlights = response["result"].as_array().expect("highlights");
	assert_eq!(highlights.len(), 3, "{response}");
	// Declaration and assignment are writes (kind 3), the return is a read
	// (kind 2).
	let kinds: Vec<i64> = highlights
		.iter()
		.filter_map(|h| h["kind"].as_i64())
		.collect();
	assert_eq!(kinds.iter().filter(|&&k| k == 3).count(), 2);
	assert_eq!(kinds.iter().filter(|&&k| k == 2).count(), 1);
}

#[test]
fn workspace_symbol_finds_indexed_declarations() {
	let (dir, _) = fixture(&[
		("src/p1/a.cj", "package p1\npublic func parseFile() {}\n"),
		("src/p2/b.cj", "package p2\npublic func parseAll() {}\n"),
	]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request("workspace/symbol", json!({"query": "parse"}));
	let names: Vec<&str> = response["result"]
		.as_array()
		.expect("symbol informations")
		.iter()
		.filter_map(|s| s["name"].as_str())
		.collect();
	assert!(names.contains(&"parseFile"), "{names:?}");
	assert!(names.contains(&"parseAll"), "{names:?}");
}
