//! Type and call hierarchy scenarios.

use serde_json::{Value, json};

use super::{TestClient, fixture};

const SRC: &str = "package p\nopen class Base {\n    public open func m() {}\n}\nclass Derived <: Base {\n    public override func m() {}\n}\npublic func g() {}\npublic func f() {\n    g()\n}\n";

fn doc_pos(path: &str, line: u32, character: u32) -> Value {
	json!({
		"textDocument": {"uri": format!("file://{path}")},
		"position": {"line": line, "character": character}
	})
}

#[test]
fn type_hierarchy_walks_both_directions() {
	let (dir, paths) = fixture(&[("src/t.cj", SRC)]);
	let client = TestClient::new();
	client.initialize(dir.path());

	// Prepare on `Derived`.
	let response = client.request(
		"textDocument/prepareTypeHierarchy",
		doc_pos(&paths[0], 4, 6),
	);
	let item = response["result"][0].clone();
	assert_eq!(item["name"], "Derived", "{response}");

	let supers = client.request("typeHierarchy/supertypes", json!({"item": item}));
	let names: Vec<&str> = supers["result"]
		.as_array()
		.expect("supertypes")
		.iter()
		.filter_map(|i| i["name"].as_str())
		.collect();
	assert_eq!(names, vec!["Base"]);

	// And back down from `Base`.
	let base_item = &supers["result"][0];
	let subs = client.request("typeHierarchy/subtypes", json!({"item": base_item}));
	let names: Vec<&str> = subs["result"]
		.as_array()
		.expect("subtypes")
		.iter()
		.filter_map(|i| i["name"].as_str())
		.collect();
	assert_eq!(names, vec!["Derived"]);
}

#[test]
fn call_hierarchy_reports_incoming_calls_with_ranges() {
	let (dir, paths) = fixture(&[("src/t.cj", SRC)]);
	let client = TestClient::new();
	client.initialize(dir.path());

	// Prepare on `g`'s declaration.
	let response = client.request(
		"textDocument/prepareCallHierarchy",
		doc_pos(&paths[0], 7, 12),
	);
	let item = response["result"][0].clone();
	assert_eq!(item["name"], "g", "{response}");

	let incoming = client.request("callHierarchy/incomingCalls", json!({"item": item}));
	let calls = incoming["result"].as_array().expect("incoming calls");
	assert_eq!(calls.len(), 1, "{incoming}");
	assert_eq!(calls[0]["from"]["name"], "f");
	let ranges = calls[0]["fromRanges"].as_array().unwrap();
	assert_eq!(ranges.len(), 1);
	// `g()` on line 9.
	assert_eq!(ranges[0]["start"]["line"], 9);
}

#[test]
fn prepare_on_a_non_callable_position_is_null() {
	let (dir, paths) = fixture(&[("src/t.cj", SRC)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	// `Base` is a type, not a callable.
	let response = client.request(
		"textDocument/prepareCallHierarchy",
		doc_pos(&paths[0], 1, 11),
	);
	assert_eq!(response["result"], Value::Null);
}

#[test]
fn overrides_surface_in_override_methods_generator() {
	// `Derived` already overrides `m`; a class without the override gets it
	// offered by the generator.
	let src = "package p\nopen class Base {\n    public open func m() {}\n}\nclass Fresh <: Base {\n}\n";
	let (dir, paths) = fixture(&[("src/t.cj", src)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request(
		"codeGenerator/overrideMethods",
		doc_pos(&paths[0], 4, 6),
	);
	let items = response["result"].as_array().expect("override items");
	assert_eq!(items.len(), 1, "{response}");
	assert_eq!(items[0]["name"], "m");
	assert_eq!(items[0]["from"], "Base");
	assert!(
		items[0]["insertText"]
			.as_str()
			.unwrap()
			.starts_with("public override func m("),
	);
}
