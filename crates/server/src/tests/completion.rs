//! Incremental edit + completion scenarios.

use serde_json::json;

use super::{TestClient, fixture};

const BASE: &str = "package p\nclass Foo {\n    public func bar() {}\n    public func baz() {}\n    public static func stat() {}\n}\npublic func top() {}\nfunc f() {\n    let foo = Foo()\n\n}\n";

#[test]
fn member_completion_after_dot_is_member_only() {
	let (dir, paths) = fixture(&[("src/a.cj", BASE)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	client.open(&paths[0], 1, BASE);

	// Two incremental patches append "foo." on the blank line inside f.
	client.notify(
		"textDocument/didChange",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0]), "version": 2},
			"contentChanges": [{
				"range": {"start": {"line": 9, "character": 0}, "end": {"line": 9, "character": 0}},
				"text": "    foo"
			}]
		}),
	);
	client.notify(
		"textDocument/didChange",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0]), "version": 3},
			"contentChanges": [{
				"range": {"start": {"line": 9, "character": 7}, "end": {"line": 9, "character": 7}},
				"text": "."
			}]
		}),
	);

	let response = client.request(
		"textDocument/completion",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 9, "character": 8}
		}),
	);
	let items = response["result"].as_array().expect("completion items");
	assert!(!items.is_empty(), "{response}");
	let labels: Vec<&str> = items.iter().filter_map(|i| i["label"].as_str()).collect();
	assert!(labels.contains(&"bar"), "{labels:?}");
	assert!(labels.contains(&"baz"), "{labels:?}");
	// Member-only: no top-level symbols, no keywords.
	assert!(!labels.contains(&"top"), "{labels:?}");
	assert!(!labels.contains(&"func"), "{labels:?}");
}

#[test]
fn completion_items_sort_by_their_six_digit_key() {
	let (dir, paths) = fixture(&[(
		"src/a.cj",
		"package p\npublic func parse() {}\npublic func parseAll() {}\nfunc f() {\n\n}\n",
	)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	client.open(
		&paths[0],
		1,
		"package p\npublic func parse() {}\npublic func parseAll() {}\nfunc f() {\n    pars\n}\n",
	);
	let response = client.request(
		"textDocument/completion",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 4, "character": 8}
		}),
	);
	let items = response["result"].as_array().expect("items");
	let keys: Vec<&str> = items
		.iter()
		.filter_map(|i| i["sortText"].as_str())
		.collect();
	// Ascending keys, zero-padded to at least six digits.
	let mut sorted = keys.clone();
	sorted.sort();
	assert_eq!(keys, sorted);
	assert!(keys.iter().all(|k| k.len() >= 6), "{keys:?}");

	// The two prefix matches outrank everything else.
	let labels: Vec<&str> = items.iter().filter_map(|i| i["label"].as_str()).collect();
	assert!(labels.len() >= 2);
	assert!(
		labels[..2].contains(&"parse") && labels[..2].contains(&"parseAll"),
		"{labels:?}"
	);
}

#[test]
fn callable_candidates_insert_with_parens() {
	let (dir, paths) = fixture(&[(
		"src/a.cj",
		"package p\npublic func run() {}\nfunc f() {\n    ru\n}\n",
	)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	client.open(
		&paths[0],
		1,
		"package p\npublic func run() {}\nfunc f() {\n    ru\n}\n",
	);
	let response = client.request(
		"textDocument/completion",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 3, "character": 6}
		}),
	);
	let items = response["result"].as_array().expect("items");
	let run = items
		.iter()
		.find(|i| i["label"] == "run")
		.expect("run candidate");
	assert_eq!(run["insertText"], "run()");
}

#[test]
fn track_completion_records_telemetry() {
	let (dir, paths) = fixture(&[("src/a.cj", "package p\n")]);
	let client = TestClient::new();
	client.initialize(dir.path());
	client.notify(
		"textDocument/trackCompletion",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"label": "bar",
			"isAccepted": true
		}),
	);
	let telemetry = client.server().completion_telemetry.lock().clone();
	assert_eq!(telemetry, vec![("bar".to_string(), true)]);
}

#[test]
fn signature_help_reports_the_active_parameter() {
	let src = "package p\npublic func add(a: Int64, b: Int64): Int64 {\n    return a + b\n}\nfunc f() {\n    add(1, 2)\n}\n";
	let (dir, paths) = fixture(&[("src/a.cj", src)]);
	let client = TestClient::new();
	client.initialize(dir.path());
	// Cursor after the comma -> second parameter active.
	let response = client.request(
		"textDocument/signatureHelp",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[0])},
			"position": {"line": 5, "character": 11}
		}),
	);
	let help = &response["result"];
	assert_eq!(help["activeParameter"], 1, "{response}");
	let label = help["signatures"][0]["label"].as_str().unwrap();
	assert!(label.contains("add(a: Int64, b: Int64)"), "{label}");
	assert_eq!(
		help["signatures"][0]["parameters"]
			.as_array()
			.unwrap()
			.len(),
		2
	);
}

#[test]
fn completion_tip_points_at_missing_imports() {
	let (dir, paths) = fixture(&[
		("src/lib/map.cj", "package lib\npublic class HashMap {}\n"),
		("src/app/main.cj", "package app\nfunc f() {\n\n}\n"),
	]);
	let client = TestClient::new();
	client.initialize(dir.path());
	client.open(
		&paths[1],
		1,
		"package app\nfunc f() {\n    HashMap\n}\n",
	);
	let _ = client.request(
		"textDocument/completion",
		json!({
			"textDocument": {"uri": format!("file://{}", paths[1])},
			"position": {"line": 2, "character": 11}
		}),
	);
	let tip = client.wait_notification("textDocument/publishCompletionTip", |params| {
		params["label"] == "HashMap"
	});
	let message = tip["params"]["message"].as_str().unwrap();
	assert!(message.contains("import lib.HashMap"), "{message}");
}
