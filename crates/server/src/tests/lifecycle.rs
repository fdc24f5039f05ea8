//! Lifecycle gating: the dispatcher's state machine over the session.

use cjls_rpc::{ExitStatus, LoopAction};
use serde_json::{Value, json};

use super::{TestClient, fixture};

#[test]
fn requests_before_initialize_are_rejected() {
	let client = TestClient::new();
	let response = client.request("textDocument/hover", json!({}));
	assert_eq!(response["error"]["code"], -32002);
}

#[test]
fn unknown_methods_get_method_not_found() {
	let (dir, _) = fixture(&[("src/a.cj", "package a\n")]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let response = client.request("textDocument/nope", json!({}));
	assert_eq!(response["error"]["code"], -32601);
}

#[test]
fn requests_after_shutdown_are_invalid() {
	let (dir, _) = fixture(&[("src/a.cj", "package a\n")]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let shutdown = client.request("shutdown", Value::Null);
	assert!(shutdown.get("error").is_none());
	assert!(client.shutdown.requested());

	// Scenario: any further request answers INVALID_REQUEST.
	let completion = client.request(
		"textDocument/completion",
		json!({
			"textDocument": {"uri": "file:///x.cj"},
			"position": {"line": 0, "character": 0}
		}),
	);
	assert_eq!(completion["error"]["code"], -32600);

	// `exit` after `shutdown` ends the loop cleanly.
	let action = client.notify("exit", Value::Null);
	assert!(matches!(action, LoopAction::Exit(ExitStatus::NormalExit)));
}

#[test]
fn exit_without_shutdown_is_abnormal() {
	let client = TestClient::new();
	let action = client.notify("exit", Value::Null);
	assert!(matches!(action, LoopAction::Exit(ExitStatus::AbnormalExit)));
}

#[test]
fn double_initialize_is_rejected() {
	let (dir, _) = fixture(&[("src/a.cj", "package a\n")]);
	let client = TestClient::new();
	client.initialize(dir.path());
	let again = client.request("initialize", json!({"rootUri": "file:///other"}));
	assert_eq!(again["error"]["code"], -32600);
}

#[test]
fn initialize_advertises_incremental_sync_and_providers() {
	let (dir, _) = fixture(&[("src/a.cj", "package a\n")]);
	let client = TestClient::new();
	let result = client.initialize(dir.path());
	let caps = &result["result"]["capabilities"];
	assert_eq!(caps["textDocumentSync"], 2);
	assert_eq!(caps["definitionProvider"], true);
	assert_eq!(caps["renameProvider"]["prepareProvider"], true);
	assert_eq!(
		caps["completionProvider"]["triggerCharacters"],
		json!([".", "`"])
	);
	assert_eq!(caps["semanticTokensProvider"]["full"]["delta"], true);
}
