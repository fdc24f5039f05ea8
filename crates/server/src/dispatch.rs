//! Message dispatch: lifecycle gating and static method binding.
//!
//! The dispatcher owns two maps (notifications and calls) bound once at
//! construction. Lifecycle gating happens before binding: a request that
//! arrives in the wrong state is answered with the protocol error the state
//! machine prescribes and never reaches its handler.

use std::collections::HashMap;
use std::sync::Arc;

use cjls_protocol::{AnyNotification, AnyRequest, ErrorCode, ResponseError};
use cjls_rpc::{ExitStatus, LoopAction, MessageHandler};
use parking_lot::Mutex;
use serde_json::Value;

use crate::features;
use crate::reply::Reply;
use crate::server::LanguageServer;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
	PreInit,
	InitializeAck,
	Ready,
	ShuttingDown,
}

type CallHandler = Box<dyn Fn(&Arc<LanguageServer>, Value, Reply) + Send + Sync>;
type NotifyHandler = Box<dyn Fn(&Arc<LanguageServer>, Value) + Send + Sync>;

pub struct Dispatcher {
	server: Arc<LanguageServer>,
	calls: HashMap<&'static str, CallHandler>,
	notifications: HashMap<&'static str, NotifyHandler>,
	state: Mutex<Lifecycle>,
}

/// Binds a typed call handler; parameter decode failures answer
/// `invalid_params`.
fn call<P>(f: fn(&Arc<LanguageServer>, P, Reply)) -> CallHandler
where
	P: serde::de::DeserializeOwned + 'static,
{
	Box::new(move |server, params, reply| match serde_json::from_value(params) {
		Ok(params) => f(server, params, reply),
		Err(e) => reply.error(ResponseError::new(ErrorCode::InvalidParams, e.to_string())),
	})
}

/// Binds a typed notification handler; decode failures are logged and
/// dropped.
fn notify<P>(f: fn(&Arc<LanguageServer>, P)) -> NotifyHandler
where
	P: serde::de::DeserializeOwned + 'static,
{
	Box::new(move |server, params| match serde_json::from_value(params) {
		Ok(params) => f(server, params),
		Err(e) => tracing::warn!(error = %e, "notification params failed to decode; dropped"),
	})
}

impl Dispatcher {
	pub fn new(server: Arc<LanguageServer>) -> Dispatcher {
		let mut calls: HashMap<&'static str, CallHandler> = HashMap::new();
		let mut notifications: HashMap<&'static str, NotifyHandler> = HashMap::new();

		calls.insert("textDocument/semanticTokens", call(features::semantic_tokens::full));
		calls.insert("textDocument/semanticTokens/full", call(features::semantic_tokens::full));
		calls.insert("textDocument/documentHighlight", call(features::highlight::document_highlight));
		calls.insert("textDocument/references", call(features::references::references));
		calls.insert("textDocument/definition", call(features::definition::definition));
		calls.insert("textDocument/hover", call(features::hover::hover));
		calls.insert("textDocument/completion", call(features::completion::completion));
		calls.insert("textDocument/signatureHelp", call(features::signature::signature_help));
		calls.insert("textDocument/documentLink", call(features::document_link::document_link));
		calls.insert("textDocument/documentSymbol", call(features::symbols::document_symbol));
		calls.insert("textDocument/prepareRename", call(features::rename::prepare_rename));
		calls.insert("textDocument/rename", call(features::rename::rename));
		calls.insert("textDocument/prepareTypeHierarchy", call(features::hierarchy::prepare_type_hierarchy));
		calls.insert("textDocument/prepareCallHierarchy", call(features::hierarchy::prepare_call_hierarchy));
		calls.insert("typeHierarchy/supertypes", call(features::hierarchy::supertypes));
		calls.insert("typeHierarchy/subtypes", call(features::hierarchy::subtypes));
		calls.insert("callHierarchy/incomingCalls", call(features::hierarchy::incoming_calls));
		calls.insert("callHierarchy/outgoingCalls", call(features::hierarchy::outgoing_calls));
		calls.insert("textDocument/codeAction", call(features::code_actions::code_action));
		calls.insert("textDocument/codeLens", call(features::code_lens::code_lens));
		calls.insert("workspace/symbol", call(features::symbols::workspace_symbol));
		calls.insert("workspace/executeCommand", call(features::code_actions::execute_command));
		calls.insert("textDocument/breakpoints", call(features::breakpoints::breakpoints));
		calls.insert("textDocument/crossLanguageDefinition", call(features::cross_language::definition));
		calls.insert("textDocument/crossLanguageRegister", call(features::cross_language::register));
		calls.insert("textDocument/exportsName", call(features::cross_language::exports_name));
		calls.insert("textDocument/findFileReferences", call(features::references::file_references));
		calls.insert("textDocument/fileRefactor", call(features::file_refactor::file_refactor));
		calls.insert("codeGenerator/overrideMethods", call(features::override_methods::override_methods));
		calls.insert("textDocument/checkHealthy", call(features::cross_language::check_healthy));

		notifications.insert("textDocument/didOpen", notify(|s, p| s.did_open(p)));
		notifications.insert("textDocument/didChange", notify(|s, p| s.did_change(p)));
		notifications.insert("textDocument/didClose", notify(|s, p| s.did_close(p)));
		notifications.insert("textDocument/didSave", notify(|s, p| s.did_save(p)));
		notifications.insert(
			"workspace/didChangeWatchedFiles",
			notify(|s, p| s.did_change_watched_files(p)),
		);
		notifications.insert(
			"textDocument/trackCompletion",
			notify(features::completion::track_completion),
		);
		// Cancellation is advisory: actions check the shutdown flag at
		// natural points, so the notification only needs to be accepted.
		notifications.insert(
			"$/cancelRequest",
			notify(|_server, _params: Value| {
				tracing::trace!("cancel request acknowledged");
			}),
		);

		Dispatcher {
			server,
			calls,
			notifications,
			state: Mutex::new(Lifecycle::PreInit),
		}
	}

	pub fn server(&self) -> &Arc<LanguageServer> {
		&self.server
	}
}

impl MessageHandler for Dispatcher {
	fn on_request(&self, request: AnyRequest) -> LoopAction {
		let reply = Reply::new(self.server.outgoing.clone(), request.id.clone());
		let state = *self.state.lock();
		match (state, request.method.as_str()) {
			(Lifecycle::PreInit, "initialize") => {
				self.server.initialize(request.params, reply);
				*self.state.lock() = Lifecycle::InitializeAck;
			}
			(Lifecycle::PreInit | Lifecycle::InitializeAck, _) => {
				reply.error(ResponseError::new(
					ErrorCode::ServerNotInitialized,
					"server not initialized",
				));
			}
			(Lifecycle::Ready, "shutdown") => {
				self.server.on_shutdown(reply);
				*self.state.lock() = Lifecycle::ShuttingDown;
			}
			(Lifecycle::Ready, "initialize") => {
				reply.error(ResponseError::new(
					ErrorCode::InvalidRequest,
					"already initialized",
				));
			}
			(Lifecycle::Ready, method) => match self.calls.get(method) {
				Some(handler) => handler(&self.server, request.params, reply),
				None => {
					reply.error(ResponseError::new(
						ErrorCode::MethodNotFound,
						format!("unknown method '{method}'"),
					));
				}
			},
			(Lifecycle::ShuttingDown, _) => {
				reply.error(ResponseError::new(
					ErrorCode::InvalidRequest,
					"server already shutdown",
				));
			}
		}
		LoopAction::Continue
	}

	fn on_notification(&self, notification: AnyNotification) -> LoopAction {
		let state = *self.state.lock();
		match (state, notification.method.as_str()) {
			(_, "exit") => {
				let clean = state == Lifecycle::ShuttingDown;
				self.server.shutdown.request();
				return LoopAction::Exit(if clean {
					ExitStatus::NormalExit
				} else {
					ExitStatus::AbnormalExit
				});
			}
			(Lifecycle::InitializeAck, "initialized") => {
				*self.state.lock() = Lifecycle::Ready;
				self.server.initialized();
			}
			(Lifecycle::Ready, method) => match self.notifications.get(method) {
				Some(handler) => handler(&self.server, notification.params),
				None => {
					tracing::warn!(method, "unknown notification ignored");
				}
			},
			(Lifecycle::ShuttingDown, method) if method.starts_with("$/") => {}
			(_, method) => {
				tracing::warn!(method, state = ?state, "notification outside ready state dropped");
			}
		}
		LoopAction::Continue
	}
}
