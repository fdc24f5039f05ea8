//! The message pump and the outgoing half of the transport.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cjls_protocol::{
	AnyNotification, AnyRequest, AnyResponse, Message, RequestId, ResponseError, ValueOrError,
};
use parking_lot::Mutex;
use serde_json::Value;

use crate::framing;

/// How a serve loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
	/// `exit` arrived after `shutdown`.
	NormalExit,
	/// The stream ended (or `exit` arrived) without a prior `shutdown`.
	AbnormalExit,
	/// Read error or malformed frame.
	IoError,
}

/// Handler verdict for one incoming message.
pub enum LoopAction {
	Continue,
	Exit(ExitStatus),
}

/// Receives parsed messages from the serve loop. Responses to
/// server-initiated calls are routed before the handler sees anything.
pub trait MessageHandler {
	fn on_request(&self, request: AnyRequest) -> LoopAction;
	fn on_notification(&self, notification: AnyNotification) -> LoopAction;
}

type ReplyCallback = Box<dyn FnOnce(AnyResponse) + Send>;

/// Cloneable outgoing half: replies, notifications, and server-initiated
/// calls. All frames serialize through one writer mutex.
#[derive(Clone)]
pub struct Outgoing {
	writer: Arc<Mutex<Box<dyn Write + Send>>>,
	pending: Arc<Mutex<HashMap<RequestId, ReplyCallback>>>,
	next_id: Arc<AtomicU64>,
}

impl Outgoing {
	fn send(&self, message: &Message) {
		let payload = serde_json::to_vec(&message.to_value()).unwrap_or_default();
		let mut writer = self.writer.lock();
		if let Err(e) = framing::write_frame(writer.as_mut(), &payload) {
			tracing::error!(error = %e, "failed to write outgoing frame");
		}
	}

	/// Replies to a client request.
	pub fn reply(&self, id: RequestId, result: ValueOrError) {
		let response = match result {
			Ok(value) => AnyResponse {
				id,
				result: Some(value),
				error: None,
			},
			Err(error) => AnyResponse {
				id,
				result: None,
				error: Some(error),
			},
		};
		self.send(&Message::Response(response));
	}

	/// Sends a notification to the client.
	pub fn notify(&self, method: &str, params: Value) {
		self.send(&Message::Notification(AnyNotification {
			method: method.to_string(),
			params,
		}));
	}

	/// Sends a server-to-client request. `on_reply` runs on the reader thread
	/// when the client answers.
	pub fn call(
		&self,
		method: &str,
		params: Value,
		on_reply: impl FnOnce(AnyResponse) + Send + 'static,
	) {
		let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
		let id = RequestId::String(format!("cjls:{seq}"));
		self.pending.lock().insert(id.clone(), Box::new(on_reply));
		self.send(&Message::Request(AnyRequest {
			id,
			method: method.to_string(),
			params,
		}));
	}

	/// Routes a client response to the matching `call` callback.
	pub fn route_response(&self, response: AnyResponse) {
		let callback = self.pending.lock().remove(&response.id);
		match callback {
			Some(callback) => callback(response),
			None => {
				tracing::warn!(id = %response.id, "response for unknown request id dropped")
			}
		}
	}
}

/// Duplex transport: a single-threaded framed reader plus an [`Outgoing`]
/// handle shareable across worker threads.
pub struct Transport {
	reader: Box<dyn BufRead + Send>,
	outgoing: Outgoing,
}

impl Transport {
	pub fn new(reader: Box<dyn BufRead + Send>, writer: Box<dyn Write + Send>) -> Self {
		Self {
			reader,
			outgoing: Outgoing {
				writer: Arc::new(Mutex::new(writer)),
				pending: Arc::new(Mutex::new(HashMap::new())),
				next_id: Arc::new(AtomicU64::new(1)),
			},
		}
	}

	pub fn outgoing(&self) -> Outgoing {
		self.outgoing.clone()
	}

	/// Runs the read loop until the handler asks to exit or the stream dies.
	///
	/// Responses to server-initiated calls are routed internally before the
	/// handler sees them.
	pub fn serve(&mut self, handler: &dyn MessageHandler) -> ExitStatus {
		loop {
			let payload = match framing::read_frame(&mut self.reader) {
				Ok(Some(payload)) => payload,
				Ok(None) => {
					tracing::warn!("client closed the stream without exit");
					return ExitStatus::IoError;
				}
				Err(e) => {
					tracing::error!(error = %e, "transport read failed");
					return ExitStatus::IoError;
				}
			};
			let value: Value = match serde_json::from_slice(&payload) {
				Ok(value) => value,
				Err(e) => {
					tracing::error!(error = %e, "undecodable frame payload");
					return ExitStatus::IoError;
				}
			};
			let message = match Message::from_value(value) {
				Ok(message) => message,
				Err(e) => {
					tracing::error!(error = %e, "frame is not a JSON-RPC message");
					return ExitStatus::IoError;
				}
			};
			let action = match message {
				Message::Request(request) => handler.on_request(request),
				Message::Notification(notification) => handler.on_notification(notification),
				Message::Response(response) => {
					self.outgoing.route_response(response);
					LoopAction::Continue
				}
			};
			if let LoopAction::Exit(status) = action {
				return status;
			}
		}
	}
}

/// Convenience for handlers replying with an internal error.
pub fn internal_error(message: impl Into<String>) -> ResponseError {
	ResponseError::new(cjls_protocol::ErrorCode::InternalError, message)
}

#[cfg(test)]
mod tests {
	use std::io::BufReader;

	use super::*;

	struct CountingHandler {
		seen: Arc<Mutex<Vec<String>>>,
	}

	impl MessageHandler for CountingHandler {
		fn on_request(&self, request: AnyRequest) -> LoopAction {
			self.seen.lock().push(request.method);
			LoopAction::Continue
		}

		fn on_notification(&self, notification: AnyNotification) -> LoopAction {
			let exit = notification.method == "exit";
			self.seen.lock().push(notification.method);
			if exit {
				LoopAction::Exit(ExitStatus::NormalExit)
			} else {
				LoopAction::Continue
			}
		}
	}

	fn frame(json: &str) -> Vec<u8> {
		let mut out = Vec::new();
		framing::write_frame(&mut out, json.as_bytes()).unwrap();
		out
	}

	#[test]
	fn serve_dispatches_and_exits_on_handler_verdict() {
		let mut wire = frame(r#"{"id":1,"method":"initialize","params":{}}"#);
		wire.extend(frame(r#"{"method":"exit"}"#));
		let mut transport = Transport::new(
			Box::new(BufReader::new(std::io::Cursor::new(wire))),
			Box::new(Vec::new()),
		);
		let seen = Arc::new(Mutex::new(Vec::new()));
		let handler = CountingHandler { seen: seen.clone() };
		let status = transport.serve(&handler);
		assert_eq!(status, ExitStatus::NormalExit);
		assert_eq!(*seen.lock(), vec!["initialize".to_string(), "exit".to_string()]);
	}

	#[test]
	fn eof_without_exit_is_io_error() {
		let mut transport = Transport::new(
			Box::new(BufReader::new(std::io::Cursor::new(Vec::new()))),
			Box::new(Vec::new()),
		);
		let handler = CountingHandler {
			seen: Arc::new(Mutex::new(Vec::new())),
		};
		assert_eq!(transport.serve(&handler), ExitStatus::IoError);
	}

	#[test]
	fn call_reply_is_routed_to_the_callback() {
		let outgoing = Transport::new(
			Box::new(BufReader::new(std::io::Cursor::new(Vec::new()))),
			Box::new(Vec::new()),
		)
		.outgoing();
		let got = Arc::new(Mutex::new(None));
		let got2 = got.clone();
		outgoing.call("workspace/applyEdit", Value::Null, move |resp| {
			*got2.lock() = Some(resp.id);
		});
		outgoing.route_response(AnyResponse {
			id: RequestId::String("cjls:1".into()),
			result: Some(Value::Null),
			error: None,
		});
		assert_eq!(*got.lock(), Some(RequestId::String("cjls:1".into())));
	}
}
