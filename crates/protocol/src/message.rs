//! JSON-RPC 2.0 message envelope.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request id: the protocol allows both numbers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
	Number(i64),
	String(String),
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RequestId::Number(n) => write!(f, "{n}"),
			RequestId::String(s) => write!(f, "{s}"),
		}
	}
}

impl From<i64> for RequestId {
	fn from(n: i64) -> Self {
		RequestId::Number(n)
	}
}

impl From<String> for RequestId {
	fn from(s: String) -> Self {
		RequestId::String(s)
	}
}

/// Error codes surfaced over the wire.
///
/// The JSON-RPC reserved codes plus the LSP extensions the lifecycle state
/// machine hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
	ParseError = -32700,
	InvalidRequest = -32600,
	MethodNotFound = -32601,
	InvalidParams = -32602,
	InternalError = -32603,
	ServerNotInitialized = -32002,
	RequestCancelled = -32800,
	ContentModified = -32801,
}

impl ErrorCode {
	pub fn code(self) -> i32 {
		self as i32
	}
}

/// Wire error attached to a failed response.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ResponseError {
	pub code: i32,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl ResponseError {
	pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			code: code.code(),
			message: message.into(),
			data: None,
		}
	}
}

/// An incoming or outgoing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyRequest {
	pub id: RequestId,
	pub method: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub params: Value,
}

/// An incoming or outgoing notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyNotification {
	pub method: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub params: Value,
}

/// A response to a request. Exactly one of `result`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyResponse {
	pub id: RequestId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ResponseError>,
}

/// A parsed wire message.
#[derive(Debug, Clone)]
pub enum Message {
	Request(AnyRequest),
	Notification(AnyNotification),
	Response(AnyResponse),
}

impl Message {
	/// Classifies a raw JSON object by the id/method/result/error fields.
	pub fn from_value(value: Value) -> Result<Message, serde_json::Error> {
		let obj = value.as_object();
		let has_method = obj.is_some_and(|o| o.contains_key("method"));
		let has_id = obj.is_some_and(|o| o.contains_key("id"));
		if has_method && has_id {
			serde_json::from_value(value).map(Message::Request)
		} else if has_method {
			serde_json::from_value(value).map(Message::Notification)
		} else {
			serde_json::from_value(value).map(Message::Response)
		}
	}

	/// Serializes with the `jsonrpc: "2.0"` marker attached.
	pub fn to_value(&self) -> Value {
		let mut value = match self {
			Message::Request(r) => serde_json::to_value(r),
			Message::Notification(n) => serde_json::to_value(n),
			Message::Response(r) => serde_json::to_value(r),
		}
		.unwrap_or(Value::Null);
		if let Some(obj) = value.as_object_mut() {
			obj.insert("jsonrpc".into(), Value::String("2.0".into()));
		}
		value
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_request_notification_response() {
		let req = Message::from_value(serde_json::json!({"id": 1, "method": "x"})).unwrap();
		assert!(matches!(req, Message::Request(_)));

		let notif = Message::from_value(serde_json::json!({"method": "x"})).unwrap();
		assert!(matches!(notif, Message::Notification(_)));

		let resp = Message::from_value(serde_json::json!({"id": 1, "result": null})).unwrap();
		assert!(matches!(resp, Message::Response(_)));
	}

	#[test]
	fn request_id_accepts_numbers_and_strings() {
		let n: RequestId = serde_json::from_str("3").unwrap();
		assert_eq!(n, RequestId::Number(3));
		let s: RequestId = serde_json::from_str("\"cjls:3\"").unwrap();
		assert_eq!(s, RequestId::String("cjls:3".into()));
	}

	#[test]
	fn serialized_messages_carry_the_jsonrpc_marker() {
		let msg = Message::Notification(AnyNotification {
			method: "initialized".into(),
			params: Value::Null,
		});
		let value = msg.to_value();
		assert_eq!(value["jsonrpc"], "2.0");
	}
}
