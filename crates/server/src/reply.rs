//! One-shot reply guard.
//!
//! Every call handler receives exactly one [`Reply`]; sending consumes it.
//! Dropping an unsent reply (an action that bailed out early, a cancelled
//! queue entry) answers `null` so the client is never left hanging.

use cjls_protocol::{RequestId, ResponseError, ValueOrError};
use cjls_rpc::Outgoing;
use serde_json::Value;

pub struct Reply {
	inner: Option<(Outgoing, RequestId)>,
}

impl Reply {
	pub fn new(outgoing: Outgoing, id: RequestId) -> Reply {
		Reply {
			inner: Some((outgoing, id)),
		}
	}

	pub fn send(mut self, result: ValueOrError) {
		if let Some((outgoing, id)) = self.inner.take() {
			outgoing.reply(id, result);
		}
	}

	pub fn ok(self, value: impl serde::Serialize) {
		let value = serde_json::to_value(value).unwrap_or(Value::Null);
		self.send(Ok(value));
	}

	pub fn null(self) {
		self.send(Ok(Value::Null));
	}

	pub fn error(self, error: ResponseError) {
		self.send(Err(error));
	}
}

impl Drop for Reply {
	fn drop(&mut self) {
		if let Some((outgoing, id)) = self.inner.take() {
			tracing::debug!(id = %id, "reply dropped without a result; answering null");
			outgoing.reply(id, Ok(Value::Null));
		}
	}
}
