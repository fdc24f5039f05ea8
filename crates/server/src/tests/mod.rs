//! End-to-end scenario tests: a synthetic client drives the dispatcher and
//! reads real frames off the outgoing transport.

use std::io::{BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use cjls_index::{IndexDatabase, IndexDbOptions};
use cjls_protocol::{AnyNotification, AnyRequest, RequestId};
use cjls_rpc::{LoopAction, MessageHandler, Transport};
use cjls_worker::ShutdownFlag;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::dispatch::Dispatcher;
use crate::server::{LanguageServer, ServerConfig};

mod completion;
mod hierarchy;
mod lifecycle;
mod navigation;
mod rename_refs;
mod watched_files;

/// Everything the server writes lands here, framed.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.0.lock().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())
	}
}

pub(crate) struct TestClient {
	dispatcher: Dispatcher,
	out: SharedBuf,
	next_id: AtomicI64,
	pub shutdown: ShutdownFlag,
}

impl TestClient {
	/// Builds a server over an in-memory index and a capture transport.
	pub fn new() -> TestClient {
		let shutdown = ShutdownFlag::new();
		let index = IndexDatabase::open(
			":memory:",
			IndexDbOptions {
				in_memory: true,
				..Default::default()
			},
			shutdown.clone(),
		)
		.expect("open in-memory index");
		let out = SharedBuf::default();
		let transport = Transport::new(
			Box::new(BufReader::new(std::io::Cursor::new(Vec::new()))),
			Box::new(out.clone()),
		);
		let server = LanguageServer::new(
			transport.outgoing(),
			Some(index),
			shutdown.clone(),
			ServerConfig {
				pool_size: 2,
				incremental: true,
			},
		);
		TestClient {
			dispatcher: Dispatcher::new(server),
			out,
			next_id: AtomicI64::new(1),
			shutdown,
		}
	}

	pub fn server(&self) -> &Arc<LanguageServer> {
		self.dispatcher.server()
	}

	/// Full handshake plus a settled initial compile.
	pub fn initialize(&self, root: &Path) -> Value {
		let result = self.request(
			"initialize",
			json!({"rootUri": format!("file://{}", root.display())}),
		);
		self.notify("initialized", Value::Null);
		self.server().wait_for_initial_compile();
		result
	}

	pub fn notify(&self, method: &str, params: Value) -> LoopAction {
		self.dispatcher.on_notification(AnyNotification {
			method: method.to_string(),
			params,
		})
	}

	pub fn send_request(&self, method: &str, params: Value) -> i64 {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.dispatcher.on_request(AnyRequest {
			id: RequestId::Number(id),
			method: method.to_string(),
			params,
		});
		id
	}

	/// Sends a request and blocks until its response frame appears.
	pub fn request(&self, method: &str, params: Value) -> Value {
		let id = self.send_request(method, params);
		self.wait_response(id)
	}

	pub fn wait_response(&self, id: i64) -> Value {
		let deadline = Instant::now() + Duration::from_secs(10);
		loop {
			for message in self.messages() {
				if message.get("id").and_then(Value::as_i64) == Some(id)
					&& (message.get("result").is_some() || message.get("error").is_some())
				{
					return message;
				}
			}
			if Instant::now() > deadline {
				panic!("no response for request {id}");
			}
			std::thread::sleep(Duration::from_millis(5));
		}
	}

	/// Every decoded message written so far.
	pub fn messages(&self) -> Vec<Value> {
		let bytes = self.out.0.lock().clone();
		parse_frames(&bytes)
	}

	/// Notifications with the given method, oldest first.
	pub fn notifications(&self, method: &str) -> Vec<Value> {
		self.messages()
			.into_iter()
			.filter(|m| m.get("method").and_then(Value::as_str) == Some(method))
			.collect()
	}

	/// Waits until `pred` matches a notification of `method`.
	pub fn wait_notification(
		&self,
		method: &str,
		pred: impl Fn(&Value) -> bool,
	) -> Value {
		let deadline = Instant::now() + Duration::from_secs(10);
		loop {
			if let Some(found) = self
				.notifications(method)
				.into_iter()
				.find(|m| pred(&m["params"]))
			{
				return found;
			}
			if Instant::now() > deadline {
				panic!("no '{method}' notification matched");
			}
			std::thread::sleep(Duration::from_millis(5));
		}
	}

	pub fn open(&self, path: &str, version: i64, text: &str) {
		self.notify(
			"textDocument/didOpen",
			json!({
				"textDocument": {
					"uri": format!("file://{path}"),
					"languageId": "Cangjie",
					"version": version,
					"text": text,
				}
			}),
		);
	}
}

fn parse_frames(mut bytes: &[u8]) -> Vec<Value> {
	let mut out = Vec::new();
	loop {
		let Some(header_end) = find(bytes, b"\r\n\r\n") else {
			return out;
		};
		let header = String::from_utf8_lossy(&bytes[..header_end]);
		let Some(length) = header
			.lines()
			.find_map(|l| l.strip_prefix("Content-Length:"))
			.and_then(|v| v.trim().parse::<usize>().ok())
		else {
			return out;
		};
		let body_start = header_end + 4;
		if bytes.len() < body_start + length {
			return out;
		}
		if let Ok(value) = serde_json::from_slice(&bytes[body_start..body_start + length]) {
			out.push(value);
		}
		bytes = &bytes[body_start + length..];
	}
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack
		.windows(needle.len())
		.position(|window| window == needle)
}

/// Writes a source tree for a scenario; returns the tempdir and absolute
/// paths of the written files.
pub(crate) fn fixture(files: &[(&str, &str)]) -> (tempfile::TempDir, Vec<String>) {
	let dir = tempfile::tempdir().expect("tempdir");
	let mut paths = Vec::new();
	for (rel, text) in files {
		let path = dir.path().join(rel);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, text).unwrap();
		paths.push(path.to_str().unwrap().replace('\\', "/"));
	}
	(dir, paths)
}
