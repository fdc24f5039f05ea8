//! Per-file FIFO lanes over a fixed worker set.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ShutdownFlag;

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
	/// Queued jobs per file, in enqueue order.
	lanes: FxHashMap<String, VecDeque<(String, Job)>>,
	/// Files whose lane currently has a job running.
	running: FxHashSet<String>,
	/// Files with queued work, in arrival order.
	runnable: VecDeque<String>,
	stop: bool,
}

struct Inner {
	state: Mutex<State>,
	cv: Condvar,
	shutdown: ShutdownFlag,
}

/// A named pool executing feature actions. Actions for the same file are
/// serialized in enqueue order; actions for different files run in parallel
/// up to the worker count.
pub struct FeaturePool {
	name: &'static str,
	inner: Arc<Inner>,
	workers: Vec<JoinHandle<()>>,
}

impl FeaturePool {
	pub fn new(name: &'static str, threads: usize, shutdown: ShutdownFlag) -> Self {
		let inner = Arc::new(Inner {
			state: Mutex::new(State::default()),
			cv: Condvar::new(),
			shutdown,
		});
		let workers = (0..threads.max(1))
			.map(|i| {
				let inner = inner.clone();
				std::thread::Builder::new()
					.name(format!("cjls-{name}-{i}"))
					.spawn(move || worker_loop(&inner))
					.expect("spawn feature worker")
			})
			.collect();
		Self {
			name,
			inner,
			workers,
		}
	}

	/// Enqueues `job` on the file's lane. `task` names the action for logs.
	pub fn submit(&self, task: &str, file: &str, job: impl FnOnce() + Send + 'static) {
		let mut state = self.inner.state.lock();
		if state.stop || self.inner.shutdown.requested() {
			tracing::debug!(pool = self.name, task, "pool stopped; job dropped");
			return;
		}
		let lane = state.lanes.entry(file.to_string()).or_default();
		lane.push_back((task.to_string(), Box::new(job)));
		let lane_was_idle = lane.len() == 1 && !state.running.contains(file);
		if lane_was_idle {
			state.runnable.push_back(file.to_string());
			drop(state);
			self.inner.cv.notify_one();
		}
	}
}

impl Drop for FeaturePool {
	fn drop(&mut self) {
		{
			let mut state = self.inner.state.lock();
			state.stop = true;
		}
		self.inner.cv.notify_all();
		for worker in self.workers.drain(..) {
			let _ = worker.join();
		}
	}
}

fn worker_loop(inner: &Inner) {
	loop {
		let (file, task, job) = {
			let mut state = inner.state.lock();
			loop {
				// Drain queued work before honoring stop.
				if state.stop && state.runnable.is_empty() {
					return;
				}
				if let Some(file) = state.runnable.pop_front() {
					if state.running.contains(&file) {
						continue;
					}
					let Some(lane) = state.lanes.get_mut(&file) else {
						continue;
					};
					let Some((task, job)) = lane.pop_front() else {
						state.lanes.remove(&file);
						continue;
					};
					state.running.insert(file.clone());
					break (file, task, job);
				}
				inner.cv.wait(&mut state);
			}
		};
		if !inner.shutdown.requested() {
			tracing::trace!(task = %task, file = %file, "feature action start");
			job();
		}
		let mut state = inner.state.lock();
		state.running.remove(&file);
		let has_more = state.lanes.get(&file).is_some_and(|lane| !lane.is_empty());
		if has_more {
			state.runnable.push_back(file.clone());
			inner.cv.notify_one();
		} else {
			state.lanes.remove(&file);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex as StdMutex;
	use std::time::Duration;

	use super::*;

	#[test]
	fn same_file_actions_serialize_in_enqueue_order() {
		let pool = FeaturePool::new("general", 4, ShutdownFlag::new());
		let order = Arc::new(StdMutex::new(Vec::new()));
		for i in 0..16 {
			let order = order.clone();
			pool.submit("t", "/a.cj", move || {
				// A sleep makes interleaving visible if lanes were broken.
				std::thread::sleep(Duration::from_millis(2));
				order.lock().unwrap().push(i);
			});
		}
		drop(pool);
		assert_eq!(*order.lock().unwrap(), (0..16).collect::<Vec<_>>());
	}

	#[test]
	fn different_files_run_in_parallel() {
		let pool = FeaturePool::new("general", 2, ShutdownFlag::new());
		let barrier = Arc::new(std::sync::Barrier::new(2));
		let b1 = barrier.clone();
		let b2 = barrier.clone();
		// Each job blocks until the other reaches the barrier; this only
		// completes if the two files really run concurrently.
		pool.submit("t", "/a.cj", move || {
			b1.wait();
		});
		pool.submit("t", "/b.cj", move || {
			b2.wait();
		});
		drop(pool);
	}

	#[test]
	fn shutdown_drops_queued_jobs() {
		let shutdown = ShutdownFlag::new();
		let pool = FeaturePool::new("general", 1, shutdown.clone());
		let ran = Arc::new(StdMutex::new(0));
		shutdown.request();
		let ran2 = ran.clone();
		pool.submit("t", "/a.cj", move || {
			*ran2.lock().unwrap() += 1;
		});
		drop(pool);
		assert_eq!(*ran.lock().unwrap(), 0);
	}
}
