//! Dependency-DAG thread pool driving package compiles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ShutdownFlag;

type Thunk = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
	thunks: FxHashMap<u64, Thunk>,
	/// Outstanding predecessors per pending task.
	deps: FxHashMap<u64, FxHashSet<u64>>,
	/// Tasks waiting on a given id.
	dependents: FxHashMap<u64, FxHashSet<u64>>,
	/// Ids added and not yet completed (includes running tasks).
	active: FxHashSet<u64>,
	ready: VecDeque<u64>,
	remaining: usize,
	stop: bool,
}

struct Inner {
	state: Mutex<State>,
	work_cv: Condvar,
	done_cv: Condvar,
	shutdown: ShutdownFlag,
}

/// Pool of worker threads pulling ready tasks FIFO; completing a task
/// promotes every dependent whose dependency set drains empty.
pub struct DepPool {
	inner: Arc<Inner>,
	workers: Vec<JoinHandle<()>>,
}

impl DepPool {
	pub fn new(threads: usize, shutdown: ShutdownFlag) -> Self {
		let inner = Arc::new(Inner {
			state: Mutex::new(State::default()),
			work_cv: Condvar::new(),
			done_cv: Condvar::new(),
			shutdown,
		});
		let workers = (0..threads.max(1))
			.map(|i| {
				let inner = inner.clone();
				std::thread::Builder::new()
					.name(format!("cjls-compile-{i}"))
					.spawn(move || worker_loop(&inner))
					.expect("spawn compile worker")
			})
			.collect();
		Self { inner, workers }
	}

	/// Adds a task with its predecessor set. Predecessors that already
	/// completed (or were never added) are ignored, so submission order does
	/// not matter.
	pub fn add_task(
		&self,
		id: u64,
		dependencies: impl IntoIterator<Item = u64>,
		thunk: impl FnOnce() + Send + 'static,
	) {
		let mut state = self.inner.state.lock();
		if state.stop || self.inner.shutdown.requested() {
			return;
		}
		if !state.active.insert(id) {
			tracing::warn!(id, "duplicate task id ignored");
			return;
		}
		state.remaining += 1;
		state.thunks.insert(id, Box::new(thunk));
		let pending: FxHashSet<u64> = dependencies
			.into_iter()
			.filter(|dep| state.active.contains(dep) && *dep != id)
			.collect();
		for &dep in &pending {
			state.dependents.entry(dep).or_default().insert(id);
		}
		if pending.is_empty() {
			state.ready.push_back(id);
			drop(state);
			self.inner.work_cv.notify_one();
		} else {
			state.deps.insert(id, pending);
		}
	}

	/// Blocks until every added task completed. Shutdown requests bound the
	/// wait instead of hanging it.
	pub fn wait_all(&self) {
		let mut state = self.inner.state.lock();
		while state.remaining > 0 && !self.inner.shutdown.requested() {
			self.inner
				.done_cv
				.wait_for(&mut state, Duration::from_millis(100));
		}
	}

	pub fn pending(&self) -> usize {
		self.inner.state.lock().remaining
	}
}

impl Drop for DepPool {
	fn drop(&mut self) {
		{
			let mut state = self.inner.state.lock();
			state.stop = true;
		}
		self.inner.work_cv.notify_all();
		for worker in self.workers.drain(..) {
			let _ = worker.join();
		}
	}
}

fn worker_loop(inner: &Inner) {
	loop {
		let (id, thunk) = {
			let mut state = inner.state.lock();
			loop {
				// Drain ready tasks before honoring stop.
				if state.stop && state.ready.is_empty() {
					return;
				}
				if let Some(id) = state.ready.pop_front() {
					let thunk = state.thunks.remove(&id).expect("ready task has a thunk");
					break (id, thunk);
				}
				inner.work_cv.wait(&mut state);
			}
		};
		if !inner.shutdown.requested() {
			thunk();
		}
		complete(inner, id);
	}
}

fn complete(inner: &Inner, id: u64) {
	let mut state = inner.state.lock();
	state.active.remove(&id);
	if let Some(dependents) = state.dependents.remove(&id) {
		for dependent in dependents {
			let now_ready = match state.deps.get_mut(&dependent) {
				Some(outstanding) => {
					outstanding.remove(&id);
					outstanding.is_empty()
				}
				None => false,
			};
			if now_ready {
				state.deps.remove(&dependent);
				state.ready.push_back(dependent);
				inner.work_cv.notify_one();
			}
		}
	}
	state.remaining = state.remaining.saturating_sub(1);
	if state.remaining == 0 {
		inner.done_cv.notify_all();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex as StdMutex;

	use super::*;

	#[test]
	fn tasks_run_after_their_dependencies() {
		let order = Arc::new(StdMutex::new(Vec::new()));
		let pool = DepPool::new(4, ShutdownFlag::new());
		// c depends on b depends on a; submit in reverse.
		for (id, deps) in [(3u64, vec![2u64]), (2, vec![1]), (1, vec![])] {
			let order = order.clone();
			pool.add_task(id, deps, move || {
				order.lock().unwrap().push(id);
			});
		}
		pool.wait_all();
		assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
	}

	#[test]
	fn diamond_dependencies_complete() {
		let done = Arc::new(StdMutex::new(Vec::new()));
		let pool = DepPool::new(4, ShutdownFlag::new());
		for (id, deps) in [(1u64, vec![]), (2, vec![1]), (3, vec![1]), (4, vec![2, 3])] {
			let done = done.clone();
			pool.add_task(id, deps, move || {
				done.lock().unwrap().push(id);
			});
		}
		pool.wait_all();
		let seen = done.lock().unwrap();
		assert_eq!(seen.len(), 4);
		let pos = |id: u64| seen.iter().position(|&x| x == id).unwrap();
		assert!(pos(1) < pos(2) && pos(1) < pos(3) && pos(2) < pos(4) && pos(3) < pos(4));
	}

	#[test]
	fn completed_dependencies_do_not_block_later_tasks() {
		let pool = DepPool::new(2, ShutdownFlag::new());
		pool.add_task(1, [], || {});
		pool.wait_all();
		let ran = Arc::new(StdMutex::new(false));
		let ran2 = ran.clone();
		// Task 1 already completed; the dependency must be ignored.
		pool.add_task(2, [1], move || {
			*ran2.lock().unwrap() = true;
		});
		pool.wait_all();
		assert!(*ran.lock().unwrap());
	}

	#[test]
	fn shutdown_unblocks_wait_all() {
		let shutdown = ShutdownFlag::new();
		let pool = DepPool::new(1, shutdown.clone());
		pool.add_task(1, [], || std::thread::sleep(Duration::from_millis(400)));
		let started = std::time::Instant::now();
		let flag = shutdown.clone();
		std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(50));
			flag.request();
		});
		// Must return on the shutdown request, not after the sleeping task.
		pool.wait_all();
		assert!(started.elapsed() < Duration::from_millis(350));
	}
}
