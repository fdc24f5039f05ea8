//! Worker pools.
//!
//! Two shapes, both preemptive threads over parking_lot primitives:
//! - [`DepPool`]: project-wide compile tasks with dependency sets; a task
//!   runs only after every declared predecessor completed.
//! - [`FeaturePool`]: feature actions keyed by file; one file's actions run
//!   in enqueue order, different files run in parallel up to pool size.
//!
//! Cancellation is cooperative everywhere: a [`ShutdownFlag`] short-circuits
//! wait predicates and stops workers from dequeuing.

mod dep_pool;
mod feature_pool;

pub use dep_pool::DepPool;
pub use feature_pool::FeaturePool;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide cooperative shutdown flag, threaded explicitly through every
/// component that loops or waits.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn request(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn requested(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Default worker count: available cores, at least two.
pub fn default_pool_size() -> usize {
	std::thread::available_parallelism()
		.map(|n| n.get())
		.unwrap_or(4)
		.max(2)
}
