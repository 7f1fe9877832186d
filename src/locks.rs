//! Per-filename mutual exclusion for host-side transfers
//!
//! Every send and receive of a file on the host holds the lock for that
//! filename, so two connections never stream the same file concurrently.
//! Transfers of different files do not contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map of filename to its transfer lock
#[derive(Debug, Default)]
pub struct FileLocks {
	locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FileLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Wait for exclusive access to `name`
	pub async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
		let lock = {
			let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
			// Drop entries nobody holds or waits on
			locks.retain(|_, l| Arc::strong_count(l) > 1);
			locks.entry(name.to_string()).or_default().clone()
		};
		lock.lock_owned().await
	}

	/// Number of filenames currently tracked
	pub fn len(&self) -> usize {
		self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}


// vim: ts=4
