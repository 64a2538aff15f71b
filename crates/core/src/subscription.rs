//! RAII subscriptions.
//!
//! A [`Subscription`] undoes a registration (or stops a listener task) when it
//! is dropped. The teardown runs exactly once.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

type Dropper = Box<dyn FnOnce() + Send + Sync>;

/// Handle that tears down a registration on drop.
pub struct Subscription {
	dropper: Option<Dropper>,
}

impl Subscription {
	/// Creates a subscription with a custom teardown.
	pub fn new(dropper: impl FnOnce() + Send + Sync + 'static) -> Self {
		Self {
			dropper: Some(Box::new(dropper)),
		}
	}

	/// Creates a subscription that clears `slot` on teardown.
	///
	/// Holds only a weak reference, so dropping after the owner of the slot is
	/// gone is a no-op.
	pub fn clearing<T>(slot: &Arc<Mutex<Option<T>>>) -> Self
	where
		T: Send + 'static,
	{
		let weak: Weak<Mutex<Option<T>>> = Arc::downgrade(slot);
		Self::new(move || {
			if let Some(slot) = weak.upgrade() {
				slot.lock().take();
			}
		})
	}

	/// Creates a subscription that aborts a listener task on teardown.
	pub fn from_task(task: JoinHandle<()>) -> Self {
		Self::new(move || task.abort())
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			dropper();
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription").field("active", &self.dropper.is_some()).finish()
	}
}
