//! Broadcast event bus for lifecycle events.
//!
//! Subscribers receive every event published after they subscribed. A slow
//! subscriber that falls more than the channel capacity behind loses the
//! oldest events rather than blocking publishers.

use pickup_types::LifecycleEvent;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Event bus shared by the lifecycle components.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
	/// Creates a new event bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	/// Registers a new subscriber.
	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Having no subscribers is not an error; the event is dropped.
	pub fn publish(&self, event: LifecycleEvent) {
		if self.sender.send(event).is_err() {
			tracing::trace!("No subscribers for lifecycle event");
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}
