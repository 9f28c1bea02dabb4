//! Fan-out of serialized messages to connected subscribers.
//!
//! ```text
//! publish() ──► intake (unbounded) ──► dispatcher ──┬──► queue (bounded) ──► subscriber 1
//!                                                   ├──► queue (bounded) ──► subscriber 2
//!                                                   └──► ...
//! ```
//!
//! Delivery is best-effort and at-most-once. The dispatcher never waits on a
//! subscriber: when a queue is full or closed, that subscriber is removed from
//! the registry and its cancellation token fires. Dropping a slow subscriber is
//! the backpressure policy of the hub, not an error condition. Messages are
//! delivered to each subscriber in publish order; there is no ordering across
//! subscribers.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::HubError;

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Process-unique subscriber identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters since the hub was spawned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Messages accepted by the dispatcher.
    pub published: u64,

    /// Successful enqueues across all subscribers.
    pub delivered: u64,

    /// Subscribers removed because their queue was full or closed.
    pub dropped_subscribers: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped_subscribers: AtomicU64,
}

#[derive(Debug)]
struct Entry {
    queue: mpsc::Sender<Arc<str>>,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Registry {
    subscribers: Mutex<HashMap<SubscriberId, Entry>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Entry>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer `message` to every subscriber, dropping those that cannot take it.
    fn dispatch(&self, message: &Arc<str>) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.lock();
        let before = subscribers.len();
        let mut delivered = 0;
        subscribers.retain(|id, entry| match entry.queue.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                info!(subscriber = %id, "Dropping slow subscriber");
                entry.cancel.cancel();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = %id, "Dropping disconnected subscriber");
                entry.cancel.cancel();
                false
            }
        });
        let dropped = (before - subscribers.len()) as u64;
        drop(subscribers);

        let counters = &self.counters;
        counters.delivered.fetch_add(delivered, Ordering::Relaxed);
        counters
            .dropped_subscribers
            .fetch_add(dropped, Ordering::Relaxed);
        trace!(delivered, dropped, "Dispatched message");
    }

    fn close_all(&self) {
        for (id, entry) in self.lock().drain() {
            debug!(subscriber = %id, "Hub closing, cancelling subscriber");
            entry.cancel.cancel();
        }
    }
}

/// Handle to a running broadcast hub.
///
/// Clones share the same dispatcher. When the last handle is dropped the
/// dispatcher exits and every remaining subscriber is cancelled.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    intake: mpsc::UnboundedSender<Arc<str>>,
    registry: Arc<Registry>,
    capacity: usize,
}

impl BroadcastHub {
    /// Start the dispatcher task. `capacity` is the queue depth of each
    /// subscriber and is raised to at least 1.
    pub fn spawn(capacity: usize) -> Self {
        let (intake, mut rx) = mpsc::unbounded_channel::<Arc<str>>();
        let registry = Arc::new(Registry::default());

        let dispatcher = registry.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                dispatcher.dispatch(&message);
            }
            dispatcher.close_all();
            debug!("Broadcast dispatcher exited");
        });

        Self {
            intake,
            registry,
            capacity: capacity.max(1),
        }
    }

    /// Queue a message for every subscriber. Never blocks.
    pub fn publish(&self, message: impl Into<Arc<str>>) -> Result<(), HubError> {
        self.intake.send(message.into()).map_err(|_| HubError::Closed)
    }

    /// Add a subscriber with an empty bounded queue.
    pub fn register(&self) -> Subscriber {
        let id = SubscriberId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();

        self.registry.lock().insert(
            id,
            Entry {
                queue: tx.clone(),
                cancel: cancel.clone(),
            },
        );
        debug!(subscriber = %id, "Subscriber registered");

        Subscriber {
            id,
            queue: rx,
            reply: ReplySender { id, queue: tx },
            cancel,
        }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        match self.registry.lock().remove(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                debug!(subscriber = %id, "Subscriber unregistered");
                true
            }
            None => false,
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Snapshot of the hub counters.
    pub fn stats(&self) -> HubStats {
        let counters = &self.registry.counters;
        HubStats {
            published: counters.published.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped_subscribers: counters.dropped_subscribers.load(Ordering::Relaxed),
        }
    }
}

/// Receiving side of one subscription.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    queue: mpsc::Receiver<Arc<str>>,
    reply: ReplySender,
    cancel: CancellationToken,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next queued message.
    ///
    /// The subscriber holds its own reply sender, so the queue never reports
    /// closed on its own; watch [`Subscriber::cancellation_token`] to learn
    /// when the hub has dropped it.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.queue.recv().await
    }

    /// Sender for replies that share this subscriber's queue.
    pub fn reply_sender(&self) -> ReplySender {
        self.reply.clone()
    }

    /// Fires when the hub drops this subscriber.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Enqueues direct replies for a single subscriber.
///
/// Replies go through the same queue as broadcasts, so the subscriber's write
/// loop sees them in order with everything else.
#[derive(Debug, Clone)]
pub struct ReplySender {
    id: SubscriberId,
    queue: mpsc::Sender<Arc<str>>,
}

impl ReplySender {
    /// Wait for room in the queue and enqueue `message`.
    pub async fn send(&self, message: impl Into<Arc<str>>) -> Result<(), HubError> {
        self.queue
            .send(message.into())
            .await
            .map_err(|_| HubError::SubscriberGone(self.id.as_u64()))
    }
}
