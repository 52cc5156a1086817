use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Subscriber<T> {
    id: u64,
    tx: mpsc::Sender<T>,
}

/// One-to-many in-process fan-out.
///
/// Every subscriber owns a bounded buffer; when it is full, deliveries to
/// that subscriber are dropped without blocking the publisher or affecting
/// other subscribers. Per-subscriber ordering follows the order in which
/// `publish` accepted values; there is no cross-subscriber ordering.
pub struct Broadcaster<T> {
    subscribers: Arc<Mutex<Vec<Subscriber<T>>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            buffer: buffer.max(1),
        }
    }

    /// Registers a subscriber whose lifetime is tied to `cancel`.
    ///
    /// The returned stream terminates once `cancel` fires and the buffered
    /// values are drained. Dropping the stream also removes the subscriber;
    /// its slot is reaped on the next `publish`.
    pub fn subscribe(&self, cancel: CancellationToken) -> impl Stream<Item = T> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber { id, tx });

        let subscribers = self.subscribers.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            subscribers.lock().retain(|s| s.id != id);
            trace!(subscriber = id, "subscription cancelled");
        });

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|value| (value, rx))
        })
    }

    /// Delivers `value` to every live subscriber, never blocking.
    ///
    /// Deliveries into a full buffer are dropped for that subscriber only.
    pub fn publish(&self, value: T) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        for subscriber in subscribers.iter() {
            if subscriber.tx.try_send(value.clone()).is_err() {
                trace!(subscriber = subscriber.id, "subscriber buffer full, dropping event");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let broadcaster = Broadcaster::new(8);
        let cancel = CancellationToken::new();
        let mut a = Box::pin(broadcaster.subscribe(cancel.clone()));
        let mut b = Box::pin(broadcaster.subscribe(cancel.clone()));

        broadcaster.publish(1u32);
        broadcaster.publish(2u32);

        assert_eq!(a.next().await, Some(1));
        assert_eq!(a.next().await, Some(2));
        assert_eq!(b.next().await, Some(1));
        assert_eq!(b.next().await, Some(2));
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_only_its_own_events() {
        let broadcaster = Broadcaster::new(1);
        let cancel = CancellationToken::new();
        // slow subscriber never reads until the end
        let mut slow = Box::pin(broadcaster.subscribe(cancel.clone()));
        let mut fast = Box::pin(broadcaster.subscribe(cancel.clone()));

        broadcaster.publish(1u32);
        // fast drains between publishes, slow does not
        assert_eq!(fast.next().await, Some(1));
        broadcaster.publish(2u32);
        assert_eq!(fast.next().await, Some(2));

        // slow kept only the first value, the second was dropped
        assert_eq!(slow.next().await, Some(1));
        cancel.cancel();
        assert_eq!(slow.next().await, None);
    }

    #[tokio::test]
    async fn test_cancel_removes_subscription() {
        let broadcaster: Broadcaster<u32> = Broadcaster::new(4);
        let cancel = CancellationToken::new();
        let stream = broadcaster.subscribe(cancel.clone());
        assert_eq!(broadcaster.subscriber_count(), 1);

        cancel.cancel();
        // removal happens on the spawned cleanup task
        for _ in 0..50 {
            if broadcaster.subscriber_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broadcaster.subscriber_count(), 0);
        drop(stream);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_reaped_on_publish() {
        let broadcaster: Broadcaster<u32> = Broadcaster::new(4);
        let cancel = CancellationToken::new();
        let stream = broadcaster.subscribe(cancel.clone());
        drop(stream);

        broadcaster.publish(1);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
