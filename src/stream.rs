//! Lifecycle event streams.
//!
//! Applications publish activation and passivation events to any number of
//! subscribers. Each subscription is an async stream backed by a bounded
//! tokio channel; publishing never blocks.

use std::pin::Pin;

use futures_core::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::model::CompositeId;

/// Type alias for a boxed async stream of events.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Something that happened to an application or one of its services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A service finished activating
    ServiceActivated {
        /// Service composite id
        composite: CompositeId,
        /// Public types of the service
        types: String,
    },
    /// A service finished passivating
    ServicePassivated {
        /// Service composite id
        composite: CompositeId,
        /// Public types of the service
        types: String,
    },
    /// Every eager service is active
    ApplicationActivated {
        /// Application name
        name: String,
    },
    /// Every active service was passivated
    ApplicationPassivated {
        /// Application name
        name: String,
    },
}

/// A sender for events in an async stream.
#[derive(Debug)]
pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> EventSender<T> {
    /// Create a new event sender from an mpsc sender.
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }

    /// Try to send an event without waiting.
    ///
    /// Returns `Ok(())` if the event was sent, or `Err(event)` if the
    /// channel is full or closed.
    pub fn try_send(&self, event: T) -> Result<(), T> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(v) => v,
            mpsc::error::TrySendError::Closed(v) => v,
        })
    }

    /// Check if the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Builder for creating event streams.
pub struct StreamBuilder<T> {
    buffer_size: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Send + 'static> StreamBuilder<T> {
    /// Create a new stream builder with default settings.
    pub fn new() -> Self {
        Self {
            buffer_size: 100,
            _marker: std::marker::PhantomData,
        }
    }

    /// Set the buffer size for the underlying channel.
    ///
    /// Default is 100.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Build the stream and sender.
    ///
    /// Returns a tuple of (sender, stream).
    pub fn build(self) -> (EventSender<T>, EventStream<T>) {
        let (tx, rx) = mpsc::channel(self.buffer_size.max(1));
        let sender = EventSender::new(tx);
        let stream: EventStream<T> = Box::pin(ReceiverStream::new(rx));
        (sender, stream)
    }
}

impl<T: Send + 'static> Default for StreamBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out of lifecycle events to every live subscriber.
#[derive(Debug)]
pub(crate) struct LifecycleEvents {
    buffer_size: usize,
    subscribers: Mutex<Vec<EventSender<LifecycleEvent>>>,
}

impl LifecycleEvents {
    pub(crate) fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> EventStream<LifecycleEvent> {
        let (sender, stream) = StreamBuilder::new().buffer_size(self.buffer_size).build();
        self.subscribers.lock().push(sender);
        stream
    }

    pub(crate) fn publish(&self, event: LifecycleEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.is_closed());
        for subscriber in subscribers.iter() {
            if let Err(dropped) = subscriber.try_send(event.clone()) {
                warn!(event = ?dropped, "Lifecycle event dropped, subscriber buffer is full");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_builder() {
        let (sender, stream) = StreamBuilder::<u32>::new().buffer_size(10).build();

        sender.try_send(1).unwrap();
        sender.try_send(2).unwrap();
        drop(sender);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let events = LifecycleEvents::new(8);
        let first = events.subscribe();
        let second = events.subscribe();

        events.publish(LifecycleEvent::ApplicationActivated {
            name: "app".to_string(),
        });
        drop(events);

        let expected = vec![LifecycleEvent::ApplicationActivated {
            name: "app".to_string(),
        }];
        assert_eq!(first.collect::<Vec<_>>().await, expected);
        assert_eq!(second.collect::<Vec<_>>().await, expected);
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_dropped() {
        let events = LifecycleEvents::new(8);
        let stream = events.subscribe();
        drop(stream);

        events.publish(LifecycleEvent::ApplicationPassivated {
            name: "app".to_string(),
        });
        assert!(events.subscribers.lock().is_empty());
    }

    #[test]
    fn test_full_buffer_drops_event() {
        let events = LifecycleEvents::new(1);
        let _stream = events.subscribe();
        for _ in 0..3 {
            events.publish(LifecycleEvent::ApplicationActivated {
                name: "app".to_string(),
            });
        }
        assert_eq!(events.subscribers.lock().len(), 1);
    }
}
