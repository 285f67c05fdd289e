//! The event bus seam between the user service and its transport.
//!
//! Production deployments back this with a broker; tests use the in-memory
//! bus from the testing crate. Delivery is at-least-once: consumers must
//! tolerate duplicates.

use crate::event::SerializedEvent;
use futures::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors surfaced by event bus implementations.
#[derive(Error, Debug)]
pub enum EventBusError {
    /// Failed to publish an event to the given topic.
    #[error("failed to publish to topic '{topic}': {reason}")]
    Publish {
        /// The target topic.
        topic: String,
        /// Transport-specific failure description.
        reason: String,
    },

    /// Failed to subscribe to the given topic.
    #[error("failed to subscribe to topic '{topic}': {reason}")]
    Subscribe {
        /// The requested topic.
        topic: String,
        /// Transport-specific failure description.
        reason: String,
    },

    /// The bus connection is no longer usable.
    #[error("event bus connection lost: {0}")]
    Connection(String),
}

/// A stream of events delivered from a topic subscription.
pub type EventStream = BoxStream<'static, Result<SerializedEvent, EventBusError>>;

/// Publish/subscribe transport for serialized events.
///
/// The trait is dyn-compatible so environments can hold a `Box<dyn EventBus>`
/// and swap transports without generics bleeding through the service layer.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Publish`] if the transport rejects the event.
    fn publish(
        &self,
        topic: &str,
        event: SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to a topic, receiving events published after the
    /// subscription is established.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Subscribe`] if the subscription cannot be
    /// created.
    fn subscribe(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
