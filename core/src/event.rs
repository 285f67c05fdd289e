//! Events produced and consumed by the user service.
//!
//! Events are immutable facts with a stable, versioned type tag. Payloads
//! carry the open-ended `userData` sub-document, so the wire format is JSON
//! (self-describing); the tag travels alongside the payload in
//! [`SerializedEvent`] for routing without deserialization.

use crate::types::{Slug, User, UserData, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Topic carrying user-aggregate events.
pub const USER_TOPIC: &str = "user-events";

/// Topic carrying cross-service notifications for the session subsystem.
pub const SESSION_TOPIC: &str = "session-events";

/// Error types for event serialization.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event to bytes.
    #[error("failed to serialize event: {0}")]
    Serialization(String),

    /// Failed to deserialize an event from bytes.
    #[error("failed to deserialize event: {0}")]
    Deserialization(String),
}

/// An immutable fact that can be published on the event bus and replayed by
/// consumers.
///
/// # Event naming convention
///
/// [`Event::event_type`] returns a stable identifier with a version suffix
/// (`"UserCreated.v1"`), so schemas can evolve without breaking routing.
pub trait Event: Send + Sync + 'static {
    /// Stable, versioned type tag for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to its wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the event cannot be encoded.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Deserialize an event from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Deserialization`] if the bytes do not decode to
    /// this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::Deserialization(e.to_string()))
    }
}

/// A serialized event ready for publication: type tag, payload bytes, and
/// optional metadata (correlation ids and the like).
#[derive(Clone, Debug)]
pub struct SerializedEvent {
    /// The event type identifier (e.g. `"UserCreated.v1"`).
    pub event_type: String,
    /// The encoded event payload.
    pub data: Vec<u8>,
    /// Optional metadata attached by the producer.
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a serialized event from raw parts.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Encode an [`Event`] into its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the payload cannot be encoded.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

/// Changed fields carried by a `UserUpdated` event.
///
/// Only the parts the triggering command touched are present; the display
/// name is always recomputed and the slug reflects the (possibly unchanged)
/// outcome of the slug saga.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    /// New role set, when the command changed roles.
    pub roles: Option<Vec<String>>,
    /// The userData patch applied by the command.
    pub user_data: Option<UserData>,
    /// Recomputed display name.
    pub display: String,
    /// Slug after the saga's re-check.
    pub slug: Option<Slug>,
}

/// Events on the user topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UserEvent {
    /// A new user aggregate was created with its initial data.
    UserCreated {
        /// The new user's id.
        user: UserId,
        /// Full initial aggregate state, including the allocated slug.
        data: Box<User>,
    },
    /// A user aggregate was updated.
    UserUpdated {
        /// The updated user's id.
        user: UserId,
        /// The fields that changed.
        data: UserUpdate,
    },
    /// A user aggregate was deleted; its id is never reused.
    UserDeleted {
        /// The deleted user's id.
        user: UserId,
    },
    /// Internal re-emission driving the presence tracker.
    UserOnline {
        /// The user going online.
        user: UserId,
        /// Timestamp of the intended transition.
        last_online: DateTime<Utc>,
    },
    /// Internal re-emission driving the presence tracker.
    UserOffline {
        /// The user going offline.
        user: UserId,
        /// Timestamp of the intended transition.
        last_online: DateTime<Utc>,
    },
    /// Global signal forcing every online user offline.
    AllUsersOffline {
        /// Timestamp applied to every swept user.
        last_online: DateTime<Utc>,
    },
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserCreated { .. } => "UserCreated.v1",
            UserEvent::UserUpdated { .. } => "UserUpdated.v1",
            UserEvent::UserDeleted { .. } => "UserDeleted.v1",
            UserEvent::UserOnline { .. } => "userOnline.v1",
            UserEvent::UserOffline { .. } => "userOffline.v1",
            UserEvent::AllUsersOffline { .. } => "allUsersOffline.v1",
        }
    }
}

/// Cross-service notifications on the session topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A user's role set changed; carries the previous roles so the session
    /// subsystem can diff.
    RolesUpdated {
        /// The affected user.
        user: UserId,
        /// Roles after the update.
        roles: Vec<String>,
        /// Roles before the update.
        old_roles: Vec<String>,
    },
    /// A user deleted their account; sessions must be torn down.
    UserDeleted {
        /// The deleted user's id.
        user: UserId,
    },
}

impl Event for SessionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::RolesUpdated { .. } => "rolesUpdated.v1",
            SessionEvent::UserDeleted { .. } => "UserDeleted.v1",
        }
    }
}
