//! Service-level errors.

use crate::event::EventError;
use crate::event_bus::EventBusError;
use crate::slug::SlugServiceError;
use crate::types::UserId;
use thiserror::Error;

/// Errors returned by user service command handlers.
#[derive(Error, Debug)]
pub enum UserError {
    /// The target aggregate does not exist (or is tombstoned).
    #[error("user '{0}' not found")]
    NotFound(UserId),

    /// The caller is not allowed to perform this command.
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    /// The slug service failed; the command was abandoned.
    #[error(transparent)]
    Slug(#[from] SlugServiceError),

    /// Event publication failed; no state was written.
    #[error(transparent)]
    Publish(#[from] EventBusError),

    /// An event could not be encoded.
    #[error(transparent)]
    Serialization(#[from] EventError),
}
