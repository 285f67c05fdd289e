//! Dependency seams injected into the service layer.
//!
//! Handlers never reach for ambient state: clocks, id generation, and the
//! analytics sink all arrive through an environment struct, so tests can
//! control time and observe side effects.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Provides the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock reading the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Generates unique identifiers for new aggregates.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh, never-before-seen id.
    fn generate(&self) -> UserId;
}

/// Production id generator backed by random UUIDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn generate(&self) -> UserId {
        UserId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// A completed presence session, reported when a user transitions offline.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSample {
    /// The user whose session ended.
    pub user: UserId,
    /// When the session began (the last recorded online transition).
    pub started_at: DateTime<Utc>,
    /// When the session ended.
    pub ended_at: DateTime<Utc>,
}

/// Errors from the analytics sink.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// The sink rejected or failed to record the sample.
    #[error("failed to record session sample: {0}")]
    Sink(String),
}

/// Best-effort sink for presence session analytics.
///
/// Failures here never fail the presence transition; callers log and move on.
pub trait PresenceAnalytics: Send + Sync {
    /// Record a completed session.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Sink`] if the sample could not be recorded.
    fn record_session(
        &self,
        sample: SessionSample,
    ) -> Pin<Box<dyn Future<Output = Result<(), AnalyticsError>> + Send + '_>>;
}
