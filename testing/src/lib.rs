//! Test doubles for the live users service.
//!
//! Deterministic clock and ids, an in-memory event bus that records what was
//! published, an in-memory slug service with failure injection, and a
//! recording analytics sink. Everything here implements the seams from
//! `live-users-core`, so the runtime can be exercised without any real
//! transport.

pub mod mocks;

pub use mocks::{InMemoryEventBus, InMemorySlugService, RecordingAnalytics, SequentialIds};

use chrono::{DateTime, Duration, TimeZone, Utc};
use live_users_core::environment::Clock;
use std::sync::{Mutex, PoisonError};

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned to `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Advance the clock.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`FixedClock`] pinned to a fixed, readable instant.
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).single().unwrap_or_default())
}

/// Install a compact tracing subscriber for tests. Safe to call repeatedly;
/// only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .compact()
        .try_init();
}
