//! Presence tracking.
//!
//! Handlers here consume the internally re-emitted presence events. The
//! tricky part is ordering: an online intent may arrive before the user
//! exists, and an offline for the same user may arrive while that intent is
//! still suspended. The pending set resolves the race: offline cancels any
//! in-flight online for its user, so the later command wins.

use crate::store::UserStore;
use chrono::{DateTime, Utc};
use live_users_core::environment::{PresenceAnalytics, SessionSample};
use live_users_core::UserId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Tracks online/offline transitions against the aggregate store.
pub struct PresenceTracker {
    store: Arc<UserStore>,
    pending_online: Mutex<HashSet<UserId>>,
    analytics: Arc<dyn PresenceAnalytics>,
}

impl PresenceTracker {
    /// Create a tracker over the given store, reporting completed sessions
    /// to `analytics`.
    #[must_use]
    pub fn new(store: Arc<UserStore>, analytics: Arc<dyn PresenceAnalytics>) -> Self {
        Self {
            store,
            pending_online: Mutex::new(HashSet::new()),
            analytics,
        }
    }

    /// Mark a user online, waiting for the aggregate to exist first.
    ///
    /// Registers a pending intent, suspends until the user exists, then
    /// applies the write only if the intent survived. An offline (or sweep)
    /// arriving during the wait cancels the intent, so the transition is
    /// discarded rather than applied late.
    ///
    /// Returns `true` if the transition was applied.
    pub async fn user_online(&self, user: &UserId, at: DateTime<Utc>) -> bool {
        self.pending_online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.clone());

        if self.store.wait_for(user).await.is_none() {
            return false;
        }

        // The remove doubles as the intent check: if offline got here first,
        // the intent is gone and the write must not happen.
        let intent_alive = self
            .pending_online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user);
        if !intent_alive {
            tracing::debug!(user = %user, "online intent cancelled by a later offline");
            metrics::counter!("presence_online_cancelled_total").increment(1);
            return false;
        }

        let applied = self.store.update_if_exists(user, |u| {
            u.online = true;
            u.last_online = Some(at);
        });
        if applied {
            metrics::counter!("presence_online_total").increment(1);
        }
        applied
    }

    /// Mark a user offline, cancelling any in-flight online intent for them.
    ///
    /// An id that has never existed suspends like the online path, so the
    /// transition's timestamp still lands once the user is created. A
    /// tombstoned aggregate absorbs the write immediately; waiting there
    /// would never resolve.
    ///
    /// Returns `true` if the transition was applied to a stored aggregate.
    pub async fn user_offline(&self, user: &UserId, at: DateTime<Utc>) -> bool {
        let cancelled = self
            .pending_online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user);
        if cancelled {
            tracing::debug!(user = %user, "cancelled pending online intent");
        }

        if self.store.get(user).is_none() && self.store.wait_for(user).await.is_none() {
            return false;
        }

        let mut session_started: Option<DateTime<Utc>> = None;
        let applied = self.store.update_if_exists(user, |u| {
            if u.online {
                session_started = u.last_online;
            }
            u.online = false;
            u.last_online = Some(at);
        });
        if applied {
            metrics::counter!("presence_offline_total").increment(1);
            if let Some(started_at) = session_started {
                self.report_session(user, started_at, at).await;
            }
        }
        applied
    }

    /// Force every online user offline.
    ///
    /// Clears the whole pending set, then re-scans until no user remains
    /// online. The rescan handles users flipped online by handlers racing
    /// the sweep; their intents registered after the clear still win, which
    /// is why the loop snapshots rather than iterating once.
    pub async fn all_users_offline(&self, at: DateTime<Utc>) {
        self.pending_online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let mut swept = 0usize;
        loop {
            let online = self.store.online_ids();
            if online.is_empty() {
                break;
            }
            for user in online {
                if self.user_offline(&user, at).await {
                    swept += 1;
                }
            }
        }
        tracing::info!(swept, "swept all users offline");
        metrics::counter!("presence_sweeps_total").increment(1);
    }

    async fn report_session(&self, user: &UserId, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) {
        let sample = SessionSample {
            user: user.clone(),
            started_at,
            ended_at,
        };
        if let Err(error) = self.analytics.record_session(sample).await {
            // Analytics are best-effort; the transition already happened.
            tracing::warn!(user = %user, %error, "failed to record session sample");
            metrics::counter!("presence_analytics_errors_total").increment(1);
        }
    }
}
