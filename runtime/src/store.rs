//! In-memory aggregate store with change notification.
//!
//! Every write emits a [`UserChange`] carrying the aggregate before and
//! after the write. Changes are emitted while the write lock is held, so
//! subscribers observe them in write order.

use live_users_core::{User, UserId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// A single aggregate transition: the state before and after one write.
///
/// `old` is `None` for the creating write; `new` is `None` only if the
/// aggregate is ever physically removed (tombstoning keeps it present).
#[derive(Clone, Debug)]
pub struct UserChange {
    /// The affected aggregate's id.
    pub id: UserId,
    /// State before the write.
    pub old: Option<User>,
    /// State after the write.
    pub new: Option<User>,
}

/// Live store of user aggregates.
pub struct UserStore {
    users: RwLock<HashMap<UserId, User>>,
    changes: broadcast::Sender<UserChange>,
}

impl UserStore {
    /// Create a store whose change channel buffers `capacity` transitions
    /// per lagging subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            users: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Fetch a snapshot of an aggregate.
    #[must_use]
    pub fn get(&self, id: &UserId) -> Option<User> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Whether a live (non-tombstoned) aggregate exists for `id`.
    #[must_use]
    pub fn exists(&self, id: &UserId) -> bool {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .is_some_and(|u| !u.is_tombstoned())
    }

    /// Insert or replace an aggregate, emitting the transition.
    pub fn insert(&self, user: User) {
        let id = user.id.clone();
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let old = users.insert(id.clone(), user.clone());
        metrics::gauge!("users_total").set(users.len() as f64);
        let _ = self.changes.send(UserChange {
            id,
            old,
            new: Some(user),
        });
    }

    /// Apply `f` to the aggregate if it exists and is not tombstoned.
    ///
    /// Returns `true` if the write happened. Updates targeting absent or
    /// deleted aggregates are silent no-ops, so late writers racing a
    /// deletion cannot resurrect state.
    pub fn update_if_exists(&self, id: &UserId, f: impl FnOnce(&mut User)) -> bool {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let Some(user) = users.get_mut(id) else {
            return false;
        };
        if user.is_tombstoned() {
            return false;
        }
        let old = user.clone();
        f(user);
        let _ = self.changes.send(UserChange {
            id: id.clone(),
            old: Some(old),
            new: Some(user.clone()),
        });
        true
    }

    /// Subscribe to aggregate transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UserChange> {
        self.changes.subscribe()
    }

    /// Wait until a live aggregate exists for `id`, then return it.
    ///
    /// Subscribes before checking, so a write that lands between the check
    /// and the wait is never missed. Returns `None` only if the change
    /// channel closes, which cannot happen while the store is alive.
    pub async fn wait_for(&self, id: &UserId) -> Option<User> {
        let mut rx = self.changes.subscribe();
        if let Some(user) = self.get(id) {
            if !user.is_tombstoned() {
                return Some(user);
            }
        }
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if &change.id == id {
                        if let Some(user) = change.new {
                            if !user.is_tombstoned() {
                                return Some(user);
                            }
                        }
                    }
                }
                // Missed transitions; the current snapshot covers them.
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(user) = self.get(id) {
                        if !user.is_tombstoned() {
                            return Some(user);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Ids of all users currently marked online.
    #[must_use]
    pub fn online_ids(&self) -> Vec<UserId> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|u| u.online && !u.is_tombstoned())
            .map(|u| u.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use live_users_core::UserData;

    fn user(id: &str) -> User {
        User {
            id: UserId::from(id),
            display: "unknown".to_string(),
            roles: vec![],
            login_methods: vec![],
            user_data: Some(UserData::new()),
            slug: None,
            online: false,
            last_online: None,
        }
    }

    #[tokio::test]
    async fn update_is_a_noop_for_absent_or_tombstoned_users() {
        let store = UserStore::new(16);
        assert!(!store.update_if_exists(&UserId::from("ghost"), |u| u.online = true));

        let mut deleted = user("gone");
        deleted.user_data = None;
        store.insert(deleted);
        assert!(!store.update_if_exists(&UserId::from("gone"), |u| u.online = true));
        assert!(!store.get(&UserId::from("gone")).unwrap().online);
    }

    #[tokio::test]
    async fn wait_for_sees_writes_racing_the_subscription() {
        let store = std::sync::Arc::new(UserStore::new(16));
        let id = UserId::from("u1");

        let waiter = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.wait_for(&id).await })
        };
        tokio::task::yield_now().await;
        store.insert(user("u1"));

        let found = waiter.await.unwrap().unwrap();
        assert_eq!(found.id, id);
    }

    #[tokio::test]
    async fn changes_carry_old_and_new_state() {
        let store = UserStore::new(16);
        let mut rx = store.subscribe();
        store.insert(user("u1"));
        store.update_if_exists(&UserId::from("u1"), |u| u.online = true);

        let created = rx.recv().await.unwrap();
        assert!(created.old.is_none());
        let updated = rx.recv().await.unwrap();
        assert!(!updated.old.unwrap().online);
        assert!(updated.new.unwrap().online);
    }
}
