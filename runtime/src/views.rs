//! Live projected views over the aggregate store.
//!
//! A view is an initial snapshot plus a stream of projection pairs, one per
//! aggregate transition: the projection after the write and the one before
//! it. Deletion shows up as a `None` projection, never as a partial object.

use crate::service::Caller;
use crate::store::UserStore;
use futures::stream::BoxStream;
use live_users_core::projection::{ProjectedUser, ProjectionSchema, project};
use live_users_core::{DomainConfig, User, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One transition as seen through a view: projection after the write, then
/// projection before it.
pub type ProjectionPair = (Option<ProjectedUser>, Option<ProjectedUser>);

/// A live view of a single user through one schema.
pub struct LiveView {
    /// Snapshot at subscription time.
    pub initial: Option<ProjectedUser>,
    /// Subsequent transitions, in write order.
    pub changes: BoxStream<'static, ProjectionPair>,
}

/// Factory for live views, one per configured schema.
pub struct UserViews {
    store: Arc<UserStore>,
    domain: DomainConfig,
}

impl UserViews {
    /// Build a view factory over a store.
    #[must_use]
    pub fn new(store: Arc<UserStore>, domain: DomainConfig) -> Self {
        Self { store, domain }
    }

    /// Public view of any user by id.
    #[must_use]
    pub fn public_user_data(&self, user: &UserId) -> LiveView {
        self.view(user, self.domain.public_schema.clone())
    }

    /// The caller's view of themselves. `None` for anonymous callers.
    #[must_use]
    pub fn me(&self, caller: &Caller) -> Option<LiveView> {
        let user = caller.user.as_ref()?;
        Some(self.view(user, self.domain.me_schema.clone()))
    }

    /// A named private view of the caller's own aggregate. `None` for
    /// anonymous callers or unknown view names.
    #[must_use]
    pub fn private_view(&self, caller: &Caller, name: &str) -> Option<LiveView> {
        let user = caller.user.as_ref()?;
        let schema = self.domain.private_views.get(name)?.clone();
        Some(self.view(user, schema))
    }

    fn view(&self, user: &UserId, schema: ProjectionSchema) -> LiveView {
        // Subscribe before snapshotting so no transition falls in between.
        let rx = self.store.subscribe();
        let initial = self
            .store
            .get(user)
            .as_ref()
            .and_then(|u| project(u, &schema));
        LiveView {
            initial,
            changes: Box::pin(change_stream(rx, user.clone(), schema)),
        }
    }
}

fn change_stream(
    mut rx: broadcast::Receiver<crate::store::UserChange>,
    user: UserId,
    schema: ProjectionSchema,
) -> impl futures::Stream<Item = ProjectionPair> {
    let project_opt =
        move |state: Option<&User>, schema: &ProjectionSchema| -> Option<ProjectedUser> {
            state.and_then(|u| project(u, schema))
        };
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(change) if change.id == user => {
                    let new = project_opt(change.new.as_ref(), &schema);
                    let old = project_opt(change.old.as_ref(), &schema);
                    yield (new, old);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(user = %user, missed, "view lagged behind the change stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
