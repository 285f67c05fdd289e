//! Command and event handlers for the user service.
//!
//! Every command publishes its event(s) before touching the store, so a
//! failed publish aborts the command with no state change. Consumed events
//! (login methods, presence) are handled idempotently: delivery is
//! at-least-once and ordering across topics is not guaranteed.

use crate::config::Config;
use crate::presence::PresenceTracker;
use crate::saga::SlugSaga;
use crate::store::UserStore;
use crate::views::UserViews;
use live_users_core::environment::{Clock, IdGenerator, PresenceAnalytics};
use live_users_core::event::{Event, SerializedEvent, SessionEvent, UserEvent, UserUpdate};
use live_users_core::event_bus::EventBus;
use live_users_core::slug::SlugService;
use live_users_core::{DomainConfig, LoginMethod, User, UserData, UserError, UserId};
use serde::Serialize;
use std::sync::Arc;

/// Identity and roles of whoever issued a command.
#[derive(Clone, Debug, Default)]
pub struct Caller {
    /// The authenticated user, if any.
    pub user: Option<UserId>,
    /// Role strings attached to the caller's session.
    pub roles: Vec<String>,
}

impl Caller {
    /// An unauthenticated caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated caller with the given roles.
    #[must_use]
    pub fn authenticated(user: UserId, roles: Vec<String>) -> Self {
        Self {
            user: Some(user),
            roles,
        }
    }

    /// Whether the caller holds the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "admin")
    }

    fn require_admin(&self) -> Result<(), UserError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(UserError::Unauthorized("admin role required"))
        }
    }

    fn require_user(&self) -> Result<&UserId, UserError> {
        self.user
            .as_ref()
            .ok_or(UserError::Unauthorized("authentication required"))
    }
}

/// The create command payload.
#[derive(Clone, Debug, Default)]
pub struct CreateUser {
    /// Explicit initial display name; when absent the display policy derives
    /// one. Recomputed anyway on the next identity change.
    pub display: Option<String>,
    /// Initial roles.
    pub roles: Vec<String>,
    /// Initial login methods; duplicates by `(type, id)` collapse.
    pub login_methods: Vec<LoginMethod>,
    /// Initial profile document.
    pub user_data: UserData,
}

/// Injected dependencies for the service.
pub struct UserEnvironment {
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Id generation for new aggregates.
    pub ids: Arc<dyn IdGenerator>,
    /// Client for the external slug service.
    pub slugs: Arc<dyn SlugService>,
    /// Event transport.
    pub bus: Arc<dyn EventBus>,
    /// Best-effort session analytics sink.
    pub analytics: Arc<dyn PresenceAnalytics>,
}

/// The user service: command handlers, consumed-event handlers, and access
/// to the store and live views.
pub struct UserService {
    config: Config,
    domain: DomainConfig,
    env: UserEnvironment,
    store: Arc<UserStore>,
    presence: PresenceTracker,
    saga: SlugSaga,
}

impl UserService {
    /// Assemble the service from configuration and its environment.
    #[must_use]
    pub fn new(config: Config, domain: DomainConfig, env: UserEnvironment) -> Self {
        let store = Arc::new(UserStore::new(config.change_capacity));
        let presence = PresenceTracker::new(Arc::clone(&store), Arc::clone(&env.analytics));
        let saga = SlugSaga::new(Arc::clone(&env.slugs), domain.slug_policy.clone());
        Self {
            config,
            domain,
            env,
            store,
            presence,
            saga,
        }
    }

    /// The underlying aggregate store.
    #[must_use]
    pub fn store(&self) -> &Arc<UserStore> {
        &self.store
    }

    /// Live projected views over the store.
    #[must_use]
    pub fn views(&self) -> UserViews {
        UserViews::new(Arc::clone(&self.store), self.domain.clone())
    }

    /// Create a new user: allocate a slug, compute the display name, insert
    /// the aggregate, and emit `UserCreated`. Admin-gated.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without the admin role; slug or publish failures abort
    /// with nothing stored and nothing emitted.
    pub async fn create_user(&self, caller: &Caller, cmd: CreateUser) -> Result<UserId, UserError> {
        caller.require_admin()?;

        let id = self.env.ids.generate();
        let slug = self.saga.allocate(&id).await?;
        let display = cmd
            .display
            .unwrap_or_else(|| self.domain.display.display(&cmd.user_data, &cmd.login_methods));

        let mut user = User {
            id: id.clone(),
            display,
            roles: cmd.roles,
            login_methods: Vec::new(),
            user_data: Some(cmd.user_data),
            slug: Some(slug),
            online: false,
            last_online: None,
        };
        for method in cmd.login_methods {
            user.add_login_method(method);
        }

        self.publish(
            &self.config.user_topic,
            &UserEvent::UserCreated {
                user: id.clone(),
                data: Box::new(user.clone()),
            },
        )
        .await?;
        self.store.insert(user);

        tracing::info!(user = %id, "created user");
        metrics::counter!("users_created_total").increment(1);
        Ok(id)
    }

    /// Admin update: replace roles and/or merge a profile patch.
    ///
    /// Emits `UserUpdated` on the user topic; a roles change additionally
    /// emits `RolesUpdated` (with the previous roles) on the session topic.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without the admin role, `NotFound` for absent or
    /// deleted targets; slug or publish failures abort the command.
    pub async fn update_user(
        &self,
        caller: &Caller,
        target: &UserId,
        roles: Option<Vec<String>>,
        patch: Option<UserData>,
    ) -> Result<(), UserError> {
        caller.require_admin()?;
        self.apply_update(target, roles, patch).await
    }

    /// Self-service profile update.
    ///
    /// Only fields the domain declares self-updatable are accepted; runs the
    /// slug re-check and recomputes the display name like any other update.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for anonymous callers or non-self-updatable fields,
    /// `NotFound` if the caller's aggregate is gone.
    pub async fn update_own_data(&self, caller: &Caller, patch: UserData) -> Result<(), UserError> {
        let user = caller.require_user()?.clone();
        for (field, _) in patch.fields() {
            if !self.domain.self_updatable.contains(field.as_str()) {
                return Err(UserError::Unauthorized("field is not self-updatable"));
            }
        }
        self.apply_update(&user, None, Some(patch)).await
    }

    /// Delete the calling user's account.
    ///
    /// Tombstones the aggregate (the id is never reused) and emits
    /// `UserDeleted` on both topics so sessions get torn down.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for anonymous callers, `NotFound` if already gone.
    pub async fn delete_me(&self, caller: &Caller) -> Result<(), UserError> {
        let user = caller.require_user()?.clone();
        if !self.store.exists(&user) {
            return Err(UserError::NotFound(user));
        }

        self.publish(
            &self.config.user_topic,
            &UserEvent::UserDeleted { user: user.clone() },
        )
        .await?;
        self.publish(
            &self.config.session_topic,
            &SessionEvent::UserDeleted { user: user.clone() },
        )
        .await?;

        self.store.update_if_exists(&user, |u| {
            u.user_data = None;
            u.online = false;
        });
        tracing::info!(user = %user, "deleted user");
        metrics::counter!("users_deleted_total").increment(1);
        Ok(())
    }

    /// Handle a `login_method_added` event: addToSet by `(type, id)`, then
    /// recompute the display name. A duplicate delivery changes nothing.
    pub fn login_method_added(&self, user: &UserId, method: LoginMethod) {
        let display_policy = Arc::clone(&self.domain.display);
        self.store.update_if_exists(user, |u| {
            if u.add_login_method(method) {
                let data = u.user_data.clone().unwrap_or_default();
                u.display = display_policy.display(&data, &u.login_methods);
            }
        });
    }

    /// Handle a `login_method_removed` event: drop the matching method and
    /// recompute the display name, which may revert to an earlier value.
    pub fn login_method_removed(&self, user: &UserId, method: &LoginMethod) {
        let display_policy = Arc::clone(&self.domain.display);
        self.store.update_if_exists(user, |u| {
            if u.remove_login_method(&method.method_type, &method.id) {
                let data = u.user_data.clone().unwrap_or_default();
                u.display = display_policy.display(&data, &u.login_methods);
            }
        });
    }

    /// Mark a user online. Re-emits the event, then hands the transition to
    /// the presence tracker; suspends until the user exists, and resolves as
    /// a no-op if an offline cancels the intent while suspended.
    ///
    /// # Errors
    ///
    /// Fails only if the re-emission cannot be published.
    pub async fn user_online(&self, user: &UserId) -> Result<(), UserError> {
        let at = self.env.clock.now();
        self.publish(
            &self.config.user_topic,
            &UserEvent::UserOnline {
                user: user.clone(),
                last_online: at,
            },
        )
        .await?;
        self.presence.user_online(user, at).await;
        Ok(())
    }

    /// Mark a user offline, cancelling any suspended online intent for them.
    ///
    /// # Errors
    ///
    /// Fails only if the re-emission cannot be published.
    pub async fn user_offline(&self, user: &UserId) -> Result<(), UserError> {
        let at = self.env.clock.now();
        self.publish(
            &self.config.user_topic,
            &UserEvent::UserOffline {
                user: user.clone(),
                last_online: at,
            },
        )
        .await?;
        self.presence.user_offline(user, at).await;
        Ok(())
    }

    /// Force every online user offline and drop all pending online intents.
    ///
    /// # Errors
    ///
    /// Fails only if the re-emission cannot be published.
    pub async fn all_users_offline(&self) -> Result<(), UserError> {
        let at = self.env.clock.now();
        self.publish(
            &self.config.user_topic,
            &UserEvent::AllUsersOffline { last_online: at },
        )
        .await?;
        self.presence.all_users_offline(at).await;
        Ok(())
    }

    async fn apply_update(
        &self,
        target: &UserId,
        roles: Option<Vec<String>>,
        patch: Option<UserData>,
    ) -> Result<(), UserError> {
        let current = self
            .store
            .get(target)
            .filter(|u| !u.is_tombstoned())
            .ok_or_else(|| UserError::NotFound(target.clone()))?;

        let patch = patch.unwrap_or_default();
        let slug = self.saga.reassign_if_stale(&current, &patch).await?;
        let merged = current.merged_user_data(&patch);
        let display = self.domain.display.display(&merged, &current.login_methods);

        let update = UserUpdate {
            roles: roles.clone(),
            user_data: if patch.is_empty() {
                None
            } else {
                Some(patch.clone())
            },
            display: display.clone(),
            slug: Some(slug.clone()),
        };
        self.publish(
            &self.config.user_topic,
            &UserEvent::UserUpdated {
                user: target.clone(),
                data: update,
            },
        )
        .await?;
        if let Some(new_roles) = &roles {
            self.publish(
                &self.config.session_topic,
                &SessionEvent::RolesUpdated {
                    user: target.clone(),
                    roles: new_roles.clone(),
                    old_roles: current.roles.clone(),
                },
            )
            .await?;
        }

        self.store.update_if_exists(target, |u| {
            if let Some(new_roles) = roles {
                u.roles = new_roles;
            }
            if let Some(data) = u.user_data.as_mut() {
                data.merge(&patch);
            }
            u.display = display;
            u.slug = Some(slug);
        });
        metrics::counter!("users_updated_total").increment(1);
        Ok(())
    }

    async fn publish<E: Event + Serialize>(&self, topic: &str, event: &E) -> Result<(), UserError> {
        let serialized = SerializedEvent::from_event(event, None)?;
        self.env.bus.publish(topic, serialized).await?;
        Ok(())
    }
}
