//! Domain configuration.
//!
//! Everything product-specific about users lives here: which fields each
//! view exposes, which fields the user may edit themselves, how display
//! names are derived, and when a slug goes stale. The service layer treats
//! this as opaque policy. Configs are validated once at startup and passed
//! explicitly.

use crate::projection::{ProjectionSchema, SchemaError};
use crate::slug::SlugPolicy;
use crate::types::{LoginMethod, UserData};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Derives a user's display name from their profile document and login
/// methods.
pub trait DisplayPolicy: Send + Sync {
    /// Compute the display name. Must always return something presentable,
    /// falling back to a placeholder when nothing usable exists.
    fn display(&self, user_data: &UserData, login_methods: &[LoginMethod]) -> String;
}

/// Default display policy: the email of the first login method that carries
/// one, then a fixed placeholder.
#[derive(Clone, Debug)]
pub struct DefaultDisplay {
    /// Placeholder used when no login method yields an email.
    pub fallback: String,
}

impl Default for DefaultDisplay {
    fn default() -> Self {
        Self {
            fallback: "unknown".to_string(),
        }
    }
}

impl DisplayPolicy for DefaultDisplay {
    fn display(&self, _user_data: &UserData, login_methods: &[LoginMethod]) -> String {
        for method in login_methods {
            if let Some(serde_json::Value::String(email)) = method.extra.get("email") {
                if !email.is_empty() {
                    return email.clone();
                }
            }
            // Email-password methods key on the address itself.
            if method.method_type == "emailPassword" && !method.id.is_empty() {
                return method.id.clone();
            }
        }
        self.fallback.clone()
    }
}

/// Errors raised while validating domain configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A projection schema is invalid.
    #[error("invalid '{view}' projection schema: {source}")]
    Schema {
        /// The offending view (`"public"`, `"me"`, or a private view name).
        view: String,
        /// The underlying schema error.
        #[source]
        source: SchemaError,
    },

    /// A private view reuses a reserved view name.
    #[error("private view name '{0}' is reserved")]
    ReservedViewName(String),
}

/// Product-specific policy bundle for the user service.
#[derive(Clone)]
pub struct DomainConfig {
    /// Fields exposed to anyone via the public view.
    pub public_schema: ProjectionSchema,
    /// Fields the user sees about themselves via `me`.
    pub me_schema: ProjectionSchema,
    /// Additional named views, each with its own whitelist, scoped to the
    /// caller's own identity.
    pub private_views: BTreeMap<String, ProjectionSchema>,
    /// Profile fields the user may write through self-service updates.
    pub self_updatable: HashSet<String>,
    /// How display names are derived.
    pub display: Arc<dyn DisplayPolicy>,
    /// When an existing slug should be replaced. `None` means slugs are
    /// permanent after creation.
    pub slug_policy: Option<Arc<dyn SlugPolicy>>,
}

impl DomainConfig {
    /// Start building a config from the two mandatory views.
    ///
    /// `online_public` gates presence fields in the public projection; the
    /// `me` view always sees presence.
    #[must_use]
    pub fn builder(
        public_fields: Vec<String>,
        required_fields: Vec<String>,
        online_public: bool,
    ) -> DomainConfigBuilder {
        DomainConfigBuilder {
            public_schema: ProjectionSchema::new(public_fields).with_presence(online_public),
            me_schema: ProjectionSchema::new(required_fields),
            private_views: BTreeMap::new(),
            self_updatable: HashSet::new(),
            display: Arc::new(DefaultDisplay::default()),
            slug_policy: None,
        }
    }
}

impl std::fmt::Debug for DomainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainConfig")
            .field("public_schema", &self.public_schema)
            .field("me_schema", &self.me_schema)
            .field("private_views", &self.private_views)
            .field("self_updatable", &self.self_updatable)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DomainConfig`]; [`DomainConfigBuilder::build`] validates
/// every schema.
pub struct DomainConfigBuilder {
    public_schema: ProjectionSchema,
    me_schema: ProjectionSchema,
    private_views: BTreeMap<String, ProjectionSchema>,
    self_updatable: HashSet<String>,
    display: Arc<dyn DisplayPolicy>,
    slug_policy: Option<Arc<dyn SlugPolicy>>,
}

impl DomainConfigBuilder {
    /// Add a named private view.
    #[must_use]
    pub fn private_view(mut self, name: impl Into<String>, fields: Vec<String>) -> Self {
        self.private_views
            .insert(name.into(), ProjectionSchema::new(fields));
        self
    }

    /// Declare the profile fields writable through self-service updates.
    #[must_use]
    pub fn self_updatable(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.self_updatable = fields.into_iter().collect();
        self
    }

    /// Replace the display policy.
    #[must_use]
    pub fn display(mut self, policy: Arc<dyn DisplayPolicy>) -> Self {
        self.display = policy;
        self
    }

    /// Install a slug staleness policy; without one, slugs never change
    /// after creation.
    #[must_use]
    pub fn slug_policy(mut self, policy: Arc<dyn SlugPolicy>) -> Self {
        self.slug_policy = Some(policy);
        self
    }

    /// Validate all schemas and produce the config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Schema`] if any schema names a reserved field
    /// or contains duplicates, or [`ConfigError::ReservedViewName`] if a
    /// private view shadows a built-in view.
    pub fn build(self) -> Result<DomainConfig, ConfigError> {
        self.public_schema
            .validate()
            .map_err(|source| ConfigError::Schema {
                view: "public".to_string(),
                source,
            })?;
        self.me_schema
            .validate()
            .map_err(|source| ConfigError::Schema {
                view: "me".to_string(),
                source,
            })?;
        for (name, schema) in &self.private_views {
            if name == "public" || name == "me" {
                return Err(ConfigError::ReservedViewName(name.clone()));
            }
            schema.validate().map_err(|source| ConfigError::Schema {
                view: name.clone(),
                source,
            })?;
        }
        Ok(DomainConfig {
            public_schema: self.public_schema,
            me_schema: self.me_schema,
            private_views: self.private_views,
            self_updatable: self.self_updatable,
            display: self.display,
            slug_policy: self.slug_policy,
        })
    }
}
