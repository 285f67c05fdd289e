//! Field projection: shaping an aggregate into what a caller may see.
//!
//! A [`ProjectionSchema`] lists the profile fields a view exposes; [`project`]
//! applies it to an aggregate. Tombstoned aggregates project to nothing,
//! which is how deletion propagates through live views.

use crate::types::{Slug, User, UserId};
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Fields the engine always emits; schemas may not redefine them.
pub const RESERVED_FIELDS: &[&str] = &["id", "display", "slug", "online", "lastOnline"];

/// Errors raised while validating a projection schema.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// The schema names a field the engine emits itself.
    #[error("field '{0}' is reserved")]
    Reserved(String),

    /// The schema lists the same field twice.
    #[error("field '{0}' appears more than once")]
    Duplicate(String),
}

/// An ordered list of profile fields a view exposes, plus whether the view
/// may see presence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionSchema {
    fields: Vec<String>,
    presence: bool,
}

impl ProjectionSchema {
    /// Build a presence-visible schema from field names. Call
    /// [`ProjectionSchema::validate`] before use;
    /// [`crate::config::DomainConfig::new`] does so for you.
    #[must_use]
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            presence: true,
        }
    }

    /// Set whether projections through this schema carry `online` and
    /// `lastOnline`.
    #[must_use]
    pub fn with_presence(mut self, presence: bool) -> Self {
        self.presence = presence;
        self
    }

    /// The field names in emission order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether projections through this schema expose presence.
    #[must_use]
    pub const fn presence(&self) -> bool {
        self.presence
    }

    /// Check the schema for reserved names and duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Reserved`] or [`SchemaError::Duplicate`].
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if RESERVED_FIELDS.contains(&field.as_str()) {
                return Err(SchemaError::Reserved(field.clone()));
            }
            if !seen.insert(field.as_str()) {
                return Err(SchemaError::Duplicate(field.clone()));
            }
        }
        Ok(())
    }
}

/// A projected view of a user: built-in fields plus the schema's profile
/// fields in schema order. Absent profile fields project as `null`, so every
/// projection of the same schema has the same shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedUser {
    /// The user's id.
    pub id: UserId,
    /// Display name at projection time.
    pub display: String,
    /// The user's slug, if one is assigned.
    pub slug: Option<Slug>,
    /// Whether the user is currently online; absent when the schema hides
    /// presence.
    pub online: Option<bool>,
    /// Last recorded presence transition; absent when the schema hides
    /// presence.
    pub last_online: Option<DateTime<Utc>>,
    /// Schema fields in schema order, absent ones as `null`.
    pub fields: Vec<(String, serde_json::Value)>,
}

impl ProjectedUser {
    /// Look up a projected profile field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

// Serialized by hand so schema fields keep their declared order and sit
// alongside the built-ins in one flat object.
impl Serialize for ProjectedUser {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("display", &self.display)?;
        map.serialize_entry("slug", &self.slug)?;
        if let Some(online) = self.online {
            map.serialize_entry("online", &online)?;
            map.serialize_entry("lastOnline", &self.last_online)?;
        }
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Project a user aggregate through a schema.
///
/// Returns `None` for tombstoned aggregates: a user without profile data is
/// deleted as far as any view is concerned.
#[must_use]
pub fn project(user: &User, schema: &ProjectionSchema) -> Option<ProjectedUser> {
    let data = user.user_data.as_ref()?;
    let fields = schema
        .fields()
        .iter()
        .map(|name| {
            let value = data
                .get(name)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            (name.clone(), value)
        })
        .collect();
    Some(ProjectedUser {
        id: user.id.clone(),
        display: user.display.clone(),
        slug: user.slug.clone(),
        online: schema.presence().then_some(user.online),
        last_online: if schema.presence() {
            user.last_online
        } else {
            None
        },
        fields,
    })
}
