//! The user aggregate and its value types.
//!
//! A [`User`] is the authoritative materialized state for one user, derived
//! from applied events. The aggregate is considered deleted (a tombstone)
//! when its [`UserData`] sub-document is absent; downstream projections must
//! treat that as "no user", never as "user with empty data".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque unique identifier for a user aggregate.
///
/// Assigned once at creation and never reused, even after the aggregate is
/// deleted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wrap an existing identifier.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self(id)
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Globally-unique human-readable path identifier for a user.
///
/// Owned by the aggregate but allocated and redirected through the external
/// slug service; at most one slug is live for a user at any time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    /// Wrap an allocated slug value.
    #[must_use]
    pub const fn new(slug: String) -> Self {
        Self(slug)
    }

    /// The slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Slug {
    fn from(slug: &str) -> Self {
        Self(slug.to_string())
    }
}

/// A login method attached to a user.
///
/// Login methods form a set keyed by `(type, id)`; any extra fields (such as
/// the e-mail address for an `emailPassword` method) are carried verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginMethod {
    /// Method kind, e.g. `"emailPassword"`.
    #[serde(rename = "type")]
    pub method_type: String,
    /// Method-scoped identifier, e.g. the e-mail address for e-mail login.
    pub id: String,
    /// Additional method data, carried as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LoginMethod {
    /// Create a login method with no extra data.
    #[must_use]
    pub fn new(method_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            method_type: method_type.into(),
            id: id.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an extra field to the method.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Set identity: two methods are the same set member when both the type
    /// and the method-scoped id match, regardless of extra data.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        self.method_type == other.method_type && self.id == other.id
    }
}

/// The open-ended, deployment-configurable part of the aggregate.
///
/// Stored as a JSON object so each deployment can declare its own fields
/// (e-mail, profile data, ...), patchable field by field.
///
/// # Examples
///
/// ```
/// use live_users_core::types::UserData;
/// use serde_json::json;
///
/// let mut data = UserData::new();
/// data.set("name", json!("Ada"));
///
/// let mut patch = UserData::new();
/// patch.set("bio", json!("mathematician"));
/// data.merge(&patch);
///
/// assert_eq!(data.get("name"), Some(&json!("Ada")));
/// assert_eq!(data.get("bio"), Some(&json!("mathematician")));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData(serde_json::Map<String, serde_json::Value>);

impl UserData {
    /// Create an empty sub-document.
    #[must_use]
    pub fn new() -> Self {
        Self(serde_json::Map::new())
    }

    /// Build from a JSON value; returns `None` when the value is not an
    /// object.
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Read a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// Write a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: serde_json::Value) {
        self.0.insert(field.into(), value);
    }

    /// Overlay `patch` onto this document, field by field.
    pub fn merge(&mut self, patch: &Self) {
        for (field, value) in &patch.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Iterate the fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Whether the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The materialized user aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque id, immutable after creation.
    pub id: UserId,
    /// Derived display name, recomputed whenever identity data changes.
    pub display: String,
    /// Authorization-relevant role strings; admin-gated updates only.
    pub roles: Vec<String>,
    /// Login methods, a set keyed by `(type, id)`.
    pub login_methods: Vec<LoginMethod>,
    /// Domain sub-document; `None` marks the aggregate as tombstoned.
    pub user_data: Option<UserData>,
    /// Currently-live human-readable slug.
    pub slug: Option<Slug>,
    /// Presence flag reflecting the most recently intended transition.
    pub online: bool,
    /// Timestamp of the last known presence transition.
    pub last_online: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the aggregate counts as deleted for projection purposes.
    #[must_use]
    pub const fn is_tombstoned(&self) -> bool {
        self.user_data.is_none()
    }

    /// Add a login method with set semantics: a method whose `(type, id)`
    /// pair is already present is not added again. Returns whether the set
    /// changed.
    pub fn add_login_method(&mut self, method: LoginMethod) -> bool {
        if self.login_methods.iter().any(|m| m.same_key(&method)) {
            return false;
        }
        self.login_methods.push(method);
        true
    }

    /// Remove every login method matching the `(type, id)` pair. Returns
    /// whether anything was removed.
    pub fn remove_login_method(&mut self, method_type: &str, id: &str) -> bool {
        let before = self.login_methods.len();
        self.login_methods
            .retain(|m| !(m.method_type == method_type && m.id == id));
        self.login_methods.len() != before
    }

    /// The user data as it would look with `patch` applied, without mutating
    /// the aggregate. Used to evaluate slug staleness and recompute the
    /// display name before a command commits.
    #[must_use]
    pub fn merged_user_data(&self, patch: &UserData) -> UserData {
        let mut merged = self.user_data.clone().unwrap_or_default();
        merged.merge(patch);
        merged
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn blank_user() -> User {
        User {
            id: UserId::from("u1"),
            display: "unknown".to_string(),
            roles: Vec::new(),
            login_methods: Vec::new(),
            user_data: Some(UserData::new()),
            slug: None,
            online: false,
            last_online: None,
        }
    }

    #[test]
    fn login_method_set_ignores_duplicate_key() {
        let mut user = blank_user();
        let method = LoginMethod::new("emailPassword", "a@b.com")
            .with_extra("email", json!("a@b.com"));

        assert!(user.add_login_method(method.clone()));
        // Same (type, id) with different extra data is still the same member.
        let dup = LoginMethod::new("emailPassword", "a@b.com");
        assert!(!user.add_login_method(dup));
        assert_eq!(user.login_methods.len(), 1);
        assert_eq!(user.login_methods[0].extra.get("email"), Some(&json!("a@b.com")));
    }

    #[test]
    fn login_method_remove_deletes_matching_pair_only() {
        let mut user = blank_user();
        user.add_login_method(LoginMethod::new("emailPassword", "a@b.com"));
        user.add_login_method(LoginMethod::new("oauth", "a@b.com"));

        assert!(user.remove_login_method("emailPassword", "a@b.com"));
        assert_eq!(user.login_methods.len(), 1);
        assert_eq!(user.login_methods[0].method_type, "oauth");
        assert!(!user.remove_login_method("emailPassword", "a@b.com"));
    }

    #[test]
    fn tombstone_is_absent_user_data() {
        let mut user = blank_user();
        assert!(!user.is_tombstoned());
        user.user_data = None;
        assert!(user.is_tombstoned());
    }

    #[test]
    fn merged_user_data_does_not_mutate() {
        let mut user = blank_user();
        let mut data = UserData::new();
        data.set("name", json!("Ada"));
        user.user_data = Some(data);

        let mut patch = UserData::new();
        patch.set("name", json!("Grace"));
        let merged = user.merged_user_data(&patch);

        assert_eq!(merged.get("name"), Some(&json!("Grace")));
        assert_eq!(
            user.user_data.as_ref().unwrap().get("name"),
            Some(&json!("Ada"))
        );
    }

    #[test]
    fn merged_user_data_on_tombstone_is_just_the_patch() {
        let mut user = blank_user();
        user.user_data = None;
        let mut patch = UserData::new();
        patch.set("name", json!("Ada"));
        assert_eq!(user.merged_user_data(&patch), patch);
    }

    proptest! {
        // Arbitrary interleavings of add/remove over a small key space never
        // produce a duplicate (type, id) pair.
        #[test]
        fn no_duplicate_pairs_under_interleaved_add_remove(
            ops in proptest::collection::vec((0u8..2, 0u8..3, 0u8..3), 0..40)
        ) {
            let mut user = blank_user();
            for (op, ty, id) in ops {
                let method_type = format!("type-{ty}");
                let id = format!("id-{id}");
                if op == 0 {
                    user.add_login_method(LoginMethod::new(method_type, id));
                } else {
                    user.remove_login_method(&method_type, &id);
                }
            }
            for (i, a) in user.login_methods.iter().enumerate() {
                for b in &user.login_methods[i + 1..] {
                    prop_assert!(!a.same_key(b));
                }
            }
        }
    }
}
