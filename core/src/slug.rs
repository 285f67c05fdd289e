//! The slug service seam.
//!
//! Slugs are human-readable handles owned by an external service. The user
//! service only ever talks to it through this trait: create a candidate,
//! take (claim) it, or redirect a stale handle at a fresh one.

use crate::types::{Slug, UserData, UserId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from the external slug service.
#[derive(Error, Debug)]
pub enum SlugServiceError {
    /// The service could not mint a candidate slug.
    #[error("slug creation failed for user '{user}': {reason}")]
    Create {
        /// The user the slug was for.
        user: UserId,
        /// Upstream failure description.
        reason: String,
    },

    /// The service refused the claim on an already-created slug.
    #[error("failed to take slug '{slug}': {reason}")]
    Take {
        /// The slug being claimed.
        slug: Slug,
        /// Upstream failure description.
        reason: String,
    },

    /// The service could not install a redirect.
    #[error("failed to redirect slug '{from}' to '{to}': {reason}")]
    Redirect {
        /// The stale slug.
        from: Slug,
        /// The replacement slug.
        to: Slug,
        /// Upstream failure description.
        reason: String,
    },

    /// The service was unreachable.
    #[error("slug service unavailable: {0}")]
    Unavailable(String),
}

/// Everything a slug policy may consult when deciding whether the current
/// slug still fits the user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlugContext {
    /// The user the slug belongs to.
    pub user: UserId,
    /// The user's merged profile document at decision time.
    pub user_data: UserData,
}

/// Decides whether an existing slug is still acceptable for a user.
///
/// The policy is domain configuration, not transport: it runs locally against
/// the [`SlugContext`] and never performs I/O.
pub trait SlugPolicy: Send + Sync {
    /// Returns `true` when `current` should be kept, `false` when the saga
    /// must mint a replacement.
    fn still_valid(&self, current: &Slug, ctx: &SlugContext) -> bool;
}

/// A policy that never invalidates a slug. Useful as a default for domains
/// whose handles are permanent.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepForever;

impl SlugPolicy for KeepForever {
    fn still_valid(&self, _current: &Slug, _ctx: &SlugContext) -> bool {
        true
    }
}

/// Client for the external slug service.
///
/// Dyn-compatible so the environment can hold a `Box<dyn SlugService>`.
pub trait SlugService: Send + Sync {
    /// Mint a candidate slug for a user within a namespace group.
    ///
    /// Creation reserves the handle upstream; the reservation only becomes
    /// meaningful once [`SlugService::take`] succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SlugServiceError::Create`] or
    /// [`SlugServiceError::Unavailable`] on failure.
    fn create(
        &self,
        group: &str,
        user: &UserId,
    ) -> Pin<Box<dyn Future<Output = Result<Slug, SlugServiceError>> + Send + '_>>;

    /// Claim a previously created slug for a user.
    ///
    /// # Errors
    ///
    /// Returns [`SlugServiceError::Take`] or
    /// [`SlugServiceError::Unavailable`] on failure.
    fn take(
        &self,
        group: &str,
        slug: &Slug,
        user: &UserId,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlugServiceError>> + Send + '_>>;

    /// Redirect a stale slug at its replacement within a namespace group.
    ///
    /// # Errors
    ///
    /// Returns [`SlugServiceError::Redirect`] or
    /// [`SlugServiceError::Unavailable`] on failure.
    fn redirect(
        &self,
        group: &str,
        from: &Slug,
        to: &Slug,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlugServiceError>> + Send + '_>>;
}
