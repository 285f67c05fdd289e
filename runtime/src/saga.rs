//! Slug assignment saga.
//!
//! Coordinates the two-step create-then-take sequence against the external
//! slug service, and on profile changes re-checks the current slug against
//! the domain policy, installing a redirect from the stale handle when it
//! gets replaced.

use live_users_core::slug::{SlugContext, SlugPolicy, SlugService, SlugServiceError};
use live_users_core::{Slug, User, UserData, UserId};
use std::sync::Arc;

/// Namespace group for user slugs at the slug service.
pub const SLUG_GROUP: &str = "user";

/// Orchestrates slug allocation and reassignment.
pub struct SlugSaga {
    slugs: Arc<dyn SlugService>,
    policy: Option<Arc<dyn SlugPolicy>>,
}

impl SlugSaga {
    /// Create a saga over a slug service client and the domain's staleness
    /// policy. Without a policy, slugs are permanent once assigned.
    #[must_use]
    pub fn new(slugs: Arc<dyn SlugService>, policy: Option<Arc<dyn SlugPolicy>>) -> Self {
        Self { slugs, policy }
    }

    /// Allocate a slug for a brand-new user: create a candidate, then claim
    /// it.
    ///
    /// # Errors
    ///
    /// Propagates the first failing step. A failed take leaves the created
    /// reservation orphaned upstream; that is logged and accepted, since the
    /// whole command aborts and the candidate was never visible locally.
    pub async fn allocate(&self, user: &UserId) -> Result<Slug, SlugServiceError> {
        let slug = self.slugs.create(SLUG_GROUP, user).await?;
        if let Err(error) = self.slugs.take(SLUG_GROUP, &slug, user).await {
            tracing::warn!(user = %user, slug = %slug, %error, "take failed, reservation orphaned");
            metrics::counter!("slug_orphaned_reservations_total").increment(1);
            return Err(error);
        }
        metrics::counter!("slug_allocations_total").increment(1);
        tracing::debug!(user = %user, slug = %slug, "allocated slug");
        Ok(slug)
    }

    /// Re-check a user's slug against the profile as it will look once
    /// `patch` is applied, replacing the slug if the domain policy says it
    /// no longer fits.
    ///
    /// Returns the slug the user should carry afterwards. A user with no
    /// slug gets a fresh allocation; a still-valid slug is kept untouched.
    ///
    /// # Errors
    ///
    /// Propagates any slug service failure, aborting the triggering command.
    /// A failed redirect leaves the already-claimed replacement orphaned
    /// upstream while the user keeps the old slug, which stays live; the
    /// old handle is never left pointing nowhere.
    pub async fn reassign_if_stale(
        &self,
        user: &User,
        patch: &UserData,
    ) -> Result<Slug, SlugServiceError> {
        let Some(current) = user.slug.clone() else {
            return self.allocate(&user.id).await;
        };
        let Some(policy) = &self.policy else {
            return Ok(current);
        };

        let ctx = SlugContext {
            user: user.id.clone(),
            user_data: user.merged_user_data(patch),
        };
        if policy.still_valid(&current, &ctx) {
            return Ok(current);
        }

        let replacement = self.allocate(&user.id).await?;
        if let Err(error) = self.slugs.redirect(SLUG_GROUP, &current, &replacement).await {
            tracing::warn!(
                user = %user.id,
                kept = %current,
                orphaned = %replacement,
                %error,
                "redirect failed, aborting with the old slug still live"
            );
            metrics::counter!("slug_redirect_errors_total").increment(1);
            return Err(error);
        }
        metrics::counter!("slug_redirects_total").increment(1);
        Ok(replacement)
    }
}
