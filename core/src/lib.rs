//! # Live Users Core
//!
//! Domain types and traits for the live-users service: a user aggregate whose
//! state is derived from an ordered stream of events, together with the seams
//! the coordination layer plugs into.
//!
//! ## Contents
//!
//! - [`types`]: the `User` aggregate and its value types (`UserId`, `Slug`,
//!   `LoginMethod`, `UserData`), including the tombstone rule for deleted
//!   aggregates.
//! - [`event`]: the `Event` trait, wire format, and the concrete event enums
//!   produced and consumed by the service.
//! - [`event_bus`]: publish/subscribe abstraction for cross-service event
//!   delivery (at-least-once).
//! - [`environment`]: injected dependencies: clock, id generation, and
//!   presence analytics.
//! - [`slug`]: the external slug-allocation service interface and the
//!   pluggable staleness policy.
//! - [`projection`]: the pure field-projection mapper deriving restricted,
//!   stable-shaped views from an aggregate.
//! - [`config`]: startup-validated domain configuration (field whitelists,
//!   display policy, slug policy).
//! - [`error`]: command error kinds.
//!
//! ## Design
//!
//! Everything here is a value type or a trait; no I/O happens in this crate.
//! The coordination runtime (`live-users-runtime`) owns the mutable state and
//! the race/ordering logic, and drives these types through injected
//! dependencies so every piece is testable with the mocks in
//! `live-users-testing`.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod projection;
pub mod slug;
pub mod types;

pub use config::DomainConfig;
pub use error::UserError;
pub use event::{Event, SessionEvent, UserEvent};
pub use projection::{ProjectedUser, ProjectionSchema, project};
pub use types::{LoginMethod, Slug, User, UserData, UserId};
