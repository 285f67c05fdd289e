//! Runtime for the live users service.
//!
//! Wires the domain model from `live-users-core` into a running service:
//! an in-memory aggregate store with change notification, the presence
//! tracker with its pending-intent cancellation set, the slug assignment
//! saga, the command handlers, and live projected views.

pub mod config;
pub mod presence;
pub mod saga;
pub mod service;
pub mod store;
pub mod views;

pub use config::Config;
pub use presence::PresenceTracker;
pub use saga::SlugSaga;
pub use service::{Caller, CreateUser, UserEnvironment, UserService};
pub use store::{UserChange, UserStore};
pub use views::{LiveView, UserViews};
