//! Shared fixture wiring the service to in-memory doubles.

// Not every test binary uses every helper.
#![allow(dead_code)]

use live_users_core::DomainConfig;
use live_users_core::UserId;
use live_users_runtime::{Caller, Config, UserEnvironment, UserService};
use live_users_testing::{
    FixedClock, InMemoryEventBus, InMemorySlugService, RecordingAnalytics, SequentialIds,
    test_clock,
};
use std::sync::Arc;

pub struct Fixture {
    pub service: Arc<UserService>,
    pub bus: Arc<InMemoryEventBus>,
    pub slugs: Arc<InMemorySlugService>,
    pub analytics: Arc<RecordingAnalytics>,
    pub clock: Arc<FixedClock>,
}

pub fn fixture(domain: DomainConfig) -> Fixture {
    live_users_testing::init_tracing();
    let bus = Arc::new(InMemoryEventBus::new());
    let slugs = Arc::new(InMemorySlugService::new());
    let analytics = Arc::new(RecordingAnalytics::new());
    let clock = Arc::new(test_clock());
    let env = UserEnvironment {
        clock: clock.clone(),
        ids: Arc::new(SequentialIds::new()),
        slugs: slugs.clone(),
        bus: bus.clone(),
        analytics: analytics.clone(),
    };
    Fixture {
        service: Arc::new(UserService::new(Config::default(), domain, env)),
        bus,
        slugs,
        analytics,
        clock,
    }
}

pub fn default_domain() -> DomainConfig {
    DomainConfig::builder(
        vec!["bio".to_string()],
        vec!["bio".to_string(), "email".to_string()],
        true,
    )
    .self_updatable(["bio".to_string(), "name".to_string()])
    .private_view("settings", vec!["theme".to_string()])
    .build()
    .expect("valid test domain config")
}

pub fn admin() -> Caller {
    Caller::authenticated(UserId::from("root"), vec!["admin".to_string()])
}

pub fn as_user(id: &UserId) -> Caller {
    Caller::authenticated(id.clone(), Vec::new())
}
