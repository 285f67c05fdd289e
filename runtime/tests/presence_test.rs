//! Presence race semantics: pending intents, cancellation, and the sweep.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Duration;
use common::{admin, as_user, default_domain, fixture};
use live_users_core::UserId;
use live_users_core::environment::Clock;
use live_users_runtime::CreateUser;

#[tokio::test]
async fn online_then_offline_ends_offline() {
    let fx = fixture(default_domain());
    let id = fx
        .service
        .create_user(&admin(), CreateUser::default())
        .await
        .unwrap();

    fx.service.user_online(&id).await.unwrap();
    assert!(fx.service.store().get(&id).unwrap().online);

    fx.clock.advance(Duration::minutes(5));
    fx.service.user_offline(&id).await.unwrap();

    let user = fx.service.store().get(&id).unwrap();
    assert!(!user.online);
    assert_eq!(user.last_online, Some(fx.clock.now()));
}

#[tokio::test]
async fn offline_cancels_online_still_waiting_for_creation() {
    let fx = fixture(default_domain());
    // The generator hands out ids sequentially, so the first create gets this.
    let id = UserId::from("user-1");

    let online = {
        let service = fx.service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.user_online(&id).await })
    };
    // Let the online handler register its intent and start waiting.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let offline = {
        let service = fx.service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.user_offline(&id).await })
    };
    // The offline handler drops the intent, then waits for creation too.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let created = fx
        .service
        .create_user(&admin(), CreateUser::default())
        .await
        .unwrap();
    assert_eq!(created, id);

    online.await.unwrap().unwrap();
    offline.await.unwrap().unwrap();
    assert!(
        !fx.service.store().get(&id).unwrap().online,
        "stale online write must be discarded"
    );
}

#[tokio::test]
async fn offline_before_create_still_lands_its_timestamp() {
    let fx = fixture(default_domain());
    let id = UserId::from("user-1");
    let at = fx.clock.now();

    let offline = {
        let service = fx.service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.user_offline(&id).await })
    };
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    fx.clock.advance(Duration::minutes(1));
    let created = fx
        .service
        .create_user(&admin(), CreateUser::default())
        .await
        .unwrap();
    assert_eq!(created, id);
    offline.await.unwrap().unwrap();

    let user = fx.service.store().get(&id).unwrap();
    assert!(!user.online);
    assert_eq!(
        user.last_online,
        Some(at),
        "the intended transition's timestamp must land after creation"
    );
}

#[tokio::test]
async fn sweep_clears_pending_intents_and_online_users() {
    let fx = fixture(default_domain());
    let existing = fx
        .service
        .create_user(&admin(), CreateUser::default())
        .await
        .unwrap();
    fx.service.user_online(&existing).await.unwrap();

    // An intent still waiting for a user that does not exist yet.
    let future_id = UserId::from("user-2");
    let pending = {
        let service = fx.service.clone();
        let id = future_id.clone();
        tokio::spawn(async move { service.user_online(&id).await })
    };
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    fx.service.all_users_offline().await.unwrap();
    assert!(!fx.service.store().get(&existing).unwrap().online);

    let created = fx
        .service
        .create_user(&admin(), CreateUser::default())
        .await
        .unwrap();
    assert_eq!(created, future_id);
    pending.await.unwrap().unwrap();
    assert!(
        !fx.service.store().get(&future_id).unwrap().online,
        "intents pending at sweep time must not resolve"
    );
}

#[tokio::test]
async fn completed_sessions_reach_analytics_best_effort() {
    let fx = fixture(default_domain());
    let id = fx
        .service
        .create_user(&admin(), CreateUser::default())
        .await
        .unwrap();

    let started = fx.clock.now();
    fx.service.user_online(&id).await.unwrap();
    fx.clock.advance(Duration::minutes(30));
    let ended = fx.clock.now();
    fx.service.user_offline(&id).await.unwrap();

    let samples = fx.analytics.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].user, id);
    assert_eq!(samples[0].started_at, started);
    assert_eq!(samples[0].ended_at, ended);

    // A failing sink never fails the transition.
    fx.analytics.fail_records(true);
    fx.service.user_online(&id).await.unwrap();
    fx.service.user_offline(&id).await.unwrap();
    assert!(!fx.service.store().get(&id).unwrap().online);
    assert_eq!(fx.analytics.samples().len(), 1);
}

#[tokio::test]
async fn presence_writes_against_deleted_users_are_absorbed() {
    let fx = fixture(default_domain());
    let id = fx
        .service
        .create_user(&admin(), CreateUser::default())
        .await
        .unwrap();
    fx.service.delete_me(&as_user(&id)).await.unwrap();

    fx.service.user_offline(&id).await.unwrap();
    let user = fx.service.store().get(&id).unwrap();
    assert!(user.is_tombstoned());
    assert_eq!(user.last_online, None);
}
