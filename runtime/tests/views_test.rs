//! Live view behavior: snapshots, change pairs, and deletion.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{admin, as_user, default_domain, fixture};
use futures::StreamExt;
use live_users_core::{DomainConfig, UserData};
use live_users_runtime::{Caller, CreateUser};

fn create_cmd(bio: &str) -> CreateUser {
    let mut user_data = UserData::new();
    user_data.set("bio", serde_json::json!(bio));
    CreateUser {
        user_data,
        ..CreateUser::default()
    }
}

#[tokio::test]
async fn deletion_emits_a_none_projection_never_a_partial_one() {
    let fx = fixture(default_domain());
    let id = fx
        .service
        .create_user(&admin(), create_cmd("hello"))
        .await
        .unwrap();

    let mut view = fx.service.views().public_user_data(&id);
    assert!(view.initial.is_some());

    fx.service.delete_me(&as_user(&id)).await.unwrap();

    let (new, old) = view.changes.next().await.unwrap();
    assert!(new.is_none());
    let old = old.unwrap();
    assert_eq!(old.field("bio"), Some(&serde_json::json!("hello")));
}

#[tokio::test]
async fn me_requires_authentication() {
    let fx = fixture(default_domain());
    assert!(fx.service.views().me(&Caller::anonymous()).is_none());

    let id = fx
        .service
        .create_user(&admin(), create_cmd("hi"))
        .await
        .unwrap();
    let view = fx.service.views().me(&as_user(&id)).unwrap();
    let initial = view.initial.unwrap();
    assert_eq!(initial.id, id);
    // Absent whitelisted fields keep the shape stable as null.
    assert_eq!(initial.field("email"), Some(&serde_json::Value::Null));
}

#[tokio::test]
async fn private_views_are_name_scoped() {
    let fx = fixture(default_domain());
    let id = fx
        .service
        .create_user(&admin(), create_cmd("hi"))
        .await
        .unwrap();

    let caller = as_user(&id);
    assert!(fx.service.views().private_view(&caller, "settings").is_some());
    assert!(fx.service.views().private_view(&caller, "nope").is_none());
    assert!(
        fx.service
            .views()
            .private_view(&Caller::anonymous(), "settings")
            .is_none()
    );
}

#[tokio::test]
async fn public_presence_is_gated_by_domain_config() {
    let hidden = DomainConfig::builder(vec!["bio".to_string()], vec![], false)
        .build()
        .unwrap();
    let fx = fixture(hidden);
    let id = fx
        .service
        .create_user(&admin(), create_cmd("hi"))
        .await
        .unwrap();
    fx.service.user_online(&id).await.unwrap();

    let public = fx.service.views().public_user_data(&id).initial.unwrap();
    assert_eq!(public.online, None);

    let me = fx.service.views().me(&as_user(&id)).unwrap().initial.unwrap();
    assert_eq!(me.online, Some(true));
}

#[tokio::test]
async fn view_streams_follow_profile_updates() {
    let fx = fixture(default_domain());
    let id = fx
        .service
        .create_user(&admin(), create_cmd("before"))
        .await
        .unwrap();

    let mut view = fx.service.views().public_user_data(&id);
    let mut patch = UserData::new();
    patch.set("bio", serde_json::json!("after"));
    fx.service
        .update_user(&admin(), &id, None, Some(patch))
        .await
        .unwrap();

    let (new, old) = view.changes.next().await.unwrap();
    assert_eq!(
        new.unwrap().field("bio"),
        Some(&serde_json::json!("after"))
    );
    assert_eq!(
        old.unwrap().field("bio"),
        Some(&serde_json::json!("before"))
    );
}
