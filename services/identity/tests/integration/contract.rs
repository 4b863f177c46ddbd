//! Behavior every `IdentityStore` backend must share. Each check takes a
//! freshly built store; `contract_tests!` runs all of them per backend.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use uuid::Uuid;

use warden_core::{Ctx, Interrupted};
use warden_domain::email::email_domain;
use warden_domain::link::LinkType;
use warden_domain::oauth::OAuthResource;
use warden_domain::pagination::PageRequest;
use warden_domain::user::UserRole;
use warden_identity::{Entity, IdentityStore, Link, Profile, ProfileData, StoreError, Token};

use crate::helpers::{ctx, data, new_user, saved_profile, saved_user};

// ── Links ────────────────────────────────────────────────────────────────────

pub async fn link_supersession<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;

    let first = store
        .create_link(&ctx(), LinkType::Confirm, Duration::hours(24), &user)
        .await
        .unwrap();
    let second = store
        .create_link(&ctx(), LinkType::Confirm, Duration::hours(24), &user)
        .await
        .unwrap();
    assert_ne!(first.link, second.link);

    let current = store
        .get_link_for_user(&ctx(), LinkType::Confirm, &user)
        .await
        .unwrap();
    assert_eq!(current.link, second.link);
    assert_eq!(current.user.id, user.id);

    let err = store
        .get_link_from_string(&ctx(), &first.link)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "superseded link must be unusable, got {err:?}");

    let links = store.get_user_links(&ctx(), &user).await.unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].link, second.link, "newest link first");
    assert!(links[0].is_active);
    assert!(!links[1].is_active);
}

pub async fn link_kinds_are_independent<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    let confirm = store
        .create_link(&ctx(), LinkType::Confirm, Duration::hours(1), &user)
        .await
        .unwrap();
    store
        .create_link(&ctx(), LinkType::PasswordChange, Duration::hours(1), &user)
        .await
        .unwrap();

    let still = store
        .get_link_for_user(&ctx(), LinkType::Confirm, &user)
        .await
        .unwrap();
    assert_eq!(still.link, confirm.link);
    assert_eq!(still.kind, LinkType::Confirm);
}

pub async fn expired_link_is_unusable<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    let link = store
        .create_link(&ctx(), LinkType::Delete, Duration::minutes(-1), &user)
        .await
        .unwrap();
    assert!(!link.is_usable());

    let by_user = store
        .get_link_for_user(&ctx(), LinkType::Delete, &user)
        .await;
    assert!(matches!(by_user, Err(StoreError::NotFound(Entity::Link))));
    let by_value = store.get_link_from_string(&ctx(), &link.link).await;
    assert!(matches!(by_value, Err(StoreError::NotFound(Entity::Link))));

    let all = store.get_user_links(&ctx(), &user).await.unwrap();
    assert_eq!(all.len(), 1, "expired links stay on record");
}

pub async fn consumed_link_is_unusable<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    let link = store
        .create_link(&ctx(), LinkType::Confirm, Duration::hours(1), &user)
        .await
        .unwrap();

    let sent_at = Utc::now();
    let consumed = Link {
        is_active: false,
        sent_at: Some(sent_at),
        ..link.clone()
    };
    store.update_link(&ctx(), &consumed).await.unwrap();

    let err = store
        .get_link_for_user(&ctx(), LinkType::Confirm, &user)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let stored = store.get_user_links(&ctx(), &user).await.unwrap();
    assert!(!stored[0].is_active);
    assert!(stored[0].sent_at.is_some());
}

// ── Tokens ───────────────────────────────────────────────────────────────────

pub async fn token_rotation<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;

    let first = store.create_token(&ctx(), &user, "session-1").await.unwrap();
    let second = store.create_token(&ctx(), &user, "session-1").await.unwrap();
    assert_ne!(first.token, second.token);

    let current = store
        .get_token_by_session_id(&ctx(), "session-1")
        .await
        .unwrap();
    assert_eq!(current.token, second.token);
    assert!(current.is_usable());

    let err = store.get_token_object(&ctx(), &first.token).await.unwrap_err();
    assert!(err.is_not_found(), "rotated token must be gone, got {err:?}");

    let by_value = store.get_token_object(&ctx(), &second.token).await.unwrap();
    assert_eq!(by_value.session_id, "session-1");
    assert_eq!(by_value.user.id, user.id);
}

pub async fn token_logout<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    let kept = store.create_token(&ctx(), &user, "session-1").await.unwrap();
    let dropped = store.create_token(&ctx(), &user, "session-2").await.unwrap();

    let deactivated = Token {
        is_active: false,
        ..kept.clone()
    };
    store.update_token(&ctx(), &deactivated).await.unwrap();
    assert!(store.get_token_object(&ctx(), &kept.token).await.is_err());

    store.delete_token(&ctx(), &dropped.token).await.unwrap();
    let again = store.delete_token(&ctx(), &dropped.token).await;
    assert!(matches!(again, Err(StoreError::NotFound(Entity::Token))));
}

pub async fn token_session_clash<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    store.create_token(&ctx(), &user, "session-1").await.unwrap();
    let other = store.create_token(&ctx(), &user, "session-2").await.unwrap();

    let moved = Token {
        session_id: "session-1".to_owned(),
        ..other
    };
    let err = store.update_token(&ctx(), &moved).await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");
}

// ── Transactions ─────────────────────────────────────────────────────────────

pub async fn rollback_discards_all_writes<S: IdentityStore>(store: &S) {
    let ctx = ctx();
    let result: Result<(), StoreError> = store
        .transactional(&ctx, |ctx, tx| {
            Box::pin(async move {
                let mut user = new_user("ghost");
                tx.create_user(ctx, &mut user).await?;
                let mut profile = Profile::new(user, "ref", "rw", data(&[("k", "v")]));
                tx.create_profile(ctx, &mut profile).await?;
                Err(StoreError::Aborted(anyhow::anyhow!("registration aborted")))
            })
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), "ABORTED");

    let lookup = store.get_user_by_login(&ctx, "ghost").await;
    assert!(matches!(lookup, Err(StoreError::NotFound(Entity::User))));
    let profiles: Vec<Profile> = store
        .get_all_profiles(&ctx, PageRequest::new(10, 0))
        .await
        .unwrap();
    assert!(profiles.is_empty());
}

pub async fn commit_makes_all_writes_visible<S: IdentityStore>(store: &S) {
    let ctx = ctx();
    let (user, profile_id, link) = store
        .transactional(&ctx, |ctx, tx| {
            Box::pin(async move {
                let mut user = new_user("bob");
                tx.create_user(ctx, &mut user).await?;
                let mut profile = Profile::new(user.clone(), "ref", "rw", data(&[("k", "v")]));
                tx.create_profile(ctx, &mut profile).await?;
                let link = tx
                    .create_link(ctx, LinkType::Confirm, Duration::hours(24), &user)
                    .await?;
                Ok((user, profile.id, link))
            })
        })
        .await
        .unwrap();

    let fetched = store.get_user_by_id(&ctx, user.id).await.unwrap();
    assert_eq!(fetched, user);
    let profile: Profile = store.get_profile_by_user(&ctx, &user).await.unwrap();
    assert_eq!(profile.id, profile_id);
    let current = store
        .get_link_for_user(&ctx, LinkType::Confirm, &user)
        .await
        .unwrap();
    assert_eq!(current.link, link.link);
}

pub async fn nested_rollback_keeps_outer_work<S: IdentityStore>(store: &S) {
    let ctx = ctx();
    let user = store
        .transactional(&ctx, |ctx, tx| {
            Box::pin(async move {
                let mut user = new_user("carol");
                tx.create_user(ctx, &mut user).await?;

                let owner = user.clone();
                let inner: Result<(), StoreError> = tx
                    .transactional(ctx, move |ctx, inner| {
                        Box::pin(async move {
                            let mut profile = Profile::new(owner, "ref", "rw", data(&[]));
                            inner.create_profile(ctx, &mut profile).await?;
                            Err(StoreError::Aborted(anyhow::anyhow!("inner step failed")))
                        })
                    })
                    .await;
                assert!(inner.is_err());
                Ok(user)
            })
        })
        .await
        .unwrap();

    store.get_user_by_id(&ctx, user.id).await.unwrap();
    let profile: Result<Profile, _> = store.get_profile_by_user(&ctx, &user).await;
    assert!(matches!(profile, Err(StoreError::NotFound(Entity::Profile))));
}

// ── Profiles ─────────────────────────────────────────────────────────────────

pub async fn empty_profile_page<S: IdentityStore>(store: &S) {
    let page: Vec<Profile> = store
        .get_all_profiles(&ctx(), PageRequest::new(10, 0))
        .await
        .unwrap();
    assert!(page.is_empty());
}

pub async fn profile_data_round_trip<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    let created = saved_profile(store, &user).await;
    assert!(!created.id.is_nil());

    let fetched: Profile = store.get_profile_by_id(&ctx(), created.id).await.unwrap();
    assert_eq!(fetched.data, data(&[("k", "v")]));
    assert_eq!(fetched.user, user);
    assert_eq!(fetched.referral, "ref");

    let all: Vec<Profile> = store
        .get_all_profiles(&ctx(), PageRequest::new(10, 0))
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, created.id);
}

pub async fn profile_update_replaces_fields<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    let mut profile = saved_profile(store, &user).await;

    profile.access = "ro".to_owned();
    profile.data = data(&[("theme", "dark")]);
    store.update_profile(&ctx(), &profile).await.unwrap();

    let fetched: Profile = store.get_profile_by_user(&ctx(), &user).await.unwrap();
    assert_eq!(fetched.access, "ro");
    assert_eq!(fetched.data, data(&[("theme", "dark")]));
}

pub async fn unserializable_profile_data_writes_nothing<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    let mut bad: HashMap<(i32, i32), String> = HashMap::new();
    bad.insert((1, 2), "non-string key".to_owned());
    let mut profile = Profile::new(user.clone(), "ref", "rw", bad);

    let err = store.create_profile(&ctx(), &mut profile).await.unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)), "got {err:?}");

    let lookup: Result<Profile, _> = store.get_profile_by_user(&ctx(), &user).await;
    assert!(matches!(lookup, Err(StoreError::NotFound(Entity::Profile))));
}

pub async fn one_profile_per_user<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    saved_profile(store, &user).await;

    let mut second = Profile::new(user, "ref", "rw", ProfileData::new());
    let err = store.create_profile(&ctx(), &mut second).await.unwrap_err();
    assert!(err.is_conflict(), "got {err:?}");
}

// ── Users ────────────────────────────────────────────────────────────────────

pub async fn duplicate_login_is_conflict<S: IdentityStore>(store: &S) {
    saved_user(store, "alice").await;
    let mut again = new_user("alice");
    let err = store.create_user(&ctx(), &mut again).await.unwrap_err();
    assert!(err.is_conflict(), "got {err:?}");
    assert!(again.id.is_nil(), "id is only assigned on success");
}

pub async fn update_user_replaces_fields<S: IdentityStore>(store: &S) {
    let mut user = saved_user(store, "alice").await;
    user.role = UserRole::Admin;
    user.password_hash = "bmV3".to_owned();
    store.update_user(&ctx(), &user).await.unwrap();

    let fetched = store.get_user_by_login(&ctx(), "alice").await.unwrap();
    assert_eq!(fetched.role, UserRole::Admin);
    assert_eq!(fetched.password_hash, "bmV3");
}

pub async fn soft_delete_frees_login<S: IdentityStore>(store: &S) {
    let mut user = saved_user(store, "alice").await;
    saved_profile(store, &user).await;
    store.create_token(&ctx(), &user, "session-1").await.unwrap();
    let link = store
        .create_link(&ctx(), LinkType::Confirm, Duration::hours(1), &user)
        .await
        .unwrap();

    store.delete_user(&ctx(), &mut user).await.unwrap();
    assert!(user.is_deleted);

    let lookup = store.get_user_by_login(&ctx(), "alice").await;
    assert!(matches!(lookup, Err(StoreError::NotFound(Entity::User))));
    let kept = store.get_user_by_id(&ctx(), user.id).await.unwrap();
    assert!(kept.is_deleted && !kept.can_authenticate());

    let profile: Profile = store.get_profile_by_user(&ctx(), &user).await.unwrap();
    assert!(profile.deleted_at.is_some());
    assert!(store.get_token_by_session_id(&ctx(), "session-1").await.is_err());
    assert!(store.get_link_from_string(&ctx(), &link.link).await.is_err());

    let reborn = saved_user(store, "alice").await;
    assert_ne!(reborn.id, user.id);
    let found = store.get_user_by_login(&ctx(), "alice").await.unwrap();
    assert_eq!(found.id, reborn.id);
}

pub async fn blacklist_user_stamps_profile_and_kills_tokens<S: IdentityStore>(store: &S) {
    let mut user = saved_user(store, "alice").await;
    saved_user(store, "bob").await;
    saved_profile(store, &user).await;
    store.create_token(&ctx(), &user, "session-1").await.unwrap();

    store.blacklist_user(&ctx(), &mut user).await.unwrap();
    assert!(user.is_in_blacklist);

    let profile: Profile = store.get_profile_by_user(&ctx(), &user).await.unwrap();
    assert!(profile.blacklist_at.is_some());
    assert!(profile.user.is_in_blacklist);

    let token = store.get_token_by_session_id(&ctx(), "session-1").await;
    assert!(matches!(token, Err(StoreError::NotFound(Entity::Token))));

    let listed = store
        .get_blacklisted_users(&ctx(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, user.id);
}

pub async fn missing_rows_are_not_found<S: IdentityStore>(store: &S) {
    let ctx = ctx();
    let missing = store.get_user_by_id(&ctx, Uuid::now_v7()).await;
    assert!(matches!(missing, Err(StoreError::NotFound(Entity::User))));

    let mut ghost = new_user("ghost");
    ghost.id = Uuid::now_v7();
    let err = store.update_user(&ctx, &ghost).await.unwrap_err();
    assert!(err.is_not_found());
    let err = store.blacklist_user(&ctx, &mut ghost).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!ghost.is_in_blacklist);

    let profile: Result<Profile, _> = store.get_profile_by_id(&ctx, Uuid::now_v7()).await;
    assert!(matches!(profile, Err(StoreError::NotFound(Entity::Profile))));

    let link = store.get_link_from_string(&ctx, "no-such-link").await;
    assert!(matches!(link, Err(StoreError::NotFound(Entity::Link))));

    let token = store.get_token_object(&ctx, "no-such-token").await;
    assert!(matches!(token, Err(StoreError::NotFound(Entity::Token))));
}

// ── Accounts ─────────────────────────────────────────────────────────────────

pub async fn bound_accounts<S: IdentityStore>(store: &S) {
    let alice = saved_user(store, "alice").await;
    let bob = saved_user(store, "bob").await;

    store
        .bind_account(&ctx(), &alice, OAuthResource::Github, "gh-1")
        .await
        .unwrap();
    store
        .bind_account(&ctx(), &alice, OAuthResource::Google, "g-1")
        .await
        .unwrap();

    let owner = store
        .get_user_by_bound_account(&ctx(), OAuthResource::Github, "gh-1")
        .await
        .unwrap();
    assert_eq!(owner.id, alice.id);

    let accounts = store.get_user_bound_accounts(&ctx(), &alice).await.unwrap();
    assert_eq!(accounts.account(OAuthResource::Github), Some("gh-1"));
    assert_eq!(accounts.account(OAuthResource::Google), Some("g-1"));
    assert!(!accounts.is_bound(OAuthResource::Facebook));

    store
        .bind_account(&ctx(), &alice, OAuthResource::Github, "gh-2")
        .await
        .unwrap();
    let rebound = store.get_user_bound_accounts(&ctx(), &alice).await.unwrap();
    assert_eq!(rebound.github.as_deref(), Some("gh-2"));
    assert_eq!(rebound.id, accounts.id);

    let err = store
        .bind_account(&ctx(), &bob, OAuthResource::Github, "gh-2")
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "got {err:?}");

    let none = store.get_user_bound_accounts(&ctx(), &bob).await;
    assert!(matches!(none, Err(StoreError::NotFound(Entity::Accounts))));
    let unknown = store
        .get_user_by_bound_account(&ctx(), OAuthResource::Facebook, "fb-1")
        .await;
    assert!(matches!(unknown, Err(StoreError::NotFound(Entity::User))));
}

// ── Domain blacklist ─────────────────────────────────────────────────────────

pub async fn domain_blacklist<S: IdentityStore>(store: &S) {
    let ctx = ctx();
    let email = "mallory@Spam.Example";
    let domain = email_domain(email).unwrap();
    assert!(!store.is_domain_blacklisted(&ctx, &domain).await.unwrap());

    store.blacklist_domain(&ctx, "Spam.Example").await.unwrap();
    store.blacklist_domain(&ctx, "@spam.example").await.unwrap();
    assert!(store.is_domain_blacklisted(&ctx, &domain).await.unwrap());

    let listed = store
        .get_blacklisted_domains(&ctx, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].domain, "spam.example");

    store.unblacklist_domain(&ctx, &domain).await.unwrap();
    assert!(!store.is_domain_blacklisted(&ctx, &domain).await.unwrap());

    let again = store.unblacklist_domain(&ctx, &domain).await;
    assert!(matches!(
        again,
        Err(StoreError::NotFound(Entity::BlacklistedDomain))
    ));
}

pub async fn domain_pages_are_ordered<S: IdentityStore>(store: &S) {
    let ctx = ctx();
    for domain in ["c.example", "a.example", "b.example"] {
        store.blacklist_domain(&ctx, domain).await.unwrap();
    }

    let first = store
        .get_blacklisted_domains(&ctx, PageRequest::new(2, 0))
        .await
        .unwrap();
    let names: Vec<&str> = first.iter().map(|e| e.domain.as_str()).collect();
    assert_eq!(names, ["a.example", "b.example"]);

    let rest = store
        .get_blacklisted_domains(&ctx, PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].domain, "c.example");
}

// ── Context ──────────────────────────────────────────────────────────────────

pub async fn interrupted_context_aborts<S: IdentityStore>(store: &S) {
    let cancelled = Ctx::background();
    cancelled.cancel();
    let err = store
        .get_user_by_login(&cancelled, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Interrupted(Interrupted::Cancelled)));

    let mut user = new_user("alice");
    let err = store.create_user(&cancelled, &mut user).await.unwrap_err();
    assert_eq!(err.kind(), "CANCELLED");

    let expired = Ctx::background().with_deadline(tokio::time::Instant::now());
    let err = store.blacklist_domain(&expired, "x.example").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Interrupted(Interrupted::DeadlineExceeded)
    ));

    let err = store
        .transactional(&expired, |_, _| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DEADLINE_EXCEEDED");

    assert!(!store.is_domain_blacklisted(&ctx(), "x.example").await.unwrap());
    let lookup = store.get_user_by_login(&ctx(), "alice").await;
    assert!(lookup.is_err(), "cancelled create must not persist");
}

// ── Typed profile data ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Preferences {
    pub theme: String,
    pub newsletter: bool,
}

pub async fn typed_profile_data<S: IdentityStore>(store: &S) {
    let user = saved_user(store, "alice").await;
    let prefs = Preferences {
        theme: "dark".to_owned(),
        newsletter: false,
    };
    let mut profile = Profile::new(user.clone(), "ref", "rw", prefs.clone());
    store.create_profile(&ctx(), &mut profile).await.unwrap();

    let typed: Profile<Preferences> = store.get_profile_by_user(&ctx(), &user).await.unwrap();
    assert_eq!(typed.data, prefs);

    let untyped: Profile = store.get_profile_by_id(&ctx(), profile.id).await.unwrap();
    assert_eq!(untyped.data["theme"], "dark");

    let mismatch: Result<Profile<Vec<u8>>, _> = store.get_profile_by_user(&ctx(), &user).await;
    assert!(matches!(mismatch, Err(StoreError::Serialization(_))));
}
