//! Persisted grant browsing and revocation.

mod common;

use common::{context, insert_grant};
use identity_admin::audit::{AuditCategory, AuditEventType};
use identity_admin::entity::persisted_grant::{self, grant_types};
use identity_admin::error::ErrorKind;
use identity_admin::identity::dto::UserDto;
use identity_admin::paging::PageRequest;
use identity_admin::resources::MessageId;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use serde_json::json;
use time::OffsetDateTime;

const WEB: &str = "web-portal";
const CLI: &str = "cli";

/// alice: three grants for the portal, one for the cli. bob: one for the portal.
async fn seed(db: &sea_orm::DatabaseConnection) {
    insert_grant(db, "a-code", Some("alice"), WEB, grant_types::AUTHORIZATION_CODE, 30).await;
    insert_grant(db, "a-refresh", Some("alice"), WEB, grant_types::REFRESH_TOKEN, 20).await;
    insert_grant(db, "a-consent", Some("alice"), WEB, grant_types::USER_CONSENT, 10).await;
    insert_grant(db, "a-cli", Some("alice"), CLI, grant_types::REFRESH_TOKEN, 5).await;
    insert_grant(db, "b-refresh", Some("bob"), WEB, grant_types::REFRESH_TOKEN, 15).await;
    insert_grant(db, "device", None, CLI, grant_types::DEVICE_CODE, 1).await;
}

#[tokio::test]
async fn test_grants_by_subject_are_most_recent_first() {
    let ctx = context().await;
    seed(&ctx.db).await;

    let page = ctx
        .admin
        .grants
        .get_persisted_grants_by_subject("alice", PageRequest::new(1, 3, 100))
        .await
        .unwrap();
    assert_eq!(page.total_count, 4);
    let keys: Vec<_> = page.items.iter().map(|g| g.key.as_str()).collect();
    assert_eq!(keys, vec!["a-cli", "a-consent", "a-refresh"]);

    let page = ctx
        .admin
        .grants
        .get_persisted_grants_by_subject("alice", PageRequest::new(2, 3, 100))
        .await
        .unwrap();
    let keys: Vec<_> = page.items.iter().map(|g| g.key.as_str()).collect();
    assert_eq!(keys, vec!["a-code"]);
}

#[tokio::test]
async fn test_unknown_subject_yields_empty_page() {
    let ctx = context().await;
    seed(&ctx.db).await;

    let page = ctx
        .admin
        .grants
        .get_persisted_grants_by_subject("nobody", PageRequest::default())
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 0);
    assert!(!ctx.admin.grants.exists_persisted_grants("nobody").await.unwrap());
    assert!(ctx.admin.grants.exists_persisted_grants("bob").await.unwrap());
}

#[tokio::test]
async fn test_get_grant_resolves_subject_name() {
    let ctx = context().await;
    let alice = ctx
        .admin
        .identity
        .create_user(
            &UserDto {
                user_name: "alice".into(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    insert_grant(&ctx.db, "k1", Some(&alice.id), WEB, grant_types::REFRESH_TOKEN, 1).await;

    let grant = ctx.admin.grants.get_persisted_grant("k1").await.unwrap();
    assert_eq!(grant.subject_id.as_deref(), Some(alice.id.as_str()));
    assert_eq!(grant.subject_name.as_deref(), Some("alice"));
    assert_eq!(grant.client_id, WEB);
    assert!(!grant.expired);
    assert!(!grant.consumed);

    let listed = ctx
        .admin
        .grants
        .get_persisted_grants_by_subject(&alice.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.items, vec![grant]);

    let err = ctx.admin.grants.get_persisted_grant("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.message_id(), MessageId::PersistedGrantDoesNotExist);
    assert!(err.detail().message.is_some());
}

#[tokio::test]
async fn test_expired_grants_are_flagged() {
    let ctx = context().await;
    // Created three hours ago with a one hour lifetime.
    insert_grant(&ctx.db, "old", Some("alice"), WEB, grant_types::AUTHORIZATION_CODE, 180).await;

    let grant = ctx.admin.grants.get_persisted_grant("old").await.unwrap();
    assert!(grant.expired);
    assert_eq!(grant.subject_name, None);
}

#[tokio::test]
async fn test_consumed_grants_are_flagged() {
    let ctx = context().await;
    let used = insert_grant(&ctx.db, "used", Some("alice"), WEB, grant_types::REFERENCE_TOKEN, 5).await;
    insert_grant(&ctx.db, "fresh", Some("alice"), WEB, grant_types::REFERENCE_TOKEN, 5).await;
    persisted_grant::ActiveModel {
        consumed_time: Set(Some(OffsetDateTime::now_utc())),
        ..used.into()
    }
    .update(ctx.db.as_ref())
    .await
    .unwrap();

    let grant = ctx.admin.grants.get_persisted_grant("used").await.unwrap();
    assert!(grant.consumed);
    assert!(grant.consumed_time.is_some());
    assert!(!grant.expired);
    assert_eq!(grant.grant_type, grant_types::REFERENCE_TOKEN);

    let fresh = ctx.admin.grants.get_persisted_grant("fresh").await.unwrap();
    assert!(!fresh.consumed);
}

#[tokio::test]
async fn test_subjects_list_names_and_search() {
    let ctx = context().await;
    let identity = &ctx.admin.identity;
    let zed = identity
        .create_user(
            &UserDto {
                user_name: "Zed".into(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    seed(&ctx.db).await;
    insert_grant(&ctx.db, "z-1", Some(&zed.id), WEB, grant_types::REFRESH_TOKEN, 2).await;
    insert_grant(&ctx.db, "z-2", Some(&zed.id), CLI, grant_types::REFRESH_TOKEN, 3).await;

    let subjects = ctx
        .admin
        .grants
        .get_persisted_grants_by_subjects(None, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(subjects.total_count, 3, "distinct, without the subjectless grant");
    let ids: Vec<_> = subjects.items.iter().map(|s| s.subject_id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);

    let named = subjects
        .items
        .iter()
        .find(|s| s.subject_id == zed.id)
        .unwrap();
    assert_eq!(named.subject_name.as_deref(), Some("Zed"));

    // Search matches the user name as well as the id, ignoring case.
    let found = ctx
        .admin
        .grants
        .get_persisted_grants_by_subjects(Some("zed"), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.total_count, 1);
    assert_eq!(found.items[0].subject_id, zed.id);

    let found = ctx
        .admin
        .grants
        .get_persisted_grants_by_subjects(Some("BO"), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.items[0].subject_id, "bob");
    assert_eq!(found.items[0].subject_name, None);

    let second = ctx
        .admin
        .grants
        .get_persisted_grants_by_subjects(None, PageRequest::new(2, 2, 100))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.total_count, 3);
}

#[tokio::test]
async fn test_delete_by_key_is_idempotent() {
    let ctx = context().await;
    seed(&ctx.db).await;

    assert_eq!(ctx.admin.grants.delete_persisted_grant("a-code").await.unwrap(), 1);
    assert_eq!(ctx.admin.grants.delete_persisted_grant("a-code").await.unwrap(), 0);

    let events = ctx.audit.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| {
        e.event_type == AuditEventType::PersistedGrantDeleted
            && e.category() == AuditCategory::PersistedGrant
    }));
    assert_eq!(events[0].payload, json!({ "key": "a-code", "deleted": 1 }));
    assert_eq!(events[1].payload, json!({ "key": "a-code", "deleted": 0 }));
}

#[tokio::test]
async fn test_delete_all_for_subject_leaves_other_subjects() {
    let ctx = context().await;
    seed(&ctx.db).await;
    let grants = &ctx.admin.grants;

    let deleted = grants.delete_persisted_grants("alice").await.unwrap();
    assert_eq!(deleted, 4);
    assert!(!grants.exists_persisted_grants("alice").await.unwrap());

    let bob = grants
        .get_persisted_grants_by_subject("bob", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(bob.total_count, 1);
    assert!(grants.get_persisted_grant("device").await.is_ok());

    let event = ctx.audit.last();
    assert_eq!(event.event_type, AuditEventType::PersistedGrantsDeleted);
    assert_eq!(event.subject_id.as_deref(), Some("alice"));
    assert_eq!(
        event.payload,
        json!({ "subject_id": "alice", "deleted": 4 })
    );
}

#[tokio::test]
async fn test_delete_by_client_and_type_narrow_the_scope() {
    let ctx = context().await;
    seed(&ctx.db).await;
    let grants = &ctx.admin.grants;

    let deleted = grants
        .delete_persisted_grants_by_type("alice", WEB, grant_types::REFRESH_TOKEN)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(grants.get_persisted_grant("a-refresh").await.is_err());
    assert!(grants.get_persisted_grant("a-cli").await.is_ok());
    assert!(grants.get_persisted_grant("b-refresh").await.is_ok());
    assert_eq!(
        ctx.audit.last().payload,
        json!({
            "subject_id": "alice",
            "client_id": WEB,
            "grant_type": grant_types::REFRESH_TOKEN,
            "deleted": 1,
        })
    );

    let deleted = grants
        .delete_persisted_grants_by_client("alice", WEB)
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    let remaining = grants
        .get_persisted_grants_by_subject("alice", PageRequest::default())
        .await
        .unwrap();
    let keys: Vec<_> = remaining.items.iter().map(|g| g.key.as_str()).collect();
    assert_eq!(keys, vec!["a-cli"]);
    assert!(grants.get_persisted_grant("b-refresh").await.is_ok());

    // Nothing left to match still succeeds and is recorded.
    let deleted = grants
        .delete_persisted_grants_by_client("alice", WEB)
        .await
        .unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(ctx.audit.len(), 3);
}
