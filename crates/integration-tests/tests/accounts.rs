//! Client admin operations end to end: each call is checked locally, sent to
//! the functions service and reflected in the backends and audit log.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use insight_library_client::{AdminClientError, CredentialsNotice, InsightClient, LoginOutcome};
use insight_library_core::{ActivityAction, ActivityLogQuery, Role, SUPER_ADMIN_EMAIL};
use insight_library_integration_tests::{SITE_URL, TestServer};

async fn signed_in(server: &TestServer, email: &str, password: &str) -> InsightClient {
    let client = server.client();
    assert_eq!(
        client.auth.login(email, password).await.unwrap(),
        LoginOutcome::SignedIn
    );
    client
}

#[tokio::test]
async fn test_invited_user_can_sign_in_with_issued_credentials() {
    let server = TestServer::spawn().await;
    server.seed("admin@studio.test", "admin-pass", Role::Admin);
    let admin = signed_in(&server, "admin@studio.test", "admin-pass").await;

    let invitation = admin
        .admin
        .invite_user("writer@studio.test", Some("Writer"), Role::Moderator)
        .await
        .unwrap();
    let credentials = &invitation.credentials;
    assert!(invitation.email_sent);
    assert_eq!(credentials.email, "writer@studio.test");
    assert_eq!(credentials.role, Some(Role::Moderator));
    assert_eq!(credentials.site_url, SITE_URL);
    assert!(
        CredentialsNotice(credentials)
            .to_string()
            .contains("Role: moderator")
    );
    assert_eq!(server.backends.mailer.sent().len(), 1);

    let writer = signed_in(&server, "writer@studio.test", &credentials.password).await;
    assert!(writer.auth.is_moderator());
    assert!(!writer.auth.is_admin());

    let page = admin
        .admin
        .activity_logs(&ActivityLogQuery::default())
        .await
        .unwrap();
    let entry = page.logs.first().unwrap();
    assert_eq!(entry.action_type, ActivityAction::UserCreate);
    assert_eq!(entry.target_user_email.as_deref(), Some("writer@studio.test"));
    assert_eq!(entry.actor_email, "admin@studio.test");
}

#[tokio::test]
async fn test_reset_password_replaces_the_old_one() {
    let server = TestServer::spawn().await;
    server.seed("admin@studio.test", "admin-pass", Role::Admin);
    let reader = server.seed("reader@studio.test", "old-pass", Role::User);
    let admin = signed_in(&server, "admin@studio.test", "admin-pass").await;

    let credentials = admin.admin.reset_password(&reader).await.unwrap();
    assert_eq!(credentials.role, None);
    assert!(!CredentialsNotice(&credentials).to_string().contains("Role:"));

    let client = server.client();
    assert!(client.auth.login("reader@studio.test", "old-pass").await.is_err());
    assert_eq!(
        client
            .auth
            .login("reader@studio.test", &credentials.password)
            .await
            .unwrap(),
        LoginOutcome::SignedIn
    );
}

#[tokio::test]
async fn test_role_change_is_seen_after_profile_refresh() {
    let server = TestServer::spawn().await;
    server.seed(SUPER_ADMIN_EMAIL, "root-pass", Role::Admin);
    let reader = server.seed("reader@studio.test", "secret1", Role::User);
    let root = signed_in(&server, SUPER_ADMIN_EMAIL, "root-pass").await;
    let reader_client = signed_in(&server, "reader@studio.test", "secret1").await;
    assert!(!reader_client.auth.is_moderator());

    let updated = root.admin.update_role(&reader, Role::Admin).await.unwrap();
    assert_eq!(updated.role, Role::Admin);

    reader_client.auth.refresh_user().await;
    assert!(reader_client.auth.is_admin());

    let page = root
        .admin
        .activity_logs(&ActivityLogQuery {
            action: Some(ActivityAction::RoleChange),
            ..ActivityLogQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(page.logs.len(), 1);
}

#[tokio::test]
async fn test_delete_user_requires_confirmation() {
    let server = TestServer::spawn().await;
    server.seed("admin@studio.test", "admin-pass", Role::Admin);
    let reader = server.seed("reader@studio.test", "secret1", Role::User);
    let admin = signed_in(&server, "admin@studio.test", "admin-pass").await;
    let accounts = server.backends.identity.account_count();

    let err = admin
        .admin
        .delete_user(&reader, "someone-else@studio.test")
        .await
        .unwrap_err();
    assert!(matches!(err, AdminClientError::Validation(_)));
    assert_eq!(server.backends.identity.account_count(), accounts);

    admin
        .admin
        .delete_user(&reader, "READER@studio.test")
        .await
        .unwrap();
    assert_eq!(server.backends.identity.account_count(), accounts - 1);
    assert!(server.backends.profiles.get_sync(reader.id).is_none());

    let client = server.client();
    assert!(client.auth.login("reader@studio.test", "secret1").await.is_err());
}

#[tokio::test]
async fn test_change_own_password() {
    let server = TestServer::spawn().await;
    server.seed("reader@studio.test", "secret1", Role::User);
    let reader = signed_in(&server, "reader@studio.test", "secret1").await;

    let err = reader
        .admin
        .change_password("wrong", "secret2", "secret2")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.to_string(), "Current password is incorrect");

    let err = reader
        .admin
        .change_password("secret1", "secret2", "secret3")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "New passwords do not match");

    reader
        .admin
        .change_password("secret1", "secret2", "secret2")
        .await
        .unwrap();

    let client = server.client();
    assert!(client.auth.login("reader@studio.test", "secret1").await.is_err());
    assert!(client.auth.login("reader@studio.test", "secret2").await.is_ok());
}

#[tokio::test]
async fn test_self_profile_edit_refreshes_context() {
    let server = TestServer::spawn().await;
    server.seed("reader@studio.test", "secret1", Role::User);
    let reader = signed_in(&server, "reader@studio.test", "secret1").await;
    assert_eq!(reader.auth.user().unwrap().display_name, None);

    let updated = reader
        .admin
        .update_profile(None, "  Keen Reader ")
        .await
        .unwrap();
    assert_eq!(updated.display_name.as_deref(), Some("Keen Reader"));
    assert_eq!(
        reader.auth.user().unwrap().display_name.as_deref(),
        Some("Keen Reader")
    );

    let too_long = "x".repeat(101);
    let err = reader
        .admin
        .update_profile(None, &too_long)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminClientError::Validation(_)));
}

#[tokio::test]
async fn test_activity_log_search_and_paging() {
    let server = TestServer::spawn().await;
    server.seed("admin@studio.test", "admin-pass", Role::Admin);
    let admin = signed_in(&server, "admin@studio.test", "admin-pass").await;

    for name in ["alpha", "beta", "gamma"] {
        admin
            .admin
            .invite_user(&format!("{name}@studio.test"), None, Role::User)
            .await
            .unwrap();
    }

    let found = admin
        .admin
        .activity_logs(&ActivityLogQuery {
            search: Some("BETA".to_owned()),
            ..ActivityLogQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(found.logs.len(), 1);
    assert_eq!(
        found.logs.first().unwrap().target_user_email.as_deref(),
        Some("beta@studio.test")
    );

    let second_page = admin
        .admin
        .activity_logs(&ActivityLogQuery {
            page: 1,
            page_size: 2,
            ..ActivityLogQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(second_page.page, 1);
    assert_eq!(second_page.page_size, 2);
    assert_eq!(second_page.logs.len(), 1);
    // Newest first, so the oldest entry lands on the last page.
    assert_eq!(
        second_page.logs.first().unwrap().target_user_email.as_deref(),
        Some("alpha@studio.test")
    );
}
