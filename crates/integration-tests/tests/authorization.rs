//! Every management rule is enforced twice. These tests show the client
//! refusing locally and the service refusing the same request on its own
//! when the client is bypassed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use insight_library_client::{AdminClientError, InsightClient};
use insight_library_core::{PolicyViolation, Role};
use insight_library_integration_tests::TestServer;
use reqwest::StatusCode;
use serde_json::{Value, json};

async fn signed_in(server: &TestServer, email: &str, password: &str) -> InsightClient {
    let client = server.client();
    client.auth.login(email, password).await.unwrap();
    client
}

/// POST straight to the service with `client`'s own token.
async fn raw_post(
    server: &TestServer,
    client: &InsightClient,
    name: &str,
    body: &Value,
) -> (StatusCode, Value) {
    let token = client.auth.access_token().await.unwrap();
    let response = reqwest::Client::new()
        .post(server.endpoint(name))
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .expect("request failed");
    let status = response.status();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

fn policy(err: &AdminClientError) -> Option<PolicyViolation> {
    match err {
        AdminClientError::Policy(violation) => Some(*violation),
        _ => None,
    }
}

#[tokio::test]
async fn test_moderator_cannot_invite() {
    let server = TestServer::spawn().await;
    server.seed("mod@studio.test", "secret1", Role::Moderator);
    let moderator = signed_in(&server, "mod@studio.test", "secret1").await;
    let accounts = server.backends.identity.account_count();

    let err = moderator
        .admin
        .invite_user("new@studio.test", None, Role::User)
        .await
        .unwrap_err();
    assert_eq!(policy(&err), Some(PolicyViolation::NotAdmin));

    let (status, body) = raw_post(
        &server,
        &moderator,
        "invite-user",
        &json!({ "email": "new@studio.test", "role": "user" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Only admins can create users");
    assert_eq!(server.backends.identity.account_count(), accounts);
}

#[tokio::test]
async fn test_regular_admin_cannot_promote_to_admin() {
    let server = TestServer::spawn().await;
    server.seed("admin@studio.test", "admin-pass", Role::Admin);
    let reader = server.seed("reader@studio.test", "secret1", Role::User);
    let admin = signed_in(&server, "admin@studio.test", "admin-pass").await;

    let err = admin
        .admin
        .update_role(&reader, Role::Admin)
        .await
        .unwrap_err();
    assert_eq!(policy(&err), Some(PolicyViolation::AdminPromotion));

    let (status, body) = raw_post(
        &server,
        &admin,
        "update-role",
        &json!({ "userId": reader.id, "role": "admin" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "Only the super admin can promote users to admin."
    );
    assert_eq!(
        server.backends.profiles.get_sync(reader.id).unwrap().role,
        Role::User
    );
}

#[tokio::test]
async fn test_regular_admin_cannot_touch_another_admin() {
    let server = TestServer::spawn().await;
    server.seed("admin@studio.test", "admin-pass", Role::Admin);
    let other = server.seed("other-admin@studio.test", "other-pass", Role::Admin);
    let admin = signed_in(&server, "admin@studio.test", "admin-pass").await;

    let err = admin.admin.reset_password(&other).await.unwrap_err();
    assert_eq!(policy(&err), Some(PolicyViolation::AdminTarget));

    let (status, _) = raw_post(
        &server,
        &admin,
        "reset-password",
        &json!({ "userId": other.id }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        server.backends.identity.password_of(other.id).as_deref(),
        Some("other-pass")
    );
}

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let server = TestServer::spawn().await;
    let me = server.seed("admin@studio.test", "admin-pass", Role::Admin);
    let admin = signed_in(&server, "admin@studio.test", "admin-pass").await;

    let err = admin
        .admin
        .delete_user(&me, "admin@studio.test")
        .await
        .unwrap_err();
    assert_eq!(policy(&err), Some(PolicyViolation::SelfManagement));

    let (status, _) = raw_post(
        &server,
        &admin,
        "delete-user",
        &json!({ "userId": me.id, "confirmEmail": "admin@studio.test" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(server.backends.profiles.get_sync(me.id).is_some());
}

#[tokio::test]
async fn test_regular_user_cannot_list_users_or_logs() {
    let server = TestServer::spawn().await;
    server.seed("reader@studio.test", "secret1", Role::User);
    let reader = signed_in(&server, "reader@studio.test", "secret1").await;

    let err = reader.admin.list_users(false).await.unwrap_err();
    assert_eq!(policy(&err), Some(PolicyViolation::NotStaff));
    let err = reader
        .admin
        .activity_logs(&insight_library_core::ActivityLogQuery::default())
        .await
        .unwrap_err();
    assert_eq!(policy(&err), Some(PolicyViolation::NotAdmin));

    let token = reader.auth.access_token().await.unwrap();
    let http = reqwest::Client::new();
    for name in ["users", "activity-logs"] {
        let status = http
            .get(server.endpoint(name))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, StatusCode::FORBIDDEN, "{name}");
    }
}

#[tokio::test]
async fn test_signed_out_client_sends_nothing() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let err = client.admin.list_users(false).await.unwrap_err();
    assert!(matches!(err, AdminClientError::NotSignedIn));

    let status = reqwest::Client::new()
        .get(server.endpoint("users"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
