use jsonwebtoken::{EncodingKey, Header, encode};

use super::*;
use crate::store::MemoryStore;

const SECRET: &[u8] = b"test-identity-secret";

fn token(sub: &str, email: &str, exp_offset: i64, secret: &[u8]) -> String {
    let exp = (Utc::now().timestamp() + exp_offset).max(0);
    let claims = IdentityClaims {
        sub: sub.to_string(),
        email: email.to_string(),
        name: None,
        exp: u64::try_from(exp).unwrap(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
}

fn manager() -> (Arc<MemoryStore>, SessionManager) {
    let store = Arc::new(MemoryStore::seeded());
    let manager = SessionManager::new(
        store.clone(),
        IdentityVerifier::hs256(SECRET, None, None),
        vec!["chef@cacrs.gouv.fr".to_string()],
    );
    (store, manager)
}

#[tokio::test]
async fn test_existing_user_keeps_role() {
    let (_, manager) = manager();
    let session = manager
        .login(&token("google-1", "admin@cacrs.gouv.fr", 3600, SECRET))
        .await
        .expect("login");
    assert_eq!(session.user.id, "usr-1");
    assert_eq!(session.user.role, UserRole::Admin);

    let current = manager.get(&session.token).await.expect("get");
    assert_eq!(current.map(|u| u.email), Some("admin@cacrs.gouv.fr".to_string()));
}

#[tokio::test]
async fn test_new_users_get_role_from_admin_list() {
    let (store, manager) = manager();
    let admin = manager
        .login(&token("google-9", "Chef@cacrs.gouv.fr", 3600, SECRET))
        .await
        .expect("admin login");
    assert_eq!(admin.user.role, UserRole::Admin);
    assert_eq!(admin.user.id, "google-9");

    let analyst = manager
        .login(&token("google-10", "nouveau@cacrs.gouv.fr", 3600, SECRET))
        .await
        .expect("analyst login");
    assert_eq!(analyst.user.role, UserRole::Analyst);
    assert!(
        store
            .find_user_by_email("nouveau@cacrs.gouv.fr")
            .await
            .expect("find")
            .is_some()
    );
}

#[tokio::test]
async fn test_blocked_user_is_rejected() {
    let (_, manager) = manager();
    let err = manager
        .login(&token("google-3", "viewer@cacrs.gouv.fr", 3600, SECRET))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}

#[tokio::test]
async fn test_bad_signature_and_expired_tokens_are_rejected() {
    let (_, manager) = manager();
    let forged = token("google-1", "admin@cacrs.gouv.fr", 3600, b"other-secret");
    assert!(matches!(manager.login(&forged).await, Err(Error::Auth(_))));

    let expired = token("google-1", "admin@cacrs.gouv.fr", -3600, SECRET);
    assert!(matches!(manager.login(&expired).await, Err(Error::Auth(_))));

    assert!(matches!(manager.login("not-a-jwt").await, Err(Error::Auth(_))));
}

#[tokio::test]
async fn test_blocking_ends_session() {
    let (store, manager) = manager();
    let session = manager
        .login(&token("google-2", "analyste@cacrs.gouv.fr", 3600, SECRET))
        .await
        .expect("login");
    store
        .set_user_status("usr-2", UserStatus::Blocked)
        .await
        .expect("block");
    assert!(manager.get(&session.token).await.expect("get").is_none());
}

#[tokio::test]
async fn test_logout() {
    let (_, manager) = manager();
    let session = manager
        .login(&token("google-2", "analyste@cacrs.gouv.fr", 3600, SECRET))
        .await
        .expect("login");
    assert!(manager.logout(&session.token).await);
    assert!(!manager.logout(&session.token).await);
    assert!(manager.get(&session.token).await.expect("get").is_none());
}

#[tokio::test]
async fn test_session_ends_with_identity_token() {
    let store = Arc::new(MemoryStore::seeded());
    let manager = SessionManager::new(
        store,
        IdentityVerifier::hs256(SECRET, None, None).with_leeway(0),
        Vec::new(),
    );
    let session = manager
        .login(&token("google-2", "analyste@cacrs.gouv.fr", 2, SECRET))
        .await
        .expect("login");
    assert!(session.expires_at > session.created_at);
    assert!(manager.get(&session.token).await.expect("get").is_some());

    tokio::time::sleep(std::time::Duration::from_millis(3100)).await;
    assert!(manager.get(&session.token).await.expect("get").is_none());
    assert!(!manager.logout(&session.token).await);
}

#[tokio::test]
async fn test_login_prunes_expired_sessions() {
    let (_, manager) = manager();
    let stale = manager
        .login(&token("google-2", "analyste@cacrs.gouv.fr", -10, SECRET))
        .await
        .expect("login within leeway");
    assert!(stale.is_expired(Utc::now()));

    manager
        .login(&token("google-1", "admin@cacrs.gouv.fr", 3600, SECRET))
        .await
        .expect("login");
    let open = manager.sessions.read().await;
    assert_eq!(open.len(), 1);
    assert!(!open.contains_key(&stale.token));
}

#[test]
fn test_audience_is_checked_when_configured() {
    let verifier = IdentityVerifier::hs256(SECRET, Some("cacrs-web"), None);
    let err = verifier
        .verify(&token("google-1", "admin@cacrs.gouv.fr", 3600, SECRET))
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}

#[test]
fn test_from_config_requires_a_key() {
    let config = AuthConfig {
        secret_env: "CACRS_TEST_MISSING_SECRET".to_string(),
        ..AuthConfig::default()
    };
    temp_env::with_var_unset("CACRS_TEST_MISSING_SECRET", || {
        assert!(matches!(
            IdentityVerifier::from_config(&config),
            Err(Error::Config(_))
        ));
    });
    temp_env::with_var("CACRS_TEST_MISSING_SECRET", Some("s3cret"), || {
        assert!(IdentityVerifier::from_config(&config).is_ok());
    });
}
