//! Register, login, refresh and logout against in-memory repositories

mod support;

use auth::{
    AuthError,
    cookie::CookieDirective,
    error::ConflictField,
    models::{AccountStatus, NewSession},
    repositories::{SessionRepository, UserRepository},
    service::{LoginRequest, RegisterRequest},
};
use chrono::{Duration, Utc};
use support::{alice, client, harness, refresh_token_of, test_config};

fn login(identifier: &str, password: &str) -> LoginRequest {
    LoginRequest {
        identifier: identifier.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn register_returns_user_token_and_cookie() {
    let h = harness(&test_config());

    let outcome = h.service.register(alice(), &client()).await.unwrap();

    assert_eq!(outcome.body.user.username, "alice01");
    assert_eq!(outcome.body.user.email, "a@x.com");
    assert_eq!(outcome.body.user.status, AccountStatus::Active);
    assert!(!outcome.body.access_token.is_empty());
    assert!(
        h.service
            .tokens()
            .verify_access(&outcome.body.access_token)
            .is_ok()
    );

    match &outcome.cookie {
        CookieDirective::Set { max_age_secs, .. } => {
            assert_eq!(*max_age_secs, 30 * 24 * 60 * 60)
        }
        other => panic!("unexpected directive {:?}", other),
    }

    let token = refresh_token_of(&outcome.cookie);
    let session = h.sessions.find_by_token(&token).await.unwrap().unwrap();
    assert_eq!(session.user_id, outcome.body.user.id);
    assert_eq!(session.ip_address, "198.51.100.4");
    assert_eq!(session.device.as_deref(), Some("integration-test"));
    assert!(!session.revoked);
}

#[tokio::test]
async fn login_by_email_or_username() {
    let h = harness(&test_config());
    h.service.register(alice(), &client()).await.unwrap();

    let by_email = h
        .service
        .login(login("a@x.com", "Str0ng!Pass"), &client())
        .await
        .unwrap();
    let by_username = h
        .service
        .login(login("alice01", "Str0ng!Pass"), &client())
        .await
        .unwrap();
    assert_eq!(by_email.body.user.id, by_username.body.user.id);

    // Identifiers are case-normalized.
    assert!(
        h.service
            .login(login("A@X.COM", "Str0ng!Pass"), &client())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let h = harness(&test_config());
    h.service.register(alice(), &client()).await.unwrap();
    let sessions_before = h.sessions.len().await;

    let wrong_password = h
        .service
        .login(login("a@x.com", "wrong"), &client())
        .await
        .unwrap_err();
    let unknown_user = h
        .service
        .login(login("nobody@x.com", "Str0ng!Pass"), &client())
        .await
        .unwrap_err();

    assert!(matches!(wrong_password, AuthError::InvalidCredentials));
    assert!(matches!(unknown_user, AuthError::InvalidCredentials));
    assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    assert_eq!(h.sessions.len().await, sessions_before);
}

#[tokio::test]
async fn duplicate_email_is_reported_before_username() {
    let h = harness(&test_config());
    h.service.register(alice(), &client()).await.unwrap();

    let same_email = RegisterRequest {
        username: "someone_else".to_string(),
        ..alice()
    };
    let err = h.service.register(same_email, &client()).await.unwrap_err();
    assert!(matches!(err, AuthError::Conflict(ConflictField::Email)));

    // Both collide: email wins.
    let err = h.service.register(alice(), &client()).await.unwrap_err();
    assert!(matches!(err, AuthError::Conflict(ConflictField::Email)));

    let same_username = RegisterRequest {
        username: "ALICE01".to_string(),
        email: "other@x.com".to_string(),
        ..alice()
    };
    let err = h
        .service
        .register(same_username, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Conflict(ConflictField::Username)));

    assert_eq!(h.users.len().await, 1);
}

#[tokio::test]
async fn concurrent_registrations_yield_one_user() {
    let h = harness(&test_config());

    let ctx = client();
    let (first, second) = tokio::join!(
        h.service.register(alice(), &ctx),
        h.service.register(alice(), &ctx)
    );

    let successes = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1);
    let failure = first.err().or(second.err()).unwrap();
    assert!(matches!(failure, AuthError::Conflict(ConflictField::Email)));
    assert_eq!(h.users.len().await, 1);
}

#[tokio::test]
async fn invalid_registration_input_is_rejected() {
    let h = harness(&test_config());
    let weak = RegisterRequest {
        password: "password".to_string(),
        ..alice()
    };
    assert!(matches!(
        h.service.register(weak, &client()).await,
        Err(AuthError::Validation(_))
    ));
    assert_eq!(h.users.len().await, 0);
}

#[tokio::test]
async fn refresh_rotates_and_old_token_dies() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let original = refresh_token_of(&registered.cookie);

    let rotated = h
        .service
        .refresh(Some(&original), &client())
        .await
        .unwrap();
    let next = refresh_token_of(&rotated.cookie);
    assert_ne!(next, original);
    assert!(!rotated.body.access_token.is_empty());

    let reused = h.service.refresh(Some(&original), &client()).await;
    assert!(matches!(reused, Err(AuthError::InvalidToken)));

    assert!(h.service.refresh(Some(&next), &client()).await.is_ok());
    assert!(
        h.sessions
            .find_by_token(&original)
            .await
            .unwrap()
            .unwrap()
            .revoked
    );
}

#[tokio::test]
async fn concurrent_refresh_has_a_single_winner() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let token = refresh_token_of(&registered.cookie);

    let ctx = client();
    let (first, second) = tokio::join!(
        h.service.refresh(Some(&token), &ctx),
        h.service.refresh(Some(&token), &ctx)
    );
    assert_eq!(
        [first.is_ok(), second.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count(),
        1
    );
}

#[tokio::test]
async fn refresh_rejects_missing_and_garbage_tokens() {
    let h = harness(&test_config());

    assert!(matches!(
        h.service.refresh(None, &client()).await,
        Err(AuthError::MissingToken)
    ));
    assert!(matches!(
        h.service.refresh(Some(""), &client()).await,
        Err(AuthError::MissingToken)
    ));
    assert!(matches!(
        h.service.refresh(Some("garbage"), &client()).await,
        Err(AuthError::InvalidToken)
    ));

    // Well signed but never backed by a session.
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let orphan = h
        .service
        .tokens()
        .sign_refresh(registered.body.user.id)
        .unwrap();
    assert!(matches!(
        h.service.refresh(Some(&orphan), &client()).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn refresh_rejects_expired_session() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let user_id = registered.body.user.id;

    let token = h.service.tokens().sign_refresh(user_id).unwrap();
    h.sessions
        .create(NewSession {
            user_id,
            refresh_token: token.clone(),
            ip_address: "198.51.100.4".to_string(),
            device: None,
            expires_at: Utc::now() - Duration::minutes(1),
        })
        .await
        .unwrap();

    assert!(matches!(
        h.service.refresh(Some(&token), &client()).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn refresh_for_deleted_user_is_user_not_found() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let token = refresh_token_of(&registered.cookie);

    h.users.remove(registered.body.user.id).await.unwrap();

    assert!(matches!(
        h.service.refresh(Some(&token), &client()).await,
        Err(AuthError::UserNotFound)
    ));
}

#[tokio::test]
async fn logout_is_idempotent() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let token = refresh_token_of(&registered.cookie);

    assert_eq!(h.service.logout(None).await.unwrap(), None);
    assert_eq!(
        h.service.logout(Some(&token)).await.unwrap(),
        Some(CookieDirective::Clear)
    );
    assert_eq!(
        h.service.logout(Some(&token)).await.unwrap(),
        Some(CookieDirective::Clear)
    );

    assert!(matches!(
        h.service.refresh(Some(&token), &client()).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn pending_accounts_cannot_log_in_until_activated() {
    let mut config = test_config();
    config.require_activation = true;
    let h = harness(&config);

    let registered = h.service.register(alice(), &client()).await.unwrap();
    assert_eq!(registered.body.user.status, AccountStatus::Pending);

    assert!(matches!(
        h.service
            .login(login("alice01", "Str0ng!Pass"), &client())
            .await,
        Err(AuthError::AccountInactive)
    ));
    // Wrong password still reads as bad credentials.
    assert!(matches!(
        h.service.login(login("alice01", "nope"), &client()).await,
        Err(AuthError::InvalidCredentials)
    ));

    let activated = h.service.activate(registered.body.user.id).await.unwrap();
    assert_eq!(activated.status, AccountStatus::Active);
    assert!(
        h.service
            .login(login("alice01", "Str0ng!Pass"), &client())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn suspended_account_loses_refresh() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let token = refresh_token_of(&registered.cookie);

    h.users
        .update_status(registered.body.user.id, AccountStatus::Suspended)
        .await
        .unwrap();

    assert!(matches!(
        h.service.refresh(Some(&token), &client()).await,
        Err(AuthError::AccountInactive)
    ));
    assert!(matches!(
        h.service.activate(registered.body.user.id).await,
        Err(AuthError::AccountInactive)
    ));
    assert!(
        h.sessions
            .find_by_token(&token)
            .await
            .unwrap()
            .unwrap()
            .revoked
    );
}

#[tokio::test]
async fn sessions_are_listed_and_revocable_per_device() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let user_id = registered.body.user.id;
    h.service
        .login(login("alice01", "Str0ng!Pass"), &client())
        .await
        .unwrap();

    let sessions = h.service.sessions(user_id).await.unwrap();
    assert_eq!(sessions.len(), 2);

    h.service
        .revoke_session(user_id, sessions[0].id)
        .await
        .unwrap();
    assert_eq!(h.service.sessions(user_id).await.unwrap().len(), 1);

    // Someone else's session id is not revocable.
    let stranger = uuid::Uuid::new_v4();
    assert!(
        h.service
            .revoke_session(stranger, sessions[1].id)
            .await
            .is_err()
    );

    assert_eq!(
        h.service.logout_all(user_id).await.unwrap(),
        CookieDirective::Clear
    );
    assert!(h.service.sessions(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn change_password_signs_out_everywhere() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();
    let user_id = registered.body.user.id;
    let token = refresh_token_of(&registered.cookie);

    assert!(matches!(
        h.service
            .change_password(user_id, "wrong", "N3w!Password")
            .await,
        Err(AuthError::InvalidCredentials)
    ));

    h.service
        .change_password(user_id, "Str0ng!Pass", "N3w!Password")
        .await
        .unwrap();

    assert!(matches!(
        h.service.refresh(Some(&token), &client()).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(matches!(
        h.service
            .login(login("alice01", "Str0ng!Pass"), &client())
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(
        h.service
            .login(login("alice01", "N3w!Password"), &client())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn purge_drops_only_expired_sessions() {
    let h = harness(&test_config());
    let registered = h.service.register(alice(), &client()).await.unwrap();

    h.sessions
        .create(NewSession {
            user_id: registered.body.user.id,
            refresh_token: "stale".to_string(),
            ip_address: "198.51.100.4".to_string(),
            device: None,
            expires_at: Utc::now() - Duration::days(1),
        })
        .await
        .unwrap();

    assert_eq!(h.service.purge_expired_sessions().await.unwrap(), 1);
    assert_eq!(h.sessions.len().await, 1);
}

#[tokio::test]
async fn out_of_range_refresh_lifetime_fails_without_a_session() {
    let mut config = test_config();
    config.tokens.refresh_ttl_secs = 100_000_000_000_000_000;
    let h = harness(&config);

    let err = h.service.register(alice(), &client()).await.unwrap_err();
    assert!(matches!(err, AuthError::Internal(_)));
    assert_eq!(h.sessions.len().await, 0);
}
