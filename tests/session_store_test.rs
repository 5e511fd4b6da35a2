//! Integration tests for the session state store.
//!
//! These tests drive [`SessionStateStore`] end to end against the mock
//! provider and in-memory storage:
//! 1. Initialization: migration, validation, not-configured provider
//! 2. Listener delivery: once per mutation, in order, isolated from panics
//! 3. Provider events: sign-out keeps analytics, refreshes replace the credential
//! 4. Concurrency: serialized refreshes and teardown mid-backoff
//! 5. Sign-in and the valid-session guard

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{
    credential_expiring_in, expired_credential, valid_credential, wait_for, RecordingListener,
    TestStoreBuilder,
};
use session_core::adapters::mock::{InMemoryCredentialStore, MockAuthProvider};
use session_core::auth::{RetryOptions, SignInInput};
use session_core::error::AuthError;
use session_core::session::{GuardError, SessionPhase};
use session_core::traits::CredentialEvent;

// ============= Initialization =============

#[tokio::test]
async fn test_initialize_with_valid_credential() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());

    harness.store.initialize().await;

    assert_eq!(harness.store.phase(), SessionPhase::Ready);
    assert!(harness.store.is_authenticated());
    assert_eq!(
        harness.store.get_current_principal().map(|p| p.id().to_string()),
        Some("user-1".to_string())
    );
    let state = harness.store.get_state();
    assert!(!state.auth().is_loading());
    assert!(state.auth().last_validated_at().is_some());
    assert_eq!(harness.provider.refresh_calls(), 0);
    assert_eq!(listener.calls(), 1);
}

#[tokio::test]
async fn test_initialize_refreshes_expired_credential() {
    let harness = TestStoreBuilder::new().with_current(expired_credential()).build();
    let fresh = credential_expiring_in("refresh-fresh", 3600);
    harness.provider.push_refresh_result(Ok(fresh.clone()));

    harness.store.initialize().await;

    assert_eq!(harness.provider.refresh_calls(), 1);
    assert_eq!(harness.store.get_credential(), Some(fresh));
}

#[tokio::test]
async fn test_initialize_with_revoked_refresh_token() {
    let harness = TestStoreBuilder::new().with_current(expired_credential()).build();
    harness
        .provider
        .push_refresh_result(Err(AuthError::revoked("refresh token revoked")));

    harness.store.initialize().await;

    // Rejections are not retried.
    assert_eq!(harness.provider.refresh_calls(), 1);
    assert!(harness.sleeper.recorded().is_empty());
    assert!(!harness.store.is_authenticated());
    assert!(!harness.store.get_state().auth().is_loading());
    assert_eq!(harness.store.phase(), SessionPhase::Ready);
}

#[tokio::test]
async fn test_initialize_retries_network_failures() {
    let harness = TestStoreBuilder::new().with_current(expired_credential()).build();
    harness.provider.push_refresh_result(Err(AuthError::network("offline")));
    harness
        .provider
        .push_refresh_result(Err(AuthError::from_status(503, "unavailable")));
    harness
        .provider
        .push_refresh_result(Ok(credential_expiring_in("refresh-fresh", 3600)));

    harness.store.initialize().await;

    assert!(harness.store.is_authenticated());
    assert_eq!(harness.provider.refresh_calls(), 3);
    assert_eq!(
        harness.sleeper.recorded(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
}

#[tokio::test]
async fn test_initialize_without_provider_configuration() {
    let harness = TestStoreBuilder::new()
        .with_provider(MockAuthProvider::unconfigured())
        .build();

    harness.store.initialize().await;

    let state = harness.store.get_state();
    assert!(!state.auth().is_loading());
    assert!(!state.is_authenticated());
    assert_eq!(harness.store.phase(), SessionPhase::Ready);
    assert_eq!(harness.provider.subscriber_count(), 0);
    assert_eq!(harness.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn test_initialize_twice_is_noop() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();

    harness.store.initialize().await;
    let version = harness.store.get_state().version();
    harness.store.initialize().await;

    assert_eq!(harness.storage.migrate_calls(), 1);
    assert_eq!(harness.provider.subscriber_count(), 1);
    assert_eq!(harness.store.get_state().version(), version);
}

#[tokio::test]
async fn test_initialize_migrates_legacy_storage() {
    let storage = InMemoryCredentialStore::new();
    storage.insert_legacy("app.auth-token", "{\"access_token\":\"legacy\"}");
    let harness = TestStoreBuilder::new()
        .with_storage(storage)
        .with_current(valid_credential())
        .build();

    harness.store.initialize().await;

    assert_eq!(harness.storage.migrate_calls(), 1);
    assert_eq!(harness.storage.legacy_len(), 0);
    assert!(harness.storage.item("app.auth-token").is_some());
}

#[tokio::test]
async fn test_migration_failure_does_not_block_initialize() {
    let storage = InMemoryCredentialStore::new();
    storage.set_migrate_should_fail(true);
    let harness = TestStoreBuilder::new()
        .with_storage(storage)
        .with_current(valid_credential())
        .build();

    harness.store.initialize().await;

    assert!(harness.store.is_authenticated());
    assert_eq!(harness.store.phase(), SessionPhase::Ready);
}

#[tokio::test]
async fn test_initialize_after_destroy() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();

    harness.store.initialize().await;
    harness.store.destroy();
    harness.store.initialize().await;

    assert_eq!(harness.storage.migrate_calls(), 2);
    assert_eq!(harness.store.phase(), SessionPhase::Ready);
}

// ============= Listeners =============

#[tokio::test]
async fn test_clear_all_sessions_notifies_each_listener_once() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;
    harness.store.set_chat_session_id(Some("chat-1"));
    harness.store.set_analytics_session_id(Some("analytics-1"));

    let first = RecordingListener::new();
    let second = RecordingListener::new();
    harness.store.add_listener(first.callback());
    harness.store.add_listener(second.callback());

    harness.store.clear_all_sessions().await;

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    let state = first.last().unwrap();
    assert!(state.auth().credential().is_none());
    assert!(state.auth().principal().is_none());
    assert!(state.auth().last_validated_at().is_none());
    assert!(!state.auth().is_loading());
    assert!(state.chat().current_conversation_id().is_none());
    assert!(state.analytics().session_id().is_none());
    assert_eq!(harness.provider.sign_out_calls(), 1);
}

#[tokio::test]
async fn test_clear_all_sessions_survives_remote_failure() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;
    harness
        .provider
        .set_sign_out_error(Some(AuthError::network("offline")));

    harness.store.clear_all_sessions().await;

    assert!(!harness.store.is_authenticated());
}

#[tokio::test]
async fn test_clear_all_sessions_skips_unconfigured_provider() {
    let harness = TestStoreBuilder::new()
        .with_provider(MockAuthProvider::unconfigured())
        .build();
    harness.store.set_chat_session_id(Some("chat-1"));

    harness.store.clear_all_sessions().await;

    assert_eq!(harness.provider.sign_out_calls(), 0);
    assert!(harness.store.get_chat_session_id().is_none());
}

#[test]
fn test_unsubscribed_listener_is_not_called() {
    let harness = TestStoreBuilder::new().build();
    let listener = RecordingListener::new();
    let subscription = harness.store.add_listener(listener.callback());

    subscription.unsubscribe();
    subscription.unsubscribe();
    harness.store.set_chat_session_id(Some("chat-1"));

    assert_eq!(listener.calls(), 0);
    assert_eq!(harness.store.listener_count(), 0);
}

#[test]
fn test_chat_session_id_set_and_clear() {
    let harness = TestStoreBuilder::new().build();

    harness.store.set_chat_session_id(Some("chat-session-123"));
    assert_eq!(
        harness.store.get_chat_session_id().as_deref(),
        Some("chat-session-123")
    );

    harness.store.set_chat_session_id(None);
    assert!(harness.store.get_chat_session_id().is_none());
}

#[test]
fn test_analytics_session_id_set_and_clear() {
    let harness = TestStoreBuilder::new().build();

    harness.store.set_analytics_session_id(Some("analytics-9"));
    assert_eq!(
        harness.store.get_analytics_session_id().as_deref(),
        Some("analytics-9")
    );

    harness.store.set_analytics_session_id(None);
    assert!(harness.store.get_analytics_session_id().is_none());
}

#[test]
fn test_listeners_see_versions_in_order() {
    let harness = TestStoreBuilder::new().build();
    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());

    harness.store.set_chat_session_id(Some("a"));
    harness.store.set_analytics_session_id(Some("b"));
    harness.store.set_chat_session_id(None);

    assert_eq!(listener.versions(), vec![1, 2, 3]);
}

#[test]
fn test_listener_added_after_mutation_sees_next_one() {
    let harness = TestStoreBuilder::new().build();
    harness.store.set_chat_session_id(Some("before"));

    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());
    harness.store.set_chat_session_id(Some("after"));

    assert_eq!(listener.calls(), 1);
    assert_eq!(
        listener.last().unwrap().chat().current_conversation_id(),
        Some("after")
    );
}

#[test]
fn test_panicking_listener_does_not_block_others() {
    let harness = TestStoreBuilder::new().build();
    harness.store.add_listener(|_| panic!("listener bug"));
    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());

    harness.store.set_chat_session_id(Some("a"));
    harness.store.set_chat_session_id(Some("b"));

    assert_eq!(listener.calls(), 2);
    assert_eq!(harness.store.listener_count(), 2);
}

#[test]
fn test_listener_can_call_setter() {
    let harness = TestStoreBuilder::new().build();
    let handle = harness.store.clone();
    harness.store.add_listener(move |state| {
        if state.chat().current_conversation_id() == Some("chat-1")
            && state.analytics().session_id().is_none()
        {
            handle.set_analytics_session_id(Some("derived"));
        }
    });
    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());

    harness.store.set_chat_session_id(Some("chat-1"));

    // The nested change is delivered after the one that caused it.
    assert_eq!(listener.versions(), vec![1, 2]);
    assert_eq!(
        harness.store.get_analytics_session_id().as_deref(),
        Some("derived")
    );
}

#[test]
fn test_state_snapshot_is_a_copy() {
    let harness = TestStoreBuilder::new().build();
    let before = harness.store.get_state();

    harness.store.set_chat_session_id(Some("chat-1"));

    assert!(before.chat().current_conversation_id().is_none());
    assert_eq!(before.version(), 0);
}

// ============= Provider events =============

#[tokio::test]
async fn test_signed_out_event_keeps_analytics() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;
    harness.store.set_chat_session_id(Some("chat-1"));
    harness.store.set_analytics_session_id(Some("analytics-1"));

    // Signed out elsewhere: the provider no longer holds a credential.
    harness.provider.set_current(None);
    harness.provider.emit(CredentialEvent::SignedOut);
    wait_for(|| !harness.store.is_authenticated()).await;

    assert!(harness.store.get_chat_session_id().is_none());
    assert_eq!(
        harness.store.get_analytics_session_id().as_deref(),
        Some("analytics-1")
    );
}

#[tokio::test]
async fn test_token_refreshed_event_replaces_credential() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;

    let rotated = credential_expiring_in("refresh-rotated", 7200);
    harness.provider.set_current(Some(rotated.clone()));
    harness
        .provider
        .emit(CredentialEvent::TokenRefreshed(rotated.clone()));
    wait_for(|| harness.store.get_credential().as_ref() == Some(&rotated)).await;

    assert_eq!(harness.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn test_echoes_after_clear_all_sessions_are_ignored() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;
    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());

    harness.store.clear_all_sessions().await;
    // Late echoes of the initial validation and of the sign-out itself.
    harness
        .provider
        .emit(CredentialEvent::TokenRefreshed(valid_credential()));
    harness.provider.emit(CredentialEvent::SignedOut);

    // Events are handled in order, so once this lands the echoes are done.
    let rotated = credential_expiring_in("refresh-rotated", 7200);
    harness.provider.set_current(Some(rotated.clone()));
    harness
        .provider
        .emit(CredentialEvent::TokenRefreshed(rotated.clone()));
    wait_for(|| harness.store.get_credential().as_ref() == Some(&rotated)).await;

    let states = listener.states();
    assert_eq!(states.len(), 2);
    assert!(!states[0].is_authenticated());
    assert_eq!(states[1].auth().credential(), Some(&rotated));
}

#[tokio::test]
async fn test_stale_token_refreshed_event_is_ignored() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;
    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());

    let superseded = credential_expiring_in("refresh-superseded", 3600);
    let latest = credential_expiring_in("refresh-latest", 7200);
    harness.provider.set_current(Some(latest.clone()));
    harness
        .provider
        .emit(CredentialEvent::TokenRefreshed(superseded));
    harness
        .provider
        .emit(CredentialEvent::TokenRefreshed(latest.clone()));
    wait_for(|| harness.store.get_credential().as_ref() == Some(&latest)).await;

    assert_eq!(listener.calls(), 1);
}

#[tokio::test]
async fn test_sign_out_event_is_ignored_while_provider_holds_our_session() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;

    harness.provider.emit(CredentialEvent::SignedOut);
    let rotated = credential_expiring_in("refresh-rotated", 7200);
    harness.provider.set_current(Some(rotated.clone()));
    harness
        .provider
        .emit(CredentialEvent::TokenRefreshed(rotated.clone()));
    wait_for(|| harness.store.get_credential().as_ref() == Some(&rotated)).await;

    assert!(harness.store.is_authenticated());
}

#[tokio::test]
async fn test_signed_in_event_with_expired_credential_is_refreshed() {
    let harness = TestStoreBuilder::new().build();
    harness.store.initialize().await;
    assert!(!harness.store.is_authenticated());

    let fresh = credential_expiring_in("refresh-fresh", 3600);
    harness.provider.push_refresh_result(Ok(fresh.clone()));
    harness.provider.set_current(Some(expired_credential()));
    harness
        .provider
        .emit(CredentialEvent::SignedIn(expired_credential()));
    wait_for(|| harness.store.is_authenticated()).await;

    assert_eq!(harness.store.get_credential(), Some(fresh));
    assert_eq!(harness.provider.refresh_calls(), 1);
}

#[tokio::test]
async fn test_destroy_stops_event_consumption() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;
    assert_eq!(harness.provider.subscriber_count(), 1);

    harness.store.destroy();
    wait_for(|| harness.provider.subscriber_count() == 0).await;
    harness.provider.emit(CredentialEvent::SignedOut);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(harness.store.is_authenticated());
    assert_eq!(harness.store.phase(), SessionPhase::Idle);
}

// ============= Concurrency and teardown =============

#[tokio::test]
async fn test_concurrent_refresh_auth_refreshes_once() {
    let harness = TestStoreBuilder::new()
        .with_current(credential_expiring_in("refresh-1", 3600))
        .build();
    harness.store.initialize().await;

    harness.clock.advance(chrono::Duration::hours(2));
    harness
        .provider
        .push_refresh_result(Ok(credential_expiring_in("refresh-2", 3 * 3600)));
    harness.provider.set_refresh_delay(Duration::from_millis(20));

    let (first, second) = tokio::join!(harness.store.refresh_auth(), harness.store.refresh_auth());

    assert!(first);
    assert!(second);
    assert_eq!(harness.provider.refresh_calls(), 1);
    assert_eq!(
        harness.store.get_credential().map(|c| c.refresh_token().to_string()),
        Some("refresh-2".to_string())
    );
}

#[tokio::test]
async fn test_validate_auth_session_clears_rejected_session() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;

    harness.clock.advance(chrono::Duration::hours(2));
    harness
        .provider
        .push_refresh_result(Err(AuthError::revoked("refresh token revoked")));

    assert!(!harness.store.validate_auth_session().await);
    assert!(!harness.store.is_authenticated());
    assert!(harness.store.get_current_principal().is_none());
}

#[tokio::test]
async fn test_destroy_during_backoff_discards_result() {
    let harness = TestStoreBuilder::new()
        .with_current(expired_credential())
        .with_retry(
            RetryOptions::new(3, Duration::from_secs(600), Duration::from_secs(600)).unwrap(),
        )
        .with_real_sleeper()
        .build();
    harness.provider.push_refresh_result(Err(AuthError::network("offline")));
    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());

    let store = harness.store.clone();
    let init = tokio::spawn(async move { store.initialize().await });
    wait_for(|| harness.provider.refresh_calls() == 1).await;

    harness.store.destroy();
    tokio::time::timeout(Duration::from_secs(5), init)
        .await
        .expect("initialize should stop once destroyed")
        .unwrap();

    assert_eq!(harness.provider.refresh_calls(), 1);
    assert_eq!(listener.calls(), 0);
    assert_eq!(harness.store.get_state().version(), 0);
    assert_eq!(harness.store.phase(), SessionPhase::Idle);
}

#[test]
fn test_destroy_before_initialize_and_twice() {
    let harness = TestStoreBuilder::new().build();

    harness.store.destroy();
    harness.store.destroy();

    assert_eq!(harness.store.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_destroy_removes_listeners() {
    let harness = TestStoreBuilder::new().build();
    let listener = RecordingListener::new();
    harness.store.add_listener(listener.callback());

    harness.store.destroy();
    harness.store.set_chat_session_id(Some("after"));

    assert_eq!(listener.calls(), 0);
    assert_eq!(harness.store.listener_count(), 0);
}

// ============= Sign-in and guard =============

#[tokio::test]
async fn test_sign_in_publishes_session() {
    let harness = TestStoreBuilder::new().build();
    harness.store.initialize().await;
    harness.provider.set_sign_in_result(Ok(valid_credential()));

    let principal = harness
        .store
        .sign_in(&SignInInput::password("user-1@example.com", "hunter2"))
        .await
        .unwrap();

    assert_eq!(principal.id(), "user-1");
    assert!(harness.store.is_authenticated());
}

#[tokio::test]
async fn test_failed_sign_in_leaves_state_untouched() {
    let harness = TestStoreBuilder::new().build();
    harness.store.initialize().await;
    let version = harness.store.get_state().version();

    let err = harness
        .store
        .sign_in(&SignInInput::password("user-1@example.com", "wrong"))
        .await
        .unwrap_err();

    assert!(err.requires_reauth());
    assert_eq!(harness.store.get_state().version(), version);
    assert_eq!(harness.provider.sign_in_calls(), 1);
}

#[tokio::test]
async fn test_guard_retries_once_after_rejection() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;
    harness
        .provider
        .push_refresh_result(Ok(credential_expiring_in("refresh-2", 3600)));

    let attempts = Arc::new(AtomicUsize::new(0));
    let result = harness
        .store
        .with_valid_session(|credential| {
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AuthError::from_status(401, "token rejected"))
                } else {
                    Ok(credential.access_token().to_string())
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "access-refresh-2");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(harness.provider.refresh_calls(), 1);
}

#[tokio::test]
async fn test_guard_passes_through_other_errors() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;

    let result: Result<(), _> = harness
        .store
        .with_valid_session(|_| async { Err(AuthError::network("offline")) })
        .await;

    assert!(matches!(
        result,
        Err(GuardError::Operation(AuthError::Network { .. }))
    ));
    assert_eq!(harness.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn test_guard_without_session() {
    let harness = TestStoreBuilder::new().build();
    harness.store.initialize().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let result: Result<(), GuardError<AuthError>> = harness
        .store
        .with_valid_session(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

    assert!(matches!(result, Err(GuardError::NoSession { cause: None })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_guard_returns_original_error_when_reauth_fails() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;
    harness
        .provider
        .push_refresh_result(Err(AuthError::revoked("refresh token revoked")));

    let result: Result<(), _> = harness
        .store
        .with_valid_session(|_| async { Err(AuthError::from_status(401, "token rejected")) })
        .await;

    match result {
        Err(GuardError::Operation(AuthError::Authentication { message, .. })) => {
            assert_eq!(message, "token rejected");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!harness.store.is_authenticated());
}

#[tokio::test]
async fn test_guard_fallback_without_session() {
    let harness = TestStoreBuilder::new().build();
    harness.store.initialize().await;

    let result: Result<&str, AuthError> = harness
        .store
        .with_valid_session_or(|_| async { Ok("remote") }, || async { Ok("cached") })
        .await;

    assert_eq!(result.unwrap(), "cached");
}

#[tokio::test]
async fn test_guard_fallback_unused_when_operation_fails() {
    let harness = TestStoreBuilder::new().with_current(valid_credential()).build();
    harness.store.initialize().await;

    let fallbacks = Arc::new(AtomicUsize::new(0));
    let counter = fallbacks.clone();
    let result: Result<&str, AuthError> = harness
        .store
        .with_valid_session_or(
            |_| async { Err(AuthError::network("offline")) },
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("cached")
            },
        )
        .await;

    assert!(matches!(result, Err(AuthError::Network { .. })));
    assert_eq!(fallbacks.load(Ordering::SeqCst), 0);
}
