//! End-to-end policy flows over the in-memory host: forced-rotation login
//! redirects, recovery completion, and out-of-band administrative edits all
//! converging through the reconciler.

use anyhow::Result;
use secrecy::SecretString;

use rekey::policy::classify::{classify_account, Classification};
use rekey::policy::credential::{clear_credential, current_token, ensure_credential};
use rekey::policy::login::{intercept_login, LoginDecision, LoginSubmission};
use rekey::policy::reconcile::apply_change;
use rekey::policy::recovery::{
    intercept_recovery_confirm, RecoveryConfirmation, RecoveryDecision, RecoveryOutcome,
};
use rekey::policy::AuthOutcome;
use rekey::testkit::TestHost;

fn email_login(email: &str, return_url: Option<&str>) -> LoginSubmission {
    LoginSubmission {
        email: Some(email.to_string()),
        username: None,
        return_url: return_url.map(ToString::to_string),
    }
}

/// Scenario A: a flagged account logging in with the correct password is
/// signed out and redirected with a fresh token; the reconciler's later
/// handling of the flag event is a no-op on the same token.
#[tokio::test]
async fn scenario_a_flagged_login_redirects() -> Result<()> {
    let host = TestHost::new();
    let alice = host.add_account("alice", "alice@example.com", "correct-password");
    host.flag_account(alice.id).await?;
    let flag_event = host.drain_events().await.pop().expect("flag event");
    let ctx = host.context();

    // Successful authentication happens first; the interceptor sees it.
    let session = host.authenticator.issue_session(alice.id);
    let decision = intercept_login(
        &ctx,
        &email_login("alice@example.com", Some("/dashboard")),
        AuthOutcome::Granted {
            session_token: session.clone(),
        },
    )
    .await?;

    let LoginDecision::RedirectToRecovery {
        token,
        email,
        return_url,
    } = decision
    else {
        panic!("expected a recovery redirect");
    };
    assert!(!token.is_empty());
    assert_eq!(email, "alice@example.com");
    assert_eq!(return_url.as_deref(), Some("/dashboard"));
    assert!(!host.authenticator.session_active(&session));

    // The flag event arrives later; the credential is already in place.
    apply_change(&ctx, &flag_event).await?;
    assert_eq!(current_token(ctx.store(), alice.id).await?, Some(token));
    Ok(())
}

/// Scenario B: completing recovery rewrites the flag, signs the caller in
/// with the new password, and the reconciler clears the credential from the
/// blob-update event.
#[tokio::test]
async fn scenario_b_recovery_completes_and_credential_clears() -> Result<()> {
    let host = TestHost::new();
    let alice = host.add_account("alice", "alice@example.com", "old-password");
    host.flag_account(alice.id).await?;
    let ctx = host.context();
    ensure_credential(ctx.store(), alice.id).await?;
    host.drain_events().await;

    // Base action: the host stores the new password before the interceptor
    // runs.
    host.accounts.set_password(alice.id, "new-password");
    let decision = intercept_recovery_confirm(
        &ctx,
        &RecoveryConfirmation {
            email: "alice@example.com".to_string(),
            new_password: SecretString::from("new-password".to_string()),
            return_url: Some("/dashboard".to_string()),
        },
        RecoveryOutcome::PasswordChanged,
    )
    .await?;

    let RecoveryDecision::Authenticated {
        session_token,
        return_url,
    } = decision
    else {
        panic!("expected an authenticated decision");
    };
    assert!(host.authenticator.session_active(&session_token));
    assert_eq!(return_url.as_deref(), Some("/dashboard"));
    assert_eq!(
        classify_account(&ctx, alice.id).await?,
        Classification::NotRequired
    );

    // The interceptor left the credential alone; the reconciler clears it.
    assert!(current_token(ctx.store(), alice.id).await?.is_some());
    for event in host.drain_events().await {
        apply_change(&ctx, &event).await?;
    }
    assert_eq!(current_token(ctx.store(), alice.id).await?, None);

    // A follow-up login now passes through untouched.
    let outcome = AuthOutcome::Granted {
        session_token: host.authenticator.issue_session(alice.id),
    };
    let decision = intercept_login(
        &ctx,
        &email_login("alice@example.com", None),
        outcome.clone(),
    )
    .await?;
    assert_eq!(decision, LoginDecision::PassThrough(outcome));
    Ok(())
}

/// Scenario C: an administrative tool flags bob directly in storage; the
/// reconciler alone creates his credential, and his next login is redirected
/// carrying that same token.
#[tokio::test]
async fn scenario_c_admin_edit_converges_via_reconciler() -> Result<()> {
    let host = TestHost::new();
    let bob = host.add_account("bob", "bob@example.com", "bobs-password");
    let ctx = host.context();

    host.flag_account(bob.id).await?;
    for event in host.drain_events().await {
        apply_change(&ctx, &event).await?;
    }

    let token = current_token(ctx.store(), bob.id).await?;
    let token = token.expect("reconciler should have created a credential");

    let session = host.authenticator.issue_session(bob.id);
    let decision = intercept_login(
        &ctx,
        &email_login("bob@example.com", None),
        AuthOutcome::Granted {
            session_token: session,
        },
    )
    .await?;

    assert!(matches!(
        decision,
        LoginDecision::RedirectToRecovery { token: redirect_token, .. }
            if redirect_token == token
    ));
    Ok(())
}

/// Credential mutations are idempotent: repeated ensures return the same
/// token, repeated clears stay cleared.
#[tokio::test]
async fn credential_idempotence() -> Result<()> {
    let host = TestHost::new();
    let account = host.add_account("carol", "carol@example.com", "pw");
    let ctx = host.context();

    let first = ensure_credential(ctx.store(), account.id).await?;
    let second = ensure_credential(ctx.store(), account.id).await?;
    assert_eq!(first, second);

    clear_credential(ctx.store(), account.id).await?;
    clear_credential(ctx.store(), account.id).await?;
    assert_eq!(current_token(ctx.store(), account.id).await?, None);
    Ok(())
}

/// Replaying a recorded event sequence with duplicates and reorderings
/// converges to the state implied by the last distinct blob write.
#[tokio::test]
async fn reconciler_convergence_under_redelivery() -> Result<()> {
    let host = TestHost::new();
    let account = host.add_account("dave", "dave@example.com", "pw");
    let ctx = host.context();

    host.flag_account(account.id).await?;
    host.unflag_account(account.id).await?;
    host.flag_account(account.id).await?;
    let events = host.drain_events().await;
    assert_eq!(events.len(), 3);

    // In-order, with duplicates.
    for event in events.iter().chain(events.iter()) {
        apply_change(&ctx, event).await?;
    }
    let token = current_token(ctx.store(), account.id).await?;
    assert!(token.is_some(), "last write flagged the account");

    // Reversed redelivery of the same events must not clear the credential.
    for event in events.iter().rev() {
        apply_change(&ctx, event).await?;
    }
    assert_eq!(current_token(ctx.store(), account.id).await?, token);

    // Now the flag really goes off; any replay order converges to cleared.
    host.unflag_account(account.id).await?;
    let mut all = events;
    all.extend(host.drain_events().await);
    for event in all.iter().rev().chain(all.iter()) {
        apply_change(&ctx, event).await?;
    }
    assert_eq!(current_token(ctx.store(), account.id).await?, None);
    Ok(())
}

/// The credential writes the reconciler itself performs do not feed back
/// into flag state: replaying them is harmless.
#[tokio::test]
async fn reconciler_self_events_are_inert() -> Result<()> {
    let host = TestHost::new();
    let account = host.add_account("erin", "erin@example.com", "pw");
    let ctx = host.context();

    host.flag_account(account.id).await?;
    for event in host.drain_events().await {
        apply_change(&ctx, &event).await?;
    }
    let token = current_token(ctx.store(), account.id).await?;

    // ensure_credential emitted token/date events of its own; replaying
    // them changes nothing.
    for event in host.drain_events().await {
        apply_change(&ctx, &event).await?;
    }
    assert_eq!(current_token(ctx.store(), account.id).await?, token);
    Ok(())
}
