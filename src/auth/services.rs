use axum::extract::FromRef;
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::AuthResponse,
        jwt::JwtKeys,
        password::{hash_password, verify_against_dummy, verify_password},
        repo_types::PasswordResetToken,
    },
    error::{AppError, AppResult},
    mailer::Email,
    state::AppState,
    users::repo_types::UserSummary,
};

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// 24 random bytes, hex encoded.
fn make_reset_token() -> String {
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Verifies email and password and issues a session credential. Unknown email and
/// wrong password fail identically.
#[instrument(skip(st, password))]
pub async fn authenticate(st: &AppState, email: &str, password: &str) -> AppResult<AuthResponse> {
    let email = normalize_email(email);

    let Some(user) = st.users.find_by_email(&email).await? else {
        verify_against_dummy(password);
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    // A malformed stored hash counts as a mismatch.
    if !verify_password(password, &user.password_hash).unwrap_or(false) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = JwtKeys::from_ref(st).sign(user.id, user.role)?;
    info!(user_id = %user.id, role = %user.role, "user logged in");
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

/// Verifies a session credential and re-reads the account it names.
pub async fn resolve_identity(st: &AppState, token: &str) -> AppResult<UserSummary> {
    let claims = JwtKeys::from_ref(st).verify(token).map_err(|e| {
        warn!(error = %e, "invalid session token");
        AppError::InvalidToken
    })?;
    let user = st.users.get(claims.sub).await?.ok_or_else(|| {
        warn!(user_id = %claims.sub, "session for missing user");
        AppError::UnknownUser
    })?;
    Ok(user.into())
}

/// Starts the reset flow. The outcome is the same whether or not the email matches.
#[instrument(skip(st))]
pub async fn request_password_reset(st: &AppState, email: Option<&str>) -> AppResult<()> {
    let email = normalize_email(email.unwrap_or_default());
    if email.is_empty() {
        return Err(AppError::validation("Missing email"));
    }

    let Some(user) = st.users.find_by_email(&email).await? else {
        info!(email = %email, "password reset requested for unknown email");
        return Ok(());
    };

    let reset = PasswordResetToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        token: make_reset_token(),
        expires_at: OffsetDateTime::now_utc() + Duration::minutes(st.config.reset_ttl_minutes),
        used: false,
    };
    st.resets.insert(&reset).await?;

    let link = st.config.reset_link(&reset.token);
    st.mailer.dispatch(Email::password_reset(&user.email, &link));
    info!(user_id = %user.id, "password reset token issued");
    Ok(())
}

/// Completes the reset flow. Checks run in order: unknown, used, expired.
#[instrument(skip_all)]
pub async fn confirm_password_reset(
    st: &AppState,
    token: Option<&str>,
    new_password: Option<&str>,
) -> AppResult<()> {
    let (token, new_password) = match (token, new_password) {
        (Some(t), Some(p)) if !t.is_empty() && !p.is_empty() => (t, p),
        _ => return Err(AppError::validation("Missing fields")),
    };

    let reset = st
        .resets
        .find_by_token(token)
        .await?
        .ok_or(AppError::ResetTokenInvalid)?;
    if reset.used {
        return Err(AppError::TokenUsed);
    }
    if reset.expires_at < OffsetDateTime::now_utc() {
        return Err(AppError::TokenExpired);
    }

    let hash = hash_password(new_password)?;
    st.users.update_password(reset.user_id, &hash).await?;
    st.resets.mark_used(reset.id).await?;

    if let Some(user) = st.users.get(reset.user_id).await? {
        st.mailer.dispatch(Email::password_changed(&user.email, &user.name));
    }
    info!(user_id = %reset.user_id, "password reset completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_user, settle, PASSWORD};
    use crate::users::repo_types::Role;

    #[test]
    fn email_validation_and_normalisation() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("no-at-sign"));
        assert_eq!(normalize_email("  Mixed@Example.COM "), "mixed@example.com");
    }

    #[test]
    fn reset_tokens_are_long_and_distinct() {
        let a = make_reset_token();
        assert_eq!(a.len(), 48);
        assert_ne!(a, make_reset_token());
    }

    #[tokio::test]
    async fn login_issues_resolvable_credential() {
        let (st, _) = AppState::fake();
        let staff = add_user(&st, Role::Staff, "staff@example.com").await;

        let res = authenticate(&st, " Staff@Example.com", PASSWORD).await.unwrap();
        assert_eq!(res.user, staff);

        let who = resolve_identity(&st, &res.token).await.unwrap();
        assert_eq!(who.id, staff.id);
        assert_eq!(who.role, Role::Staff);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_fail_the_same_way() {
        let (st, _) = AppState::fake();
        add_user(&st, Role::Client, "c@example.com").await;

        let unknown = authenticate(&st, "nobody@example.com", PASSWORD).await.unwrap_err();
        let wrong = authenticate(&st, "c@example.com", "nope").await.unwrap_err();
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn credential_of_deleted_user_is_rejected() {
        let (st, _) = AppState::fake();
        let staff = add_user(&st, Role::Staff, "gone@example.com").await;
        let res = authenticate(&st, "gone@example.com", PASSWORD).await.unwrap();
        st.users.delete(staff.id).await.unwrap();

        let err = resolve_identity(&st, &res.token).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownUser));
        let err = resolve_identity(&st, "garbage").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn reset_succeeds_once_then_reports_used() {
        let (st, mail) = AppState::fake();
        add_user(&st, Role::Client, "reset@example.com").await;

        request_password_reset(&st, Some("reset@example.com")).await.unwrap();
        settle().await;
        let sent = mail.sent_to("reset@example.com");
        assert_eq!(sent.len(), 1);
        let token = sent[0]
            .body
            .split("token=")
            .nth(1)
            .and_then(|s| s.split_whitespace().next())
            .unwrap()
            .to_string();
        assert!(sent[0].body.contains("http://portal.test/reset.html?token="));

        confirm_password_reset(&st, Some(&token), Some("new-secret")).await.unwrap();
        let again = confirm_password_reset(&st, Some(&token), Some("other")).await.unwrap_err();
        assert!(matches!(again, AppError::TokenUsed));

        assert!(authenticate(&st, "reset@example.com", "new-secret").await.is_ok());
        assert!(authenticate(&st, "reset@example.com", PASSWORD).await.is_err());

        settle().await;
        let changed = mail.sent_to("reset@example.com");
        assert!(changed.iter().any(|e| e.subject == "Your password was changed"));
    }

    #[tokio::test]
    async fn reset_failures_are_specific_and_ordered() {
        let (st, _) = AppState::fake();
        let user = add_user(&st, Role::Staff, "s@example.com").await;

        let err = confirm_password_reset(&st, Some("unknown"), Some("x")).await.unwrap_err();
        assert!(matches!(err, AppError::ResetTokenInvalid));

        let expired = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token: "expired-token".into(),
            expires_at: OffsetDateTime::now_utc() - Duration::minutes(1),
            used: false,
        };
        st.resets.insert(&expired).await.unwrap();
        let err = confirm_password_reset(&st, Some("expired-token"), Some("x")).await.unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));

        // used takes precedence over expired
        let used_and_expired = PasswordResetToken {
            id: Uuid::new_v4(),
            token: "used-expired".into(),
            used: true,
            ..expired
        };
        st.resets.insert(&used_and_expired).await.unwrap();
        let err = confirm_password_reset(&st, Some("used-expired"), Some("x")).await.unwrap_err();
        assert!(matches!(err, AppError::TokenUsed));

        let err = confirm_password_reset(&st, None, Some("x")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn reset_request_for_unknown_email_looks_like_success() {
        let (st, mail) = AppState::fake();
        request_password_reset(&st, Some("ghost@example.com")).await.unwrap();
        settle().await;
        assert!(mail.sent().is_empty());
    }
}
