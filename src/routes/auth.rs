//! Account routes: signup, signin, signout, password reset.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use chrono::{Duration, Utc};

use crate::auth::{bearer_token, hash_password, verification_token, verify_password};
use crate::http::{ApiError, AppState, Authenticated, Envelope, Legacy, Valid};
use crate::store::{NewUser, VerificationToken};

const EMAIL_TAKEN: &str = "An account with this email already exists";

#[derive(Debug, Deserialize)]
pub struct SignupBody {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordBody {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninBody {
    pub email: String,
    pub password: String,
}

/// `POST /api/auth/signup` (bare, 201)
pub async fn signup(
    State(state): State<AppState>,
    Valid(body): Valid<SignupBody>,
) -> Result<(StatusCode, Json<Value>), Legacy> {
    if state.users.find_user_by_email(&body.email).await?.is_some() {
        return Err(ApiError::bad_request(EMAIL_TAKEN).into());
    }

    let password_hash = hash_password(&body.password, state.config.auth.bcrypt_cost)
        .await
        .map_err(|e| ApiError::from(e).public("Something went wrong"))?;

    let user = state
        .users
        .create_user(NewUser {
            name: body.name,
            email: body.email,
            password_hash,
        })
        .await?;

    let expires = i64::try_from(state.config.auth.verification_token_ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| ApiError::internal("verification token lifetime out of range"))?;
    state
        .tokens
        .create_token(VerificationToken {
            identifier: user.email.clone(),
            token: verification_token(),
            expires,
            user_id: Some(user.id),
        })
        .await?;

    tracing::info!(user_id = user.id, "Account created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": { "id": user.id, "name": user.name, "email": user.email },
            "message": "Account created successfully.",
        })),
    ))
}

/// `POST /api/auth/reset-password` (bare)
pub async fn reset_password(
    State(state): State<AppState>,
    Valid(body): Valid<ResetPasswordBody>,
) -> Result<Json<Value>, Legacy> {
    let password_hash = hash_password(&body.password, state.config.auth.bcrypt_cost)
        .await
        .map_err(|e| ApiError::from(e).public("Failed to reset password"))?;

    let user_id = state
        .tokens
        .reset_password(&body.token, password_hash, Utc::now())
        .await?;
    let revoked = state.sessions.revoke_user(user_id);

    tracing::info!(user_id, revoked, "Password reset");
    Ok(Json(json!({ "message": "Password reset successful" })))
}

/// `POST /api/auth/signin`
pub async fn signin(
    State(state): State<AppState>,
    Valid(body): Valid<SigninBody>,
) -> Result<Envelope<Value>, ApiError> {
    let Some(user) = state.users.find_user_by_email(&body.email).await? else {
        tracing::debug!("Sign-in for unknown email");
        return Err(ApiError::Unauthenticated);
    };
    if !verify_password(&body.password, &user.password_hash).await? {
        tracing::debug!(user_id = user.id, "Sign-in with wrong password");
        return Err(ApiError::Unauthenticated);
    }

    let (token, session) = state.sessions.issue(&user);
    Ok(Envelope::ok(json!({
        "token": token,
        "expiresAt": session.expires_at_ms,
        "user": user,
    }))
    .with_message("Signed in"))
}

/// `DELETE /api/auth/session`
pub async fn signout(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    headers: HeaderMap,
) -> Envelope<()> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(token);
    }
    tracing::debug!(user_id = session.user_id, "Signed out");
    Envelope::message_only("Signed out")
}
