//! `GET/PATCH /api/user/profile` (bare)

use axum::extract::State;
use axum::Json;

use crate::http::{ApiError, AppState, Authenticated, Legacy, Valid};
use crate::store::{StoreError, User, UserPatch};

pub async fn show(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
) -> Result<Json<User>, Legacy> {
    let user = state
        .users
        .find_user(session.user_id)
        .await
        .map_err(|e| ApiError::from(e).public("Failed to fetch profile"))?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

pub async fn update(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    Valid(patch): Valid<UserPatch>,
) -> Result<Json<User>, Legacy> {
    let user = state
        .users
        .update_user(session.user_id, patch)
        .await
        .map_err(|e| match e {
            StoreError::NotFound(_) => ApiError::NotFound("User not found".into()),
            other => ApiError::from(other).public("Failed to update profile"),
        })?;

    state.sessions.refresh_identity(&user);
    Ok(Json(user))
}
