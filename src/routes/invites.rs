use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::invite::{ValidateInviteRequest, Verdict};
use crate::verify::validate_invite;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/invites/validate", post(validate))
}

async fn validate(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    body: Result<Json<ValidateInviteRequest>, JsonRejection>,
) -> Result<Json<Verdict>, AppError> {
    // An unreadable body is just a request without an inviteId; the
    // authentication check still has to come first.
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let verdict = validate_invite(
        &state.store,
        &state.clock,
        auth.as_ref(),
        body.invite_id.as_deref(),
    )
    .await?;

    Ok(Json(verdict))
}
