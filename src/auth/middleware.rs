use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

use crate::AppState;

use super::jwt;

const COOKIE_NAME: &str = "token";

/// An authenticated caller. Any valid token counts; there are no roles.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

async fn caller_from_parts(parts: &mut Parts, state: &AppState) -> Option<AuthUser> {
    let token = match bearer_token(parts) {
        Some(t) => t,
        None => {
            let jar = <CookieJar as FromRequestParts<AppState>>::from_request_parts(parts, state)
                .await
                .ok()?;
            jar.get(COOKIE_NAME)?.value().to_string()
        }
    };

    let claims = jwt::validate_token(&token, &state.config.jwt_secret).ok()?;
    Some(AuthUser {
        subject: claims.sub,
    })
}

/// Only available as `Option<AuthUser>`: a missing or bad token is `None`
/// and the handler decides what that means.
impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(caller_from_parts(parts, state).await)
    }
}
