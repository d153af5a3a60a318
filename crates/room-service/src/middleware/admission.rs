//! Room gates.
//!
//! - `require_admission` guards the room page. It runs the admission
//!   algorithm, hands a fresh participant cookie to newcomers, and redirects
//!   refused visitors to the landing page with a reason code.
//! - `require_participant` guards the room API. It only lets existing
//!   members through and answers everyone else with a JSON error. It never
//!   mints a token.
//!
//! The participant token travels in a per-room cookie named
//! `x-auth-token-{roomId}`.

use crate::errors::RoomError;
use crate::models::ttl_seconds;
use crate::routes::AppState;
use crate::services::Admission;
use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use common::types::{ParticipantToken, RoomId};
use cookie::{time, Cookie, SameSite};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Prefix of the per-room participant cookie.
pub const AUTH_COOKIE_PREFIX: &str = "x-auth-token-";

/// An admitted participant, inserted into request extensions by the gates.
#[derive(Debug, Clone)]
pub struct Participant {
    pub room_id: RoomId,
}

/// Cookie name for a room.
pub fn auth_cookie_name(room_id: &RoomId) -> String {
    format!("{AUTH_COOKIE_PREFIX}{room_id}")
}

/// Find the room's participant token among the request cookies.
///
/// Quoted values are unquoted. Malformed values are treated as absent.
pub fn token_from_cookies(headers: &HeaderMap, room_id: &RoomId) -> Option<ParticipantToken> {
    let name = auth_cookie_name(room_id);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .and_then(|cookie| ParticipantToken::parse(cookie.value_trimmed()).ok())
}

/// `Set-Cookie` value carrying a newly issued token.
///
/// The cookie lives exactly as long as the room has left.
fn issue_cookie(
    room_id: &RoomId,
    token: &ParticipantToken,
    remaining: Duration,
    secure: bool,
) -> Result<HeaderValue, RoomError> {
    let max_age = i64::try_from(ttl_seconds(remaining)).unwrap_or(i64::MAX);
    let cookie = Cookie::build((auth_cookie_name(room_id), token.expose().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(max_age))
        .secure(secure)
        .build();

    HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| RoomError::Internal(format!("Invalid cookie header: {e}")))
}

/// Gate for the room page.
///
/// # Response
///
/// - Continues with `Participant` in extensions, adding `Set-Cookie` when a
///   token was minted
/// - 303 to `{landing}?error=room-not-found` or `{landing}?error=room-full`
///   when refused
/// - JSON error for store failures
#[instrument(skip_all, name = "room.middleware.admission")]
pub async fn require_admission(
    State(state): State<Arc<AppState>>,
    Path(raw_room_id): Path<String>,
    mut req: Request,
    next: Next,
) -> Response {
    let Ok(room_id) = RoomId::parse(&raw_room_id) else {
        return refuse(&state, &RoomError::RoomNotFound);
    };
    let presented = token_from_cookies(req.headers(), &room_id);

    let admission = match state.admission.admit(&room_id, presented.as_ref()).await {
        Ok(admission) => admission,
        Err(e) if e.reason_code().is_some() => return refuse(&state, &e),
        Err(e) => return e.into_response(),
    };

    let cookie = match &admission {
        Admission::Issued(token) => {
            let remaining = match state.lifecycle.remaining_ttl(&room_id).await {
                Ok(Some(remaining)) => remaining,
                Ok(None) => return refuse(&state, &RoomError::RoomNotFound),
                Err(e) => return e.into_response(),
            };
            match issue_cookie(&room_id, token, remaining, state.config.cookie_secure) {
                Ok(cookie) => Some(cookie),
                Err(e) => return e.into_response(),
            }
        }
        Admission::Existing(_) => None,
    };

    req.extensions_mut().insert(Participant { room_id });

    let mut response = next.run(req).await;
    if let Some(cookie) = cookie {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

fn refuse(state: &AppState, error: &RoomError) -> Response {
    let reason = error.reason_code().unwrap_or("room-not-found");
    tracing::debug!(target: "room.middleware.admission", reason, "Redirecting refused visitor");
    Redirect::to(&format!("{}?error={reason}", state.config.landing_url)).into_response()
}

/// Gate for the room API. Members only.
///
/// # Response
///
/// - 404 `ROOM_NOT_FOUND` if the room is gone or the id is malformed
/// - 403 `NOT_A_PARTICIPANT` if the caller holds no member token
/// - Continues with `Participant` in extensions otherwise
#[instrument(skip_all, name = "room.middleware.participant")]
pub async fn require_participant(
    State(state): State<Arc<AppState>>,
    Path(raw_room_id): Path<String>,
    mut req: Request,
    next: Next,
) -> Result<Response, RoomError> {
    let room_id = RoomId::parse(&raw_room_id).map_err(|_| RoomError::RoomNotFound)?;
    let presented = token_from_cookies(req.headers(), &room_id);

    state.admission.verify(&room_id, presented.as_ref()).await?;
    req.extensions_mut().insert(Participant { room_id });

    Ok(next.run(req).await)
}
