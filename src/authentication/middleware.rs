use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use crate::{
    actions::session_exists,
    api::state::{with_state, State},
    error::ApiError,
};

use super::jwt::{verify_jwt_session, SessionData};

/// Accepts `Token <jwt>` as well as `Bearer <jwt>`.
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    match scheme {
        "Token" | "Bearer" if !token.is_empty() => Some(token),
        _ => None,
    }
}

async fn resolve_session(header: &str, state: &State) -> Result<SessionData, ApiError> {
    let token = parse_authorization(header)
        .ok_or_else(|| ApiError::Unauthorized("Malformed authorization header".into()))?;

    let session: SessionData = verify_jwt_session(token, &state.config.secret)?.into();

    if !session_exists(session.session_id, session.user_id, &state.pool).await? {
        return Err(ApiError::Unauthorized(
            "Invalid session; Token revoked".into(),
        ));
    }

    Ok(session)
}

pub fn with_session(
    state: Arc<State>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(|header: Option<String>, state: Arc<State>| async move {
            let header = header.ok_or_else(|| {
                warp::reject::custom(ApiError::Unauthorized(
                    "Authentication credentials were not provided".into(),
                ))
            })?;

            resolve_session(&header, &state)
                .await
                .map_err(warp::reject::custom)
        })
}

/// Anonymous callers pass through as `None`; a token that is present but
/// invalid is still rejected.
pub fn with_possible_session(
    state: Arc<State>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(|header: Option<String>, state: Arc<State>| async move {
            match header {
                Some(header) => resolve_session(&header, &state)
                    .await
                    .map(Some)
                    .map_err(warp::reject::custom),
                None => Ok(None),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_schemes() {
        assert_eq!(parse_authorization("Token abc.def"), Some("abc.def"));
        assert_eq!(parse_authorization("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("Token "), None);
        assert_eq!(parse_authorization("abc"), None);
    }
}
