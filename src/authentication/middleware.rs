use warp::{reject::Rejection, Filter};

use crate::{
    api::state::AppState,
    cache::cache::is_session_revoked,
    error::{Error, HttpError},
};

use super::{
    jwt::{verify_jwt_session, SessionData},
    permissions::require_session,
};

/// Pulls the token out of `Authorization: Token <jwt>` or `Bearer <jwt>`.
pub fn parse_authorization(header: &str) -> Result<&str, Error> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| HttpError::Unauthorized.new("Invalid token header"))?;

    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return Err(HttpError::Unauthorized.new("Invalid token header"));
    }

    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return Err(HttpError::Unauthorized.new("Invalid token header"));
    }

    Ok(token)
}

async fn resolve_session(
    header: Option<String>,
    state: AppState,
) -> Result<Option<SessionData>, Rejection> {
    let Some(header) = header else {
        return Ok(None);
    };

    let token = parse_authorization(&header)?;
    let session: SessionData = verify_jwt_session(token, state.config.jwt_secret.as_bytes())?.into();

    let mut cache = state.cache.clone();
    if is_session_revoked(&session.token_id, &mut cache).await? {
        return Err(HttpError::Unauthorized
            .new("Invalid session; Token revoked")
            .into());
    }

    Ok(Some(session))
}

/// Session of the caller. Anonymous requests extract `None`, a present but
/// invalid token rejects the request.
pub fn with_possible_session(
    state: AppState,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        resolve_session(header, state.clone())
    })
}

/// Turns an optional session into a required one. Placed ahead of body
/// filters so anonymous writes fail with 401 before the payload is parsed.
pub fn signed_in<F>(session: F) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone
where
    F: Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone,
{
    session.and_then(|session: Option<SessionData>| async move {
        require_session(session).map_err(warp::reject::custom)
    })
}

pub fn with_session(
    state: AppState,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    signed_in(with_possible_session(state))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Token abc.def.ghi")]
    #[case("Bearer abc.def.ghi")]
    #[case("token   abc.def.ghi ")]
    fn known_schemes_are_accepted(#[case] header: &str) {
        assert_eq!(parse_authorization(header).unwrap(), "abc.def.ghi");
    }

    #[rstest]
    #[case("abc.def.ghi")]
    #[case("Basic dXNlcjpwYXNz")]
    #[case("Token ")]
    #[case("Token abc def")]
    fn other_headers_are_unauthorized(#[case] header: &str) {
        let error = parse_authorization(header).unwrap_err();

        assert_eq!(error.kind, HttpError::Unauthorized);
    }
}
