use crate::{
    error::{Error, HttpError},
    jwt::SessionData,
    schema::Uuid,
};

/// Who may perform an action. Reads are public, memberships and authoring
/// need a session, changing a recipe needs the session of its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Anyone,
    Authenticated,
    Author(Uuid),
}

impl Access {
    pub fn authenticate(self, session: Option<&SessionData>) -> Result<(), Error> {
        match (self, session) {
            (Access::Anyone, _) => Ok(()),
            (_, None) => Err(HttpError::Unauthorized.default()),
            (Access::Authenticated, Some(_)) => Ok(()),
            (Access::Author(author_id), Some(session)) => {
                if session.user_id == author_id {
                    Ok(())
                } else {
                    Err(HttpError::Forbidden.default())
                }
            }
        }
    }
}

impl SessionData {
    pub fn authenticate(&self, access: Access) -> Result<(), Error> {
        access.authenticate(Some(self))
    }
}

/// Unwraps the session of a request that must be authenticated.
pub fn require_session(session: Option<SessionData>) -> Result<SessionData, Error> {
    Access::Authenticated.authenticate(session.as_ref())?;
    session.ok_or_else(|| HttpError::Unauthorized.default())
}
