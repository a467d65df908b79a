use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::database::schema::User;
use crate::error::{Error, HttpError};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: i32,
    pub username: String,
    pub jti: String,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: i32, username: String, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            jti: Uuid::new_v4().to_string(),
            iat,
            exp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionData {
    pub user_id: i32,
    pub username: String,
    pub token_id: String,
    pub expires_at: i64,
}

impl SessionData {
    /// Seconds until the token stops being accepted.
    pub fn remaining_lifetime(&self) -> u64 {
        let now = Local::now().timestamp();
        u64::try_from(self.expires_at - now).unwrap_or(0)
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            token_id: value.jti,
            expires_at: value.exp,
        }
    }
}

fn signing_key(secret: &[u8]) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(secret)
        .map_err(|_| HttpError::InternalServerError.new("Invalid session signing key"))
}

pub fn generate_jwt_session(user: &User, secret: &[u8], lifetime: Duration) -> Result<String, Error> {
    let key = signing_key(secret)?;
    let claims = JwtSessionData::new(user.id, user.username.to_owned(), lifetime);

    claims
        .sign_with_key(&key)
        .map_err(|e| HttpError::InternalServerError.new(&format!("Failed to sign session: {e}")))
}

pub fn verify_jwt_session(token: &str, secret: &[u8]) -> Result<JwtSessionData, Error> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| HttpError::Unauthorized.new("Invalid session; Invalid token"))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(HttpError::Unauthorized.new("Invalid session; Token expired"));
    }

    Ok(session)
}
