use chrono::{Duration, Local};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::{error::ApiError, schema::Id};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    /// Row id in `auth_sessions`; deleting the row revokes the token.
    pub session_id: Uuid,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, session_id: Uuid, ttl: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + ttl).timestamp();

        Self {
            user_id: id,
            username,
            session_id,
            iat,
            exp,
        }
    }

    pub fn is_expired(&self) -> bool {
        (self.exp - Local::now().timestamp()).is_negative()
    }
}

/// The authenticated caller, passed explicitly to every operation that acts
/// on their behalf.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub session_id: Uuid,
}

impl Into<SessionData> for JwtSessionData {
    fn into(self) -> SessionData {
        SessionData {
            user_id: self.user_id,
            username: self.username,
            session_id: self.session_id,
        }
    }
}

fn signing_key(secret: &str) -> Result<Hmac<Sha256>, ApiError> {
    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::Storage(format!("Invalid signing key: {e}")))
}

pub fn generate_jwt_session(claims: &JwtSessionData, secret: &str) -> Result<String, ApiError> {
    let key = signing_key(secret)?;

    claims
        .sign_with_key(&key)
        .map_err(|e| ApiError::Storage(format!("Failed to sign session: {e}")))
}

pub fn verify_jwt_session(token: &str, secret: &str) -> Result<JwtSessionData, ApiError> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| ApiError::Unauthorized("Invalid session; Invalid token".into()))?;

    if session.is_expired() {
        return Err(ApiError::Unauthorized(
            "Invalid session; Token expired".into(),
        ));
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SECRET: &str = "test-secret";

    #[test]
    fn signed_session_verifies() {
        let session_id = Uuid::new_v4();
        let claims = JwtSessionData::new(7, "cook".into(), session_id, Duration::hours(1));
        let token = generate_jwt_session(&claims, SECRET).unwrap();

        let verified = verify_jwt_session(&token, SECRET).unwrap();
        let session: SessionData = verified.into();

        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "cook");
        assert_eq!(session.session_id, session_id);
    }

    #[test]
    fn expired_session_is_rejected() {
        let claims = JwtSessionData::new(7, "cook".into(), Uuid::new_v4(), Duration::hours(-1));
        let token = generate_jwt_session(&claims, SECRET).unwrap();

        let err = verify_jwt_session(&token, SECRET).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let claims = JwtSessionData::new(7, "cook".into(), Uuid::new_v4(), Duration::hours(1));
        let token = generate_jwt_session(&claims, "other-secret").unwrap();

        assert!(verify_jwt_session(&token, SECRET).is_err());
        assert!(verify_jwt_session("garbage", SECRET).is_err());
    }
}
