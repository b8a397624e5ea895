use axum::{
    extract::{FromRef, FromRequestParts},
    headers::{authorization::Bearer, Authorization},
    http::request::Parts,
    RequestPartsExt, TypedHeader,
};
use jsonwebtoken::TokenData;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, UnauthorizedType};

/// Keys for the identity-provider token format. The provider itself lives
/// outside this service; we only verify what it signed.
#[derive(Clone)]
pub struct IdentityState {
    validation: jsonwebtoken::Validation,
    header: jsonwebtoken::Header,

    encoding_key: jsonwebtoken::EncodingKey,
    decoding_key: jsonwebtoken::DecodingKey,
}

impl IdentityState {
    pub fn new(secret: &[u8]) -> Self {
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        // expiry is checked by hand so the caller gets a precise error
        validation.validate_exp = false;

        Self {
            header,
            validation,

            encoding_key: jsonwebtoken::EncodingKey::from_secret(secret),
            decoding_key: jsonwebtoken::DecodingKey::from_secret(secret),
        }
    }

    pub fn new_from_env() -> Self {
        let secret = std::env::var("IDENTITY_SECRET_KEY")
            .expect("Cannot retreive IDENTITY_SECRET_KEY from environment variable.");

        Self::new(secret.as_bytes())
    }
}

pub fn current_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IdentityClaims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
}

impl IdentityClaims {
    pub fn is_expired(&self) -> bool {
        self.exp < current_timestamp().unix_timestamp()
    }
}

/// A verified caller identity. Roles are not carried here; they live in the
/// user directory and are resolved per request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub email: String,
}

impl Identity {
    pub fn from_token(state: &IdentityState, token: &str) -> Result<Self, Error> {
        let token = decode_identity_token(state, token)
            .map_err(|_| Error::Unauthorized(UnauthorizedType::InvalidAccessToken))?;

        if token.claims.is_expired() {
            return Err(Error::Unauthorized(UnauthorizedType::InvalidAccessToken));
        }

        Ok(Self {
            email: token.claims.email,
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    IdentityState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(token)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::Unauthorized(UnauthorizedType::MissingAccessToken))?;

        let identity = IdentityState::from_ref(state);

        Self::from_token(&identity, token.token())
    }
}

pub fn issue_identity_token(
    state: &IdentityState,
    email: &str,
    exp: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = IdentityClaims {
        sub: email.to_string(),
        email: email.to_string(),
        exp,
    };

    jsonwebtoken::encode(&state.header, &claims, &state.encoding_key)
}

pub fn decode_identity_token(
    state: &IdentityState,
    token: &str,
) -> Result<TokenData<IdentityClaims>, jsonwebtoken::errors::Error> {
    jsonwebtoken::decode(token, &state.decoding_key, &state.validation)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::extract::FromRequestParts;
    use time::Duration;

    use crate::error::{Error, UnauthorizedType};

    use super::*;

    fn identity_state() -> IdentityState {
        IdentityState::new(b"test-secret-key")
    }

    #[test]
    fn test_identity_token_round_trip() {
        let state = identity_state();

        let exp = (current_timestamp() + Duration::minutes(10)).unix_timestamp();
        let token = issue_identity_token(&state, "user@example.com", exp).unwrap();

        let identity = Identity::from_token(&state, &token).unwrap();
        assert_eq!(identity.email, "user@example.com");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let state = identity_state();

        let exp = (current_timestamp() - Duration::seconds(1)).unix_timestamp();
        let token = issue_identity_token(&state, "user@example.com", exp).unwrap();

        let err = Identity::from_token(&state, &token).unwrap_err();
        assert_matches!(
            err,
            Error::Unauthorized(UnauthorizedType::InvalidAccessToken)
        );
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let state = identity_state();

        let err = Identity::from_token(&state, "not-a-token").unwrap_err();
        assert_matches!(
            err,
            Error::Unauthorized(UnauthorizedType::InvalidAccessToken)
        );
    }

    #[tokio::test]
    async fn test_identity_extractor() {
        let state = identity_state();

        let exp = (current_timestamp() + Duration::minutes(10)).unix_timestamp();
        let token = issue_identity_token(&state, "user@example.com", exp).unwrap();

        let (mut parts, _) = axum::http::Request::get("http://localhost")
            .header("Authorization", format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();

        let identity = Identity::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(identity.email, "user@example.com");
    }

    #[tokio::test]
    async fn test_identity_extractor_missing_header() {
        let state = identity_state();

        let (mut parts, _) = axum::http::Request::get("http://localhost")
            .body(())
            .unwrap()
            .into_parts();

        let err = Identity::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            Error::Unauthorized(UnauthorizedType::MissingAccessToken)
        );
    }
}
