//! Manage json web tokens.

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::account::ADMINISTRATOR;
use crate::config::Token as TokenConfig;
use crate::error::Result;

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Expiration time, in seconds since epoch.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the instance that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
    /// Login name.
    pub name: String,
    /// Role names at issue time.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    pub fn is_administrator(&self) -> bool {
        self.roles.iter().any(|role| role == ADMINISTRATOR)
    }
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    name: String,
    audience: String,
    expires_in: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] signing with an HMAC secret.
    pub fn new(name: &str, config: &TokenConfig) -> Self {
        let secret = if config.secret.is_empty() {
            tracing::warn!(
                "no `token.secret` on `config.yaml`, tokens will not survive a restart"
            );
            crate::crypto::random_token()
        } else {
            config.secret.clone()
        };

        Self {
            algorithm: Algorithm::HS256,
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            name: name.to_owned(),
            audience: config.audience.clone(),
            expires_in: config.expires_in,
        }
    }

    /// Create a new [`jsonwebtoken`].
    pub fn create(
        &self,
        user_id: &str,
        user_name: &str,
        roles: Vec<String>,
    ) -> Result<String> {
        let time = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            aud: self.audience.clone(),
            exp: time + self.expires_in,
            iat: time,
            iss: self.name.clone(),
            sub: user_id.to_owned(),
            name: user_name.to_owned(),
            roles,
        };

        Ok(encode(
            &Header::new(self.algorithm),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.name]);

        Ok(decode::<Claims>(token, &self.decoding_key, &validation)?.claims)
    }

    /// Token lifetime, in seconds.
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }
}
