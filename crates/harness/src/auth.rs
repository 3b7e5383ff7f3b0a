//! Signed test credentials
//!
//! Tokens are compact JWS (`header.payload.signature`, base64url without
//! padding) signed with secp256k1 ECDSA over the SHA-256 digest of
//! `header.payload`. Key material is generated per harness and never
//! persisted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Key id used when none is configured
pub const DEFAULT_KEY_ID: &str = "4754d86b-7a6d-4df5-9c65-224741361492";

/// Issuer written into every test token
pub const ISSUER: &str = "service project";

/// JWS algorithm name for secp256k1 ECDSA with SHA-256
pub const ALGORITHM: &str = "ES256K";

/// Lifetime of issued tokens, in hours
pub const TOKEN_LIFETIME_HOURS: i64 = 1;

/// Subject of the deliberately invalid token
pub const INVALID_SUBJECT: &str = "11";

/// Errors while signing a token
#[derive(Debug, Error)]
pub enum SigningError {
    /// No private key under the requested id
    #[error("no signing key registered for kid {0}")]
    UnknownKey(String),

    /// Header or claims could not be serialized
    #[error("failed to encode token: {0}")]
    Encode(#[from] serde_json::Error),

    /// The signer refused the digest
    #[error("failed to sign token: {0}")]
    Signature(String),
}

/// Reasons a token is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not three base64url segments of the expected JSON
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The header names a key this store does not hold
    #[error("unknown key id {0}")]
    UnknownKey(String),

    /// Signature does not verify under the named key
    #[error("signature verification failed")]
    BadSignature,

    /// Current time is at or past `exp`
    #[error("token expired at {expired_at}")]
    Expired {
        /// `exp` claim, Unix seconds
        expired_at: i64,
    },

    /// Current time is before `iat`
    #[error("token not valid before {issued_at}")]
    NotYetValid {
        /// `iat` claim, Unix seconds
        issued_at: i64,
    },
}

/// Registered claims plus roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at, Unix seconds
    pub iat: i64,
    /// Expires at, Unix seconds
    pub exp: i64,
    /// Granted roles
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Claims valid from `now` for [`TOKEN_LIFETIME_HOURS`]
    pub fn new<R>(subject: impl Into<String>, roles: R, now: DateTime<Utc>) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            sub: subject.into(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the claims grant `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check `iat <= now < exp`
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<(), TokenError> {
        let now = now.timestamp();
        if now < self.iat {
            return Err(TokenError::NotYetValid {
                issued_at: self.iat,
            });
        }
        if now >= self.exp {
            return Err(TokenError::Expired {
                expired_at: self.exp,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: String,
    kid: String,
}

/// Private keys by key id
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Default)]
pub struct KeyStore {
    keys: HashMap<String, SigningKey>,
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.keys.keys().collect();
        ids.sort();
        f.debug_struct("KeyStore").field("key_ids", &ids).finish()
    }
}

impl KeyStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `key` registered under `kid`
    pub fn with_key(mut self, kid: impl Into<String>, key: SigningKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }

    /// Private key for `kid`
    pub fn signing_key(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    /// Public key for `kid`
    pub fn verifying_key(&self, kid: &str) -> Option<VerifyingKey> {
        self.keys.get(kid).map(|key| *key.verifying_key())
    }
}

/// Issues and validates test tokens with one active key
#[derive(Debug, Clone)]
pub struct Authenticator {
    active_kid: String,
    keys: Arc<KeyStore>,
}

impl Authenticator {
    /// Fresh random key registered under `key_id`
    pub fn generate(key_id: impl Into<String>) -> Self {
        let key_id = key_id.into();
        let keys = KeyStore::new().with_key(key_id.clone(), SigningKey::random(&mut OsRng));
        Self {
            active_kid: key_id,
            keys: Arc::new(keys),
        }
    }

    /// Authenticator signing with `active_kid` from `keys`
    pub fn new(active_kid: impl Into<String>, keys: Arc<KeyStore>) -> Result<Self, SigningError> {
        let active_kid = active_kid.into();
        if keys.signing_key(&active_kid).is_none() {
            return Err(SigningError::UnknownKey(active_kid));
        }
        Ok(Self { active_kid, keys })
    }

    /// Id of the signing key
    pub fn key_id(&self) -> &str {
        &self.active_kid
    }

    /// Public half of the active key
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.keys.verifying_key(&self.active_kid)
    }

    /// Sign arbitrary claims with the active key
    pub fn generate_token(&self, claims: &Claims) -> Result<String, SigningError> {
        let key = self
            .keys
            .signing_key(&self.active_kid)
            .ok_or_else(|| SigningError::UnknownKey(self.active_kid.clone()))?;
        encode(&self.active_kid, claims, key)
    }

    /// Token for `subject` with `roles`, valid for one hour from now
    pub fn issue_token<R>(&self, subject: &str, roles: R) -> Result<String, SigningError>
    where
        R: IntoIterator,
        R::Item: Into<String>,
    {
        self.issue_token_at(subject, roles, Utc::now())
    }

    /// Token for `subject` with `roles`, valid for one hour from `now`
    pub fn issue_token_at<R>(
        &self,
        subject: &str,
        roles: R,
        now: DateTime<Utc>,
    ) -> Result<String, SigningError>
    where
        R: IntoIterator,
        R::Item: Into<String>,
    {
        self.generate_token(&Claims::new(subject, roles, now))
    }

    /// Well-formed token under the active key id, signed with a throwaway
    /// key, so it never verifies
    pub fn issue_invalid_token(&self) -> Result<String, SigningError> {
        let claims = Claims::new(INVALID_SUBJECT, ["ADMIN", "USER"], Utc::now());
        let throwaway = SigningKey::random(&mut OsRng);
        encode(&self.active_kid, &claims, &throwaway)
    }

    /// Validate against the current time
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_token_at(token, Utc::now())
    }

    /// Decode, resolve the key by `kid`, verify, then check the validity
    /// window at `now`
    pub fn validate_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments[..] else {
            return Err(TokenError::Malformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        let header: Header = decode_json(header_b64, "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed(format!(
                "unsupported algorithm {}",
                header.alg
            )));
        }
        let key = self
            .keys
            .verifying_key(&header.kid)
            .ok_or_else(|| TokenError::UnknownKey(header.kid.clone()))?;

        let signature_bytes = decode_segment(signature_b64, "signature")?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|e| TokenError::Malformed(format!("signature: {e}")))?;
        let digest = Sha256::digest(format!("{header_b64}.{payload_b64}").as_bytes());
        key.verify_prehash(digest.as_slice(), &signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_json(payload_b64, "claims")?;
        claims.check_window(now)?;
        Ok(claims)
    }
}

fn encode(kid: &str, claims: &Claims, key: &SigningKey) -> Result<String, SigningError> {
    let header = Header {
        alg: ALGORITHM.to_string(),
        typ: "JWT".to_string(),
        kid: kid.to_string(),
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
    );
    let digest = Sha256::digest(signing_input.as_bytes());
    let signature: Signature = key
        .sign_prehash(digest.as_slice())
        .map_err(|e| SigningError::Signature(e.to_string()))?;
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{what}: {e}")))
}

fn decode_json<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, TokenError> {
    let bytes = decode_segment(segment, what)?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(format!("{what}: {e}")))
}
