//! Bearer-token lifecycle for chatline.
//!
//! **Model**:
//! - Access and refresh tokens are HS256 JWTs signed with distinct secrets
//! - Every issued token carries a store id; the id lives in the token store
//!   exactly as long as the token, and revocation deletes it
//! - The refresh id is derived from the access id (`{access}++{user}`) so a
//!   logout can remove both halves of a pair from the access token alone
//! - Refresh rotation revokes the old pair and issues a new one

use anyhow::{anyhow, Result};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use ulid::Ulid;
use zeroize::Zeroize;

pub mod secret_validation;
pub mod store;

#[cfg(test)]
mod test_utils;

pub use secret_validation::{ensure_secret_strength, validate_secret_strength, SecretStrength};
pub use store::{MemoryTokenStore, RedisTokenStore, StoreError, TokenStore};

const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const REFRESH_ID_SEPARATOR: &str = "++";

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(rename = "authorization")]
    pub authorized: bool,
    pub access_uuid: String,
    pub user_id: String,
    pub profile_id: String,
    /// Device id the pair was issued to.
    pub unique_id: String,
    pub exp: i64,
}

/// Claims carried by a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub refresh_uuid: String,
    pub user_id: String,
    pub profile_id: String,
    pub unique_id: String,
    pub exp: i64,
}

impl RefreshClaims {
    /// Access id this refresh token was paired with.
    pub fn access_uuid(&self) -> Option<&str> {
        self.refresh_uuid
            .strip_suffix(&self.user_id)
            .and_then(|rest| rest.strip_suffix(REFRESH_ID_SEPARATOR))
            .filter(|id| !id.is_empty())
    }
}

/// Issued token pair. Field names are the wire names clients already use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "access")]
    pub access_token: String,
    #[serde(rename = "refresh")]
    pub refresh_token: String,
    #[serde(rename = "token_uuid")]
    pub access_uuid: String,
    pub refresh_uuid: String,
    #[serde(rename = "token_expire")]
    pub access_expires_at: i64,
    #[serde(rename = "refresh_expire")]
    pub refresh_expires_at: i64,
}

/// How much of a token to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Signature, expiry, typed claims and live store entry.
    Strict,
    /// Signature and typed claims only, for tokens already admitted upstream.
    Trusted,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token malformed or signature invalid")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("token claims rejected: {0}")]
    Claims(&'static str),
    #[error("token is no longer active")]
    Revoked,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    /// True when the caller presented a bad token, false for server faults.
    pub fn is_auth_failure(&self) -> bool {
        !matches!(self, TokenError::Store(_) | TokenError::Signing(_))
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(mut secret: String) -> Self {
        let pair = Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        };
        secret.zeroize();
        pair
    }
}

/// Issues, validates, rotates and revokes token pairs.
pub struct TokenManager {
    access_key: KeyPair,
    refresh_key: KeyPair,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    store: Arc<dyn TokenStore>,
}

impl TokenManager {
    pub fn new(
        access_secret: String,
        refresh_secret: String,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(anyhow!("token secrets must not be empty"));
        }
        if access_secret == refresh_secret {
            return Err(anyhow!("access and refresh secrets must differ"));
        }

        info!("token manager initialized with HS256");

        Ok(Self {
            access_key: KeyPair::from_secret(access_secret),
            refresh_key: KeyPair::from_secret(refresh_secret),
            access_lifetime: ACCESS_TOKEN_LIFETIME,
            refresh_lifetime: REFRESH_TOKEN_LIFETIME,
            store,
        })
    }

    pub fn with_lifetimes(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_lifetime = access;
        self.refresh_lifetime = refresh;
        self
    }

    /// Issue a new pair and record both ids in the store.
    ///
    /// A failed store write surfaces as an error; an id already written is
    /// left to expire on its own.
    pub async fn issue(
        &self,
        user_id: &str,
        profile_id: &str,
        unique_id: &str,
    ) -> Result<TokenPair, TokenError> {
        let now = Utc::now().timestamp();
        let access_uuid = Ulid::new().to_string();
        let refresh_uuid = format!("{}{}{}", access_uuid, REFRESH_ID_SEPARATOR, user_id);
        let access_expires_at = now + self.access_lifetime.as_secs() as i64;
        let refresh_expires_at = now + self.refresh_lifetime.as_secs() as i64;

        let access_claims = AccessClaims {
            authorized: true,
            access_uuid: access_uuid.clone(),
            user_id: user_id.to_string(),
            profile_id: profile_id.to_string(),
            unique_id: unique_id.to_string(),
            exp: access_expires_at,
        };
        let refresh_claims = RefreshClaims {
            refresh_uuid: refresh_uuid.clone(),
            user_id: user_id.to_string(),
            profile_id: profile_id.to_string(),
            unique_id: unique_id.to_string(),
            exp: refresh_expires_at,
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access_claims, &self.access_key.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh_key.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        self.store
            .put(&access_uuid, user_id, self.access_lifetime)
            .await?;
        self.store
            .put(&refresh_uuid, user_id, self.refresh_lifetime)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_uuid,
            refresh_uuid,
            access_expires_at,
            refresh_expires_at,
        })
    }

    pub async fn validate_access(
        &self,
        token: &str,
        verification: Verification,
    ) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims =
            decode_claims(token, &self.access_key, verification == Verification::Strict)?;

        if !claims.authorized {
            return Err(TokenError::Claims("authorization"));
        }
        require(&claims.access_uuid, "access_uuid")?;
        require(&claims.user_id, "user_id")?;
        require(&claims.profile_id, "profile_id")?;

        if verification == Verification::Strict {
            self.ensure_live(&claims.access_uuid, &claims.user_id).await?;
        }
        Ok(claims)
    }

    pub async fn validate_refresh(
        &self,
        token: &str,
        verification: Verification,
    ) -> Result<RefreshClaims, TokenError> {
        let claims = self.decode_refresh(token, verification == Verification::Strict)?;
        if verification == Verification::Strict {
            self.ensure_live(&claims.refresh_uuid, &claims.user_id).await?;
        }
        Ok(claims)
    }

    /// Read one claim of an access token as a string; empty on any failure.
    ///
    /// Signature is checked, expiry and revocation are not. Use it for logging
    /// and other best-effort reads, never for authorization.
    pub fn extract_claim(&self, token: &str, claim: &str) -> String {
        let Ok(claims) =
            decode_claims::<HashMap<String, serde_json::Value>>(token, &self.access_key, false)
        else {
            return String::new();
        };

        match claims.get(claim) {
            Some(serde_json::Value::String(value)) => value.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// User id stored for a token id.
    pub async fn lookup(&self, id: &str) -> Result<String, TokenError> {
        self.store.fetch(id).await?.ok_or(TokenError::Revoked)
    }

    /// Refresh ids currently active for `user_id`.
    pub async fn active_sessions(&self, user_id: &str) -> Result<Vec<String>, TokenError> {
        Ok(self.store.sessions_for(user_id).await?)
    }

    /// Remove an access id and the refresh id derived from it.
    pub async fn revoke_access(&self, access_uuid: &str, user_id: &str) -> Result<(), TokenError> {
        self.store.remove(access_uuid).await?;

        let refresh_uuid = format!("{}{}{}", access_uuid, REFRESH_ID_SEPARATOR, user_id);
        if let Err(e) = self.store.remove(&refresh_uuid).await {
            warn!(error = %e, "failed to remove paired refresh id");
        }
        Ok(())
    }

    pub async fn revoke_refresh(&self, refresh_uuid: &str) -> Result<(), TokenError> {
        self.store.remove(refresh_uuid).await?;
        Ok(())
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Signature and expiry are checked; store membership is not, so a
    /// refresh token replayed after rotation is accepted until it expires.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.decode_refresh(refresh_token, true)?;

        self.revoke_refresh(&claims.refresh_uuid).await?;
        if let Some(access_uuid) = claims.access_uuid() {
            if let Err(e) = self.store.remove(access_uuid).await {
                warn!(error = %e, "failed to remove rotated access id");
            }
        }

        let pair = self
            .issue(&claims.user_id, &claims.profile_id, &claims.unique_id)
            .await?;

        info!(user_id = %claims.user_id, "refresh token rotated");
        Ok(pair)
    }

    fn decode_refresh(&self, token: &str, enforce_expiry: bool) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = decode_claims(token, &self.refresh_key, enforce_expiry)?;

        require(&claims.user_id, "user_id")?;
        require(&claims.profile_id, "profile_id")?;
        if claims.access_uuid().is_none() {
            return Err(TokenError::Claims("refresh_uuid"));
        }
        Ok(claims)
    }

    async fn ensure_live(&self, id: &str, user_id: &str) -> Result<(), TokenError> {
        match self.store.fetch(id).await? {
            Some(owner) if owner == user_id => Ok(()),
            _ => Err(TokenError::Revoked),
        }
    }
}

fn decode_claims<T: DeserializeOwned>(
    token: &str,
    key: &KeyPair,
    enforce_expiry: bool,
) -> Result<T, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    if enforce_expiry {
        validation.set_required_spec_claims(&["exp"]);
    } else {
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
    }

    Ok(decode::<T>(token, &key.decoding, &validation)?.claims)
}

fn require(value: &str, claim: &'static str) -> Result<(), TokenError> {
    if value.trim().is_empty() {
        Err(TokenError::Claims(claim))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_SECRET: &str = "y9K$mP2vRx#TnZ@s4Yw!cGf7Dh&e3Xa6";
    const REFRESH_SECRET: &str = "Wq8Lj5BtNu1Zp0MkYhVgCxFbAsSdQwEr";

    fn manager() -> TokenManager {
        TokenManager::new(
            ACCESS_SECRET.to_string(),
            REFRESH_SECRET.to_string(),
            Arc::new(MemoryTokenStore::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_issue_and_validate_access() {
        let manager = manager();
        let pair = manager.issue("user-1", "profile-1", "device-1").await.unwrap();

        let claims = manager
            .validate_access(&pair.access_token, Verification::Strict)
            .await
            .unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.profile_id, "profile-1");
        assert_eq!(claims.unique_id, "device-1");
        assert_eq!(claims.access_uuid, pair.access_uuid);
        assert_eq!(pair.refresh_uuid, format!("{}++user-1", pair.access_uuid));
        assert_eq!(pair.access_uuid.len(), 26);
    }

    #[tokio::test]
    async fn test_lifetimes_are_one_day_and_one_week() {
        let manager = manager();
        let before = Utc::now().timestamp();
        let pair = manager.issue("user-1", "profile-1", "").await.unwrap();

        assert!((pair.access_expires_at - before - 24 * 3600).abs() <= 2);
        assert!((pair.refresh_expires_at - before - 7 * 24 * 3600).abs() <= 2);
    }

    #[tokio::test]
    async fn test_revoke_access_removes_both_ids() {
        let manager = manager();
        let pair = manager.issue("user-1", "profile-1", "").await.unwrap();

        manager.revoke_access(&pair.access_uuid, "user-1").await.unwrap();

        assert!(matches!(
            manager.lookup(&pair.access_uuid).await,
            Err(TokenError::Revoked)
        ));
        assert!(manager.lookup(&pair.refresh_uuid).await.is_err());
        assert!(manager
            .validate_access(&pair.access_token, Verification::Strict)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_rotate_invalidates_old_refresh() {
        let manager = manager();
        let pair = manager.issue("user-1", "profile-1", "device-1").await.unwrap();

        let rotated = manager.rotate(&pair.refresh_token).await.unwrap();
        assert_ne!(rotated.access_uuid, pair.access_uuid);

        assert!(manager
            .validate_refresh(&pair.refresh_token, Verification::Strict)
            .await
            .is_err());
        assert!(manager
            .validate_access(&pair.access_token, Verification::Strict)
            .await
            .is_err());

        let claims = manager
            .validate_refresh(&rotated.refresh_token, Verification::Strict)
            .await
            .unwrap();
        assert_eq!(claims.unique_id, "device-1");
    }

    #[tokio::test]
    async fn test_replayed_refresh_still_rotates() {
        // Rotation only checks the signature, so a replayed refresh token
        // mints another pair. Reuse is not detected.
        let manager = manager();
        let pair = manager.issue("user-1", "profile-1", "device-1").await.unwrap();

        let first = manager.rotate(&pair.refresh_token).await.unwrap();
        let replayed = manager.rotate(&pair.refresh_token).await.unwrap();
        assert_ne!(replayed.access_uuid, first.access_uuid);

        assert!(manager
            .validate_refresh(&pair.refresh_token, Verification::Strict)
            .await
            .is_err());
        assert!(manager
            .validate_refresh(&first.refresh_token, Verification::Strict)
            .await
            .is_ok());
        assert!(manager
            .validate_access(&replayed.access_token, Verification::Strict)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_secrets_are_not_interchangeable() {
        let manager = manager();
        let pair = manager.issue("user-1", "profile-1", "").await.unwrap();

        assert!(matches!(
            manager
                .validate_access(&pair.refresh_token, Verification::Trusted)
                .await,
            Err(TokenError::Invalid)
        ));
        assert!(manager
            .validate_refresh(&pair.access_token, Verification::Trusted)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_expired_token_only_passes_trusted() {
        let manager = manager();
        let claims = AccessClaims {
            authorized: true,
            access_uuid: Ulid::new().to_string(),
            user_id: "user-1".into(),
            profile_id: "profile-1".into(),
            unique_id: String::new(),
            exp: Utc::now().timestamp() - 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &manager.access_key.encoding,
        )
        .unwrap();

        assert!(matches!(
            manager.validate_access(&token, Verification::Strict).await,
            Err(TokenError::Expired)
        ));
        let trusted = manager
            .validate_access(&token, Verification::Trusted)
            .await
            .unwrap();
        assert_eq!(trusted, claims);
    }

    #[tokio::test]
    async fn test_missing_typed_claim_is_rejected() {
        let manager = manager();
        let mut untyped = HashMap::new();
        untyped.insert("user_id", serde_json::json!("user-1"));
        untyped.insert("exp", serde_json::json!(Utc::now().timestamp() + 60));
        let token = encode(
            &Header::new(Algorithm::HS256),
            &untyped,
            &manager.access_key.encoding,
        )
        .unwrap();

        assert!(manager
            .validate_access(&token, Verification::Trusted)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_extract_claim_is_best_effort() {
        let manager = manager();
        let pair = manager.issue("user-1", "profile-7", "").await.unwrap();

        assert_eq!(manager.extract_claim(&pair.access_token, "profile_id"), "profile-7");
        assert_eq!(manager.extract_claim(&pair.access_token, "authorization"), "true");
        assert_eq!(manager.extract_claim(&pair.access_token, "missing"), "");
        assert_eq!(manager.extract_claim("garbage", "user_id"), "");
    }

    #[tokio::test]
    async fn test_active_sessions_lists_refresh_ids() {
        let manager = manager();
        assert!(manager.active_sessions("user-1").await.unwrap().is_empty());

        let pair = manager.issue("user-1", "profile-1", "").await.unwrap();
        assert_eq!(
            manager.active_sessions("user-1").await.unwrap(),
            vec![pair.refresh_uuid]
        );
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let result = TokenManager::new(
            ACCESS_SECRET.to_string(),
            ACCESS_SECRET.to_string(),
            Arc::new(MemoryTokenStore::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_refresh_claims_derive_access_id() {
        let claims = RefreshClaims {
            refresh_uuid: "01HABCDEFGHJKMNPQRSTVWXYZ0++user-1".into(),
            user_id: "user-1".into(),
            profile_id: "p".into(),
            unique_id: String::new(),
            exp: 0,
        };
        assert_eq!(claims.access_uuid(), Some("01HABCDEFGHJKMNPQRSTVWXYZ0"));

        let forged = RefreshClaims {
            refresh_uuid: "01HABCDEFGHJKMNPQRSTVWXYZ0++user-2".into(),
            ..claims
        };
        assert_eq!(forged.access_uuid(), None);
    }
}
