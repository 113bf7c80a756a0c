//! Admin credential extraction and verification.
//!
//! The storefront has a single admin role. A credential is presented either as
//! an `X-Admin-Key` header or as `Authorization: Bearer <key>`, and is checked
//! by whichever [`CredentialVerifier`] the services were built with.

use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use sha2::{Digest, Sha256};
use std::fmt;

/// Header carrying the admin key
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Raw admin credential as presented by the caller
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredential(String);

impl AdminCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    fn from_headers(headers: &axum::http::HeaderMap) -> Option<Self> {
        if let Some(key) = headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return Some(Self::new(key));
        }

        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminCredential(<redacted>)")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminCredential
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
            .ok_or_else(|| ServiceError::Unauthorized("admin credential required".to_string()))
    }
}

/// Decides whether a presented credential grants admin access
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, credential: &AdminCredential) -> Result<(), ServiceError>;

    /// Like [`verify`](Self::verify), treating a missing credential as unauthorized.
    fn authorize(&self, credential: Option<&AdminCredential>) -> Result<(), ServiceError> {
        match credential {
            Some(credential) => self.verify(credential),
            None => Err(ServiceError::Unauthorized(
                "admin credential required".to_string(),
            )),
        }
    }

    /// True when a credential is present and valid; never errors.
    fn is_admin(&self, credential: Option<&AdminCredential>) -> bool {
        credential.map(|c| self.verify(c).is_ok()).unwrap_or(false)
    }
}

/// Verifies against one configured key. Only the SHA-256 digest is retained.
pub struct StaticKeyVerifier {
    digest: [u8; 32],
}

impl StaticKeyVerifier {
    pub fn new(admin_key: &str) -> Self {
        Self {
            digest: Sha256::digest(admin_key.as_bytes()).into(),
        }
    }
}

impl fmt::Debug for StaticKeyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeyVerifier")
            .field("digest", &hex::encode(&self.digest[..4]))
            .finish()
    }
}

impl CredentialVerifier for StaticKeyVerifier {
    fn verify(&self, credential: &AdminCredential) -> Result<(), ServiceError> {
        let presented: [u8; 32] = Sha256::digest(credential.expose().as_bytes()).into();
        if constant_time_eq(&presented, &self.digest) {
            Ok(())
        } else {
            tracing::warn!("rejected admin credential");
            metrics::counter!("storefront.auth.rejected", 1);
            Err(ServiceError::Unauthorized("invalid admin credential".to_string()))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.iter().zip(b) {
        res |= x ^ y;
    }
    res == 0
}
