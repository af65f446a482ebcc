use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

pub const SCOPE_SHEETS_READONLY: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
pub const SCOPE_DRIVE: &str = "https://www.googleapis.com/auth/drive";

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Reuse margin: tokens are refreshed this long before they expire.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("id token rejected: {0}")]
    InvalidToken(String),
    #[error("token endpoint error: {0}")]
    TokenEndpoint(String),
    #[error("service-account assertion error: {0}")]
    Assertion(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Bearer-token source for Google APIs, backed by a service account.
///
/// Signs an RS256 JWT assertion and exchanges it at the OAuth token
/// endpoint. The access token is cached until shortly before expiry; one
/// provider per scope.
pub struct ServiceAccountTokens {
    http: reqwest::Client,
    email: String,
    key: EncodingKey,
    scope: &'static str,
    cached: Mutex<Option<(String, Instant)>>,
}

impl ServiceAccountTokens {
    pub fn new(
        http: reqwest::Client,
        email: &str,
        private_key_pem: &str,
        scope: &'static str,
    ) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| AuthError::Assertion(e.to_string()))?;
        Ok(Self {
            http,
            email: email.to_string(),
            key,
            scope,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid access token, fetching a fresh one when needed.
    pub async fn bearer(&self) -> Result<String, AuthError> {
        {
            let cached = self.cached.lock().expect("token cache poisoned");
            if let Some((token, expires_at)) = cached.as_ref()
                && Instant::now() + EXPIRY_SKEW < *expires_at
            {
                return Ok(token.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.email,
            scope: self.scope,
            aud: TOKEN_URL,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| AuthError::Assertion(e.to_string()))?;

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint(format!("{status}: {body}")));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in);

        let mut cached = self.cached.lock().expect("token cache poisoned");
        *cached = Some((token.access_token.clone(), expires_at));
        Ok(token.access_token)
    }
}

/// Verified identity extracted from a Google ID token.
#[derive(Debug, Clone)]
pub struct GoogleIdentity {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Narrow contract over Google sign-in verification.
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    /// Validates the credential and returns the verified identity.
    /// Unverified emails and audience mismatches are rejected.
    async fn verify(&self, credential: &str) -> Result<GoogleIdentity, AuthError>;
}

#[derive(Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    email: Option<String>,
    email_verified: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Verifier backed by Google's tokeninfo endpoint.
pub struct GoogleTokenVerifier {
    http: reqwest::Client,
    client_id: String,
}

impl GoogleTokenVerifier {
    pub fn new(http: reqwest::Client, client_id: &str) -> Self {
        Self {
            http,
            client_id: client_id.to_string(),
        }
    }
}

#[async_trait]
impl IdTokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<GoogleIdentity, AuthError> {
        let response = self
            .http
            .get(TOKENINFO_URL)
            .query(&[("id_token", credential)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::InvalidToken(format!("{status}: {body}")));
        }

        let info: TokenInfo = response.json().await?;

        if info.aud.as_deref() != Some(self.client_id.as_str()) {
            return Err(AuthError::InvalidToken("audience mismatch".into()));
        }
        if info.email_verified.as_deref() != Some("true") {
            return Err(AuthError::InvalidToken("email not verified".into()));
        }
        let email = info
            .email
            .ok_or_else(|| AuthError::InvalidToken("no email claim".into()))?;

        Ok(GoogleIdentity {
            email,
            name: info.name,
            picture: info.picture,
        })
    }
}
