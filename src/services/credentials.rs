use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisError, ApiError};

pub const GENERATIVE_LANGUAGE_SCOPE: &str = "https://www.googleapis.com/auth/generative-language";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Credential material as found in the process configuration, before validation
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialConfig {
    Missing,
    ApiKey(String),
    /// Raw JSON of a Google service-account key file
    ServiceAccount(String),
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialConfig::Missing => write!(f, "Missing"),
            CredentialConfig::ApiKey(_) => write!(f, "ApiKey(****)"),
            CredentialConfig::ServiceAccount(_) => write!(f, "ServiceAccount(****)"),
        }
    }
}

/// A validated credential, ready to produce bearer tokens
#[derive(Clone)]
pub enum ApiCredential {
    ApiKey(String),
    ServiceAccount(ServiceAccountKey),
}

impl std::fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiCredential::ApiKey(_) => write!(f, "ApiKey(****)"),
            ApiCredential::ServiceAccount(key) => {
                write!(f, "ServiceAccount({})", key.client_email)
            }
        }
    }
}

/// Validate configured credentials. Never touches the network.
pub fn resolve(config: &CredentialConfig) -> Result<ApiCredential, AnalysisError> {
    match config {
        CredentialConfig::Missing => Err(AnalysisError::MissingCredential),
        CredentialConfig::ApiKey(key) if key.trim().is_empty() => {
            Err(AnalysisError::MissingCredential)
        }
        CredentialConfig::ApiKey(key) => Ok(ApiCredential::ApiKey(key.trim().to_string())),
        CredentialConfig::ServiceAccount(raw) if raw.trim().is_empty() => {
            Err(AnalysisError::MissingCredential)
        }
        CredentialConfig::ServiceAccount(raw) => {
            ServiceAccountKey::from_json(raw).map(ApiCredential::ServiceAccount)
        }
    }
}

impl ApiCredential {
    /// Token for the `Authorization: Bearer` header of one model call.
    ///
    /// Service accounts exchange a fresh signed assertion on every call.
    pub async fn bearer_token(&self, client: &reqwest::Client) -> Result<String, AnalysisError> {
        match self {
            ApiCredential::ApiKey(key) => Ok(key.clone()),
            ApiCredential::ServiceAccount(account) => account.exchange_token(client).await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceAccountInfo {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Clone)]
pub struct ServiceAccountKey {
    client_email: String,
    private_key_id: Option<String>,
    token_uri: String,
    encoding_key: EncodingKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, AnalysisError> {
        let info: ServiceAccountInfo = serde_json::from_str(raw).map_err(|e| {
            AnalysisError::InvalidCredential(format!("service account JSON: {}", e))
        })?;

        let encoding_key = EncodingKey::from_rsa_pem(info.private_key.as_bytes()).map_err(|e| {
            AnalysisError::InvalidCredential(format!("service account private key: {}", e))
        })?;

        Ok(Self {
            client_email: info.client_email,
            private_key_id: info.private_key_id,
            token_uri: info.token_uri,
            encoding_key,
        })
    }

    #[cfg(test)]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// RS256 JWT asserting this account's identity to the token endpoint
    fn assertion(&self, issued_at: i64) -> Result<String, AnalysisError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: GENERATIVE_LANGUAGE_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AnalysisError::InvalidCredential(format!("signing assertion: {}", e)))
    }

    async fn exchange_token(&self, client: &reqwest::Client) -> Result<String, AnalysisError> {
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;

        log::debug!(
            "🔑 Exchanging service account assertion for {} at {}",
            self.client_email,
            self.token_uri()
        );

        let response = client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(ApiError::from_reqwest)?;

        if !status.is_success() {
            log::error!("❌ Token exchange failed ({})", status);
            return Err(ApiError::from_response(status.as_u16(), &body).into());
        }

        serde_json::from_str::<TokenResponse>(&body)
            .ok()
            .and_then(|token| token.access_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AnalysisError::MalformedResponse("token response has no access_token".to_string())
            })
    }
}
