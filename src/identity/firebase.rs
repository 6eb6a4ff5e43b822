use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::{IdentityError, IdentityProvider, VerifiedIdentity};

pub const DEFAULT_LOOKUP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:lookup";

/// Verifies Firebase ID tokens through the Identity Toolkit `accounts:lookup`
/// endpoint, which rejects expired or forged tokens server side.
pub struct FirebaseIdentityProvider {
    client: reqwest::Client,
    lookup_url: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
struct LookupUser {
    email: Option<String>,
}

impl FirebaseIdentityProvider {
    pub fn new(api_key: impl Into<String>, lookup_url: impl Into<String>) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| IdentityError::Unavailable(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            lookup_url: lookup_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let response = self
            .client
            .post(&self.lookup_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&LookupRequest { id_token: token })
            .send()
            .await
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            debug!(%status, "identity provider rejected token");
            return Err(IdentityError::InvalidToken(format!("lookup returned {status}")));
        }
        if !status.is_success() {
            return Err(IdentityError::Unavailable(format!("lookup returned {status}")));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|err| IdentityError::Unavailable(format!("invalid lookup payload: {err}")))?;

        body.users
            .into_iter()
            .find_map(|user| user.email)
            .map(|email| VerifiedIdentity { email })
            .ok_or_else(|| IdentityError::InvalidToken("token has no email".to_string()))
    }
}
