use async_trait::async_trait;
use dashmap::DashMap;

use crate::identity::{IdentityError, IdentityProvider, VerifiedIdentity};

/// Fixed token -> email table for local runs and tests.
#[derive(Default)]
pub struct StaticIdentityProvider {
    tokens: DashMap<String, String>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I, T, E>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (T, E)>,
        T: Into<String>,
        E: Into<String>,
    {
        let provider = Self::new();
        for (token, email) in tokens {
            provider.register(token, email);
        }
        provider
    }

    pub fn register(&self, token: impl Into<String>, email: impl Into<String>) {
        self.tokens.insert(token.into(), email.into());
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        self.tokens
            .get(token)
            .map(|email| VerifiedIdentity {
                email: email.value().clone(),
            })
            .ok_or_else(|| IdentityError::InvalidToken("unknown token".to_string()))
    }
}
