//! Turns the token of an `identify` message into a user identity.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use thiserror::Error;

use crate::{
    config::IdentitySettings,
    dto::validation::validate_username,
    state::UserId,
};

/// Authenticated user behind a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("malformed identification token")]
    Malformed,
    #[error("unknown identification token")]
    UnknownToken,
    #[error("invalid username `{0}`")]
    InvalidUsername(String),
}

pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> BoxFuture<'static, Result<Identity, IdentityError>>;
}

/// Accepts `"<user_id>:<username>"` tokens minted by an upstream that already
/// authenticated the user.
pub struct TrustedTokens;

impl TrustedTokens {
    fn parse(token: &str) -> Result<Identity, IdentityError> {
        let (raw_id, username) = token.split_once(':').ok_or(IdentityError::Malformed)?;
        let user_id = raw_id
            .trim()
            .parse::<UserId>()
            .map_err(|_| IdentityError::Malformed)?;
        let username = username.trim();
        validate_username(username)
            .map_err(|_| IdentityError::InvalidUsername(username.to_string()))?;
        Ok(Identity {
            user_id,
            username: username.to_string(),
        })
    }
}

impl IdentityProvider for TrustedTokens {
    fn resolve(&self, token: &str) -> BoxFuture<'static, Result<Identity, IdentityError>> {
        let outcome = Self::parse(token);
        Box::pin(async move { outcome })
    }
}

/// Fixed token table from the configuration file.
pub struct TokenDirectory {
    users: HashMap<String, Identity>,
}

impl TokenDirectory {
    pub fn new(users: HashMap<String, Identity>) -> Self {
        Self { users }
    }
}

impl IdentityProvider for TokenDirectory {
    fn resolve(&self, token: &str) -> BoxFuture<'static, Result<Identity, IdentityError>> {
        let outcome = self
            .users
            .get(token)
            .cloned()
            .ok_or(IdentityError::UnknownToken);
        Box::pin(async move { outcome })
    }
}

/// Build the provider selected by the configuration.
pub fn from_settings(settings: &IdentitySettings) -> Arc<dyn IdentityProvider> {
    match settings {
        IdentitySettings::Trusted => Arc::new(TrustedTokens),
        IdentitySettings::Directory { users } => Arc::new(TokenDirectory::new(
            users
                .iter()
                .map(|(token, entry)| {
                    (
                        token.clone(),
                        Identity {
                            user_id: entry.user_id,
                            username: entry.username.clone(),
                        },
                    )
                })
                .collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryEntry;

    #[tokio::test]
    async fn trusted_token_yields_identity() {
        let identity = TrustedTokens.resolve("42:ada").await.unwrap();
        assert_eq!(
            identity,
            Identity {
                user_id: 42,
                username: "ada".into()
            }
        );
    }

    #[tokio::test]
    async fn trusted_token_rejects_garbage() {
        assert_eq!(
            TrustedTokens.resolve("ada").await,
            Err(IdentityError::Malformed)
        );
        assert_eq!(
            TrustedTokens.resolve("x:ada").await,
            Err(IdentityError::Malformed)
        );
        assert_eq!(
            TrustedTokens.resolve("3:<b>").await,
            Err(IdentityError::InvalidUsername("<b>".into()))
        );
    }

    #[tokio::test]
    async fn directory_only_knows_configured_tokens() {
        let settings = IdentitySettings::Directory {
            users: HashMap::from([(
                "s3cret".to_string(),
                DirectoryEntry {
                    user_id: 7,
                    username: "bob".into(),
                },
            )]),
        };
        let provider = from_settings(&settings);

        assert_eq!(provider.resolve("s3cret").await.unwrap().user_id, 7);
        assert_eq!(
            provider.resolve("7:bob").await,
            Err(IdentityError::UnknownToken)
        );
    }
}
