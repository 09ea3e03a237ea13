//! Key resolution
//!
//! Maps a `keyId` to the public key and owning actor. Resolvers are injected
//! into the verifier so the core never talks to the network directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::KnownActorConfig;
use crate::error::AppError;
use crate::signature::PublicKey;

/// Public key of a remote actor together with the actor it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub actor_id: String,
    pub public_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyResolveError {
    #[error("key {0} not found")]
    NotFound(String),

    #[error("key fetch failed: {0}")]
    Unreachable(String),

    #[error("malformed key document: {0}")]
    MalformedKey(String),
}

impl KeyResolveError {
    /// Metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unreachable(_) => "unreachable",
            Self::MalformedKey(_) => "malformed",
        }
    }
}

/// Source of actor public keys
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, key_id: &str) -> Result<ResolvedKey, KeyResolveError>;
}

/// Fixed set of known keys, optionally backed by another resolver
#[derive(Default)]
pub struct StaticKeyResolver {
    keys: HashMap<String, ResolvedKey>,
    fallback: Option<Arc<dyn KeyResolver>>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `federation.known_actors` configuration list
    pub fn from_config(actors: &[KnownActorConfig]) -> Result<Self, AppError> {
        let mut resolver = Self::new();
        for actor in actors {
            let public_key = PublicKey::from_pem(&actor.public_key_pem).map_err(|_| {
                AppError::Config(format!("Invalid public key PEM for {}", actor.key_id))
            })?;
            resolver.insert(&actor.key_id, &actor.actor_id, public_key);
        }
        Ok(resolver)
    }

    pub fn with_key(mut self, key_id: &str, actor_id: &str, public_key: PublicKey) -> Self {
        self.insert(key_id, actor_id, public_key);
        self
    }

    /// Consult `fallback` for key IDs not in the map
    pub fn with_fallback(mut self, fallback: Arc<dyn KeyResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn insert(&mut self, key_id: &str, actor_id: &str, public_key: PublicKey) {
        self.keys.insert(
            key_id.to_string(),
            ResolvedKey {
                actor_id: actor_id.to_string(),
                public_key,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<ResolvedKey, KeyResolveError> {
        if let Some(key) = self.keys.get(key_id) {
            return Ok(key.clone());
        }
        match &self.fallback {
            Some(fallback) => fallback.resolve(key_id).await,
            None => Err(KeyResolveError::NotFound(key_id.to_string())),
        }
    }
}
