//! ActivityPub federation module
//!
//! Handles:
//! - Key resolution for signature verification
//! - Remote actor key fetching
//! - Public key caching

mod fetch;
mod key_cache;
mod resolver;

pub use fetch::{HttpKeyResolver, extract_public_key, key_id_matches_actor, validate_key_url};
pub use key_cache::{CacheStats, CachingKeyResolver};
pub use resolver::{KeyResolveError, KeyResolver, ResolvedKey, StaticKeyResolver};

#[cfg(test)]
pub use resolver::MockKeyResolver;
