//! Remote key fetching
//!
//! Dereferences a `keyId` over HTTP and extracts the PEM from the returned
//! actor or key document. Local and private destinations are refused unless
//! explicitly allowed.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use super::resolver::{KeyResolveError, KeyResolver, ResolvedKey};
use crate::config::FederationConfig;
use crate::error::AppError;
use crate::metrics::KEY_FETCHES_TOTAL;
use crate::signature::PublicKey;

const MAX_REDIRECTS: usize = 3;

const ACTIVITY_JSON: &str = "application/activity+json, \
    application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

async fn validate_resolved_host_ips(host: &str, port: u16) -> Result<(), KeyResolveError> {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();

    let lookup = tokio::net::lookup_host((normalized.as_str(), port))
        .await
        .map_err(|e| KeyResolveError::Unreachable(format!("failed to resolve {}: {}", host, e)))?;

    let mut resolved_any = false;
    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(KeyResolveError::Unreachable(format!(
                "{} resolves to a disallowed address",
                host
            )));
        }
    }

    if !resolved_any {
        return Err(KeyResolveError::Unreachable(format!(
            "no DNS records for {}",
            host
        )));
    }

    Ok(())
}

/// Document URL of a key ID (fragment stripped)
fn document_url(key_id: &str) -> &str {
    key_id.split('#').next().unwrap_or(key_id)
}

/// Check a key ID points at a fetchable remote document.
///
/// Rejects non-HTTP(S) URLs and, unless `allow_private`, obvious
/// local/private hosts. Returns the parsed document URL.
pub fn validate_key_url(key_id: &str, allow_private: bool) -> Result<url::Url, KeyResolveError> {
    let parsed = url::Url::parse(document_url(key_id))
        .map_err(|e| KeyResolveError::Unreachable(format!("invalid key URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(KeyResolveError::Unreachable(format!(
                "unsupported key URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| KeyResolveError::Unreachable("missing host in key URL".to_string()))?;

    if !allow_private && is_disallowed_host(host) {
        return Err(KeyResolveError::Unreachable(format!(
            "refusing to fetch key from local host {}",
            host
        )));
    }

    Ok(parsed)
}

/// Whether a key ID and an actor ID are served from the same origin
pub fn key_id_matches_actor(key_id: &str, actor_id: &str) -> bool {
    match (url::Url::parse(key_id), url::Url::parse(actor_id)) {
        (Ok(key), Ok(actor)) => key.origin() == actor.origin(),
        _ => false,
    }
}

/// Extract the key matching `key_id` from an actor or key document
pub fn extract_public_key(document: &Value, key_id: &str) -> Result<ResolvedKey, KeyResolveError> {
    let malformed = |msg: &str| KeyResolveError::MalformedKey(format!("{} ({})", msg, key_id));

    // Standalone key document: { id, owner, publicKeyPem }
    if let Some(pem) = document.get("publicKeyPem").and_then(Value::as_str) {
        let owner = document
            .get("owner")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("key document has no owner"))?;
        let id = document.get("id").and_then(Value::as_str);
        if id.is_some_and(|id| id != key_id) {
            return Err(malformed("key document id does not match keyId"));
        }
        if !key_id_matches_actor(key_id, owner) {
            return Err(malformed("key owner is on another origin"));
        }
        let public_key =
            PublicKey::from_pem(pem).map_err(|_| malformed("unparsable publicKeyPem"))?;
        return Ok(ResolvedKey {
            actor_id: owner.to_string(),
            public_key,
        });
    }

    let actor_id = document
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("actor document has no id"))?;
    if !key_id_matches_actor(key_id, actor_id) {
        return Err(malformed("actor is on another origin"));
    }

    let candidates: Vec<&Value> = match document.get("publicKey") {
        Some(Value::Array(keys)) => keys.iter().collect(),
        Some(key @ Value::Object(_)) => vec![key],
        _ => return Err(malformed("actor document has no publicKey")),
    };

    let key = candidates
        .into_iter()
        .find(|key| {
            let id = key.get("id").and_then(Value::as_str);
            // Without a fragment the actor URL itself is the key ID.
            id == Some(key_id) || (!key_id.contains('#') && id.is_none())
        })
        .ok_or_else(|| malformed("actor does not advertise keyId"))?;

    let owner = key.get("owner").and_then(Value::as_str);
    if owner.is_some_and(|owner| owner != actor_id) {
        return Err(malformed("publicKey owner does not match actor"));
    }

    let pem = key
        .get("publicKeyPem")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("publicKey has no publicKeyPem"))?;
    let public_key = PublicKey::from_pem(pem).map_err(|_| malformed("unparsable publicKeyPem"))?;

    Ok(ResolvedKey {
        actor_id: actor_id.to_string(),
        public_key,
    })
}

/// Next hop of a redirect response, held to the same rules as the key URL
fn redirect_target(
    current: &url::Url,
    headers: &reqwest::header::HeaderMap,
    allow_private: bool,
) -> Result<url::Url, KeyResolveError> {
    let location = headers
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| KeyResolveError::Unreachable("redirect without Location".to_string()))?;
    let next = current
        .join(location)
        .map_err(|e| KeyResolveError::Unreachable(format!("invalid redirect target: {}", e)))?;
    validate_key_url(next.as_str(), allow_private)
}

/// Resolves keys by fetching actor documents over HTTP
///
/// Redirects are followed by hand, at most `MAX_REDIRECTS` times, and every
/// hop goes through the same host checks as the key URL. Those checks do
/// their own DNS lookup before connecting, so a name whose records change
/// between that lookup and the connection is not caught.
pub struct HttpKeyResolver {
    client: reqwest::Client,
    allow_private_hosts: bool,
}

impl HttpKeyResolver {
    /// Build a client honoring the federation timeout and user agent
    pub fn from_config(config: &FederationConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    async fn check_destination(&self, url: &url::Url) -> Result<(), KeyResolveError> {
        if self.allow_private_hosts {
            return Ok(());
        }

        let host = url
            .host_str()
            .ok_or_else(|| KeyResolveError::Unreachable("missing host in key URL".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| KeyResolveError::Unreachable("missing port in key URL".to_string()))?;
        // Hosts that look public may still resolve internally.
        validate_resolved_host_ips(host, port).await
    }

    async fn fetch(&self, key_id: &str) -> Result<ResolvedKey, KeyResolveError> {
        let mut url = validate_key_url(key_id, self.allow_private_hosts)?;
        let mut redirects = 0;

        let response = loop {
            self.check_destination(&url).await?;

            let response = self
                .client
                .get(url.clone())
                .header(reqwest::header::ACCEPT, ACTIVITY_JSON)
                .send()
                .await
                .map_err(|e| KeyResolveError::Unreachable(format!("request failed: {}", e)))?;

            if !response.status().is_redirection() {
                break response;
            }
            if redirects == MAX_REDIRECTS {
                return Err(KeyResolveError::Unreachable("too many redirects".to_string()));
            }
            redirects += 1;

            url = redirect_target(&url, response.headers(), self.allow_private_hosts)?;
            tracing::debug!(key_id, %url, "Following key document redirect");
        };

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(KeyResolveError::NotFound(key_id.to_string()));
            }
            status => {
                return Err(KeyResolveError::Unreachable(format!("HTTP {}", status)));
            }
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| KeyResolveError::MalformedKey(format!("invalid JSON: {}", e)))?;

        extract_public_key(&document, key_id)
    }
}

#[async_trait]
impl KeyResolver for HttpKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<ResolvedKey, KeyResolveError> {
        tracing::debug!(key_id, "Fetching remote public key");
        let result = self.fetch(key_id).await;

        let status = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        KEY_FETCHES_TOTAL.with_label_values(&[status]).inc();

        if let Err(err) = &result {
            tracing::warn!(key_id, error = %err, "Failed to fetch remote public key");
        }
        result
    }
}
