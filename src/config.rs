//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;

use crate::error::AppError;
use crate::signature::PublicKey;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub signature: SignatureConfig,
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Largest request body buffered for digest checks (default: 1 MiB)
    pub max_body_bytes: usize,
}

/// Upper bound for `signature.window_seconds` (one year)
pub const MAX_WINDOW_SECONDS: u64 = 365 * 86_400;

/// Signature acceptance policy
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureConfig {
    /// Allowed clock distance in seconds (default: 86400)
    pub window_seconds: u64,
    /// Headers every draft-cavage signature must cover (default: ["(request-target)"])
    pub required_headers: Vec<String>,
    /// Components every RFC 9421 signature must cover
    /// (default: ["@method", "@target-uri"])
    #[serde(default = "default_required_components")]
    pub required_components: Vec<String>,
    /// Scheme this server is reached on, for `@target-uri` (default: "https")
    #[serde(default = "default_target_uri_scheme")]
    pub target_uri_scheme: String,
    /// Retry without the query string when the first attempt fails
    pub query_fallback: bool,
    /// Return the precise failure reason to clients instead of "Invalid signature"
    pub expose_failure_reason: bool,
}

/// Remote key resolution
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Timeout for key fetches in seconds (default: 10)
    pub fetch_timeout_seconds: u64,
    /// Key cache TTL in seconds (default: 3600)
    pub key_cache_ttl_seconds: u64,
    /// Allow fetching keys from loopback/private hosts (development only)
    pub allow_private_hosts: bool,
    pub user_agent: String,
    /// Keys trusted without fetching
    #[serde(default)]
    pub known_actors: Vec<KnownActorConfig>,
}

/// Preconfigured actor key
#[derive(Debug, Clone, Deserialize)]
pub struct KnownActorConfig {
    pub key_id: String,
    pub actor_id: String,
    pub public_key_pem: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_body_bytes: 1024 * 1024,
            },
            signature: SignatureConfig::default(),
            federation: FederationConfig {
                fetch_timeout_seconds: 10,
                key_cache_ttl_seconds: 3600,
                allow_private_hosts: false,
                user_agent: default_user_agent(),
                known_actors: Vec::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            window_seconds: 86_400,
            required_headers: vec!["(request-target)".to_string()],
            required_components: default_required_components(),
            target_uri_scheme: default_target_uri_scheme(),
            query_fallback: true,
            expose_failure_reason: false,
        }
    }
}

fn default_required_components() -> Vec<String> {
    vec!["@method".to_string(), "@target-uri".to_string()]
}

fn default_target_uri_scheme() -> String {
    "https".to_string()
}

fn default_user_agent() -> String {
    format!("fedsig/{}", env!("CARGO_PKG_VERSION"))
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDSIG__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.max_body_bytes", 1024 * 1024)?
            .set_default("signature.window_seconds", 86400)?
            .set_default("signature.required_headers", vec!["(request-target)"])?
            .set_default("signature.required_components", default_required_components())?
            .set_default("signature.target_uri_scheme", default_target_uri_scheme())?
            .set_default("signature.query_fallback", true)?
            .set_default("signature.expose_failure_reason", false)?
            .set_default("federation.fetch_timeout_seconds", 10)?
            .set_default("federation.key_cache_ttl_seconds", 3600)?
            .set_default("federation.allow_private_hosts", false)?
            .set_default("federation.user_agent", default_user_agent())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FEDSIG__*)
            .add_source(
                Environment::with_prefix("FEDSIG")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("signature.required_headers")
                    .with_list_parse_key("signature.required_components")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.signature.window_seconds == 0 {
            return Err(AppError::Config(
                "signature.window_seconds must be greater than 0".to_string(),
            ));
        }
        if self.signature.window_seconds > MAX_WINDOW_SECONDS {
            return Err(AppError::Config(format!(
                "signature.window_seconds must be at most {}",
                MAX_WINDOW_SECONDS
            )));
        }

        for name in &self.signature.required_headers {
            if name.trim().is_empty() || *name != name.to_ascii_lowercase() {
                return Err(AppError::Config(format!(
                    "signature.required_headers entries must be non-empty lower-case names: {:?}",
                    name
                )));
            }
        }

        for name in &self.signature.required_components {
            if name.trim().is_empty() || *name != name.to_ascii_lowercase() {
                return Err(AppError::Config(format!(
                    "signature.required_components entries must be lower-case names: {:?}",
                    name
                )));
            }
        }

        if !matches!(self.signature.target_uri_scheme.as_str(), "http" | "https") {
            return Err(AppError::Config(format!(
                "signature.target_uri_scheme must be \"http\" or \"https\", got {:?}",
                self.signature.target_uri_scheme
            )));
        }

        if self.server.max_body_bytes == 0 {
            return Err(AppError::Config(
                "server.max_body_bytes must be greater than 0".to_string(),
            ));
        }

        if self.federation.fetch_timeout_seconds == 0 {
            return Err(AppError::Config(
                "federation.fetch_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        for actor in &self.federation.known_actors {
            if PublicKey::from_pem(&actor.public_key_pem).is_err() {
                return Err(AppError::Config(format!(
                    "federation.known_actors: invalid public key PEM for {}",
                    actor.key_id
                )));
            }
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        if self.federation.allow_private_hosts {
            tracing::warn!("Key fetches to private and loopback hosts are allowed");
        }

        Ok(())
    }
}
