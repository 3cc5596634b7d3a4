use clap::{Args, Parser};
use std::time::Duration;
use url::Url;

use crate::auth::Credentials;
use crate::error::{ClientError, Result};

/// Client settings readable from flags or environment
///
/// Host binaries can embed these with `#[command(flatten)]`.
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Base URL of the API
    #[arg(long = "api-base-url", env = "API_BASE_URL")]
    pub base_url: Option<String>,

    /// Token endpoint (defaults to {base_url}/oauth/token)
    #[arg(long = "auth-token-url", env = "AUTH_TOKEN_URL")]
    pub token_url: Option<String>,

    /// Client identifier sent to the token endpoint
    #[arg(long = "auth-principal", env = "AUTH_PRINCIPAL")]
    pub principal: Option<String>,

    /// Client secret sent to the token endpoint
    #[arg(long = "auth-secret", env = "AUTH_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Space separated OAuth2 scopes
    #[arg(long = "auth-scope", env = "AUTH_SCOPE")]
    pub scope: Option<String>,

    /// OAuth2 resource indicator
    #[arg(long = "auth-resource", env = "AUTH_RESOURCE")]
    pub resource: Option<String>,

    /// HTTP max retries for transient failures
    #[arg(long = "http-max-retries", env = "HTTP_MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// Per-request deadline in seconds
    #[arg(long = "http-request-timeout", env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Connect timeout in seconds
    #[arg(long = "http-connect-timeout", env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// Idle connections kept per host
    #[arg(long = "http-max-connections", env = "HTTP_MAX_CONNECTIONS", default_value = "20")]
    pub max_connections: usize,

    /// Base delay for exponential backoff (milliseconds)
    #[arg(long = "http-backoff-base-ms", env = "HTTP_BACKOFF_BASE_MS", default_value = "1000")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    #[arg(long = "http-backoff-max-ms", env = "HTTP_BACKOFF_MAX_MS", default_value = "30000")]
    pub backoff_max_ms: u64,

    /// Seconds subtracted from the server-reported token lifetime
    #[arg(long = "token-expiry-skew", env = "TOKEN_EXPIRY_SKEW", default_value = "60")]
    pub token_expiry_skew: u64,

    /// Treat 403 responses as an expired token
    #[arg(long = "refresh-on-forbidden", env = "REFRESH_ON_FORBIDDEN", default_value = "false")]
    pub refresh_on_forbidden: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Parses nothing but the environment
#[derive(Parser, Debug)]
#[command(name = "bearer-client", no_binary_name = true)]
struct EnvOnly {
    #[command(flatten)]
    args: ClientArgs,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    // Endpoints
    pub base_url: Url,
    pub token_url: Url,

    // Authentication
    pub credentials: Credentials,
    pub scope: Option<String>,
    pub resource: Option<String>,
    pub token_expiry_skew: Duration,
    pub refresh_on_forbidden: bool,

    // HTTP client
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_connections: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,

    // Logging
    pub log_level: String,
}

impl ClientConfig {
    /// Defaults for everything except the endpoint and credentials
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        let token_url = default_token_url(&base_url)?;

        Ok(Self {
            base_url,
            token_url,
            credentials,
            scope: None,
            resource: None,
            token_expiry_skew: Duration::from_secs(60),
            refresh_on_forbidden: false,
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_connections: 20,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_secs(30),
            log_level: "info".to_string(),
        })
    }

    /// Load configuration with priority: ENV > .env file > defaults
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let parsed = EnvOnly::try_parse_from(std::iter::empty::<String>())
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Self::from_args(parsed.args)
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: ClientArgs) -> Result<Self> {
        let base_url = args.base_url.ok_or_else(|| {
            ClientError::Config(
                "API_BASE_URL is required (use --api-base-url or set API_BASE_URL)".to_string(),
            )
        })?;
        let principal = args.principal.ok_or_else(|| {
            ClientError::Config(
                "AUTH_PRINCIPAL is required (use --auth-principal or set AUTH_PRINCIPAL)"
                    .to_string(),
            )
        })?;
        let secret = args.secret.ok_or_else(|| {
            ClientError::Config(
                "AUTH_SECRET is required (use --auth-secret or set AUTH_SECRET)".to_string(),
            )
        })?;

        let mut config = Self::new(&base_url, Credentials::new(principal, secret)?)?;
        if let Some(token_url) = args.token_url {
            config = config.with_token_url(&token_url)?;
        }

        config.scope = non_empty(args.scope);
        config.resource = non_empty(args.resource);
        config.max_retries = args.max_retries;
        config.request_timeout = Duration::from_secs(args.request_timeout);
        config.connect_timeout = Duration::from_secs(args.connect_timeout);
        config.max_connections = args.max_connections;
        config.backoff_base = Duration::from_millis(args.backoff_base_ms);
        config.backoff_max = Duration::from_millis(args.backoff_max_ms);
        config.token_expiry_skew = Duration::from_secs(args.token_expiry_skew);
        config.refresh_on_forbidden = args.refresh_on_forbidden;
        config.log_level = args.log_level;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("API_BASE_URL", &self.base_url), ("AUTH_TOKEN_URL", &self.token_url)] {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ClientError::Config(format!(
                    "{} must be an http(s) URL: {}",
                    name, url
                )));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Config(
                "HTTP_REQUEST_TIMEOUT must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::Config(
                "HTTP_CONNECT_TIMEOUT must be greater than zero".to_string(),
            ));
        }
        if self.backoff_base > self.backoff_max {
            return Err(ClientError::Config(format!(
                "HTTP_BACKOFF_BASE_MS ({:?}) exceeds HTTP_BACKOFF_MAX_MS ({:?})",
                self.backoff_base, self.backoff_max
            )));
        }
        Ok(())
    }

    pub fn with_token_url(mut self, token_url: &str) -> Result<Self> {
        self.token_url = Url::parse(token_url)
            .map_err(|e| ClientError::Config(format!("Invalid token URL '{}': {}", token_url, e)))?;
        Ok(self)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_token_expiry_skew(mut self, skew: Duration) -> Self {
        self.token_expiry_skew = skew;
        self
    }

    pub fn with_refresh_on_forbidden(mut self, enabled: bool) -> Self {
        self.refresh_on_forbidden = enabled;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Parse the base URL, making sure relative joins keep its path
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ClientError::Config(format!("Invalid base URL '{}': {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(ClientError::Config(format!(
            "Base URL cannot carry paths: {}",
            raw
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn default_token_url(base_url: &Url) -> Result<Url> {
    base_url
        .join("oauth/token")
        .map_err(|e| ClientError::Config(format!("Cannot derive token URL: {}", e)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
