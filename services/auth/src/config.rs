//! Process-wide configuration of the authentication service
//!
//! Built once at startup and handed by reference to every component
//! constructor. Nothing reads the environment after that.

use anyhow::{Context, Result, bail};
use config::{Config, Environment};

/// Longest accepted token lifetime, ten years
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Signing secrets and token lifetimes
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    /// Access token lifetime in seconds
    pub access_ttl_secs: u64,
    /// Refresh token (and session) lifetime in seconds
    pub refresh_ttl_secs: u64,
}

/// Argon2id cost parameters
#[derive(Debug, Clone)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// What the rate limiter does when the counter cache is unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Reject the request with a dependency error
    Closed,
    /// Let the request through unmetered
    Open,
}

/// Fixed-window rate limits
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per window for anonymous traffic, keyed by IP
    pub ip_limit: u64,
    /// Requests per window for authenticated traffic, keyed by user id
    pub user_limit: u64,
    pub window_secs: u64,
    pub fail_mode: FailMode,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ip_limit: 100,
            user_limit: 500,
            window_secs: 60,
            fail_mode: FailMode::Closed,
        }
    }
}

/// Attributes of the refresh-token cookie
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub path: String,
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "refreshToken".to_string(),
            path: "/auth/refresh".to_string(),
            secure: false,
        }
    }
}

/// Complete authentication service configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub tokens: TokenConfig,
    pub hashing: HashingConfig,
    pub rate_limit: RateLimitConfig,
    pub cookie: CookieConfig,
    /// New accounts start `PENDING` instead of `ACTIVE`
    pub require_activation: bool,
    /// Take the client address from `X-Forwarded-For` instead of the socket
    /// peer; only safe behind a proxy that overwrites the header
    pub trust_proxy: bool,
    pub bind_addr: String,
}

impl AuthConfig {
    /// Configuration with default lifetimes and limits around the given secrets
    pub fn with_secrets(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            tokens: TokenConfig {
                access_secret: access_secret.into(),
                refresh_secret: refresh_secret.into(),
                access_ttl_secs: 15 * 60,
                refresh_ttl_secs: 30 * 24 * 60 * 60,
            },
            hashing: HashingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cookie: CookieConfig::default(),
            require_activation: false,
            trust_proxy: false,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }

    /// Load the configuration from `AUTH_*` environment variables
    ///
    /// # Environment Variables
    /// - `AUTH_ACCESS_SECRET`, `AUTH_REFRESH_SECRET`: signing secrets (required, distinct)
    /// - `AUTH_ACCESS_TOKEN_TTL`: access token lifetime in seconds (default: 900)
    /// - `AUTH_REFRESH_TOKEN_TTL`: refresh token lifetime in seconds (default: 2592000)
    /// - `AUTH_HASH_MEMORY_KIB`, `AUTH_HASH_ITERATIONS`, `AUTH_HASH_PARALLELISM`: Argon2 cost
    /// - `AUTH_RATE_LIMIT_IP`, `AUTH_RATE_LIMIT_USER`: requests per window (default: 100 / 500)
    /// - `AUTH_RATE_LIMIT_WINDOW`: window size in seconds (default: 60)
    /// - `AUTH_RATE_LIMIT_FAIL_OPEN`: skip limiting when the cache is down (default: false)
    /// - `AUTH_COOKIE_SECURE`: mark the refresh cookie `Secure` (default: false)
    /// - `AUTH_REQUIRE_ACTIVATION`: register users as `PENDING` (default: false)
    /// - `AUTH_TRUST_PROXY`: key clients by `X-Forwarded-For` (default: false)
    /// - `AUTH_BIND_ADDR`: listen address (default: 0.0.0.0:3000)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::with_secrets("", "");

        let settings = Config::builder()
            .set_default("access_token_ttl", defaults.tokens.access_ttl_secs as i64)?
            .set_default("refresh_token_ttl", defaults.tokens.refresh_ttl_secs as i64)?
            .set_default("hash_memory_kib", defaults.hashing.memory_kib as i64)?
            .set_default("hash_iterations", defaults.hashing.iterations as i64)?
            .set_default("hash_parallelism", defaults.hashing.parallelism as i64)?
            .set_default("rate_limit_ip", defaults.rate_limit.ip_limit as i64)?
            .set_default("rate_limit_user", defaults.rate_limit.user_limit as i64)?
            .set_default("rate_limit_window", defaults.rate_limit.window_secs as i64)?
            .set_default("rate_limit_fail_open", false)?
            .set_default("cookie_secure", defaults.cookie.secure)?
            .set_default("require_activation", defaults.require_activation)?
            .set_default("trust_proxy", defaults.trust_proxy)?
            .set_default("bind_addr", defaults.bind_addr.clone())?
            .add_source(Environment::with_prefix("AUTH"))
            .build()
            .context("Failed to read AUTH_* configuration")?;

        let access_secret = settings
            .get_string("access_secret")
            .context("AUTH_ACCESS_SECRET environment variable not set")?;
        let refresh_secret = settings
            .get_string("refresh_secret")
            .context("AUTH_REFRESH_SECRET environment variable not set")?;

        let fail_mode = if settings.get_bool("rate_limit_fail_open")? {
            FailMode::Open
        } else {
            FailMode::Closed
        };

        let config = Self {
            tokens: TokenConfig {
                access_secret,
                refresh_secret,
                access_ttl_secs: get_u64(&settings, "access_token_ttl")?,
                refresh_ttl_secs: get_u64(&settings, "refresh_token_ttl")?,
            },
            hashing: HashingConfig {
                memory_kib: get_u64(&settings, "hash_memory_kib")?.try_into()?,
                iterations: get_u64(&settings, "hash_iterations")?.try_into()?,
                parallelism: get_u64(&settings, "hash_parallelism")?.try_into()?,
            },
            rate_limit: RateLimitConfig {
                ip_limit: get_u64(&settings, "rate_limit_ip")?,
                user_limit: get_u64(&settings, "rate_limit_user")?,
                window_secs: get_u64(&settings, "rate_limit_window")?,
                fail_mode,
            },
            cookie: CookieConfig {
                secure: settings.get_bool("cookie_secure")?,
                ..CookieConfig::default()
            },
            require_activation: settings.get_bool("require_activation")?,
            trust_proxy: settings.get_bool("trust_proxy")?,
            bind_addr: settings.get_string("bind_addr")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tokens.access_secret.is_empty() || self.tokens.refresh_secret.is_empty() {
            bail!("Token signing secrets must not be empty");
        }
        if self.tokens.access_secret == self.tokens.refresh_secret {
            bail!("Access and refresh tokens must use distinct secrets");
        }
        if self.tokens.access_ttl_secs == 0 || self.tokens.refresh_ttl_secs == 0 {
            bail!("Token lifetimes must be positive");
        }
        if self.tokens.access_ttl_secs > MAX_TOKEN_TTL_SECS
            || self.tokens.refresh_ttl_secs > MAX_TOKEN_TTL_SECS
        {
            bail!("Token lifetimes must not exceed {} seconds", MAX_TOKEN_TTL_SECS);
        }
        if self.rate_limit.window_secs == 0 {
            bail!("Rate limit window must be positive");
        }
        if self.rate_limit.ip_limit > self.rate_limit.user_limit {
            bail!("The per-IP rate limit must not exceed the per-user limit");
        }
        Ok(())
    }
}

fn get_u64(settings: &Config, key: &str) -> Result<u64> {
    let value = settings.get_int(key)?;
    u64::try_from(value).with_context(|| format!("{} must not be negative", key))
}
