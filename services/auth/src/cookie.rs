//! Refresh-token cookie instructions
//!
//! The core never touches HTTP; it returns a [`CookieDirective`] that the
//! route layer turns into a `Set-Cookie` header.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::config::CookieConfig;

/// What the transport layer must do with the refresh cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDirective {
    /// Store `value` for `max_age_secs`
    Set { value: String, max_age_secs: u64 },
    /// Remove the cookie
    Clear,
}

/// Builds refresh cookies with the configured name, path and `Secure` flag
#[derive(Debug, Clone)]
pub struct RefreshCookie {
    config: CookieConfig,
}

impl RefreshCookie {
    pub fn new(config: &CookieConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Refresh token presented by the client, if any
    pub fn read(&self, jar: &CookieJar) -> Option<String> {
        jar.get(&self.config.name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Apply a directive to the outgoing cookie jar
    pub fn apply(&self, jar: CookieJar, directive: CookieDirective) -> CookieJar {
        match directive {
            CookieDirective::Set {
                value,
                max_age_secs,
            } => jar.add(
                Cookie::build((self.config.name.clone(), value))
                    .http_only(true)
                    .secure(self.config.secure)
                    .same_site(SameSite::Strict)
                    .path(self.config.path.clone())
                    .max_age(Duration::seconds(
                        i64::try_from(max_age_secs).unwrap_or(i64::MAX),
                    )),
            ),
            CookieDirective::Clear => {
                // Added rather than `remove`d so the removal is sent even
                // when the request did not carry the cookie.
                let mut cookie = Cookie::build((self.config.name.clone(), ""))
                    .path(self.config.path.clone())
                    .build();
                cookie.make_removal();
                jar.add(cookie)
            }
        }
    }
}
