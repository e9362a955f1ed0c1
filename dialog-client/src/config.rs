//! Client configuration and credential validation.

use std::fmt;

use crate::error_channel::UnhandledErrorPolicy;
use crate::errors::ConfigurationError;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`crate::Client::builder`].
///
/// Exactly one credential pair must be set: `phone` + `code` for SMS login,
/// or `username` + `password`.
#[derive(Clone, Default)]
pub struct Config {
    /// Server endpoints, tried by the transport in order.
    pub endpoints:              Vec<String>,
    pub phone:                  Option<String>,
    pub code:                   Option<String>,
    pub username:               Option<String>,
    pub password:               Option<String>,
    /// Suppress lifecycle info logs (login progress, stream state).
    pub quiet:                  bool,
    /// What to do with errors when no `on_error` handler is registered.
    pub unhandled_error:        UnhandledErrorPolicy,
    /// Upper bound on cached resolved messages; `None` never evicts.
    pub resolve_cache_capacity: Option<usize>,
}

impl Config {
    /// Read the configuration from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `ENDPOINT` | `endpoints` (comma separated) |
    /// | `PHONE`, `CODE` | SMS login |
    /// | `USERNAME`, `PASSWORD` | password login |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`] but reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let endpoints = non_empty("ENDPOINT")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            endpoints,
            phone:    non_empty("PHONE"),
            code:     non_empty("CODE"),
            username: non_empty("USERNAME"),
            password: non_empty("PASSWORD"),
            ..Default::default()
        }
    }

    /// Extract the single credential this config describes.
    pub fn credential(&self) -> Result<Credential, ConfigurationError> {
        let sms      = self.phone.is_some() || self.code.is_some();
        let password = self.username.is_some() || self.password.is_some();

        match (sms, password) {
            (true, true)   => Err(ConfigurationError::ConflictingCredentials),
            (false, false) => Err(ConfigurationError::MissingCredentials),
            (true, false)  => Ok(Credential::Sms {
                phone: self.phone.clone().ok_or(ConfigurationError::IncompleteCredential("phone"))?,
                code:  self.code.clone().ok_or(ConfigurationError::IncompleteCredential("code"))?,
            }),
            (false, true)  => Ok(Credential::Password {
                username: self.username.clone().ok_or(ConfigurationError::IncompleteCredential("username"))?,
                password: self.password.clone().ok_or(ConfigurationError::IncompleteCredential("password"))?,
            }),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoints", &self.endpoints)
            .field("phone", &self.phone)
            .field("code", &self.code.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("quiet", &self.quiet)
            .field("unhandled_error", &self.unhandled_error)
            .field("resolve_cache_capacity", &self.resolve_cache_capacity)
            .finish()
    }
}

// ─── Credential ───────────────────────────────────────────────────────────────

/// One of the two supported login methods.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Sms      { phone: String, code: String },
    Password { username: String, password: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sms { phone, .. } => write!(f, "Sms {{ phone: {phone:?} }}"),
            Self::Password { username, .. } => write!(f, "Password {{ username: {username:?} }}"),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sms() -> Config {
        Config { phone: Some("75550000000".into()), code: Some("5555".into()), ..Default::default() }
    }

    #[test]
    fn sms_credential() {
        assert_eq!(
            sms().credential(),
            Ok(Credential::Sms { phone: "75550000000".into(), code: "5555".into() })
        );
    }

    #[test]
    fn both_methods_conflict() {
        let cfg = Config { username: Some("bot".into()), password: Some("pw".into()), ..sms() };
        assert_eq!(cfg.credential(), Err(ConfigurationError::ConflictingCredentials));
    }

    #[test]
    fn neither_method_is_missing() {
        assert_eq!(Config::default().credential(), Err(ConfigurationError::MissingCredentials));
    }

    #[test]
    fn half_a_pair_is_incomplete() {
        let cfg = Config { username: Some("bot".into()), ..Default::default() };
        assert_eq!(cfg.credential(), Err(ConfigurationError::IncompleteCredential("password")));
    }

    #[test]
    fn lookup_splits_endpoints_and_skips_blanks() {
        let env: HashMap<&str, &str> = [
            ("ENDPOINT", "wss://a.example, wss://b.example"),
            ("USERNAME", "bot"),
            ("PASSWORD", "secret"),
            ("PHONE", "  "),
        ].into_iter().collect();
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.endpoints, vec!["wss://a.example", "wss://b.example"]);
        assert_eq!(cfg.phone, None);
        assert!(matches!(cfg.credential(), Ok(Credential::Password { .. })));
    }

    #[test]
    fn debug_redacts_secrets() {
        let shown = format!("{:?} {:?}", sms(), sms().credential());
        assert!(!shown.contains("5555"));
    }
}
