//! Target servers.
//!
//! One pipeline runs per `ServerConfig`. A server is either assembled directly,
//! parsed from the compact `user@host:port/password` form, or read from a plan file
//! where both the compact string and a full mapping are accepted.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::DeployError;

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Login user.
    pub user: String,
    /// Hostname or address to connect to.
    #[serde(alias = "server")]
    pub host: String,
    /// Path to a private key. Empty means the SSH agent or default identities.
    #[serde(default)]
    pub key: String,
    /// SSH port, kept as text the way it is written in server strings.
    #[serde(default = "default_port", deserialize_with = "crate::serde::string_or_number")]
    pub port: String,
    /// Login password. Never displayed.
    #[serde(default)]
    pub password: String,
}

fn default_port() -> String {
    "22".to_string()
}

impl ServerConfig {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            key: String::new(),
            port: default_port(),
            password: String::new(),
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// The port as a number, for transports that need one.
    pub fn port_number(&self) -> Result<u16, DeployError> {
        match self.port.parse() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(DeployError::InvalidPort {
                server: format!("{}@{}", self.user, self.host),
                port: self.port.clone(),
            }),
        }
    }

    /// Fills in the default port when none was written and rejects ports that
    /// are not a number between 1 and 65535.
    pub fn validate(mut self) -> Result<Self, DeployError> {
        let port = self.port.trim();
        self.port = if port.is_empty() {
            default_port()
        } else {
            port.to_string()
        };
        self.port_number()?;
        Ok(self)
    }
}

/// Parses `user@host:port/password`.
///
/// Delimiters are searched left to right: the first `@`, then the first `:` after
/// it, then the first `/` after that. Everything behind that `/` is the password,
/// so passwords may themselves contain `@`, `:` or `/`. An empty port means 22.
impl FromStr for ServerConfig {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DeployError::InvalidServer(s.to_string());
        let at = s.find('@').ok_or_else(invalid)?;
        let colon = at + 1 + s[at + 1..].find(':').ok_or_else(invalid)?;
        let slash = colon + 1 + s[colon + 1..].find('/').ok_or_else(invalid)?;
        Self {
            user: s[..at].to_string(),
            host: s[at + 1..colon].to_string(),
            key: String::new(),
            port: s[colon + 1..slash].to_string(),
            password: s[slash + 1..].to_string(),
        }
        .validate()
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("user", &self.user)
            .field("host", &self.host)
            .field("key", &self.key)
            .field("port", &self.port)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}
