//! SMTP connection settings snapshot

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use validator::Validate;

/// Immutable set of SMTP session parameters.
///
/// All five fields come from a single read of the host configuration; a
/// snapshot is never patched after construction. Superseded snapshots are
/// dropped when the last `Arc` holding them goes away.
#[derive(Validate)]
pub struct ConfigSnapshot {
    /// SMTP server host
    #[validate(length(min = 1, max = 255))]
    host: String,

    /// SMTP server port (typically 587 for STARTTLS, 25 for unencrypted)
    #[validate(range(min = 1))]
    port: u16,

    /// Upgrade the session with STARTTLS
    use_tls: bool,

    /// Username for authentication. Empty means anonymous submission.
    username: String,

    password: SecretString,
}

impl ConfigSnapshot {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        use_tls: bool,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Credentials to present, or `None` for anonymous submission.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((&self.username, self.password.expose_secret()))
        }
    }

    /// `host:port` for log lines
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for ConfigSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.use_tls == other.use_tls
            && self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

impl Eq for ConfigSnapshot {}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
